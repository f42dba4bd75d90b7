//! Inline script extraction
//!
//! Two strategies read `<script>` content without executing it:
//! - regex over the raw page source
//! - JSON values assigned to variables (`var x = {...}`, `x = [...]`,
//!   `window.x = JSON.parse('...')`), read from the SWC AST
//!
//! When a script does not parse (template fragments, newer syntax), the
//! assignment is located textually and its JSON literal parsed leniently.

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use swc_common::{sync::Lrc, FileName, SourceMap};
use swc_ecma_ast::*;
use swc_ecma_parser::{lexer::Lexer, Parser, StringInput, Syntax};

static SCRIPT_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        "script:not([type]), script[type='text/javascript'], \
         script[type='application/javascript'], script[type='module']",
    )
    .expect("script selector")
});

static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*([}\]])").expect("trailing comma regex"));
static UNQUOTED_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"([{,]\s*)([A-Za-z_$][\w$]*)\s*:"#).expect("unquoted key regex"));

/// Run `regex` over the raw source. Each match yields capture group 1 when
/// the pattern has one, else the whole match.
pub fn regex_values(source: &str, regex: &Regex, first_only: bool) -> Vec<String> {
    let values = regex.captures_iter(source).filter_map(|caps| {
        caps.get(1)
            .or_else(|| caps.get(0))
            .map(|m| m.as_str().to_string())
    });
    if first_only {
        values.take(1).collect()
    } else {
        values.collect()
    }
}

/// Extract JavaScript variables from inline script tags using AST parsing.
///
/// `window.x = ...` assignments are stored under both `x` and `window.x`.
pub fn extract_script_variables(document: &Html) -> HashMap<String, Rc<Value>> {
    let mut result = HashMap::new();

    for element in document.select(&SCRIPT_SELECTOR) {
        let script_text = element.text().collect::<String>();
        if script_text.trim().is_empty() {
            continue;
        }

        if let Some(vars) = parse_js_and_extract_vars(&script_text) {
            for (name, value) in vars {
                result.insert(name, Rc::new(value));
            }
        }
    }

    result
}

/// Parse JavaScript source and extract variable declarations
fn parse_js_and_extract_vars(source: &str) -> Option<HashMap<String, Value>> {
    let cm: Lrc<SourceMap> = Default::default();
    let fm = cm.new_source_file(FileName::Anon.into(), source.to_string());

    let lexer = Lexer::new(
        Syntax::Es(Default::default()),
        Default::default(),
        StringInput::from(&*fm),
        None,
    );

    let mut parser = Parser::new_from(lexer);

    // Inline scripts often don't parse cleanly; the textual scan covers those.
    let script = parser.parse_script().ok()?;

    let mut result = HashMap::new();
    for stmt in &script.body {
        extract_vars_from_stmt(stmt, &mut result);
    }

    Some(result)
}

fn extract_vars_from_stmt(stmt: &Stmt, result: &mut HashMap<String, Value>) {
    match stmt {
        Stmt::Decl(Decl::Var(var_decl)) => {
            for decl in &var_decl.decls {
                if let (Some(init), Pat::Ident(ident)) = (&decl.init, &decl.name) {
                    if let Some(value) = expr_to_json(init) {
                        result.insert(ident.sym.as_str().to_string(), value);
                    }
                }
            }
        }
        Stmt::Expr(expr_stmt) => {
            if let Expr::Assign(assign) = &*expr_stmt.expr {
                let Some(value) = expr_to_json(&assign.right) else {
                    return;
                };
                match &assign.left {
                    AssignTarget::Simple(SimpleAssignTarget::Ident(ident)) => {
                        result.insert(ident.sym.as_str().to_string(), value);
                    }
                    AssignTarget::Simple(SimpleAssignTarget::Member(member)) => {
                        if let (Expr::Ident(obj), MemberProp::Ident(prop)) =
                            (&*member.obj, &member.prop)
                        {
                            let prop_name = prop.sym.as_str().to_string();
                            let qualified = format!("{}.{}", obj.sym.as_str(), prop_name);
                            result.insert(qualified, value.clone());
                            if matches!(obj.sym.as_str(), "window" | "self" | "globalThis") {
                                result.insert(prop_name, value);
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
        _ => {}
    }
}

/// Convert a JavaScript literal expression to a JSON value
fn expr_to_json(expr: &Expr) -> Option<Value> {
    match expr {
        Expr::Lit(Lit::Str(s)) => Some(Value::String(s.value.as_str().unwrap_or("").to_string())),
        Expr::Lit(Lit::Num(n)) => number_to_json(n.value),
        Expr::Lit(Lit::Bool(b)) => Some(Value::Bool(b.value)),
        Expr::Lit(Lit::Null(_)) => Some(Value::Null),

        Expr::Object(obj) => {
            let mut map = serde_json::Map::new();
            for prop in &obj.props {
                if let PropOrSpread::Prop(prop) = prop {
                    if let Prop::KeyValue(kv) = &**prop {
                        let key = prop_name_to_string(&kv.key)?;
                        let value = expr_to_json(&kv.value).unwrap_or(Value::Null);
                        map.insert(key, value);
                    }
                }
            }
            Some(Value::Object(map))
        }

        Expr::Array(arr) => Some(Value::Array(
            arr.elems
                .iter()
                .map(|elem| match elem {
                    Some(ExprOrSpread { expr, .. }) => expr_to_json(expr).unwrap_or(Value::Null),
                    None => Value::Null,
                })
                .collect(),
        )),

        // JSON.parse('...')
        Expr::Call(call) if is_json_parse_call(call) => {
            let ExprOrSpread { expr: arg, .. } = call.args.first()?;
            match &**arg {
                Expr::Lit(Lit::Str(s)) => serde_json::from_str(s.value.as_str()?).ok(),
                _ => None,
            }
        }

        Expr::Unary(unary) if unary.op == UnaryOp::Minus => match &*unary.arg {
            Expr::Lit(Lit::Num(n)) => number_to_json(-n.value),
            _ => None,
        },

        Expr::Tpl(tpl) if tpl.exprs.is_empty() => tpl
            .quasis
            .first()
            .map(|quasi| Value::String(quasi.raw.as_str().to_string())),

        Expr::Paren(paren) => expr_to_json(&paren.expr),

        _ => None,
    }
}

fn number_to_json(n: f64) -> Option<Value> {
    if n.fract() == 0.0 && n >= i64::MIN as f64 && n <= i64::MAX as f64 {
        Some(Value::Number(serde_json::Number::from(n as i64)))
    } else {
        serde_json::Number::from_f64(n).map(Value::Number)
    }
}

/// Check if a call expression is JSON.parse(...)
fn is_json_parse_call(call: &CallExpr) -> bool {
    if let Callee::Expr(expr) = &call.callee {
        if let Expr::Member(member) = &**expr {
            if let (Expr::Ident(obj), MemberProp::Ident(prop)) = (&*member.obj, &member.prop) {
                return obj.sym.as_ref() == "JSON" && prop.sym.as_ref() == "parse";
            }
        }
    }
    false
}

fn prop_name_to_string(name: &PropName) -> Option<String> {
    match name {
        PropName::Ident(ident) => Some(ident.sym.as_str().to_string()),
        PropName::Str(s) => s.value.as_str().map(|v| v.to_string()),
        PropName::Num(n) => Some(n.value.to_string()),
        _ => None,
    }
}

/// Find `name = {...}` or `name = [...]` in raw source and parse the literal.
pub fn scan_script_variable(source: &str, name: &str) -> Option<Value> {
    let pattern = format!(r"{}\s*=\s*[\[{{]", regex::escape(name));
    let assignment = Regex::new(&pattern).ok()?;

    for m in assignment.find_iter(source) {
        let preceded_by_ident = source[..m.start()]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '$');
        if preceded_by_ident {
            continue;
        }

        let literal_start = m.end() - 1;
        let Some(literal) = balanced_literal(&source[literal_start..]) else {
            continue;
        };
        match parse_js_value(literal) {
            Ok(value) => return Some(value),
            Err(e) => tracing::debug!(variable = name, error = %e, "script literal did not parse"),
        }
    }

    None
}

/// The balanced `{...}` / `[...]` prefix of `text`, respecting string literals.
fn balanced_literal(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (i, ch) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }

        match ch {
            '"' | '\'' | '`' => quote = Some(ch),
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[..=i]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Parse a JavaScript value string to JSON
/// Handles trailing commas, single quotes, and unquoted keys
fn parse_js_value(js_str: &str) -> Result<Value, serde_json::Error> {
    if let Ok(v) = serde_json::from_str(js_str) {
        return Ok(v);
    }

    let json_str = js_str.replace('\'', "\"");
    let json_str = TRAILING_COMMA.replace_all(&json_str, "$1");
    let json_str = UNQUOTED_KEY.replace_all(&json_str, r#"$1"$2":"#);

    serde_json::from_str(&json_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_js_extraction_json_parse() {
        let html = r#"
        <html>
        <head>
            <script>
            var gallery = JSON.parse('[{"src":"/a.jpg"},{"src":"/b.jpg"}]');
            const listingId = '900000000022233';
            window.dataLayer = {"property": {"bedrooms": 3, "surface": 84.5}};
            let discount = -5;
            </script>
        </head>
        </html>
        "#;

        let document = Html::parse_document(html);
        let vars = extract_script_variables(&document);

        assert_eq!(vars["gallery"][1]["src"], "/b.jpg");
        assert_eq!(*vars["listingId"], Value::String("900000000022233".into()));
        assert_eq!(vars["dataLayer"]["property"]["bedrooms"], 3);
        assert_eq!(vars["window.dataLayer"]["property"]["surface"], 84.5);
        assert_eq!(*vars["discount"], serde_json::json!(-5));
    }

    #[test]
    fn test_scan_fallback_for_unparsable_script() {
        // `<%= %>` template residue keeps the ECMAScript parser from succeeding.
        let source = r#"<script>
            var tpl = <%= render %>;
            window.__INITIAL_STATE__ = {ad: {price: '1.250.000', tags: ['sea view', 'pool',],},};
        </script>"#;

        let document = Html::parse_document(source);
        assert!(extract_script_variables(&document).is_empty());

        let state = scan_script_variable(source, "__INITIAL_STATE__").unwrap();
        assert_eq!(state["ad"]["price"], "1.250.000");
        assert_eq!(state["ad"]["tags"][1], "pool");
    }

    #[test]
    fn test_scan_requires_name_boundary() {
        let source = "var my_data = {\"a\": 1}; var data = {\"a\": 2};";
        assert_eq!(scan_script_variable(source, "data").unwrap()["a"], 2);
    }

    #[test]
    fn test_balanced_literal_ignores_brackets_in_strings() {
        assert_eq!(
            balanced_literal(r#"{"text": "a } b", "n": [1, 2]}; trailing"#),
            Some(r#"{"text": "a } b", "n": [1, 2]}"#)
        );
        assert_eq!(balanced_literal("{\"open\": 1"), None);
    }

    #[test]
    fn test_regex_values() {
        let source = r#"dataLayer.push({"beds":"3"}); dataLayer.push({"beds":"4"});"#;
        let regex = Regex::new(r#""beds":"(\d+)""#).unwrap();
        assert_eq!(regex_values(source, &regex, true), vec!["3"]);
        assert_eq!(regex_values(source, &regex, false), vec!["3", "4"]);

        let whole = Regex::new(r"\d+").unwrap();
        assert_eq!(regex_values("ref 77", &whole, true), vec!["77"]);
    }

    #[test]
    fn test_parse_js_value() {
        assert_eq!(parse_js_value(r#"{'name': 'test'}"#).unwrap()["name"], "test");
        assert_eq!(parse_js_value(r#"{"name": "test",}"#).unwrap()["name"], "test");
        assert_eq!(parse_js_value(r#"{name: "test"}"#).unwrap()["name"], "test");
    }
}
