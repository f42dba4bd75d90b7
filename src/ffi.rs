//! FFI interface for C++ interop
//!
//! The request and the result cross the boundary as JSON strings.

use std::ffi::{c_char, CStr, CString};
use std::ptr;

use serde::Deserialize;
use serde_json::Value;

use crate::engine::{extract_from_html, ExtractOptions};
use crate::mapping::ScraperMapping;

/// Result struct returned to C++
/// Both pointers are owned by Rust and must be freed via free_extraction_result
#[repr(C)]
pub struct ExtractionResultFFI {
    /// JSON-serialized `ExtractionResult` (null-terminated)
    pub json_ptr: *mut c_char,
    /// Error message if the request was unusable (null-terminated), or null
    pub error_ptr: *mut c_char,
}

/// JSON request accepted by [`extract_listing_ffi`].
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListingRequest {
    source_url: String,
    /// Mapping document, inline.
    mapping: Value,
    #[serde(default)]
    mapping_name: Option<String>,
    #[serde(default)]
    options: ExtractOptions,
}

/// Extract one listing from HTML with the mapping carried in the request.
///
/// # Arguments
/// * `html_ptr` - Pointer to HTML content (UTF-8, not necessarily null-terminated)
/// * `html_len` - Length of HTML content in bytes
/// * `request_json` - `{"sourceUrl": ..., "mapping": {...}, "options": {...}}` (null-terminated)
///
/// # Safety
/// - `html_ptr` must point to valid memory of at least `html_len` bytes
/// - `request_json` must be a valid null-terminated C string
/// - Caller must free the result via `free_extraction_result`
#[no_mangle]
pub unsafe extern "C" fn extract_listing_ffi(
    html_ptr: *const c_char,
    html_len: usize,
    request_json: *const c_char,
) -> ExtractionResultFFI {
    let html = if html_ptr.is_null() || html_len == 0 {
        ""
    } else {
        let slice = std::slice::from_raw_parts(html_ptr as *const u8, html_len);
        match std::str::from_utf8(slice) {
            Ok(s) => s,
            Err(_) => return make_error_result("Invalid UTF-8 in HTML content"),
        }
    };

    if request_json.is_null() {
        return make_error_result("Request JSON is null");
    }
    let request_str = match CStr::from_ptr(request_json).to_str() {
        Ok(s) => s,
        Err(_) => return make_error_result("Invalid UTF-8 in request JSON"),
    };

    match run_request(html, request_str) {
        Ok(json) => make_json_result(json),
        Err(message) => make_error_result(&message),
    }
}

fn run_request(html: &str, request_str: &str) -> Result<String, String> {
    let request: ListingRequest = serde_json::from_str(request_str)
        .map_err(|e| format!("Failed to parse request JSON: {e}"))?;

    let name = request.mapping_name.as_deref().unwrap_or("inline");
    let mapping = ScraperMapping::from_value(name, request.mapping).map_err(|e| e.to_string())?;

    let result = extract_from_html(html, &request.source_url, &mapping, &request.options);
    serde_json::to_string(&result).map_err(|e| format!("Failed to serialize result: {e}"))
}

/// Free an ExtractionResultFFI returned by extract_listing_ffi
///
/// # Safety
/// - `result` must have been returned by `extract_listing_ffi`
/// - Must only be called once per result
#[no_mangle]
pub unsafe extern "C" fn free_extraction_result(result: ExtractionResultFFI) {
    if !result.json_ptr.is_null() {
        drop(CString::from_raw(result.json_ptr));
    }
    if !result.error_ptr.is_null() {
        drop(CString::from_raw(result.error_ptr));
    }
}

fn make_json_result(json: String) -> ExtractionResultFFI {
    match CString::new(json) {
        Ok(cstr) => ExtractionResultFFI {
            json_ptr: cstr.into_raw(),
            error_ptr: ptr::null_mut(),
        },
        Err(_) => make_error_result("Result JSON contains null bytes"),
    }
}

fn make_error_result(msg: &str) -> ExtractionResultFFI {
    let error = CString::new(msg.replace('\0', " ")).unwrap_or_default();
    ExtractionResultFFI {
        json_ptr: ptr::null_mut(),
        error_ptr: error.into_raw(),
    }
}
