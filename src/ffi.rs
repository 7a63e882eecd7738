//! FFI bindings for the tour segmenter
//!
//! C-compatible functions over the JSON pipeline. Inputs are null-terminated
//! `tour.series.v1` documents; returned strings are allocated by the library
//! and must be released with `tourseg_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::pipeline::{
    analyze_tour_json, available_segmenters_json, smooth_tour_json, TourAnalyzer,
};

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Run a JSON entry point, translating errors into the last error slot
unsafe fn call_json<F>(json: *const c_char, f: F) -> *mut c_char
where
    F: FnOnce(String) -> Result<String, crate::ComputeError>,
{
    clear_last_error();

    let Some(json_str) = cstr_to_string(json) else {
        set_last_error("Invalid JSON string pointer");
        return ptr::null_mut();
    };

    match f(json_str) {
        Ok(result) => string_to_cstr(&result),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Stateless API
// ============================================================================

/// Analyze a tour document and return the JSON report.
///
/// # Safety
/// - `json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `tourseg_free_string`.
/// - Returns NULL on error; call `tourseg_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn tourseg_analyze_json(json: *const c_char) -> *mut c_char {
    call_json(json, analyze_tour_json)
}

/// List all segmenters and their availability for a tour document.
///
/// # Safety
/// - `json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `tourseg_free_string`.
/// - Returns NULL on error; call `tourseg_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn tourseg_available_segmenters_json(json: *const c_char) -> *mut c_char {
    call_json(json, available_segmenters_json)
}

/// Smooth a tour document and return the smoothed channels as JSON.
///
/// # Safety
/// - `json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `tourseg_free_string`.
/// - Returns NULL on error; call `tourseg_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn tourseg_smooth_json(json: *const c_char) -> *mut c_char {
    call_json(json, smooth_tour_json)
}

// ============================================================================
// Analyzer API
// ============================================================================

/// Opaque handle to a TourAnalyzer
pub struct TourAnalyzerHandle {
    analyzer: TourAnalyzer,
}

/// Create an analyzer.
///
/// # Safety
/// - `config_json` is an `AnalysisConfig` JSON string used for documents
///   without a configuration, or NULL for the defaults.
/// - Returns NULL on an invalid configuration; call `tourseg_last_error`.
/// - The handle must be freed with `tourseg_analyzer_free`.
#[no_mangle]
pub unsafe extern "C" fn tourseg_analyzer_new(config_json: *const c_char) -> *mut TourAnalyzerHandle {
    clear_last_error();

    let mut analyzer = TourAnalyzer::new();

    if !config_json.is_null() {
        let Some(config) = cstr_to_string(config_json) else {
            set_last_error("Invalid config string pointer");
            return ptr::null_mut();
        };
        if let Err(e) = analyzer.load_default_config(&config) {
            set_last_error(&e.to_string());
            return ptr::null_mut();
        }
    }

    Box::into_raw(Box::new(TourAnalyzerHandle { analyzer }))
}

/// Free an analyzer.
///
/// # Safety
/// - `analyzer` must be a pointer returned by `tourseg_analyzer_new`, or NULL.
#[no_mangle]
pub unsafe extern "C" fn tourseg_analyzer_free(analyzer: *mut TourAnalyzerHandle) {
    if !analyzer.is_null() {
        drop(Box::from_raw(analyzer));
    }
}

/// Analyze a tour document with an analyzer.
///
/// # Safety
/// - `analyzer` must be a valid pointer returned by `tourseg_analyzer_new`.
/// - `json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `tourseg_free_string`.
/// - Returns NULL on error; call `tourseg_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn tourseg_analyzer_analyze(
    analyzer: *const TourAnalyzerHandle,
    json: *const c_char,
) -> *mut c_char {
    if analyzer.is_null() {
        clear_last_error();
        set_last_error("Null analyzer pointer");
        return ptr::null_mut();
    }

    let handle = &*analyzer;
    call_json(json, |json| handle.analyzer.analyze_json(&json))
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by a `tourseg_*` function.
///
/// # Safety
/// - `ptr` must be a pointer returned by this library, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn tourseg_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The pointer is valid until the next `tourseg_*` call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn tourseg_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn tourseg_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
