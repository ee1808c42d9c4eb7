//! FFI bindings for checkin-signals
//!
//! This module provides C-compatible functions for calling the signal
//! pipeline from other languages. All functions use C strings
//! (null-terminated) and return allocated memory that must be freed by the
//! caller using `checkin_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::classifier::Classifier;
use crate::config::PipelineConfig;
use crate::features::FeatureExtractor;
use crate::pipeline::FrameProcessor;
use crate::types::{FeatureKind, LandmarkFrame};

// Thread-local storage for the last error message
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

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

// ============================================================================
// Stateless API
// ============================================================================

/// Classify one feature value into a 1-5 score.
///
/// `feature` accepts snake_case, kebab-case or camelCase names
/// (`eye_openness`, `browDistanceRatio`, ...).
///
/// # Safety
/// - `feature` must be a valid null-terminated C string.
/// - Returns -1 on error; call `checkin_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn checkin_classify(feature: *const c_char, value: f64) -> i32 {
    clear_last_error();

    let name = match cstr_to_string(feature) {
        Some(s) => s,
        None => {
            set_last_error("Invalid feature string pointer");
            return -1;
        }
    };

    let kind: FeatureKind = match name.parse() {
        Ok(kind) => kind,
        Err(e) => {
            set_last_error(&format!("{e}"));
            return -1;
        }
    };

    if !value.is_finite() {
        set_last_error("Feature value must be finite");
        return -1;
    }

    i32::from(Classifier::classify(kind, value).value())
}

/// Extract the five raw features from one landmark frame.
///
/// # Safety
/// - `frame_json` must be a valid null-terminated C string holding a JSON
///   array of `{"x": .., "y": ..}` points.
/// - Returns a newly allocated JSON object that must be freed with
///   `checkin_free_string`.
/// - Returns NULL on error or when the frame has no usable face geometry;
///   call `checkin_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn checkin_extract_features(frame_json: *const c_char) -> *mut c_char {
    clear_last_error();

    let json_str = match cstr_to_string(frame_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid JSON string pointer");
            return ptr::null_mut();
        }
    };

    let frame: LandmarkFrame = match serde_json::from_str(&json_str) {
        Ok(frame) => frame,
        Err(e) => {
            set_last_error(&format!("JSON error: {e}"));
            return ptr::null_mut();
        }
    };

    let Some(sample) = FeatureExtractor::extract_stateless(&frame) else {
        set_last_error("Frame has no usable face geometry");
        return ptr::null_mut();
    };

    match serde_json::to_string(&sample) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Stateful Processor API
// ============================================================================

/// Opaque handle to a FrameProcessor
pub struct FrameProcessorHandle {
    processor: FrameProcessor,
}

/// Create a new FrameProcessor with the default smoothing factors.
///
/// # Safety
/// - Returns a pointer to a newly allocated FrameProcessor.
/// - Must be freed with `checkin_processor_free`.
#[no_mangle]
pub unsafe extern "C" fn checkin_processor_new() -> *mut FrameProcessorHandle {
    clear_last_error();

    let handle = Box::new(FrameProcessorHandle {
        processor: FrameProcessor::new(),
    });
    Box::into_raw(handle)
}

/// Create a FrameProcessor from a JSON pipeline config.
///
/// # Safety
/// - `config_json` must be a valid null-terminated C string.
/// - Must be freed with `checkin_processor_free`.
/// - Returns NULL on error; call `checkin_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn checkin_processor_new_with_config(
    config_json: *const c_char,
) -> *mut FrameProcessorHandle {
    clear_last_error();

    let json_str = match cstr_to_string(config_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid config string pointer");
            return ptr::null_mut();
        }
    };

    let processor = match PipelineConfig::from_json(&json_str)
        .and_then(|config| FrameProcessor::with_config(&config))
    {
        Ok(processor) => processor,
        Err(e) => {
            set_last_error(&e.to_string());
            return ptr::null_mut();
        }
    };

    Box::into_raw(Box::new(FrameProcessorHandle { processor }))
}

/// Free a FrameProcessor.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `checkin_processor_new*`.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn checkin_processor_free(processor: *mut FrameProcessorHandle) {
    if !processor.is_null() {
        drop(Box::from_raw(processor));
    }
}

/// Push one landmark frame through the processor.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `checkin_processor_new*`.
/// - `frame_json` must be a valid null-terminated C string.
/// - Returns a newly allocated JSON array of `{"metric", "score"}` updates,
///   or the string `null` when the frame was skipped. Free it with
///   `checkin_free_string`.
/// - Returns NULL on error; call `checkin_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn checkin_processor_push_frame(
    processor: *mut FrameProcessorHandle,
    frame_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }

    let handle = &mut *processor;

    let json_str = match cstr_to_string(frame_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid JSON string pointer");
            return ptr::null_mut();
        }
    };

    match handle.processor.process_json(&json_str) {
        Ok(Some(updates)) => string_to_cstr(&updates),
        Ok(None) => string_to_cstr("null"),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Forget all session memory held by the processor.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `checkin_processor_new*`.
/// - Returns 0 on success, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn checkin_processor_reset(processor: *mut FrameProcessorHandle) -> i32 {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return -1;
    }

    (*processor).processor.reset();
    0
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by checkin functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a checkin function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn checkin_free_string(ptr: *mut c_char) {
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
/// - The returned pointer is valid until the next checkin function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn checkin_last_error() -> *const c_char {
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
pub unsafe extern "C" fn checkin_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
