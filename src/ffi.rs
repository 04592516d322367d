//! FFI bindings for Pagepulse
//!
//! C-compatible functions for replaying recorded sessions from other languages.
//! All functions take null-terminated C strings and return allocated memory that
//! must be freed by the caller using `pulse_free_string`.
//!
//! Sink calls are returned as a JSON array of wire triples
//! (`["event", "scroll_depth", {...}]`).

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::config::{Environment, TrackingConfig};
use crate::error::TrackError;
use crate::replay::{replay_session, ReplayProcessor};
use crate::sink::SinkCall;

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

unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Convert a Rust string to a C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

fn calls_to_json_array(calls: &[SinkCall]) -> String {
    let wire: Vec<serde_json::Value> = calls.iter().map(SinkCall::to_wire).collect();
    serde_json::Value::Array(wire).to_string()
}

/// Parse the config and environment documents shared by every entry point
unsafe fn read_setup(
    config_json: *const c_char,
    environment_json: *const c_char,
) -> Result<(TrackingConfig, Environment), String> {
    let config_str = cstr_to_string(config_json).ok_or("Invalid config string pointer")?;
    let env_str = cstr_to_string(environment_json).ok_or("Invalid environment string pointer")?;

    let config = TrackingConfig::from_json(&config_str).map_err(|e| e.to_string())?;
    let environment: Environment = serde_json::from_str(&env_str)
        .map_err(|e| TrackError::InvalidConfig(format!("environment: {}", e)).to_string())?;
    Ok((config, environment))
}

fn calls_result(result: Result<Vec<SinkCall>, TrackError>) -> *mut c_char {
    match result {
        Ok(calls) => string_to_cstr(&calls_to_json_array(&calls)),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Stateless API
// ============================================================================

/// Replay a recorded session (NDJSON or JSON array) and return the sink calls.
///
/// # Safety
/// - `records`, `config_json`, and `environment_json` must be valid null-terminated C strings.
/// - Returns a newly allocated string that must be freed with `pulse_free_string`.
/// - Returns NULL on error; call `pulse_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn pulse_replay_session(
    records: *const c_char,
    config_json: *const c_char,
    environment_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let records_str = match cstr_to_string(records) {
        Some(s) => s,
        None => {
            set_last_error("Invalid records string pointer");
            return ptr::null_mut();
        }
    };

    let (config, environment) = match read_setup(config_json, environment_json) {
        Ok(setup) => setup,
        Err(msg) => {
            set_last_error(&msg);
            return ptr::null_mut();
        }
    };

    calls_result(replay_session(&records_str, &config, &environment))
}

// ============================================================================
// Stateful Processor API
// ============================================================================

/// Opaque handle to a ReplayProcessor
pub struct PulseProcessorHandle {
    processor: ReplayProcessor,
}

/// Create a replay processor.
///
/// # Safety
/// - `config_json` and `environment_json` must be valid null-terminated C strings.
/// - Must be released with `pulse_processor_finish` or `pulse_processor_free`.
/// - Returns NULL on error.
#[no_mangle]
pub unsafe extern "C" fn pulse_processor_new(
    config_json: *const c_char,
    environment_json: *const c_char,
) -> *mut PulseProcessorHandle {
    clear_last_error();

    match read_setup(config_json, environment_json) {
        Ok((config, environment)) => Box::into_raw(Box::new(PulseProcessorHandle {
            processor: ReplayProcessor::new(config, environment),
        })),
        Err(msg) => {
            set_last_error(&msg);
            ptr::null_mut()
        }
    }
}

/// Free a processor without collecting its final calls.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `pulse_processor_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn pulse_processor_free(processor: *mut PulseProcessorHandle) {
    if !processor.is_null() {
        drop(Box::from_raw(processor));
    }
}

/// Feed records to a processor and return the sink calls they produced.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `pulse_processor_new`.
/// - `records` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `pulse_free_string`.
/// - Returns NULL on error; call `pulse_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn pulse_processor_process(
    processor: *mut PulseProcessorHandle,
    records: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }

    let handle = &mut *processor;

    let records_str = match cstr_to_string(records) {
        Some(s) => s,
        None => {
            set_last_error("Invalid records string pointer");
            return ptr::null_mut();
        }
    };

    calls_result(handle.processor.process_json(&records_str))
}

/// End the session, free the processor and return the final sink calls.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `pulse_processor_new`.
/// - After calling this function, the pointer is invalid.
/// - Returns a newly allocated string that must be freed with `pulse_free_string`.
#[no_mangle]
pub unsafe extern "C" fn pulse_processor_finish(processor: *mut PulseProcessorHandle) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }

    let handle = Box::from_raw(processor);
    string_to_cstr(&calls_to_json_array(&handle.processor.finish()))
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by Pagepulse functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a Pagepulse function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn pulse_free_string(ptr: *mut c_char) {
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
/// - The returned pointer is valid until the next Pagepulse function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn pulse_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the Pagepulse library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn pulse_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    fn records() -> CString {
        CString::new(
            r#"{"at":"2024-01-15T14:00:00Z","type":"navigation","path":"/contact"}
{"at":"2024-01-15T14:00:03Z","type":"form_view","form":"contact"}
{"at":"2024-01-15T14:00:40Z","type":"form_success","form":"contact","response_time_ms":240.0}"#,
        )
        .unwrap()
    }

    fn config() -> CString {
        CString::new(r#"{"tracking_id":"G-TEST"}"#).unwrap()
    }

    fn environment() -> CString {
        CString::new(r#"{"hostname":"example.dev","timezone":"Asia/Tokyo"}"#).unwrap()
    }

    #[test]
    fn test_ffi_replay_session() {
        let (records, config, environment) = (records(), config(), environment());
        unsafe {
            let result = pulse_replay_session(records.as_ptr(), config.as_ptr(), environment.as_ptr());
            assert!(!result.is_null());

            let result_str = CStr::from_ptr(result).to_str().unwrap();
            let calls: Vec<serde_json::Value> = serde_json::from_str(result_str).unwrap();
            assert_eq!(calls[0][0], "js");
            assert!(result_str.contains("contact_form_success"));
            assert!(result_str.contains("asia_pacific"));

            pulse_free_string(result);
        }
    }

    #[test]
    fn test_ffi_processor_lifecycle() {
        let (records, config, environment) = (records(), config(), environment());
        unsafe {
            let processor = pulse_processor_new(config.as_ptr(), environment.as_ptr());
            assert!(!processor.is_null());

            let result = pulse_processor_process(processor, records.as_ptr());
            assert!(!result.is_null());
            pulse_free_string(result);

            let tail = pulse_processor_finish(processor);
            assert!(!tail.is_null());
            assert_eq!(CStr::from_ptr(tail).to_str().unwrap(), "[]");
            pulse_free_string(tail);

            let other = pulse_processor_new(config.as_ptr(), environment.as_ptr());
            pulse_processor_free(other);
        }
    }

    #[test]
    fn test_ffi_error_handling() {
        let (config, environment) = (config(), environment());
        unsafe {
            let invalid = CString::new("not json").unwrap();
            let result = pulse_replay_session(invalid.as_ptr(), config.as_ptr(), environment.as_ptr());
            assert!(result.is_null());

            let error = pulse_last_error();
            assert!(!error.is_null());
            let error_str = CStr::from_ptr(error).to_str().unwrap();
            assert!(error_str.contains("line 1"));

            let bad_env = CString::new("{}").unwrap();
            let processor = pulse_processor_new(config.as_ptr(), bad_env.as_ptr());
            assert!(processor.is_null());
        }
    }

    #[test]
    fn test_ffi_version() {
        unsafe {
            let version = pulse_version();
            assert!(!version.is_null());

            let version_str = CStr::from_ptr(version).to_str().unwrap();
            assert_eq!(version_str, env!("CARGO_PKG_VERSION"));
        }
    }
}
