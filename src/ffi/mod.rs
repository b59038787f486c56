// FFI 모듈 - C# P/Invoke 진입점
// 핸들은 raw pointer (c_void), 반환값은 ErrorCode (i32)

pub mod exporter;
pub mod renderer;
pub mod types;

use std::ffi::{c_char, CString};

pub use exporter::*;
pub use renderer::*;
pub use types::ErrorCode;

/// 로거 초기화 (앱 시작 시 1회, 중복 호출 무시)
#[no_mangle]
pub extern "C" fn engine_init_logging() -> i32 {
    crate::logging::init();
    ErrorCode::Success as i32
}

/// 엔진이 할당한 문자열 해제 (exporter_get_error 등)
#[no_mangle]
pub extern "C" fn engine_string_free(ptr: *mut c_char) {
    if !ptr.is_null() {
        unsafe {
            let _ = CString::from_raw(ptr);
        }
    }
}

/// 엔진이 할당한 바이트 버퍼 해제 (프레임 데이터, MP4 출력)
#[no_mangle]
pub extern "C" fn engine_buffer_free(data: *mut u8, size: usize) -> i32 {
    if data.is_null() {
        return ErrorCode::NullPointer as i32;
    }

    unsafe {
        let slice = std::slice::from_raw_parts_mut(data, size);
        let _ = Box::from_raw(slice as *mut [u8]);
    }

    ErrorCode::Success as i32
}

/// Vec<u8> → (ptr, len), engine_buffer_free()로 해제
pub(crate) fn into_raw_buffer(data: Vec<u8>) -> (*mut u8, usize) {
    let len = data.len();
    let boxed = data.into_boxed_slice();
    (Box::into_raw(boxed) as *mut u8, len)
}

/// 에러 메시지 → C 문자열 (NUL 포함 시 null)
pub(crate) fn into_raw_string(message: String) -> *mut c_char {
    match CString::new(message) {
        Ok(c_str) => c_str.into_raw(),
        Err(_) => std::ptr::null_mut(),
    }
}
