// 프리뷰 FFI - C# 연동
// 핸들 = Arc<Mutex<PreviewLoop<LabelRenderer>>> (Export 작업과 공유)

use std::ffi::{c_char, c_void, CStr};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::LabelStyle;
use crate::ffi::into_raw_buffer;
use crate::ffi::types::ErrorCode;
use crate::rendering::{LabelRenderer, PreviewLoop};

pub(crate) type PreviewHandle = Mutex<PreviewLoop<LabelRenderer>>;

/// 핸들 → 잠긴 프리뷰 (poison이면 복구)
pub(crate) unsafe fn lock_handle<'a>(preview: *mut c_void) -> MutexGuard<'a, PreviewLoop<LabelRenderer>> {
    let preview_mutex = &*(preview as *const PreviewHandle);
    match preview_mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("[PREVIEW] Mutex poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

/// 핸들에서 Arc 복제 (원본 소유권은 C#이 유지)
pub(crate) unsafe fn clone_handle(preview: *mut c_void) -> Arc<PreviewHandle> {
    let preview_arc = Arc::from_raw(preview as *const PreviewHandle);
    let preview_clone = Arc::clone(&preview_arc);
    let _ = Arc::into_raw(preview_arc);
    preview_clone
}

/// nullable JSON → LabelStyle (null이면 기본값)
unsafe fn parse_style(style_json: *const c_char) -> Result<LabelStyle, ErrorCode> {
    if style_json.is_null() {
        return Ok(LabelStyle::default());
    }
    let json = CStr::from_ptr(style_json)
        .to_str()
        .map_err(|_| ErrorCode::InvalidParam)?;
    LabelStyle::from_json(json).map_err(|e| {
        log::error!("[PREVIEW] 스타일 파싱 실패: {}", e);
        ErrorCode::from(&e)
    })
}

/// 프리뷰 생성 (정지 상태)
/// artwork: PNG/JPEG 바이트, style_json: LabelStyle JSON (null = 기본값)
#[no_mangle]
pub extern "C" fn preview_create(
    artwork: *const u8,
    artwork_len: usize,
    style_json: *const c_char,
    width: u32,
    height: u32,
    speed_rpm: f64,
    out_preview: *mut *mut c_void,
) -> i32 {
    if artwork.is_null() || out_preview.is_null() {
        return ErrorCode::NullPointer as i32;
    }
    if !speed_rpm.is_finite() || speed_rpm <= 0.0 {
        return ErrorCode::InvalidParam as i32;
    }

    unsafe {
        let style = match parse_style(style_json) {
            Ok(style) => style,
            Err(code) => return code as i32,
        };
        let bytes = std::slice::from_raw_parts(artwork, artwork_len);
        let renderer = match LabelRenderer::from_encoded(bytes, style, width, height) {
            Ok(r) => r,
            Err(e) => {
                log::error!("[PREVIEW] 렌더러 생성 실패: {}", e);
                return ErrorCode::from(&e) as i32;
            }
        };

        let preview = Arc::new(Mutex::new(PreviewLoop::new(renderer, speed_rpm)));
        *out_preview = Arc::into_raw(preview) as *mut c_void;
    }

    ErrorCode::Success as i32
}

/// 프리뷰 파괴 (렌더 스레드 정지)
/// 진행 중인 Export가 있으면 Export 쪽 Arc가 끝날 때 해제됨
#[no_mangle]
pub extern "C" fn preview_destroy(preview: *mut c_void) -> i32 {
    if preview.is_null() {
        return ErrorCode::NullPointer as i32;
    }

    unsafe {
        lock_handle(preview).stop();
        let _ = Arc::from_raw(preview as *const PreviewHandle);
    }

    ErrorCode::Success as i32
}

/// 프리뷰 재생 시작
/// 반환: Busy = Export가 렌더링 surface 사용 중
#[no_mangle]
pub extern "C" fn preview_start(preview: *mut c_void) -> i32 {
    if preview.is_null() {
        return ErrorCode::NullPointer as i32;
    }

    unsafe {
        if lock_handle(preview).start() {
            ErrorCode::Success as i32
        } else {
            ErrorCode::Busy as i32
        }
    }
}

/// 프리뷰 정지
#[no_mangle]
pub extern "C" fn preview_stop(preview: *mut c_void) -> i32 {
    if preview.is_null() {
        return ErrorCode::NullPointer as i32;
    }

    unsafe {
        lock_handle(preview).stop();
    }

    ErrorCode::Success as i32
}

/// 회전 속도 변경 (재생 중에도 가능, 각도 점프 없음)
#[no_mangle]
pub extern "C" fn preview_set_speed(preview: *mut c_void, speed_rpm: f64) -> i32 {
    if preview.is_null() {
        return ErrorCode::NullPointer as i32;
    }
    if !speed_rpm.is_finite() || speed_rpm <= 0.0 {
        return ErrorCode::InvalidParam as i32;
    }

    unsafe {
        lock_handle(preview).set_speed(speed_rpm);
    }

    ErrorCode::Success as i32
}

/// 라벨 스타일 변경 (재생 중이면 잠시 정지 후 재개)
#[no_mangle]
pub extern "C" fn preview_set_style(preview: *mut c_void, style_json: *const c_char) -> i32 {
    if preview.is_null() || style_json.is_null() {
        return ErrorCode::NullPointer as i32;
    }

    unsafe {
        let style = match parse_style(style_json) {
            Ok(style) => style,
            Err(code) => return code as i32,
        };

        let mut guard = lock_handle(preview);
        let Some(mut renderer) = guard.take_surface() else {
            return ErrorCode::Busy as i32;
        };
        let result = renderer.set_style(style);
        guard.resume(renderer);

        match result {
            Ok(()) => ErrorCode::Success as i32,
            Err(e) => {
                log::error!("[PREVIEW] 스타일 적용 실패: {}", e);
                ErrorCode::from(&e) as i32
            }
        }
    }
}

/// 최신 프리뷰 프레임 복사 (RGBA)
/// 아직 프레임이 없으면 out_data = null, Success
/// 반환된 데이터는 engine_buffer_free()로 해제
#[no_mangle]
pub extern "C" fn preview_latest_frame(
    preview: *mut c_void,
    out_width: *mut u32,
    out_height: *mut u32,
    out_angle: *mut f64,
    out_data: *mut *mut u8,
    out_data_size: *mut usize,
) -> i32 {
    if preview.is_null() || out_width.is_null() || out_height.is_null()
        || out_angle.is_null() || out_data.is_null() || out_data_size.is_null() {
        return ErrorCode::NullPointer as i32;
    }

    unsafe {
        match lock_handle(preview).latest_frame() {
            Some(latest) => {
                *out_width = latest.frame.width;
                *out_height = latest.frame.height;
                *out_angle = latest.angle;
                let (ptr, len) = into_raw_buffer(latest.frame.data);
                *out_data = ptr;
                *out_data_size = len;
            }
            None => {
                *out_width = 0;
                *out_height = 0;
                *out_angle = 0.0;
                *out_data = std::ptr::null_mut();
                *out_data_size = 0;
            }
        }
    }

    ErrorCode::Success as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::engine_buffer_free;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;
    use std::time::{Duration, Instant};

    fn png_artwork() -> Vec<u8> {
        let img = RgbaImage::from_pixel(8, 8, Rgba([200, 40, 40, 255]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn preview_lifecycle_through_c_abi() {
        let art = png_artwork();
        let mut handle: *mut c_void = std::ptr::null_mut();
        let code = preview_create(art.as_ptr(), art.len(), std::ptr::null(), 32, 32, 33.0, &mut handle);
        assert_eq!(code, ErrorCode::Success as i32);
        assert!(!handle.is_null());

        assert_eq!(preview_start(handle), ErrorCode::Success as i32);
        assert_eq!(preview_set_speed(handle, 45.0), ErrorCode::Success as i32);
        assert_eq!(preview_set_speed(handle, -1.0), ErrorCode::InvalidParam as i32);

        let (mut w, mut h, mut angle) = (0u32, 0u32, 0f64);
        let mut data: *mut u8 = std::ptr::null_mut();
        let mut size = 0usize;
        let deadline = Instant::now() + Duration::from_secs(5);
        while data.is_null() && Instant::now() < deadline {
            preview_latest_frame(handle, &mut w, &mut h, &mut angle, &mut data, &mut size);
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(!data.is_null());
        assert_eq!((w, h, size), (32, 32, 32 * 32 * 4));
        assert_eq!(engine_buffer_free(data, size), ErrorCode::Success as i32);

        let style = std::ffi::CString::new(r##"{"background_color": "#ffffff"}"##).unwrap();
        assert_eq!(preview_set_style(handle, style.as_ptr()), ErrorCode::Success as i32);
        let bad = std::ffi::CString::new(r##"{"background_color": "white"}"##).unwrap();
        assert_eq!(preview_set_style(handle, bad.as_ptr()), ErrorCode::InvalidParam as i32);

        assert_eq!(preview_stop(handle), ErrorCode::Success as i32);
        assert_eq!(preview_destroy(handle), ErrorCode::Success as i32);
    }

    #[test]
    fn rejects_null_and_bad_input() {
        let mut handle: *mut c_void = std::ptr::null_mut();
        assert_eq!(
            preview_create(std::ptr::null(), 0, std::ptr::null(), 32, 32, 33.0, &mut handle),
            ErrorCode::NullPointer as i32
        );
        let junk = [1u8, 2, 3];
        assert_ne!(
            preview_create(junk.as_ptr(), junk.len(), std::ptr::null(), 32, 32, 33.0, &mut handle),
            ErrorCode::Success as i32
        );
        assert!(handle.is_null());
        assert_eq!(preview_start(std::ptr::null_mut()), ErrorCode::NullPointer as i32);
    }
}
