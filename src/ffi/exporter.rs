// Exporter FFI - C# P/Invoke 연동
// Export 작업 생성/진행률/취소/결과/파괴

use std::ffi::{c_char, c_void, CStr};
use std::sync::Arc;

use crate::config::ExportConfig;
use crate::encoding::{AudioSource, CodecBackend, ExportJob};
use crate::ffi::renderer::clone_handle;
use crate::ffi::types::ErrorCode;
use crate::ffi::{into_raw_buffer, into_raw_string};

#[cfg(feature = "ffmpeg")]
fn default_backend() -> Option<Arc<dyn CodecBackend>> {
    Some(Arc::new(crate::ffmpeg::FfmpegBackend::new()))
}

#[cfg(not(feature = "ffmpeg"))]
fn default_backend() -> Option<Arc<dyn CodecBackend>> {
    None
}

/// Export 시작 (백그라운드 스레드에서 실행)
/// preview: preview_create()로 만든 핸들 (Export 동안 렌더링 surface를 빌려감)
/// config_json: ExportConfig JSON (null = 기본값)
/// audio/audio_len: 인코딩된 오디오 바이트 (null = 오디오 없음)
/// out_job: ExportJob 핸들 반환
#[no_mangle]
pub extern "C" fn exporter_start(
    preview: *mut c_void,
    config_json: *const c_char,
    audio: *const u8,
    audio_len: usize,
    width: u32,
    height: u32,
    out_job: *mut *mut c_void,
) -> i32 {
    if preview.is_null() || out_job.is_null() {
        return ErrorCode::NullPointer as i32;
    }

    unsafe {
        let config = if config_json.is_null() {
            ExportConfig::default()
        } else {
            let json = match CStr::from_ptr(config_json).to_str() {
                Ok(s) => s,
                Err(_) => return ErrorCode::InvalidParam as i32,
            };
            match ExportConfig::from_json(json) {
                Ok(config) => config,
                Err(e) => {
                    log::error!("[EXPORT] 설정 파싱 실패: {}", e);
                    return ErrorCode::from(&e) as i32;
                }
            }
        };

        // 호출 후 C# 버퍼가 해제될 수 있으므로 복사
        let audio = (!audio.is_null() && audio_len > 0)
            .then(|| AudioSource::new(std::slice::from_raw_parts(audio, audio_len).to_vec()));

        let request = config.to_request(width, height, audio);
        if let Err(e) = request.validate() {
            log::error!("[EXPORT] 잘못된 요청: {}", e);
            return ErrorCode::from(&e) as i32;
        }

        let Some(backend) = default_backend() else {
            log::error!("[EXPORT] FFmpeg 없이 빌드됨 - Export 불가");
            return ErrorCode::Unsupported as i32;
        };
        let job = ExportJob::start(clone_handle(preview), request, backend);
        *out_job = Box::into_raw(Box::new(job)) as *mut c_void;
    }

    ErrorCode::Success as i32
}

/// Export 진행률 가져오기 (0~100)
#[no_mangle]
pub extern "C" fn exporter_get_progress(job: *mut c_void) -> u32 {
    if job.is_null() {
        return 0;
    }

    unsafe {
        let job_ref = &*(job as *const ExportJob);
        job_ref.get_progress()
    }
}

/// Export 완료 여부 확인
/// 반환: 1=완료, 0=진행중
#[no_mangle]
pub extern "C" fn exporter_is_finished(job: *mut c_void) -> i32 {
    if job.is_null() {
        return 1; // null이면 완료로 처리
    }

    unsafe {
        let job_ref = &*(job as *const ExportJob);
        if job_ref.is_finished() { 1 } else { 0 }
    }
}

/// Export 에러 메시지 가져오기
/// out_error: 에러 문자열 포인터 (없으면 null)
/// 반환 후 engine_string_free()로 해제 필요
#[no_mangle]
pub extern "C" fn exporter_get_error(job: *mut c_void, out_error: *mut *mut c_char) -> i32 {
    if job.is_null() || out_error.is_null() {
        return ErrorCode::NullPointer as i32;
    }

    unsafe {
        let job_ref = &*(job as *const ExportJob);
        *out_error = match job_ref.get_error() {
            Some(msg) => into_raw_string(msg),
            None => std::ptr::null_mut(),
        };
    }

    ErrorCode::Success as i32
}

/// Export 취소 (다음 프레임 경계에서 중단)
#[no_mangle]
pub extern "C" fn exporter_cancel(job: *mut c_void) -> i32 {
    if job.is_null() {
        return ErrorCode::NullPointer as i32;
    }

    unsafe {
        let job_ref = &*(job as *const ExportJob);
        job_ref.cancel();
    }

    ErrorCode::Success as i32
}

/// 완성된 MP4 바이트 가져가기 (성공 후 1회)
/// 반환된 데이터는 engine_buffer_free()로 해제
#[no_mangle]
pub extern "C" fn exporter_take_output(
    job: *mut c_void,
    out_data: *mut *mut u8,
    out_data_size: *mut usize,
) -> i32 {
    if job.is_null() || out_data.is_null() || out_data_size.is_null() {
        return ErrorCode::NullPointer as i32;
    }

    unsafe {
        let job_ref = &*(job as *const ExportJob);
        match job_ref.take_output() {
            Some(sealed) => {
                let (ptr, len) = into_raw_buffer(sealed.into_bytes());
                *out_data = ptr;
                *out_data_size = len;
                ErrorCode::Success as i32
            }
            None => {
                *out_data = std::ptr::null_mut();
                *out_data_size = 0;
                ErrorCode::InvalidParam as i32
            }
        }
    }
}

/// ExportJob 파괴 (진행 중이면 취소 후 종료 대기)
#[no_mangle]
pub extern "C" fn exporter_destroy(job: *mut c_void) -> i32 {
    if job.is_null() {
        return ErrorCode::NullPointer as i32;
    }

    unsafe {
        let _ = Box::from_raw(job as *mut ExportJob);
    }

    ErrorCode::Success as i32
}
