// FFI 공용 타입 - C# P/Invoke와 값이 일치해야 함

use crate::error::ExportError;

/// FFI 반환 코드
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Success = 0,
    NullPointer = 1,
    InvalidParam = 2,
    /// 렌더링 surface를 다른 곳(Export)이 사용 중
    Busy = 3,
    DecodeFailed = 4,
    EncodeFailed = 5,
    MuxFailed = 6,
    RenderFailed = 7,
    Cancelled = 8,
    /// FFmpeg 없이 빌드됨
    Unsupported = 9,
}

impl From<&ExportError> for ErrorCode {
    fn from(err: &ExportError) -> Self {
        match err {
            ExportError::Configuration(_) => ErrorCode::InvalidParam,
            ExportError::Decode(_) => ErrorCode::DecodeFailed,
            ExportError::Encode(_) => ErrorCode::EncodeFailed,
            ExportError::Mux(_) => ErrorCode::MuxFailed,
            ExportError::Render(_) => ErrorCode::RenderFailed,
            ExportError::Cancelled { .. } => ErrorCode::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeError;

    #[test]
    fn export_errors_map_to_codes() {
        assert_eq!(ErrorCode::from(&ExportError::configuration("fps")), ErrorCode::InvalidParam);
        assert_eq!(ErrorCode::from(&ExportError::Decode(DecodeError::Empty)), ErrorCode::DecodeFailed);
        assert_eq!(
            ErrorCode::from(&ExportError::Cancelled { frames_rendered: 3 }) as i32,
            8
        );
    }
}
