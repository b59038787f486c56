// LabelSpin 렌더링 엔진
// 회전 라벨 프리뷰 + 오프라인 H.264/AAC MP4 Export

/// 디버그 로그 매크로 - `cargo build --features debug_log` 시에만 출력
/// 평소 릴리스 빌드에서는 컴파일 자체에서 제외됨
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        #[cfg(feature = "debug_log")]
        log::debug!($($arg)*);
    };
}

pub mod config;
pub mod encoding;
pub mod error;
pub mod ffi;
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;
pub mod logging;
pub mod rendering;
pub mod timeline;

pub use config::{ExportConfig, ExportRequest, LabelStyle};
pub use encoding::{
    export_with_preview, run_export, CancelToken, CodecBackend, ExportJob, ExportProgress,
    ExportStage, SealedContainer,
};
pub use error::{ExportError, ExportResult};
pub use rendering::{FrameRenderer, LabelRenderer, PreviewLoop};
pub use timeline::{FramePlan, StopCondition};

// FFI 함수들을 최상위에서 재export
pub use ffi::*;
