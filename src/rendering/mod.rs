// 렌더링 파이프라인 모듈
// 라벨 래스터화 + 라이브 프리뷰 루프

pub mod draw;
pub mod frame_queue;
pub mod preview_loop;
pub mod renderer;

pub use frame_queue::{FrameQueue, PreviewFrame};
pub use preview_loop::{preview_angle, PreviewLoop};
pub use renderer::{FrameRenderer, LabelRenderer, RasterFrame};
