// Export 에러 분류 - 디코딩 / 인코딩 / 먹싱 / 설정 / 취소
// 모든 variant는 진행 중인 Export를 종료시킴 (재시도 없음, 부분 출력 없음)

use crate::encoding::TrackKind;

/// 오디오 소스 → PCM 디코딩 실패
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("audio source is empty")]
    Empty,

    #[error("unrecognized audio format: {0}")]
    Unrecognized(String),

    #[error("no audio stream found in source")]
    NoAudioStream,

    #[error("audio source decoded to zero samples")]
    NoSamples,

    #[error("audio decode failed: {0}")]
    Codec(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// 비디오/오디오 인코더 실패
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("{0} encoder is not available")]
    CodecUnavailable(&'static str),

    #[error("failed to configure {track} encoder: {message}")]
    Configure { track: TrackKind, message: String },

    #[error("{track} encoder failed: {message}")]
    Codec { track: TrackKind, message: String },

    #[error("frame size mismatch: got {got_width}x{got_height}, expected {width}x{height}")]
    FrameSize {
        got_width: u32,
        got_height: u32,
        width: u32,
        height: u32,
    },

    #[error("{track} timestamp went backwards: {timestamp_us}us after {previous_us}us")]
    TimestampOrder {
        track: TrackKind,
        timestamp_us: u64,
        previous_us: u64,
    },

    #[error("{0} encoder accepts a single buffer")]
    AlreadySubmitted(TrackKind),

    #[error("{0} encoder worker stopped unexpectedly")]
    WorkerLost(TrackKind),
}

impl EncodeError {
    pub fn codec(track: TrackKind, message: impl Into<String>) -> Self {
        Self::Codec {
            track,
            message: message.into(),
        }
    }

    pub fn configure(track: TrackKind, message: impl Into<String>) -> Self {
        Self::Configure {
            track,
            message: message.into(),
        }
    }
}

/// 컨테이너 먹서 오용 또는 쓰기 실패
#[derive(Debug, thiserror::Error)]
pub enum MuxError {
    #[error("container is already finalized")]
    AlreadyFinalized,

    #[error("no {0} track in this container")]
    UnknownTrack(TrackKind),

    #[error("{track} chunk at {timestamp_us}us arrived after {previous_us}us")]
    OutOfOrder {
        track: TrackKind,
        timestamp_us: u64,
        previous_us: u64,
    },

    #[error("{0} track has not been flushed")]
    NotFlushed(TrackKind),

    #[error("{track} track is incomplete: muxed {muxed} of {emitted} chunks")]
    IncompleteTrack {
        track: TrackKind,
        muxed: u64,
        emitted: u64,
    },

    #[error("first video chunk carries no decoder configuration")]
    MissingDecoderConfig,

    #[error("invalid decoder configuration: {0}")]
    InvalidDecoderConfig(String),

    #[error("unsupported track parameters: {0}")]
    Unsupported(String),

    #[error("container write failed: {0}")]
    Write(String),
}

impl From<mp4::Error> for MuxError {
    fn from(err: mp4::Error) -> Self {
        Self::Write(err.to_string())
    }
}

/// 호출자에게 전달되는 최상위 Export 에러
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("invalid export configuration: {0}")]
    Configuration(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Mux(#[from] MuxError),

    #[error("render failed: {0}")]
    Render(String),

    #[error("export cancelled after {frames_rendered} frames")]
    Cancelled { frames_rendered: u64 },
}

impl ExportError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

impl From<serde_json::Error> for ExportError {
    fn from(err: serde_json::Error) -> Self {
        Self::Configuration(err.to_string())
    }
}

pub type ExportResult<T> = Result<T, ExportError>;
