// FFmpeg 코덱 백엔드
// 오디오 디코딩 (libavformat) + H.264 (libx264) + AAC-LC 인코딩

pub mod audio;
pub mod decoder;
pub mod video;

use std::sync::OnceLock;

use ffmpeg_next as ffmpeg;

use crate::encoding::{
    AudioCodec, AudioSettings, CodecBackend, DecodedAudio, VideoCodec, VideoSettings,
};
use crate::error::{DecodeError, EncodeError};

pub use audio::AacCodec;
pub use decoder::decode_audio_bytes;
pub use video::H264Codec;

static INIT: OnceLock<Result<(), String>> = OnceLock::new();

/// FFmpeg 전역 초기화 (프로세스당 1회)
pub fn ensure_initialized() -> Result<(), String> {
    INIT.get_or_init(|| {
        ffmpeg::init().map_err(|e| format!("FFmpeg init failed: {}", e))?;
        // 코덱 내부 경고가 stderr로 새지 않게
        ffmpeg::util::log::set_level(ffmpeg::util::log::Level::Error);
        log::info!("[FFMPEG] 초기화 완료");
        Ok(())
    })
    .clone()
}

/// 기본 코덱 백엔드
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegBackend;

impl FfmpegBackend {
    pub fn new() -> Self {
        Self
    }

    /// 링크된 FFmpeg에 H.264 인코더가 있는지
    pub fn has_h264_encoder() -> bool {
        ensure_initialized().is_ok() && video::find_h264_encoder().is_some()
    }
}

impl CodecBackend for FfmpegBackend {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    fn decode_audio(&self, bytes: &[u8], sample_rate: u32) -> Result<DecodedAudio, DecodeError> {
        decode_audio_bytes(bytes, sample_rate)
    }

    fn open_video(&self, settings: &VideoSettings) -> Result<Box<dyn VideoCodec>, EncodeError> {
        Ok(Box::new(H264Codec::open(settings)?))
    }

    fn open_audio(&self, settings: &AudioSettings) -> Result<Box<dyn AudioCodec>, EncodeError> {
        Ok(Box::new(AacCodec::open(settings)?))
    }
}
