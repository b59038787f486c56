// 코덱 백엔드 인터페이스 - 디코딩/인코딩 구현체 교체 지점
// FFmpeg 백엔드(기본)와 테스트 스텁이 같은 계약을 구현

use crate::config::{EncoderProfile, ExportRequest};
use crate::encoding::EncodedChunk;
use crate::error::{DecodeError, EncodeError};
use crate::rendering::RasterFrame;

/// 비디오 인코더 설정 (Export 1회 동안 고정)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub bitrate: u32,
    /// 키프레임 간격 (프레임 수)
    pub keyframe_interval: u32,
}

impl VideoSettings {
    pub fn from_request(request: &ExportRequest) -> Self {
        Self {
            width: request.canvas_width,
            height: request.canvas_height,
            fps: request.fps,
            bitrate: request.profile.video_bitrate,
            keyframe_interval: request
                .fps
                .saturating_mul(request.profile.keyframe_interval_secs)
                .max(1),
        }
    }
}

/// 오디오 인코더 설정 (Export 1회 동안 고정)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSettings {
    pub sample_rate: u32,
    pub channels: u16,
    pub bitrate: u32,
}

impl AudioSettings {
    pub fn from_profile(profile: &EncoderProfile) -> Self {
        Self {
            sample_rate: profile.audio_sample_rate,
            channels: profile.audio_channels,
            bitrate: profile.audio_bitrate,
        }
    }
}

/// 디코딩 결과 (채널별 planar f32, 요청한 샘플레이트로 리샘플 완료)
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub sample_rate: u32,
    pub channels: Vec<Vec<f32>>,
}

/// 열린 비디오 인코더 1개
///
/// 반환되는 청크는 제출 순서를 유지해야 함 (B-frame 없음)
pub trait VideoCodec {
    fn encode(&mut self, frame: &RasterFrame, timestamp_us: u64) -> Result<Vec<EncodedChunk>, EncodeError>;

    /// 내부 버퍼 비우기. 이후 청크 없음
    fn finish(&mut self) -> Result<Vec<EncodedChunk>, EncodeError>;
}

/// 열린 오디오 인코더 1개 (mono f32 입력)
pub trait AudioCodec {
    fn encode(&mut self, samples: &[f32]) -> Result<Vec<EncodedChunk>, EncodeError>;

    fn finish(&mut self) -> Result<Vec<EncodedChunk>, EncodeError>;
}

/// 코덱 백엔드
///
/// 코덱 인스턴스는 인코더 워커 스레드 안에서 열림 → `VideoCodec`/`AudioCodec`은 Send 불필요
pub trait CodecBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn decode_audio(&self, bytes: &[u8], sample_rate: u32) -> Result<DecodedAudio, DecodeError>;

    fn open_video(&self, settings: &VideoSettings) -> Result<Box<dyn VideoCodec>, EncodeError>;

    fn open_audio(&self, settings: &AudioSettings) -> Result<Box<dyn AudioCodec>, EncodeError>;
}
