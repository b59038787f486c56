// 인코딩 & 내보내기 모듈
// H.264 비디오 + AAC 오디오 → MP4 컨테이너 (메모리 버퍼)

pub mod audio_decoder;
pub mod audio_encoder;
pub mod backend;
pub mod encoder;
pub mod exporter;
pub mod h264;
pub mod mp4_writer;
pub mod muxer;

#[cfg(test)]
pub(crate) mod testing;

use std::fmt;

pub use audio_decoder::{decode_to_mono, AudioSource, PcmBuffer};
pub use audio_encoder::AudioEncodeAdapter;
pub use backend::{AudioCodec, AudioSettings, CodecBackend, DecodedAudio, VideoCodec, VideoSettings};
pub use encoder::VideoEncodeAdapter;
pub use exporter::{
    export_with_preview, run_export, CancelToken, ExportJob, ExportProgress, ExportStage,
};
pub use mp4_writer::Mp4ContainerWriter;
pub use muxer::{ContainerWriter, MuxSession, SealedContainer, TrackLayout};

/// 엘리멘터리 스트림 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Video,
    Audio,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Video => f.write_str("video"),
            TrackKind::Audio => f.write_str("audio"),
        }
    }
}

/// 인코더 출력 1개 (비디오 패킷 또는 오디오 패킷)
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedChunk {
    /// PTS (us, 스트림 내 비감소)
    pub timestamp_us: u64,
    pub duration_us: u64,
    pub is_key: bool,
    pub data: Vec<u8>,
    /// 코덱 설정 (H.264: SPS/PPS). 스트림의 첫 청크에만 실림
    pub decoder_config: Option<Vec<u8>>,
}

impl fmt::Debug for EncodedChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedChunk")
            .field("timestamp_us", &self.timestamp_us)
            .field("duration_us", &self.duration_us)
            .field("is_key", &self.is_key)
            .field("bytes", &self.data.len())
            .field("decoder_config", &self.decoder_config.as_ref().map(Vec::len))
            .finish()
    }
}

/// 트랙 태그가 붙은 청크 (인코더 워커 → 오케스트레이터 채널)
#[derive(Debug, Clone)]
pub struct TrackChunk {
    pub track: TrackKind,
    pub chunk: EncodedChunk,
}

/// flush() 완료 증명
///
/// 어댑터의 flush()만 만들 수 있음 → MuxSession::finalize()는 이 영수증 없이 호출 불가
#[derive(Debug, PartialEq, Eq)]
pub struct FlushReceipt {
    track: TrackKind,
    chunks_emitted: u64,
}

impl FlushReceipt {
    pub(crate) fn new(track: TrackKind, chunks_emitted: u64) -> Self {
        Self { track, chunks_emitted }
    }

    pub fn track(&self) -> TrackKind {
        self.track
    }

    /// 인코더가 내보낸 전체 청크 수
    pub fn chunks_emitted(&self) -> u64 {
        self.chunks_emitted
    }
}
