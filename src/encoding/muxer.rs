// 컨테이너 먹서 - 비디오 1 + 오디오 0/1 트랙 → 봉인된 바이너리 버퍼
// 상태: Open (청크 수신) → Finalized (종료, 재호출 에러)

use crate::encoding::{
    AudioSettings, EncodedChunk, FlushReceipt, Mp4ContainerWriter, TrackChunk, TrackKind,
    VideoSettings,
};
use crate::error::MuxError;

/// 실제 컨테이너 포맷 기록기
///
/// 트랙별 청크는 타임스탬프 순으로만 들어옴 (MuxSession이 보장)
pub trait ContainerWriter: Send {
    fn write_chunk(&mut self, track: TrackKind, chunk: EncodedChunk) -> Result<(), MuxError>;

    /// 남은 데이터 기록 후 완성된 파일 바이트 반환
    fn finish(self: Box<Self>) -> Result<Vec<u8>, MuxError>;
}

/// 트랙 구성 (생성 시 고정)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackLayout {
    pub video: VideoSettings,
    pub audio: Option<AudioSettings>,
}

/// 완성된 컨테이너 (다운로드용 버퍼)
#[derive(Clone, PartialEq, Eq)]
pub struct SealedContainer {
    bytes: Vec<u8>,
    video_chunks: u64,
    audio_chunks: u64,
}

impl SealedContainer {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn video_chunks(&self) -> u64 {
        self.video_chunks
    }

    pub fn audio_chunks(&self) -> u64 {
        self.audio_chunks
    }
}

impl std::fmt::Debug for SealedContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealedContainer")
            .field("bytes", &self.bytes.len())
            .field("video_chunks", &self.video_chunks)
            .field("audio_chunks", &self.audio_chunks)
            .finish()
    }
}

/// 트랙별 수신 상태
#[derive(Debug, Default)]
struct TrackState {
    last_timestamp_us: Option<u64>,
    muxed: u64,
}

impl TrackState {
    fn accept(&mut self, track: TrackKind, timestamp_us: u64) -> Result<(), MuxError> {
        if let Some(previous_us) = self.last_timestamp_us {
            if timestamp_us < previous_us {
                return Err(MuxError::OutOfOrder {
                    track,
                    timestamp_us,
                    previous_us,
                });
            }
        }
        self.last_timestamp_us = Some(timestamp_us);
        self.muxed += 1;
        Ok(())
    }

    fn check_complete(&self, track: TrackKind, receipt: &FlushReceipt) -> Result<(), MuxError> {
        if self.muxed != receipt.chunks_emitted() {
            return Err(MuxError::IncompleteTrack {
                track,
                muxed: self.muxed,
                emitted: receipt.chunks_emitted(),
            });
        }
        Ok(())
    }
}

/// 먹싱 세션 (Export 1회)
pub struct MuxSession {
    layout: TrackLayout,
    /// None = Finalized
    writer: Option<Box<dyn ContainerWriter>>,
    video: TrackState,
    audio: Option<TrackState>,
}

impl MuxSession {
    /// MP4 (메모리) 세션 생성
    pub fn new(layout: TrackLayout) -> Result<Self, MuxError> {
        let writer = Mp4ContainerWriter::new(layout)?;
        Ok(Self::with_writer(layout, Box::new(writer)))
    }

    pub fn with_writer(layout: TrackLayout, writer: Box<dyn ContainerWriter>) -> Self {
        Self {
            layout,
            writer: Some(writer),
            video: TrackState::default(),
            audio: layout.audio.map(|_| TrackState::default()),
        }
    }

    pub fn layout(&self) -> &TrackLayout {
        &self.layout
    }

    pub fn is_finalized(&self) -> bool {
        self.writer.is_none()
    }

    /// 트랙별 수신한 청크 수
    pub fn muxed(&self, track: TrackKind) -> u64 {
        match track {
            TrackKind::Video => self.video.muxed,
            TrackKind::Audio => self.audio.as_ref().map_or(0, |a| a.muxed),
        }
    }

    /// 청크 1개 추가 (트랙 간 순서 무관, 트랙 내 비감소 타임스탬프)
    pub fn add_chunk(&mut self, chunk: TrackChunk) -> Result<(), MuxError> {
        let writer = self.writer.as_mut().ok_or(MuxError::AlreadyFinalized)?;
        let TrackChunk { track, chunk } = chunk;

        let state = match track {
            TrackKind::Video => &mut self.video,
            TrackKind::Audio => self.audio.as_mut().ok_or(MuxError::UnknownTrack(track))?,
        };
        state.accept(track, chunk.timestamp_us)?;
        writer.write_chunk(track, chunk)
    }

    /// 컨테이너 봉인 (1회만)
    ///
    /// flush 영수증이 있어야 호출 가능하고, 영수증의 청크 수가 모두 먹싱되어 있어야 함
    pub fn finalize(
        &mut self,
        video: FlushReceipt,
        audio: Option<FlushReceipt>,
    ) -> Result<SealedContainer, MuxError> {
        if self.writer.is_none() {
            return Err(MuxError::AlreadyFinalized);
        }

        if video.track() != TrackKind::Video {
            return Err(MuxError::NotFlushed(TrackKind::Video));
        }
        self.video.check_complete(TrackKind::Video, &video)?;

        match (&self.audio, &audio) {
            (Some(state), Some(receipt)) if receipt.track() == TrackKind::Audio => {
                state.check_complete(TrackKind::Audio, receipt)?;
            }
            (Some(_), _) => return Err(MuxError::NotFlushed(TrackKind::Audio)),
            (None, Some(_)) => return Err(MuxError::UnknownTrack(TrackKind::Audio)),
            (None, None) => {}
        }

        let writer = self.writer.take().ok_or(MuxError::AlreadyFinalized)?;
        let bytes = writer.finish()?;
        let sealed = SealedContainer {
            bytes,
            video_chunks: self.video.muxed,
            audio_chunks: self.audio.as_ref().map_or(0, |a| a.muxed),
        };
        log::info!(
            "[MUX] finalize: {} bytes (video {} chunks, audio {} chunks)",
            sealed.len(),
            sealed.video_chunks,
            sealed.audio_chunks
        );
        Ok(sealed)
    }
}
