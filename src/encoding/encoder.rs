// 비디오 인코드 어댑터 - RasterFrame + PTS → H.264 청크
// 코덱은 전용 워커 스레드에서 실행, 프레임은 bounded 채널로 소유권 이전

use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::encoding::{
    CodecBackend, EncodedChunk, FlushReceipt, TrackChunk, TrackKind, VideoCodec, VideoSettings,
};
use crate::error::EncodeError;
use crate::rendering::RasterFrame;

/// 워커에 쌓일 수 있는 최대 프레임 수 (초과 시 encode()가 대기)
const VIDEO_QUEUE_DEPTH: usize = 4;

// ============================================================
// 인코더 워커 (비디오/오디오 공용)
// ============================================================

/// 코덱 1개를 소유한 워커 스레드
///
/// - 코덱은 스레드 안에서 생성 → 스레드 밖으로 나가지 않음
/// - 입력 채널이 닫히면 finish 단계 실행 후 종료
/// - 결과: 내보낸 청크 수
pub(crate) struct EncoderWorker<I: Send + 'static> {
    track: TrackKind,
    input: Option<SyncSender<I>>,
    handle: Option<JoinHandle<Result<u64, EncodeError>>>,
}

impl<I: Send + 'static> EncoderWorker<I> {
    /// 워커 시작. 코덱 생성이 끝날 때까지 대기 후 반환
    /// `step(state, None)` = finish
    pub(crate) fn spawn<S, Setup, Step>(
        track: TrackKind,
        depth: usize,
        setup: Setup,
        mut step: Step,
        output: Sender<TrackChunk>,
    ) -> Result<Self, EncodeError>
    where
        S: 'static,
        Setup: FnOnce() -> Result<S, EncodeError> + Send + 'static,
        Step: FnMut(&mut S, Option<I>) -> Result<Vec<EncodedChunk>, EncodeError> + Send + 'static,
    {
        let (input_tx, input_rx): (SyncSender<I>, Receiver<I>) = mpsc::sync_channel(depth.max(1));
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(), EncodeError>>(1);

        let handle = thread::Builder::new()
            .name(format!("labelspin-{}-encoder", track))
            .spawn(move || {
                let mut state = match setup() {
                    Ok(state) => {
                        let _ = ready_tx.send(Ok(()));
                        state
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return Ok(0);
                    }
                };

                let mut emitted: u64 = 0;
                let mut emit = |chunks: Vec<EncodedChunk>| -> Result<(), EncodeError> {
                    for chunk in chunks {
                        output
                            .send(TrackChunk { track, chunk })
                            .map_err(|_| EncodeError::WorkerLost(track))?;
                        emitted += 1;
                    }
                    Ok(())
                };

                while let Ok(item) = input_rx.recv() {
                    emit(step(&mut state, Some(item))?)?;
                }
                emit(step(&mut state, None)?)?;

                Ok(emitted)
            })
            .map_err(|e| EncodeError::configure(track, format!("failed to spawn worker: {}", e)))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                track,
                input: Some(input_tx),
                handle: Some(handle),
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(EncodeError::WorkerLost(track))
            }
        }
    }

    /// 입력 1개 전달 (큐가 가득 차면 대기)
    /// 워커가 이미 종료됐으면 워커의 에러 반환
    pub(crate) fn submit(&mut self, item: I) -> Result<(), EncodeError> {
        let sent = match self.input.as_ref() {
            Some(input) => input.send(item).is_ok(),
            None => false,
        };
        if sent {
            Ok(())
        } else {
            Err(self.join_error())
        }
    }

    /// 입력 채널 닫기 → finish 완료까지 대기
    pub(crate) fn finish(mut self) -> Result<u64, EncodeError> {
        self.input = None;
        match self.handle.take().map(JoinHandle::join) {
            Some(Ok(result)) => result,
            _ => Err(EncodeError::WorkerLost(self.track)),
        }
    }

    fn join_error(&mut self) -> EncodeError {
        self.input = None;
        match self.handle.take().map(JoinHandle::join) {
            Some(Ok(Err(e))) => e,
            _ => EncodeError::WorkerLost(self.track),
        }
    }
}

impl<I: Send + 'static> Drop for EncoderWorker<I> {
    fn drop(&mut self) {
        self.input = None;
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

// ============================================================
// 비디오 어댑터
// ============================================================

/// 비디오 인코드 어댑터
///
/// configure → encode* → flush 순서 강제. flush()가 self를 소비하므로 flush 이후 encode 불가
pub struct VideoEncodeAdapter {
    settings: VideoSettings,
    worker: EncoderWorker<(RasterFrame, u64)>,
    last_timestamp_us: Option<u64>,
    submitted: u64,
}

impl VideoEncodeAdapter {
    /// 인코더 생성 + 설정 (해상도/비트레이트는 이후 변경 불가)
    /// 청크는 `output`으로 전달됨
    pub fn configure(
        backend: Arc<dyn CodecBackend>,
        settings: VideoSettings,
        output: Sender<TrackChunk>,
    ) -> Result<Self, EncodeError> {
        if settings.width == 0 || settings.height == 0 || settings.fps == 0 {
            return Err(EncodeError::configure(
                TrackKind::Video,
                format!(
                    "invalid video settings {}x{} @ {}fps",
                    settings.width, settings.height, settings.fps
                ),
            ));
        }

        let backend_name = backend.name();
        let worker = EncoderWorker::spawn(
            TrackKind::Video,
            VIDEO_QUEUE_DEPTH,
            move || backend.open_video(&settings),
            |codec: &mut Box<dyn VideoCodec>, input: Option<(RasterFrame, u64)>| match input {
                Some((frame, timestamp_us)) => codec.encode(&frame, timestamp_us),
                None => codec.finish(),
            },
            output,
        )?;

        log::info!(
            "[ENCODE] 비디오 인코더 준비: {}x{} @ {}fps, {} bps, GOP={} ({})",
            settings.width,
            settings.height,
            settings.fps,
            settings.bitrate,
            settings.keyframe_interval,
            backend_name
        );

        Ok(Self {
            settings,
            worker,
            last_timestamp_us: None,
            submitted: 0,
        })
    }

    /// 프레임 1장 제출 (프레임 소유권은 인코더로 이동)
    pub fn encode(&mut self, frame: RasterFrame, timestamp_us: u64) -> Result<(), EncodeError> {
        if frame.width != self.settings.width
            || frame.height != self.settings.height
            || !frame.is_well_formed()
        {
            return Err(EncodeError::FrameSize {
                got_width: frame.width,
                got_height: frame.height,
                width: self.settings.width,
                height: self.settings.height,
            });
        }
        if let Some(previous_us) = self.last_timestamp_us {
            if timestamp_us < previous_us {
                return Err(EncodeError::TimestampOrder {
                    track: TrackKind::Video,
                    timestamp_us,
                    previous_us,
                });
            }
        }

        self.worker.submit((frame, timestamp_us))?;
        self.last_timestamp_us = Some(timestamp_us);
        self.submitted += 1;

        crate::debug_log!("[ENCODE] video frame #{} @ {}us", self.submitted, timestamp_us);
        Ok(())
    }

    /// 제출된 모든 프레임이 청크로 나올 때까지 대기
    /// 반환 이후 이 인코더에서 청크가 더 나오지 않음
    pub fn flush(self) -> Result<FlushReceipt, EncodeError> {
        let submitted = self.submitted;
        let emitted = self.worker.finish()?;
        log::info!("[ENCODE] 비디오 flush 완료: {} frames → {} chunks", submitted, emitted);
        Ok(FlushReceipt::new(TrackKind::Video, emitted))
    }

    pub fn settings(&self) -> &VideoSettings {
        &self.settings
    }

    /// 지금까지 제출한 프레임 수
    pub fn submitted(&self) -> u64 {
        self.submitted
    }
}
