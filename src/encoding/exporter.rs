// Export 작업 관리 - 오케스트레이터, 백그라운드 스레드, 진행률, 취소
// 흐름: 검증 → 오디오 디코딩 → 프레임 수 확정 → 오디오 인코딩 → 프레임 렌더/인코딩 → flush → 봉인

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crate::config::ExportRequest;
use crate::encoding::{
    decode_to_mono, AudioEncodeAdapter, AudioSettings, CodecBackend, MuxSession, PcmBuffer,
    SealedContainer, TrackChunk, TrackLayout, VideoEncodeAdapter, VideoSettings,
};
use crate::error::{ExportError, ExportResult};
use crate::rendering::{FrameRenderer, PreviewLoop};
use crate::timeline::{FramePlan, StopCondition};

/// 진행 로그 간격 (프레임)
const PROGRESS_LOG_INTERVAL: u64 = 300;

// ============================================================
// 취소 / 진행률
// ============================================================

/// 협조적 취소 토큰 (프레임마다 1회 확인)
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Export 단계
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStage {
    DecodingAudio,
    EncodingAudio,
    RenderingVideo,
    Flushing,
    Finalizing,
    Done,
}

/// 진행 상황 스냅샷
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportProgress {
    pub stage: ExportStage,
    pub frames_rendered: u64,
    pub total_frames: u64,
}

impl ExportProgress {
    /// 0~100 (완료 전에는 최대 99)
    pub fn percent(&self) -> u32 {
        if self.stage == ExportStage::Done {
            return 100;
        }
        if self.total_frames == 0 {
            return 0;
        }
        (self.frames_rendered * 100 / self.total_frames).min(99) as u32
    }
}

// ============================================================
// 오케스트레이터
// ============================================================

/// 종료 조건 → 확정 프레임 수 (렌더 루프 전에 1회)
/// 회전 수 지정 + 오디오가 있으면 오디오를 비디오 길이로 자름
fn resolve_plan(request: &ExportRequest, pcm: Option<&mut PcmBuffer>) -> FramePlan {
    match (request.stop, pcm) {
        (StopCondition::RotationCount(n), pcm) => {
            let plan = FramePlan::for_rotations(request.speed_rpm, request.fps, n);
            if let Some(pcm) = pcm {
                pcm.truncate_to_us(plan.duration_us());
            }
            plan
        }
        (StopCondition::AudioDuration, Some(pcm)) => {
            FramePlan::for_samples(request.speed_rpm, request.fps, pcm.len() as u64, pcm.sample_rate)
        }
        (StopCondition::AudioDuration, None) => FramePlan::for_seconds(
            request.speed_rpm,
            request.fps,
            FramePlan::default_duration_secs(request.speed_rpm),
        ),
    }
}

/// 인코더 출력 채널에 쌓인 청크를 먹서로 전달
fn drain_chunks(rx: &Receiver<TrackChunk>, mux: &mut MuxSession) -> ExportResult<()> {
    for chunk in rx.try_iter() {
        mux.add_chunk(chunk)?;
    }
    Ok(())
}

/// Export 1회 실행 → 봉인된 MP4 버퍼
///
/// - 렌더러는 캔버스 크기로 설정 후, 끝나면 원래 크기로 복원
/// - 어떤 에러든 부분 출력 없이 종료
pub fn run_export(
    request: &ExportRequest,
    renderer: &mut dyn FrameRenderer,
    backend: Arc<dyn CodecBackend>,
    cancel: &CancelToken,
    progress: &mut dyn FnMut(ExportProgress),
) -> ExportResult<SealedContainer> {
    // 1. 인코더 생성 전에 요청 검증
    request.validate()?;

    // 2. 오디오 디코딩 (비디오 인코더보다 먼저 - 길이가 프레임 수를 결정)
    let mut pcm = match &request.audio {
        Some(source) => {
            progress(ExportProgress {
                stage: ExportStage::DecodingAudio,
                frames_rendered: 0,
                total_frames: 0,
            });
            Some(decode_to_mono(source, backend.as_ref())?)
        }
        None => None,
    };

    // 3. 프레임 수 확정
    let plan = resolve_plan(request, pcm.as_mut());
    let total_frames = plan.total_frames();
    if total_frames == 0 {
        return Err(ExportError::configuration("export would contain no frames"));
    }

    log::info!(
        "[EXPORT] 시작: {}x{} @ {}fps, {} rpm, 총 프레임: {} ({:.3}s, audio={})",
        request.canvas_width,
        request.canvas_height,
        request.fps,
        request.speed_rpm,
        total_frames,
        plan.duration_us() as f64 / 1_000_000.0,
        pcm.is_some()
    );

    // 4. 먹서 생성
    let video_settings = VideoSettings::from_request(request);
    let audio_settings = pcm.as_ref().map(|_| AudioSettings::from_profile(&request.profile));
    let mut mux = MuxSession::new(TrackLayout {
        video: video_settings,
        audio: audio_settings,
    })?;
    let (chunk_tx, chunk_rx) = mpsc::channel::<TrackChunk>();

    // 5. 오디오 인코딩 (전체 버퍼 1회 제출 → flush 대기)
    let audio_receipt = match (pcm, audio_settings) {
        (Some(pcm), Some(settings)) => {
            if cancel.is_cancelled() {
                return Err(ExportError::Cancelled { frames_rendered: 0 });
            }
            progress(ExportProgress {
                stage: ExportStage::EncodingAudio,
                frames_rendered: 0,
                total_frames,
            });
            let mut audio = AudioEncodeAdapter::configure(backend.clone(), settings, chunk_tx.clone())?;
            audio.encode(pcm)?;
            let receipt = audio.flush()?;
            drain_chunks(&chunk_rx, &mut mux)?;
            Some(receipt)
        }
        _ => None,
    };

    // 6. 비디오: 렌더 → 인코딩 (렌더러 크기는 끝나면 복원)
    let previous_size = renderer.dimensions();
    renderer.configure(request.canvas_width, request.canvas_height);
    let video = (|| -> ExportResult<_> {
        let mut video = VideoEncodeAdapter::configure(backend, video_settings, chunk_tx)?;

        for tick in plan.frames() {
            if cancel.is_cancelled() {
                log::info!("[EXPORT] 취소됨 (frame {}/{})", tick.index, total_frames);
                return Err(ExportError::Cancelled {
                    frames_rendered: tick.index,
                });
            }

            // 프레임 소유권은 인코더로 이동 (다음 렌더와 버퍼 공유 없음)
            let frame = renderer.render_frame(tick.angle);
            video.encode(frame, tick.timestamp_us)?;
            drain_chunks(&chunk_rx, &mut mux)?;

            let rendered = tick.index + 1;
            progress(ExportProgress {
                stage: ExportStage::RenderingVideo,
                frames_rendered: rendered,
                total_frames,
            });
            if rendered % PROGRESS_LOG_INTERVAL == 0 {
                log::info!("[EXPORT] 진행: {}/{}", rendered, total_frames);
            }
        }

        // 7. flush 배리어: 모든 프레임이 청크가 될 때까지 대기
        progress(ExportProgress {
            stage: ExportStage::Flushing,
            frames_rendered: total_frames,
            total_frames,
        });
        let receipt = video.flush()?;
        drain_chunks(&chunk_rx, &mut mux)?;
        Ok(receipt)
    })();
    renderer.configure(previous_size.0, previous_size.1);
    let video_receipt = video?;

    // 8. 봉인 (두 flush 영수증 필요)
    progress(ExportProgress {
        stage: ExportStage::Finalizing,
        frames_rendered: total_frames,
        total_frames,
    });
    let sealed = mux.finalize(video_receipt, audio_receipt)?;

    progress(ExportProgress {
        stage: ExportStage::Done,
        frames_rendered: total_frames,
        total_frames,
    });
    log::info!("[EXPORT] 완료: {} bytes, {} frames", sealed.len(), total_frames);
    Ok(sealed)
}

fn lock_preview<R: FrameRenderer + 'static>(
    preview: &Mutex<PreviewLoop<R>>,
) -> MutexGuard<'_, PreviewLoop<R>> {
    preview.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 프리뷰의 렌더링 surface를 빌려서 Export
/// 성공/실패와 무관하게 surface 반환 + (재생 중이었으면) 프리뷰 재개
pub fn export_with_preview<R: FrameRenderer + 'static>(
    preview: &Mutex<PreviewLoop<R>>,
    request: &ExportRequest,
    backend: Arc<dyn CodecBackend>,
    cancel: &CancelToken,
    progress: &mut dyn FnMut(ExportProgress),
) -> ExportResult<SealedContainer> {
    let mut surface = lock_preview(preview)
        .take_surface()
        .ok_or_else(|| ExportError::render("rendering surface is already in use"))?;

    let result = run_export(request, &mut surface, backend, cancel, progress);

    lock_preview(preview).resume(surface);
    result
}

// ============================================================
// 백그라운드 작업
// ============================================================

/// Export 작업 핸들 (C#에서 폴링으로 상태 확인)
pub struct ExportJob {
    /// 진행률 (0~100)
    progress: Arc<AtomicU32>,
    /// 취소 토큰
    cancel: CancelToken,
    /// 완료 플래그
    finished: Arc<AtomicBool>,
    /// 에러 메시지 (있으면 실패)
    error: Arc<Mutex<Option<String>>>,
    /// 완성된 MP4 (take_output()으로 한 번만 가져감)
    output: Arc<Mutex<Option<SealedContainer>>>,
    thread: Option<JoinHandle<()>>,
}

impl ExportJob {
    /// Export 시작 (백그라운드 스레드에서 실행)
    pub fn start<R: FrameRenderer + 'static>(
        preview: Arc<Mutex<PreviewLoop<R>>>,
        request: ExportRequest,
        backend: Arc<dyn CodecBackend>,
    ) -> Self {
        let progress = Arc::new(AtomicU32::new(0));
        let cancel = CancelToken::new();
        let finished = Arc::new(AtomicBool::new(false));
        let error: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
        let output: Arc<Mutex<Option<SealedContainer>>> = Arc::new(Mutex::new(None));

        let p = progress.clone();
        let c = cancel.clone();
        let f = finished.clone();
        let e = error.clone();
        let o = output.clone();

        let spawned = thread::Builder::new()
            .name("labelspin-export".to_string())
            .spawn(move || {
                let mut report = |snapshot: ExportProgress| p.store(snapshot.percent(), Ordering::SeqCst);
                match export_with_preview(&preview, &request, backend, &c, &mut report) {
                    Ok(sealed) => {
                        p.store(100, Ordering::SeqCst);
                        if let Ok(mut out) = o.lock() {
                            *out = Some(sealed);
                        }
                    }
                    Err(err) => {
                        if err.is_cancelled() {
                            log::info!("[EXPORT] {}", err);
                        } else {
                            log::error!("[EXPORT] 에러: {}", err);
                        }
                        if let Ok(mut slot) = e.lock() {
                            *slot = Some(err.to_string());
                        }
                    }
                }
                f.store(true, Ordering::SeqCst);
            });

        let thread = match spawned {
            Ok(handle) => Some(handle),
            Err(err) => {
                log::error!("[EXPORT] 스레드 생성 실패: {}", err);
                if let Ok(mut slot) = error.lock() {
                    *slot = Some(format!("failed to spawn export thread: {}", err));
                }
                finished.store(true, Ordering::SeqCst);
                None
            }
        };

        Self {
            progress,
            cancel,
            finished,
            error,
            output,
            thread,
        }
    }

    /// 진행률 가져오기 (0~100)
    pub fn get_progress(&self) -> u32 {
        self.progress.load(Ordering::SeqCst)
    }

    /// 취소 요청
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// 완료 여부
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// 에러 메시지 가져오기 (None이면 성공 또는 진행 중)
    pub fn get_error(&self) -> Option<String> {
        self.error.lock().ok().and_then(|e| e.clone())
    }

    /// 완성된 MP4 가져가기 (성공 후 1회)
    pub fn take_output(&self) -> Option<SealedContainer> {
        self.output.lock().ok().and_then(|mut o| o.take())
    }
}

impl Drop for ExportJob {
    fn drop(&mut self) {
        // 진행 중이면 취소 후 스레드 종료 대기 (surface 반환 보장)
        self.cancel.cancel();
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}
