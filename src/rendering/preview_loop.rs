//! PreviewLoop - 라이브 프리뷰 백그라운드 렌더링
//!
//! 아키텍처:
//! - 렌더러(렌더링 surface)는 항상 한 곳만 소유: 프리뷰 스레드 또는 Export
//! - 백그라운드 스레드가 벽시계 기준 각도로 렌더링 → FrameQueue에 push
//! - C#은 queue에서 최신 프레임만 가져감
//! - stop()은 스레드를 join하고 렌더러를 돌려받음 (Export가 surface를 가져갈 수 있도록)

use crate::rendering::{FrameQueue, FrameRenderer, PreviewFrame};
use crate::timeline::ONE_ROTATION_RADIANS;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// 프리뷰 프레임 간격 (~60fps)
const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// 벽시계 기준 각도: `(2π * minutes * rpm) mod 2π`
pub fn preview_angle(elapsed: Duration, speed_rpm: f64) -> f64 {
    let minutes = elapsed.as_secs_f64() / 60.0;
    (ONE_ROTATION_RADIANS * minutes * speed_rpm).rem_euclid(ONE_ROTATION_RADIANS)
}

/// 라이브 프리뷰 루프
pub struct PreviewLoop<R: FrameRenderer + 'static> {
    /// 프레임 큐 (최신 몇 장만 유지)
    frame_queue: Arc<Mutex<FrameQueue>>,
    /// 백그라운드 렌더 스레드 (종료 시 렌더러 반환)
    fill_thread: Option<JoinHandle<R>>,
    /// 스레드 취소 플래그
    cancelled: Arc<AtomicBool>,
    /// 회전 속도 (f64 bits)
    speed_bits: Arc<AtomicU64>,
    /// 정지 상태에서 보관 중인 렌더러
    idle: Option<R>,
    /// take_surface() 시점에 재생 중이었는지
    resume_on_return: bool,
}

impl<R: FrameRenderer + 'static> PreviewLoop<R> {
    /// 정지 상태로 생성 (start() 호출 시 렌더링 시작)
    pub fn new(renderer: R, speed_rpm: f64) -> Self {
        Self {
            frame_queue: Arc::new(Mutex::new(FrameQueue::new())),
            fill_thread: None,
            cancelled: Arc::new(AtomicBool::new(false)),
            speed_bits: Arc::new(AtomicU64::new(speed_rpm.to_bits())),
            idle: Some(renderer),
            resume_on_return: false,
        }
    }

    /// 프리뷰 시작. 렌더러가 Export에 나가 있으면 false
    pub fn start(&mut self) -> bool {
        if self.fill_thread.is_some() {
            return true;
        }
        let renderer = match self.idle.take() {
            Some(r) => r,
            None => {
                log::warn!("[PREVIEW] 렌더러가 사용 중이라 시작할 수 없음");
                return false;
            }
        };

        self.cancelled.store(false, Ordering::SeqCst);
        if let Ok(mut queue) = self.frame_queue.lock() {
            queue.clear();
        }

        let queue = self.frame_queue.clone();
        let cancelled = self.cancelled.clone();
        let speed_bits = self.speed_bits.clone();

        let spawned = thread::Builder::new()
            .name("labelspin-preview".to_string())
            .spawn(move || Self::fill_loop(renderer, queue, cancelled, speed_bits));

        match spawned {
            Ok(handle) => {
                self.fill_thread = Some(handle);
                log::info!("[PREVIEW] 시작 ({} rpm)", self.speed_rpm());
                true
            }
            Err(e) => {
                // spawn 실패 시 클로저와 함께 렌더러도 drop됨
                log::error!("[PREVIEW] 스레드 생성 실패: {}", e);
                false
            }
        }
    }

    /// 프리뷰 정지 (스레드 join 후 렌더러 회수)
    pub fn stop(&mut self) {
        let handle = match self.fill_thread.take() {
            Some(h) => h,
            None => return,
        };

        self.cancelled.store(true, Ordering::SeqCst);
        match handle.join() {
            Ok(renderer) => self.idle = Some(renderer),
            Err(_) => log::error!("[PREVIEW] 렌더 스레드 패닉 - 렌더러 유실"),
        }

        if let Ok(mut queue) = self.frame_queue.lock() {
            queue.clear();
        }
        log::info!("[PREVIEW] 정지");
    }

    pub fn is_running(&self) -> bool {
        self.fill_thread.is_some()
    }

    /// Export용으로 렌더링 surface를 가져감 (프리뷰 정지)
    /// 다른 곳이 이미 가져갔으면 None
    pub fn take_surface(&mut self) -> Option<R> {
        let was_running = self.is_running();
        self.stop();
        let renderer = self.idle.take()?;
        self.resume_on_return = was_running;
        Some(renderer)
    }

    /// surface 반환 (가져갈 때 재생 중이었으면 프리뷰 재개)
    pub fn resume(&mut self, renderer: R) {
        self.idle = Some(renderer);
        if std::mem::take(&mut self.resume_on_return) {
            self.start();
        }
    }

    pub fn set_speed(&self, speed_rpm: f64) {
        self.speed_bits.store(speed_rpm.to_bits(), Ordering::SeqCst);
    }

    pub fn speed_rpm(&self) -> f64 {
        f64::from_bits(self.speed_bits.load(Ordering::SeqCst))
    }

    /// 가장 최근 프리뷰 프레임 (소비하지 않음)
    pub fn latest_frame(&self) -> Option<PreviewFrame> {
        self.frame_queue.lock().ok()?.latest()
    }

    /// 디버그: 큐 상태 조회
    pub fn queue_len(&self) -> usize {
        self.frame_queue.lock().ok().map_or(0, |q| q.len())
    }

    /// 정지 상태의 렌더러 접근 (스타일/아트워크 변경용)
    pub fn with_idle_renderer<T>(&mut self, f: impl FnOnce(&mut R) -> T) -> Option<T> {
        self.idle.as_mut().map(f)
    }

    /// 백그라운드 렌더 루프
    /// - 속도가 바뀌면 현재 각도를 기준점으로 다시 잡음 (각도 점프 없음)
    fn fill_loop(
        mut renderer: R,
        queue: Arc<Mutex<FrameQueue>>,
        cancelled: Arc<AtomicBool>,
        speed_bits: Arc<AtomicU64>,
    ) -> R {
        let mut base_instant = Instant::now();
        let mut base_angle = 0.0f64;
        let mut speed = f64::from_bits(speed_bits.load(Ordering::SeqCst));
        let mut sequence: u64 = 0;

        while !cancelled.load(Ordering::SeqCst) {
            let tick_start = Instant::now();

            let current = f64::from_bits(speed_bits.load(Ordering::SeqCst));
            if current.to_bits() != speed.to_bits() {
                base_angle = (base_angle + preview_angle(base_instant.elapsed(), speed))
                    .rem_euclid(ONE_ROTATION_RADIANS);
                base_instant = Instant::now();
                speed = current;
            }

            let angle = (base_angle + preview_angle(base_instant.elapsed(), speed))
                .rem_euclid(ONE_ROTATION_RADIANS);
            let frame = renderer.render_frame(angle);

            match queue.lock() {
                Ok(mut q) => q.push(PreviewFrame { sequence, angle, frame }),
                Err(_) => {
                    log::error!("[PREVIEW] QUEUE MUTEX POISONED");
                    break;
                }
            }
            sequence += 1;

            crate::debug_log!("[PREVIEW] frame #{} angle={:.4}", sequence, angle);

            if let Some(rest) = FRAME_INTERVAL.checked_sub(tick_start.elapsed()) {
                thread::sleep(rest);
            }
        }

        renderer
    }
}

impl<R: FrameRenderer + 'static> Drop for PreviewLoop<R> {
    fn drop(&mut self) {
        self.stop();
    }
}
