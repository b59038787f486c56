// 회전/길이 스케줄러
// RPM + fps → (각도, 타임스탬프) 시퀀스 (벽시계 시간과 무관, 결정적)

use std::f64::consts::TAU;
use std::iter::FusedIterator;

/// 1회전 (라디안)
pub const ONE_ROTATION_RADIANS: f64 = TAU;
pub const ONE_SECOND_MICROSECONDS: u64 = 1_000_000;

/// 오디오가 없을 때 기본 회전 수
pub const DEFAULT_ROTATIONS: u32 = 3;

/// 프레임 생성 종료 조건
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCondition {
    /// 누적 회전이 `n * 2π`에 도달하면 종료
    RotationCount(u32),
    /// 경과 시간이 디코딩된 오디오 길이에 도달하면 종료
    /// (오디오 없으면 [`DEFAULT_ROTATIONS`]회전 분량)
    AudioDuration,
}

/// 종료 조건 → 확정된 유한 프레임 수
///
/// 렌더 루프 시작 전에 한 번 계산. 루프 안에서는 종료 조건을 보지 않음
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FramePlan {
    speed_rpm: f64,
    fps: u32,
    total_frames: u64,
}

impl FramePlan {
    /// `rotations`회전 후 종료
    pub fn for_rotations(speed_rpm: f64, fps: u32, rotations: u32) -> Self {
        let seconds = f64::from(rotations) * 60.0 / speed_rpm;
        Self::for_seconds(speed_rpm, fps, seconds)
    }

    /// `seconds`초 분량 생성 후 종료
    pub fn for_seconds(speed_rpm: f64, fps: u32, seconds: f64) -> Self {
        Self {
            speed_rpm,
            fps,
            total_frames: frames_for_seconds(seconds, fps),
        }
    }

    /// `sample_rate`의 `samples`개 오디오 길이에 맞춘 계획
    ///
    /// 정수 연산: `i / fps < samples / rate` 인 동안 프레임 `i` 생성
    pub fn for_samples(speed_rpm: f64, fps: u32, samples: u64, sample_rate: u32) -> Self {
        let rate = u128::from(sample_rate.max(1));
        let total = (u128::from(samples) * u128::from(fps) + rate - 1) / rate;
        Self {
            speed_rpm,
            fps,
            total_frames: total as u64,
        }
    }

    /// 3회전 분량 시간: `(60 / rpm) * 3`
    pub fn default_duration_secs(speed_rpm: f64) -> f64 {
        (60.0 / speed_rpm) * f64::from(DEFAULT_ROTATIONS)
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn speed_rpm(&self) -> f64 {
        self.speed_rpm
    }

    /// 프레임당 회전량: `(rpm / 60) * 2π / fps`
    pub fn radians_per_frame(&self) -> f64 {
        (self.speed_rpm / 60.0) * ONE_ROTATION_RADIANS / f64::from(self.fps)
    }

    /// 프레임 `index`의 각도 (`[0, 2π)`)
    ///
    /// 누적이 아닌 인덱스로 계산 (긴 Export에서도 오차 누적 없음)
    pub fn angle_at(&self, index: u64) -> f64 {
        let angle = (index as f64 * self.radians_per_frame()).rem_euclid(ONE_ROTATION_RADIANS);
        // 1회전 직전 값은 rem_euclid 결과가 정확히 2π로 반올림될 수 있음
        if angle >= ONE_ROTATION_RADIANS {
            0.0
        } else {
            angle
        }
    }

    /// 프레임 `index`의 PTS: `index * 1_000_000 / fps`
    pub fn timestamp_at(&self, index: u64) -> u64 {
        let us = u128::from(index) * u128::from(ONE_SECOND_MICROSECONDS) / u128::from(self.fps);
        us as u64
    }

    /// 비디오 길이 (us, 마지막 프레임 끝)
    pub fn duration_us(&self) -> u64 {
        self.timestamp_at(self.total_frames)
    }

    /// 전체 프레임 생성 후 누적 회전량
    pub fn final_rotation(&self) -> f64 {
        self.total_frames as f64 * self.radians_per_frame()
    }

    /// 프레임 시퀀스로 변환
    pub fn frames(self) -> RotationScheduler {
        RotationScheduler {
            plan: self,
            next: 0,
        }
    }
}

/// `ceil(seconds * fps)` - 경계값의 부동소수 오차 허용
/// (예: `1 * 60 / 10 * 30` → 181이 아니라 180)
fn frames_for_seconds(seconds: f64, fps: u32) -> u64 {
    if !seconds.is_finite() || seconds <= 0.0 {
        return 0;
    }
    let exact = seconds * f64::from(fps);
    let nearest = exact.round();
    if (exact - nearest).abs() < 1e-6 {
        nearest as u64
    } else {
        exact.ceil() as u64
    }
}

/// 생성된 프레임 슬롯
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTick {
    pub index: u64,
    /// 라디안 `[0, 2π)`
    pub angle: f64,
    pub timestamp_us: u64,
}

/// 유한 + 순서 보장 + 재시작 불가 프레임 시퀀스
#[derive(Debug)]
pub struct RotationScheduler {
    plan: FramePlan,
    next: u64,
}

impl RotationScheduler {
    pub fn plan(&self) -> &FramePlan {
        &self.plan
    }

    /// 지금까지 내보낸 프레임의 누적 회전량
    pub fn cumulative_rotation(&self) -> f64 {
        self.next as f64 * self.plan.radians_per_frame()
    }
}

impl Iterator for RotationScheduler {
    type Item = FrameTick;

    fn next(&mut self) -> Option<FrameTick> {
        if self.next >= self.plan.total_frames {
            return None;
        }
        let index = self.next;
        self.next += 1;
        Some(FrameTick {
            index,
            angle: self.plan.angle_at(index),
            timestamp_us: self.plan.timestamp_at(index),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.plan.total_frames - self.next) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for RotationScheduler {}
impl FusedIterator for RotationScheduler {}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn one_rotation_at_ten_rpm_is_180_frames() {
        let plan = FramePlan::for_rotations(10.0, 30, 1);
        assert_eq!(plan.total_frames(), 180);

        let mut frames = plan.frames();
        let last = frames.by_ref().last().unwrap();
        assert_eq!(last.index, 179);

        // 마지막 프레임 다음 슬롯 = 정확히 1회전
        let wrapped = frames.cumulative_rotation().rem_euclid(TAU);
        assert!(wrapped < 1e-9 || TAU - wrapped < 1e-9, "wrapped={wrapped}");
        assert!((plan.final_rotation() - TAU).abs() < 1e-9);
    }

    #[test]
    fn default_duration_is_three_rotations() {
        assert_eq!(FramePlan::default_duration_secs(20.0), 9.0);
        let plan = FramePlan::for_seconds(20.0, 24, FramePlan::default_duration_secs(20.0));
        assert_eq!(plan.total_frames(), 216);
    }

    #[test]
    fn sample_based_plan_rounds_up_partial_frames() {
        // 1.5초 @30fps = 정확히 45프레임
        assert_eq!(FramePlan::for_samples(33.0, 30, 66_150, 44_100).total_frames(), 45);
        // 샘플 1개 초과 → 프레임 1개 추가
        assert_eq!(FramePlan::for_samples(33.0, 30, 66_151, 44_100).total_frames(), 46);
        assert_eq!(FramePlan::for_samples(33.0, 30, 0, 44_100).total_frames(), 0);
    }

    #[test]
    fn timestamps_do_not_drift_over_long_exports() {
        let plan = FramePlan::for_seconds(45.0, 30, 3600.0);
        assert_eq!(plan.total_frames(), 108_000);
        assert_eq!(plan.timestamp_at(108_000), 3_600_000_000);
        assert_eq!(plan.timestamp_at(1), 33_333);
        assert_eq!(plan.timestamp_at(2), 66_666);
        assert_eq!(plan.timestamp_at(3), 100_000);
    }

    #[test]
    fn scheduler_reports_exact_length() {
        let frames = FramePlan::for_rotations(33.3, 25, 2).frames();
        let expected = frames.len();
        assert_eq!(frames.count(), expected);
    }

    #[test]
    fn zero_duration_yields_nothing() {
        let plan = FramePlan::for_seconds(10.0, 30, 0.0);
        assert_eq!(plan.frames().next(), None);
    }

    proptest! {
        #[test]
        fn frame_count_matches_rotation_formula(
            rpm in 1.0f64..120.0,
            fps in 1u32..120,
            n in 1u32..5,
        ) {
            let plan = FramePlan::for_rotations(rpm, fps, n);
            let expected = (f64::from(n) * 60.0 / rpm * f64::from(fps)).ceil();
            prop_assert!((plan.total_frames() as f64 - expected).abs() <= 1.0);
        }

        #[test]
        fn timestamps_are_evenly_spaced(rpm in 1.0f64..120.0, fps in 1u32..120) {
            let plan = FramePlan::for_rotations(rpm, fps, 1);
            let interval = 1_000_000.0 / f64::from(fps);
            let ticks: Vec<FrameTick> = plan.frames().take(500).collect();
            for pair in ticks.windows(2) {
                prop_assert!(pair[1].timestamp_us >= pair[0].timestamp_us);
                let gap = (pair[1].timestamp_us - pair[0].timestamp_us) as f64;
                prop_assert!((gap - interval).abs() <= 1.0);
            }
        }

        #[test]
        fn angles_follow_closed_form(rpm in 1.0f64..120.0, fps in 1u32..120) {
            let plan = FramePlan::for_rotations(rpm, fps, 2);
            for tick in plan.frames().take(300) {
                prop_assert!(tick.angle >= 0.0 && tick.angle < TAU);
                let expected = (tick.index as f64 * rpm / 60.0 * TAU / f64::from(fps)).rem_euclid(TAU);
                let diff = (tick.angle - expected).abs();
                prop_assert!(diff < 1e-9 || (TAU - diff) < 1e-9);
            }
        }
    }
}
