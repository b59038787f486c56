// Export 타임라인 - 회전 스케줄 + 종료 조건

pub mod scheduler;

pub use scheduler::{
    FramePlan, FrameTick, RotationScheduler, StopCondition, DEFAULT_ROTATIONS,
    ONE_ROTATION_RADIANS, ONE_SECOND_MICROSECONDS,
};
