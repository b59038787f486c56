// Export / 라벨 설정
// C#에서 JSON 문자열 하나로 FFI 전달

use serde::{Deserialize, Serialize};

use crate::encoding::AudioSource;
use crate::error::{ExportError, ExportResult};
use crate::timeline::StopCondition;

pub const DEFAULT_VIDEO_BITRATE: u32 = 1_000_000;
pub const DEFAULT_AUDIO_BITRATE: u32 = 128_000;
pub const AUDIO_SAMPLE_RATE: u32 = 44_100;
/// Export 오디오는 항상 모노
pub const AUDIO_CHANNELS: u16 = 1;
pub const DEFAULT_FPS: u32 = 30;
pub const DEFAULT_SPEED_RPM: f64 = 33.0;
pub const DEFAULT_CANVAS_SIZE: u32 = 1080;

/// Export 설정 (C# UI에서 전달)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub speed_rpm: f64,
    pub fps: u32,
    /// `None` → 오디오 길이 기준 (오디오 없으면 3회전)
    pub rotations: Option<u32>,
    pub video_bitrate: u32,
    pub audio_bitrate: u32,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            speed_rpm: DEFAULT_SPEED_RPM,
            fps: DEFAULT_FPS,
            rotations: None,
            video_bitrate: DEFAULT_VIDEO_BITRATE,
            audio_bitrate: DEFAULT_AUDIO_BITRATE,
        }
    }
}

impl ExportConfig {
    pub fn from_json(json: &str) -> ExportResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn stop_condition(&self) -> StopCondition {
        match self.rotations {
            Some(n) => StopCondition::RotationCount(n),
            None => StopCondition::AudioDuration,
        }
    }

    /// Export 1회분 요청 생성 (시작 후 불변)
    pub fn to_request(
        &self,
        canvas_width: u32,
        canvas_height: u32,
        audio: Option<AudioSource>,
    ) -> ExportRequest {
        ExportRequest {
            speed_rpm: self.speed_rpm,
            fps: self.fps,
            stop: self.stop_condition(),
            audio,
            canvas_width,
            canvas_height,
            profile: EncoderProfile {
                video_bitrate: self.video_bitrate,
                audio_bitrate: self.audio_bitrate,
                ..EncoderProfile::default()
            },
        }
    }
}

/// 코덱 프로파일 (Export 도중 변경 불가)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderProfile {
    pub video_bitrate: u32,
    pub audio_bitrate: u32,
    pub audio_sample_rate: u32,
    pub audio_channels: u16,
    /// 키프레임 간격 (초)
    pub keyframe_interval_secs: u32,
}

impl Default for EncoderProfile {
    fn default() -> Self {
        Self {
            video_bitrate: DEFAULT_VIDEO_BITRATE,
            audio_bitrate: DEFAULT_AUDIO_BITRATE,
            audio_sample_rate: AUDIO_SAMPLE_RATE,
            audio_channels: AUDIO_CHANNELS,
            keyframe_interval_secs: 2,
        }
    }
}

/// Export 요청 - 시작 이후 불변
#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub speed_rpm: f64,
    pub fps: u32,
    pub stop: StopCondition,
    pub audio: Option<AudioSource>,
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub profile: EncoderProfile,
}

impl ExportRequest {
    pub fn new(speed_rpm: f64, fps: u32, stop: StopCondition, canvas_width: u32, canvas_height: u32) -> Self {
        Self {
            speed_rpm,
            fps,
            stop,
            audio: None,
            canvas_width,
            canvas_height,
            profile: EncoderProfile::default(),
        }
    }

    pub fn with_audio(mut self, audio: AudioSource) -> Self {
        self.audio = Some(audio);
        self
    }

    /// 인코더 생성 전에 잘못된 요청 거부
    pub fn validate(&self) -> ExportResult<()> {
        if !self.speed_rpm.is_finite() || self.speed_rpm <= 0.0 {
            return Err(ExportError::configuration(format!(
                "speed must be a positive number of rpm, got {}",
                self.speed_rpm
            )));
        }
        if self.fps == 0 {
            return Err(ExportError::configuration("fps must be greater than zero"));
        }
        if let StopCondition::RotationCount(0) = self.stop {
            return Err(ExportError::configuration("rotation count must be greater than zero"));
        }
        if self.canvas_width == 0 || self.canvas_height == 0 {
            return Err(ExportError::configuration("canvas dimensions must be non-zero"));
        }
        // YUV420P는 짝수 해상도만 가능
        if self.canvas_width % 2 != 0 || self.canvas_height % 2 != 0 {
            return Err(ExportError::configuration(format!(
                "canvas dimensions must be even, got {}x{}",
                self.canvas_width, self.canvas_height
            )));
        }
        if self.canvas_width > u32::from(u16::MAX) || self.canvas_height > u32::from(u16::MAX) {
            return Err(ExportError::configuration("canvas dimensions exceed 65535"));
        }
        if self.profile.video_bitrate == 0 || self.profile.audio_bitrate == 0 {
            return Err(ExportError::configuration("bitrates must be greater than zero"));
        }
        Ok(())
    }
}

/// 회전 라벨 스타일
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelStyle {
    /// 캔버스 가장자리 ~ 라벨 간격 (캔버스 너비 대비 %)
    pub padding_percent: f32,
    /// `#rrggbb` 또는 `#rrggbbaa`
    pub background_color: String,
    pub show_center_hole: bool,
}

impl Default for LabelStyle {
    fn default() -> Self {
        Self {
            padding_percent: 5.0,
            background_color: "#000000".to_string(),
            show_center_hole: true,
        }
    }
}

impl LabelStyle {
    pub fn from_json(json: &str) -> ExportResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn background_rgba(&self) -> ExportResult<[u8; 4]> {
        parse_hex_color(&self.background_color)
    }
}

/// `#rgb`, `#rrggbb`, `#rrggbbaa` 파싱
pub fn parse_hex_color(value: &str) -> ExportResult<[u8; 4]> {
    let invalid = || ExportError::configuration(format!("invalid color '{value}'"));
    let hex = value.trim().strip_prefix('#').ok_or_else(invalid)?;
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }

    let channel = |s: &str| u8::from_str_radix(s, 16).map_err(|_| invalid());
    match hex.len() {
        3 => {
            let mut rgba = [255u8; 4];
            for (i, c) in hex.chars().enumerate() {
                let v = channel(&c.to_string())?;
                rgba[i] = v * 17;
            }
            Ok(rgba)
        }
        6 | 8 => {
            let mut rgba = [255u8; 4];
            for i in 0..hex.len() / 2 {
                rgba[i] = channel(&hex[i * 2..i * 2 + 2])?;
            }
            Ok(rgba)
        }
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_json_fills_defaults() {
        let config = ExportConfig::from_json(r#"{"speed_rpm": 45, "rotations": 2}"#).unwrap();
        assert_eq!(config.speed_rpm, 45.0);
        assert_eq!(config.fps, DEFAULT_FPS);
        assert_eq!(config.stop_condition(), StopCondition::RotationCount(2));
        assert_eq!(config.video_bitrate, DEFAULT_VIDEO_BITRATE);

        let config = ExportConfig::from_json("{}").unwrap();
        assert_eq!(config.stop_condition(), StopCondition::AudioDuration);
    }

    #[test]
    fn malformed_json_is_a_configuration_error() {
        let err = ExportConfig::from_json("{speed").unwrap_err();
        assert!(matches!(err, ExportError::Configuration(_)));
    }

    #[test]
    fn validate_rejects_bad_requests() {
        let ok = ExportRequest::new(10.0, 30, StopCondition::RotationCount(1), 640, 640);
        assert!(ok.validate().is_ok());

        let cases = [
            ExportRequest::new(0.0, 30, StopCondition::RotationCount(1), 640, 640),
            ExportRequest::new(f64::NAN, 30, StopCondition::RotationCount(1), 640, 640),
            ExportRequest::new(-3.0, 30, StopCondition::AudioDuration, 640, 640),
            ExportRequest::new(10.0, 0, StopCondition::RotationCount(1), 640, 640),
            ExportRequest::new(10.0, 30, StopCondition::RotationCount(0), 640, 640),
            ExportRequest::new(10.0, 30, StopCondition::RotationCount(1), 641, 640),
            ExportRequest::new(10.0, 30, StopCondition::RotationCount(1), 0, 640),
        ];
        for request in cases {
            assert!(
                matches!(request.validate(), Err(ExportError::Configuration(_))),
                "{request:?} should be rejected"
            );
        }
    }

    #[test]
    fn parses_hex_colors() {
        assert_eq!(parse_hex_color("#ff8000").unwrap(), [255, 128, 0, 255]);
        assert_eq!(parse_hex_color("#fff").unwrap(), [255, 255, 255, 255]);
        assert_eq!(parse_hex_color("#10203040").unwrap(), [16, 32, 48, 64]);
        assert!(parse_hex_color("ff8000").is_err());
        assert!(parse_hex_color("#ff80").is_err());
        assert!(parse_hex_color("#gg0000").is_err());
    }
}
