// 오디오 디코드 어댑터 - 인코딩된 오디오 바이트 → mono f32 PCM (44.1kHz)
// 다채널 소스는 첫 번째 채널만 유지 (평균 다운믹스 아님)

use bytes::Bytes;
use std::fmt;

use crate::config::AUDIO_SAMPLE_RATE;
use crate::encoding::CodecBackend;
use crate::error::DecodeError;
use crate::timeline::ONE_SECOND_MICROSECONDS;

/// 인코딩된 오디오 원본 (포맷은 백엔드가 판별)
#[derive(Clone, PartialEq, Eq)]
pub struct AudioSource {
    bytes: Bytes,
}

impl AudioSource {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self { bytes: bytes.into() }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for AudioSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioSource").field("bytes", &self.bytes.len()).finish()
    }
}

/// 디코딩된 mono PCM
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl PcmBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }

    /// 길이 (us, 내림)
    pub fn duration_us(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        let us = self.samples.len() as u128 * u128::from(ONE_SECOND_MICROSECONDS)
            / u128::from(self.sample_rate);
        us as u64
    }

    /// `duration_us` 이전에 시작하는 샘플만 남김
    pub fn truncate_to_us(&mut self, duration_us: u64) {
        let us = u128::from(ONE_SECOND_MICROSECONDS);
        let keep = (u128::from(duration_us) * u128::from(self.sample_rate) + us - 1) / us;
        let keep = usize::try_from(keep).unwrap_or(usize::MAX);
        self.samples.truncate(keep);
    }
}

/// 오디오 바이트 → mono PCM
/// - 빈 입력: `DecodeError::Empty` (백엔드 호출 없음)
/// - 첫 번째 채널만 사용
/// - 샘플 0개: `DecodeError::NoSamples`
pub fn decode_to_mono(source: &AudioSource, backend: &dyn CodecBackend) -> Result<PcmBuffer, DecodeError> {
    if source.is_empty() {
        return Err(DecodeError::Empty);
    }

    let decoded = backend.decode_audio(source.bytes(), AUDIO_SAMPLE_RATE)?;
    let channel_count = decoded.channels.len();
    let samples = decoded
        .channels
        .into_iter()
        .next()
        .ok_or(DecodeError::NoSamples)?;

    if samples.is_empty() {
        return Err(DecodeError::NoSamples);
    }
    if channel_count > 1 {
        log::debug!("[AUDIO] {}채널 소스 → 첫 번째 채널만 사용", channel_count);
    }

    let pcm = PcmBuffer::new(samples, decoded.sample_rate);
    log::info!(
        "[AUDIO] 디코딩 완료: {} samples @ {}Hz ({:.3}s)",
        pcm.len(),
        pcm.sample_rate,
        pcm.duration_secs()
    );
    Ok(pcm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::testing::{raw_pcm_bytes, StubBackend};

    #[test]
    fn empty_source_is_rejected_before_decoding() {
        let backend = StubBackend::new();
        let err = decode_to_mono(&AudioSource::new(Vec::new()), &backend).unwrap_err();
        assert!(matches!(err, DecodeError::Empty));
        assert_eq!(backend.decode_calls(), 0);
    }

    #[test]
    fn unrecognized_bytes_fail() {
        let backend = StubBackend::new();
        let err = decode_to_mono(&AudioSource::new(&b"definitely not audio"[..]), &backend).unwrap_err();
        assert!(matches!(err, DecodeError::Unrecognized(_)));
    }

    #[test]
    fn keeps_only_the_first_channel() {
        let left = vec![0.25f32; 100];
        let right = vec![-0.5f32; 100];
        let bytes = raw_pcm_bytes(44_100, &[left.clone(), right]);
        let pcm = decode_to_mono(&AudioSource::new(bytes), &StubBackend::new()).unwrap();
        assert_eq!(pcm.samples, left);
        assert_eq!(pcm.sample_rate, 44_100);
    }

    #[test]
    fn silent_stream_without_samples_fails() {
        let bytes = raw_pcm_bytes(44_100, &[Vec::new()]);
        let err = decode_to_mono(&AudioSource::new(bytes), &StubBackend::new()).unwrap_err();
        assert!(matches!(err, DecodeError::NoSamples));
    }

    #[test]
    fn duration_and_trim() {
        let mut pcm = PcmBuffer::new(vec![0.0; 88_200], 44_100);
        assert_eq!(pcm.duration_us(), 2_000_000);
        assert_eq!(pcm.duration_secs(), 2.0);

        pcm.truncate_to_us(1_500_000);
        assert_eq!(pcm.len(), 66_150);
        // 1us 분량은 샘플 1개로 올림
        pcm.truncate_to_us(1);
        assert_eq!(pcm.len(), 1);
    }
}
