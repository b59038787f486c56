// 테스트용 코덱 백엔드 - 결정적 청크 + 장애 주입
// 디코딩 포맷: "RPCM" 헤더 + planar f32 LE

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::encoding::{
    AudioCodec, AudioSettings, CodecBackend, DecodedAudio, EncodedChunk, TrackKind, VideoCodec,
    VideoSettings,
};
use crate::error::{DecodeError, EncodeError};
use crate::rendering::{FrameRenderer, RasterFrame};

const RAW_PCM_MAGIC: &[u8; 4] = b"RPCM";
/// 스텁 AAC 프레임 크기 (샘플)
pub const STUB_AAC_FRAME: usize = 1024;

/// 스텁 SPS/PPS (Annex B)
pub fn stub_decoder_config() -> Vec<u8> {
    vec![
        0, 0, 0, 1, 0x67, 0x42, 0x00, 0x1E, 0xAB, 0x40, //
        0, 0, 0, 1, 0x68, 0xCE, 0x3C, 0x80,
    ]
}

/// 테스트 입력: 헤더(매직, rate u32, 채널 u16, 채널당 샘플 u32) + planar f32
pub fn raw_pcm_bytes(sample_rate: u32, channels: &[Vec<f32>]) -> Vec<u8> {
    let per_channel = channels.first().map_or(0, Vec::len);
    let mut out = Vec::new();
    out.extend_from_slice(RAW_PCM_MAGIC);
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(channels.len() as u16).to_le_bytes());
    out.extend_from_slice(&(per_channel as u32).to_le_bytes());
    for channel in channels {
        for s in channel {
            out.extend_from_slice(&s.to_le_bytes());
        }
    }
    out
}

fn parse_raw_pcm(bytes: &[u8]) -> Result<DecodedAudio, DecodeError> {
    if bytes.len() < 14 || &bytes[..4] != RAW_PCM_MAGIC {
        return Err(DecodeError::Unrecognized("missing RPCM header".to_string()));
    }
    let sample_rate = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    let channel_count = usize::from(u16::from_le_bytes([bytes[8], bytes[9]]));
    let per_channel = u32::from_le_bytes([bytes[10], bytes[11], bytes[12], bytes[13]]) as usize;

    let body = &bytes[14..];
    if body.len() != channel_count * per_channel * 4 {
        return Err(DecodeError::Codec("truncated RPCM body".to_string()));
    }
    if per_channel == 0 {
        return Ok(DecodedAudio {
            sample_rate,
            channels: vec![Vec::new(); channel_count],
        });
    }
    let channels = body
        .chunks_exact(per_channel * 4)
        .map(|plane| {
            plane
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect()
        })
        .collect::<Vec<Vec<f32>>>();
    Ok(DecodedAudio { sample_rate, channels })
}

/// 장애 주입 설정
#[derive(Debug, Clone, Default)]
pub struct StubFaults {
    /// n번째 비디오 프레임(0부터)에서 인코딩 실패
    pub fail_video_at: Option<u64>,
    /// finish() 지연 (느린 flush 재현)
    pub finish_delay: Duration,
    /// 비디오 청크를 finish()까지 붙잡음 (lookahead 인코더 재현)
    pub hold_video_until_finish: bool,
    /// open_video() 실패
    pub video_unavailable: bool,
}

/// 결정적 스텁 백엔드
#[derive(Clone, Default)]
pub struct StubBackend {
    faults: StubFaults,
    decode_calls: Arc<AtomicUsize>,
    video_opens: Arc<AtomicUsize>,
    audio_opens: Arc<AtomicUsize>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_faults(faults: StubFaults) -> Self {
        Self {
            faults,
            ..Self::default()
        }
    }

    pub fn decode_calls(&self) -> usize {
        self.decode_calls.load(Ordering::SeqCst)
    }

    pub fn video_opens(&self) -> usize {
        self.video_opens.load(Ordering::SeqCst)
    }

    pub fn audio_opens(&self) -> usize {
        self.audio_opens.load(Ordering::SeqCst)
    }
}

impl CodecBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn decode_audio(&self, bytes: &[u8], sample_rate: u32) -> Result<DecodedAudio, DecodeError> {
        self.decode_calls.fetch_add(1, Ordering::SeqCst);
        let decoded = parse_raw_pcm(bytes)?;
        if decoded.sample_rate != sample_rate {
            return Err(DecodeError::Codec(format!(
                "stub cannot resample {}Hz → {}Hz",
                decoded.sample_rate, sample_rate
            )));
        }
        Ok(decoded)
    }

    fn open_video(&self, settings: &VideoSettings) -> Result<Box<dyn VideoCodec>, EncodeError> {
        if self.faults.video_unavailable {
            return Err(EncodeError::CodecUnavailable("h264"));
        }
        self.video_opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StubVideoCodec {
            settings: *settings,
            faults: self.faults.clone(),
            frames: 0,
            held: Vec::new(),
        }))
    }

    fn open_audio(&self, settings: &AudioSettings) -> Result<Box<dyn AudioCodec>, EncodeError> {
        self.audio_opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StubAudioCodec {
            settings: *settings,
            faults: self.faults.clone(),
            pending: Vec::new(),
            emitted_samples: 0,
        }))
    }
}

struct StubVideoCodec {
    settings: VideoSettings,
    faults: StubFaults,
    frames: u64,
    held: Vec<EncodedChunk>,
}

impl VideoCodec for StubVideoCodec {
    fn encode(&mut self, frame: &RasterFrame, timestamp_us: u64) -> Result<Vec<EncodedChunk>, EncodeError> {
        let index = self.frames;
        if self.faults.fail_video_at == Some(index) {
            return Err(EncodeError::codec(
                TrackKind::Video,
                format!("injected failure at frame {}", index),
            ));
        }
        self.frames += 1;

        let is_key = index % u64::from(self.settings.keyframe_interval.max(1)) == 0;
        let checksum = frame
            .data
            .iter()
            .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(u32::from(*b)));
        let mut data = vec![0, 0, 0, 1, if is_key { 0x65 } else { 0x41 }];
        // 16진 ASCII로 기록 → 페이로드에 start code(00 00 01)가 생기지 않음
        data.extend_from_slice(format!("{:016x}{:08x}", index, checksum).as_bytes());

        let chunk = EncodedChunk {
            timestamp_us,
            duration_us: 1_000_000 / u64::from(self.settings.fps),
            is_key,
            data,
            decoder_config: (index == 0).then(stub_decoder_config),
        };

        if self.faults.hold_video_until_finish {
            self.held.push(chunk);
            Ok(Vec::new())
        } else {
            Ok(vec![chunk])
        }
    }

    fn finish(&mut self) -> Result<Vec<EncodedChunk>, EncodeError> {
        if !self.faults.finish_delay.is_zero() {
            thread::sleep(self.faults.finish_delay);
        }
        Ok(std::mem::take(&mut self.held))
    }
}

struct StubAudioCodec {
    settings: AudioSettings,
    faults: StubFaults,
    pending: Vec<f32>,
    /// 지금까지 청크로 내보낸 실제 샘플 수 (패딩 제외)
    emitted_samples: u64,
}

impl StubAudioCodec {
    fn samples_to_us(&self, samples: u64) -> u64 {
        samples * 1_000_000 / u64::from(self.settings.sample_rate)
    }

    /// block은 항상 STUB_AAC_FRAME 길이, samples = 그중 실제 샘플 수
    fn frame_chunk(&mut self, block: &[f32], samples: usize) -> EncodedChunk {
        let start = self.emitted_samples;
        self.emitted_samples += samples as u64;
        let energy = block.iter().map(|s| s.abs()).sum::<f32>();
        let mut data = vec![0x21, 0x10];
        data.extend_from_slice(&energy.to_le_bytes());
        EncodedChunk {
            timestamp_us: self.samples_to_us(start),
            duration_us: self.samples_to_us(self.emitted_samples) - self.samples_to_us(start),
            is_key: true,
            data,
            decoder_config: None,
        }
    }
}

impl AudioCodec for StubAudioCodec {
    fn encode(&mut self, samples: &[f32]) -> Result<Vec<EncodedChunk>, EncodeError> {
        self.pending.extend_from_slice(samples);
        let full = self.pending.len() / STUB_AAC_FRAME * STUB_AAC_FRAME;
        let ready: Vec<f32> = self.pending.drain(..full).collect();
        Ok(ready
            .chunks(STUB_AAC_FRAME)
            .map(|block| self.frame_chunk(block, STUB_AAC_FRAME))
            .collect())
    }

    fn finish(&mut self) -> Result<Vec<EncodedChunk>, EncodeError> {
        if !self.faults.finish_delay.is_zero() {
            thread::sleep(self.faults.finish_delay);
        }
        if self.pending.is_empty() {
            return Ok(Vec::new());
        }
        let mut block = std::mem::take(&mut self.pending);
        let samples = block.len();
        block.resize(STUB_AAC_FRAME, 0.0);
        Ok(vec![self.frame_chunk(&block, samples)])
    }
}

/// 각도를 기록하고 각도로 결정되는 프레임을 만드는 렌더러
#[derive(Clone)]
pub struct RecordingRenderer {
    size: (u32, u32),
    pub angles: Arc<Mutex<Vec<f64>>>,
}

impl RecordingRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: (width, height),
            angles: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn recorded(&self) -> Vec<f64> {
        self.angles.lock().map(|a| a.clone()).unwrap_or_default()
    }
}

impl FrameRenderer for RecordingRenderer {
    fn configure(&mut self, width: u32, height: u32) {
        self.size = (width, height);
    }

    fn dimensions(&self) -> (u32, u32) {
        self.size
    }

    fn render_frame(&mut self, angle: f64) -> RasterFrame {
        if let Ok(mut angles) = self.angles.lock() {
            angles.push(angle);
        }
        let mut frame = RasterFrame::new(self.size.0, self.size.1);
        let shade = (angle / std::f64::consts::TAU * 255.0) as u8;
        for px in frame.data.chunks_exact_mut(4) {
            px.copy_from_slice(&[shade, 255 - shade, 0, 255]);
        }
        frame
    }
}
