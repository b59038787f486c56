// AAC-LC 오디오 코덱 (FFmpeg 내장 aac)
// mono planar f32 입력을 frame_size 블록으로 나눠 전송, 마지막 블록은 0 패딩
// 출력 타임스탬프 = 패킷 PTS (priming 패킷 제외, 마지막 패킷은 실제 샘플까지만)

use ffmpeg_next as ffmpeg;
use ffmpeg::codec;
use ffmpeg::format::{sample, Sample};

use crate::encoding::{AudioCodec, AudioSettings, EncodedChunk, TrackKind};
use crate::error::EncodeError;
use crate::timeline::ONE_SECOND_MICROSECONDS;

/// frame_size를 알려주지 않는 인코더용 기본값
const DEFAULT_FRAME_SIZE: usize = 1024;

fn configure_err(e: impl std::fmt::Display) -> EncodeError {
    EncodeError::configure(TrackKind::Audio, e.to_string())
}

fn codec_err(context: &str, e: impl std::fmt::Display) -> EncodeError {
    EncodeError::codec(TrackKind::Audio, format!("{}: {}", context, e))
}

pub struct AacCodec {
    encoder: ffmpeg::encoder::Audio,
    sample_rate: u32,
    frame_size: usize,
    pending: Vec<f32>,
    /// 인코더에 보낸 샘플 수 (입력 PTS, 패딩 포함)
    sent_samples: u64,
    /// 입력된 실제 샘플 수 (패딩 제외)
    input_samples: u64,
    /// PTS 없는 패킷용 예상 PTS
    next_pts: i64,
}

impl AacCodec {
    pub fn open(settings: &AudioSettings) -> Result<Self, EncodeError> {
        super::ensure_initialized().map_err(configure_err)?;
        if settings.channels != 1 {
            return Err(configure_err(format!(
                "only mono is supported, got {} channels",
                settings.channels
            )));
        }

        let codec = ffmpeg::encoder::find(codec::Id::AAC).ok_or(EncodeError::CodecUnavailable("aac"))?;
        let mut encoder = codec::context::Context::new_with_codec(codec)
            .encoder()
            .audio()
            .map_err(|e| configure_err(format!("failed to get audio encoder: {}", e)))?;

        let rate = i32::try_from(settings.sample_rate).map_err(configure_err)?;
        encoder.set_rate(rate);
        encoder.set_channel_layout(ffmpeg::ChannelLayout::MONO);
        encoder.set_format(Sample::F32(sample::Type::Planar));
        encoder.set_bit_rate(settings.bitrate as usize);
        encoder.set_time_base(ffmpeg::Rational::new(1, rate));

        let encoder = encoder
            .open_with(ffmpeg::Dictionary::new())
            .map_err(|e| configure_err(format!("failed to open encoder: {}", e)))?;

        let frame_size = match encoder.frame_size() {
            0 => DEFAULT_FRAME_SIZE,
            n => n as usize,
        };
        log::info!(
            "[FFMPEG] AAC 인코더 열림: {}Hz mono, {} bps, frame {}",
            settings.sample_rate,
            settings.bitrate,
            frame_size
        );

        Ok(Self {
            encoder,
            sample_rate: settings.sample_rate,
            frame_size,
            pending: Vec::new(),
            sent_samples: 0,
            input_samples: 0,
            next_pts: 0,
        })
    }

    fn samples_to_us(&self, samples: u64) -> u64 {
        let us = u128::from(samples) * u128::from(ONE_SECOND_MICROSECONDS) / u128::from(self.sample_rate);
        us as u64
    }

    /// 블록 1개 전송 (길이 = frame_size)
    fn send_block(&mut self, block: &[f32]) -> Result<(), EncodeError> {
        let mut frame = ffmpeg::frame::Audio::new(
            Sample::F32(sample::Type::Planar),
            block.len(),
            ffmpeg::ChannelLayout::MONO,
        );
        frame.set_rate(self.sample_rate);
        frame.set_pts(Some(self.sent_samples as i64));
        frame.plane_mut::<f32>(0)[..block.len()].copy_from_slice(block);
        self.sent_samples += block.len() as u64;

        self.encoder
            .send_frame(&frame)
            .map_err(|e| codec_err("failed to send frame", e))
    }

    /// 패킷 수신 → 청크
    ///
    /// 패킷 PTS(1/rate)는 디코딩 출력의 첫 샘플 위치. 인코더 지연만큼 음수로 시작하므로
    /// 샘플 0 이전에서 끝나는 priming 패킷은 버리고, 패딩만 담긴 꼬리 패킷도 버림
    fn receive_chunks(&mut self) -> Vec<EncodedChunk> {
        let mut chunks = Vec::new();
        let mut packet = ffmpeg::Packet::empty();
        let frame = self.frame_size as i64;
        while self.encoder.receive_packet(&mut packet).is_ok() {
            let pts = packet.pts().unwrap_or(self.next_pts);
            self.next_pts = pts + frame;
            let Some(data) = packet.data() else {
                continue;
            };

            let end = (pts + frame).min(self.input_samples as i64);
            let start = pts.max(0);
            if end <= start {
                crate::debug_log!("[FFMPEG] AAC 패킷 skip (pts={})", pts);
                continue;
            }
            let (start, end) = (start as u64, end as u64);
            chunks.push(EncodedChunk {
                timestamp_us: self.samples_to_us(start),
                duration_us: self.samples_to_us(end) - self.samples_to_us(start),
                is_key: true,
                data: data.to_vec(),
                decoder_config: None,
            });
        }
        chunks
    }
}

impl AudioCodec for AacCodec {
    fn encode(&mut self, samples: &[f32]) -> Result<Vec<EncodedChunk>, EncodeError> {
        self.pending.extend_from_slice(samples);
        self.input_samples += samples.len() as u64;
        let mut chunks = Vec::new();
        while self.pending.len() >= self.frame_size {
            let block: Vec<f32> = self.pending.drain(..self.frame_size).collect();
            self.send_block(&block)?;
            chunks.extend(self.receive_chunks());
        }
        Ok(chunks)
    }

    fn finish(&mut self) -> Result<Vec<EncodedChunk>, EncodeError> {
        let mut chunks = Vec::new();
        if !self.pending.is_empty() {
            let mut block = std::mem::take(&mut self.pending);
            block.resize(self.frame_size, 0.0);
            self.send_block(&block)?;
            chunks.extend(self.receive_chunks());
        }
        self.encoder
            .send_eof()
            .map_err(|e| codec_err("failed to send EOF", e))?;
        chunks.extend(self.receive_chunks());
        Ok(chunks)
    }
}
