// 오디오 인코드 어댑터 - mono PCM 전체 → AAC 청크
// 비디오와 달리 전체 트랙을 한 번에 제출 (스트리밍 아님)

use std::sync::mpsc::Sender;
use std::sync::Arc;

use crate::encoding::encoder::EncoderWorker;
use crate::encoding::{
    AudioCodec, AudioSettings, CodecBackend, FlushReceipt, PcmBuffer, TrackChunk, TrackKind,
};
use crate::error::EncodeError;

/// 오디오 인코드 어댑터: configure → encode (1회) → flush
pub struct AudioEncodeAdapter {
    settings: AudioSettings,
    worker: EncoderWorker<PcmBuffer>,
    submitted: bool,
}

impl AudioEncodeAdapter {
    pub fn configure(
        backend: Arc<dyn CodecBackend>,
        settings: AudioSettings,
        output: Sender<TrackChunk>,
    ) -> Result<Self, EncodeError> {
        if settings.sample_rate == 0 || settings.channels != 1 {
            return Err(EncodeError::configure(
                TrackKind::Audio,
                format!(
                    "unsupported audio layout: {} channels @ {}Hz (mono only)",
                    settings.channels, settings.sample_rate
                ),
            ));
        }

        let backend_name = backend.name();
        let worker = EncoderWorker::spawn(
            TrackKind::Audio,
            1,
            move || backend.open_audio(&settings),
            |codec: &mut Box<dyn AudioCodec>, input: Option<PcmBuffer>| match input {
                Some(pcm) => codec.encode(&pcm.samples),
                None => codec.finish(),
            },
            output,
        )?;

        log::info!(
            "[ENCODE] 오디오 인코더 준비: {}Hz mono, {} bps ({})",
            settings.sample_rate,
            settings.bitrate,
            backend_name
        );

        Ok(Self {
            settings,
            worker,
            submitted: false,
        })
    }

    /// PCM 전체 제출 (한 번만 허용)
    pub fn encode(&mut self, pcm: PcmBuffer) -> Result<(), EncodeError> {
        if self.submitted {
            return Err(EncodeError::AlreadySubmitted(TrackKind::Audio));
        }
        if pcm.sample_rate != self.settings.sample_rate {
            return Err(EncodeError::codec(
                TrackKind::Audio,
                format!(
                    "PCM is {}Hz, encoder expects {}Hz",
                    pcm.sample_rate, self.settings.sample_rate
                ),
            ));
        }

        let samples = pcm.len();
        self.worker.submit(pcm)?;
        self.submitted = true;
        log::debug!("[ENCODE] 오디오 {} samples 제출", samples);
        Ok(())
    }

    /// 인코딩 완료까지 대기
    pub fn flush(self) -> Result<FlushReceipt, EncodeError> {
        let emitted = self.worker.finish()?;
        log::info!("[ENCODE] 오디오 flush 완료: {} chunks", emitted);
        Ok(FlushReceipt::new(TrackKind::Audio, emitted))
    }

    pub fn settings(&self) -> &AudioSettings {
        &self.settings
    }
}
