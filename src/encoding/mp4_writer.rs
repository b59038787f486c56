// MP4 컨테이너 기록기 - mp4 crate로 메모리 버퍼에 직접 기록
// 비디오 track 1 (H.264 avcC), 오디오 track 2 (AAC-LC mono)

use std::io::Cursor;

use bytes::Bytes;
use mp4::{
    AacConfig, AudioObjectType, AvcConfig, ChannelConfig, MediaConfig, Mp4Config, Mp4Sample,
    Mp4Writer, SampleFreqIndex, TrackConfig, TrackType,
};

use crate::encoding::h264::{annexb_to_avcc, extract_avc_config, is_h264_keyframe};
use crate::encoding::{AudioSettings, ContainerWriter, EncodedChunk, TrackKind, TrackLayout};
use crate::error::MuxError;
use crate::timeline::ONE_SECOND_MICROSECONDS;

/// 무비 타임스케일 (ms)
const MOVIE_TIMESCALE: u32 = 1000;
const VIDEO_TRACK_ID: u32 = 1;
const AUDIO_TRACK_ID: u32 = 2;

/// us → 트랙 타임스케일 tick (반올림)
fn to_ticks(us: u64, timescale: u32) -> u64 {
    let scaled = u128::from(us) * u128::from(timescale) + u128::from(ONE_SECOND_MICROSECONDS) / 2;
    (scaled / u128::from(ONE_SECOND_MICROSECONDS)) as u64
}

/// 트랙 1개의 샘플 기록 상태
///
/// 샘플 duration = 다음 샘플 시작 - 현재 샘플 시작 → 한 샘플 늦게 기록
struct TrackCursor {
    track_id: u32,
    timescale: u32,
    pending: Option<EncodedChunk>,
}

impl TrackCursor {
    fn new(track_id: u32, timescale: u32) -> Self {
        Self {
            track_id,
            timescale,
            pending: None,
        }
    }

    /// 새 청크를 보류하고, 이전 보류 청크를 기록
    fn push(
        &mut self,
        writer: &mut Mp4Writer<Cursor<Vec<u8>>>,
        chunk: EncodedChunk,
        track: TrackKind,
    ) -> Result<(), MuxError> {
        let next_start = chunk.timestamp_us;
        if let Some(previous) = self.pending.replace(chunk) {
            let ticks = to_ticks(next_start, self.timescale)
                .saturating_sub(to_ticks(previous.timestamp_us, self.timescale));
            self.write(writer, previous, ticks, track)?;
        }
        Ok(())
    }

    /// 마지막 샘플 기록 (자체 duration 사용)
    fn drain(&mut self, writer: &mut Mp4Writer<Cursor<Vec<u8>>>, track: TrackKind) -> Result<(), MuxError> {
        if let Some(last) = self.pending.take() {
            let end = last.timestamp_us.saturating_add(last.duration_us);
            let ticks = to_ticks(end, self.timescale)
                .saturating_sub(to_ticks(last.timestamp_us, self.timescale));
            self.write(writer, last, ticks, track)?;
        }
        Ok(())
    }

    fn write(
        &self,
        writer: &mut Mp4Writer<Cursor<Vec<u8>>>,
        chunk: EncodedChunk,
        ticks: u64,
        track: TrackKind,
    ) -> Result<(), MuxError> {
        let duration = u32::try_from(ticks)
            .map_err(|_| MuxError::Unsupported(format!("{} sample duration overflows", track)))?;
        let start_time = to_ticks(chunk.timestamp_us, self.timescale);
        let (bytes, is_sync) = match track {
            TrackKind::Video => {
                let is_sync = sync_flag(&chunk);
                (annexb_to_avcc(&chunk.data)?, is_sync)
            }
            TrackKind::Audio => (chunk.data, chunk.is_key),
        };
        let sample = Mp4Sample {
            start_time,
            duration,
            rendering_offset: 0,
            is_sync,
            bytes: Bytes::from(bytes),
        };
        writer.write_sample(self.track_id, &sample)?;
        Ok(())
    }
}

/// 비디오 sync 샘플 여부 - 인코더 플래그와 비트스트림이 다르면 IDR 기준
fn sync_flag(chunk: &EncodedChunk) -> bool {
    match is_h264_keyframe(&chunk.data) {
        Some(idr) if idr != chunk.is_key => {
            log::warn!(
                "[MUX] 키프레임 플래그 불일치 @ {}us (flag={}, IDR={}), 비트스트림 기준으로 기록",
                chunk.timestamp_us,
                chunk.is_key,
                idr
            );
            idr
        }
        _ => chunk.is_key,
    }
}

/// MP4 기록기 (메모리)
///
/// 트랙은 첫 비디오 청크(SPS/PPS 포함)가 도착할 때 추가됨.
/// 그 전에 온 청크(보통 오디오 전체)는 backlog에 보관
pub struct Mp4ContainerWriter {
    layout: TrackLayout,
    writer: Mp4Writer<Cursor<Vec<u8>>>,
    tracks_ready: bool,
    backlog: Vec<(TrackKind, EncodedChunk)>,
    video: TrackCursor,
    audio: Option<TrackCursor>,
}

impl Mp4ContainerWriter {
    pub fn new(layout: TrackLayout) -> Result<Self, MuxError> {
        // 트랙 파라미터를 미리 검증 (청크 수신 전에 실패)
        u16::try_from(layout.video.width)
            .and(u16::try_from(layout.video.height))
            .map_err(|_| MuxError::Unsupported("video dimensions exceed 65535".to_string()))?;
        if let Some(audio) = &layout.audio {
            aac_config(audio)?;
        }

        let config = Mp4Config {
            major_brand: "isom".parse()?,
            minor_version: 512,
            compatible_brands: vec![
                "isom".parse()?,
                "iso2".parse()?,
                "avc1".parse()?,
                "mp41".parse()?,
            ],
            timescale: MOVIE_TIMESCALE,
        };
        let writer = Mp4Writer::write_start(Cursor::new(Vec::new()), &config)?;

        let video_timescale = layout.video.fps.saturating_mul(1000);
        Ok(Self {
            layout,
            writer,
            tracks_ready: false,
            backlog: Vec::new(),
            video: TrackCursor::new(VIDEO_TRACK_ID, video_timescale),
            audio: layout
                .audio
                .map(|a| TrackCursor::new(AUDIO_TRACK_ID, a.sample_rate)),
        })
    }

    /// 첫 비디오 청크의 디코더 설정으로 트랙 추가
    fn add_tracks(&mut self, decoder_config: &[u8]) -> Result<(), MuxError> {
        let sets = extract_avc_config(decoder_config)?;
        let width = u16::try_from(self.layout.video.width)
            .map_err(|_| MuxError::Unsupported("video width exceeds 65535".to_string()))?;
        let height = u16::try_from(self.layout.video.height)
            .map_err(|_| MuxError::Unsupported("video height exceeds 65535".to_string()))?;

        self.writer.add_track(&TrackConfig {
            track_type: TrackType::Video,
            timescale: self.video.timescale,
            language: String::from("und"),
            media_conf: MediaConfig::AvcConfig(AvcConfig {
                width,
                height,
                seq_param_set: sets.sps,
                pic_param_set: sets.pps,
            }),
        })?;

        if let (Some(audio), Some(cursor)) = (&self.layout.audio, &self.audio) {
            self.writer.add_track(&TrackConfig {
                track_type: TrackType::Audio,
                timescale: cursor.timescale,
                language: String::from("und"),
                media_conf: MediaConfig::AacConfig(aac_config(audio)?),
            })?;
        }

        self.tracks_ready = true;
        log::debug!("[MUX] MP4 트랙 추가 완료 (audio={})", self.layout.audio.is_some());
        Ok(())
    }

    fn route(&mut self, track: TrackKind, chunk: EncodedChunk) -> Result<(), MuxError> {
        match track {
            TrackKind::Video => self.video.push(&mut self.writer, chunk, track),
            TrackKind::Audio => self
                .audio
                .as_mut()
                .ok_or(MuxError::UnknownTrack(track))?
                .push(&mut self.writer, chunk, track),
        }
    }
}

fn aac_config(audio: &AudioSettings) -> Result<AacConfig, MuxError> {
    let freq_index = match audio.sample_rate {
        44_100 => SampleFreqIndex::Freq44100,
        48_000 => SampleFreqIndex::Freq48000,
        other => {
            return Err(MuxError::Unsupported(format!(
                "AAC sample rate {}Hz",
                other
            )))
        }
    };
    if audio.channels != 1 {
        return Err(MuxError::Unsupported(format!(
            "{} audio channels (mono only)",
            audio.channels
        )));
    }
    Ok(AacConfig {
        bitrate: audio.bitrate,
        profile: AudioObjectType::AacLowComplexity,
        freq_index,
        chan_conf: ChannelConfig::Mono,
    })
}

impl ContainerWriter for Mp4ContainerWriter {
    fn write_chunk(&mut self, track: TrackKind, chunk: EncodedChunk) -> Result<(), MuxError> {
        if track == TrackKind::Audio && self.audio.is_none() {
            return Err(MuxError::UnknownTrack(track));
        }

        if !self.tracks_ready {
            if track == TrackKind::Audio {
                self.backlog.push((track, chunk));
                return Ok(());
            }
            let config = chunk
                .decoder_config
                .clone()
                .ok_or(MuxError::MissingDecoderConfig)?;
            self.add_tracks(&config)?;

            for (queued_track, queued) in std::mem::take(&mut self.backlog) {
                self.route(queued_track, queued)?;
            }
        }

        self.route(track, chunk)
    }

    fn finish(mut self: Box<Self>) -> Result<Vec<u8>, MuxError> {
        if !self.tracks_ready {
            return Err(MuxError::MissingDecoderConfig);
        }

        let this = &mut *self;
        this.video.drain(&mut this.writer, TrackKind::Video)?;
        if let Some(audio) = this.audio.as_mut() {
            audio.drain(&mut this.writer, TrackKind::Audio)?;
        }
        this.writer.write_end()?;

        let Mp4ContainerWriter { writer, .. } = *self;
        Ok(writer.into_writer().into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::testing::stub_decoder_config;
    use crate::encoding::VideoSettings;

    fn layout(with_audio: bool) -> TrackLayout {
        TrackLayout {
            video: VideoSettings {
                width: 64,
                height: 64,
                fps: 30,
                bitrate: 500_000,
                keyframe_interval: 30,
            },
            audio: with_audio.then_some(AudioSettings {
                sample_rate: 44_100,
                channels: 1,
                bitrate: 128_000,
            }),
        }
    }

    fn video_chunk(index: u64) -> EncodedChunk {
        EncodedChunk {
            timestamp_us: index * 1_000_000 / 30,
            duration_us: 33_333,
            is_key: index == 0,
            data: vec![0, 0, 0, 1, if index == 0 { 0x65 } else { 0x41 }, 0x88, index as u8],
            decoder_config: (index == 0).then(stub_decoder_config),
        }
    }

    fn audio_chunk(index: u64) -> EncodedChunk {
        EncodedChunk {
            timestamp_us: index * 1024 * 1_000_000 / 44_100,
            duration_us: 1024 * 1_000_000 / 44_100,
            is_key: true,
            data: vec![0x21, 0x10, index as u8],
            decoder_config: None,
        }
    }

    /// 샘플 단위 구간 [start, start + len) 오디오 청크
    fn audio_span(start: u64, len: u64) -> EncodedChunk {
        let us = |samples: u64| samples * 1_000_000 / 44_100;
        EncodedChunk {
            timestamp_us: us(start),
            duration_us: us(start + len) - us(start),
            is_key: true,
            data: vec![0x21, 0x10, start as u8],
            decoder_config: None,
        }
    }

    fn read_back(bytes: Vec<u8>) -> mp4::Mp4Reader<Cursor<Vec<u8>>> {
        let size = bytes.len() as u64;
        mp4::Mp4Reader::read_header(Cursor::new(bytes), size).unwrap()
    }

    #[test]
    fn ticks_round_to_nearest() {
        assert_eq!(to_ticks(33_333, 30_000), 1000);
        assert_eq!(to_ticks(1_000_000, 44_100), 44_100);
        assert_eq!(to_ticks(23_219, 44_100), 1024);
    }

    #[test]
    fn writes_a_readable_video_only_file() {
        let mut writer = Box::new(Mp4ContainerWriter::new(layout(false)).unwrap());
        for i in 0..30 {
            writer.write_chunk(TrackKind::Video, video_chunk(i)).unwrap();
        }
        let bytes = writer.finish().unwrap();

        let reader = read_back(bytes);
        assert_eq!(reader.tracks().len(), 1);
        let track = reader.tracks().get(&VIDEO_TRACK_ID).unwrap();
        assert_eq!(track.sample_count(), 30);
        assert_eq!(track.width(), 64);
        // 30프레임 @30fps = 1초
        assert_eq!(reader.duration().as_millis(), 1000);
    }

    #[test]
    fn audio_before_video_is_backlogged() {
        let mut writer = Box::new(Mp4ContainerWriter::new(layout(true)).unwrap());
        for i in 0..43 {
            writer.write_chunk(TrackKind::Audio, audio_chunk(i)).unwrap();
        }
        for i in 0..30 {
            writer.write_chunk(TrackKind::Video, video_chunk(i)).unwrap();
        }
        let reader = read_back(writer.finish().unwrap());
        assert_eq!(reader.tracks().len(), 2);
        assert_eq!(reader.tracks().get(&AUDIO_TRACK_ID).unwrap().sample_count(), 43);
        assert_eq!(reader.tracks().get(&VIDEO_TRACK_ID).unwrap().sample_count(), 30);
    }

    #[test]
    fn short_last_audio_sample_keeps_exact_length() {
        let mut writer = Box::new(Mp4ContainerWriter::new(layout(true)).unwrap());
        for i in 0..3 {
            writer.write_chunk(TrackKind::Audio, audio_span(i * 1024, 1024)).unwrap();
        }
        writer.write_chunk(TrackKind::Audio, audio_span(3 * 1024, 614)).unwrap();
        writer.write_chunk(TrackKind::Video, video_chunk(0)).unwrap();

        let mut reader = read_back(writer.finish().unwrap());
        let last = reader.read_sample(AUDIO_TRACK_ID, 4).unwrap().unwrap();
        assert_eq!(last.start_time, 3 * 1024);
        assert_eq!(last.duration, 614);

        let duration = reader.tracks().get(&AUDIO_TRACK_ID).unwrap().duration();
        let samples = (duration.as_secs_f64() * 44_100.0).round() as i64;
        assert!((samples - (3 * 1024 + 614)).abs() <= 1, "samples={samples}");
    }

    #[test]
    fn sync_samples_follow_the_bitstream() {
        let mut writer = Box::new(Mp4ContainerWriter::new(layout(false)).unwrap());
        writer.write_chunk(TrackKind::Video, video_chunk(0)).unwrap();
        // 키프레임으로 표시됐지만 IDR이 아닌 슬라이스
        let mut mislabeled = video_chunk(1);
        mislabeled.is_key = true;
        writer.write_chunk(TrackKind::Video, mislabeled).unwrap();
        writer.write_chunk(TrackKind::Video, video_chunk(2)).unwrap();

        let mut reader = read_back(writer.finish().unwrap());
        assert!(reader.read_sample(VIDEO_TRACK_ID, 1).unwrap().unwrap().is_sync);
        assert!(!reader.read_sample(VIDEO_TRACK_ID, 2).unwrap().unwrap().is_sync);
    }

    #[test]
    fn first_video_chunk_needs_decoder_config() {
        let mut writer = Box::new(Mp4ContainerWriter::new(layout(false)).unwrap());
        let mut chunk = video_chunk(0);
        chunk.decoder_config = None;
        let err = writer.write_chunk(TrackKind::Video, chunk).unwrap_err();
        assert!(matches!(err, MuxError::MissingDecoderConfig));
    }

    #[test]
    fn empty_file_cannot_be_finished() {
        let writer = Box::new(Mp4ContainerWriter::new(layout(false)).unwrap());
        assert!(matches!(writer.finish(), Err(MuxError::MissingDecoderConfig)));
    }

    #[test]
    fn rejects_unsupported_audio_rate() {
        let mut bad = layout(true);
        if let Some(audio) = bad.audio.as_mut() {
            audio.sample_rate = 22_050;
        }
        assert!(matches!(Mp4ContainerWriter::new(bad), Err(MuxError::Unsupported(_))));
    }
}
