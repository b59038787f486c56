// H.264 비디오 코덱 - RGBA 프레임 → YUV420P 변환 → libx264
// time_base 1/1_000_000 → 패킷 PTS = 제출한 us 타임스탬프

use ffmpeg_next as ffmpeg;
use ffmpeg::codec;
use ffmpeg::format::Pixel;
use ffmpeg::software::scaling;

use crate::encoding::{EncodedChunk, TrackKind, VideoCodec, VideoSettings};
use crate::error::EncodeError;
use crate::rendering::RasterFrame;
use crate::timeline::ONE_SECOND_MICROSECONDS;

/// libx264 우선, 없으면 기본 H.264 인코더
pub(crate) fn find_h264_encoder() -> Option<ffmpeg::Codec> {
    ffmpeg::encoder::find_by_name("libx264").or_else(|| ffmpeg::encoder::find(codec::Id::H264))
}

fn configure_err(e: impl std::fmt::Display) -> EncodeError {
    EncodeError::configure(TrackKind::Video, e.to_string())
}

fn codec_err(context: &str, e: impl std::fmt::Display) -> EncodeError {
    EncodeError::codec(TrackKind::Video, format!("{}: {}", context, e))
}

/// 비디오 인코더 (컨테이너 없음, 패킷만 반환)
pub struct H264Codec {
    encoder: ffmpeg::encoder::Video,
    scaler: scaling::Context,
    width: u32,
    height: u32,
    frame_duration_us: u64,
    /// SPS/PPS (첫 패킷에만 실림)
    decoder_config: Option<Vec<u8>>,
    first_packet: bool,
}

impl H264Codec {
    pub fn open(settings: &VideoSettings) -> Result<Self, EncodeError> {
        super::ensure_initialized().map_err(configure_err)?;

        let codec = find_h264_encoder().ok_or(EncodeError::CodecUnavailable("h264"))?;
        let mut encoder = codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .map_err(|e| configure_err(format!("failed to get video encoder: {}", e)))?;

        let fps = i32::try_from(settings.fps).map_err(configure_err)?;
        encoder.set_width(settings.width);
        encoder.set_height(settings.height);
        encoder.set_format(Pixel::YUV420P);
        encoder.set_time_base(ffmpeg::Rational::new(1, ONE_SECOND_MICROSECONDS as i32));
        encoder.set_frame_rate(Some(ffmpeg::Rational::new(fps, 1)));
        encoder.set_bit_rate(settings.bitrate as usize);
        encoder.set_gop(settings.keyframe_interval);
        // B-frame 없음 → 출력 순서 = 표시 순서
        encoder.set_max_b_frames(0);

        // 글로벌 헤더 (SPS/PPS → extradata, MP4 avcC용)
        unsafe {
            (*encoder.as_mut_ptr()).flags |= codec::flag::Flags::GLOBAL_HEADER.bits() as i32;
        }

        let mut opts = ffmpeg::Dictionary::new();
        opts.set("preset", "medium");
        let encoder = encoder
            .open_with(opts)
            .map_err(|e| configure_err(format!("failed to open encoder: {}", e)))?;

        let decoder_config = extradata(&encoder);

        let scaler = scaling::Context::get(
            Pixel::RGBA,
            settings.width,
            settings.height,
            Pixel::YUV420P,
            settings.width,
            settings.height,
            scaling::Flags::BILINEAR,
        )
        .map_err(|e| configure_err(format!("failed to create scaler: {}", e)))?;

        log::info!(
            "[FFMPEG] H.264 인코더 열림: {}x{} @ {}fps, {} bps, gop {}",
            settings.width,
            settings.height,
            settings.fps,
            settings.bitrate,
            settings.keyframe_interval
        );

        Ok(Self {
            encoder,
            scaler,
            width: settings.width,
            height: settings.height,
            frame_duration_us: ONE_SECOND_MICROSECONDS / u64::from(settings.fps.max(1)),
            decoder_config,
            first_packet: true,
        })
    }

    /// 인코더에서 패킷 수신 → 청크
    fn receive_chunks(&mut self) -> Vec<EncodedChunk> {
        let mut chunks = Vec::new();
        let mut packet = ffmpeg::Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            let Some(data) = packet.data() else {
                continue;
            };
            let data = data.to_vec();
            // extradata가 없으면 첫 키프레임의 인라인 SPS/PPS 사용
            let decoder_config = if std::mem::take(&mut self.first_packet) {
                self.decoder_config.take().or_else(|| Some(data.clone()))
            } else {
                None
            };
            chunks.push(EncodedChunk {
                timestamp_us: packet.pts().unwrap_or(0).max(0) as u64,
                duration_us: self.frame_duration_us,
                is_key: packet.is_key(),
                data,
                decoder_config,
            });
        }
        chunks
    }
}

/// 열린 인코더의 extradata 복사
fn extradata(encoder: &ffmpeg::encoder::Video) -> Option<Vec<u8>> {
    unsafe {
        let ctx = encoder.as_ptr();
        let size = (*ctx).extradata_size;
        if (*ctx).extradata.is_null() || size <= 0 {
            return None;
        }
        Some(std::slice::from_raw_parts((*ctx).extradata, size as usize).to_vec())
    }
}

impl VideoCodec for H264Codec {
    fn encode(&mut self, frame: &RasterFrame, timestamp_us: u64) -> Result<Vec<EncodedChunk>, EncodeError> {
        if frame.width != self.width || frame.height != self.height || !frame.is_well_formed() {
            return Err(EncodeError::FrameSize {
                got_width: frame.width,
                got_height: frame.height,
                width: self.width,
                height: self.height,
            });
        }

        // RGBA 데이터 → ffmpeg Video 프레임 (stride 단위 행 복사)
        let mut src_frame = ffmpeg::frame::Video::new(Pixel::RGBA, self.width, self.height);
        {
            let linesize = src_frame.stride(0);
            let row_size = self.width as usize * 4;
            let dst = src_frame.data_mut(0);
            for (y, row) in frame.data.chunks_exact(row_size).enumerate() {
                let dst_offset = y * linesize;
                dst[dst_offset..dst_offset + row_size].copy_from_slice(row);
            }
        }

        let mut yuv_frame = ffmpeg::frame::Video::empty();
        self.scaler
            .run(&src_frame, &mut yuv_frame)
            .map_err(|e| codec_err("scaler failed", e))?;
        let pts = i64::try_from(timestamp_us).map_err(|e| codec_err("timestamp overflow", e))?;
        yuv_frame.set_pts(Some(pts));

        self.encoder
            .send_frame(&yuv_frame)
            .map_err(|e| codec_err("failed to send frame", e))?;
        Ok(self.receive_chunks())
    }

    fn finish(&mut self) -> Result<Vec<EncodedChunk>, EncodeError> {
        self.encoder
            .send_eof()
            .map_err(|e| codec_err("failed to send EOF", e))?;
        Ok(self.receive_chunks())
    }
}
