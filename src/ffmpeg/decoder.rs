// FFmpeg 오디오 디코더 - 인코딩된 바이트 → planar f32 (요청 샘플레이트)
// libavformat은 경로 기반 입력이라 임시 파일로 스풀

use std::io::Write;

use ffmpeg_next as ffmpeg;

use crate::encoding::DecodedAudio;
use crate::error::DecodeError;

/// 리샘플 결과를 채널별 버퍼에 추가
/// data.len() 대신 samples() 기준 (linesize 패딩 제외)
fn append_planes(resampled: &ffmpeg::frame::Audio, planes: &mut Vec<Vec<f32>>) {
    let channels = usize::from(resampled.channels());
    if planes.len() < channels {
        planes.resize(channels, Vec::new());
    }
    for (ch, plane) in planes.iter_mut().enumerate().take(channels) {
        plane.extend_from_slice(resampled.plane::<f32>(ch));
    }
}

/// 오디오 바이트 디코딩 + 리샘플 (채널 레이아웃 유지)
pub fn decode_audio_bytes(bytes: &[u8], sample_rate: u32) -> Result<DecodedAudio, DecodeError> {
    super::ensure_initialized().map_err(DecodeError::Codec)?;

    let mut spool = tempfile::NamedTempFile::new()?;
    spool.write_all(bytes)?;
    spool.flush()?;
    let path = spool.path().to_path_buf();

    // 2차 시도: moov atom이 파일 끝에 있는 경우 - probesize 확장
    let mut input_ctx = ffmpeg::format::input(&path)
        .or_else(|_| {
            let mut opts = ffmpeg::Dictionary::new();
            opts.set("probesize", "100000000");
            opts.set("analyzeduration", "30000000");
            ffmpeg::format::input_with_dictionary(&path, opts)
        })
        .map_err(|e| DecodeError::Unrecognized(e.to_string()))?;

    let audio_stream_index = input_ctx
        .streams()
        .best(ffmpeg::media::Type::Audio)
        .ok_or(DecodeError::NoAudioStream)?
        .index();

    let codec_params = input_ctx
        .stream(audio_stream_index)
        .ok_or(DecodeError::NoAudioStream)?
        .parameters();
    let context = ffmpeg::codec::context::Context::from_parameters(codec_params)
        .map_err(|e| DecodeError::Codec(format!("failed to create audio context: {}", e)))?;
    let mut decoder = context
        .decoder()
        .audio()
        .map_err(|e| DecodeError::Codec(format!("failed to get audio decoder: {}", e)))?;

    // 리샘플러는 첫 프레임의 실제 포맷으로 생성 (Opus 등은 파라미터가 부정확)
    let mut resampler: Option<ffmpeg::software::resampling::Context> = None;
    let mut resampled = ffmpeg::frame::Audio::empty();
    let mut planes: Vec<Vec<f32>> = Vec::new();

    let mut run = |decoded: &ffmpeg::frame::Audio,
                   resampler: &mut Option<ffmpeg::software::resampling::Context>,
                   planes: &mut Vec<Vec<f32>>|
     -> Result<(), DecodeError> {
        if resampler.is_none() {
            let mut layout = decoded.channel_layout();
            if layout.is_empty() {
                layout = ffmpeg::ChannelLayout::default(i32::from(decoded.channels()));
            }
            let created = ffmpeg::software::resampling::Context::get(
                decoded.format(),
                layout,
                decoded.rate(),
                ffmpeg::format::Sample::F32(ffmpeg::format::sample::Type::Planar),
                layout,
                sample_rate,
            )
            .map_err(|e| DecodeError::Codec(format!("failed to create resampler: {}", e)))?;
            *resampler = Some(created);
        }
        if let Some(r) = resampler.as_mut() {
            // 손상 프레임 하나는 건너뜀 (이후 패킷은 계속 디코딩)
            if r.run(decoded, &mut resampled).is_ok() && resampled.samples() > 0 {
                append_planes(&resampled, planes);
            }
        }
        Ok(())
    };

    let mut decoded = ffmpeg::frame::Audio::empty();
    for (stream, packet) in input_ctx.packets() {
        if stream.index() != audio_stream_index {
            continue;
        }
        // 오류 패킷은 스킵 - flush하면 디코더 상태가 리셋됨
        if decoder.send_packet(&packet).is_err() {
            continue;
        }
        while decoder.receive_frame(&mut decoded).is_ok() {
            run(&decoded, &mut resampler, &mut planes)?;
        }
    }

    // EOF 플러시
    decoder.send_eof().ok();
    while decoder.receive_frame(&mut decoded).is_ok() {
        run(&decoded, &mut resampler, &mut planes)?;
    }

    // 리샘플러 지연 샘플
    if let Some(r) = resampler.as_mut() {
        let mut tail = ffmpeg::frame::Audio::empty();
        if r.flush(&mut tail).is_ok() && tail.samples() > 0 {
            append_planes(&tail, &mut planes);
        }
    }

    if planes.first().map_or(true, Vec::is_empty) {
        return Err(DecodeError::NoSamples);
    }

    log::debug!(
        "[FFMPEG] 오디오 디코딩: {} ch × {} samples @ {}Hz",
        planes.len(),
        planes[0].len(),
        sample_rate
    );
    Ok(DecodedAudio {
        sample_rate,
        channels: planes,
    })
}
