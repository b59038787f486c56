// H.264 비트스트림 유틸 - Annex B (start code) ↔ AVCC (length prefix)
// MP4 샘플은 length-prefixed 형식이어야 함, SPS/PPS는 avcC 박스로 분리

use crate::error::MuxError;

const NAL_TYPE_IDR: u8 = 5;
const NAL_TYPE_SPS: u8 = 7;
const NAL_TYPE_PPS: u8 = 8;

/// avcC 프로파일 필드를 읽으려면 SPS는 최소 4바이트
const MIN_SPS_LEN: usize = 4;

/// `from` 이후 첫 start code (00 00 01) 위치
pub fn find_start_code(data: &[u8], from: usize) -> Option<usize> {
    if from >= data.len() {
        return None;
    }
    data[from..]
        .windows(3)
        .position(|w| w == [0, 0, 1])
        .map(|i| from + i)
}

fn starts_with_start_code(data: &[u8]) -> bool {
    data.starts_with(&[0, 0, 1]) || data.starts_with(&[0, 0, 0, 1])
}

/// Annex B NAL 유닛 반복자 (start code 제외, trailing zero 제거)
pub struct AnnexBNalIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> AnnexBNalIter<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
}

impl<'a> Iterator for AnnexBNalIter<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        loop {
            let start = find_start_code(self.data, self.pos)? + 3;
            let end = find_start_code(self.data, start).unwrap_or(self.data.len());
            self.pos = end;

            let mut nal = &self.data[start..end];
            // 4바이트 start code의 앞 0x00은 이전 NAL 끝에 붙어 있음
            while let [rest @ .., 0] = nal {
                nal = rest;
            }
            if !nal.is_empty() {
                return Some(nal);
            }
        }
    }
}

fn nal_type(nal: &[u8]) -> u8 {
    nal.first().map_or(0, |b| b & 0x1F)
}

/// SPS / PPS 한 쌍
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvcParameterSets {
    pub sps: Vec<u8>,
    pub pps: Vec<u8>,
}

/// 디코더 설정 → SPS/PPS
/// Annex B (FFmpeg extradata) 또는 avcC (0x01로 시작) 둘 다 허용
pub fn extract_avc_config(config: &[u8]) -> Result<AvcParameterSets, MuxError> {
    let (sps, pps) = if starts_with_start_code(config) {
        let mut sps = None;
        let mut pps = None;
        for nal in AnnexBNalIter::new(config) {
            match nal_type(nal) {
                NAL_TYPE_SPS if sps.is_none() => sps = Some(nal.to_vec()),
                NAL_TYPE_PPS if pps.is_none() => pps = Some(nal.to_vec()),
                _ => {}
            }
        }
        (sps, pps)
    } else if config.first() == Some(&1) {
        parse_avcc_record(config)?
    } else {
        return Err(MuxError::InvalidDecoderConfig(
            "neither Annex B nor avcC".to_string(),
        ));
    };

    let sps = sps.ok_or_else(|| MuxError::InvalidDecoderConfig("missing SPS".to_string()))?;
    let pps = pps.ok_or_else(|| MuxError::InvalidDecoderConfig("missing PPS".to_string()))?;
    if sps.len() < MIN_SPS_LEN {
        return Err(MuxError::InvalidDecoderConfig(format!(
            "SPS too short ({} bytes)",
            sps.len()
        )));
    }
    Ok(AvcParameterSets { sps, pps })
}

/// AVCDecoderConfigurationRecord에서 첫 SPS/PPS 추출
fn parse_avcc_record(record: &[u8]) -> Result<(Option<Vec<u8>>, Option<Vec<u8>>), MuxError> {
    let truncated = || MuxError::InvalidDecoderConfig("truncated avcC record".to_string());

    let mut pos = 5;
    let read_sets = |count: usize, pos: &mut usize| -> Result<Option<Vec<u8>>, MuxError> {
        let mut first = None;
        for _ in 0..count {
            let len_bytes = record.get(*pos..*pos + 2).ok_or_else(truncated)?;
            let len = usize::from(u16::from_be_bytes([len_bytes[0], len_bytes[1]]));
            let set = record.get(*pos + 2..*pos + 2 + len).ok_or_else(truncated)?;
            if first.is_none() {
                first = Some(set.to_vec());
            }
            *pos += 2 + len;
        }
        Ok(first)
    };

    let sps_count = usize::from(*record.get(pos).ok_or_else(truncated)? & 0x1F);
    pos += 1;
    let sps = read_sets(sps_count, &mut pos)?;
    let pps_count = usize::from(*record.get(pos).ok_or_else(truncated)?);
    pos += 1;
    let pps = read_sets(pps_count, &mut pos)?;
    Ok((sps, pps))
}

/// Annex B → 4바이트 length prefix
/// 이미 length-prefixed 이면 검증 후 그대로 반환
pub fn annexb_to_avcc(data: &[u8]) -> Result<Vec<u8>, MuxError> {
    if !starts_with_start_code(data) {
        validate_avcc(data)?;
        return Ok(data.to_vec());
    }

    let mut out = Vec::with_capacity(data.len() + 16);
    for nal in AnnexBNalIter::new(data) {
        // SPS/PPS는 avcC 박스에 있으므로 샘플에서 제외
        if matches!(nal_type(nal), NAL_TYPE_SPS | NAL_TYPE_PPS) {
            continue;
        }
        let len = u32::try_from(nal.len())
            .map_err(|_| MuxError::Unsupported("NAL unit larger than 4 GiB".to_string()))?;
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(nal);
    }
    if out.is_empty() {
        return Err(MuxError::Unsupported("video chunk contains no slice data".to_string()));
    }
    Ok(out)
}

fn validate_avcc(data: &[u8]) -> Result<(), MuxError> {
    let mut pos = 0usize;
    while pos < data.len() {
        let len_bytes = data
            .get(pos..pos + 4)
            .ok_or_else(|| MuxError::Unsupported("malformed length-prefixed NAL".to_string()))?;
        let len = u32::from_be_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]) as usize;
        pos += 4 + len;
    }
    if pos != data.len() || data.is_empty() {
        return Err(MuxError::Unsupported("malformed length-prefixed NAL".to_string()));
    }
    Ok(())
}

/// IDR 슬라이스 포함 여부 (Annex B가 아니면 판단 불가 → None)
pub fn is_h264_keyframe(data: &[u8]) -> Option<bool> {
    if !starts_with_start_code(data) {
        return None;
    }
    Some(AnnexBNalIter::new(data).any(|nal| nal_type(nal) == NAL_TYPE_IDR))
}
