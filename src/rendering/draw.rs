// 라벨 래스터 연산 - RGBA 픽셀 처리
// 배경 채우기 → 중심 기준 회전 → 원형 클리핑 → 중앙 구멍

use image::RgbaImage;

/// 중앙 구멍 비율 (4인치 라벨에 0.25인치 구멍)
pub const CENTER_HOLE_RATIO: f64 = 1.0 / 32.0;

/// 라벨 레이아웃 (캔버스 좌표)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelGeometry {
    pub width: u32,
    pub height: u32,
    pub padding: f64,
    pub show_center_hole: bool,
}

impl LabelGeometry {
    pub fn center(&self) -> (f64, f64) {
        (f64::from(self.width) / 2.0, f64::from(self.height) / 2.0)
    }

    /// 클리핑 원 반지름: `width / 2 - padding`
    pub fn label_radius(&self) -> f64 {
        (f64::from(self.width) / 2.0 - self.padding).max(0.0)
    }

    /// 중앙 구멍 반지름: 라벨 크기 / 32
    pub fn hole_radius(&self) -> f64 {
        let label_size = f64::from(self.width) - self.padding * 2.0;
        (label_size * CENTER_HOLE_RATIO).max(0.0)
    }

    /// 아트워크가 그려지는 영역 크기 (캔버스 - 사방 padding)
    pub fn inner_size(&self) -> (u32, u32) {
        let w = (f64::from(self.width) - self.padding * 2.0).round().max(1.0);
        let h = (f64::from(self.height) - self.padding * 2.0).round().max(1.0);
        (w as u32, h as u32)
    }
}

/// 버퍼 전체를 단색으로 채움
pub fn fill_background(dst: &mut [u8], rgba: [u8; 4]) {
    for px in dst.chunks_exact_mut(4) {
        px.copy_from_slice(&rgba);
    }
}

/// `angle` 라디안만큼 회전한 라벨 그리기 (화면 기준 시계방향, y-down)
///
/// `artwork`는 [`LabelGeometry::inner_size`]로 미리 cover-crop 되어 있어야 함.
/// 원 바깥과 중앙 구멍 안쪽은 배경색 유지
pub fn draw_label(
    dst: &mut [u8],
    geometry: &LabelGeometry,
    artwork: &RgbaImage,
    background: [u8; 4],
    angle: f64,
) {
    fill_background(dst, background);

    let (cx, cy) = geometry.center();
    let radius = geometry.label_radius();
    let radius_sq = radius * radius;
    let hole_sq = if geometry.show_center_hole {
        let r = geometry.hole_radius();
        r * r
    } else {
        -1.0
    };

    let (sin, cos) = angle.sin_cos();
    let art_w = artwork.width();
    let art_h = artwork.height();
    if art_w == 0 || art_h == 0 {
        return;
    }
    let (inner_w, inner_h) = geometry.inner_size();
    let scale_x = f64::from(art_w) / f64::from(inner_w);
    let scale_y = f64::from(art_h) / f64::from(inner_h);

    let width = geometry.width as usize;
    for y in 0..geometry.height as usize {
        let py = y as f64 + 0.5 - cy;
        for x in 0..width {
            let px = x as f64 + 0.5 - cx;
            let dist_sq = px * px + py * py;
            if dist_sq > radius_sq || dist_sq <= hole_sq {
                continue;
            }

            // 역회전: 캔버스 픽셀 → 회전 전 아트워크 좌표
            let sx = cos * px + sin * py + cx - geometry.padding;
            let sy = -sin * px + cos * py + cy - geometry.padding;

            let u = ((sx * scale_x).floor() as i64).clamp(0, i64::from(art_w) - 1) as u32;
            let v = ((sy * scale_y).floor() as i64).clamp(0, i64::from(art_h) - 1) as u32;
            let texel = artwork.get_pixel(u, v).0;

            let idx = (y * width + x) * 4;
            blend_over(&mut dst[idx..idx + 4], texel);
        }
    }
}

/// straight alpha "source over" 합성
fn blend_over(dst: &mut [u8], src: [u8; 4]) {
    let sa = u32::from(src[3]);
    if sa == 255 {
        dst.copy_from_slice(&src);
        return;
    }
    if sa == 0 {
        return;
    }

    let da = u32::from(dst[3]);
    let inv = 255 - sa;
    // out_a는 255배 스케일
    let out_a = sa * 255 + da * inv;
    if out_a == 0 {
        return;
    }
    for c in 0..3 {
        let sc = u32::from(src[c]);
        let dc = u32::from(dst[c]);
        dst[c] = ((sc * sa * 255 + dc * da * inv + out_a / 2) / out_a) as u8;
    }
    dst[3] = ((out_a + 127) / 255) as u8;
}
