// 라벨 렌더러 - 회전 각도 → RGBA 프레임
// 호출마다 독립 버퍼 반환 (다음 프레임과 공유 없음)

use image::imageops::FilterType;
use image::{DynamicImage, RgbaImage};

use crate::config::LabelStyle;
use crate::error::{ExportError, ExportResult};
use crate::rendering::draw::{self, LabelGeometry};

// ============================================================
// 래스터 프레임
// ============================================================

/// 렌더링된 프레임 데이터 (RGBA, `width * height * 4` 바이트)
#[derive(Clone, PartialEq, Eq)]
pub struct RasterFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl RasterFrame {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0u8; width as usize * height as usize * 4],
        }
    }

    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }

    pub fn is_well_formed(&self) -> bool {
        self.data.len() == self.expected_len()
    }
}

impl std::fmt::Debug for RasterFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

// ============================================================
// 렌더러 인터페이스
// ============================================================

/// 회전 각도 하나당 프레임 하나 생성
///
/// Export 파이프라인은 블랙박스로 취급. 다음 호출 이후에도 인코더가 보관할 수 있도록
/// 소유권 있는 버퍼를 반환해야 함
pub trait FrameRenderer: Send {
    fn configure(&mut self, width: u32, height: u32);
    fn dimensions(&self) -> (u32, u32);
    fn render_frame(&mut self, angle: f64) -> RasterFrame;
}

// ============================================================
// 라벨 렌더러
// ============================================================

/// 회전 라벨 렌더러: 배경 + 회전된 원형 아트워크 + 중앙 구멍
pub struct LabelRenderer {
    style: LabelStyle,
    background: [u8; 4],
    /// 원본 아트워크
    source: RgbaImage,
    /// 현재 inner 영역에 맞춰 cover-crop 된 아트워크
    cropped: RgbaImage,
    geometry: LabelGeometry,
}

impl LabelRenderer {
    pub fn new(artwork: RgbaImage, style: LabelStyle, width: u32, height: u32) -> ExportResult<Self> {
        if artwork.width() == 0 || artwork.height() == 0 {
            return Err(ExportError::render("label artwork is empty"));
        }
        let background = style.background_rgba()?;
        let geometry = Self::layout(&style, width, height);
        let cropped = cover_crop(&artwork, geometry.inner_size());
        Ok(Self {
            style,
            background,
            source: artwork,
            cropped,
            geometry,
        })
    }

    /// PNG/JPEG 바이트 → 아트워크
    pub fn from_encoded(bytes: &[u8], style: LabelStyle, width: u32, height: u32) -> ExportResult<Self> {
        let artwork = image::load_from_memory(bytes)
            .map_err(|e| ExportError::render(format!("failed to decode label artwork: {e}")))?
            .to_rgba8();
        Self::new(artwork, style, width, height)
    }

    pub fn style(&self) -> &LabelStyle {
        &self.style
    }

    pub fn set_style(&mut self, style: LabelStyle) -> ExportResult<()> {
        self.background = style.background_rgba()?;
        let geometry = Self::layout(&style, self.geometry.width, self.geometry.height);
        if geometry.inner_size() != self.geometry.inner_size() {
            self.cropped = cover_crop(&self.source, geometry.inner_size());
        }
        self.geometry = geometry;
        self.style = style;
        Ok(())
    }

    /// 아트워크 교체 (스타일/캔버스 크기 유지)
    pub fn set_artwork(&mut self, artwork: RgbaImage) -> ExportResult<()> {
        if artwork.width() == 0 || artwork.height() == 0 {
            return Err(ExportError::render("label artwork is empty"));
        }
        self.cropped = cover_crop(&artwork, self.geometry.inner_size());
        self.source = artwork;
        Ok(())
    }

    fn layout(style: &LabelStyle, width: u32, height: u32) -> LabelGeometry {
        let padding = f64::from(style.padding_percent.clamp(0.0, 50.0)) / 100.0 * f64::from(width);
        LabelGeometry {
            width,
            height,
            padding,
            show_center_hole: style.show_center_hole,
        }
    }
}

impl FrameRenderer for LabelRenderer {
    fn configure(&mut self, width: u32, height: u32) {
        if (width, height) == (self.geometry.width, self.geometry.height) {
            return;
        }
        self.geometry = Self::layout(&self.style, width, height);
        self.cropped = cover_crop(&self.source, self.geometry.inner_size());
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.geometry.width, self.geometry.height)
    }

    fn render_frame(&mut self, angle: f64) -> RasterFrame {
        let mut frame = RasterFrame::new(self.geometry.width, self.geometry.height);
        draw::draw_label(&mut frame.data, &self.geometry, &self.cropped, self.background, angle);
        frame
    }
}

/// 비율 유지하며 `size`를 덮도록 스케일 후 넘치는 부분 중앙 기준 crop
fn cover_crop(source: &RgbaImage, (width, height): (u32, u32)) -> RgbaImage {
    if source.dimensions() == (width, height) {
        return source.clone();
    }
    DynamicImage::ImageRgba8(source.clone())
        .resize_to_fill(width, height, FilterType::Triangle)
        .to_rgba8()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn solid(w: u32, h: u32, rgba: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba(rgba))
    }

    fn style(padding_percent: f32) -> LabelStyle {
        LabelStyle {
            padding_percent,
            background_color: "#102030".to_string(),
            show_center_hole: false,
        }
    }

    #[test]
    fn frames_are_owned_and_sized() {
        let mut renderer = LabelRenderer::new(solid(32, 32, [200, 0, 0, 255]), style(0.0), 32, 32).unwrap();
        let a = renderer.render_frame(0.0);
        let b = renderer.render_frame(1.0);
        assert!(a.is_well_formed());
        assert_eq!(a.data.len(), 32 * 32 * 4);
        // 단색 아트워크는 회전해도 동일
        assert_eq!(a, b);
    }

    #[test]
    fn padding_shrinks_the_label() {
        let mut renderer = LabelRenderer::new(solid(20, 20, [200, 0, 0, 255]), style(25.0), 40, 40).unwrap();
        let frame = renderer.render_frame(0.0);
        // padding = 10px: x=5는 반지름 10 원 바깥
        let idx = (20 * 40 + 5) * 4;
        assert_eq!(&frame.data[idx..idx + 4], &[0x10, 0x20, 0x30, 255]);
        let idx = (20 * 40 + 20) * 4;
        assert_eq!(&frame.data[idx..idx + 4], &[200, 0, 0, 255]);
    }

    #[test]
    fn configure_changes_output_size() {
        let mut renderer = LabelRenderer::new(solid(8, 8, [1, 2, 3, 255]), style(5.0), 32, 32).unwrap();
        renderer.configure(64, 48);
        assert_eq!(renderer.dimensions(), (64, 48));
        let frame = renderer.render_frame(0.3);
        assert_eq!((frame.width, frame.height), (64, 48));
        assert!(frame.is_well_formed());
    }

    #[test]
    fn cover_crop_fills_target() {
        let wide = solid(300, 100, [0, 255, 0, 255]);
        let cropped = cover_crop(&wide, (50, 50));
        assert_eq!(cropped.dimensions(), (50, 50));
    }

    #[test]
    fn rejects_empty_artwork_and_bad_colors() {
        assert!(LabelRenderer::new(RgbaImage::new(0, 0), style(0.0), 8, 8).is_err());
        let mut bad = style(0.0);
        bad.background_color = "red".to_string();
        assert!(LabelRenderer::new(solid(2, 2, [0, 0, 0, 255]), bad, 8, 8).is_err());
    }

    #[test]
    fn undecodable_artwork_is_a_render_error() {
        let err = LabelRenderer::from_encoded(b"not an image", style(0.0), 8, 8)
            .err()
            .unwrap();
        assert!(matches!(err, ExportError::Render(_)));
    }
}
