use crate::models::{BrandSettings, Variant, WatermarkPosition};
use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};
use tracing::warn;

/// Brand settings plus the decoded logo, fixed for the lifetime of one request or job.
#[derive(Debug, Clone, Default)]
pub struct WatermarkSnapshot {
    pub settings: BrandSettings,
    pub logo: Option<RgbaImage>,
}

impl WatermarkSnapshot {
    pub fn new(settings: BrandSettings, logo: Option<RgbaImage>) -> Self {
        Self { settings, logo }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn applies_to(&self, variant: Variant) -> bool {
        self.settings.applies_to(variant)
    }

    /// Decodes logo bytes; a corrupt logo yields `None` so callers fall back to the text mark.
    pub fn decode_logo(bytes: &[u8]) -> Option<RgbaImage> {
        match image::load_from_memory(bytes) {
            Ok(logo) => Some(logo.to_rgba8()),
            Err(e) => {
                warn!("Watermark logo could not be decoded, using text mark: {}", e);
                None
            }
        }
    }
}

pub fn composite_watermark(
    image: &DynamicImage,
    snapshot: &WatermarkSnapshot,
    min_mark_px: u32,
    padding_fraction: f32,
) -> DynamicImage {
    let settings = &snapshot.settings;
    if !settings.wm_enabled {
        return image.clone();
    }

    let (width, height) = image.dimensions();
    let long_edge = width.max(height);
    let target = ((settings.wm_scale as f64 * long_edge as f64).round() as u32).max(min_mark_px);

    let logo = if settings.wm_use_logo {
        snapshot.logo.as_ref()
    } else {
        None
    };
    let mut mark = match logo {
        Some(logo) => scale_logo(logo, target),
        None => render_text_mark(&settings.mark_text(), target),
    };
    apply_opacity(&mut mark, settings.wm_opacity);

    let padding = (padding_fraction as f64 * long_edge as f64).round() as i64;
    let (x, y) = anchor_offset(
        settings.wm_position,
        (width, height),
        mark.dimensions(),
        padding,
    );

    let mut canvas = image.to_rgba8();
    imageops::overlay(&mut canvas, &mark, x, y);
    DynamicImage::ImageRgba8(canvas)
}

fn scale_logo(logo: &RgbaImage, longer_side: u32) -> RgbaImage {
    let (lw, lh) = logo.dimensions();
    if lw == 0 || lh == 0 {
        return logo.clone();
    }
    let (w, h) = if lw >= lh {
        let h = (lh as f64 * longer_side as f64 / lw as f64).round() as u32;
        (longer_side, h.max(1))
    } else {
        let w = (lw as f64 * longer_side as f64 / lh as f64).round() as u32;
        (w.max(1), longer_side)
    };
    imageops::resize(logo, w, h, FilterType::Lanczos3)
}

/// Renders `text` with the 8x8 bitmap font onto a transparent canvas `width` pixels wide.
fn render_text_mark(text: &str, width: u32) -> RgbaImage {
    let glyphs: Vec<[u8; 8]> = text
        .chars()
        .map(|c| {
            BASIC_FONTS
                .get(c)
                .or_else(|| BASIC_FONTS.get('?'))
                .unwrap_or([0; 8])
        })
        .collect();
    let count = glyphs.len().max(1) as u32;

    let cell = (width.saturating_sub(1) / (8 * count)).max(1);
    let text_w = 8 * count * cell;
    let text_h = 8 * cell;
    let shadow = (cell / 4).max(1);

    let canvas_w = width.max(text_w + shadow);
    let canvas_h = text_h + 2 * cell;
    let mut canvas = RgbaImage::from_pixel(canvas_w, canvas_h, Rgba([0, 0, 0, 0]));

    let origin_x = (canvas_w - text_w - shadow) / 2;
    let origin_y = cell;

    // shadow first, then the glyphs on top
    for (color, offset) in [(Rgba([0, 0, 0, 160]), shadow), (Rgba([255, 255, 255, 255]), 0)] {
        for (index, glyph) in glyphs.iter().enumerate() {
            let glyph_x = origin_x + index as u32 * 8 * cell + offset;
            for (row, bits) in glyph.iter().enumerate() {
                for col in 0..8u32 {
                    if bits & (1 << col) == 0 {
                        continue;
                    }
                    let px = glyph_x + col * cell;
                    let py = origin_y + row as u32 * cell + offset;
                    for dy in 0..cell {
                        for dx in 0..cell {
                            let (x, y) = (px + dx, py + dy);
                            if x < canvas_w && y < canvas_h {
                                canvas.put_pixel(x, y, color);
                            }
                        }
                    }
                }
            }
        }
    }

    canvas
}

fn apply_opacity(mark: &mut RgbaImage, opacity: f32) {
    let opacity = opacity.clamp(0.0, 1.0);
    for pixel in mark.pixels_mut() {
        pixel[3] = (pixel[3] as f32 * opacity).round() as u8;
    }
}

/// Top-left corner of the mark for a given anchor, `padding` pixels from the nearest edges.
pub fn anchor_offset(
    position: WatermarkPosition,
    (width, height): (u32, u32),
    (mark_w, mark_h): (u32, u32),
    padding: i64,
) -> (i64, i64) {
    let (w, h, mw, mh) = (width as i64, height as i64, mark_w as i64, mark_h as i64);
    let left = padding;
    let center_x = (w - mw) / 2;
    let right = w - mw - padding;
    let top = padding;
    let center_y = (h - mh) / 2;
    let bottom = h - mh - padding;

    match position {
        WatermarkPosition::TopLeft => (left, top),
        WatermarkPosition::Top => (center_x, top),
        WatermarkPosition::TopRight => (right, top),
        WatermarkPosition::Left => (left, center_y),
        WatermarkPosition::Center => (center_x, center_y),
        WatermarkPosition::Right => (right, center_y),
        WatermarkPosition::BottomLeft => (left, bottom),
        WatermarkPosition::Bottom => (center_x, bottom),
        WatermarkPosition::BottomRight => (right, bottom),
    }
}
