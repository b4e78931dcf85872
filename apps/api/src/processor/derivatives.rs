use crate::config::DerivativeConfig;
use crate::error::{AppError, AppResult};
use crate::models::{DownloadSize, Variant};
use crate::processor::watermark::{composite_watermark, WatermarkSnapshot};
use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{DynamicImage, GenericImageView, RgbImage};
use std::path::Path;

/// How a variant is sized before encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Geometry {
    Box { max_w: u32, max_h: u32 },
    LongestEdge(u32),
    Unchanged,
}

#[derive(Debug, Clone, Copy)]
pub struct RenderPlan {
    pub geometry: Geometry,
    pub quality: u8,
}

pub fn render_plan(variant: Variant, config: &DerivativeConfig) -> RenderPlan {
    match variant {
        Variant::Thumb => RenderPlan {
            geometry: Geometry::Box {
                max_w: config.thumb_box,
                max_h: config.thumb_box,
            },
            quality: config.thumb_quality,
        },
        Variant::Preview => RenderPlan {
            geometry: Geometry::Box {
                max_w: config.preview_box,
                max_h: config.preview_box,
            },
            quality: config.preview_quality,
        },
        Variant::Original => RenderPlan {
            geometry: Geometry::Unchanged,
            quality: config.download_quality,
        },
        Variant::Download(size) => RenderPlan {
            geometry: Geometry::LongestEdge(match size {
                DownloadSize::Large => config.large_edge,
                DownloadSize::Medium => config.medium_edge,
                DownloadSize::Web => config.web_edge,
            }),
            quality: config.download_quality,
        },
    }
}

/// Decodes an original from disk and applies its EXIF orientation.
pub fn open_original(path: &Path) -> AppResult<DynamicImage> {
    let bytes = std::fs::read(path)?;
    let mut image = decode_tolerant(&bytes)?;
    if let Some(orientation) = read_orientation(&bytes) {
        image.apply_orientation(orientation);
    }
    Ok(image)
}

/// Decodes `bytes`, retrying a JPEG that lost its end-of-image marker once with the marker restored.
pub fn decode_tolerant(bytes: &[u8]) -> AppResult<DynamicImage> {
    match image::load_from_memory(bytes) {
        Ok(image) => Ok(image),
        Err(first) => {
            let is_jpeg = bytes.starts_with(&[0xFF, 0xD8]);
            let has_eoi = bytes.ends_with(&[0xFF, 0xD9]);
            if is_jpeg && !has_eoi {
                let mut patched = Vec::with_capacity(bytes.len() + 2);
                patched.extend_from_slice(bytes);
                patched.extend_from_slice(&[0xFF, 0xD9]);
                if let Ok(image) = image::load_from_memory(&patched) {
                    tracing::debug!("Decoded truncated JPEG after restoring EOI marker");
                    return Ok(image);
                }
            }
            Err(AppError::UnprocessableAsset(format!(
                "Could not decode image: {}",
                first
            )))
        }
    }
}

fn read_orientation(bytes: &[u8]) -> Option<Orientation> {
    let mut cursor = std::io::Cursor::new(bytes);
    let exif = exif::Reader::new().read_from_container(&mut cursor).ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    let value = field.value.get_uint(0)?;
    Orientation::from_exif(u8::try_from(value).ok()?)
}

/// Target size for fitting `width`x`height` inside a `max_w`x`max_h` box without upscaling.
pub fn fit_dimensions(width: u32, height: u32, max_w: u32, max_h: u32) -> (u32, u32) {
    if width == 0 || height == 0 || (width <= max_w && height <= max_h) {
        return (width, height);
    }

    let width_ratio = max_w as f64 / width as f64;
    let height_ratio = max_h as f64 / height as f64;

    if width_ratio <= height_ratio {
        let scaled = (height as f64 * width_ratio).round() as u32;
        (max_w.max(1), scaled.max(1))
    } else {
        let scaled = (width as f64 * height_ratio).round() as u32;
        (scaled.max(1), max_h.max(1))
    }
}

pub fn make_box(image: &DynamicImage, max_w: u32, max_h: u32) -> DynamicImage {
    let (width, height) = image.dimensions();
    let (target_w, target_h) = fit_dimensions(width, height, max_w, max_h);
    if (target_w, target_h) == (width, height) {
        return image.clone();
    }
    image.resize_exact(target_w, target_h, FilterType::Lanczos3)
}

/// Scales so the longer side equals `longest_px`; smaller images are returned at their own size.
pub fn make_longest_edge(image: &DynamicImage, longest_px: u32) -> DynamicImage {
    make_box(image, longest_px, longest_px)
}

/// Encodes a progressive baseline-compatible JPEG. Transparency is flattened onto white.
pub fn encode_jpeg(image: &DynamicImage, quality: u8) -> AppResult<Vec<u8>> {
    let rgb = flatten_to_rgb(image);
    let (width, height) = rgb.dimensions();
    let (w, h) = match (u16::try_from(width), u16::try_from(height)) {
        (Ok(w), Ok(h)) => (w, h),
        _ => {
            return Err(AppError::UnprocessableAsset(format!(
                "Image {}x{} exceeds JPEG limits",
                width, height
            )))
        }
    };

    let mut buffer = Vec::new();
    let mut encoder = jpeg_encoder::Encoder::new(&mut buffer, quality.clamp(1, 100));
    encoder.set_progressive(true);
    encoder
        .encode(rgb.as_raw(), w, h, jpeg_encoder::ColorType::Rgb)
        .map_err(|e| AppError::Internal(format!("JPEG encoding failed: {}", e)))?;
    Ok(buffer)
}

fn flatten_to_rgb(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }

    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut out = RgbImage::new(width, height);
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let alpha = pixel[3] as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        out.put_pixel(x, y, image::Rgb([blend(pixel[0]), blend(pixel[1]), blend(pixel[2])]));
    }
    out
}

/// Produces the encoded bytes for one variant of an already-decoded original.
pub fn render_variant(
    source: &DynamicImage,
    variant: Variant,
    config: &DerivativeConfig,
    snapshot: &WatermarkSnapshot,
) -> AppResult<Vec<u8>> {
    let plan = render_plan(variant, config);
    let sized = match plan.geometry {
        Geometry::Box { max_w, max_h } => make_box(source, max_w, max_h),
        Geometry::LongestEdge(edge) => make_longest_edge(source, edge),
        Geometry::Unchanged => source.clone(),
    };

    let finished = if snapshot.applies_to(variant) {
        composite_watermark(&sized, snapshot, config.min_mark_px, config.padding_fraction)
    } else {
        sized
    };

    encode_jpeg(&finished, plan.quality)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BrandSettings;
    use crate::test_utils::{gradient_image, jpeg_bytes};

    fn ratio(w: u32, h: u32) -> f64 {
        ((w as f64 / h as f64) * 100.0).round() / 100.0
    }

    #[test]
    fn test_longest_edge_preserves_aspect() {
        for (w, h, edge) in [(4000, 3000, 1200), (3000, 4000, 1024), (6000, 4000, 2048), (1500, 1000, 640)] {
            let (nw, nh) = fit_dimensions(w, h, edge, edge);
            assert_eq!(nw.max(nh), edge, "{}x{} -> {}", w, h, edge);
            assert_eq!(ratio(nw, nh), ratio(w, h));
        }
    }

    #[test]
    fn test_no_upscaling() {
        assert_eq!(fit_dimensions(800, 600, 1200, 1200), (800, 600));
        assert_eq!(fit_dimensions(1200, 900, 1200, 1200), (1200, 900));

        let image = gradient_image(300, 200);
        let out = make_longest_edge(&image, 1024);
        assert_eq!(out.dimensions(), (300, 200));
    }

    #[test]
    fn test_dimensions_never_collapse_to_zero() {
        assert_eq!(fit_dimensions(10000, 3, 100, 100), (100, 1));
        assert_eq!(fit_dimensions(2, 5000, 320, 320), (1, 320));
    }

    #[test]
    fn test_box_respects_both_bounds() {
        let (w, h) = fit_dimensions(4000, 1000, 1280, 200);
        assert_eq!((w, h), (800, 200));
        let image = gradient_image(640, 480);
        assert_eq!(make_box(&image, 320, 320).dimensions(), (320, 240));
    }

    #[test]
    fn test_encode_is_opaque_progressive_jpeg() {
        let rgba = DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
            40,
            30,
            image::Rgba([0, 0, 0, 0]),
        ));
        let bytes = encode_jpeg(&rgba, 85).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        // SOF2 marks a progressive frame
        assert!(bytes.windows(2).any(|w| w == [0xFF, 0xC2]));

        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (40, 30));
        assert!(!decoded.color().has_alpha());
        let px = decoded.to_rgb8().get_pixel(20, 15).0;
        assert!(px.iter().all(|c| *c > 240), "transparent areas flatten to white: {:?}", px);
    }

    #[test]
    fn test_decode_tolerates_missing_eoi() {
        let mut bytes = jpeg_bytes(64, 48);
        assert!(bytes.ends_with(&[0xFF, 0xD9]));
        bytes.truncate(bytes.len() - 2);
        let image = decode_tolerant(&bytes).unwrap();
        assert_eq!(image.dimensions(), (64, 48));
    }

    #[test]
    fn test_decode_garbage_is_unprocessable() {
        let err = decode_tolerant(b"definitely not an image").unwrap_err();
        assert!(matches!(err, AppError::UnprocessableAsset(_)));
    }

    #[test]
    fn test_disabled_watermark_is_pixel_identical() {
        let config = DerivativeConfig::default();
        let source = gradient_image(1600, 1200);
        let snapshot = WatermarkSnapshot::new(
            BrandSettings {
                wm_enabled: false,
                ..BrandSettings::default()
            },
            None,
        );

        let rendered = render_variant(
            &source,
            Variant::Download(DownloadSize::Web),
            &config,
            &snapshot,
        )
        .unwrap();
        let plain = encode_jpeg(&make_longest_edge(&source, config.web_edge), config.download_quality).unwrap();

        assert_eq!(rendered, plain);
    }

    #[test]
    fn test_render_plan_per_variant() {
        let config = DerivativeConfig::default();
        assert_eq!(
            render_plan(Variant::Thumb, &config).geometry,
            Geometry::Box { max_w: 320, max_h: 320 }
        );
        assert_eq!(
            render_plan(Variant::Download(DownloadSize::Medium), &config).geometry,
            Geometry::LongestEdge(1200)
        );
        assert_eq!(render_plan(Variant::Original, &config).geometry, Geometry::Unchanged);
    }
}
