use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba};

use crate::config::Branding;
use crate::error::{AuditError, Result};
use crate::glyphs;
use crate::models::AuditSummary;

pub const PLACEHOLDER: &str = "UNKNOWN";

const BAND_HEIGHT: u32 = 50;
const BAND_FILL: Rgba<u8> = Rgba([30, 64, 175, 200]);
const BADGE_FILL: Rgba<u8> = Rgba([34, 197, 94, 220]);
const BADGE_WIDTH: u32 = 120;
const BADGE_HEIGHT: u32 = 60;
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const TEXT_MARGIN: u32 = 10;
const BADGE_TEXT: &str = "AI VERIFIED";
const JPEG_QUALITY: u8 = 95;

/// Provenance text for the bands. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WatermarkInfo {
    pub audit_id: Option<String>,
    pub inspector_id: Option<String>,
    pub timestamp: Option<String>,
    pub label: Option<String>,
}

impl WatermarkInfo {
    pub fn from_summary(summary: &AuditSummary) -> Self {
        let metadata = &summary.metadata;
        Self {
            audit_id: Some(metadata.audit_id.clone()).filter(|id| !id.is_empty()),
            inspector_id: metadata
                .inspector_id
                .clone()
                .or_else(|| metadata.inspector_name.clone()),
            timestamp: metadata
                .timestamp
                .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string()),
            label: metadata.material_type.map(|m| m.as_str().to_string()),
        }
    }

    pub fn top_line(&self, branding: &Branding) -> String {
        format!(
            "{} | {} | {} | {}",
            branding.system_label,
            or_placeholder(&self.audit_id),
            or_placeholder(&self.inspector_id),
            or_placeholder(&self.label).to_uppercase(),
        )
    }

    pub fn bottom_line(&self, branding: &Branding) -> String {
        format!(
            "{} | {}",
            or_placeholder(&self.timestamp),
            branding.jurisdiction_label
        )
    }
}

fn or_placeholder(field: &Option<String>) -> &str {
    match field.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => value,
        _ => PLACEHOLDER,
    }
}

/// Composites the top and bottom bands, plus the AI badge when
/// `ai_verified`, onto a copy of `image`.
pub fn watermark(
    image: &DynamicImage,
    info: &WatermarkInfo,
    branding: &Branding,
    ai_verified: bool,
) -> RgbImage {
    let mut canvas = image.to_rgb8();
    let (width, height) = canvas.dimensions();
    if width == 0 || height == 0 {
        return canvas;
    }

    let band = BAND_HEIGHT.min((height / 3).max(1));
    let scale = if band >= 30 { 2 } else { 1 };
    let text_height = glyphs::GLYPH_HEIGHT * scale;
    let text_offset = band.saturating_sub(text_height) / 2;

    fill_rect(&mut canvas, 0, 0, width, band, BAND_FILL);
    draw_text(&mut canvas, TEXT_MARGIN, text_offset, &info.top_line(branding), scale);

    let bottom = height - band;
    fill_rect(&mut canvas, 0, bottom, width, band, BAND_FILL);
    draw_text(
        &mut canvas,
        TEXT_MARGIN,
        bottom + text_offset,
        &info.bottom_line(branding),
        scale,
    );

    if ai_verified {
        let badge_w = BADGE_WIDTH.min(width);
        let badge_h = BADGE_HEIGHT.min(height);
        let x = width - badge_w;
        let y = (height / 2).saturating_sub(badge_h / 2);
        fill_rect(&mut canvas, x, y, badge_w, badge_h, BADGE_FILL);
        draw_text(
            &mut canvas,
            x + badge_w.saturating_sub(glyphs::text_width(BADGE_TEXT, 1)) / 2,
            y + badge_h.saturating_sub(glyphs::GLYPH_HEIGHT) / 2,
            BADGE_TEXT,
            1,
        );
    }

    canvas
}

/// Decodes `bytes`, watermarks them, and re-encodes as JPEG.
pub fn watermark_bytes(
    bytes: &[u8],
    info: &WatermarkInfo,
    branding: &Branding,
    ai_verified: bool,
) -> Result<Vec<u8>> {
    watermark_bytes_as(bytes, info, branding, ai_verified, ImageFormat::Jpeg)
}

/// Like `watermark_bytes`, but PNG output stays lossless. Any other format
/// is written as JPEG.
pub fn watermark_bytes_as(
    bytes: &[u8],
    info: &WatermarkInfo,
    branding: &Branding,
    ai_verified: bool,
    format: ImageFormat,
) -> Result<Vec<u8>> {
    let decoded = decode(bytes)?;
    let marked = watermark(&decoded, info, branding, ai_verified);
    let encoded = match format {
        ImageFormat::Png => encode_png(&marked)?,
        _ => encode_jpeg(&marked)?,
    };
    tracing::debug!(
        width = marked.width(),
        height = marked.height(),
        bytes = encoded.len(),
        "watermarked image"
    );
    Ok(encoded)
}

pub fn decode(bytes: &[u8]) -> Result<DynamicImage> {
    let format = image::guess_format(bytes)
        .map_err(|e| AuditError::InvalidImage(format!("unrecognised image data: {e}")))?;
    Ok(image::load_from_memory_with_format(bytes, format)?)
}

pub fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY);
    encoder.encode_image(image)?;
    Ok(buffer)
}

pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png)?;
    Ok(buffer.into_inner())
}

fn fill_rect(canvas: &mut RgbImage, x: u32, y: u32, w: u32, h: u32, fill: Rgba<u8>) {
    let (width, height) = canvas.dimensions();
    let alpha = u32::from(fill[3]);
    for py in y..(y + h).min(height) {
        for px in x..(x + w).min(width) {
            let pixel = canvas.get_pixel_mut(px, py);
            for channel in 0..3 {
                let under = u32::from(pixel[channel]);
                let over = u32::from(fill[channel]);
                pixel[channel] = ((over * alpha + under * (255 - alpha) + 127) / 255) as u8;
            }
        }
    }
}

fn draw_text(canvas: &mut RgbImage, x: u32, y: u32, text: &str, scale: u32) {
    let (width, height) = canvas.dimensions();
    let advance = (glyphs::GLYPH_WIDTH + glyphs::GLYPH_SPACING) * scale;
    let mut cursor = x;

    for c in text.chars() {
        if cursor >= width {
            break;
        }
        let rows = glyphs::glyph(c);
        for row in 0..glyphs::GLYPH_HEIGHT {
            for col in 0..glyphs::GLYPH_WIDTH {
                if !glyphs::is_set(&rows, col, row) {
                    continue;
                }
                for dy in 0..scale {
                    for dx in 0..scale {
                        let px = cursor + col * scale + dx;
                        let py = y + row * scale + dy;
                        if px < width && py < height {
                            canvas.put_pixel(px, py, TEXT_COLOR);
                        }
                    }
                }
            }
        }
        cursor += advance;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([128, 128, 128])))
    }

    fn full_info() -> WatermarkInfo {
        WatermarkInfo {
            audit_id: Some("AUDIT-20260301-101500-RAV".to_string()),
            inspector_id: Some("INS-042".to_string()),
            timestamp: Some("2026-03-01 10:15:00".to_string()),
            label: Some("sacks".to_string()),
        }
    }

    #[test]
    fn missing_fields_render_as_placeholder() {
        let branding = Branding::default();
        let info = WatermarkInfo::default();
        assert_eq!(
            info.top_line(&branding),
            "JUTEVISION | UNKNOWN | UNKNOWN | UNKNOWN"
        );
        assert_eq!(
            info.bottom_line(&branding),
            "UNKNOWN | MINISTRY OF TEXTILES, GOI"
        );
    }

    #[test]
    fn blank_fields_also_use_placeholder() {
        let info = WatermarkInfo {
            audit_id: Some("   ".to_string()),
            ..full_info()
        };
        assert!(info.top_line(&Branding::default()).contains("| UNKNOWN |"));
    }

    #[test]
    fn top_line_carries_ids_and_material() {
        let line = full_info().top_line(&Branding::default());
        assert_eq!(line, "JUTEVISION | AUDIT-20260301-101500-RAV | INS-042 | SACKS");
    }

    #[test]
    fn bands_tint_edges_and_leave_middle_untouched() {
        let source = gray_image(400, 300);
        let marked = watermark(&source, &full_info(), &Branding::default(), false);

        assert_eq!(marked.dimensions(), (400, 300));
        // Right edge of the top band is past the text, so only the fill shows.
        let top = marked.get_pixel(399, 2);
        assert!(top[2] > top[0], "band should be blue tinted: {top:?}");
        assert_ne!(*top, Rgb([128, 128, 128]));
        let bottom = marked.get_pixel(399, 297);
        assert_eq!(top, bottom);
        assert_eq!(*marked.get_pixel(200, 150), Rgb([128, 128, 128]));
    }

    #[test]
    fn band_is_semi_transparent() {
        let black = DynamicImage::ImageRgb8(RgbImage::from_pixel(400, 300, Rgb([0, 0, 0])));
        let white = DynamicImage::ImageRgb8(RgbImage::from_pixel(400, 300, Rgb([255, 255, 255])));
        let info = WatermarkInfo::default();
        let on_black = watermark(&black, &info, &Branding::default(), false);
        let on_white = watermark(&white, &info, &Branding::default(), false);
        assert_ne!(on_black.get_pixel(399, 2), on_white.get_pixel(399, 2));
    }

    #[test]
    fn text_pixels_are_white() {
        let marked = watermark(&gray_image(600, 300), &full_info(), &Branding::default(), false);
        let white = marked
            .enumerate_pixels()
            .filter(|(_, y, p)| *y < BAND_HEIGHT && **p == TEXT_COLOR)
            .count();
        assert!(white > 0);
    }

    #[test]
    fn ai_badge_only_when_verified() {
        let source = gray_image(400, 300);
        let plain = watermark(&source, &full_info(), &Branding::default(), false);
        let badged = watermark(&source, &full_info(), &Branding::default(), true);

        assert_eq!(*plain.get_pixel(398, 150), Rgb([128, 128, 128]));
        let badge = badged.get_pixel(398, 130);
        assert!(badge[1] > badge[0] && badge[1] > badge[2], "badge should be green: {badge:?}");
    }

    #[test]
    fn badge_text_is_centred_horizontally() {
        let badged = watermark(&gray_image(400, 300), &full_info(), &Branding::default(), true);
        let badge_x = 400 - BADGE_WIDTH;
        let lit: Vec<u32> = badged
            .enumerate_pixels()
            .filter(|(x, y, p)| *x >= badge_x && (120..180).contains(y) && **p == TEXT_COLOR)
            .map(|(x, _, _)| x)
            .collect();

        let width = glyphs::text_width(BADGE_TEXT, 1);
        let left = badge_x + (BADGE_WIDTH - width) / 2;
        assert_eq!(lit.iter().min().copied(), Some(left));
        assert_eq!(lit.iter().max().copied(), Some(left + width - 1));
    }

    #[test]
    fn source_image_is_not_modified() {
        let source = gray_image(200, 120);
        let before = source.clone();
        let _ = watermark(&source, &WatermarkInfo::default(), &Branding::default(), true);
        assert_eq!(source, before);
    }

    #[test]
    fn tiny_images_do_not_panic() {
        for (w, h) in [(1, 1), (3, 2), (10, 200), (300, 4)] {
            let marked = watermark(&gray_image(w, h), &full_info(), &Branding::default(), true);
            assert_eq!(marked.dimensions(), (w, h));
        }
    }

    #[test]
    fn undecodable_bytes_are_invalid_image() {
        let err = watermark_bytes(b"not an image", &full_info(), &Branding::default(), false)
            .unwrap_err();
        assert!(matches!(err, AuditError::InvalidImage(_)));
    }

    #[test]
    fn truncated_png_is_invalid_image() {
        let png = encode_png(&RgbImage::from_pixel(64, 64, Rgb([10, 20, 30]))).unwrap();
        let err = watermark_bytes(&png[..png.len() / 2], &full_info(), &Branding::default(), false)
            .unwrap_err();
        assert!(matches!(err, AuditError::InvalidImage(_)));
    }

    #[test]
    fn png_output_is_lossless() {
        let png = encode_png(&RgbImage::from_pixel(200, 150, Rgb([128, 128, 128]))).unwrap();
        let branding = Branding::default();
        let out =
            watermark_bytes_as(&png, &full_info(), &branding, false, ImageFormat::Png).unwrap();

        assert_eq!(image::guess_format(&out).unwrap(), ImageFormat::Png);
        let expected = watermark(&decode(&png).unwrap(), &full_info(), &branding, false);
        assert_eq!(decode(&out).unwrap().to_rgb8(), expected);
    }

    #[test]
    fn png_input_comes_back_as_jpeg() {
        let png = encode_png(&RgbImage::from_pixel(320, 240, Rgb([90, 60, 30]))).unwrap();
        let jpeg = watermark_bytes(&png, &full_info(), &Branding::default(), true).unwrap();

        assert_eq!(image::guess_format(&jpeg).unwrap(), ImageFormat::Jpeg);
        let decoded = decode(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (320, 240));
    }
}
