//! Mask and matte coverage shared by every raster backend.

use crate::convert;
use crate::pixels::PixelView;
use kurbo::Affine;
use lottie_core::{Mask, MaskMode, MatteMode};

/// Combines `masks` into one 8-bit coverage value per device pixel.
///
/// Each mask is rasterized under `transform`, inverted and scaled by its
/// opacity, then merged into the running coverage with its mode. The first
/// mask starts from empty coverage when it adds or lightens and from full
/// coverage otherwise.
pub fn mask_coverage(masks: &[Mask], transform: Affine, width: u32, height: u32) -> Vec<u8> {
    let len = width as usize * height as usize;
    let seed = match masks.first().map(|m| m.mode) {
        Some(MaskMode::Add) | Some(MaskMode::Lighten) => 0,
        _ => 255,
    };
    let mut acc = vec![seed; len];
    let ts = convert::transform(transform);

    for mask in masks {
        let single = rasterize(mask, ts, width, height).unwrap_or_else(|| vec![0; len]);
        let opacity = (convert::sanitize(mask.opacity).clamp(0.0, 1.0) * 255.0).round() as u32;
        for (a, &m) in acc.iter_mut().zip(&single) {
            let m = if mask.inverted { 255 - m } else { m };
            let m = mul(m as u32, opacity);
            let cur = *a as u32;
            *a = match mask.mode {
                MaskMode::Add => cur + m - mul(cur, m),
                MaskMode::Subtract => mul(cur, 255 - m),
                MaskMode::Intersect => mul(cur, m),
                MaskMode::Lighten => cur.max(m),
                MaskMode::Darken => cur.min(m),
                MaskMode::Difference => cur.abs_diff(m),
            } as u8;
        }
    }
    acc
}

/// Coverage a rendered matte source lends to the content it mattes.
///
/// Alpha modes read the source's alpha. Luma modes read the luminance of the
/// source composited over black, which for premultiplied pixels is the
/// luminance of the stored channels.
pub fn matte_coverage(source: &PixelView<'_>, mode: MatteMode) -> Vec<u8> {
    let (r, b) = source.order().red_blue();
    source
        .data()
        .chunks_exact(4)
        .map(|px| match mode {
            MatteMode::Alpha => px[3],
            MatteMode::AlphaInverted => 255 - px[3],
            MatteMode::Luma => luma(px[r], px[1], px[b]),
            MatteMode::LumaInverted => 255 - luma(px[r], px[1], px[b]),
        })
        .collect()
}

/// Rec. 709 luminance in 8.8 fixed point; the weights sum to 256.
fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((54 * r as u32 + 183 * g as u32 + 19 * b as u32 + 128) >> 8) as u8
}

/// Coverage of a single mask path, grown or shrunk by its expansion.
fn rasterize(mask: &Mask, ts: tiny_skia::Transform, width: u32, height: u32) -> Option<Vec<u8>> {
    let path = convert::path(&mask.geometry)?;
    let mut fill = tiny_skia::Mask::new(width, height)?;
    fill.fill_path(&path, tiny_skia::FillRule::Winding, true, ts);

    let expansion = convert::sanitize(mask.expansion);
    if expansion == 0.0 {
        return Some(fill.data().to_vec());
    }

    let stroke = tiny_skia::Stroke {
        width: expansion.abs() * 2.0,
        line_join: tiny_skia::LineJoin::Round,
        ..Default::default()
    };
    let mut outline = tiny_skia::Mask::new(width, height)?;
    if let Some(stroked) = path.stroke(&stroke, 1.0) {
        outline.fill_path(&stroked, tiny_skia::FillRule::Winding, true, ts);
    }

    let combined = fill
        .data()
        .iter()
        .zip(outline.data())
        .map(|(&f, &o)| {
            let (f, o) = (f as u32, o as u32);
            if expansion > 0.0 {
                (f + o - mul(f, o)) as u8
            } else {
                mul(f, 255 - o) as u8
            }
        })
        .collect();
    Some(combined)
}

/// `a * b / 255` with rounding.
fn mul(a: u32, b: u32) -> u32 {
    let t = a * b + 128;
    (t + (t >> 8)) >> 8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixels::ChannelOrder;
    use kurbo::{Rect, Shape};

    fn mask(mode: MaskMode, rect: Rect) -> Mask {
        Mask {
            mode,
            geometry: rect.to_path(0.1),
            opacity: 1.0,
            expansion: 0.0,
            inverted: false,
        }
    }

    #[test]
    fn test_mul_is_exact_at_extremes() {
        assert_eq!(mul(255, 255), 255);
        assert_eq!(mul(255, 0), 0);
        assert_eq!(mul(128, 255), 128);
    }

    #[test]
    fn test_add_then_subtract() {
        let masks = [
            mask(MaskMode::Add, Rect::new(0.0, 0.0, 4.0, 4.0)),
            mask(MaskMode::Subtract, Rect::new(2.0, 0.0, 4.0, 4.0)),
        ];
        let cov = mask_coverage(&masks, Affine::IDENTITY, 4, 1);
        assert_eq!(cov, vec![255, 255, 0, 0]);
    }

    #[test]
    fn test_first_intersect_starts_full() {
        let masks = [mask(MaskMode::Intersect, Rect::new(0.0, 0.0, 1.0, 1.0))];
        let cov = mask_coverage(&masks, Affine::IDENTITY, 2, 1);
        assert_eq!(cov, vec![255, 0]);
    }

    #[test]
    fn test_inverted_half_opacity() {
        let mut m = mask(MaskMode::Add, Rect::new(0.0, 0.0, 1.0, 1.0));
        m.inverted = true;
        m.opacity = 0.5;
        let cov = mask_coverage(&[m], Affine::IDENTITY, 2, 1);
        assert_eq!(cov[0], 0);
        assert_eq!(cov[1], 128);
    }

    #[test]
    fn test_transform_is_applied() {
        let masks = [mask(MaskMode::Add, Rect::new(0.0, 0.0, 1.0, 1.0))];
        let cov = mask_coverage(&masks, Affine::translate((2.0, 0.0)), 4, 1);
        assert_eq!(cov, vec![0, 0, 255, 0]);
    }

    #[test]
    fn test_expansion_grows_coverage() {
        let mut m = mask(MaskMode::Add, Rect::new(2.0, 0.0, 4.0, 4.0));
        m.expansion = 1.0;
        let cov = mask_coverage(&[m], Affine::IDENTITY, 6, 4);
        // Row 1, pixel 1 lies one unit left of the rect.
        assert_eq!(cov[6 + 1], 255);
        assert_eq!(cov[6 + 5], 0);
    }

    #[test]
    fn test_matte_coverage_modes() {
        // Opaque white, half-transparent red, transparent.
        let rgba = [255, 255, 255, 255, 128, 0, 0, 128, 0, 0, 0, 0];
        let view = PixelView::new(3, 1, ChannelOrder::Rgba, &rgba).unwrap();
        assert_eq!(matte_coverage(&view, MatteMode::Alpha), vec![255, 128, 0]);
        assert_eq!(matte_coverage(&view, MatteMode::AlphaInverted), vec![0, 127, 255]);
        assert_eq!(matte_coverage(&view, MatteMode::Luma), vec![255, 27, 0]);
        assert_eq!(matte_coverage(&view, MatteMode::LumaInverted), vec![0, 228, 255]);
    }

    #[test]
    fn test_matte_luma_reads_channel_order() {
        let bgra = [255, 0, 0, 255];
        let view = PixelView::new(1, 1, ChannelOrder::Bgra, &bgra).unwrap();
        // Pure blue.
        assert_eq!(matte_coverage(&view, MatteMode::Luma), vec![19]);
    }
}
