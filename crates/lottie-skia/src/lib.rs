//! Skia reference backend.
//!
//! [`SkiaCanvas`] draws into an N32 premultiplied raster surface and
//! [`SkiaCanvas::finish`] hands back a [`SkiaFrame`]: a displayable
//! `skia_safe::Image` plus a readable copy of its pixels in the platform's
//! native order.

use glam::Vec4;
use kurbo::{Affine, BezPath, PathEl};
use lottie_canvas::{
    mask_coverage, Canvas, CanvasError, ChannelOrder, PixelBuffer, PixelView, StateKind, StateStack,
};
use lottie_core::{
    BlendMode as CoreBlendMode, Fill, FillRule as CoreFillRule, GradientKind, ImageData,
    LineCap as CoreLineCap, LineJoin as CoreLineJoin, Mask, MatteMode, Paint as CorePaint, Stroke,
};
use skia_safe::color_filters::Clamp;
use skia_safe::{
    canvas::SaveLayerRec, color_filters, gradient_shader, images, AlphaType, BlendMode, ClipOp, Color, Color4f,
    ColorType, Data, FilterMode, Image as SkImage, ImageInfo, Matrix, MipmapMode, Paint,
    PaintStyle, Path, PathEffect, PathFillType, Point, SamplingOptions, Surface, TileMode,
};
use tracing::{debug, warn};

const BACKEND: &str = "skia";

pub struct SkiaCanvas {
    surface: Surface,
    width: u32,
    height: u32,
    transform: Affine,
    states: StateStack,
    /// Modes of the open matte layers, innermost last.
    mattes: Vec<MatteMode>,
}

impl SkiaCanvas {
    pub fn new(width: u32, height: u32) -> Result<Self, CanvasError> {
        let (w, h) = match (i32::try_from(width), i32::try_from(height)) {
            (Ok(w), Ok(h)) if w > 0 && h > 0 => (w, h),
            _ => return Err(CanvasError::InvalidSize { width, height }),
        };
        let surface = Surface::new_raster_n32_premul((w, h)).ok_or_else(|| {
            CanvasError::SurfaceCreation {
                backend: BACKEND,
                reason: format!("raster surface {}x{} could not be allocated", width, height),
            }
        })?;
        debug!(width, height, "skia canvas created");
        Ok(Self {
            surface,
            width,
            height,
            transform: Affine::IDENTITY,
            states: StateStack::new(),
            mattes: Vec::new(),
        })
    }

    /// Snapshots the surface. Call after [`Canvas::flush`].
    pub fn finish(mut self) -> Result<SkiaFrame, CanvasError> {
        let info = ImageInfo::new_n32_premul((self.width as i32, self.height as i32), None);
        let row_bytes = self.width as usize * 4;
        let mut pixels = vec![0u8; row_bytes * self.height as usize];
        if !self
            .surface
            .canvas()
            .read_pixels(&info, &mut pixels, row_bytes, (0, 0))
        {
            return Err(CanvasError::SurfaceCreation {
                backend: BACKEND,
                reason: "surface pixels could not be read back".to_string(),
            });
        }
        let image = self.surface.image_snapshot();
        let pixels = PixelBuffer::from_vec(self.width, self.height, native_order(), pixels)?;
        Ok(SkiaFrame { image, pixels })
    }

    /// Loads the current transform into the Skia canvas.
    fn apply_matrix(&mut self, extra: Affine) {
        let matrix = to_matrix(self.transform * extra);
        let canvas = self.surface.canvas();
        canvas.reset_matrix();
        canvas.concat(&matrix);
    }
}

/// A finished Skia render. The backend owns the pixels; copy them out to keep
/// them past the frame.
pub struct SkiaFrame {
    image: SkImage,
    pixels: PixelBuffer,
}

impl SkiaFrame {
    /// The displayable image.
    pub fn image(&self) -> &SkImage {
        &self.image
    }

    /// Pixels in [`SkiaFrame::order`].
    pub fn view(&self) -> PixelView<'_> {
        self.pixels.view()
    }

    pub fn order(&self) -> ChannelOrder {
        self.pixels.order()
    }

    pub fn into_buffer(self) -> PixelBuffer {
        self.pixels
    }
}

impl std::fmt::Debug for SkiaFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkiaFrame")
            .field("width", &self.image.width())
            .field("height", &self.image.height())
            .field("order", &self.pixels.order())
            .finish()
    }
}

/// Byte order of N32 on this platform.
pub fn native_order() -> ChannelOrder {
    if ColorType::n32() == ColorType::BGRA8888 {
        ChannelOrder::Bgra
    } else {
        ChannelOrder::Rgba
    }
}

impl Canvas for SkiaCanvas {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn transform(&self) -> Affine {
        self.transform
    }

    fn set_transform(&mut self, transform: Affine) {
        self.transform = transform;
    }

    fn push_clip(&mut self, path: &BezPath) {
        self.apply_matrix(Affine::IDENTITY);
        let canvas = self.surface.canvas();
        canvas.save();
        canvas.clip_path(&kurbo_to_skia_path(path), ClipOp::Intersect, true);
        self.states.push(StateKind::Clip);
    }

    fn pop_clip(&mut self) {
        if self.states.pop(StateKind::Clip) {
            self.surface.canvas().restore();
        }
    }

    fn push_opacity_layer(&mut self, alpha: f32, blend: CoreBlendMode) {
        let mut paint = Paint::default();
        paint.set_alpha_f(sanitize(alpha).clamp(0.0, 1.0));
        paint.set_blend_mode(convert_blend_mode(blend));
        self.surface
            .canvas()
            .save_layer(&SaveLayerRec::default().paint(&paint));
        self.states.push(StateKind::Opacity);
    }

    fn pop_opacity_layer(&mut self) {
        if self.states.pop(StateKind::Opacity) {
            self.surface.canvas().restore();
        }
    }

    fn push_mask_layer(&mut self) {
        self.surface.canvas().save_layer(&SaveLayerRec::default());
        self.states.push(StateKind::Mask);
    }

    fn pop_mask_layer(&mut self, masks: &[Mask]) {
        if !self.states.pop(StateKind::Mask) {
            return;
        }
        let coverage = mask_coverage(masks, self.transform, self.width, self.height);
        let info = ImageInfo::new_a8((self.width as i32, self.height as i32));
        let image = images::raster_from_data(&info, Data::new_copy(&coverage), self.width as usize);

        let canvas = self.surface.canvas();
        match image {
            Some(image) => {
                // Keep the layer only where the coverage is.
                let mut paint = Paint::default();
                paint.set_blend_mode(BlendMode::DstIn);
                canvas.reset_matrix();
                canvas.draw_image(&image, (0.0, 0.0), Some(&paint));
            }
            None => {
                warn!("mask coverage image could not be created, content dropped");
                canvas.clear(Color::TRANSPARENT);
            }
        }
        canvas.restore();
    }

    fn push_matte_layer(&mut self, mode: MatteMode) {
        self.surface.canvas().save_layer(&SaveLayerRec::default());
        self.mattes.push(mode);
        self.states.push(StateKind::Matte);
    }

    fn push_matte_source(&mut self) {
        let mode = self.mattes.last().copied().unwrap_or(MatteMode::Alpha);
        let mut paint = Paint::default();
        match mode {
            MatteMode::Alpha => {
                paint.set_blend_mode(BlendMode::DstIn);
            }
            MatteMode::AlphaInverted => {
                paint.set_blend_mode(BlendMode::DstOut);
            }
            MatteMode::Luma | MatteMode::LumaInverted => {
                let (sign, bias) = if mode == MatteMode::Luma { (1.0, 0.0) } else { (-1.0, 1.0) };
                #[rustfmt::skip]
                let matrix = [
                    0.0, 0.0, 0.0, 0.0, 0.0,
                    0.0, 0.0, 0.0, 0.0, 0.0,
                    0.0, 0.0, 0.0, 0.0, 0.0,
                    sign * 0.2126, sign * 0.7152, sign * 0.0722, 0.0, bias,
                ];
                paint.set_color_filter(color_filters::matrix_row_major(&matrix, Clamp::Yes));
                paint.set_blend_mode(BlendMode::DstIn);
            }
        }

        let canvas = self.surface.canvas();
        canvas.save_layer(&SaveLayerRec::default().paint(&paint));
        if matches!(mode, MatteMode::Luma | MatteMode::LumaInverted) {
            // Luminance is read over black, so transparent source counts as dark.
            canvas.draw_color(Color::BLACK, BlendMode::Src);
        }
        self.states.push(StateKind::MatteSource);
    }

    fn pop_matte_layer(&mut self) {
        if !self.states.pop(StateKind::MatteSource) || !self.states.pop(StateKind::Matte) {
            return;
        }
        self.mattes.pop();
        let canvas = self.surface.canvas();
        // Source onto content, then content onto what lies below.
        canvas.restore();
        canvas.restore();
    }

    fn fill_path(&mut self, path: &BezPath, fill: &Fill) {
        let mut sk_path = kurbo_to_skia_path(path);
        sk_path.set_fill_type(convert_fill_rule(fill.rule));

        let mut paint = Paint::default();
        paint.set_anti_alias(true);
        paint.set_style(PaintStyle::Fill);
        setup_paint_shader(&mut paint, &fill.paint, fill.opacity);

        self.apply_matrix(Affine::IDENTITY);
        self.surface.canvas().draw_path(&sk_path, &paint);
    }

    fn stroke_path(&mut self, path: &BezPath, stroke: &Stroke) {
        let width = sanitize(stroke.width);
        if width <= 0.0 {
            return;
        }
        let mut paint = Paint::default();
        paint.set_anti_alias(true);
        paint.set_style(PaintStyle::Stroke);
        paint.set_stroke_width(width);
        paint.set_stroke_cap(convert_cap(stroke.cap));
        paint.set_stroke_join(convert_join(stroke.join));
        paint.set_stroke_miter(stroke.miter_limit.map(sanitize).unwrap_or(4.0));

        if let Some(dash) = &stroke.dash {
            let array: Vec<f32> = dash.array.iter().map(|&v| sanitize(v)).collect();
            if let Some(effect) = PathEffect::dash(&array, sanitize(dash.offset)) {
                paint.set_path_effect(effect);
            }
        }
        setup_paint_shader(&mut paint, &stroke.paint, stroke.opacity);

        self.apply_matrix(Affine::IDENTITY);
        self.surface
            .canvas()
            .draw_path(&kurbo_to_skia_path(path), &paint);
    }

    fn draw_image(&mut self, image: &ImageData, transform: Affine, opacity: f32) {
        let info = ImageInfo::new(
            (image.width as i32, image.height as i32),
            ColorType::RGBA8888,
            AlphaType::Premul,
            None,
        );
        let Some(sk_image) = images::raster_from_data(
            &info,
            Data::new_copy(&image.pixels),
            image.width as usize * 4,
        ) else {
            warn!(width = image.width, height = image.height, "image data does not match its size");
            return;
        };
        let mut paint = Paint::default();
        paint.set_alpha_f(sanitize(opacity).clamp(0.0, 1.0));

        self.apply_matrix(transform);
        self.surface.canvas().draw_image_with_sampling_options(
            &sk_image,
            (0.0, 0.0),
            SamplingOptions::new(FilterMode::Linear, MipmapMode::None),
            Some(&paint),
        );
    }

    fn flush(&mut self) {
        self.states.check_balanced();
        let canvas = self.surface.canvas();
        // Release builds only: close whatever was left open.
        canvas.restore_to_count(1);
        canvas.reset_matrix();
        self.states = StateStack::new();
        self.mattes.clear();
    }
}

fn setup_paint_shader(paint: &mut Paint, core_paint: &CorePaint, opacity: f32) {
    let opacity = sanitize(opacity).clamp(0.0, 1.0);
    match core_paint {
        CorePaint::Solid(color) => {
            let mut c = glam_to_skia_color4f(*color);
            c.a *= opacity;
            paint.set_color4f(c, None);
        }
        CorePaint::Gradient(grad) => {
            let colors: Vec<Color> = grad
                .stops
                .iter()
                .map(|s| glam_to_skia_color_legacy(s.color))
                .collect();
            let pos: Vec<f32> = grad.stops.iter().map(|s| sanitize(s.offset)).collect();
            let pt1 = Point::new(sanitize(grad.start.x), sanitize(grad.start.y));
            let pt2 = Point::new(sanitize(grad.end.x), sanitize(grad.end.y));

            let shader = match grad.kind {
                GradientKind::Linear => gradient_shader::linear(
                    (pt1, pt2),
                    colors.as_slice(),
                    Some(pos.as_slice()),
                    TileMode::Clamp,
                    None,
                    None,
                ),
                GradientKind::Radial => gradient_shader::radial(
                    pt1,
                    Point::distance(pt1, pt2),
                    colors.as_slice(),
                    Some(pos.as_slice()),
                    TileMode::Clamp,
                    None,
                    None,
                ),
            };
            match shader {
                Some(shader) => {
                    paint.set_shader(shader);
                }
                None => {
                    if let Some(last) = grad.stops.last() {
                        paint.set_color4f(glam_to_skia_color4f(last.color), None);
                    }
                }
            }
            paint.set_alpha_f(paint.alpha_f() * opacity);
        }
    }
}

fn sanitize(v: f32) -> f32 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

fn to_matrix(affine: Affine) -> Matrix {
    let [a, b, c, d, e, f] = affine.as_coeffs().map(|v| sanitize(v as f32));
    Matrix::new_all(a, c, e, b, d, f, 0.0, 0.0, 1.0)
}

fn glam_to_skia_color4f(v: Vec4) -> Color4f {
    Color4f::new(sanitize(v.x), sanitize(v.y), sanitize(v.z), sanitize(v.w))
}

fn glam_to_skia_color_legacy(v: Vec4) -> Color {
    glam_to_skia_color4f(v).to_color()
}

fn kurbo_to_skia_path(bez_path: &BezPath) -> Path {
    let mut path = Path::new();
    let p = |pt: kurbo::Point| (sanitize(pt.x as f32), sanitize(pt.y as f32));
    for el in bez_path.elements() {
        match *el {
            PathEl::MoveTo(a) => {
                path.move_to(p(a));
            }
            PathEl::LineTo(a) => {
                path.line_to(p(a));
            }
            PathEl::QuadTo(a, b) => {
                path.quad_to(p(a), p(b));
            }
            PathEl::CurveTo(a, b, c) => {
                path.cubic_to(p(a), p(b), p(c));
            }
            PathEl::ClosePath => {
                path.close();
            }
        }
    }
    path
}

fn convert_blend_mode(mode: CoreBlendMode) -> BlendMode {
    match mode {
        CoreBlendMode::Normal => BlendMode::SrcOver,
        CoreBlendMode::Multiply => BlendMode::Multiply,
        CoreBlendMode::Screen => BlendMode::Screen,
        CoreBlendMode::Overlay => BlendMode::Overlay,
        CoreBlendMode::Darken => BlendMode::Darken,
        CoreBlendMode::Lighten => BlendMode::Lighten,
        CoreBlendMode::ColorDodge => BlendMode::ColorDodge,
        CoreBlendMode::ColorBurn => BlendMode::ColorBurn,
        CoreBlendMode::HardLight => BlendMode::HardLight,
        CoreBlendMode::SoftLight => BlendMode::SoftLight,
        CoreBlendMode::Difference => BlendMode::Difference,
        CoreBlendMode::Exclusion => BlendMode::Exclusion,
        CoreBlendMode::Hue => BlendMode::Hue,
        CoreBlendMode::Saturation => BlendMode::Saturation,
        CoreBlendMode::Color => BlendMode::Color,
        CoreBlendMode::Luminosity => BlendMode::Luminosity,
    }
}

fn convert_fill_rule(rule: CoreFillRule) -> PathFillType {
    match rule {
        CoreFillRule::NonZero => PathFillType::Winding,
        CoreFillRule::EvenOdd => PathFillType::EvenOdd,
    }
}

fn convert_cap(cap: CoreLineCap) -> skia_safe::PaintCap {
    match cap {
        CoreLineCap::Butt => skia_safe::PaintCap::Butt,
        CoreLineCap::Round => skia_safe::PaintCap::Round,
        CoreLineCap::Square => skia_safe::PaintCap::Square,
    }
}

fn convert_join(join: CoreLineJoin) -> skia_safe::PaintJoin {
    match join {
        CoreLineJoin::Miter => skia_safe::PaintJoin::Miter,
        CoreLineJoin::Round => skia_safe::PaintJoin::Round,
        CoreLineJoin::Bevel => skia_safe::PaintJoin::Bevel,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matrix_matches_kurbo() {
        let affine = Affine::translate((10.0, 5.0)) * Affine::rotate(0.5) * Affine::scale(2.0);
        let matrix = to_matrix(affine);
        let expected = affine * kurbo::Point::new(3.0, 4.0);
        let mapped = matrix.map_point((3.0, 4.0));
        assert!((mapped.x as f64 - expected.x).abs() < 1e-4);
        assert!((mapped.y as f64 - expected.y).abs() < 1e-4);
    }

    #[test]
    fn test_invalid_size_is_rejected() {
        assert!(matches!(
            SkiaCanvas::new(0, 10),
            Err(CanvasError::InvalidSize { width: 0, height: 10 })
        ));
    }

    fn band(x0: f64, x1: f64) -> BezPath {
        let mut path = BezPath::new();
        path.move_to((x0, 0.0));
        path.line_to((x1, 0.0));
        path.line_to((x1, 8.0));
        path.line_to((x0, 8.0));
        path.close_path();
        path
    }

    fn solid(r: f32, g: f32, b: f32) -> Fill {
        Fill {
            paint: CorePaint::Solid(Vec4::new(r, g, b, 1.0)),
            opacity: 1.0,
            rule: CoreFillRule::NonZero,
        }
    }

    fn matted(mode: MatteMode) -> SkiaFrame {
        let mut canvas = SkiaCanvas::new(8, 8).unwrap();
        canvas.push_matte_layer(mode);
        canvas.fill_path(&band(0.0, 8.0), &solid(1.0, 0.0, 0.0));
        canvas.push_matte_source();
        canvas.fill_path(&band(0.0, 4.0), &solid(1.0, 1.0, 1.0));
        canvas.pop_matte_layer();
        canvas.flush();
        canvas.finish().unwrap()
    }

    #[test]
    fn test_alpha_matte_keeps_content_under_source() {
        let frame = matted(MatteMode::Alpha);
        let view = frame.view();
        assert_eq!(view.rgba_at(1, 4), [255, 0, 0, 255]);
        assert_eq!(view.rgba_at(6, 4)[3], 0);
    }

    #[test]
    fn test_inverted_luma_matte_keeps_content_outside_white_source() {
        let frame = matted(MatteMode::LumaInverted);
        let view = frame.view();
        assert!(view.rgba_at(1, 4)[3] <= 2);
        assert!(view.rgba_at(6, 4)[3] >= 253);
    }
}
