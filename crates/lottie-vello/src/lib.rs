//! `vello_cpu` backend.
//!
//! Draw calls are recorded into a sparse-strip [`RenderContext`] and
//! rasterised on [`VelloCanvas::finish`]. The resulting [`VelloFrame`] owns
//! its premultiplied RGBA pixmap and exposes it in place.

use glam::Vec4;
use kurbo::{Affine, BezPath, PathEl};
use lottie_canvas::{
    mask_coverage, matte_coverage, Canvas, CanvasError, ChannelOrder, PixelBuffer, PixelView, StateKind, StateStack,
};
use lottie_core::{
    BlendMode, Fill, FillRule, GradientKind, ImageData, LineCap, LineJoin, Mask, MatteMode, Paint,
    Stroke,
};
use std::sync::Arc;
use tracing::debug;
use vello_cpu::peniko::{self, color::PremulRgba8, Compose, Mix};
use vello_cpu::{Pixmap, RenderContext};

pub struct VelloCanvas {
    width: u16,
    height: u16,
    base: RenderContext,
    /// Offscreen contexts for open mask and matte layers, innermost last.
    masked: Vec<RenderContext>,
    /// Modes of the open matte layers, innermost last.
    mattes: Vec<MatteMode>,
    /// Number of vello layers behind each open opacity layer.
    opacity_layers: Vec<usize>,
    transform: Affine,
    states: StateStack,
}

impl VelloCanvas {
    pub fn new(width: u32, height: u32) -> Result<Self, CanvasError> {
        let (w, h) = match (u16::try_from(width), u16::try_from(height)) {
            (Ok(w), Ok(h)) if w > 0 && h > 0 => (w, h),
            _ => return Err(CanvasError::InvalidSize { width, height }),
        };
        debug!(width, height, "vello_cpu canvas created");
        Ok(Self {
            width: w,
            height: h,
            base: RenderContext::new(w, h),
            masked: Vec::new(),
            mattes: Vec::new(),
            opacity_layers: Vec::new(),
            transform: Affine::IDENTITY,
            states: StateStack::new(),
        })
    }

    /// Rasterises everything drawn so far. Call after [`Canvas::flush`].
    pub fn finish(mut self) -> VelloFrame {
        self.base.flush();
        let mut pixmap = Pixmap::new(self.width, self.height);
        self.base.render_to_pixmap(&mut pixmap);
        VelloFrame { pixmap }
    }

    fn ctx(&mut self) -> &mut RenderContext {
        let Self { base, masked, .. } = self;
        masked.last_mut().unwrap_or(base)
    }

    /// Resets per-draw state and loads `extra` on top of the canvas transform.
    fn prepare(&mut self, extra: Affine) -> &mut RenderContext {
        let transform = affine_to_cpu(self.transform * extra);
        let ctx = self.ctx();
        ctx.set_transform(transform);
        ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);
        ctx.set_blend_mode(peniko::BlendMode::default());
        ctx
    }

    fn rasterise(&self, mut offscreen: RenderContext) -> Pixmap {
        offscreen.flush();
        let mut pixmap = Pixmap::new(self.width, self.height);
        offscreen.render_to_pixmap(&mut pixmap);
        pixmap
    }

    /// Scales `pixmap` by `coverage` and draws it into the current target.
    fn composite_covered(&mut self, mut pixmap: Pixmap, coverage: &[u8]) {
        for (px, &c) in pixmap
            .data_as_u8_slice_mut()
            .chunks_exact_mut(4)
            .zip(coverage)
        {
            for v in px {
                *v = ((*v as u16 * c as u16 + 127) / 255) as u8;
            }
        }

        let (w, h) = (self.width as f64, self.height as f64);
        let ctx = self.ctx();
        ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
        ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);
        ctx.set_blend_mode(peniko::BlendMode::default());
        ctx.set_paint(image_paint(pixmap));
        ctx.fill_rect(&vello_cpu::kurbo::Rect::new(0.0, 0.0, w, h));
    }
}

/// A finished vello_cpu render. The backend owns the pixels.
pub struct VelloFrame {
    pixmap: Pixmap,
}

impl VelloFrame {
    pub fn width(&self) -> u32 {
        self.pixmap.width() as u32
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height() as u32
    }

    /// The pixels in place, premultiplied RGBA.
    pub fn view(&self) -> Option<PixelView<'_>> {
        PixelView::new(
            self.width(),
            self.height(),
            ChannelOrder::Rgba,
            self.pixmap.data_as_u8_slice(),
        )
    }

    /// Copies the pixels out so they outlive the frame.
    pub fn to_buffer(&self) -> Result<PixelBuffer, CanvasError> {
        PixelBuffer::from_vec(
            self.width(),
            self.height(),
            ChannelOrder::Rgba,
            self.pixmap.data_as_u8_slice().to_vec(),
        )
    }

    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }
}

impl std::fmt::Debug for VelloFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VelloFrame")
            .field("width", &self.pixmap.width())
            .field("height", &self.pixmap.height())
            .finish()
    }
}

impl Canvas for VelloCanvas {
    fn size(&self) -> (u32, u32) {
        (self.width as u32, self.height as u32)
    }

    fn transform(&self) -> Affine {
        self.transform
    }

    fn set_transform(&mut self, transform: Affine) {
        self.transform = transform;
    }

    fn push_clip(&mut self, path: &BezPath) {
        let path = bezpath_to_cpu(path);
        let ctx = self.prepare(Affine::IDENTITY);
        ctx.set_fill_rule(peniko::Fill::NonZero);
        ctx.push_clip_layer(&path);
        self.states.push(StateKind::Clip);
    }

    fn pop_clip(&mut self) {
        if self.states.pop(StateKind::Clip) {
            self.ctx().pop_layer();
        }
    }

    fn push_opacity_layer(&mut self, alpha: f32, blend: BlendMode) {
        let ctx = self.ctx();
        let mut pushed = 0;
        if blend != BlendMode::Normal {
            ctx.push_blend_layer(peniko::BlendMode::new(convert_mix(blend), Compose::SrcOver));
            pushed += 1;
        }
        ctx.push_opacity_layer(sanitize(alpha).clamp(0.0, 1.0));
        pushed += 1;
        self.opacity_layers.push(pushed);
        self.states.push(StateKind::Opacity);
    }

    fn pop_opacity_layer(&mut self) {
        if !self.states.pop(StateKind::Opacity) {
            return;
        }
        let pushed = self.opacity_layers.pop().unwrap_or(0);
        let ctx = self.ctx();
        for _ in 0..pushed {
            ctx.pop_layer();
        }
    }

    fn push_mask_layer(&mut self) {
        self.masked.push(RenderContext::new(self.width, self.height));
        self.states.push(StateKind::Mask);
    }

    fn pop_mask_layer(&mut self, masks: &[Mask]) {
        if !self.states.pop(StateKind::Mask) {
            return;
        }
        let Some(content) = self.masked.pop() else {
            return;
        };
        let pixmap = self.rasterise(content);
        let coverage = mask_coverage(masks, self.transform, self.width as u32, self.height as u32);
        self.composite_covered(pixmap, &coverage);
    }

    fn push_matte_layer(&mut self, mode: MatteMode) {
        self.masked.push(RenderContext::new(self.width, self.height));
        self.mattes.push(mode);
        self.states.push(StateKind::Matte);
    }

    fn push_matte_source(&mut self) {
        self.masked.push(RenderContext::new(self.width, self.height));
        self.states.push(StateKind::MatteSource);
    }

    fn pop_matte_layer(&mut self) {
        if !self.states.pop(StateKind::MatteSource) || !self.states.pop(StateKind::Matte) {
            return;
        }
        let mode = self.mattes.pop().unwrap_or(MatteMode::Alpha);
        let (Some(source), Some(content)) = (self.masked.pop(), self.masked.pop()) else {
            return;
        };
        let source = self.rasterise(source);
        let Some(view) = PixelView::new(
            self.width as u32,
            self.height as u32,
            ChannelOrder::Rgba,
            source.data_as_u8_slice(),
        ) else {
            return;
        };
        let coverage = matte_coverage(&view, mode);
        let pixmap = self.rasterise(content);
        self.composite_covered(pixmap, &coverage);
    }

    fn fill_path(&mut self, path: &BezPath, fill: &Fill) {
        let path = bezpath_to_cpu(path);
        let rule = match fill.rule {
            FillRule::NonZero => peniko::Fill::NonZero,
            FillRule::EvenOdd => peniko::Fill::EvenOdd,
        };
        let ctx = self.prepare(Affine::IDENTITY);
        ctx.set_fill_rule(rule);
        set_paint(ctx, &fill.paint, fill.opacity);
        ctx.fill_path(&path);
    }

    fn stroke_path(&mut self, path: &BezPath, stroke: &Stroke) {
        let width = sanitize(stroke.width);
        if width <= 0.0 {
            return;
        }
        let mut style = vello_cpu::kurbo::Stroke::new(width as f64)
            .with_caps(convert_cap(stroke.cap))
            .with_join(convert_join(stroke.join))
            .with_miter_limit(stroke.miter_limit.map(sanitize).unwrap_or(4.0) as f64);
        if let Some(dash) = &stroke.dash {
            style = style.with_dashes(
                sanitize(dash.offset) as f64,
                dash.array.iter().map(|&v| sanitize(v) as f64),
            );
        }
        let path = bezpath_to_cpu(path);
        let ctx = self.prepare(Affine::IDENTITY);
        ctx.set_stroke(style);
        set_paint(ctx, &stroke.paint, stroke.opacity);
        ctx.stroke_path(&path);
    }

    fn draw_image(&mut self, image: &ImageData, transform: Affine, opacity: f32) {
        let (Ok(w), Ok(h)) = (u16::try_from(image.width), u16::try_from(image.height)) else {
            return;
        };
        if image.pixels.len() != w as usize * h as usize * 4 {
            return;
        }
        let pixels = image
            .pixels
            .chunks_exact(4)
            .map(|px| PremulRgba8::from_u8_array([px[0], px[1], px[2], px[3]]))
            .collect();
        let pixmap = Pixmap::from_parts_with_opacity(pixels, w, h, true);

        let opacity = sanitize(opacity).clamp(0.0, 1.0);
        let ctx = self.prepare(transform);
        ctx.set_paint(image_paint(pixmap));
        if opacity < 1.0 {
            ctx.push_opacity_layer(opacity);
        }
        ctx.fill_rect(&vello_cpu::kurbo::Rect::new(0.0, 0.0, w as f64, h as f64));
        if opacity < 1.0 {
            ctx.pop_layer();
        }
    }

    fn flush(&mut self) {
        self.states.check_balanced();
        // Release builds only: close whatever was left open.
        while let Some(pushed) = self.opacity_layers.pop() {
            for _ in 0..pushed {
                self.ctx().pop_layer();
            }
        }
        self.masked.clear();
        self.mattes.clear();
        self.states = StateStack::new();
        self.base.flush();
    }
}

fn set_paint(ctx: &mut RenderContext, paint: &Paint, opacity: f32) {
    let opacity = sanitize(opacity).clamp(0.0, 1.0);
    match paint {
        Paint::Solid(color) => ctx.set_paint(to_color(*color, opacity)),
        Paint::Gradient(gradient) => {
            let start = (sanitize(gradient.start.x) as f64, sanitize(gradient.start.y) as f64);
            let end = (sanitize(gradient.end.x) as f64, sanitize(gradient.end.y) as f64);
            let stops: Vec<(f32, peniko::Color)> = gradient
                .stops
                .iter()
                .map(|s| (sanitize(s.offset), to_color(s.color, opacity)))
                .collect();
            let brush = match gradient.kind {
                GradientKind::Linear => peniko::Gradient::new_linear(start, end),
                GradientKind::Radial => {
                    let radius = (end.0 - start.0).hypot(end.1 - start.1) as f32;
                    peniko::Gradient::new_radial(start, radius)
                }
            };
            ctx.set_paint(brush.with_stops(stops.as_slice()));
        }
    }
}

fn image_paint(pixmap: Pixmap) -> vello_cpu::Image {
    vello_cpu::Image {
        image: vello_cpu::ImageSource::Pixmap(Arc::new(pixmap)),
        sampler: peniko::ImageSampler::default(),
    }
}

fn to_color(v: Vec4, opacity: f32) -> peniko::Color {
    let c = |v: f32| sanitize(v).clamp(0.0, 1.0);
    peniko::Color::new([c(v.x), c(v.y), c(v.z), c(v.w) * opacity])
}

fn sanitize(v: f32) -> f32 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

fn affine_to_cpu(a: Affine) -> vello_cpu::kurbo::Affine {
    vello_cpu::kurbo::Affine::new(a.as_coeffs())
}

fn bezpath_to_cpu(path: &BezPath) -> vello_cpu::kurbo::BezPath {
    let mut out = vello_cpu::kurbo::BezPath::new();
    let p = |p: kurbo::Point| vello_cpu::kurbo::Point::new(p.x, p.y);
    for &el in path.elements() {
        match el {
            PathEl::MoveTo(a) => out.move_to(p(a)),
            PathEl::LineTo(a) => out.line_to(p(a)),
            PathEl::QuadTo(a, b) => out.quad_to(p(a), p(b)),
            PathEl::CurveTo(a, b, c) => out.curve_to(p(a), p(b), p(c)),
            PathEl::ClosePath => out.close_path(),
        }
    }
    out
}

fn convert_mix(mode: BlendMode) -> Mix {
    match mode {
        BlendMode::Normal => Mix::Normal,
        BlendMode::Multiply => Mix::Multiply,
        BlendMode::Screen => Mix::Screen,
        BlendMode::Overlay => Mix::Overlay,
        BlendMode::Darken => Mix::Darken,
        BlendMode::Lighten => Mix::Lighten,
        BlendMode::ColorDodge => Mix::ColorDodge,
        BlendMode::ColorBurn => Mix::ColorBurn,
        BlendMode::HardLight => Mix::HardLight,
        BlendMode::SoftLight => Mix::SoftLight,
        BlendMode::Difference => Mix::Difference,
        BlendMode::Exclusion => Mix::Exclusion,
        BlendMode::Hue => Mix::Hue,
        BlendMode::Saturation => Mix::Saturation,
        BlendMode::Color => Mix::Color,
        BlendMode::Luminosity => Mix::Luminosity,
    }
}

fn convert_cap(cap: LineCap) -> vello_cpu::kurbo::Cap {
    match cap {
        LineCap::Butt => vello_cpu::kurbo::Cap::Butt,
        LineCap::Round => vello_cpu::kurbo::Cap::Round,
        LineCap::Square => vello_cpu::kurbo::Cap::Square,
    }
}

fn convert_join(join: LineJoin) -> vello_cpu::kurbo::Join {
    match join {
        LineJoin::Miter => vello_cpu::kurbo::Join::Miter,
        LineJoin::Round => vello_cpu::kurbo::Join::Round,
        LineJoin::Bevel => vello_cpu::kurbo::Join::Bevel,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_limits() {
        assert!(matches!(
            VelloCanvas::new(70_000, 10),
            Err(CanvasError::InvalidSize { width: 70_000, .. })
        ));
        assert!(VelloCanvas::new(0, 0).is_err());
        assert_eq!(VelloCanvas::new(16, 8).unwrap().size(), (16, 8));
    }

    #[test]
    fn test_path_conversion_keeps_elements() {
        let mut path = BezPath::new();
        path.move_to((0.0, 0.0));
        path.curve_to((1.0, 0.0), (2.0, 1.0), (2.0, 2.0));
        path.close_path();
        let converted = bezpath_to_cpu(&path);
        assert_eq!(converted.elements().len(), 3);
    }

    fn square(x0: f64, x1: f64) -> BezPath {
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
            paint: Paint::Solid(Vec4::new(r, g, b, 1.0)),
            opacity: 1.0,
            rule: FillRule::NonZero,
        }
    }

    #[test]
    fn test_alpha_matte_clips_content_to_source() {
        let mut canvas = VelloCanvas::new(8, 8).unwrap();
        canvas.push_matte_layer(MatteMode::Alpha);
        canvas.fill_path(&square(0.0, 8.0), &solid(1.0, 0.0, 0.0));
        canvas.push_matte_source();
        canvas.fill_path(&square(0.0, 4.0), &solid(0.0, 1.0, 0.0));
        canvas.pop_matte_layer();
        canvas.flush();

        let frame = canvas.finish();
        let view = frame.view().unwrap();
        assert_eq!(view.rgba_at(1, 4), [255, 0, 0, 255]);
        assert_eq!(view.rgba_at(6, 4), [0, 0, 0, 0]);
    }
}
