use crate::canvas::Canvas;
use crate::convert;
use crate::coverage::{mask_coverage, matte_coverage};
use crate::error::CanvasError;
use crate::pixels::{ChannelOrder, PixelBuffer, PixelView};
use crate::state::{StateKind, StateStack};
use kurbo::{Affine, BezPath};
use lottie_core::{BlendMode, Fill, GradientKind, ImageData, Mask, MatteMode, Paint, Stroke};
use tiny_skia::{FilterQuality, IntSize, Pixmap, PixmapPaint, PixmapRef, SpreadMode, Transform};
use tracing::{debug, warn};

enum LayerKind {
    Opacity { alpha: f32, blend: BlendMode },
    Mask,
    Matte(MatteMode),
    MatteSource,
}

struct Layer {
    pixmap: Pixmap,
    kind: LayerKind,
}

/// Software backend drawing into a caller-supplied buffer with tiny-skia.
///
/// Pixels are premultiplied RGBA. Hosts that display BGRA must call
/// [`PixelBuffer::into_display_order`] on the result of [`TinySkiaCanvas::finish`].
pub struct TinySkiaCanvas {
    base: Pixmap,
    /// Transparent template cloned for every offscreen layer.
    blank: Pixmap,
    layers: Vec<Layer>,
    clip: Option<tiny_skia::Mask>,
    clips: Vec<Option<tiny_skia::Mask>>,
    transform: Affine,
    states: StateStack,
}

impl TinySkiaCanvas {
    /// Takes over `buffer` as the render target. Existing pixels are kept and
    /// drawn over; a BGRA buffer is reordered to RGBA first.
    pub fn new(buffer: PixelBuffer) -> Result<Self, CanvasError> {
        let (width, height) = (buffer.width(), buffer.height());
        let data = buffer.into_order(ChannelOrder::Rgba).into_vec();
        let size = IntSize::from_wh(width, height).ok_or(CanvasError::InvalidSize { width, height })?;
        let base = Pixmap::from_vec(data, size).ok_or_else(|| surface_error("pixmap rejected buffer"))?;
        let blank = Pixmap::new(width, height).ok_or_else(|| surface_error("layer allocation failed"))?;
        debug!(width, height, "tiny-skia canvas created");
        Ok(Self {
            base,
            blank,
            layers: Vec::new(),
            clip: None,
            clips: Vec::new(),
            transform: Affine::IDENTITY,
            states: StateStack::new(),
        })
    }

    /// A canvas over a fresh transparent buffer.
    pub fn with_size(width: u32, height: u32) -> Result<Self, CanvasError> {
        Self::new(PixelBuffer::new(width, height)?)
    }

    /// Pixels drawn so far, in RGBA order.
    pub fn view(&self) -> PixelView<'_> {
        PixelView::from_raw(self.base.width(), self.base.height(), ChannelOrder::Rgba, self.base.data())
    }

    /// Hands the buffer back to the caller.
    pub fn finish(self) -> PixelBuffer {
        let (width, height) = (self.base.width(), self.base.height());
        PixelBuffer::from_raw(width, height, ChannelOrder::Rgba, self.base.take())
    }

    fn target(&mut self) -> (&mut Pixmap, Option<&tiny_skia::Mask>) {
        let Self {
            base, layers, clip, ..
        } = self;
        let pixmap = layers.last_mut().map(|l| &mut l.pixmap).unwrap_or(base);
        (pixmap, clip.as_ref())
    }

    fn composite(&mut self, layer: &Pixmap, opacity: f32, blend: tiny_skia::BlendMode) {
        let paint = PixmapPaint {
            opacity: convert::sanitize(opacity).clamp(0.0, 1.0),
            blend_mode: blend,
            quality: FilterQuality::Nearest,
        };
        let (target, clip) = self.target();
        target.draw_pixmap(0, 0, layer.as_ref(), &paint, Transform::identity(), clip);
    }

    /// Multiplies `pixmap` by `coverage` and composites it onto the target.
    fn composite_covered(&mut self, mut pixmap: Pixmap, coverage: Vec<u8>) {
        let (width, height) = (pixmap.width(), pixmap.height());
        match IntSize::from_wh(width, height).and_then(|size| tiny_skia::Mask::from_vec(coverage, size)) {
            Some(mask) => pixmap.apply_mask(&mask),
            None => {
                warn!(width, height, "coverage rejected, content dropped");
                return;
            }
        }
        self.composite(&pixmap, 1.0, tiny_skia::BlendMode::SourceOver);
    }

    fn push_layer(&mut self, kind: LayerKind) {
        self.layers.push(Layer {
            pixmap: self.blank.clone(),
            kind,
        });
    }

    fn new_clip(&self, path: &BezPath) -> Option<tiny_skia::Mask> {
        let ts = convert::transform(self.transform);
        let Some(path) = convert::path(path) else {
            // Nothing survives an empty clip.
            return tiny_skia::Mask::new(self.base.width(), self.base.height());
        };
        match &self.clip {
            Some(current) => {
                let mut mask = current.clone();
                mask.intersect_path(&path, tiny_skia::FillRule::Winding, true, ts);
                Some(mask)
            }
            None => {
                let mut mask = tiny_skia::Mask::new(self.base.width(), self.base.height())?;
                mask.fill_path(&path, tiny_skia::FillRule::Winding, true, ts);
                Some(mask)
            }
        }
    }
}

impl Canvas for TinySkiaCanvas {
    fn size(&self) -> (u32, u32) {
        (self.base.width(), self.base.height())
    }

    fn transform(&self) -> Affine {
        self.transform
    }

    fn set_transform(&mut self, transform: Affine) {
        self.transform = transform;
    }

    fn push_clip(&mut self, path: &BezPath) {
        let next = self.new_clip(path).or_else(|| self.clip.clone());
        let previous = std::mem::replace(&mut self.clip, next);
        self.clips.push(previous);
        self.states.push(StateKind::Clip);
    }

    fn pop_clip(&mut self) {
        if self.states.pop(StateKind::Clip) {
            self.clip = self.clips.pop().flatten();
        }
    }

    fn push_opacity_layer(&mut self, alpha: f32, blend: BlendMode) {
        self.push_layer(LayerKind::Opacity { alpha, blend });
        self.states.push(StateKind::Opacity);
    }

    fn pop_opacity_layer(&mut self) {
        if !self.states.pop(StateKind::Opacity) {
            return;
        }
        if let Some(Layer {
            pixmap,
            kind: LayerKind::Opacity { alpha, blend },
        }) = self.layers.pop()
        {
            self.composite(&pixmap, alpha, convert::blend_mode(blend));
        }
    }

    fn push_mask_layer(&mut self) {
        self.push_layer(LayerKind::Mask);
        self.states.push(StateKind::Mask);
    }

    fn pop_mask_layer(&mut self, masks: &[Mask]) {
        if !self.states.pop(StateKind::Mask) {
            return;
        }
        let Some(Layer { pixmap, .. }) = self.layers.pop() else {
            return;
        };
        let coverage = mask_coverage(masks, self.transform, pixmap.width(), pixmap.height());
        self.composite_covered(pixmap, coverage);
    }

    fn push_matte_layer(&mut self, mode: MatteMode) {
        self.push_layer(LayerKind::Matte(mode));
        self.states.push(StateKind::Matte);
    }

    fn push_matte_source(&mut self) {
        self.push_layer(LayerKind::MatteSource);
        self.states.push(StateKind::MatteSource);
    }

    fn pop_matte_layer(&mut self) {
        if !self.states.pop(StateKind::MatteSource) || !self.states.pop(StateKind::Matte) {
            return;
        }
        let (Some(source), Some(content)) = (self.layers.pop(), self.layers.pop()) else {
            return;
        };
        let LayerKind::Matte(mode) = content.kind else {
            return;
        };
        let view = PixelView::from_raw(
            source.pixmap.width(),
            source.pixmap.height(),
            ChannelOrder::Rgba,
            source.pixmap.data(),
        );
        let coverage = matte_coverage(&view, mode);
        self.composite_covered(content.pixmap, coverage);
    }

    fn fill_path(&mut self, path: &BezPath, fill: &Fill) {
        let Some(path) = convert::path(path) else {
            return;
        };
        let Some(paint) = paint(&fill.paint, fill.opacity) else {
            return;
        };
        let ts = convert::transform(self.transform);
        let (target, clip) = self.target();
        target.fill_path(&path, &paint, convert::fill_rule(fill.rule), ts, clip);
    }

    fn stroke_path(&mut self, path: &BezPath, stroke: &Stroke) {
        let width = convert::sanitize(stroke.width);
        if width <= 0.0 {
            return;
        }
        let Some(path) = convert::path(path) else {
            return;
        };
        let Some(paint) = paint(&stroke.paint, stroke.opacity) else {
            return;
        };
        let style = tiny_skia::Stroke {
            width,
            miter_limit: stroke.miter_limit.map(convert::sanitize).unwrap_or(4.0),
            line_cap: convert::line_cap(stroke.cap),
            line_join: convert::line_join(stroke.join),
            dash: stroke.dash.as_ref().and_then(|d| {
                let array = d.array.iter().map(|&v| convert::sanitize(v)).collect();
                tiny_skia::StrokeDash::new(array, convert::sanitize(d.offset))
            }),
        };
        let ts = convert::transform(self.transform);
        let (target, clip) = self.target();
        target.stroke_path(&path, &paint, &style, ts, clip);
    }

    fn draw_image(&mut self, image: &ImageData, transform: Affine, opacity: f32) {
        let Some(source) = PixmapRef::from_bytes(&image.pixels, image.width, image.height) else {
            warn!(width = image.width, height = image.height, "image data does not match its size");
            return;
        };
        let paint = PixmapPaint {
            opacity: convert::sanitize(opacity).clamp(0.0, 1.0),
            blend_mode: tiny_skia::BlendMode::SourceOver,
            quality: FilterQuality::Bilinear,
        };
        let ts = convert::transform(self.transform * transform);
        let (target, clip) = self.target();
        target.draw_pixmap(0, 0, source, &paint, ts, clip);
    }

    fn flush(&mut self) {
        self.states.check_balanced();
        // Release builds only: fold whatever was left open so content is not lost.
        while let Some(layer) = self.layers.pop() {
            if !matches!(layer.kind, LayerKind::MatteSource) {
                self.composite(&layer.pixmap, 1.0, tiny_skia::BlendMode::SourceOver);
            }
        }
        self.clip = None;
        self.clips.clear();
        self.states = StateStack::new();
    }
}

fn surface_error(reason: &str) -> CanvasError {
    CanvasError::SurfaceCreation {
        backend: "tiny-skia",
        reason: reason.to_string(),
    }
}

fn paint(source: &Paint, opacity: f32) -> Option<tiny_skia::Paint<'static>> {
    let mut paint = tiny_skia::Paint {
        anti_alias: true,
        ..Default::default()
    };
    match source {
        Paint::Solid(color) => paint.set_color(convert::color(*color, opacity)),
        Paint::Gradient(gradient) => {
            let stops: Vec<tiny_skia::GradientStop> = gradient
                .stops
                .iter()
                .map(|s| tiny_skia::GradientStop::new(convert::sanitize(s.offset), convert::color(s.color, opacity)))
                .collect();
            let fallback = gradient.stops.last().map(|s| convert::color(s.color, opacity))?;
            let start = tiny_skia::Point::from_xy(convert::sanitize(gradient.start.x), convert::sanitize(gradient.start.y));
            let end = tiny_skia::Point::from_xy(convert::sanitize(gradient.end.x), convert::sanitize(gradient.end.y));
            let shader = match gradient.kind {
                GradientKind::Linear => {
                    tiny_skia::LinearGradient::new(start, end, stops, SpreadMode::Pad, Transform::identity())
                }
                GradientKind::Radial => tiny_skia::RadialGradient::new(
                    start,
                    start,
                    start.distance(end),
                    stops,
                    SpreadMode::Pad,
                    Transform::identity(),
                ),
            };
            match shader {
                Some(shader) => paint.shader = shader,
                // Degenerate geometry: tiny-skia gives up, paint the end colour.
                None => paint.set_color(fallback),
            }
        }
    }
    Some(paint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;
    use kurbo::{Rect, Shape};

    fn red() -> Fill {
        Fill::solid(Vec4::new(1.0, 0.0, 0.0, 1.0))
    }

    #[test]
    fn test_fill_is_rgba_premultiplied() {
        let mut canvas = TinySkiaCanvas::with_size(4, 4).unwrap();
        canvas.fill_path(&Rect::new(0.0, 0.0, 4.0, 4.0).to_path(0.1), &red());
        canvas.flush();
        let buffer = canvas.finish();
        assert_eq!(buffer.order(), ChannelOrder::Rgba);
        assert_eq!(&buffer.data()[..4], &[255, 0, 0, 255]);
        assert_eq!(buffer.into_display_order().data()[..4], [0, 0, 255, 255]);
    }

    #[test]
    fn test_clip_restricts_drawing() {
        let mut canvas = TinySkiaCanvas::with_size(4, 1).unwrap();
        canvas.push_clip(&Rect::new(0.0, 0.0, 2.0, 1.0).to_path(0.1));
        canvas.fill_path(&Rect::new(0.0, 0.0, 4.0, 1.0).to_path(0.1), &red());
        canvas.pop_clip();
        canvas.flush();
        let view = canvas.view();
        assert_eq!(view.alpha_at(1, 0), 255);
        assert_eq!(view.alpha_at(3, 0), 0);
    }

    #[test]
    fn test_opacity_layer_composites_once() {
        let mut canvas = TinySkiaCanvas::with_size(2, 1).unwrap();
        canvas.push_opacity_layer(0.5, BlendMode::Normal);
        // Overlapping fills inside the layer do not double up.
        canvas.fill_path(&Rect::new(0.0, 0.0, 2.0, 1.0).to_path(0.1), &red());
        canvas.fill_path(&Rect::new(0.0, 0.0, 2.0, 1.0).to_path(0.1), &red());
        canvas.pop_opacity_layer();
        canvas.flush();
        let alpha = canvas.view().alpha_at(0, 0);
        assert!((126..=129).contains(&alpha), "alpha {alpha}");
    }

    #[test]
    fn test_caller_buffer_is_kept() {
        let buffer = PixelBuffer::from_vec(1, 1, ChannelOrder::Bgra, vec![0, 0, 255, 255]).unwrap();
        let canvas = TinySkiaCanvas::new(buffer).unwrap();
        // Reordered to RGBA on entry.
        assert_eq!(canvas.view().rgba_at(0, 0), [255, 0, 0, 255]);
        assert_eq!(canvas.finish().data(), &[255, 0, 0, 255]);
    }

    #[test]
    fn test_image_is_drawn_with_placement() {
        let image = ImageData {
            width: 1,
            height: 1,
            pixels: vec![0, 255, 0, 255],
        };
        let mut canvas = TinySkiaCanvas::with_size(3, 1).unwrap();
        canvas.draw_image(&image, Affine::translate((2.0, 0.0)), 1.0);
        canvas.flush();
        let view = canvas.view();
        assert_eq!(view.rgba_at(2, 0), [0, 255, 0, 255]);
        assert_eq!(view.alpha_at(0, 0), 0);
    }

    fn matted(mode: MatteMode, source: Fill) -> PixelBuffer {
        let mut canvas = TinySkiaCanvas::with_size(4, 1).unwrap();
        canvas.push_matte_layer(mode);
        canvas.fill_path(&Rect::new(0.0, 0.0, 4.0, 1.0).to_path(0.1), &red());
        canvas.push_matte_source();
        canvas.fill_path(&Rect::new(0.0, 0.0, 2.0, 1.0).to_path(0.1), &source);
        canvas.pop_matte_layer();
        canvas.flush();
        canvas.finish()
    }

    #[test]
    fn test_alpha_matte_shows_content_inside_source_only() {
        let white = Fill::solid(Vec4::ONE);
        let buffer = matted(MatteMode::Alpha, white.clone());
        // The source itself never shows: covered pixels are red, not white.
        assert_eq!(buffer.view().rgba_at(0, 0), [255, 0, 0, 255]);
        assert_eq!(buffer.view().alpha_at(3, 0), 0);

        let inverted = matted(MatteMode::AlphaInverted, white);
        assert_eq!(inverted.view().alpha_at(0, 0), 0);
        assert_eq!(inverted.view().rgba_at(3, 0), [255, 0, 0, 255]);
    }

    #[test]
    fn test_luma_matte_ignores_dark_source() {
        let black = Fill::solid(Vec4::new(0.0, 0.0, 0.0, 1.0));
        let buffer = matted(MatteMode::Luma, black.clone());
        assert_eq!(buffer.view().alpha_at(0, 0), 0);
        assert_eq!(buffer.view().alpha_at(3, 0), 0);

        let inverted = matted(MatteMode::LumaInverted, black);
        assert_eq!(inverted.view().alpha_at(0, 0), 255);
        assert_eq!(inverted.view().alpha_at(3, 0), 255);
    }
}
