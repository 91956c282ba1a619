use crate::canvas::Canvas;
use crate::state::{StateKind, StateStack};
use kurbo::{Affine, BezPath};
use lottie_core::{BlendMode, Fill, ImageData, Mask, MatteMode, Stroke};

/// Draw calls recorded by a [`NullCanvas`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NullStats {
    pub fills: usize,
    pub strokes: usize,
    pub images: usize,
    pub clips: usize,
    pub opacity_layers: usize,
    pub mask_layers: usize,
    pub matte_layers: usize,
    /// Deepest clip/layer nesting seen.
    pub max_state_depth: usize,
    pub flushes: usize,
}

/// A canvas that draws nothing and counts what it was asked to do.
///
/// It enforces the same push/pop contract as the raster backends, which makes
/// it useful for checking traversal without paying for pixels.
#[derive(Debug)]
pub struct NullCanvas {
    width: u32,
    height: u32,
    transform: Affine,
    states: StateStack,
    stats: NullStats,
}

impl NullCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            transform: Affine::IDENTITY,
            states: StateStack::new(),
            stats: NullStats::default(),
        }
    }

    pub fn stats(&self) -> NullStats {
        self.stats
    }

    fn push(&mut self, kind: StateKind) {
        self.states.push(kind);
        self.stats.max_state_depth = self.stats.max_state_depth.max(self.states.depth());
    }
}

impl Canvas for NullCanvas {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn transform(&self) -> Affine {
        self.transform
    }

    fn set_transform(&mut self, transform: Affine) {
        self.transform = transform;
    }

    fn push_clip(&mut self, _path: &BezPath) {
        self.stats.clips += 1;
        self.push(StateKind::Clip);
    }

    fn pop_clip(&mut self) {
        let _ = self.states.pop(StateKind::Clip);
    }

    fn push_opacity_layer(&mut self, _alpha: f32, _blend: BlendMode) {
        self.stats.opacity_layers += 1;
        self.push(StateKind::Opacity);
    }

    fn pop_opacity_layer(&mut self) {
        let _ = self.states.pop(StateKind::Opacity);
    }

    fn push_mask_layer(&mut self) {
        self.stats.mask_layers += 1;
        self.push(StateKind::Mask);
    }

    fn pop_mask_layer(&mut self, _masks: &[Mask]) {
        let _ = self.states.pop(StateKind::Mask);
    }

    fn push_matte_layer(&mut self, _mode: MatteMode) {
        self.stats.matte_layers += 1;
        self.push(StateKind::Matte);
    }

    fn push_matte_source(&mut self) {
        self.push(StateKind::MatteSource);
    }

    fn pop_matte_layer(&mut self) {
        if self.states.pop(StateKind::MatteSource) {
            let _ = self.states.pop(StateKind::Matte);
        }
    }

    fn fill_path(&mut self, _path: &BezPath, _fill: &Fill) {
        self.stats.fills += 1;
    }

    fn stroke_path(&mut self, _path: &BezPath, _stroke: &Stroke) {
        self.stats.strokes += 1;
    }

    fn draw_image(&mut self, _image: &ImageData, _transform: Affine, _opacity: f32) {
        self.stats.images += 1;
    }

    fn flush(&mut self) {
        self.states.check_balanced();
        self.stats.flushes += 1;
    }
}
