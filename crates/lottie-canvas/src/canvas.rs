use kurbo::{Affine, BezPath};
use lottie_core::{BlendMode, Fill, ImageData, Mask, MatteMode, Stroke};

/// A drawing target bound to one output buffer.
///
/// Implementations own a current transform and a stack of clips, opacity
/// layers, mask layers and matte layers. Every `push_*` must be undone by the matching
/// `pop_*` in strict nested order, and the stack must be empty when
/// [`Canvas::flush`] runs.
pub trait Canvas {
    /// Device size in pixels.
    fn size(&self) -> (u32, u32);

    fn transform(&self) -> Affine;

    fn set_transform(&mut self, transform: Affine);

    /// Post-multiplies `transform` onto the current transform, so it applies
    /// to geometry before the existing one.
    fn concat_transform(&mut self, transform: Affine) {
        let combined = self.transform() * transform;
        self.set_transform(combined);
    }

    /// Intersects the clip with `path` under the current transform.
    fn push_clip(&mut self, path: &BezPath);

    fn pop_clip(&mut self);

    /// Starts offscreen content that is composited at `alpha` with `blend` on
    /// pop.
    fn push_opacity_layer(&mut self, alpha: f32, blend: BlendMode);

    fn pop_opacity_layer(&mut self);

    /// Starts offscreen content that is multiplied by mask coverage on pop.
    fn push_mask_layer(&mut self);

    /// Combines `masks` (under the current transform) into a coverage map,
    /// applies it to the layer content and composites the result.
    fn pop_mask_layer(&mut self, masks: &[Mask]);

    /// Starts offscreen content that will be shown through a matte.
    fn push_matte_layer(&mut self, mode: MatteMode);

    /// Ends the matted content and starts drawing the matte source, which is
    /// never composited on its own.
    fn push_matte_source(&mut self);

    /// Turns the source into coverage according to the layer's mode, applies
    /// it to the content and composites the result.
    fn pop_matte_layer(&mut self);

    fn fill_path(&mut self, path: &BezPath, fill: &Fill);

    fn stroke_path(&mut self, path: &BezPath, stroke: &Stroke);

    /// Draws `image` with its pixel grid mapped through `transform`, relative
    /// to the current transform.
    fn draw_image(&mut self, image: &ImageData, transform: Affine, opacity: f32);

    /// Finishes pending work. Pixels are readable afterwards.
    fn flush(&mut self);
}
