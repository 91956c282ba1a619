pub mod animatable;
pub mod animation;
pub mod assets;
pub mod error;
mod evaluator;
pub mod modifiers;
pub mod render_tree;
mod shapes;
mod validate;

pub use animation::Animation;
pub use assets::ImageSources;
pub use error::{LoadResult, MalformedAnimation};
pub use render_tree::*;

use evaluator::FrameEvaluator;
use lottie_data::model::LottieJson;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Frame-addressable playback of one animation.
///
/// The only mutable state is the current frame index. Out-of-range indices
/// are clamped to `[0, frame_count - 1]`, never wrapped.
#[derive(Debug, Clone)]
pub struct LottiePlayer {
    animation: Arc<Animation>,
    current_frame: u32,
}

impl LottiePlayer {
    /// Parses and validates an animation.
    pub fn load(bytes: &[u8]) -> LoadResult<Self> {
        Animation::from_json(bytes).map(Self::new)
    }

    /// Like [`LottiePlayer::load`], with encoded bytes for image assets that
    /// are not embedded in the document.
    pub fn load_with_images(bytes: &[u8], images: &ImageSources) -> LoadResult<Self> {
        Animation::from_json_with_images(bytes, images).map(Self::new)
    }

    pub fn from_model(model: LottieJson) -> LoadResult<Self> {
        Animation::from_model(model, &ImageSources::new()).map(Self::new)
    }

    fn new(animation: Animation) -> Self {
        Self {
            animation: Arc::new(animation),
            current_frame: 0,
        }
    }

    pub fn frame_count(&self) -> u32 {
        self.animation.frame_count()
    }

    /// Frame rate rounded to whole frames per second.
    pub fn frames_per_second(&self) -> u32 {
        self.animation.frame_rate().round() as u32
    }

    pub fn frame_rate(&self) -> f32 {
        self.animation.frame_rate()
    }

    /// Natural size in animation units.
    pub fn size(&self) -> (u32, u32) {
        (self.animation.width(), self.animation.height())
    }

    pub fn current_frame(&self) -> u32 {
        self.current_frame
    }

    pub fn animation(&self) -> &Arc<Animation> {
        &self.animation
    }

    /// Selects the frame used by [`LottiePlayer::render_tree`] and returns the
    /// index actually applied.
    pub fn set_frame(&mut self, index: u32) -> u32 {
        let last = self.frame_count().saturating_sub(1);
        if index > last {
            debug!(requested = index, applied = last, "frame index clamped");
        }
        self.current_frame = index.min(last);
        self.current_frame
    }

    /// Evaluates every layer at the current frame.
    #[instrument(level = "trace", skip(self), fields(frame = self.current_frame))]
    pub fn render_tree(&self) -> RenderTree {
        let frame = self.animation.in_point() + self.current_frame as f32;
        FrameEvaluator::new(&self.animation).evaluate(frame)
    }
}
