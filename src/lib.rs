//! # lottie-engine
//!
//! Frame-addressable Lottie playback. Load an animation into a
//! [`LottiePlayer`], pick a frame, build its [`RenderTree`] and rasterise it
//! through an explicitly chosen [`Backend`]:
//!
//! ```no_run
//! use lottie_engine::{render_frame, Backend, LottiePlayer};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bytes = std::fs::read("animation.json")?;
//! let mut player = LottiePlayer::load(&bytes)?;
//! player.set_frame(12);
//! let frame = render_frame(&player.render_tree(), Backend::TinySkia, 512, 512)?;
//! let display = frame.to_display_buffer().ok_or("no pixels")?;
//! assert_eq!(display.width(), 512);
//! # Ok(())
//! # }
//! ```
//!
//! Backends never fall back to one another. Asking for one that this build
//! does not include is an [`EngineError::BackendUnavailable`].

use thiserror::Error;
use tracing::{debug, instrument};

pub use lottie_canvas::{
    BufferOwnership, Canvas, CanvasError, CanvasRenderer, ChannelOrder, NullCanvas, NullStats,
    PixelBuffer, PixelView, RenderStats, TinySkiaCanvas,
};
pub use lottie_core::{LottiePlayer, MalformedAnimation, RenderNode, RenderTree};

#[cfg(feature = "skia")]
pub use lottie_skia::{SkiaCanvas, SkiaFrame};
#[cfg(feature = "vello")]
pub use lottie_vello::{VelloCanvas, VelloFrame};

/// Rasterisation backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Skia raster surface; the reference for correctness.
    Skia,
    /// tiny-skia over a caller buffer; premultiplied RGBA.
    TinySkia,
    /// vello_cpu; premultiplied RGBA owned by the backend.
    VelloCpu,
    /// Walks the tree without drawing.
    Null,
}

impl Backend {
    pub const ALL: [Backend; 4] = [
        Backend::Skia,
        Backend::TinySkia,
        Backend::VelloCpu,
        Backend::Null,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Backend::Skia => "skia",
            Backend::TinySkia => "tiny-skia",
            Backend::VelloCpu => "vello-cpu",
            Backend::Null => "null",
        }
    }

    /// Whether this build was compiled with the backend.
    pub fn is_available(self) -> bool {
        match self {
            Backend::Skia => cfg!(feature = "skia"),
            Backend::VelloCpu => cfg!(feature = "vello"),
            Backend::TinySkia | Backend::Null => true,
        }
    }

    /// Who owns the pixels this backend produces; `None` when it produces none.
    pub fn ownership(self) -> Option<BufferOwnership> {
        match self {
            Backend::TinySkia => Some(BufferOwnership::CallerProvided),
            Backend::Skia | Backend::VelloCpu => Some(BufferOwnership::BackendOwned),
            Backend::Null => None,
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("backend {0} is not available in this build")]
    BackendUnavailable(Backend),
    #[error(transparent)]
    Canvas(#[from] CanvasError),
}

/// Pixels that live inside a backend's own frame object.
#[derive(Debug)]
pub enum BackendFrame {
    #[cfg(feature = "skia")]
    Skia(SkiaFrame),
    #[cfg(feature = "vello")]
    Vello(VelloFrame),
}

impl BackendFrame {
    pub fn view(&self) -> Option<PixelView<'_>> {
        match *self {
            #[cfg(feature = "skia")]
            BackendFrame::Skia(ref frame) => Some(frame.view()),
            #[cfg(feature = "vello")]
            BackendFrame::Vello(ref frame) => frame.view(),
        }
    }
}

#[derive(Debug)]
pub enum FrameOutput {
    /// The buffer the caller supplied, drawn into and handed back.
    CallerBuffer(PixelBuffer),
    /// Pixels owned by the backend; valid while the frame is alive.
    BackendBuffer(BackendFrame),
    /// Nothing was drawn; the null backend's call counts.
    Headless(NullStats),
}

/// One rasterised frame, tagged with who owns its pixels.
#[derive(Debug)]
pub struct RenderedFrame {
    pub backend: Backend,
    pub width: u32,
    pub height: u32,
    pub stats: RenderStats,
    pub output: FrameOutput,
}

impl RenderedFrame {
    pub fn ownership(&self) -> Option<BufferOwnership> {
        match self.output {
            FrameOutput::CallerBuffer(_) => Some(BufferOwnership::CallerProvided),
            FrameOutput::BackendBuffer(_) => Some(BufferOwnership::BackendOwned),
            FrameOutput::Headless(_) => None,
        }
    }

    /// The pixels in their native order, without copying.
    pub fn view(&self) -> Option<PixelView<'_>> {
        match &self.output {
            FrameOutput::CallerBuffer(buffer) => Some(buffer.view()),
            FrameOutput::BackendBuffer(frame) => frame.view(),
            FrameOutput::Headless(_) => None,
        }
    }

    /// A copy in [`ChannelOrder::DISPLAY`] order.
    pub fn to_display_buffer(&self) -> Option<PixelBuffer> {
        self.view().map(|view| view.to_buffer().into_display_order())
    }

    /// Takes the caller's buffer back, if this frame was drawn into one.
    pub fn into_buffer(self) -> Option<PixelBuffer> {
        match self.output {
            FrameOutput::CallerBuffer(buffer) => Some(buffer),
            _ => None,
        }
    }
}

/// Rasterises `tree` at `width` x `height` with `backend`.
#[instrument(level = "debug", skip(tree), fields(frame = tree.frame))]
pub fn render_frame(
    tree: &RenderTree,
    backend: Backend,
    width: u32,
    height: u32,
) -> Result<RenderedFrame, EngineError> {
    match backend {
        Backend::Skia => render_skia(tree, width, height),
        Backend::TinySkia => render_frame_into(tree, PixelBuffer::new(width, height)?),
        Backend::VelloCpu => render_vello(tree, width, height),
        Backend::Null => {
            let mut canvas = NullCanvas::new(width, height);
            let stats = CanvasRenderer::render(tree, &mut canvas, (width, height));
            Ok(RenderedFrame {
                backend,
                width,
                height,
                stats,
                output: FrameOutput::Headless(canvas.stats()),
            })
        }
    }
}

/// Rasterises `tree` into a caller-supplied buffer with tiny-skia, scaled to
/// the buffer's size. The buffer comes back in RGBA order.
pub fn render_frame_into(tree: &RenderTree, buffer: PixelBuffer) -> Result<RenderedFrame, EngineError> {
    let (width, height) = (buffer.width(), buffer.height());
    let mut canvas = TinySkiaCanvas::new(buffer)?;
    let stats = CanvasRenderer::render(tree, &mut canvas, (width, height));
    debug!(width, height, nodes = stats.nodes_visited, "rendered into caller buffer");
    Ok(RenderedFrame {
        backend: Backend::TinySkia,
        width,
        height,
        stats,
        output: FrameOutput::CallerBuffer(canvas.finish()),
    })
}

#[cfg(feature = "skia")]
fn render_skia(tree: &RenderTree, width: u32, height: u32) -> Result<RenderedFrame, EngineError> {
    let mut canvas = SkiaCanvas::new(width, height)?;
    let stats = CanvasRenderer::render(tree, &mut canvas, (width, height));
    Ok(RenderedFrame {
        backend: Backend::Skia,
        width,
        height,
        stats,
        output: FrameOutput::BackendBuffer(BackendFrame::Skia(canvas.finish()?)),
    })
}

#[cfg(not(feature = "skia"))]
fn render_skia(_tree: &RenderTree, _width: u32, _height: u32) -> Result<RenderedFrame, EngineError> {
    Err(EngineError::BackendUnavailable(Backend::Skia))
}

#[cfg(feature = "vello")]
fn render_vello(tree: &RenderTree, width: u32, height: u32) -> Result<RenderedFrame, EngineError> {
    let mut canvas = VelloCanvas::new(width, height)?;
    let stats = CanvasRenderer::render(tree, &mut canvas, (width, height));
    Ok(RenderedFrame {
        backend: Backend::VelloCpu,
        width,
        height,
        stats,
        output: FrameOutput::BackendBuffer(BackendFrame::Vello(canvas.finish())),
    })
}

#[cfg(not(feature = "vello"))]
fn render_vello(_tree: &RenderTree, _width: u32, _height: u32) -> Result<RenderedFrame, EngineError> {
    Err(EngineError::BackendUnavailable(Backend::VelloCpu))
}
