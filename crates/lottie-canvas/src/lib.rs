//! Drawing side of the engine: the [`Canvas`] capability every backend
//! implements, the [`CanvasRenderer`] that walks a render tree into one, and
//! the two backends that need nothing beyond tiny-skia.

mod canvas;
mod convert;
mod coverage;
mod error;
mod null;
mod pixels;
mod renderer;
mod state;
mod tiny;

pub use canvas::Canvas;
pub use coverage::{mask_coverage, matte_coverage};
pub use error::CanvasError;
pub use null::{NullCanvas, NullStats};
pub use pixels::{BufferOwnership, ChannelOrder, PixelBuffer, PixelView};
pub use renderer::{CanvasRenderer, RenderStats};
pub use state::{StateKind, StateStack};
pub use tiny::TinySkiaCanvas;
