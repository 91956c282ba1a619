use thiserror::Error;

/// Structural problems found while loading an animation.
///
/// Loading either yields a fully validated [`crate::Animation`] or one of
/// these; no partially loaded player is ever produced.
#[derive(Debug, Error)]
pub enum MalformedAnimation {
    #[error("animation is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("animation size {width}x{height} is empty")]
    EmptySize { width: u32, height: u32 },

    #[error("frame rate {0} is not a positive number")]
    FrameRate(f32),

    #[error("frame range [{in_point}, {out_point}) is invalid")]
    FrameRange { in_point: f32, out_point: f32 },

    #[error("layer index {index} is declared twice in {composition}")]
    DuplicateLayer { composition: String, index: u32 },

    #[error("layer {layer} in {composition} references missing parent {parent}")]
    UnresolvedParent {
        composition: String,
        layer: String,
        parent: u32,
    },

    #[error("parent chain in {composition} loops through layer {index}")]
    ParentCycle { composition: String, index: u32 },

    #[error("layer {layer} in {composition} takes its matte from missing layer {matte}")]
    UnresolvedMatte {
        composition: String,
        layer: String,
        matte: u32,
    },

    #[error("layer {layer} references unknown asset '{asset}'")]
    UnresolvedAsset { layer: String, asset: String },

    #[error("precomposition '{0}' contains itself")]
    PrecompCycle(String),

    #[error("keyframes of {property} on {layer} go back in time ({previous} then {next})")]
    KeyframeOrder {
        layer: String,
        property: String,
        previous: f32,
        next: f32,
    },

    #[error("image asset '{asset}' could not be decoded: {reason}")]
    ImageDecode { asset: String, reason: String },
}

pub type LoadResult<T> = Result<T, MalformedAnimation>;
