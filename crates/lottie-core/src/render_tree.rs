use glam::{Vec2, Vec4};
use kurbo::{Affine, BezPath, Rect, Shape as _};
use std::fmt;
use std::sync::Arc;

/// Immutable description of one evaluated frame.
///
/// Built fresh by [`crate::LottiePlayer::render_tree`] and never mutated
/// afterwards, so it can be handed to any number of canvases or threads.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderTree {
    pub width: f32,
    pub height: f32,
    /// Composition frame the tree was evaluated at.
    pub frame: f32,
    pub root: RenderNode,
}

impl RenderTree {
    /// Total number of nodes, root included.
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        let mut pending = vec![&self.root];
        while let Some(node) = pending.pop() {
            count += 1;
            match node {
                RenderNode::Group(group) => pending.extend(group.children.iter()),
                RenderNode::Mask(mask) => pending.push(&mask.content),
                RenderNode::Matte(matte) => {
                    pending.push(&matte.content);
                    pending.push(&matte.source);
                }
                RenderNode::Shape(_) | RenderNode::Image(_) => {}
            }
        }
        count
    }

    /// Depth of the deepest node, the root being at depth 1.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut pending = vec![(&self.root, 1)];
        while let Some((node, depth)) = pending.pop() {
            deepest = deepest.max(depth);
            match node {
                RenderNode::Group(group) => {
                    pending.extend(group.children.iter().map(|c| (c, depth + 1)))
                }
                RenderNode::Mask(mask) => pending.push((&mask.content, depth + 1)),
                RenderNode::Matte(matte) => {
                    pending.push((&matte.content, depth + 1));
                    pending.push((&matte.source, depth + 1));
                }
                RenderNode::Shape(_) | RenderNode::Image(_) => {}
            }
        }
        deepest
    }

    /// Returns a small hand-built tree for backend tests: a red, black-stroked
    /// square in the upper left quadrant of a 500x500 frame.
    pub fn mock_sample() -> Self {
        let rect = Rect::new(100.0, 100.0, 300.0, 300.0).to_path(0.1);

        let shape = Shape {
            path: rect,
            fill: Some(Fill::solid(Vec4::new(1.0, 0.0, 0.0, 1.0))),
            stroke: Some(Stroke {
                paint: Paint::Solid(Vec4::new(0.0, 0.0, 0.0, 1.0)),
                width: 5.0,
                opacity: 1.0,
                cap: LineCap::Round,
                join: LineJoin::Round,
                miter_limit: None,
                dash: None,
            }),
        };

        RenderTree {
            width: 500.0,
            height: 500.0,
            frame: 0.0,
            root: RenderNode::Group(Group::new(vec![RenderNode::Shape(shape)])),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum RenderNode {
    Group(Group),
    Shape(Shape),
    Mask(MaskNode),
    Matte(MatteNode),
    Image(ImageNode),
}

/// Container applying a transform, opacity, blend mode and optional clip to
/// its children. Children paint in order, later ones over earlier ones.
#[derive(Clone, Debug, PartialEq)]
pub struct Group {
    pub transform: Affine,
    pub opacity: f32,
    pub blend_mode: BlendMode,
    /// Clip in the group's local coordinates.
    pub clip: Option<BezPath>,
    pub children: Vec<RenderNode>,
}

impl Group {
    pub fn new(children: Vec<RenderNode>) -> Self {
        Self {
            transform: Affine::IDENTITY,
            opacity: 1.0,
            blend_mode: BlendMode::Normal,
            clip: None,
            children,
        }
    }

    /// Whether compositing this group needs an offscreen layer.
    pub fn needs_layer(&self) -> bool {
        self.opacity < 1.0 || self.blend_mode != BlendMode::Normal
    }
}

/// Content combined offscreen with the coverage of its masks.
#[derive(Clone, Debug, PartialEq)]
pub struct MaskNode {
    pub content: Box<RenderNode>,
    pub masks: Vec<Mask>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Shape {
    pub path: BezPath,
    pub fill: Option<Fill>,
    pub stroke: Option<Stroke>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ImageNode {
    pub image: Arc<ImageData>,
    /// Placement relative to the enclosing coordinate space.
    pub transform: Affine,
    pub opacity: f32,
}

/// Decoded raster: premultiplied RGBA, 8 bits per channel, tightly packed.
#[derive(Clone, PartialEq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl fmt::Debug for ImageData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageData")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Fill {
    pub paint: Paint,
    pub opacity: f32,
    pub rule: FillRule,
}

impl Fill {
    pub fn solid(color: Vec4) -> Self {
        Fill {
            paint: Paint::Solid(color),
            opacity: 1.0,
            rule: FillRule::NonZero,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Stroke {
    pub paint: Paint,
    pub width: f32,
    pub opacity: f32,
    pub cap: LineCap,
    pub join: LineJoin,
    pub miter_limit: Option<f32>,
    pub dash: Option<DashPattern>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Paint {
    Solid(Vec4), // R, G, B, A (straight alpha)
    Gradient(Gradient),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Gradient {
    pub kind: GradientKind,
    pub stops: Vec<GradientStop>,
    /// Linear: start and end points. Radial: center and a point on the rim.
    pub start: Vec2,
    pub end: Vec2,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GradientKind {
    Linear,
    Radial,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GradientStop {
    pub offset: f32,
    pub color: Vec4,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DashPattern {
    pub array: Vec<f32>,
    pub offset: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Mask {
    pub mode: MaskMode,
    pub geometry: BezPath,
    pub opacity: f32,
    pub expansion: f32,
    pub inverted: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendMode {
    Normal,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
    Hue,
    Saturation,
    Color,
    Luminosity,
}

impl BlendMode {
    /// Maps the `bm` layer attribute.
    pub fn from_lottie(value: u8) -> Self {
        match value {
            1 => BlendMode::Multiply,
            2 => BlendMode::Screen,
            3 => BlendMode::Overlay,
            4 => BlendMode::Darken,
            5 => BlendMode::Lighten,
            6 => BlendMode::ColorDodge,
            7 => BlendMode::ColorBurn,
            8 => BlendMode::HardLight,
            9 => BlendMode::SoftLight,
            10 => BlendMode::Difference,
            11 => BlendMode::Exclusion,
            12 => BlendMode::Hue,
            13 => BlendMode::Saturation,
            14 => BlendMode::Color,
            15 => BlendMode::Luminosity,
            _ => BlendMode::Normal,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FillRule {
    NonZero,
    EvenOdd,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineCap {
    Butt,
    Round,
    Square,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineJoin {
    Miter,
    Round,
    Bevel,
}

/// Content shown through the pixels of another layer (a track matte).
///
/// `source` is drawn offscreen and never appears on its own; its alpha or
/// luminance becomes the coverage of `content`.
#[derive(Clone, Debug, PartialEq)]
pub struct MatteNode {
    pub content: Box<RenderNode>,
    pub source: Box<RenderNode>,
    pub mode: MatteMode,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MatteMode {
    Alpha,
    AlphaInverted,
    Luma,
    LumaInverted,
}

impl MatteMode {
    /// Maps the `tt` layer attribute; `None` when the layer has no matte.
    pub fn from_lottie(tt: u8) -> Option<Self> {
        match tt {
            1 => Some(MatteMode::Alpha),
            2 => Some(MatteMode::AlphaInverted),
            3 => Some(MatteMode::Luma),
            4 => Some(MatteMode::LumaInverted),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaskMode {
    Add,
    Subtract,
    Intersect,
    Lighten,
    Darken,
    Difference,
}

impl MaskMode {
    /// Maps the `mode` attribute of a mask; `None` for masks that do not
    /// contribute ("n").
    pub fn from_lottie(mode: Option<&str>) -> Option<Self> {
        match mode {
            Some("a") | None => Some(MaskMode::Add),
            Some("s") => Some(MaskMode::Subtract),
            Some("i") => Some(MaskMode::Intersect),
            Some("l") => Some(MaskMode::Lighten),
            Some("d") => Some(MaskMode::Darken),
            Some("f") => Some(MaskMode::Difference),
            _ => None,
        }
    }
}
