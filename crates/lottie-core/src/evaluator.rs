use crate::animatable::Animator;
use crate::animation::{Animation, CompId, ROOT};
use crate::render_tree::*;
use crate::shapes::{bezier_to_path, ShapeBuilder};
use glam::{Mat3, Vec2, Vec3, Vec4};
use kurbo::{Affine, Rect, Shape as _};
use lottie_data::model as data;
use std::collections::HashMap;
use tracing::warn;

/// Memo key for a layer's world transform. Frames are compared bitwise so
/// the same composition frame always hits the same entry.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
struct TransformKey {
    comp: CompId,
    layer: usize,
    frame: u32,
}

impl TransformKey {
    fn new(comp: CompId, layer: usize, frame: f32) -> Self {
        Self {
            comp,
            layer,
            frame: frame.to_bits(),
        }
    }
}

/// Builds the render tree of one frame.
///
/// Lives for a single evaluation pass; the transform memo is dropped with
/// it.
pub(crate) struct FrameEvaluator<'a> {
    animation: &'a Animation,
    transforms: HashMap<TransformKey, Mat3>,
}

impl<'a> FrameEvaluator<'a> {
    pub fn new(animation: &'a Animation) -> Self {
        Self {
            animation,
            transforms: HashMap::with_capacity(animation.layers(ROOT).len()),
        }
    }

    /// Evaluates the root composition at `frame` (composition time, not an
    /// index).
    pub fn evaluate(mut self, frame: f32) -> RenderTree {
        let children = self.composition(ROOT, frame);
        RenderTree {
            width: self.animation.width() as f32,
            height: self.animation.height() as f32,
            frame,
            root: RenderNode::Group(Group::new(children)),
        }
    }

    /// Layers are declared top-most first; nodes come out in paint order.
    fn composition(&mut self, comp: CompId, frame: f32) -> Vec<RenderNode> {
        let animation = self.animation;
        let composition = animation.composition(comp);
        let count = animation.layers(comp).len();
        (0..count)
            .rev()
            .filter(|pos| !composition.matte_sources.contains(pos))
            .filter_map(|pos| {
                let content = self.layer(comp, pos, frame)?;
                let Some(&(source, mode)) = composition.mattes.get(&pos) else {
                    return Some(content);
                };
                // An invisible source still mattes: nothing shows through it.
                let source = self
                    .layer(comp, source, frame)
                    .unwrap_or_else(|| RenderNode::Group(Group::new(Vec::new())));
                Some(RenderNode::Matte(MatteNode {
                    content: Box::new(content),
                    source: Box::new(source),
                    mode,
                }))
            })
            .collect()
    }

    fn layer(&mut self, comp: CompId, pos: usize, frame: f32) -> Option<RenderNode> {
        let animation = self.animation;
        let layer = &animation.layers(comp)[pos];
        if layer.hd || frame < layer.ip || frame >= layer.op {
            return None;
        }
        let local = local_frame(layer, frame);

        let mut clip = None;
        let mut children = match layer.ty {
            0 => {
                let id = layer.ref_id.as_deref()?;
                let child = animation.precomp(id)?;
                let child_frame = match &layer.tm {
                    Some(tm) => Animator::resolve(tm, local, |v| *v, 0.0) * animation.frame_rate(),
                    None => local,
                };
                let asset = animation.asset(id);
                let width = layer.w.or(asset.and_then(|a| a.w)).unwrap_or(0);
                let height = layer.h.or(asset.and_then(|a| a.h)).unwrap_or(0);
                if width > 0 && height > 0 {
                    clip = Some(Rect::new(0.0, 0.0, width as f64, height as f64).to_path(0.1));
                }
                self.composition(child, child_frame)
            }
            1 => vec![solid(layer)],
            2 => {
                let image = animation.image(layer.ref_id.as_deref()?)?;
                vec![RenderNode::Image(ImageNode {
                    image: image.clone(),
                    transform: Affine::IDENTITY,
                    opacity: 1.0,
                })]
            }
            4 => ShapeBuilder::new(local).layer_content(layer.shapes.as_deref().unwrap_or_default()),
            // Null layers only exist to parent others; text is reported at load.
            _ => return None,
        };

        let masks = masks(layer, local);
        if !masks.is_empty() {
            children = vec![RenderNode::Mask(MaskNode {
                content: Box::new(RenderNode::Group(Group::new(children))),
                masks,
            })];
        }

        Some(RenderNode::Group(Group {
            transform: to_affine(self.world_transform(comp, pos, frame)),
            opacity: transform_opacity(&layer.ks, local),
            blend_mode: layer.bm.map(BlendMode::from_lottie).unwrap_or(BlendMode::Normal),
            clip,
            children,
        }))
    }

    /// Walks up the parent chain until a memoized ancestor (or the root),
    /// then composes back down, caching every step.
    fn world_transform(&mut self, comp: CompId, pos: usize, frame: f32) -> Mat3 {
        let animation = self.animation;
        let layers = animation.layers(comp);
        let by_index = &animation.composition(comp).by_index;

        let mut chain = Vec::new();
        let mut world = Mat3::IDENTITY;
        let mut current = Some(pos);
        while let Some(p) = current {
            if let Some(cached) = self.transforms.get(&TransformKey::new(comp, p, frame)) {
                world = *cached;
                break;
            }
            chain.push(p);
            current = layers[p].parent.and_then(|ind| by_index.get(&ind).copied());
        }

        for p in chain.into_iter().rev() {
            let layer = &layers[p];
            world *= layer_matrix(&layer.ks, local_frame(layer, frame));
            self.transforms.insert(TransformKey::new(comp, p, frame), world);
        }
        world
    }
}

fn local_frame(layer: &data::Layer, frame: f32) -> f32 {
    let stretch = if layer.sr == 0.0 { 1.0 } else { layer.sr };
    (frame - layer.st) / stretch
}

fn solid(layer: &data::Layer) -> RenderNode {
    let width = layer.sw.unwrap_or(0) as f64;
    let height = layer.sh.unwrap_or(0) as f64;
    let color = layer
        .color
        .as_deref()
        .and_then(parse_hex_color)
        .unwrap_or_else(|| {
            warn!(color = ?layer.color, "solid layer colour is not a hex colour");
            Vec4::new(0.0, 0.0, 0.0, 1.0)
        });
    RenderNode::Shape(Shape {
        path: Rect::new(0.0, 0.0, width, height).to_path(0.1),
        fill: Some(Fill::solid(color)),
        stroke: None,
    })
}

/// Parses `#rrggbb` (or `#rgb`) into an opaque colour.
fn parse_hex_color(hex: &str) -> Option<Vec4> {
    let digits = hex.trim().trim_start_matches('#');
    let channel = |i: usize, len: usize| -> Option<f32> {
        let raw = u8::from_str_radix(digits.get(i * len..(i + 1) * len)?, 16).ok()?;
        Some(if len == 1 { raw * 17 } else { raw } as f32 / 255.0)
    };
    let len = match digits.len() {
        3 => 1,
        6 => 2,
        _ => return None,
    };
    Some(Vec4::new(channel(0, len)?, channel(1, len)?, channel(2, len)?, 1.0))
}

fn masks(layer: &data::Layer, frame: f32) -> Vec<Mask> {
    let Some(props) = &layer.masks_properties else {
        return Vec::new();
    };
    props
        .iter()
        .filter_map(|m| {
            let mode = MaskMode::from_lottie(m.mode.as_deref())?;
            let path = Animator::resolve(&m.pt, frame, |v| v.clone(), data::BezierPath::default());
            Some(Mask {
                mode,
                geometry: bezier_to_path(&path),
                opacity: Animator::resolve(&m.o, frame, |v| *v / 100.0, 1.0).clamp(0.0, 1.0),
                expansion: Animator::resolve(&m.x, frame, |v| *v, 0.0),
                inverted: m.inv,
            })
        })
        .collect()
}

pub(crate) fn position(p: &data::PositionProperty, frame: f32) -> Vec2 {
    match p {
        data::PositionProperty::Unified(p) => {
            Animator::resolve(p, frame, |v| Vec3::from(v.0), Vec3::ZERO).truncate()
        }
        data::PositionProperty::Split { x, y } => Vec2::new(
            Animator::resolve(x, frame, |v| *v, 0.0),
            Animator::resolve(y, frame, |v| *v, 0.0),
        ),
    }
}

fn layer_matrix(ks: &data::Transform, frame: f32) -> Mat3 {
    let anchor = Animator::resolve(&ks.a, frame, |v| Vec3::from(v.0), Vec3::ZERO).truncate();
    let pos = position(&ks.p, frame);
    let scale = Animator::resolve(&ks.s, frame, |v| Vec3::from(v.0) / 100.0, Vec3::ONE).truncate();
    let rotation = Animator::resolve(&ks.rz, frame, |v| v.to_radians(), 0.0);
    let skew = Animator::resolve(&ks.sk, frame, |v| v.to_radians(), 0.0);
    let skew_axis = Animator::resolve(&ks.sa, frame, |v| v.to_radians(), 0.0);

    let mat_t = Mat3::from_translation(pos);
    let mat_r = Mat3::from_angle(rotation);
    let mat_s = Mat3::from_scale(scale);
    let mat_a = Mat3::from_translation(-anchor);
    if skew == 0.0 {
        return mat_t * mat_r * mat_s * mat_a;
    }
    let shear = Mat3::from_cols(Vec3::X, Vec3::new((-skew).tan(), 1.0, 0.0), Vec3::Z);
    let mat_sk = Mat3::from_angle(-skew_axis) * shear * Mat3::from_angle(skew_axis);
    mat_t * mat_r * mat_sk * mat_s * mat_a
}

/// Local matrix of a layer or shape-group transform.
pub(crate) fn transform_matrix(ks: &data::Transform, frame: f32) -> Affine {
    to_affine(layer_matrix(ks, frame))
}

pub(crate) fn transform_opacity(ks: &data::Transform, frame: f32) -> f32 {
    Animator::resolve(&ks.o, frame, |v| *v / 100.0, 1.0).clamp(0.0, 1.0)
}

fn to_affine(m: Mat3) -> Affine {
    let c = m.to_cols_array();
    Affine::new([
        c[0] as f64,
        c[1] as f64,
        c[3] as f64,
        c[4] as f64,
        c[6] as f64,
        c[7] as f64,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::Point;

    #[test]
    fn test_hex_colors() {
        assert_eq!(parse_hex_color("#ff0000"), Some(Vec4::new(1.0, 0.0, 0.0, 1.0)));
        assert_eq!(parse_hex_color("#fff"), Some(Vec4::ONE));
        assert_eq!(parse_hex_color("red"), None);
    }

    #[test]
    fn test_transform_order() {
        let ks = data::Transform {
            a: data::Property::fixed(data::Vec3DefaultZero([10.0, 0.0, 0.0])),
            p: data::PositionProperty::Unified(data::Property::fixed(data::Vec3DefaultZero([
                100.0, 50.0, 0.0,
            ]))),
            s: data::Property::fixed(data::Vec3Scale([200.0, 200.0, 100.0])),
            rz: data::Property::fixed(90.0),
            ..Default::default()
        };
        let m = transform_matrix(&ks, 0.0);
        // (20, 0) -> anchor (10, 0) -> scale (20, 0) -> rotate (0, 20) -> (100, 70)
        let p = m * Point::new(20.0, 0.0);
        assert!((p.x - 100.0).abs() < 1e-4, "{:?}", p);
        assert!((p.y - 70.0).abs() < 1e-4, "{:?}", p);
    }

    #[test]
    fn test_skew_shears_horizontally() {
        let ks = data::Transform {
            sk: data::Property::fixed(-45.0),
            ..Default::default()
        };
        let p = transform_matrix(&ks, 0.0) * Point::new(0.0, 10.0);
        assert!((p.x - 10.0).abs() < 1e-4, "{:?}", p);
        assert!((p.y - 10.0).abs() < 1e-4, "{:?}", p);
    }

    #[test]
    fn test_stretch_zero_is_treated_as_one() {
        let layer: data::Layer = serde_json::from_value(serde_json::json!({
            "ty": 3, "ip": 0, "op": 10, "st": 2, "sr": 0
        }))
        .unwrap();
        assert_eq!(local_frame(&layer, 5.0), 3.0);
    }
}
