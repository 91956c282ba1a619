use crate::animatable::Animator;
use crate::evaluator::{position, transform_matrix, transform_opacity};
use crate::modifiers::{GeometryModifier, TrimModifier};
use crate::render_tree::*;
use glam::{Vec2, Vec3, Vec4};
use kurbo::{Affine, BezPath, Point, Shape as _};
use lottie_data::model as data;
use std::f64::consts::PI;

const TOLERANCE: f64 = 0.1;
const MAX_REPEATER_COPIES: usize = 1000;

#[derive(Clone)]
enum PendingGeometry {
    Path(BezPath),
    Rect { size: Vec2, pos: Vec2, radius: f32 },
    Ellipse { size: Vec2, pos: Vec2 },
    Polystar(PolystarParams),
    Merged(Vec<PendingGeometry>, MergeMode),
}

impl PendingGeometry {
    fn to_path(&self) -> BezPath {
        match self {
            PendingGeometry::Path(p) => p.clone(),
            PendingGeometry::Merged(parts, _) => {
                let mut path = BezPath::new();
                for part in parts {
                    path.extend(part.to_path());
                }
                path
            }
            PendingGeometry::Rect { size, pos, radius } => {
                let half = *size / 2.0;
                let rect = kurbo::Rect::new(
                    (pos.x - half.x) as f64,
                    (pos.y - half.y) as f64,
                    (pos.x + half.x) as f64,
                    (pos.y + half.y) as f64,
                );
                let radius = radius.min(half.x.abs()).min(half.y.abs());
                if radius > 0.0 {
                    rect.to_rounded_rect(radius as f64).to_path(TOLERANCE)
                } else {
                    rect.to_path(TOLERANCE)
                }
            }
            PendingGeometry::Ellipse { size, pos } => {
                let half = *size / 2.0;
                kurbo::Ellipse::new(
                    (pos.x as f64, pos.y as f64),
                    (half.x as f64, half.y as f64),
                    0.0,
                )
                .to_path(TOLERANCE)
            }
            PendingGeometry::Polystar(params) => polystar_path(params),
        }
    }

    fn transformed(&self, transform: Affine) -> PendingGeometry {
        match self {
            PendingGeometry::Merged(parts, mode) => PendingGeometry::Merged(
                parts.iter().map(|p| p.transformed(transform)).collect(),
                *mode,
            ),
            other => PendingGeometry::Path(transform * other.to_path()),
        }
    }

    /// Coverage masks that carve a boolean merge out of its concatenated
    /// outline. `None` when the outline already is the result.
    fn merge_masks(&self) -> Option<Vec<Mask>> {
        let PendingGeometry::Merged(parts, mode) = self else {
            return None;
        };
        let combine = mode.mask_mode()?;
        let masks = parts
            .iter()
            .enumerate()
            .map(|(i, part)| Mask {
                mode: if i == 0 { MaskMode::Add } else { combine },
                geometry: part.to_path(),
                opacity: 1.0,
                expansion: 0.0,
                inverted: false,
            })
            .collect();
        Some(masks)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum MergeMode {
    Merge,
    Add,
    Subtract,
    Intersect,
    Exclude,
}

impl MergeMode {
    fn from_lottie(mm: u8) -> Self {
        match mm {
            2 => MergeMode::Add,
            3 => MergeMode::Subtract,
            4 => MergeMode::Intersect,
            5 => MergeMode::Exclude,
            _ => MergeMode::Merge,
        }
    }

    /// How each later path combines with the running result.
    fn mask_mode(self) -> Option<MaskMode> {
        match self {
            MergeMode::Merge | MergeMode::Add => None,
            MergeMode::Subtract => Some(MaskMode::Subtract),
            MergeMode::Intersect => Some(MaskMode::Intersect),
            MergeMode::Exclude => Some(MaskMode::Difference),
        }
    }
}

#[derive(Clone, Copy)]
struct PolystarParams {
    pos: Vec2,
    outer_radius: f32,
    inner_radius: f32,
    outer_roundness: f32,
    inner_roundness: f32,
    rotation: f32,
    points: f32,
    kind: u8,           // 1=star, 2=polygon
    corner_radius: f32, // From RoundCorners modifier
}

#[derive(Clone, Copy)]
struct TrimSpec {
    modifier: TrimModifier,
    sequential: bool,
}

/// Evaluates shape-layer content at one layer-local frame.
pub(crate) struct ShapeBuilder {
    frame: f32,
}

impl ShapeBuilder {
    pub fn new(frame: f32) -> Self {
        Self { frame }
    }

    /// Builds the nodes for a layer's shape list.
    pub fn layer_content(&self, shapes: &[data::Shape]) -> Vec<RenderNode> {
        let group = self.group(shapes, None);
        if group.transform == Affine::IDENTITY && !group.needs_layer() {
            group.children
        } else {
            vec![RenderNode::Group(group)]
        }
    }

    /// Paint items apply to the geometry declared before them in the same
    /// group. Items declared first end up on top, so the nodes are emitted in
    /// reverse declaration order.
    fn group(&self, items: &[data::Shape], inherited_trim: Option<TrimSpec>) -> Group {
        let frame = self.frame;
        let trim = items
            .iter()
            .find_map(|item| match item {
                data::Shape::Trim(t) => Some(self.trim(t)),
                _ => None,
            })
            .or(inherited_trim);

        let mut nodes = Vec::new();
        let mut geometries: Vec<PendingGeometry> = Vec::new();
        let mut transform = Affine::IDENTITY;
        let mut opacity = 1.0;

        for item in items {
            match item {
                data::Shape::Group(g) => {
                    if !g.hd {
                        nodes.push(RenderNode::Group(self.group(&g.it, trim)));
                    }
                }
                data::Shape::Path(p) => {
                    let bezier =
                        Animator::resolve(&p.ks, frame, |v| v.clone(), data::BezierPath::default());
                    geometries.push(PendingGeometry::Path(bezier_to_path(&bezier)));
                }
                data::Shape::Rect(r) => {
                    let size = Animator::resolve(&r.s, frame, |v| Vec2::from_slice(v), Vec2::ZERO);
                    let pos = Animator::resolve(&r.p, frame, |v| Vec2::from_slice(v), Vec2::ZERO);
                    let radius = Animator::resolve(&r.r, frame, |v| *v, 0.0);
                    geometries.push(PendingGeometry::Rect { size, pos, radius });
                }
                data::Shape::Ellipse(e) => {
                    let size = Animator::resolve(&e.s, frame, |v| Vec2::from_slice(v), Vec2::ZERO);
                    let pos = Animator::resolve(&e.p, frame, |v| Vec2::from_slice(v), Vec2::ZERO);
                    geometries.push(PendingGeometry::Ellipse { size, pos });
                }
                data::Shape::Polystar(sr) => {
                    let optional = |p: &Option<data::Property<f32>>| {
                        p.as_ref()
                            .map(|p| Animator::resolve(p, frame, |v| *v, 0.0))
                            .unwrap_or(0.0)
                    };
                    geometries.push(PendingGeometry::Polystar(PolystarParams {
                        pos: position(&sr.p, frame),
                        outer_radius: Animator::resolve(&sr.or, frame, |v| *v, 0.0),
                        inner_radius: optional(&sr.ir),
                        outer_roundness: Animator::resolve(&sr.os, frame, |v| *v, 0.0),
                        inner_roundness: optional(&sr.is),
                        rotation: Animator::resolve(&sr.r, frame, |v| *v, 0.0),
                        points: Animator::resolve(&sr.pt, frame, |v| *v, 5.0),
                        kind: sr.sy,
                        corner_radius: 0.0,
                    }));
                }
                data::Shape::RoundCorners(rd) => {
                    let r = Animator::resolve(&rd.r, frame, |v| *v, 0.0);
                    if r > 0.0 {
                        for geom in &mut geometries {
                            match geom {
                                PendingGeometry::Rect { radius, .. } => *radius += r,
                                PendingGeometry::Polystar(p) => p.corner_radius += r,
                                _ => {}
                            }
                        }
                    }
                }
                data::Shape::MergePaths(mp) => {
                    if geometries.len() > 1 {
                        let parts = std::mem::take(&mut geometries);
                        geometries.push(PendingGeometry::Merged(parts, MergeMode::from_lottie(mp.mm)));
                    }
                }
                data::Shape::Repeater(rp) => self.repeat(rp, &mut geometries, &mut nodes),
                data::Shape::Transform(tr) => {
                    transform = transform_matrix(&tr.t, frame);
                    opacity = transform_opacity(&tr.t, frame);
                }
                data::Shape::Fill(f) => {
                    let color = Animator::resolve(&f.c, frame, |v| color(v), Vec4::ONE);
                    let fill = Fill {
                        paint: Paint::Solid(color),
                        opacity: percent(&f.o, frame),
                        rule: fill_rule(f.r),
                    };
                    self.emit(&mut nodes, &geometries, trim, Some(fill), None);
                }
                data::Shape::GradientFill(gf) => {
                    let fill = Fill {
                        paint: Paint::Gradient(self.gradient(gf.t, &gf.s, &gf.e, &gf.g)),
                        opacity: percent(&gf.o, frame),
                        rule: fill_rule(gf.r),
                    };
                    self.emit(&mut nodes, &geometries, trim, Some(fill), None);
                }
                data::Shape::Stroke(s) => {
                    let stroke = Stroke {
                        paint: Paint::Solid(Animator::resolve(&s.c, frame, |v| color(v), Vec4::ONE)),
                        width: Animator::resolve(&s.w, frame, |v| *v, 1.0),
                        opacity: percent(&s.o, frame),
                        cap: line_cap(s.lc),
                        join: line_join(s.lj),
                        miter_limit: s.ml,
                        dash: self.dash(&s.d),
                    };
                    self.emit(&mut nodes, &geometries, trim, None, Some(stroke));
                }
                data::Shape::GradientStroke(gs) => {
                    let stroke = Stroke {
                        paint: Paint::Gradient(self.gradient(gs.t, &gs.s, &gs.e, &gs.g)),
                        width: Animator::resolve(&gs.w, frame, |v| *v, 1.0),
                        opacity: percent(&gs.o, frame),
                        cap: line_cap(gs.lc),
                        join: line_join(gs.lj),
                        miter_limit: gs.ml,
                        dash: self.dash(&gs.d),
                    };
                    self.emit(&mut nodes, &geometries, trim, None, Some(stroke));
                }
                data::Shape::Trim(_) | data::Shape::Unknown => {}
            }
        }

        nodes.reverse();
        Group {
            transform,
            opacity,
            blend_mode: BlendMode::Normal,
            clip: None,
            children: nodes,
        }
    }

    fn emit(
        &self,
        nodes: &mut Vec<RenderNode>,
        geometries: &[PendingGeometry],
        trim: Option<TrimSpec>,
        fill: Option<Fill>,
        stroke: Option<Stroke>,
    ) {
        let mut paths: Vec<BezPath> = geometries.iter().map(PendingGeometry::to_path).collect();
        if let Some(trim) = trim {
            if trim.sequential {
                trim.modifier.apply_sequentially(&mut paths);
            } else {
                for path in &mut paths {
                    trim.modifier.modify(path);
                }
            }
        }

        let mut path = BezPath::new();
        for (geometry, p) in geometries.iter().zip(paths) {
            // Boolean merges only shape fills; strokes follow every outline.
            match (geometry.merge_masks(), &fill) {
                (Some(masks), Some(_)) if !p.elements().is_empty() => {
                    nodes.push(RenderNode::Mask(MaskNode {
                        content: Box::new(RenderNode::Shape(Shape {
                            path: p,
                            fill: fill.clone(),
                            stroke: None,
                        })),
                        masks,
                    }));
                }
                _ => path.extend(p),
            }
        }
        if path.elements().is_empty() {
            return;
        }
        nodes.push(RenderNode::Shape(Shape { path, fill, stroke }));
    }

    /// Replaces everything declared so far in the group with `c` transformed
    /// copies. Copy `k` (counted from the offset) gets the repeater transform
    /// applied `k` times and an opacity stepped from start to end.
    fn repeat(
        &self,
        rp: &data::RepeaterShape,
        geometries: &mut Vec<PendingGeometry>,
        nodes: &mut Vec<RenderNode>,
    ) {
        let frame = self.frame;
        let copies = Animator::resolve(&rp.c, frame, |v| *v, 0.0).round();
        let count = if copies.is_finite() && copies > 0.0 {
            (copies as usize).min(MAX_REPEATER_COPIES)
        } else {
            0
        };
        let base = std::mem::take(geometries);
        // Paint order, as a group's children expect.
        let painted: Vec<RenderNode> = std::mem::take(nodes).into_iter().rev().collect();
        if count == 0 {
            return;
        }

        let offset = Animator::resolve(&rp.o, frame, |v| *v, 0.0);
        let t = &rp.tr.t;
        let anchor = Animator::resolve(&t.a, frame, |v| Vec3::from(v.0), Vec3::ZERO).truncate();
        let pos = position(&t.p, frame);
        let scale = Animator::resolve(&t.s, frame, |v| Vec3::from(v.0) / 100.0, Vec3::ONE).truncate();
        let rotation = Animator::resolve(&t.rz, frame, |v| v.to_radians(), 0.0);
        let start_opacity = percent(&rp.tr.so, frame);
        let end_opacity = percent(&rp.tr.eo, frame);

        let anchor = kurbo::Vec2::new(anchor.x as f64, anchor.y as f64);
        let copy_transform = |k: f32| {
            Affine::translate(kurbo::Vec2::new((pos.x * k) as f64, (pos.y * k) as f64))
                * Affine::translate(anchor)
                * Affine::rotate((rotation * k) as f64)
                * Affine::scale_non_uniform(repeat_scale(scale.x, k) as f64, repeat_scale(scale.y, k) as f64)
                * Affine::translate(-anchor)
        };

        // Mode 2 stacks each copy below the previous one. Nodes are emitted
        // top-most first, so the push order is the reverse of the stacking.
        let order: Vec<usize> = if rp.m == 2 {
            (0..count).collect()
        } else {
            (0..count).rev().collect()
        };
        for i in order {
            let transform = copy_transform(i as f32 + offset);
            let opacity = if count > 1 {
                start_opacity + (end_opacity - start_opacity) * i as f32 / (count - 1) as f32
            } else {
                start_opacity
            };
            for geometry in &base {
                geometries.push(if transform == Affine::IDENTITY {
                    geometry.clone()
                } else {
                    geometry.transformed(transform)
                });
            }
            if !painted.is_empty() {
                nodes.push(RenderNode::Group(Group {
                    transform,
                    opacity,
                    blend_mode: BlendMode::Normal,
                    clip: None,
                    children: painted.clone(),
                }));
            }
        }
    }

    fn trim(&self, t: &data::TrimShape) -> TrimSpec {
        let frame = self.frame;
        TrimSpec {
            modifier: TrimModifier {
                start: Animator::resolve(&t.s, frame, |v| *v / 100.0, 0.0),
                end: Animator::resolve(&t.e, frame, |v| *v / 100.0, 1.0),
                offset: Animator::resolve(&t.o, frame, |v| *v / 360.0, 0.0),
            },
            sequential: t.m == 2,
        }
    }

    fn gradient(
        &self,
        kind: u8,
        start: &data::Property<data::Vec2>,
        end: &data::Property<data::Vec2>,
        colors: &data::GradientColors,
    ) -> Gradient {
        let frame = self.frame;
        let raw = Animator::resolve(&colors.k, frame, |v| v.clone(), Vec::new());
        Gradient {
            kind: if kind == 1 {
                GradientKind::Linear
            } else {
                GradientKind::Radial
            },
            stops: parse_gradient_stops(&raw, colors.p as usize),
            start: Animator::resolve(start, frame, |v| Vec2::from_slice(v), Vec2::ZERO),
            end: Animator::resolve(end, frame, |v| Vec2::from_slice(v), Vec2::ZERO),
        }
    }

    /// Odd dash arrays are repeated once; the offset is normalised into
    /// `[0, total)`.
    pub(crate) fn dash(&self, props: &[data::DashProperty]) -> Option<DashPattern> {
        if props.is_empty() {
            return None;
        }
        let mut array = Vec::new();
        let mut offset = 0.0;
        for prop in props {
            let value = Animator::resolve(&prop.v, self.frame, |v| *v, 0.0);
            match prop.n.as_deref() {
                Some("o") => offset = value,
                Some("d") | Some("v") | Some("g") => array.push(value),
                _ => {}
            }
        }
        if array.is_empty() {
            return None;
        }
        if array.len() % 2 != 0 {
            array.extend_from_within(..);
        }
        let total: f32 = array.iter().sum();
        offset = if total > 0.0 {
            offset.rem_euclid(total)
        } else {
            0.0
        };
        Some(DashPattern { array, offset })
    }
}

/// Per-copy scale raised to a possibly fractional copy index.
fn repeat_scale(s: f32, k: f32) -> f32 {
    if k.fract() == 0.0 {
        s.powi(k as i32)
    } else {
        s.signum() * s.abs().powf(k)
    }
}

fn percent(prop: &data::Property<f32>, frame: f32) -> f32 {
    Animator::resolve(prop, frame, |v| *v / 100.0, 1.0).clamp(0.0, 1.0)
}

fn color(v: &[f32]) -> Vec4 {
    match v {
        [r, g, b, a, ..] => Vec4::new(*r, *g, *b, *a),
        [r, g, b] => Vec4::new(*r, *g, *b, 1.0),
        _ => Vec4::ONE,
    }
}

fn fill_rule(r: Option<u8>) -> FillRule {
    match r {
        Some(2) => FillRule::EvenOdd,
        _ => FillRule::NonZero,
    }
}

fn line_cap(lc: u8) -> LineCap {
    match lc {
        1 => LineCap::Butt,
        3 => LineCap::Square,
        _ => LineCap::Round,
    }
}

fn line_join(lj: u8) -> LineJoin {
    match lj {
        1 => LineJoin::Miter,
        3 => LineJoin::Bevel,
        _ => LineJoin::Round,
    }
}

/// Converts a Lottie vertex list (tangents relative to their vertex) into a
/// kurbo path.
pub(crate) fn bezier_to_path(path_data: &data::BezierPath) -> BezPath {
    let mut bp = BezPath::new();
    let Some(start) = path_data.v.first() else {
        return bp;
    };
    let point = |p: [f32; 2]| Point::new(p[0] as f64, p[1] as f64);
    let offset = |p: [f32; 2], d: [f32; 2]| Point::new((p[0] + d[0]) as f64, (p[1] + d[1]) as f64);

    bp.move_to(point(*start));
    let count = path_data.v.len();
    for i in 0..count {
        let next = (i + 1) % count;
        if next == 0 && !path_data.c {
            break;
        }
        let p0 = path_data.v[i];
        let p1 = path_data.v[next];
        let out_tangent = path_data.o.get(i).copied().unwrap_or([0.0, 0.0]);
        let in_tangent = path_data.i.get(next).copied().unwrap_or([0.0, 0.0]);
        bp.curve_to(offset(p0, out_tangent), offset(p1, in_tangent), point(p1));
    }
    if path_data.c {
        bp.close_path();
    }
    bp
}

fn polystar_path(params: &PolystarParams) -> BezPath {
    let mut path = BezPath::new();
    let num_points = params.points.round();
    if num_points < 3.0 {
        return path;
    }

    let is_star = params.kind == 1;
    let total_points = if is_star { num_points * 2.0 } else { num_points } as usize;
    let start_angle = ((params.rotation - 90.0) as f64).to_radians();
    let angle_step = 2.0 * PI / total_points as f64;

    let vertex = |i: usize| -> (Point, f64, f32) {
        let (r, roundness) = if is_star && i % 2 == 1 {
            (params.inner_radius, params.inner_roundness)
        } else {
            (params.outer_radius, params.outer_roundness)
        };
        let angle = start_angle + angle_step * i as f64;
        let p = Point::new(
            params.pos.x as f64 + r as f64 * angle.cos(),
            params.pos.y as f64 + r as f64 * angle.sin(),
        );
        (p, angle, r * roundness)
    };

    let has_roundness = params.outer_roundness.abs() > 0.01
        || (is_star && params.inner_roundness.abs() > 0.01);

    if has_roundness {
        let elements: Vec<(Point, Point, Point)> = (0..total_points)
            .map(|i| {
                let (p, angle, weighted) = vertex(i);
                let tangent = kurbo::Vec2::new(-angle.sin(), angle.cos());
                let d = angle_step * weighted as f64 * 0.01;
                (p, p - tangent * d, p + tangent * d)
            })
            .collect();
        path.move_to(elements[0].0);
        for i in 0..total_points {
            let next = &elements[(i + 1) % total_points];
            path.curve_to(elements[i].2, next.1, next.0);
        }
        path.close_path();
        return path;
    }

    let vertices: Vec<Point> = (0..total_points).map(|i| vertex(i).0).collect();
    let radius = params.corner_radius as f64;
    if radius <= 0.1 {
        path.move_to(vertices[0]);
        for v in &vertices[1..] {
            path.line_to(*v);
        }
        path.close_path();
        return path;
    }

    let len = vertices.len();
    for i in 0..len {
        let prev = vertices[(i + len - 1) % len];
        let curr = vertices[i];
        let next = vertices[(i + 1) % len];
        let v1 = prev - curr;
        let v2 = next - curr;
        let len1 = v1.hypot();
        let len2 = v2.hypot();

        if len1 < 0.001 || len2 < 0.001 {
            if i == 0 {
                path.move_to(curr);
            } else {
                path.line_to(curr);
            }
            continue;
        }

        let u1 = v1 * (1.0 / len1);
        let u2 = v2 * (1.0 / len2);
        let angle = u1.dot(u2).clamp(-1.0, 1.0).acos();
        let dist = if angle.abs() < 0.001 {
            0.0
        } else {
            radius / (angle / 2.0).tan()
        };
        let d = dist.min(len1.min(len2) * 0.5);
        let p_start = curr + u1 * d;
        let p_end = curr + u2 * d;

        if i == 0 {
            path.move_to(p_start);
        } else {
            path.line_to(p_start);
        }
        path.quad_to(curr, p_end);
    }
    path.close_path();
    path
}

/// Lottie packs gradients as `[t, r, g, b] * color_count` followed by
/// optional `[t, a]` pairs. Color and alpha stops are merged on the union of
/// their offsets.
fn parse_gradient_stops(raw: &[f32], color_count: usize) -> Vec<GradientStop> {
    let color_len = (color_count * 4).min(raw.len());
    let color_stops: Vec<[f32; 4]> = raw[..color_len]
        .chunks_exact(4)
        .map(|c| [c[0], c[1], c[2], c[3]])
        .collect();
    let alpha_stops: Vec<[f32; 2]> = raw[color_len..]
        .chunks_exact(2)
        .map(|c| [c[0], c[1]])
        .collect();

    if alpha_stops.is_empty() {
        return color_stops
            .iter()
            .map(|c| GradientStop {
                offset: c[0],
                color: Vec4::new(c[1], c[2], c[3], 1.0),
            })
            .collect();
    }

    let mut offsets: Vec<f32> = color_stops
        .iter()
        .map(|c| c[0])
        .chain(alpha_stops.iter().map(|a| a[0]))
        .collect();
    offsets.sort_by(f32::total_cmp);
    offsets.dedup();

    offsets
        .into_iter()
        .map(|t| {
            let rgb = sample_stops(&color_stops, t, |c| Vec4::new(c[1], c[2], c[3], 0.0), Vec4::ONE);
            let alpha = sample_stops(&alpha_stops, t, |a| Vec4::splat(a[1]), Vec4::ONE).x;
            GradientStop {
                offset: t,
                color: Vec4::new(rgb.x, rgb.y, rgb.z, alpha),
            }
        })
        .collect()
}

fn sample_stops<const N: usize>(
    stops: &[[f32; N]],
    t: f32,
    value: impl Fn(&[f32; N]) -> Vec4,
    fallback: Vec4,
) -> Vec4 {
    let (Some(first), Some(last)) = (stops.first(), stops.last()) else {
        return fallback;
    };
    if t <= first[0] {
        return value(first);
    }
    if t >= last[0] {
        return value(last);
    }
    for pair in stops.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        if t >= a[0] && t <= b[0] {
            let range = b[0] - a[0];
            let ratio = if range == 0.0 { 0.0 } else { (t - a[0]) / range };
            return value(a).lerp(value(b), ratio);
        }
    }
    fallback
}
