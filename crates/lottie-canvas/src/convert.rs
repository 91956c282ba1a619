//! kurbo / core types to tiny-skia.

use glam::Vec4;
use kurbo::{Affine, BezPath, PathEl};
use lottie_core::{BlendMode, FillRule, LineCap, LineJoin};

pub fn sanitize(v: f32) -> f32 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

/// `None` for empty or degenerate paths, which tiny-skia refuses to build.
pub fn path(bez_path: &BezPath) -> Option<tiny_skia::Path> {
    let mut pb = tiny_skia::PathBuilder::new();
    let p = |v: f64| sanitize(v as f32);
    for el in bez_path.elements() {
        match *el {
            PathEl::MoveTo(a) => pb.move_to(p(a.x), p(a.y)),
            PathEl::LineTo(a) => pb.line_to(p(a.x), p(a.y)),
            PathEl::QuadTo(a, b) => pb.quad_to(p(a.x), p(a.y), p(b.x), p(b.y)),
            PathEl::CurveTo(a, b, c) => pb.cubic_to(p(a.x), p(a.y), p(b.x), p(b.y), p(c.x), p(c.y)),
            PathEl::ClosePath => pb.close(),
        }
    }
    pb.finish()
}

pub fn transform(affine: Affine) -> tiny_skia::Transform {
    let [a, b, c, d, e, f] = affine.as_coeffs().map(|v| sanitize(v as f32));
    tiny_skia::Transform::from_row(a, b, c, d, e, f)
}

/// Straight-alpha colour with `opacity` folded into alpha.
pub fn color(v: Vec4, opacity: f32) -> tiny_skia::Color {
    let c = |v: f32| sanitize(v).clamp(0.0, 1.0);
    tiny_skia::Color::from_rgba(c(v.x), c(v.y), c(v.z), c(v.w * opacity))
        .unwrap_or(tiny_skia::Color::TRANSPARENT)
}

pub fn fill_rule(rule: FillRule) -> tiny_skia::FillRule {
    match rule {
        FillRule::NonZero => tiny_skia::FillRule::Winding,
        FillRule::EvenOdd => tiny_skia::FillRule::EvenOdd,
    }
}

pub fn line_cap(cap: LineCap) -> tiny_skia::LineCap {
    match cap {
        LineCap::Butt => tiny_skia::LineCap::Butt,
        LineCap::Round => tiny_skia::LineCap::Round,
        LineCap::Square => tiny_skia::LineCap::Square,
    }
}

pub fn line_join(join: LineJoin) -> tiny_skia::LineJoin {
    match join {
        LineJoin::Miter => tiny_skia::LineJoin::Miter,
        LineJoin::Round => tiny_skia::LineJoin::Round,
        LineJoin::Bevel => tiny_skia::LineJoin::Bevel,
    }
}

pub fn blend_mode(mode: BlendMode) -> tiny_skia::BlendMode {
    match mode {
        BlendMode::Normal => tiny_skia::BlendMode::SourceOver,
        BlendMode::Multiply => tiny_skia::BlendMode::Multiply,
        BlendMode::Screen => tiny_skia::BlendMode::Screen,
        BlendMode::Overlay => tiny_skia::BlendMode::Overlay,
        BlendMode::Darken => tiny_skia::BlendMode::Darken,
        BlendMode::Lighten => tiny_skia::BlendMode::Lighten,
        BlendMode::ColorDodge => tiny_skia::BlendMode::ColorDodge,
        BlendMode::ColorBurn => tiny_skia::BlendMode::ColorBurn,
        BlendMode::HardLight => tiny_skia::BlendMode::HardLight,
        BlendMode::SoftLight => tiny_skia::BlendMode::SoftLight,
        BlendMode::Difference => tiny_skia::BlendMode::Difference,
        BlendMode::Exclusion => tiny_skia::BlendMode::Exclusion,
        BlendMode::Hue => tiny_skia::BlendMode::Hue,
        BlendMode::Saturation => tiny_skia::BlendMode::Saturation,
        BlendMode::Color => tiny_skia::BlendMode::Color,
        BlendMode::Luminosity => tiny_skia::BlendMode::Luminosity,
    }
}
