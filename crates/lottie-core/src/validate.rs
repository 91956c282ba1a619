//! Load-time checks on keyframe ordering.

use crate::error::{LoadResult, MalformedAnimation};
use lottie_data::model as data;

pub(crate) fn layer_label(layer: &data::Layer) -> String {
    match (&layer.nm, layer.ind) {
        (Some(name), Some(ind)) => format!("'{}' (#{})", name, ind),
        (Some(name), None) => format!("'{}'", name),
        (None, Some(ind)) => format!("#{}", ind),
        (None, None) => "<unnamed>".to_string(),
    }
}

/// Verifies that keyframe times never decrease in any property of `layer`.
pub(crate) fn check_layer_keyframes(layer: &data::Layer) -> LoadResult<()> {
    let check = KeyframeCheck {
        layer: layer_label(layer),
    };
    check.transform("ks", &layer.ks)?;
    if let Some(tm) = &layer.tm {
        check.property("tm", tm)?;
    }
    for mask in layer.masks_properties.iter().flatten() {
        check.property("mask.pt", &mask.pt)?;
        check.property("mask.o", &mask.o)?;
        check.property("mask.x", &mask.x)?;
    }
    if let Some(shapes) = &layer.shapes {
        check.shapes(shapes)?;
    }
    Ok(())
}

struct KeyframeCheck {
    layer: String,
}

impl KeyframeCheck {
    fn property<T>(&self, name: &str, prop: &data::Property<T>) -> LoadResult<()> {
        let mut previous: Option<f32> = None;
        for t in prop.keyframe_times() {
            let out_of_order = previous.is_some_and(|p| t < p);
            if !t.is_finite() || out_of_order {
                return Err(MalformedAnimation::KeyframeOrder {
                    layer: self.layer.clone(),
                    property: name.to_string(),
                    previous: previous.unwrap_or(t),
                    next: t,
                });
            }
            previous = Some(t);
        }
        Ok(())
    }

    fn position(&self, name: &str, p: &data::PositionProperty) -> LoadResult<()> {
        match p {
            data::PositionProperty::Unified(p) => self.property(name, p),
            data::PositionProperty::Split { x, y } => {
                self.property(name, x)?;
                self.property(name, y)
            }
        }
    }

    fn transform(&self, prefix: &str, t: &data::Transform) -> LoadResult<()> {
        self.property(&format!("{}.a", prefix), &t.a)?;
        self.position(&format!("{}.p", prefix), &t.p)?;
        self.property(&format!("{}.s", prefix), &t.s)?;
        self.property(&format!("{}.r", prefix), &t.rz)?;
        self.property(&format!("{}.o", prefix), &t.o)?;
        self.property(&format!("{}.sk", prefix), &t.sk)?;
        self.property(&format!("{}.sa", prefix), &t.sa)
    }

    fn dashes(&self, dashes: &[data::DashProperty]) -> LoadResult<()> {
        for d in dashes {
            self.property("stroke.d", &d.v)?;
        }
        Ok(())
    }

    fn shapes(&self, shapes: &[data::Shape]) -> LoadResult<()> {
        for shape in shapes {
            match shape {
                data::Shape::Group(g) => self.shapes(&g.it)?,
                data::Shape::Rect(r) => {
                    self.property("rect.s", &r.s)?;
                    self.property("rect.p", &r.p)?;
                    self.property("rect.r", &r.r)?;
                }
                data::Shape::Ellipse(e) => {
                    self.property("ellipse.s", &e.s)?;
                    self.property("ellipse.p", &e.p)?;
                }
                data::Shape::Fill(f) => {
                    self.property("fill.c", &f.c)?;
                    self.property("fill.o", &f.o)?;
                }
                data::Shape::Stroke(s) => {
                    self.property("stroke.c", &s.c)?;
                    self.property("stroke.w", &s.w)?;
                    self.property("stroke.o", &s.o)?;
                    self.dashes(&s.d)?;
                }
                data::Shape::GradientFill(g) => {
                    self.property("gradient.o", &g.o)?;
                    self.property("gradient.s", &g.s)?;
                    self.property("gradient.e", &g.e)?;
                    self.property("gradient.g", &g.g.k)?;
                }
                data::Shape::GradientStroke(g) => {
                    self.property("gradient.o", &g.o)?;
                    self.property("gradient.w", &g.w)?;
                    self.property("gradient.s", &g.s)?;
                    self.property("gradient.e", &g.e)?;
                    self.property("gradient.g", &g.g.k)?;
                    self.dashes(&g.d)?;
                }
                data::Shape::Transform(t) => self.transform("tr", &t.t)?,
                data::Shape::Path(p) => self.property("path.ks", &p.ks)?,
                data::Shape::Trim(t) => {
                    self.property("trim.s", &t.s)?;
                    self.property("trim.e", &t.e)?;
                    self.property("trim.o", &t.o)?;
                }
                data::Shape::Polystar(sr) => {
                    self.position("polystar.p", &sr.p)?;
                    self.property("polystar.or", &sr.or)?;
                    self.property("polystar.os", &sr.os)?;
                    self.property("polystar.r", &sr.r)?;
                    self.property("polystar.pt", &sr.pt)?;
                    if let Some(ir) = &sr.ir {
                        self.property("polystar.ir", ir)?;
                    }
                    if let Some(is) = &sr.is {
                        self.property("polystar.is", is)?;
                    }
                }
                data::Shape::RoundCorners(rd) => self.property("round.r", &rd.r)?,
                data::Shape::MergePaths(_) => {}
                data::Shape::Repeater(rp) => {
                    self.property("repeater.c", &rp.c)?;
                    self.property("repeater.o", &rp.o)?;
                    self.transform("repeater.tr", &rp.tr.t)?;
                    self.property("repeater.so", &rp.tr.so)?;
                    self.property("repeater.eo", &rp.tr.eo)?;
                }
                data::Shape::Unknown => {
                    tracing::warn!(layer = %self.layer, "unsupported shape item ignored")
                }
            }
        }
        Ok(())
    }
}
