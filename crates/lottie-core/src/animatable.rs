use glam::{Vec2, Vec3, Vec4};
use lottie_data::model::{BezierHandle, BezierPath, Keyframe, Property, Value};

pub trait Interpolatable: Sized + Clone {
    fn lerp(&self, other: &Self, t: f32) -> Self;

    fn lerp_spatial(
        &self,
        other: &Self,
        t: f32,
        _tan_in: Option<&Vec<f32>>,
        _tan_out: Option<&Vec<f32>>,
    ) -> Self {
        self.lerp(other, t)
    }
}

impl Interpolatable for BezierPath {
    // Vertex-wise when both shapes share topology, otherwise a step.
    fn lerp(&self, other: &Self, t: f32) -> Self {
        let compatible = self.v.len() == other.v.len()
            && self.i.len() == other.i.len()
            && self.o.len() == other.o.len();
        if !compatible {
            return if t < 1.0 { self.clone() } else { other.clone() };
        }

        let mix = |a: &[[f32; 2]], b: &[[f32; 2]]| -> Vec<[f32; 2]> {
            a.iter()
                .zip(b)
                .map(|(p, q)| [p[0] + (q[0] - p[0]) * t, p[1] + (q[1] - p[1]) * t])
                .collect()
        };

        BezierPath {
            c: self.c,
            i: mix(&self.i, &other.i),
            o: mix(&self.o, &other.o),
            v: mix(&self.v, &other.v),
        }
    }
}

impl Interpolatable for f32 {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        self + (other - self) * t
    }
}

fn tangent2(values: Option<&Vec<f32>>) -> Vec2 {
    match values {
        Some(v) if v.len() >= 2 => Vec2::new(v[0], v[1]),
        _ => Vec2::ZERO,
    }
}

fn tangent3(values: Option<&Vec<f32>>) -> Vec3 {
    match values {
        Some(v) if v.len() >= 3 => Vec3::new(v[0], v[1], v[2]),
        Some(v) if v.len() == 2 => Vec3::new(v[0], v[1], 0.0),
        _ => Vec3::ZERO,
    }
}

fn cubic_point<T>(p0: T, p1: T, p2: T, p3: T, t: f32) -> T
where
    T: std::ops::Mul<f32, Output = T> + std::ops::Add<Output = T>,
{
    let one_minus_t = 1.0 - t;
    let one_minus_t_sq = one_minus_t * one_minus_t;
    let t_sq = t * t;

    p0 * (one_minus_t_sq * one_minus_t)
        + p1 * (3.0 * one_minus_t_sq * t)
        + p2 * (3.0 * one_minus_t * t_sq)
        + p3 * (t_sq * t)
}

impl Interpolatable for Vec2 {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        Vec2::lerp(*self, *other, t)
    }

    fn lerp_spatial(
        &self,
        other: &Self,
        t: f32,
        tan_in: Option<&Vec<f32>>,
        tan_out: Option<&Vec<f32>>,
    ) -> Self {
        let (out, inn) = (tangent2(tan_out), tangent2(tan_in));
        if out == Vec2::ZERO && inn == Vec2::ZERO {
            return self.lerp(other, t);
        }
        cubic_point(*self, *self + out, *other + inn, *other, t)
    }
}

impl Interpolatable for Vec3 {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        Vec3::lerp(*self, *other, t)
    }

    fn lerp_spatial(
        &self,
        other: &Self,
        t: f32,
        tan_in: Option<&Vec<f32>>,
        tan_out: Option<&Vec<f32>>,
    ) -> Self {
        let (out, inn) = (tangent3(tan_out), tangent3(tan_in));
        if out == Vec3::ZERO && inn == Vec3::ZERO {
            return self.lerp(other, t);
        }
        cubic_point(*self, *self + out, *other + inn, *other, t)
    }
}

impl Interpolatable for Vec4 {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        Vec4::lerp(*self, *other, t)
    }
}

// For gradient colors (Vec<f32>)
impl Interpolatable for Vec<f32> {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        self.iter()
            .zip(other.iter())
            .map(|(a, b)| a + (b - a) * t)
            .collect()
    }
}

// Cubic Bezier Easing
pub fn solve_cubic_bezier(p1: Vec2, p2: Vec2, x: f32) -> f32 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }

    // Newton-Raphson
    let mut t = x;
    for _ in 0..8 {
        let one_minus_t = 1.0 - t;
        let x_est = 3.0 * one_minus_t * one_minus_t * t * p1.x
            + 3.0 * one_minus_t * t * t * p2.x
            + t * t * t;

        let err = x_est - x;
        if err.abs() < 1e-4 {
            break;
        }

        let dx_dt = 3.0 * one_minus_t * one_minus_t * p1.x
            + 6.0 * one_minus_t * t * (p2.x - p1.x)
            + 3.0 * t * t * (1.0 - p2.x);

        if dx_dt.abs() < 1e-6 {
            break;
        }
        t = (t - err / dx_dt).clamp(0.0, 1.0);
    }

    let one_minus_t = 1.0 - t;
    3.0 * one_minus_t * one_minus_t * t * p1.y + 3.0 * one_minus_t * t * t * p2.y + t * t * t
}

fn handle(h: Option<BezierHandle>, fallback: Vec2) -> Vec2 {
    h.map(|h| Vec2::new(h.x, h.y)).unwrap_or(fallback)
}

pub struct Animator;

impl Animator {
    /// Evaluates `prop` at `frame`.
    ///
    /// Before the first keyframe the first value holds, after the last the
    /// last value holds. Between keyframes the segment's easing curve (linear
    /// when no handles are present) picks the progress, and hold keyframes
    /// keep their start value for the whole segment.
    pub fn resolve<T, U>(prop: &Property<T>, frame: f32, converter: impl Fn(&T) -> U, default: U) -> U
    where
        U: Interpolatable,
    {
        match &prop.k {
            Value::Default => default,
            Value::Static(v) => converter(v),
            Value::Animated(keyframes) => {
                Self::resolve_keyframes(keyframes, frame, &converter, default)
            }
        }
    }

    fn resolve_keyframes<T, U>(
        keyframes: &[Keyframe<T>],
        frame: f32,
        converter: &impl Fn(&T) -> U,
        default: U,
    ) -> U
    where
        U: Interpolatable,
    {
        if keyframes.is_empty() {
            return default;
        }

        // First keyframe strictly after `frame`; the segment is [idx-1, idx].
        // With duplicate times this lands after the last duplicate.
        let idx = keyframes.partition_point(|kf| kf.t <= frame);

        if idx == 0 {
            return keyframes[0].s.as_ref().map(converter).unwrap_or(default);
        }

        let len = keyframes.len();
        if idx >= len {
            let last = &keyframes[len - 1];
            if let Some(s) = &last.s {
                return converter(s);
            }
            // Legacy exports end on a keyframe without `s`; its value is the
            // previous segment's `e`.
            if let Some(e) = &last.e {
                return converter(e);
            }
            if len >= 2 {
                let prev = &keyframes[len - 2];
                if let Some(v) = prev.e.as_ref().or(prev.s.as_ref()) {
                    return converter(v);
                }
            }
            return default;
        }

        let kf_start = &keyframes[idx - 1];
        let kf_end = &keyframes[idx];

        let start_val = kf_start
            .s
            .as_ref()
            .map(converter)
            .unwrap_or_else(|| default.clone());

        if kf_start.h == Some(1) {
            return start_val;
        }

        let end_val = kf_start
            .e
            .as_ref()
            .or(kf_end.s.as_ref())
            .map(converter)
            .unwrap_or_else(|| start_val.clone());

        let duration = kf_end.t - kf_start.t;
        if duration <= 0.0 {
            return start_val;
        }

        let linear_t = (frame - kf_start.t) / duration;
        let p1 = handle(kf_start.o, Vec2::ZERO);
        let p2 = handle(kf_start.i.or(kf_end.i), Vec2::ONE);
        let eased_t = solve_cubic_bezier(p1, p2, linear_t);

        let tan_in = kf_start.ti.as_ref().or(kf_end.ti.as_ref());
        start_val.lerp_spatial(&end_val, eased_t, tan_in, kf_start.to.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lottie_data::model::{Keyframe, Value};

    fn key(t: f32, s: f32, e: Option<f32>) -> Keyframe<f32> {
        Keyframe {
            t,
            s: Some(s),
            e,
            i: None,
            o: None,
            to: None,
            ti: None,
            h: None,
        }
    }

    fn animated(keyframes: Vec<Keyframe<f32>>) -> Property<f32> {
        Property {
            a: 1,
            k: Value::Animated(keyframes),
            ix: None,
        }
    }

    #[test]
    fn test_animator_resolve_binary_search() {
        let prop = animated(vec![
            key(0.0, 0.0, Some(10.0)),
            key(10.0, 10.0, Some(20.0)),
            key(20.0, 20.0, Some(30.0)),
        ]);
        let conv = |v: &f32| *v;

        assert_eq!(Animator::resolve(&prop, 0.0, conv, -1.0), 0.0);
        assert_eq!(Animator::resolve(&prop, 10.0, conv, -1.0), 10.0);
        assert_eq!(Animator::resolve(&prop, -5.0, conv, -1.0), 0.0);
        assert_eq!(Animator::resolve(&prop, 5.0, conv, -1.0), 5.0);
        assert_eq!(Animator::resolve(&prop, 15.0, conv, -1.0), 15.0);
        // Past the last keyframe its own value holds.
        assert_eq!(Animator::resolve(&prop, 25.0, conv, -1.0), 20.0);
    }

    #[test]
    fn test_linear_midpoint() {
        let prop = animated(vec![key(0.0, 0.0, None), key(10.0, 1.0, None)]);
        let v = Animator::resolve(&prop, 5.0, |v| *v, -1.0);
        assert!((v - 0.5).abs() < 1e-6, "got {}", v);
    }

    #[test]
    fn test_single_sample_is_constant() {
        let prop = animated(vec![key(12.0, 7.5, None)]);
        for frame in [-100.0, 0.0, 12.0, 13.5, 1e6] {
            assert_eq!(Animator::resolve(&prop, frame, |v| *v, 0.0), 7.5);
        }
    }

    #[test]
    fn test_hold_keyframe_does_not_interpolate() {
        let mut first = key(0.0, 2.0, None);
        first.h = Some(1);
        let prop = animated(vec![first, key(10.0, 8.0, None)]);
        assert_eq!(Animator::resolve(&prop, 9.9, |v| *v, 0.0), 2.0);
        assert_eq!(Animator::resolve(&prop, 10.0, |v| *v, 0.0), 8.0);
    }

    #[test]
    fn test_duplicate_times_use_last_declared() {
        let prop = animated(vec![
            key(0.0, 0.0, None),
            key(5.0, 1.0, None),
            key(5.0, 3.0, None),
            key(10.0, 3.0, None),
        ]);
        assert_eq!(Animator::resolve(&prop, 5.0, |v| *v, 0.0), 3.0);
    }

    #[test]
    fn test_ease_in_out_is_symmetric() {
        let mut first = key(0.0, 0.0, None);
        first.o = Some(BezierHandle { x: 0.42, y: 0.0 });
        first.i = Some(BezierHandle { x: 0.58, y: 1.0 });
        let prop = animated(vec![first, key(10.0, 1.0, None)]);

        let mid = Animator::resolve(&prop, 5.0, |v| *v, 0.0);
        assert!((mid - 0.5).abs() < 1e-3, "got {}", mid);
        let early = Animator::resolve(&prop, 2.0, |v| *v, 0.0);
        assert!(early < 0.2, "ease-in should start slow, got {}", early);
    }

    #[test]
    fn test_bezier_path_morph() {
        let a = BezierPath {
            c: true,
            i: vec![[0.0, 0.0]; 2],
            o: vec![[0.0, 0.0]; 2],
            v: vec![[0.0, 0.0], [10.0, 0.0]],
        };
        let b = BezierPath {
            v: vec![[0.0, 10.0], [20.0, 10.0]],
            ..a.clone()
        };
        let mid = a.lerp(&b, 0.5);
        assert_eq!(mid.v, vec![[0.0, 5.0], [15.0, 5.0]]);
    }
}
