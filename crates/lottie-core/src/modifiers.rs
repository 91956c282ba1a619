use kurbo::{BezPath, ParamCurve, ParamCurveArclen, PathEl, PathSeg, Point};

const ACCURACY: f64 = 1e-3;

pub trait GeometryModifier {
    fn modify(&self, path: &mut BezPath);
}

// ================================================================================================
// Trim Paths
// ================================================================================================

/// Keeps the `[start, end]` fraction of a path's length, rotated by `offset`
/// turns. Values outside `[0, 1]` wrap around the path.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrimModifier {
    pub start: f32,
    pub end: f32,
    pub offset: f32,
}

impl TrimModifier {
    pub fn is_identity(&self) -> bool {
        let (lo, hi) = self.bounds();
        lo <= 0.0 && hi >= 1.0 && self.offset.fract() == 0.0
    }

    fn bounds(&self) -> (f64, f64) {
        let lo = self.start.min(self.end).clamp(0.0, 1.0) as f64;
        let hi = self.start.max(self.end).clamp(0.0, 1.0) as f64;
        (lo, hi)
    }

    /// Kept windows as fractions of the total length, after applying the
    /// offset. At most two windows when the kept span wraps past the end.
    fn windows(&self) -> Vec<(f64, f64)> {
        let (lo, hi) = self.bounds();
        if hi - lo >= 1.0 {
            return vec![(0.0, 1.0)];
        }
        if hi <= lo {
            return Vec::new();
        }
        let shift = self.offset as f64;
        let mut a = lo + shift;
        let mut b = hi + shift;
        let turns = a.floor();
        a -= turns;
        b -= turns;
        if b <= 1.0 {
            vec![(a, b)]
        } else {
            vec![(a, 1.0), (0.0, b - 1.0)]
        }
    }

    /// Trims several paths as if they were one continuous contour.
    pub fn apply_sequentially(&self, paths: &mut [BezPath]) {
        let lengths: Vec<f64> = paths.iter().map(path_length).collect();
        let total: f64 = lengths.iter().sum();
        if total <= 0.0 {
            return;
        }
        let windows: Vec<(f64, f64)> = self
            .windows()
            .into_iter()
            .map(|(a, b)| (a * total, b * total))
            .collect();

        let mut cursor = 0.0;
        for (path, len) in paths.iter_mut().zip(lengths) {
            let local: Vec<(f64, f64)> = windows
                .iter()
                .map(|&(a, b)| ((a - cursor).max(0.0), (b - cursor).min(len)))
                .filter(|(a, b)| b > a)
                .collect();
            *path = extract(path, &local);
            cursor += len;
        }
    }
}

impl GeometryModifier for TrimModifier {
    fn modify(&self, path: &mut BezPath) {
        if self.is_identity() {
            return;
        }
        let total = path_length(path);
        let windows: Vec<(f64, f64)> = self
            .windows()
            .into_iter()
            .map(|(a, b)| (a * total, b * total))
            .collect();
        *path = extract(path, &windows);
    }
}

pub fn path_length(path: &BezPath) -> f64 {
    path.segments().map(|seg| seg.arclen(ACCURACY)).sum()
}

fn segment_el(seg: PathSeg) -> PathEl {
    match seg {
        PathSeg::Line(l) => PathEl::LineTo(l.p1),
        PathSeg::Quad(q) => PathEl::QuadTo(q.p1, q.p2),
        PathSeg::Cubic(c) => PathEl::CurveTo(c.p1, c.p2, c.p3),
    }
}

/// Copies the parts of `path` lying within the given arc-length windows.
fn extract(path: &BezPath, windows: &[(f64, f64)]) -> BezPath {
    let segments: Vec<(PathSeg, f64)> = path
        .segments()
        .map(|seg| (seg, seg.arclen(ACCURACY)))
        .collect();

    let mut out = BezPath::new();
    for &(from, to) in windows {
        let mut cursor = 0.0;
        let mut pen: Option<Point> = None;
        for &(seg, len) in &segments {
            let seg_start = cursor;
            let seg_end = cursor + len;
            cursor = seg_end;
            if len <= 0.0 || seg_end <= from || seg_start >= to {
                continue;
            }

            let t0 = if from > seg_start {
                seg.inv_arclen(from - seg_start, ACCURACY)
            } else {
                0.0
            };
            let t1 = if to < seg_end {
                seg.inv_arclen(to - seg_start, ACCURACY)
            } else {
                1.0
            };
            let piece = seg.subsegment(t0..t1);

            let start = piece.start();
            if pen.map_or(true, |p| p.distance(start) > 1e-6) {
                out.move_to(start);
            }
            out.push(segment_el(piece));
            pen = Some(piece.end());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::{Rect, Shape};

    fn line(len: f64) -> BezPath {
        let mut p = BezPath::new();
        p.move_to((0.0, 0.0));
        p.line_to((len, 0.0));
        p
    }

    #[test]
    fn test_trim_half_line() {
        let mut path = line(100.0);
        TrimModifier { start: 0.0, end: 0.5, offset: 0.0 }.modify(&mut path);
        assert!((path_length(&path) - 50.0).abs() < 1e-3);
        let bounds = path.bounding_box();
        assert!((bounds.x1 - 50.0).abs() < 1e-3);
    }

    #[test]
    fn test_trim_wraps_with_offset() {
        let mut path = line(100.0);
        // Keep 80..100 and 0..20.
        TrimModifier { start: 0.0, end: 0.4, offset: 0.8 }.modify(&mut path);
        assert!((path_length(&path) - 40.0).abs() < 1e-3);
        let move_count = path
            .elements()
            .iter()
            .filter(|el| matches!(el, PathEl::MoveTo(_)))
            .count();
        assert_eq!(move_count, 2);
    }

    #[test]
    fn test_trim_closed_rect_is_continuous() {
        let mut path = Rect::new(0.0, 0.0, 10.0, 10.0).to_path(0.1);
        TrimModifier { start: 0.1, end: 0.6, offset: 0.0 }.modify(&mut path);
        assert!((path_length(&path) - 20.0).abs() < 1e-2);
        let move_count = path
            .elements()
            .iter()
            .filter(|el| matches!(el, PathEl::MoveTo(_)))
            .count();
        assert_eq!(move_count, 1);
    }

    #[test]
    fn test_equal_start_end_removes_everything() {
        let mut path = line(10.0);
        TrimModifier { start: 0.3, end: 0.3, offset: 0.0 }.modify(&mut path);
        assert!(path.elements().is_empty());
    }

    #[test]
    fn test_sequential_trim_spans_paths() {
        let mut paths = vec![line(10.0), line(30.0)];
        TrimModifier { start: 0.0, end: 0.5, offset: 0.0 }.apply_sequentially(&mut paths);
        assert!((path_length(&paths[0]) - 10.0).abs() < 1e-3);
        assert!((path_length(&paths[1]) - 10.0).abs() < 1e-3);
    }
}
