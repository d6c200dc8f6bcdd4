// Growing point series with stride decimation
//
// A `PointCollection` stores one physical point per bucket of `stride`
// logical points. Each physical point holds the newest logical point of its
// bucket, so a partially filled tail bucket always shows the latest value.
// The envelope (min/max) is tracked over every logical point, independent of
// the decimation level.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ZERO: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Reduced-precision form handed to the renderer
    pub fn to_render(&self) -> RenderPoint {
        RenderPoint {
            x: self.x as f32,
            y: self.y as f32,
        }
    }
}

/// Single-precision point, laid out for direct upload to a vertex buffer
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RenderPoint {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointCollection {
    points: Vec<Point>,
    stride: usize,
    /// Logical points held by the last physical point (1..=stride when non-empty)
    tail_fill: usize,
    represented_point_count: usize,
    envelope: Option<(Point, Point)>,
    log_x: bool,
    log_y: bool,
}

impl PointCollection {
    pub fn new(log_x: bool, log_y: bool) -> Self {
        Self {
            points: Vec::new(),
            stride: 1,
            tail_fill: 0,
            represented_point_count: 0,
            envelope: None,
            log_x,
            log_y,
        }
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn render_points(&self) -> Vec<RenderPoint> {
        self.points.iter().map(Point::to_render).collect()
    }

    /// The last `n` physical points in render form
    pub fn render_suffix(&self, n: usize) -> Vec<RenderPoint> {
        let start = self.points.len().saturating_sub(n);
        self.points[start..].iter().map(Point::to_render).collect()
    }

    /// Physical (stored) point count
    pub fn count(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Logical point count, before decimation
    pub fn represented_point_count(&self) -> usize {
        self.represented_point_count
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn min(&self) -> Point {
        self.envelope.map(|(min, _)| min).unwrap_or(Point::ZERO)
    }

    pub fn max(&self) -> Point {
        self.envelope.map(|(_, max)| max).unwrap_or(Point::ZERO)
    }

    pub fn min_x(&self) -> f64 {
        self.min().x
    }

    pub fn max_x(&self) -> f64 {
        self.max().x
    }

    pub fn min_y(&self) -> f64 {
        self.min().y
    }

    pub fn max_y(&self) -> f64 {
        self.max().y
    }

    pub fn log_x(&self) -> bool {
        self.log_x
    }

    pub fn log_y(&self) -> bool {
        self.log_y
    }

    fn transform(&self, x: f64, y: f64) -> Point {
        Point {
            x: if self.log_x { x.ln() } else { x },
            y: if self.log_y { y.ln() } else { y },
        }
    }

    fn widen(&mut self, p: Point) {
        // Non-finite values (log of non-positive input) never enter the envelope
        if !(p.x.is_finite() && p.y.is_finite()) {
            return;
        }
        self.envelope = Some(match self.envelope {
            None => (p, p),
            Some((min, max)) => (
                Point::new(min.x.min(p.x), min.y.min(p.y)),
                Point::new(max.x.max(p.x), max.y.max(p.y)),
            ),
        });
    }

    /// Append logical points in order.
    ///
    /// Returns `(replaced, added)`: the number of already stored physical
    /// points whose value changed (0 or 1, the old tail) and the number of
    /// new physical points.
    pub fn append<I>(&mut self, pairs: I) -> (usize, usize)
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        let initial_count = self.points.len();
        let mut replaced = 0;
        let mut added = 0;

        for (x, y) in pairs {
            let point = self.transform(x, y);
            self.widen(point);
            self.represented_point_count += 1;

            match self.points.last_mut() {
                Some(last) if self.tail_fill < self.stride => {
                    *last = point;
                    self.tail_fill += 1;
                    if self.points.len() == initial_count {
                        replaced = 1;
                    }
                }
                _ => {
                    self.points.push(point);
                    self.tail_fill = 1;
                    added += 1;
                }
            }
        }

        (replaced, added)
    }

    /// Multiply the stride by `factor`, merging every `factor` physical points
    /// into one. The logical count is unchanged.
    pub fn factor_stride(&mut self, factor: usize) {
        if factor <= 1 || self.points.is_empty() {
            if factor > 1 {
                self.stride *= factor;
            }
            return;
        }

        let old_stride = self.stride;
        let old_tail_fill = self.tail_fill;

        let merged: Vec<Point> = self
            .points
            .chunks(factor)
            .filter_map(|bucket| bucket.last().copied())
            .collect();

        let last_bucket_len = match self.points.len() % factor {
            0 => factor,
            rem => rem,
        };

        self.points = merged;
        self.stride = old_stride * factor;
        self.tail_fill = (last_bucket_len - 1) * old_stride + old_tail_fill;

        debug_assert_eq!(
            (self.points.len() - 1) * self.stride + self.tail_fill,
            self.represented_point_count
        );
    }

    /// Back to the empty state with stride 1 and a degenerate envelope
    pub fn remove_all(&mut self) {
        self.points.clear();
        self.stride = 1;
        self.tail_fill = 0;
        self.represented_point_count = 0;
        self.envelope = None;
    }
}

impl Default for PointCollection {
    fn default() -> Self {
        Self::new(false, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(range: std::ops::Range<usize>) -> impl Iterator<Item = (f64, f64)> {
        range.map(|i| (i as f64, i as f64))
    }

    #[test]
    fn test_append_without_decimation() {
        let mut points = PointCollection::default();
        let (replaced, added) = points.append(vec![(0.0, 0.0), (1.0, 1.0), (2.0, 2.0)]);

        assert_eq!((replaced, added), (0, 3));
        assert_eq!(points.represented_point_count(), 3);
        assert_eq!(points.count(), 3);
        assert_eq!(points.stride(), 1);
        assert_eq!(points.min(), Point::new(0.0, 0.0));
        assert_eq!(points.max(), Point::new(2.0, 2.0));
    }

    #[test]
    fn test_factor_stride_halves_count() {
        let mut points = PointCollection::default();
        points.append(line(0..3001));

        points.factor_stride(2);
        assert_eq!(points.count(), 1501);
        assert_eq!(points.represented_point_count(), 3001);
        assert_eq!(points.stride(), 2);

        let mut even = PointCollection::default();
        even.append(line(0..3000));
        even.factor_stride(2);
        assert_eq!(even.count(), 1500);
        assert_eq!(even.represented_point_count(), 3000);
    }

    #[test]
    fn test_buckets_keep_newest_point() {
        let mut points = PointCollection::default();
        points.append(line(0..10));
        points.factor_stride(2);

        let xs: Vec<f64> = points.points().iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![1.0, 3.0, 5.0, 7.0, 9.0]);

        // Tail bucket is full, so the next point starts a new one
        assert_eq!(points.append(line(10..11)), (0, 1));
        assert_eq!(points.points().last().unwrap().x, 10.0);

        // ...and the one after completes it in place
        assert_eq!(points.append(line(11..12)), (1, 0));
        assert_eq!(points.points().last().unwrap().x, 11.0);
        assert_eq!(points.count(), 6);
        assert_eq!(points.represented_point_count(), 12);
    }

    #[test]
    fn test_partial_tail_survives_restride() {
        let mut points = PointCollection::default();
        points.append(line(0..7));
        points.factor_stride(3); // buckets [0,1,2] [3,4,5] [6]
        assert_eq!(points.count(), 3);

        // Two more points fill the tail bucket, the third opens a new one
        let (replaced, added) = points.append(line(7..10));
        assert_eq!((replaced, added), (1, 1));
        let xs: Vec<f64> = points.points().iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![2.0, 5.0, 8.0, 9.0]);

        points.factor_stride(2); // stride 6: [2,5] [8,9]
        let xs: Vec<f64> = points.points().iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![5.0, 9.0]);
        assert_eq!(points.represented_point_count(), 10);
    }

    #[test]
    fn test_envelope_covers_decimated_points() {
        let mut points = PointCollection::default();
        points.append(vec![(0.0, -50.0), (1.0, 5.0), (2.0, 3.0), (3.0, 4.0)]);
        points.factor_stride(2);

        // -50 is no longer stored but still bounds the envelope
        assert!(points.points().iter().all(|p| p.y > 0.0));
        assert_eq!(points.min(), Point::new(0.0, -50.0));
        assert_eq!(points.max(), Point::new(3.0, 5.0));
    }

    #[test]
    fn test_log_axes() {
        let mut points = PointCollection::new(true, false);
        points.append(vec![(1.0, 2.0), (std::f64::consts::E, 3.0), (0.0, 4.0)]);

        assert_eq!(points.represented_point_count(), 3);
        assert_eq!(points.min().x, 0.0);
        assert!((points.max().x - 1.0).abs() < 1e-12);
        // ln(0) is stored but excluded from the envelope
        assert_eq!(points.points()[2].x, f64::NEG_INFINITY);
        assert_eq!(points.max().y, 3.0);
    }

    #[test]
    fn test_remove_all_matches_fresh_collection() {
        let mut reused = PointCollection::default();
        reused.append(line(0..5000));
        reused.factor_stride(3);
        reused.remove_all();
        assert_eq!(reused.min(), Point::ZERO);
        assert_eq!(reused.max(), Point::ZERO);

        let mut fresh = PointCollection::default();
        let a = reused.append(line(100..140));
        let b = fresh.append(line(100..140));
        assert_eq!(a, b);
        assert_eq!(reused, fresh);
    }

    #[test]
    fn test_render_suffix() {
        let mut points = PointCollection::default();
        points.append(vec![(0.0, 0.5), (1.0, 1.5), (2.0, 2.5)]);

        assert_eq!(
            points.render_suffix(2),
            vec![RenderPoint { x: 1.0, y: 1.5 }, RenderPoint { x: 2.0, y: 2.5 }]
        );
        assert_eq!(points.render_suffix(10).len(), 3);
    }
}
