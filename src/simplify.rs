//! Polyline simplification
//!
//! Douglas-Peucker reduction of an ordered 2D point list:
//! - Iterative split over an explicit range stack, so the depth of the
//!   divide never touches the call stack
//! - Strict tolerance comparison, a point exactly on the chord is dropped
//! - Optional forced points which are always retained

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// A point of the polyline together with the sample index it came from
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DpPoint {
    pub x: f64,
    pub y: f64,
    pub index: usize,
}

impl DpPoint {
    pub fn new(x: f64, y: f64, index: usize) -> Self {
        Self { x, y, index }
    }
}

/// Douglas-Peucker simplifier for a fixed tolerance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DouglasPeucker {
    tolerance: f64,
}

impl DouglasPeucker {
    /// Negative or NaN tolerances behave like 0
    pub fn new(tolerance: f64) -> Self {
        let tolerance = if tolerance.is_nan() {
            0.0
        } else {
            tolerance.max(0.0)
        };
        Self { tolerance }
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Simplify `points`, keeping the first and the last point
    pub fn simplify(&self, points: &[DpPoint]) -> Vec<DpPoint> {
        self.simplify_with_forced(points, &BTreeSet::new())
    }

    /// Simplify `points` while retaining every point whose `index` is in `forced`.
    ///
    /// The polyline is split at the forced points and each piece is reduced
    /// on its own.
    pub fn simplify_with_forced(
        &self,
        points: &[DpPoint],
        forced: &BTreeSet<usize>,
    ) -> Vec<DpPoint> {
        if points.len() <= 2 {
            return points.to_vec();
        }

        let last = points.len() - 1;
        let mut keep = vec![false; points.len()];
        keep[0] = true;
        keep[last] = true;

        let mut anchors = vec![0];
        for (position, point) in points.iter().enumerate().take(last).skip(1) {
            if forced.contains(&point.index) {
                keep[position] = true;
                anchors.push(position);
            }
        }
        anchors.push(last);

        let mut stack: Vec<(usize, usize)> = anchors.windows(2).map(|w| (w[0], w[1])).collect();

        while let Some((start, end)) = stack.pop() {
            if end <= start + 1 {
                continue;
            }

            let (farthest, max_distance) = (start + 1..end)
                .map(|i| {
                    let distance = perpendicular_distance(&points[i], &points[start], &points[end]);
                    (i, distance)
                })
                .fold((start, 0.0_f64), |best, candidate| {
                    if candidate.1 > best.1 {
                        candidate
                    } else {
                        best
                    }
                });

            if max_distance > self.tolerance {
                keep[farthest] = true;
                stack.push((start, farthest));
                stack.push((farthest, end));
            }
        }

        let simplified: Vec<DpPoint> = points
            .iter()
            .zip(keep)
            .filter_map(|(point, kept)| kept.then_some(*point))
            .collect();

        debug!(
            input = points.len(),
            output = simplified.len(),
            tolerance = self.tolerance,
            "douglas-peucker simplification"
        );

        simplified
    }
}

/// Distance from `point` to the line through `start` and `end`.
///
/// A degenerate chord falls back to the euclidean distance to `start`.
pub(crate) fn perpendicular_distance(point: &DpPoint, start: &DpPoint, end: &DpPoint) -> f64 {
    let dx = end.x - start.x;
    let dy = end.y - start.y;
    let chord = dx.hypot(dy);

    if chord == 0.0 {
        return (point.x - start.x).hypot(point.y - start.y);
    }

    (dy * point.x - dx * point.y + end.x * start.y - end.y * start.x).abs() / chord
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn polyline(coords: &[(f64, f64)]) -> Vec<DpPoint> {
        coords
            .iter()
            .enumerate()
            .map(|(index, &(x, y))| DpPoint::new(x, y, index))
            .collect()
    }

    fn indices(points: &[DpPoint]) -> Vec<usize> {
        points.iter().map(|p| p.index).collect()
    }

    #[test]
    fn test_short_input_unchanged() {
        let dp = DouglasPeucker::new(100.0);
        assert!(dp.simplify(&[]).is_empty());

        let two = polyline(&[(0.0, 0.0), (10.0, 50.0)]);
        assert_eq!(dp.simplify(&two), two);
    }

    #[test]
    fn test_removes_points_within_tolerance() {
        let points = polyline(&[(0.0, 0.0), (1.0, 0.1), (2.0, -0.1), (3.0, 5.0), (4.0, 6.0)]);
        let result = DouglasPeucker::new(1.0).simplify(&points);

        assert_eq!(indices(&result), vec![0, 2, 4]);

        let result = DouglasPeucker::new(0.5).simplify(&points);
        assert_eq!(indices(&result), vec![0, 2, 3, 4]);
    }

    #[test]
    fn test_zero_tolerance_drops_only_collinear_points() {
        let points = polyline(&[(0.0, 0.0), (1.0, 1.0), (2.0, 2.0), (3.0, 0.0), (4.0, 1.0)]);
        let result = DouglasPeucker::new(0.0).simplify(&points);

        assert_eq!(indices(&result), vec![0, 2, 3, 4]);
    }

    #[test]
    fn test_zero_tolerance_keeps_zigzag() {
        let points = polyline(&[(0.0, 0.0), (1.0, 3.0), (2.0, 0.0), (3.0, 3.0), (4.0, 0.0)]);
        let result = DouglasPeucker::new(0.0).simplify(&points);

        assert_eq!(result, points);
    }

    #[test]
    fn test_forced_points_are_kept() {
        let points = polyline(&[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0), (3.0, 0.0), (4.0, 0.0)]);
        let forced = BTreeSet::from([2]);
        let result = DouglasPeucker::new(10.0).simplify_with_forced(&points, &forced);

        assert_eq!(indices(&result), vec![0, 2, 4]);
    }

    #[test]
    fn test_degenerate_chord_uses_point_distance() {
        let start = DpPoint::new(1.0, 1.0, 0);
        let point = DpPoint::new(4.0, 5.0, 1);

        assert_eq!(perpendicular_distance(&point, &start, &start), 5.0);
    }

    #[test]
    fn test_long_input_does_not_overflow() {
        let points: Vec<DpPoint> = (0..100_000)
            .map(|i| {
                let x = i as f64;
                DpPoint::new(x, (x * 0.01).sin() * 100.0 + (i % 7) as f64, i)
            })
            .collect();

        let result = DouglasPeucker::new(0.5).simplify(&points);
        assert_eq!(result.first().map(|p| p.index), Some(0));
        assert_eq!(result.last().map(|p| p.index), Some(99_999));
    }

    proptest! {
        #[test]
        fn prop_excluded_points_within_tolerance(
            steps in prop::collection::vec((0.1f64..50.0, -100.0f64..100.0), 1..200),
            tolerance in 0.0f64..30.0,
        ) {
            let mut x = 0.0;
            let points: Vec<DpPoint> = steps
                .iter()
                .enumerate()
                .map(|(index, &(dx, y))| {
                    x += dx;
                    DpPoint::new(x, y, index)
                })
                .collect();

            let result = DouglasPeucker::new(tolerance).simplify(&points);

            prop_assert_eq!(result.first(), points.first());
            prop_assert_eq!(result.last(), points.last());

            for pair in result.windows(2) {
                let (start, end) = (pair[0].index, pair[1].index);
                prop_assert!(start < end);
                for point in &points[start + 1..end] {
                    let distance = perpendicular_distance(point, &points[start], &points[end]);
                    prop_assert!(distance <= tolerance);
                }
            }
        }
    }
}
