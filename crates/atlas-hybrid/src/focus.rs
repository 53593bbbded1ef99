use atlas_core::types::{Point, SearchResultItem};

const MIN_DISTANCE: f64 = 1e-6;
const WEIGHT_EPSILON: f64 = 1e-12;

/// Inverse-distance-weighted centroid of the items that have coordinates.
///
/// Unscored items weigh 1. Falls back to the plain mean when the weights
/// vanish, and is `None` when no item has finite coordinates.
pub fn focus_point(items: &[SearchResultItem]) -> Option<Point> {
    let points: Vec<(Point, f64)> = items
        .iter()
        .filter_map(|item| {
            let weight = match item.distance {
                Some(d) if d.is_finite() => 1.0 / d.max(MIN_DISTANCE),
                _ => 1.0,
            };
            item.point().map(|p| (p, weight))
        })
        .collect();
    if points.is_empty() { return None; }

    let total: f64 = points.iter().map(|(_, w)| w).sum();
    if total.is_finite() && total > WEIGHT_EPSILON {
        let x = points.iter().map(|(p, w)| p.x * w).sum::<f64>() / total;
        let y = points.iter().map(|(p, w)| p.y * w).sum::<f64>() / total;
        return Some(Point { x, y });
    }
    #[allow(clippy::cast_precision_loss)]
    let n = points.len() as f64;
    Some(Point { x: points.iter().map(|(p, _)| p.x).sum::<f64>() / n, y: points.iter().map(|(p, _)| p.y).sum::<f64>() / n })
}
