// THEORY:
// The `candidate` module is the feature-extraction layer. It reduces each contour
// to the two things the robot actually consumes: an axis-aligned bounding box and
// a horizontal centroid.
//
// Key architectural principles:
// 1.  **Pure Reduction**: `extract` is a pure function. The same contour always
//     yields a bit-identical `Candidate`.
// 2.  **Integer Centroid**: `centroid_x = x + width / 2` with truncating integer
//     division. The control loop on the robot was tuned against exactly this value.
// 3.  **Order Is Policy**: A `DetectionResult` keeps the detector's enumeration
//     order untouched. Nothing here sorts by size or position, because that order
//     is the tie-break the selector relies on.

use crate::core_modules::contour::Contour;
use serde::{Deserialize, Serialize};

/// Errors raised while reducing a contour.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("degenerate contour: no points to bound")]
    DegenerateContour,
}

/// Minimal axis-aligned box around a contour, in pixel units.
/// `width` and `height` count pixels, so a single point has a 1x1 box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl BoundingBox {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Width over height. Zero-height boxes cannot come out of `extract`.
    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

/// A contour reduced to its bounding box and horizontal centroid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Candidate {
    pub bounding_box: BoundingBox,
    pub centroid_x: i32,
}

impl Candidate {
    pub fn from_box(bounding_box: BoundingBox) -> Self {
        Self {
            centroid_x: bounding_box.x + bounding_box.width / 2,
            bounding_box,
        }
    }
}

/// Computes the bounding box and centroid of a contour.
pub fn extract(contour: &Contour) -> Result<Candidate, ExtractError> {
    let first = contour.points.first().ok_or(ExtractError::DegenerateContour)?;

    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for point in &contour.points[1..] {
        min_x = min_x.min(point.x);
        min_y = min_y.min(point.y);
        max_x = max_x.max(point.x);
        max_y = max_y.max(point.y);
    }

    Ok(Candidate::from_box(BoundingBox::new(
        min_x,
        min_y,
        max_x - min_x + 1,
        max_y - min_y + 1,
    )))
}

/// The ordered candidates for one target category in one cycle.
///
/// One entry per detected contour, in detector order. Detector order is the
/// row-major order in which border following first meets each region (top to
/// bottom, then left to right), not OpenCV's `findContours` order. A contour that failed
/// extraction stays in the sequence as an absent entry so later positions keep
/// their index.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DetectionResult {
    entries: Vec<Option<Candidate>>,
}

impl DetectionResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_candidates(candidates: impl IntoIterator<Item = Candidate>) -> Self {
        Self {
            entries: candidates.into_iter().map(Some).collect(),
        }
    }

    /// Builds a result from already-extracted positions; `None` marks a degenerate one.
    pub fn from_entries(entries: Vec<Option<Candidate>>) -> Self {
        Self { entries }
    }

    /// Extracts every contour, absorbing degenerate ones as absent entries.
    pub fn from_contours(contours: &[Contour]) -> Self {
        let entries = contours
            .iter()
            .enumerate()
            .map(|(index, contour)| match extract(contour) {
                Ok(candidate) => Some(candidate),
                Err(err) => {
                    tracing::debug!(index, "skipping contour: {err}");
                    None
                }
            })
            .collect();
        Self { entries }
    }

    /// Number of positions, including degenerate ones.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The candidate at `index`, if that position exists and was extractable.
    pub fn get(&self, index: usize) -> Option<&Candidate> {
        self.entries.get(index).and_then(Option::as_ref)
    }

    /// Extractable candidates with their positional index, in order.
    pub fn indexed(&self) -> impl Iterator<Item = (usize, &Candidate)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| entry.as_ref().map(|candidate| (index, candidate)))
    }

    pub fn candidates(&self) -> impl Iterator<Item = &Candidate> {
        self.entries.iter().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::contour::Point;

    fn rectangle(x: i32, y: i32, width: i32, height: i32) -> Contour {
        Contour::new(vec![
            Point::new(x, y),
            Point::new(x + width - 1, y),
            Point::new(x + width - 1, y + height - 1),
            Point::new(x, y + height - 1),
        ])
    }

    #[test]
    fn bounding_box_counts_pixels() {
        let candidate = extract(&rectangle(10, 10, 20, 30)).unwrap();
        assert_eq!(candidate.bounding_box, BoundingBox::new(10, 10, 20, 30));
        assert_eq!(candidate.centroid_x, 20);
    }

    #[test]
    fn centroid_truncates() {
        let candidate = Candidate::from_box(BoundingBox::new(100, 0, 11, 10));
        assert_eq!(candidate.centroid_x, 105);
        let candidate = Candidate::from_box(BoundingBox::new(0, 0, 1, 1));
        assert_eq!(candidate.centroid_x, 0);
    }

    #[test]
    fn single_point_is_a_one_pixel_box() {
        let contour = Contour::new(vec![Point::new(7, 3)]);
        let candidate = extract(&contour).unwrap();
        assert_eq!(candidate.bounding_box, BoundingBox::new(7, 3, 1, 1));
    }

    #[test]
    fn empty_contour_is_degenerate() {
        assert_eq!(
            extract(&Contour::default()),
            Err(ExtractError::DegenerateContour)
        );
    }

    #[test]
    fn extraction_is_repeatable() {
        let contour = Contour::new(vec![
            Point::new(3, 9),
            Point::new(12, 4),
            Point::new(20, 17),
            Point::new(6, 22),
        ]);
        assert_eq!(extract(&contour), extract(&contour));
    }

    #[test]
    fn degenerate_entries_keep_later_positions() {
        let result = DetectionResult::from_contours(&[
            rectangle(0, 0, 4, 4),
            Contour::default(),
            rectangle(50, 0, 10, 10),
        ]);
        assert_eq!(result.len(), 3);
        assert!(result.get(1).is_none());
        let indices: Vec<usize> = result.indexed().map(|(index, _)| index).collect();
        assert_eq!(indices, vec![0, 2]);
        assert_eq!(result.candidates().count(), 2);
    }
}
