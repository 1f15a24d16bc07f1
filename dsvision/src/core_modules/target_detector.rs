// THEORY:
// The `TargetDetector` is the engine of the detection layer. One generic detector
// serves both target categories; the retro-reflective tape and the gear marker only
// differ in the `DetectorConfig` they are built with.
//
// Algorithm steps, run once per category per cycle:
// 1.  **HSV Threshold**: Every pixel of the shared HSV buffer is tested against the
//     category's inclusive hue/saturation/value ranges, producing a binary mask.
// 2.  **Morphology**: Optional erosion then dilation clean speckle noise off the
//     mask and close small gaps in the tape strips.
// 3.  **Boundary Extraction**: Border following turns the mask into contours.
//     Only external borders are kept; holes and anything nested inside them are
//     ignored, mirroring an "external contours" retrieval mode. Border following
//     runs on a copy of the mask framed by one background pixel on every side, so
//     a region touching the frame edge still has an outer border.
// 4.  **Contour Filtering**: Each contour is checked against geometric bounds
//     (area, perimeter, box size, solidity, vertex count, aspect ratio).
//     Filtering removes entries but never reorders the survivors.
//
// The detector is side-effect free on its input. Its only state is the scratch
// masks it reuses from cycle to cycle, so a steady-state cycle allocates nothing
// for them.

use crate::core_modules::candidate::{extract, DetectionResult};
use crate::core_modules::contour::Contour;
use crate::core_modules::frame::{Frame, HsvFrame};
use crate::core_modules::pixel::pixel::convert_frame;
use image::{GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType};
use imageproc::distance_transform::Norm;
use imageproc::morphology::{dilate_mut, erode_mut};
use serde::{Deserialize, Serialize};

/// The two kinds of visual target the coprocessor tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetCategory {
    Tape,
    Gear,
}

impl std::fmt::Display for TargetCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetCategory::Tape => f.write_str("tape"),
            TargetCategory::Gear => f.write_str("gear"),
        }
    }
}

/// Inclusive HSV bounds, in 8-bit OpenCV units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HsvRange {
    pub hue: (u8, u8),
    pub saturation: (u8, u8),
    pub value: (u8, u8),
}

impl HsvRange {
    pub fn contains(&self, hue: u8, saturation: u8, value: u8) -> bool {
        (self.hue.0..=self.hue.1).contains(&hue)
            && (self.saturation.0..=self.saturation.1).contains(&saturation)
            && (self.value.0..=self.value.1).contains(&value)
    }
}

/// Erode/dilate passes applied to the threshold mask, each with a 3x3 square kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Morphology {
    pub erode_iterations: u8,
    pub dilate_iterations: u8,
}

/// Geometric acceptance bounds for a contour. All bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContourFilter {
    pub min_area: f64,
    pub min_perimeter: f64,
    pub min_width: i32,
    pub max_width: i32,
    pub min_height: i32,
    pub max_height: i32,
    /// Contour area over convex hull area, in percent.
    pub solidity: (f64, f64),
    pub min_vertices: usize,
    pub max_vertices: usize,
    /// Bounding box width over height.
    pub min_ratio: f64,
    pub max_ratio: f64,
}

impl Default for ContourFilter {
    fn default() -> Self {
        Self {
            min_area: 0.0,
            min_perimeter: 0.0,
            min_width: 0,
            max_width: 1000,
            min_height: 0,
            max_height: 1000,
            solidity: (0.0, 100.0),
            min_vertices: 0,
            max_vertices: 1_000_000,
            min_ratio: 0.0,
            max_ratio: 1000.0,
        }
    }
}

impl ContourFilter {
    /// Whether `contour` passes every bound.
    pub fn accepts(&self, contour: &Contour) -> bool {
        let Ok(candidate) = extract(contour) else {
            return false;
        };
        let bounds = candidate.bounding_box;
        if bounds.width < self.min_width || bounds.width > self.max_width {
            return false;
        }
        if bounds.height < self.min_height || bounds.height > self.max_height {
            return false;
        }

        let area = contour.area();
        if area < self.min_area {
            return false;
        }
        if contour.perimeter() < self.min_perimeter {
            return false;
        }

        let hull_area = contour.hull_area();
        // A hull with no area only comes from collinear points; count those as solid.
        let solidity = if hull_area > 0.0 {
            100.0 * area / hull_area
        } else {
            100.0
        };
        if solidity < self.solidity.0 || solidity > self.solidity.1 {
            return false;
        }

        let vertices = contour.vertex_count();
        if vertices < self.min_vertices || vertices > self.max_vertices {
            return false;
        }

        let ratio = bounds.aspect_ratio();
        ratio >= self.min_ratio && ratio <= self.max_ratio
    }
}

/// Rejected detector parameters.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DetectorConfigError {
    #[error("{category}: {field} range is inverted ({low} > {high})")]
    InvertedRange {
        category: TargetCategory,
        field: &'static str,
        low: f64,
        high: f64,
    },
    #[error("{category}: hue upper bound {hue} exceeds 179")]
    HueOutOfRange { category: TargetCategory, hue: u8 },
}

/// The full colour/shape profile of one target category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    pub category: TargetCategory,
    pub hsv: HsvRange,
    #[serde(default)]
    pub morphology: Morphology,
    #[serde(default)]
    pub filter: ContourFilter,
}

impl DetectorConfig {
    /// Retro-reflective tape lit by a green LED ring.
    pub fn tape() -> Self {
        Self {
            category: TargetCategory::Tape,
            hsv: HsvRange {
                hue: (50, 90),
                saturation: (100, 255),
                value: (80, 255),
            },
            morphology: Morphology::default(),
            filter: ContourFilter {
                min_area: 20.0,
                min_perimeter: 10.0,
                solidity: (50.0, 100.0),
                ..ContourFilter::default()
            },
        }
    }

    /// The yellow gear-peg marker.
    pub fn gear() -> Self {
        Self {
            category: TargetCategory::Gear,
            hsv: HsvRange {
                hue: (15, 40),
                saturation: (80, 255),
                value: (80, 255),
            },
            morphology: Morphology {
                erode_iterations: 1,
                dilate_iterations: 1,
            },
            filter: ContourFilter {
                min_area: 50.0,
                min_perimeter: 20.0,
                ..ContourFilter::default()
            },
        }
    }

    pub fn validate(&self) -> Result<(), DetectorConfigError> {
        let category = self.category;
        let ranges = [
            ("hue", self.hsv.hue.0 as f64, self.hsv.hue.1 as f64),
            (
                "saturation",
                self.hsv.saturation.0 as f64,
                self.hsv.saturation.1 as f64,
            ),
            ("value", self.hsv.value.0 as f64, self.hsv.value.1 as f64),
            (
                "width",
                self.filter.min_width as f64,
                self.filter.max_width as f64,
            ),
            (
                "height",
                self.filter.min_height as f64,
                self.filter.max_height as f64,
            ),
            ("solidity", self.filter.solidity.0, self.filter.solidity.1),
            (
                "vertices",
                self.filter.min_vertices as f64,
                self.filter.max_vertices as f64,
            ),
            ("ratio", self.filter.min_ratio, self.filter.max_ratio),
        ];
        for (field, low, high) in ranges {
            if low > high {
                return Err(DetectorConfigError::InvertedRange {
                    category,
                    field,
                    low,
                    high,
                });
            }
        }
        if self.hsv.hue.1 > 179 {
            return Err(DetectorConfigError::HueOutOfRange {
                category,
                hue: self.hsv.hue.1,
            });
        }
        Ok(())
    }
}

/// Locates the regions of one target category in a frame.
pub struct TargetDetector {
    config: DetectorConfig,
    /// Binary threshold output, reused every cycle.
    mask: GrayImage,
    /// `mask` inside a one-pixel background frame, fed to border following.
    framed: GrayImage,
    /// Only used by `detect`, which converts the frame itself.
    hsv_scratch: HsvFrame,
}

impl TargetDetector {
    pub fn new(config: DetectorConfig, width: u32, height: u32) -> Result<Self, DetectorConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            mask: GrayImage::new(width, height),
            framed: GrayImage::new(width + 2, height + 2),
            hsv_scratch: HsvFrame::new(width, height),
        })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn category(&self) -> TargetCategory {
        self.config.category
    }

    /// The mask produced by the most recent detection.
    pub fn mask(&self) -> &GrayImage {
        &self.mask
    }

    /// Converts `frame` to HSV and detects on it.
    pub fn detect(&mut self, frame: &Frame) -> DetectionResult {
        let mut hsv = std::mem::replace(&mut self.hsv_scratch, HsvFrame::new(0, 0));
        convert_frame(frame, &mut hsv);
        let result = self.detect_hsv(&hsv);
        self.hsv_scratch = hsv;
        result
    }

    /// Detects on a frame that has already been converted to HSV.
    pub fn detect_hsv(&mut self, hsv: &HsvFrame) -> DetectionResult {
        DetectionResult::from_contours(&self.find_contours(hsv))
    }

    /// Runs threshold, morphology, boundary extraction and filtering.
    pub fn find_contours(&mut self, hsv: &HsvFrame) -> Vec<Contour> {
        // --- 1. HSV Threshold ---
        self.threshold(hsv);

        // --- 2. Morphology ---
        let morphology = self.config.morphology;
        if morphology.erode_iterations > 0 {
            erode_mut(&mut self.mask, Norm::LInf, morphology.erode_iterations);
        }
        if morphology.dilate_iterations > 0 {
            dilate_mut(&mut self.mask, Norm::LInf, morphology.dilate_iterations);
        }

        // --- 3. Boundary Extraction ---
        self.frame_mask();
        // External borders only: outer borders that are not nested in a hole.
        let external = find_contours::<i32>(&self.framed)
            .into_iter()
            .filter(|contour| contour.border_type == BorderType::Outer && contour.parent.is_none())
            .map(|contour| Contour::from(contour).translated(-1, -1));

        // --- 4. Contour Filtering ---
        let filter = self.config.filter;
        let contours: Vec<Contour> = external.filter(|contour| filter.accepts(contour)).collect();
        tracing::trace!(category = %self.config.category, count = contours.len(), "contours");
        contours
    }

    /// Copies `mask` into the interior of `framed`; the outer ring stays zero.
    fn frame_mask(&mut self) {
        let width = self.mask.width() as usize;
        let framed_width = width + 2;
        let framed = &mut *self.framed;
        for (y, row) in self.mask.as_raw().chunks_exact(width.max(1)).enumerate() {
            let start = (y + 1) * framed_width + 1;
            framed[start..start + width].copy_from_slice(row);
        }
    }

    fn threshold(&mut self, hsv: &HsvFrame) {
        let range = self.config.hsv;
        for (pixel, out) in hsv.as_raw().chunks_exact(3).zip(self.mask.pixels_mut()) {
            *out = if range.contains(pixel[0], pixel[1], pixel[2]) {
                Luma([255])
            } else {
                Luma([0])
            };
        }
    }
}
