use crate::error::{AnalysisError, Result};
use ndarray::Array2;

/// Diameter of the elliptical structuring element used for closing.
/// Fixed for parity with the reference boundary maps.
pub const CLOSING_ELEMENT_SIZE: usize = 5;

/// Terminal artifact of the pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct AreaBoundary {
    /// Closed mirror-image (positive sign) regions
    pub positive_mask: Array2<bool>,
    /// Closed non-mirror (negative sign) regions
    pub negative_mask: Array2<bool>,
    /// Single-pixel outlines of `positive_mask`
    pub positive_borders: Array2<bool>,
    /// Single-pixel outlines of `negative_mask`
    pub negative_borders: Array2<bool>,
}

impl AreaBoundary {
    pub fn is_empty(&self) -> bool {
        !self
            .positive_borders
            .iter()
            .chain(self.negative_borders.iter())
            .chain(self.positive_mask.iter())
            .chain(self.negative_mask.iter())
            .any(|&v| v)
    }
}

pub struct BoundaryDetector {
    threshold: f64,
    element: Vec<(isize, isize)>,
}

impl BoundaryDetector {
    pub fn new(threshold: f64) -> Result<Self> {
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(AnalysisError::InvalidParameter {
                name: "boundary_threshold",
                reason: format!("must be positive and finite, got {}", threshold),
            });
        }
        Ok(Self {
            threshold,
            element: elliptical_element(CLOSING_ELEMENT_SIZE),
        })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn detect(&self, filtered_vfs: &Array2<f64>) -> AreaBoundary {
        let positive = filtered_vfs.mapv(|v| v >= self.threshold);
        let negative = filtered_vfs.mapv(|v| v <= -self.threshold);

        let positive_mask = self.close(&positive);
        let negative_mask = self.close(&negative);
        let positive_borders = thin(&region_outline(&positive_mask));
        let negative_borders = thin(&region_outline(&negative_mask));

        AreaBoundary {
            positive_mask,
            negative_mask,
            positive_borders,
            negative_borders,
        }
    }

    /// Morphological closing: dilation followed by erosion.
    /// Pixels outside the image never influence either pass.
    pub fn close(&self, mask: &Array2<bool>) -> Array2<bool> {
        let dilated = self.morph(mask, false);
        self.morph(&dilated, true)
    }

    fn morph(&self, mask: &Array2<bool>, erode: bool) -> Array2<bool> {
        let (rows, cols) = mask.dim();
        Array2::from_shape_fn((rows, cols), |(r, c)| {
            let mut neighbours = self.element.iter().filter_map(|&(dr, dc)| {
                let rr = r as isize + dr;
                let cc = c as isize + dc;
                if rr < 0 || cc < 0 || rr >= rows as isize || cc >= cols as isize {
                    None
                } else {
                    Some(mask[[rr as usize, cc as usize]])
                }
            });
            if erode {
                neighbours.all(|v| v)
            } else {
                neighbours.any(|v| v)
            }
        })
    }
}

/// Offsets of an ellipse inscribed in a `size` x `size` square
pub fn elliptical_element(size: usize) -> Vec<(isize, isize)> {
    let r = (size / 2) as isize;
    let c = (size / 2) as isize;
    let inv_r2 = if r > 0 { 1.0 / (r * r) as f64 } else { 0.0 };

    let mut offsets = Vec::new();
    for i in 0..size as isize {
        let dy = i - r;
        let half_width = if dy.abs() <= r {
            (c as f64 * (((r * r - dy * dy) as f64) * inv_r2).sqrt()).round() as isize
        } else {
            0
        };
        let j1 = (c - half_width).max(0);
        let j2 = (c + half_width + 1).min(size as isize);
        for j in j1..j2 {
            offsets.push((dy, j - c));
        }
    }
    offsets
}

/// Mask pixels with at least one 4-neighbour outside the mask. The image
/// border is not an outline.
fn region_outline(mask: &Array2<bool>) -> Array2<bool> {
    let (rows, cols) = mask.dim();
    Array2::from_shape_fn((rows, cols), |(r, c)| {
        if !mask[[r, c]] {
            return false;
        }
        let outside = |rr: isize, cc: isize| {
            rr >= 0
                && cc >= 0
                && (rr as usize) < rows
                && (cc as usize) < cols
                && !mask[[rr as usize, cc as usize]]
        };
        let (r, c) = (r as isize, c as isize);
        outside(r - 1, c) || outside(r + 1, c) || outside(r, c - 1) || outside(r, c + 1)
    })
}

/// Zhang-Suen thinning down to one-pixel-wide curves
pub fn thin(mask: &Array2<bool>) -> Array2<bool> {
    let (rows, cols) = mask.dim();
    let mut image = mask.clone();
    if rows < 3 || cols < 3 {
        return image;
    }

    loop {
        let mut changed = false;
        for pass in 0..2 {
            let mut remove = Vec::new();
            for r in 1..rows - 1 {
                for c in 1..cols - 1 {
                    if !image[[r, c]] {
                        continue;
                    }
                    // P2..P9 clockwise from north
                    let p = [
                        image[[r - 1, c]],
                        image[[r - 1, c + 1]],
                        image[[r, c + 1]],
                        image[[r + 1, c + 1]],
                        image[[r + 1, c]],
                        image[[r + 1, c - 1]],
                        image[[r, c - 1]],
                        image[[r - 1, c - 1]],
                    ];
                    let neighbours = p.iter().filter(|&&v| v).count();
                    if !(2..=6).contains(&neighbours) {
                        continue;
                    }
                    let transitions = (0..8).filter(|&i| !p[i] && p[(i + 1) % 8]).count();
                    if transitions != 1 {
                        continue;
                    }
                    let (a, b) = if pass == 0 {
                        (p[0] && p[2] && p[4], p[2] && p[4] && p[6])
                    } else {
                        (p[0] && p[2] && p[6], p[0] && p[4] && p[6])
                    };
                    if !a && !b {
                        remove.push((r, c));
                    }
                }
            }
            if !remove.is_empty() {
                changed = true;
                for (r, c) in remove {
                    image[[r, c]] = false;
                }
            }
        }
        if !changed {
            break;
        }
    }
    image
}
