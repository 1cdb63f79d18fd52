use crate::combine::RetinotopyMaps;
use crate::error::{check_same_shape, AnalysisError, Result};
use crate::smoothing::RetinotopySmoother;
use ndarray::{Array2, Zip};

/// Visual field sign from the gradient directions of the position maps.
///
/// `VFS = sin(graddir_azimuth - graddir_elevation)`; +1 marks mirror-image
/// cortex, -1 non-mirror cortex.
#[derive(Debug, Clone)]
pub struct GradientVFSComputer {
    kernel_size: usize,
    smoothing: Option<RetinotopySmoother>,
}

impl GradientVFSComputer {
    /// `kernel_size` is the Sobel aperture: odd, between 3 and 31
    pub fn new(kernel_size: usize) -> Result<Self> {
        if kernel_size < 3 || kernel_size % 2 == 0 || kernel_size > 31 {
            return Err(AnalysisError::InvalidParameter {
                name: "sobel_kernel_size",
                reason: format!("must be odd and within 3..=31, got {}", kernel_size),
            });
        }
        Ok(Self {
            kernel_size,
            smoothing: None,
        })
    }

    /// Smooth the raw sign map once more, the same way position maps are
    /// smoothed. A sigma of zero disables the pass.
    pub fn with_smoothing(mut self, sigma: f64) -> Result<Self> {
        self.smoothing = if sigma > 0.0 {
            Some(RetinotopySmoother::new(sigma)?)
        } else {
            RetinotopySmoother::new(sigma)?;
            None
        };
        Ok(self)
    }

    pub fn kernel_size(&self) -> usize {
        self.kernel_size
    }

    /// Horizontal and vertical Sobel derivatives
    pub fn gradient(&self, map: &Array2<f64>) -> (Array2<f64>, Array2<f64>) {
        let (smooth, derivative) = sobel_kernels(self.kernel_size);
        let dx = separable_correlate(map, &smooth, &derivative);
        let dy = separable_correlate(map, &derivative, &smooth);
        (dx, dy)
    }

    /// Gradient direction `atan2(dy, dx)` of every pixel
    pub fn gradient_direction(&self, map: &Array2<f64>) -> Array2<f64> {
        let (dx, dy) = self.gradient(map);
        let mut out = Array2::zeros(map.dim());
        Zip::from(&mut out)
            .and(&dx)
            .and(&dy)
            .for_each(|o, &gx, &gy| *o = gy.atan2(gx));
        out
    }

    pub fn compute(&self, maps: &RetinotopyMaps) -> Result<Array2<f64>> {
        check_same_shape("elevation map", maps.azimuth.dim(), maps.elevation.dim())?;

        let graddir_azimuth = self.gradient_direction(&maps.azimuth);
        let graddir_elevation = self.gradient_direction(&maps.elevation);

        let mut vfs = Array2::zeros(maps.azimuth.dim());
        Zip::from(&mut vfs)
            .and(&graddir_azimuth)
            .and(&graddir_elevation)
            .for_each(|v, &az, &el| *v = (az - el).sin());

        match &self.smoothing {
            // smoothing is a weighted average; clamp the last ulp of drift
            Some(smoother) => Ok(smoother.smooth(&vfs).mapv(|v| v.clamp(-1.0, 1.0))),
            None => Ok(vfs),
        }
    }
}

/// Smoothing and derivative taps of a Sobel operator of odd `size`.
///
/// Binomial smoothing of order `size - 1`; the derivative is the binomial of
/// order `size - 3` correlated with `[-1, 0, 1]`.
pub fn sobel_kernels(size: usize) -> (Vec<f64>, Vec<f64>) {
    let smooth = binomial_row(size - 1);
    let base = binomial_row(size - 3);
    let mut derivative = vec![0.0; size];
    for (i, &b) in base.iter().enumerate() {
        derivative[i] -= b;
        derivative[i + 2] += b;
    }
    (smooth, derivative)
}

fn binomial_row(order: usize) -> Vec<f64> {
    let mut row = vec![1.0];
    for _ in 0..order {
        let mut next = vec![1.0; row.len() + 1];
        for i in 1..row.len() {
            next[i] = row[i - 1] + row[i];
        }
        row = next;
    }
    row
}

/// Correlate with `row_taps` along columns of each row, then `col_taps` down
/// each column. Borders reflect without repeating the edge pixel.
fn separable_correlate(map: &Array2<f64>, col_taps: &[f64], row_taps: &[f64]) -> Array2<f64> {
    let (rows, cols) = map.dim();
    let radius = row_taps.len() / 2;

    let mut horizontal = Array2::zeros((rows, cols));
    for r in 0..rows {
        for c in 0..cols {
            let mut acc = 0.0;
            for (k, &tap) in row_taps.iter().enumerate() {
                let cc = reflect_101(c as isize + k as isize - radius as isize, cols);
                acc += tap * map[[r, cc]];
            }
            horizontal[[r, c]] = acc;
        }
    }

    let mut out = Array2::zeros((rows, cols));
    for r in 0..rows {
        for c in 0..cols {
            let mut acc = 0.0;
            for (k, &tap) in col_taps.iter().enumerate() {
                let rr = reflect_101(r as isize + k as isize - radius as isize, rows);
                acc += tap * horizontal[[rr, c]];
            }
            out[[r, c]] = acc;
        }
    }
    out
}

fn reflect_101(index: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let len = len as isize;
    let period = 2 * (len - 1);
    let mut i = index.rem_euclid(period);
    if i >= len {
        i = period - i;
    }
    i as usize
}
