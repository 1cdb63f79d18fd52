use crate::error::{AnalysisError, Result};
use crate::spectral::{fft2, to_complex};
use ndarray::{Array2, Zip};
use rustfft::FftDirection;

/// Frequency-domain Gaussian smoothing of 2-D maps.
///
/// A Gaussian of the map's own size, centered on the origin with circular
/// distances, is transformed once; its spectral magnitude then multiplies
/// the spectrum of the data. `sigma == 0` leaves maps untouched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetinotopySmoother {
    sigma: f64,
}

impl RetinotopySmoother {
    pub fn new(sigma: f64) -> Result<Self> {
        if !sigma.is_finite() || sigma < 0.0 {
            return Err(AnalysisError::InvalidParameter {
                name: "sigma",
                reason: format!("must be finite and non-negative, got {}", sigma),
            });
        }
        Ok(Self { sigma })
    }

    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    pub fn smooth(&self, map: &Array2<f64>) -> Array2<f64> {
        if self.sigma == 0.0 || map.is_empty() {
            return map.clone();
        }

        let kernel = Self::gaussian_kernel(map.dim(), self.sigma);
        let kernel_spectrum = fft2(&to_complex(&kernel), FftDirection::Forward);
        let mut spectrum = fft2(&to_complex(map), FftDirection::Forward);

        Zip::from(&mut spectrum)
            .and(&kernel_spectrum)
            .for_each(|s, k| *s *= k.norm());

        fft2(&spectrum, FftDirection::Inverse).mapv(|v| v.re)
    }

    /// Unit-sum Gaussian with its peak at `[0, 0]`, wrapping around the edges
    pub fn gaussian_kernel(shape: (usize, usize), sigma: f64) -> Array2<f64> {
        let (rows, cols) = shape;
        let two_sigma_sq = 2.0 * sigma * sigma;
        let mut kernel = Array2::from_shape_fn(shape, |(r, c)| {
            let dy = r.min(rows - r) as f64;
            let dx = c.min(cols - c) as f64;
            (-(dy * dy + dx * dx) / two_sigma_sq).exp()
        });
        let total = kernel.sum();
        if total > 0.0 {
            kernel.mapv_inplace(|v| v / total);
        }
        kernel
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_sigma_is_identity() {
        let map = Array2::from_shape_fn((6, 8), |(r, c)| (r * c) as f64 - 7.5);
        let smoothed = RetinotopySmoother::new(0.0).unwrap().smooth(&map);
        assert_eq!(smoothed, map);
    }

    #[test]
    fn test_constant_map_is_preserved() {
        let map = Array2::from_elem((16, 12), 1.25);
        let smoothed = RetinotopySmoother::new(3.0).unwrap().smooth(&map);
        for &v in smoothed.iter() {
            assert!((v - 1.25).abs() < 1e-9);
        }
    }

    #[test]
    fn test_smoothing_spreads_an_impulse() {
        let mut map = Array2::<f64>::zeros((32, 32));
        map[[16, 16]] = 1.0;
        let smoothed = RetinotopySmoother::new(2.0).unwrap().smooth(&map);
        assert!(smoothed[[16, 16]] < 1.0);
        assert!(smoothed[[16, 17]] > 0.0);
        assert!((smoothed.sum() - 1.0).abs() < 1e-9);
        // symmetric kernel keeps the peak in place
        let peak = smoothed
            .indexed_iter()
            .fold(((0, 0), f64::MIN), |best, (idx, &v)| if v > best.1 { (idx, v) } else { best });
        assert_eq!(peak.0, (16, 16));
    }

    #[test]
    fn test_kernel_is_centered_at_origin() {
        let kernel = RetinotopySmoother::gaussian_kernel((9, 9), 1.5);
        assert!((kernel.sum() - 1.0).abs() < 1e-12);
        assert!(kernel[[0, 0]] > kernel[[0, 1]]);
        assert!((kernel[[0, 1]] - kernel[[0, 8]]).abs() < 1e-15);
        assert!((kernel[[1, 0]] - kernel[[8, 0]]).abs() < 1e-15);
    }

    #[test]
    fn test_rejects_negative_sigma() {
        assert!(RetinotopySmoother::new(-1.0).is_err());
        assert!(RetinotopySmoother::new(f64::NAN).is_err());
    }
}
