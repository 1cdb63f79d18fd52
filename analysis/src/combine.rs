use crate::error::{check_same_shape, Result};
use ndarray::{Array2, Zip};

/// Azimuth and elevation maps, in radians of stimulus phase
#[derive(Debug, Clone, PartialEq)]
pub struct RetinotopyMaps {
    pub azimuth: Array2<f64>,
    pub elevation: Array2<f64>,
}

/// Combines opposite sweeps into position maps by half-difference.
///
/// The subtraction is deliberately left unwrapped and carries no
/// hemodynamic-delay correction: the output is compared against reference
/// maps produced exactly this way. A variant that wraps through
/// `atan2(sin, cos)` is a different algorithm and must be revalidated.
pub struct BidirectionalCombiner;

impl BidirectionalCombiner {
    /// `(forward - backward) / 2`, elementwise
    pub fn combine_axis(forward: &Array2<f64>, backward: &Array2<f64>) -> Result<Array2<f64>> {
        check_same_shape("backward phase map", forward.dim(), backward.dim())?;
        let mut out = Array2::zeros(forward.dim());
        Zip::from(&mut out)
            .and(forward)
            .and(backward)
            .for_each(|o, &f, &b| *o = (f - b) / 2.0);
        Ok(out)
    }

    pub fn combine(
        phase_lr: &Array2<f64>,
        phase_rl: &Array2<f64>,
        phase_tb: &Array2<f64>,
        phase_bt: &Array2<f64>,
    ) -> Result<RetinotopyMaps> {
        check_same_shape("elevation phase map", phase_lr.dim(), phase_tb.dim())?;
        Ok(RetinotopyMaps {
            azimuth: Self::combine_axis(phase_lr, phase_rl)?,
            elevation: Self::combine_axis(phase_tb, phase_bt)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_identical_sweeps_cancel() {
        let phase = Array2::from_shape_fn((5, 7), |(r, c)| (r as f64 - c as f64) * 0.3);
        let azimuth = BidirectionalCombiner::combine_axis(&phase, &phase).unwrap();
        assert!(azimuth.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_no_wrapping_applied() {
        let forward = Array2::from_elem((1, 1), 0.9 * PI);
        let backward = Array2::from_elem((1, 1), -0.9 * PI);
        let combined = BidirectionalCombiner::combine_axis(&forward, &backward).unwrap();
        assert!((combined[[0, 0]] - 0.9 * PI).abs() < 1e-12);
    }

    #[test]
    fn test_shape_mismatch_is_rejected() {
        let a = Array2::<f64>::zeros((2, 2));
        let b = Array2::<f64>::zeros((2, 3));
        assert!(BidirectionalCombiner::combine_axis(&a, &b).is_err());
        assert!(BidirectionalCombiner::combine(&a, &a, &b, &b).is_err());
    }
}
