use crate::error::{check_same_shape, AnalysisError, Result};
use ndarray::{Array2, Zip};

/// Coherence maps of the four sweeps
#[derive(Debug, Clone, Copy)]
pub struct DirectionalCoherence<'a> {
    pub lr: &'a Array2<f64>,
    pub rl: &'a Array2<f64>,
    pub tb: &'a Array2<f64>,
    pub bt: &'a Array2<f64>,
}

impl DirectionalCoherence<'_> {
    /// Pixelwise minimum across the four sweeps
    pub fn minimum(&self) -> Result<Array2<f64>> {
        let shape = self.lr.dim();
        check_same_shape("RL coherence", shape, self.rl.dim())?;
        check_same_shape("TB coherence", shape, self.tb.dim())?;
        check_same_shape("BT coherence", shape, self.bt.dim())?;

        let mut out = Array2::zeros(shape);
        Zip::from(&mut out)
            .and(self.lr)
            .and(self.rl)
            .and(self.tb)
            .and(self.bt)
            .for_each(|o, &a, &b, &c, &d| *o = a.min(b).min(c).min(d));
        Ok(out)
    }
}

/// Output of both filter stages
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredVfs {
    pub coherence_mask: Array2<bool>,
    /// Raw VFS zeroed where any sweep is unreliable
    pub coherence_filtered: Array2<f64>,
    /// `k * std(raw VFS)` over the full, unmasked map
    pub statistical_threshold: f64,
    pub final_mask: Array2<bool>,
    /// Raw VFS zeroed outside `final_mask`
    pub filtered: Array2<f64>,
}

/// Two-stage VFS filter: sweep reliability, then sign strength.
///
/// The strength threshold is always derived from the whole raw map. Deriving
/// it from the coherence-masked subset changes the result and is wrong.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalFilter {
    coherence_threshold: f64,
    threshold_sd: f64,
}

impl SignalFilter {
    pub fn new(coherence_threshold: f64, threshold_sd: f64) -> Result<Self> {
        if !coherence_threshold.is_finite() {
            return Err(AnalysisError::InvalidParameter {
                name: "coherence_threshold",
                reason: format!("must be finite, got {}", coherence_threshold),
            });
        }
        if !threshold_sd.is_finite() || threshold_sd < 0.0 {
            return Err(AnalysisError::InvalidParameter {
                name: "vfs_threshold_sd",
                reason: format!("must be finite and non-negative, got {}", threshold_sd),
            });
        }
        Ok(Self {
            coherence_threshold,
            threshold_sd,
        })
    }

    pub fn coherence_threshold(&self) -> f64 {
        self.coherence_threshold
    }

    pub fn threshold_sd(&self) -> f64 {
        self.threshold_sd
    }

    pub fn coherence_mask(&self, coherence: &DirectionalCoherence<'_>) -> Result<Array2<bool>> {
        Ok(coherence
            .minimum()?
            .mapv(|c| c >= self.coherence_threshold))
    }

    /// `k` times the population standard deviation of the raw map
    pub fn statistical_threshold(&self, raw_vfs: &Array2<f64>) -> f64 {
        if raw_vfs.is_empty() {
            return 0.0;
        }
        let n = raw_vfs.len() as f64;
        let mean = raw_vfs.sum() / n;
        let variance = raw_vfs.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
        self.threshold_sd * variance.sqrt()
    }

    pub fn apply(
        &self,
        raw_vfs: &Array2<f64>,
        coherence: &DirectionalCoherence<'_>,
    ) -> Result<FilteredVfs> {
        let statistical_threshold = self.statistical_threshold(raw_vfs);

        let coherence_mask = self.coherence_mask(coherence)?;
        check_same_shape("coherence mask", raw_vfs.dim(), coherence_mask.dim())?;

        let mut coherence_filtered = Array2::zeros(raw_vfs.dim());
        let mut final_mask = Array2::from_elem(raw_vfs.dim(), false);
        let mut filtered = Array2::zeros(raw_vfs.dim());
        Zip::from(&mut coherence_filtered)
            .and(&mut final_mask)
            .and(&mut filtered)
            .and(raw_vfs)
            .and(&coherence_mask)
            .for_each(|cf, fm, f, &v, &reliable| {
                if reliable {
                    *cf = v;
                }
                *fm = reliable && v.abs() >= statistical_threshold;
                if *fm {
                    *f = v;
                }
            });

        log::debug!(
            "signal filter: {} of {} pixels reliable, {} pass |vfs| >= {:.4}",
            coherence_mask.iter().filter(|&&m| m).count(),
            raw_vfs.len(),
            final_mask.iter().filter(|&&m| m).count(),
            statistical_threshold
        );

        Ok(FilteredVfs {
            coherence_mask,
            coherence_filtered,
            statistical_threshold,
            final_mask,
            filtered,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_vfs() -> Array2<f64> {
        Array2::from_shape_fn((4, 4), |(r, c)| ((r * 4 + c) as f64 / 7.5) - 1.0)
    }

    #[test]
    fn test_threshold_uses_unmasked_map() {
        let raw = sample_vfs();
        let filter = SignalFilter::new(0.5, 1.0).unwrap();

        let before = filter.statistical_threshold(&raw);
        let strong = Array2::from_elem((4, 4), 1.0);
        let weak = Array2::from_shape_fn((4, 4), |(r, _)| if r < 2 { 0.0 } else { 1.0 });
        let coherence = DirectionalCoherence {
            lr: &strong,
            rl: &strong,
            tb: &weak,
            bt: &strong,
        };
        let result = filter.apply(&raw, &coherence).unwrap();
        let after = filter.statistical_threshold(&raw);

        assert_eq!(before, result.statistical_threshold);
        assert_eq!(after, result.statistical_threshold);

        // masked-subset std would differ, which is exactly what must not happen
        let subset: Vec<f64> = raw
            .iter()
            .zip(result.coherence_mask.iter())
            .filter(|(_, &m)| m)
            .map(|(&v, _)| v)
            .collect();
        let mean = subset.iter().sum::<f64>() / subset.len() as f64;
        let subset_std =
            (subset.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / subset.len() as f64).sqrt();
        assert!((subset_std - result.statistical_threshold).abs() > 1e-6);
    }

    #[test]
    fn test_output_is_zero_outside_final_mask() {
        let raw = sample_vfs();
        let filter = SignalFilter::new(0.5, 1.0).unwrap();
        let strong = Array2::from_elem((4, 4), 1.0);
        let weak = Array2::from_shape_fn((4, 4), |(_, c)| if c == 0 { 0.1 } else { 0.9 });
        let coherence = DirectionalCoherence {
            lr: &strong,
            rl: &weak,
            tb: &strong,
            bt: &strong,
        };
        let result = filter.apply(&raw, &coherence).unwrap();

        for ((&f, &m), (&cf, &v)) in result
            .filtered
            .iter()
            .zip(result.final_mask.iter())
            .zip(result.coherence_filtered.iter().zip(raw.iter()))
        {
            if m {
                assert_eq!(f, v);
                assert!(v.abs() >= result.statistical_threshold);
            } else {
                assert_eq!(f, 0.0);
            }
            assert!(cf == v || cf == 0.0);
        }
        // first column is unreliable in RL
        for r in 0..4 {
            assert!(!result.coherence_mask[[r, 0]]);
            assert!(!result.final_mask[[r, 0]]);
        }
    }

    #[test]
    fn test_coherence_minimum_shape_checked() {
        let a = Array2::<f64>::zeros((2, 2));
        let b = Array2::<f64>::zeros((3, 2));
        let coherence = DirectionalCoherence {
            lr: &a,
            rl: &a,
            tb: &b,
            bt: &a,
        };
        assert!(coherence.minimum().is_err());
    }
}
