use crate::error::{AnalysisError, Result};
use crate::spectral::Complex64;
use ndarray::{Array2, Array3, ArrayView3, Axis, Zip};
use rustfft::FftPlanner;
use std::f64::consts::PI;

/// Added to the temporal standard deviation before dividing, so flat pixels
/// yield zero coherence instead of NaN. Kept for numerical parity with the
/// reference maps.
pub const COHERENCE_EPSILON: f64 = 1e-10;

/// Camera frames for one direction with the stimulus angle each was matched to
#[derive(Debug, Clone)]
pub struct PhaseLabeledStack {
    frames: Array3<f64>,
    angle_labels: Vec<f32>,
}

impl PhaseLabeledStack {
    pub fn new(frames: Array3<f64>, angle_labels: Vec<f32>) -> Result<Self> {
        let n = frames.len_of(Axis(0));
        if angle_labels.len() != n {
            return Err(AnalysisError::LengthMismatch {
                what: "angle labels",
                expected: n,
                actual: angle_labels.len(),
            });
        }
        Ok(Self {
            frames,
            angle_labels,
        })
    }

    pub fn frames(&self) -> ArrayView3<'_, f64> {
        self.frames.view()
    }

    pub fn angle_labels(&self) -> &[f32] {
        &self.angle_labels
    }

    pub fn len(&self) -> usize {
        self.angle_labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.angle_labels.is_empty()
    }

    pub fn frame_shape(&self) -> (usize, usize) {
        let (_, h, w) = self.frames.dim();
        (h, w)
    }
}

/// Per-direction output of the Fourier stage
#[derive(Debug, Clone, PartialEq)]
pub struct FourierMaps {
    /// Phase at the stimulus bin, in (-pi, pi]
    pub phase: Array2<f64>,
    pub magnitude: Array2<f64>,
    pub coherence: Array2<f64>,
}

/// Computes the complex coefficient of a single temporal frequency bin for
/// every pixel of a mean-subtracted `[N, H, W]` stack.
///
/// Implementations must agree with each other within floating-point
/// tolerance; the pipeline treats them as interchangeable.
pub trait SpectralBackend {
    fn name(&self) -> &'static str;

    fn coefficients(&self, detrended: ArrayView3<'_, f64>, bin: usize) -> Array2<Complex64>;
}

/// Full 1-D FFT along time for each pixel
#[derive(Debug, Clone, Copy, Default)]
pub struct FftBackend;

impl SpectralBackend for FftBackend {
    fn name(&self) -> &'static str {
        "fft"
    }

    fn coefficients(&self, detrended: ArrayView3<'_, f64>, bin: usize) -> Array2<Complex64> {
        let (n, h, w) = detrended.dim();
        let mut out = Array2::from_elem((h, w), Complex64::new(0.0, 0.0));
        if n == 0 {
            return out;
        }

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(n);
        let mut buffer = vec![Complex64::new(0.0, 0.0); n];
        let mut scratch = vec![Complex64::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        Zip::from(&mut out)
            .and(detrended.lanes(Axis(0)))
            .for_each(|coefficient, series| {
                for (slot, &value) in buffer.iter_mut().zip(series.iter()) {
                    *slot = Complex64::new(value, 0.0);
                }
                fft.process_with_scratch(&mut buffer, &mut scratch);
                *coefficient = buffer[bin];
            });
        out
    }
}

/// Single-bin DFT evaluated as a projection of whole frame planes onto the
/// stimulus twiddle factor. Every step is an elementwise plane operation,
/// which is the shape a GPU kernel takes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectionBackend;

impl SpectralBackend for ProjectionBackend {
    fn name(&self) -> &'static str {
        "projection"
    }

    fn coefficients(&self, detrended: ArrayView3<'_, f64>, bin: usize) -> Array2<Complex64> {
        let (n, h, w) = detrended.dim();
        let mut out = Array2::from_elem((h, w), Complex64::new(0.0, 0.0));

        for (t, plane) in detrended.outer_iter().enumerate() {
            // reduce before scaling to keep the angle small
            let k = ((bin as u128 * t as u128) % n as u128) as f64;
            let twiddle = Complex64::from_polar(1.0, -2.0 * PI * k / n as f64);
            Zip::from(&mut out)
                .and(&plane)
                .for_each(|acc, &value| *acc += twiddle * value);
        }
        out
    }
}

/// Extracts phase, magnitude and coherence at the stimulus frequency
pub struct FourierAnalyzer<B: SpectralBackend = FftBackend> {
    backend: B,
}

impl FourierAnalyzer<FftBackend> {
    pub fn new() -> Self {
        Self {
            backend: FftBackend,
        }
    }
}

impl Default for FourierAnalyzer<FftBackend> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: SpectralBackend> FourierAnalyzer<B> {
    pub fn with_backend(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// `cycles / N`, the stimulus frequency in cycles per frame
    pub fn stimulus_frequency(cycles: f64, frames: usize) -> f64 {
        cycles / frames as f64
    }

    /// Analyze a labeled stack recorded over `cycles` stimulus cycles
    pub fn analyze(&self, stack: &PhaseLabeledStack, cycles: f64) -> Result<FourierMaps> {
        let frequency = Self::stimulus_frequency(cycles, stack.len());
        self.analyze_frames(stack.frames(), frequency)
    }

    /// Per-pixel analysis of an `[N, H, W]` stack at `stimulus_frequency`
    /// cycles per frame
    pub fn analyze_frames(
        &self,
        frames: ArrayView3<'_, f64>,
        stimulus_frequency: f64,
    ) -> Result<FourierMaps> {
        let (n, h, w) = frames.dim();
        if n < 2 {
            return Err(AnalysisError::InsufficientFrames {
                required: 2,
                actual: n,
            });
        }
        if !stimulus_frequency.is_finite() || stimulus_frequency <= 0.0 {
            return Err(AnalysisError::InvalidParameter {
                name: "stimulus_frequency",
                reason: format!("must be positive and finite, got {}", stimulus_frequency),
            });
        }

        let bin = (stimulus_frequency * n as f64).round() as usize;
        if bin == 0 || bin >= n {
            return Err(AnalysisError::FrequencyOutOfRange { bin, frames: n });
        }

        let mean = frames
            .mean_axis(Axis(0))
            .ok_or(AnalysisError::InsufficientFrames {
                required: 2,
                actual: n,
            })?;
        let mut detrended = frames.to_owned();
        for mut plane in detrended.outer_iter_mut() {
            plane -= &mean;
        }

        let coefficients = self.backend.coefficients(detrended.view(), bin);
        let std = detrended.map_axis(Axis(0), |series| {
            (series.iter().map(|v| v * v).sum::<f64>() / n as f64).sqrt()
        });

        let mut phase = Array2::zeros((h, w));
        let mut magnitude = Array2::zeros((h, w));
        let mut coherence = Array2::zeros((h, w));
        Zip::from(&mut phase)
            .and(&mut magnitude)
            .and(&mut coherence)
            .and(&coefficients)
            .and(&std)
            .for_each(|p, m, c, coefficient, &s| {
                *p = wrap_half_open(coefficient.im.atan2(coefficient.re));
                *m = coefficient.norm();
                *c = *m / (s + COHERENCE_EPSILON);
            });

        log::debug!(
            "fourier[{}]: {} frames of {}x{}, stimulus bin {}",
            self.backend.name(),
            n,
            h,
            w,
            bin
        );

        Ok(FourierMaps {
            phase,
            magnitude,
            coherence,
        })
    }
}

/// atan2 may return exactly -pi; fold it onto +pi
fn wrap_half_open(angle: f64) -> f64 {
    if angle <= -PI {
        angle + 2.0 * PI
    } else {
        angle
    }
}
