use crate::boundary::{AreaBoundary, BoundaryDetector};
use crate::combine::{BidirectionalCombiner, RetinotopyMaps};
use crate::direction::Direction;
use crate::error::{AnalysisError, Result};
use crate::filter::{DirectionalCoherence, FilteredVfs, SignalFilter};
use crate::fourier::{FftBackend, FourierAnalyzer, FourierMaps, PhaseLabeledStack, SpectralBackend};
use crate::phase_assign::PhaseAssigner;
use crate::smoothing::RetinotopySmoother;
use crate::vfs::GradientVFSComputer;
use ndarray::{Array2, Array3, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Numeric settings of the map derivation chain
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub coherence_threshold: f64,
    /// `k` of the statistical VFS threshold `k * std(raw VFS)`
    pub vfs_threshold_sd: f64,
    pub smoothing_sigma: f64,
    /// Second smoothing pass on the raw VFS; zero disables it
    pub vfs_smoothing_sigma: f64,
    pub sobel_kernel_size: usize,
    pub boundary_threshold: f64,
}

/// One direction's recording, as loaded from disk
#[derive(Debug, Clone)]
pub struct DirectionInput {
    /// `[N, H, W]` camera frames
    pub frames: Array3<f64>,
    pub camera_timestamps: Vec<i64>,
    pub stimulus_timestamps: Vec<i64>,
    pub stimulus_angles: Vec<f32>,
    /// Stimulus cycles covered by the recording
    pub cycles: u32,
}

impl DirectionInput {
    /// Match frames to angles and keep only those recorded while the sweep
    /// was on screen
    pub fn label_frames(&self) -> Result<PhaseLabeledStack> {
        let n = self.frames.len_of(Axis(0));
        if self.camera_timestamps.len() != n {
            return Err(AnalysisError::LengthMismatch {
                what: "camera timestamps",
                expected: n,
                actual: self.camera_timestamps.len(),
            });
        }

        let labels = PhaseAssigner::assign(
            &self.camera_timestamps,
            &self.stimulus_timestamps,
            &self.stimulus_angles,
        )?;
        let span =
            PhaseAssigner::frames_within_stimulus(&self.camera_timestamps, &self.stimulus_timestamps)?;

        let frames = self
            .frames
            .slice_axis(Axis(0), (span.start..span.end).into())
            .to_owned();
        PhaseLabeledStack::new(frames, labels[span].to_vec())
    }
}

/// Every artifact of one analysis run
#[derive(Debug, Clone)]
pub struct RetinotopyResults {
    pub fourier: BTreeMap<Direction, FourierMaps>,
    /// Smoothed azimuth/elevation
    pub retinotopy: RetinotopyMaps,
    pub raw_vfs: Array2<f64>,
    pub minimum_coherence: Array2<f64>,
    pub filtered: FilteredVfs,
    pub boundaries: AreaBoundary,
}

/// PhaseAssigner -> FourierAnalyzer -> BidirectionalCombiner ->
/// RetinotopySmoother -> GradientVFSComputer -> SignalFilter ->
/// BoundaryDetector
pub struct RetinotopyPipeline<B: SpectralBackend = FftBackend> {
    analyzer: FourierAnalyzer<B>,
    smoother: RetinotopySmoother,
    vfs: GradientVFSComputer,
    filter: SignalFilter,
    detector: BoundaryDetector,
    config: PipelineConfig,
}

impl RetinotopyPipeline<FftBackend> {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        Self::with_backend(config, FftBackend)
    }
}

impl<B: SpectralBackend> RetinotopyPipeline<B> {
    pub fn with_backend(config: PipelineConfig, backend: B) -> Result<Self> {
        Ok(Self {
            analyzer: FourierAnalyzer::with_backend(backend),
            smoother: RetinotopySmoother::new(config.smoothing_sigma)?,
            vfs: GradientVFSComputer::new(config.sobel_kernel_size)?
                .with_smoothing(config.vfs_smoothing_sigma)?,
            filter: SignalFilter::new(config.coherence_threshold, config.vfs_threshold_sd)?,
            detector: BoundaryDetector::new(config.boundary_threshold)?,
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn analyze_direction(&self, input: &DirectionInput) -> Result<FourierMaps> {
        let stack = input.label_frames()?;
        self.analyzer.analyze(&stack, input.cycles as f64)
    }

    /// Full run over recordings of all four directions
    pub fn run(&self, inputs: &BTreeMap<Direction, DirectionInput>) -> Result<RetinotopyResults> {
        let mut fourier = BTreeMap::new();
        for direction in Direction::ALL {
            let input = inputs
                .get(&direction)
                .ok_or(AnalysisError::MissingDirection(direction))?;
            let maps = self.analyze_direction(input)?;
            log::debug!("{}: phase/magnitude/coherence extracted", direction);
            fourier.insert(direction, maps);
        }
        self.run_from_fourier(fourier)
    }

    /// Continue from per-direction Fourier maps
    pub fn run_from_fourier(
        &self,
        fourier: BTreeMap<Direction, FourierMaps>,
    ) -> Result<RetinotopyResults> {
        let get = |direction: Direction| {
            fourier
                .get(&direction)
                .ok_or(AnalysisError::MissingDirection(direction))
        };
        let (lr, rl, tb, bt) = (
            get(Direction::LR)?,
            get(Direction::RL)?,
            get(Direction::TB)?,
            get(Direction::BT)?,
        );

        let combined = BidirectionalCombiner::combine(&lr.phase, &rl.phase, &tb.phase, &bt.phase)?;
        let retinotopy = RetinotopyMaps {
            azimuth: self.smoother.smooth(&combined.azimuth),
            elevation: self.smoother.smooth(&combined.elevation),
        };
        let raw_vfs = self.vfs.compute(&retinotopy)?;

        let coherence = DirectionalCoherence {
            lr: &lr.coherence,
            rl: &rl.coherence,
            tb: &tb.coherence,
            bt: &bt.coherence,
        };
        let minimum_coherence = coherence.minimum()?;
        let filtered = self.filter.apply(&raw_vfs, &coherence)?;
        let boundaries = self.detector.detect(&filtered.filtered);
        log::debug!(
            "retinotopy: statistical threshold {:.4}, boundaries derived",
            filtered.statistical_threshold
        );

        Ok(RetinotopyResults {
            fourier,
            retinotopy,
            raw_vfs,
            minimum_coherence,
            filtered,
            boundaries,
        })
    }
}
