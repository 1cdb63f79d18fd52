//! Fourier retinotopic analysis.
//!
//! Consumes timestamp-correlated camera/stimulus recordings and derives
//! phase, magnitude and coherence maps per sweep direction, the combined
//! azimuth/elevation maps, the visual field sign and the area boundaries.
//! Every stage takes its input by reference and returns freshly owned
//! arrays; nothing here performs I/O or spawns threads.

pub mod boundary;
pub mod combine;
pub mod direction;
pub mod error;
pub mod filter;
pub mod fourier;
pub mod phase_assign;
pub mod pipeline;
pub mod smoothing;
pub mod spectral;
pub mod vfs;

pub use boundary::{AreaBoundary, BoundaryDetector};
pub use combine::{BidirectionalCombiner, RetinotopyMaps};
pub use direction::{Axis as SweepAxis, Direction};
pub use error::{AnalysisError, Result};
pub use filter::{DirectionalCoherence, FilteredVfs, SignalFilter};
pub use fourier::{
    FftBackend, FourierAnalyzer, FourierMaps, PhaseLabeledStack, ProjectionBackend,
    SpectralBackend, COHERENCE_EPSILON,
};
pub use phase_assign::PhaseAssigner;
pub use pipeline::{DirectionInput, PipelineConfig, RetinotopyPipeline, RetinotopyResults};
pub use smoothing::RetinotopySmoother;
pub use vfs::GradientVFSComputer;
