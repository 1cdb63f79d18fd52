pub mod library;
pub mod sweep;

pub use library::{InMemoryFrameLibrary, StimulusFrame, StimulusFrameLibrary, StimulusSequence};
pub use sweep::{generate_bar_sweep, BarSweep};
