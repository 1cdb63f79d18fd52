pub mod clock;
pub mod frame;

pub use clock::SessionClock;
pub use frame::{Direction, FrameSample, StimulusDisplayEvent, TimestampSource};
