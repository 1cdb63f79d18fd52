use crate::core::Direction;
use ndarray::Array2;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// One pre-rendered display frame
#[derive(Debug, Clone, PartialEq)]
pub struct StimulusFrame {
    pub pixels: Arc<Array2<u8>>,
}

impl StimulusFrame {
    pub fn new(pixels: Array2<u8>) -> Self {
        Self {
            pixels: Arc::new(pixels),
        }
    }

    /// A frame of one grey level
    pub fn uniform(width: usize, height: usize, luminance: f32) -> Self {
        let level = (luminance.clamp(0.0, 1.0) * 255.0).round() as u8;
        Self::new(Array2::from_elem((height, width), level))
    }

    pub fn shape(&self) -> (usize, usize) {
        self.pixels.dim()
    }
}

/// Frames of one sweep in display order, each with its visual angle
pub type StimulusSequence = Arc<Vec<(StimulusFrame, f32)>>;

/// Source of pre-generated sweep sequences. Read-only to the engine.
pub trait StimulusFrameLibrary: Send + Sync {
    fn is_loaded(&self, direction: Direction) -> bool;

    fn get_sequence(&self, direction: Direction) -> Option<StimulusSequence>;
}

pub struct InMemoryFrameLibrary {
    sequences: RwLock<HashMap<Direction, StimulusSequence>>,
}

impl InMemoryFrameLibrary {
    pub fn new() -> Self {
        Self {
            sequences: RwLock::new(HashMap::new()),
        }
    }

    /// Replace the sequence of `direction`. Empty sequences are not loaded.
    pub fn preload(&self, direction: Direction, sequence: Vec<(StimulusFrame, f32)>) {
        let mut sequences = self.sequences.write().unwrap_or_else(|p| p.into_inner());
        if sequence.is_empty() {
            sequences.remove(&direction);
        } else {
            log::debug!("preloaded {} stimulus frames for {}", sequence.len(), direction);
            sequences.insert(direction, Arc::new(sequence));
        }
    }

    pub fn unload(&self, direction: Direction) {
        self.sequences
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&direction);
    }

    pub fn loaded_directions(&self) -> Vec<Direction> {
        let sequences = self.sequences.read().unwrap_or_else(|p| p.into_inner());
        let mut directions: Vec<_> = sequences.keys().copied().collect();
        directions.sort();
        directions
    }
}

impl Default for InMemoryFrameLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl StimulusFrameLibrary for InMemoryFrameLibrary {
    fn is_loaded(&self, direction: Direction) -> bool {
        self.sequences
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .contains_key(&direction)
    }

    fn get_sequence(&self, direction: Direction) -> Option<StimulusSequence> {
        self.sequences
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(&direction)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preload_and_unload() {
        let library = InMemoryFrameLibrary::new();
        assert!(!library.is_loaded(Direction::LR));

        library.preload(
            Direction::LR,
            vec![(StimulusFrame::uniform(4, 3, 1.0), -10.0), (StimulusFrame::uniform(4, 3, 0.0), 10.0)],
        );
        assert!(library.is_loaded(Direction::LR));
        let sequence = library.get_sequence(Direction::LR).unwrap();
        assert_eq!(sequence.len(), 2);
        assert_eq!(sequence[0].0.pixels[[0, 0]], 255);
        assert_eq!(sequence[1].1, 10.0);

        library.unload(Direction::LR);
        assert!(library.get_sequence(Direction::LR).is_none());
    }

    #[test]
    fn test_empty_sequence_is_not_loaded() {
        let library = InMemoryFrameLibrary::new();
        library.preload(Direction::TB, Vec::new());
        assert!(!library.is_loaded(Direction::TB));
        assert!(library.loaded_directions().is_empty());
    }
}
