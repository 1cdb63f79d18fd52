use crate::error::{AnalysisError, Result};
use std::ops::Range;

/// Post-hoc join of camera frames to stimulus angles.
///
/// Each camera timestamp takes the angle of the stimulus event whose
/// timestamp is nearest. When two events are equally close the earlier one
/// wins. Camera frames before the first or after the last event are clamped
/// to that boundary event.
pub struct PhaseAssigner;

impl PhaseAssigner {
    /// Assign one angle per camera frame, index-aligned with `camera_timestamps`
    pub fn assign(
        camera_timestamps: &[i64],
        stimulus_timestamps: &[i64],
        stimulus_angles: &[f32],
    ) -> Result<Vec<f32>> {
        let indices = Self::assign_indices(camera_timestamps, stimulus_timestamps)?;
        if stimulus_angles.len() != stimulus_timestamps.len() {
            return Err(AnalysisError::LengthMismatch {
                what: "stimulus angles",
                expected: stimulus_timestamps.len(),
                actual: stimulus_angles.len(),
            });
        }
        Ok(indices.into_iter().map(|i| stimulus_angles[i]).collect())
    }

    /// Index of the matched stimulus event for every camera frame
    pub fn assign_indices(
        camera_timestamps: &[i64],
        stimulus_timestamps: &[i64],
    ) -> Result<Vec<usize>> {
        if stimulus_timestamps.is_empty() {
            return Err(AnalysisError::EmptyStimulusLog);
        }
        check_non_decreasing("camera", camera_timestamps)?;
        check_non_decreasing("stimulus", stimulus_timestamps)?;

        Ok(camera_timestamps
            .iter()
            .map(|&t| Self::nearest_event(stimulus_timestamps, t))
            .collect())
    }

    /// Binary search for the event nearest to `t`; `stimulus_timestamps` must be
    /// sorted and non-empty.
    pub fn nearest_event(stimulus_timestamps: &[i64], t: i64) -> usize {
        let after = stimulus_timestamps.partition_point(|&s| s < t);
        if after == 0 {
            return 0;
        }
        if after == stimulus_timestamps.len() {
            return stimulus_timestamps.len() - 1;
        }

        let before = after - 1;
        let to_before = t - stimulus_timestamps[before];
        let to_after = stimulus_timestamps[after] - t;
        if to_after < to_before {
            after
        } else {
            before
        }
    }

    /// Camera frames captured while the stimulus was on screen, i.e. whose
    /// timestamps lie within the first and last stimulus event inclusive.
    pub fn frames_within_stimulus(
        camera_timestamps: &[i64],
        stimulus_timestamps: &[i64],
    ) -> Result<Range<usize>> {
        let (first, last) = match (stimulus_timestamps.first(), stimulus_timestamps.last()) {
            (Some(&first), Some(&last)) => (first, last),
            _ => return Err(AnalysisError::EmptyStimulusLog),
        };
        check_non_decreasing("camera", camera_timestamps)?;

        let start = camera_timestamps.partition_point(|&t| t < first);
        let end = camera_timestamps.partition_point(|&t| t <= last);
        Ok(start..end.max(start))
    }
}

fn check_non_decreasing(series: &'static str, timestamps: &[i64]) -> Result<()> {
    match timestamps.windows(2).position(|pair| pair[1] < pair[0]) {
        Some(index) => Err(AnalysisError::NonMonotonicTimestamps {
            series,
            index: index + 1,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match_takes_event_angle() {
        let stim = [0, 100, 200, 300];
        let angles = [10.0, 20.0, 30.0, 40.0];
        let labels = PhaseAssigner::assign(&[200], &stim, &angles).unwrap();
        assert_eq!(labels, vec![30.0]);
    }

    #[test]
    fn test_equidistant_prefers_earlier_event() {
        let stim = [0, 100];
        assert_eq!(PhaseAssigner::nearest_event(&stim, 50), 0);
        assert_eq!(PhaseAssigner::nearest_event(&stim, 51), 1);
        assert_eq!(PhaseAssigner::nearest_event(&stim, 49), 0);
    }

    #[test]
    fn test_out_of_range_frames_clamp_to_boundary() {
        let stim = [1_000, 2_000, 3_000];
        let angles = [-5.0, 0.0, 5.0];
        let labels = PhaseAssigner::assign(&[0, 999, 3_001, 10_000], &stim, &angles).unwrap();
        assert_eq!(labels, vec![-5.0, -5.0, 5.0, 5.0]);
    }

    #[test]
    fn test_duplicate_stimulus_timestamps_take_first() {
        let stim = [0, 100, 100, 200];
        assert_eq!(PhaseAssigner::nearest_event(&stim, 100), 1);
    }

    #[test]
    fn test_rejects_unsorted_and_empty_inputs() {
        assert_eq!(
            PhaseAssigner::assign(&[1, 2], &[], &[]),
            Err(AnalysisError::EmptyStimulusLog)
        );
        assert_eq!(
            PhaseAssigner::assign(&[5, 4], &[0], &[0.0]),
            Err(AnalysisError::NonMonotonicTimestamps {
                series: "camera",
                index: 1
            })
        );
        assert!(matches!(
            PhaseAssigner::assign(&[5], &[0, 1], &[0.0]),
            Err(AnalysisError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_frames_within_stimulus_is_inclusive() {
        let camera = [0, 10, 20, 30, 40, 50];
        let range = PhaseAssigner::frames_within_stimulus(&camera, &[10, 40]).unwrap();
        assert_eq!(range, 1..5);

        let empty = PhaseAssigner::frames_within_stimulus(&camera, &[100, 200]).unwrap();
        assert!(empty.is_empty());
    }
}
