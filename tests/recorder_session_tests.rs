use ndarray::Array2;
use retinosync::core::{Direction, FrameSample, SessionClock, StimulusDisplayEvent, TimestampSource};
use retinosync::error::ErrorKind;
use retinosync::params::MonitorGeometry;
use retinosync::recorder::{SessionMetadata, SessionRecorder};
use retinosync::storage::{camera_file_path, read_camera_file, read_stimulus_file, stimulus_file_path};
use std::sync::Arc;
use tempfile::TempDir;

fn monitor() -> MonitorGeometry {
    MonitorGeometry {
        fps: 60.0,
        width_px: 64,
        height_px: 48,
        width_cm: 60.0,
        height_cm: 36.0,
        distance_cm: 10.0,
        lateral_angle_deg: 30.0,
        tilt_angle_deg: 20.0,
    }
}

fn frame(index: u64, timestamp_us: i64) -> FrameSample {
    FrameSample {
        frame_id: index,
        timestamp_us,
        timestamp_source: TimestampSource::Hardware,
        pixels: Arc::new(Array2::from_elem((3, 4), index as u16)),
        capture_index: index,
    }
}

/// Record three frames and two display events for every direction
fn recorded_session() -> SessionRecorder {
    let recorder = SessionRecorder::new(SessionClock::new());
    recorder.initialize(
        &Direction::ALL,
        SessionMetadata {
            session_id: "flush-test".into(),
            camera_fps: 30.0,
            monitor: monitor(),
            cycles: 1,
        },
    );

    let mut t = 0;
    let mut index = 0;
    for direction in Direction::ALL {
        recorder.start_recording_at(direction, t + 1).unwrap();
        for k in 0..3 {
            t += 1_000;
            assert!(recorder.record_camera_frame(frame(index, t)).unwrap());
            index += 1;
            if k < 2 {
                let event = StimulusDisplayEvent {
                    timestamp_us: t + 10,
                    frame_index: k,
                    angle_degrees: k as f32 * 10.0,
                    direction,
                };
                assert!(recorder.record_stimulus_event(&event).unwrap());
            }
        }
        recorder.stop_recording_at(direction, t + 1).unwrap();
    }
    recorder
}

#[test]
fn test_flush_writes_every_direction() {
    let dir = TempDir::new().unwrap();
    let recorder = recorded_session();

    let files = recorder.flush(dir.path()).unwrap();
    assert_eq!(files.len(), 8);
    assert!(!recorder.has_session());

    let camera = read_camera_file(&camera_file_path(dir.path(), Direction::RL)).unwrap();
    assert_eq!(camera.frames.shape(), &[3, 3, 4]);
    assert_eq!(camera.timestamps, vec![4_000, 5_000, 6_000]);
    assert_eq!(camera.attributes.timestamp_source, Some(TimestampSource::Hardware));
    assert_eq!(camera.attributes.monitor, monitor());

    let stimulus = read_stimulus_file(&stimulus_file_path(dir.path(), Direction::RL)).unwrap();
    assert_eq!(stimulus.frame_indices, vec![0, 1]);
    assert_eq!(stimulus.angles, vec![0.0, 10.0]);
}

#[test]
fn test_failed_flush_leaves_nothing_and_keeps_buffers() {
    let dir = TempDir::new().unwrap();
    let recorder = recorded_session();

    // a directory squatting on the last target makes its rename fail
    let blocker = stimulus_file_path(dir.path(), Direction::BT);
    std::fs::create_dir(&blocker).unwrap();

    let err = recorder.flush(dir.path()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DiskWriteError);

    let remaining: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    assert_eq!(remaining, vec![blocker.clone()]);

    assert!(recorder.has_session());
    let dataset = recorder.dataset(Direction::LR).unwrap();
    assert_eq!(dataset.camera_timestamps.len(), 3);
    assert_eq!(dataset.stimulus_timestamps.len(), 2);

    std::fs::remove_dir(&blocker).unwrap();
    let files = recorder.flush(dir.path()).unwrap();
    assert_eq!(files.len(), 8);
    assert!(files.iter().all(|f| f.exists()));
}

#[test]
fn test_flush_refuses_while_recording() {
    let dir = TempDir::new().unwrap();
    let recorder = recorded_session();
    recorder.start_recording(Direction::TB).unwrap();

    assert!(recorder.flush(dir.path()).is_err());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_out_of_order_camera_frame_is_rejected() {
    let recorder = SessionRecorder::new(SessionClock::new());
    recorder.initialize(
        &[Direction::LR],
        SessionMetadata {
            session_id: "order".into(),
            camera_fps: 30.0,
            monitor: monitor(),
            cycles: 1,
        },
    );
    recorder.start_recording_at(Direction::LR, 0).unwrap();
    recorder.record_camera_frame(frame(0, 2_000)).unwrap();

    let err = recorder.record_camera_frame(frame(1, 1_000)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NonMonotonicTimestamp);
    assert_eq!(recorder.dataset(Direction::LR).unwrap().camera_timestamps, vec![2_000]);
}
