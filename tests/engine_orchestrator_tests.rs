use retinosync::core::{Direction, SessionClock};
use retinosync::engine::{
    phase_plan, AcquisitionOrchestrator, AcquisitionPhase, SessionRequest, SessionStatus,
};
use retinosync::error::{AcquisitionError, ErrorKind};
use retinosync::hal::mock::{FaultInjector, RecordingDisplay, SimulatedCamera, SimulatedCameraConfig};
use retinosync::params::{InMemoryParameterStore, ParameterStore, SessionParameters};
use retinosync::stimulus::{InMemoryFrameLibrary, StimulusFrame};
use retinosync::storage::{camera_file_path, read_camera_file, read_stimulus_file, stimulus_file_path};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

const SWEEP_FRAMES: usize = 20;

fn fast_params() -> Arc<InMemoryParameterStore> {
    let document = json!({
        "acquisition": {
            "directions": ["LR", "RL", "TB", "BT"],
            "cycles": 2,
            "baseline_sec": 0.05,
            "between_sec": 0.02,
            "background_luminance": 0.5
        },
        "camera": { "fps": 100.0, "timestamp_mode": "strict" },
        "monitor": {
            "fps": 200.0,
            "width_px": 64,
            "height_px": 48,
            "width_cm": 60.0,
            "height_cm": 36.0,
            "distance_cm": 10.0,
            "lateral_angle_deg": 30.0,
            "tilt_angle_deg": 20.0
        }
    });
    Arc::new(InMemoryParameterStore::from_json(document).unwrap())
}

fn full_library() -> Arc<InMemoryFrameLibrary> {
    let library = Arc::new(InMemoryFrameLibrary::new());
    for direction in Direction::ALL {
        let sequence = (0..SWEEP_FRAMES)
            .map(|i| (StimulusFrame::uniform(8, 6, 1.0), i as f32))
            .collect();
        library.preload(direction, sequence);
    }
    library
}

struct Rig {
    orchestrator: AcquisitionOrchestrator,
    display: Arc<RecordingDisplay>,
    store: Arc<InMemoryParameterStore>,
    faults: FaultInjector,
    phases: Arc<Mutex<Vec<AcquisitionPhase>>>,
}

fn rig_with(library: Arc<InMemoryFrameLibrary>, store: Arc<InMemoryParameterStore>, hardware_clock: bool) -> Rig {
    let clock = SessionClock::new();
    let mut config = SimulatedCameraConfig::new("sim-cam-test", 100.0);
    config.width = 8;
    config.height = 6;
    config.hardware_clock = hardware_clock;
    let camera = SimulatedCamera::new(config, clock);
    let faults = camera.fault_injector();
    let display = Arc::new(RecordingDisplay::new());

    let orchestrator = AcquisitionOrchestrator::new(
        Box::new(camera),
        library,
        display.clone(),
        store.clone(),
        clock,
    );
    let phases = Arc::new(Mutex::new(Vec::new()));
    let sink = phases.clone();
    orchestrator
        .events()
        .subscribe(move |event| sink.lock().unwrap().push(event.to));

    Rig {
        orchestrator,
        display,
        store,
        faults,
        phases,
    }
}

fn rig() -> Rig {
    rig_with(full_library(), fast_params(), true)
}

#[test]
fn test_missing_library_direction_blocks_start() {
    let library = full_library();
    library.unload(Direction::TB);
    let mut rig = rig_with(library, fast_params(), true);

    match rig.orchestrator.start(SessionRequest::preview("s")) {
        Err(AcquisitionError::LibraryNotPreloaded { missing }) => assert_eq!(missing, vec![Direction::TB]),
        other => panic!("expected LibraryNotPreloaded, got {:?}", other.err()),
    }
    assert_eq!(rig.orchestrator.phase(), AcquisitionPhase::Idle);
    assert!(rig.phases.lock().unwrap().is_empty());
    assert!(!rig.orchestrator.is_running());
}

#[test]
fn test_missing_parameter_blocks_start() {
    let rig = rig();
    rig.store.remove("acquisition", "cycles");
    let mut orchestrator = rig.orchestrator;

    let err = orchestrator.start(SessionRequest::preview("s")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ParameterMissing);
    assert_eq!(orchestrator.phase(), AcquisitionPhase::Idle);
    assert!(rig.phases.lock().unwrap().is_empty());
}

#[test]
fn test_strict_mode_requires_hardware_clock() {
    let mut rig = rig_with(full_library(), fast_params(), false);

    let err = rig.orchestrator.start(SessionRequest::preview("s")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::HardwareTimestampUnavailable);
    assert_eq!(rig.orchestrator.phase(), AcquisitionPhase::Idle);
    assert!(rig.phases.lock().unwrap().is_empty());

    // relaxed mode runs on software timestamps with the same camera
    rig.store.set("camera", "timestamp_mode", json!("relaxed"));
    let outcome = rig.orchestrator.run(SessionRequest::preview("s")).unwrap();
    assert_eq!(outcome.status, SessionStatus::Completed);
    assert!(outcome.frames_captured > 0);
}

#[test]
fn test_phases_follow_protocol_order() {
    let mut rig = rig();
    let outcome = rig.orchestrator.run(SessionRequest::preview("order")).unwrap();
    assert_eq!(outcome.status, SessionStatus::Completed);
    assert!(outcome.files.is_empty());

    let params = SessionParameters::from_store(rig.store.as_ref() as &dyn ParameterStore).unwrap();
    let mut expected = phase_plan(&params.acquisition.directions, params.acquisition.cycles);
    expected.push(AcquisitionPhase::Complete);
    expected.push(AcquisitionPhase::Idle);
    assert_eq!(*rig.phases.lock().unwrap(), expected);
    assert_eq!(rig.orchestrator.phase(), AcquisitionPhase::Idle);

    // every sweep is played in full: 4 directions x 2 cycles
    assert_eq!(rig.display.presented() as usize, 4 * 2 * SWEEP_FRAMES);
    // initial baseline, 8 inter-trial blanks and the final baseline
    let backgrounds = rig.display.backgrounds();
    assert_eq!(backgrounds.len(), 10);
    assert!(backgrounds.iter().all(|&l| l == 0.5));
}

#[test]
fn test_recording_session_writes_direction_files() {
    let dir = TempDir::new().unwrap();
    let mut rig = rig();
    let outcome = rig
        .orchestrator
        .run(SessionRequest::record("rec-1", dir.path()))
        .unwrap();

    assert_eq!(outcome.status, SessionStatus::Completed);
    assert_eq!(outcome.files.len(), 8);
    for direction in Direction::ALL {
        let camera = read_camera_file(&camera_file_path(dir.path(), direction)).unwrap();
        let stimulus = read_stimulus_file(&stimulus_file_path(dir.path(), direction)).unwrap();

        assert_eq!(camera.attributes.session_id, "rec-1");
        assert_eq!(camera.attributes.direction, direction);
        assert_eq!(stimulus.attributes.direction, direction);
        assert_eq!(stimulus.timestamps.len(), 2 * SWEEP_FRAMES);
        assert!(camera.timestamps.len() > 10);
        assert_eq!(camera.frames.shape()[0], camera.timestamps.len());

        assert!(camera.timestamps.windows(2).all(|w| w[0] < w[1]));
        assert!(stimulus.timestamps.windows(2).all(|w| w[0] < w[1]));
    }
    assert!(!rig.orchestrator.recorder().has_session());
}

#[test]
fn test_abort_discards_recording() {
    let dir = TempDir::new().unwrap();
    let mut rig = rig();
    rig.orchestrator
        .start(SessionRequest::record("aborted", dir.path()))
        .unwrap();
    std::thread::sleep(Duration::from_millis(250));
    assert!(rig.orchestrator.abort("operator stop"));

    let outcome = rig.orchestrator.wait().unwrap();
    assert_eq!(
        outcome.status,
        SessionStatus::Aborted {
            reason: "operator stop".into()
        }
    );
    assert!(outcome.files.is_empty());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    assert_eq!(rig.orchestrator.phase(), AcquisitionPhase::Idle);

    let phases = rig.phases.lock().unwrap().clone();
    assert_eq!(&phases[phases.len() - 2..], &[AcquisitionPhase::Aborted, AcquisitionPhase::Idle]);
    assert!(!phases.contains(&AcquisitionPhase::Complete));
    assert!(!rig.orchestrator.recorder().has_session());

    // the orchestrator is reusable after an abort
    let outcome = rig.orchestrator.run(SessionRequest::preview("again")).unwrap();
    assert_eq!(outcome.status, SessionStatus::Completed);
}

#[test]
fn test_capture_failure_while_recording_is_fatal() {
    let dir = TempDir::new().unwrap();
    let mut rig = rig();
    rig.orchestrator
        .start(SessionRequest::record("faulty", dir.path()))
        .unwrap();
    std::thread::sleep(Duration::from_millis(150));
    rig.faults.fail_next(1);

    let err = rig.orchestrator.wait().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CaptureDeviceError);
    assert_eq!(rig.orchestrator.phase(), AcquisitionPhase::Idle);
    assert!(rig.phases.lock().unwrap().contains(&AcquisitionPhase::Aborted));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_capture_failure_without_recording_is_tolerated() {
    let mut rig = rig();
    rig.orchestrator.start(SessionRequest::preview("tolerant")).unwrap();
    std::thread::sleep(Duration::from_millis(100));
    rig.faults.fail_next(2);

    let outcome = rig.orchestrator.wait().unwrap();
    assert_eq!(outcome.status, SessionStatus::Completed);
}

#[test]
fn test_second_start_while_running_is_rejected() {
    let mut rig = rig();
    rig.orchestrator.start(SessionRequest::preview("first")).unwrap();
    let err = rig.orchestrator.start(SessionRequest::preview("second")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);

    let outcome = rig.orchestrator.wait().unwrap();
    assert_eq!(outcome.session_id, "first");
}
