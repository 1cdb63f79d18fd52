use ndarray::{Array2, Array3, Axis};
use retinosync_analysis::{
    BoundaryDetector, Direction, DirectionInput, FourierAnalyzer, PhaseAssigner, PipelineConfig,
    ProjectionBackend, RetinotopyPipeline,
};
use std::collections::BTreeMap;
use std::f64::consts::PI;

const FRAMES: usize = 100;
const CYCLES: u32 = 4;
const HEIGHT: usize = 12;
const WIDTH: usize = 16;
const CAMERA_PERIOD_US: i64 = 33_333;
const MONITOR_PERIOD_US: i64 = 16_667;

fn injected_phase(direction: Direction, y: usize, x: usize) -> f64 {
    match direction.axis() {
        retinosync_analysis::SweepAxis::Azimuth => -2.0 + 3.5 * x as f64 / WIDTH as f64,
        retinosync_analysis::SweepAxis::Elevation => -1.5 + 2.5 * y as f64 / HEIGHT as f64,
    }
}

fn sweep_frames(direction: Direction) -> Array3<f64> {
    Array3::from_shape_fn((FRAMES, HEIGHT, WIDTH), |(t, y, x)| {
        let omega = 2.0 * PI * CYCLES as f64 * t as f64 / FRAMES as f64;
        500.0 + 20.0 * (omega + injected_phase(direction, y, x)).cos()
    })
}

fn reversed(frames: &Array3<f64>) -> Array3<f64> {
    let mut out = frames.clone();
    out.invert_axis(Axis(0));
    out
}

fn stimulus_log() -> (Vec<i64>, Vec<f32>) {
    let events = 2 * FRAMES;
    let timestamps = (0..events as i64).map(|k| k * MONITOR_PERIOD_US).collect();
    let angles = (0..events).map(|k| -60.0 + 120.0 * k as f32 / events as f32).collect();
    (timestamps, angles)
}

fn input(frames: Array3<f64>, reverse_angles: bool) -> DirectionInput {
    let (stimulus_timestamps, mut stimulus_angles) = stimulus_log();
    if reverse_angles {
        stimulus_angles.reverse();
    }
    DirectionInput {
        frames,
        camera_timestamps: (0..FRAMES as i64).map(|t| t * CAMERA_PERIOD_US).collect(),
        stimulus_timestamps,
        stimulus_angles,
        cycles: CYCLES,
    }
}

fn synthetic_session() -> BTreeMap<Direction, DirectionInput> {
    let lr = sweep_frames(Direction::LR);
    let tb = sweep_frames(Direction::TB);
    let mut inputs = BTreeMap::new();
    inputs.insert(Direction::RL, input(reversed(&lr), true));
    inputs.insert(Direction::LR, input(lr, false));
    inputs.insert(Direction::BT, input(reversed(&tb), true));
    inputs.insert(Direction::TB, input(tb, false));
    inputs
}

fn config() -> PipelineConfig {
    PipelineConfig {
        coherence_threshold: 1.0,
        vfs_threshold_sd: 1.0,
        smoothing_sigma: 1.0,
        vfs_smoothing_sigma: 0.0,
        sobel_kernel_size: 3,
        boundary_threshold: 0.3,
    }
}

fn angular_distance(a: f64, b: f64) -> f64 {
    (a - b).sin().atan2((a - b).cos()).abs()
}

#[test]
fn test_recovers_injected_phase_for_all_directions() {
    let inputs = synthetic_session();
    let pipeline = RetinotopyPipeline::new(config()).unwrap();

    for (direction, data) in &inputs {
        let maps = pipeline.analyze_direction(data).unwrap();
        for ((y, x), &phase) in maps.phase.indexed_iter() {
            let forward = injected_phase(*direction, y, x);
            let expected = match direction {
                Direction::LR | Direction::TB => forward,
                // time reversal negates the phase and shifts it by one sample
                Direction::RL | Direction::BT => {
                    -forward + 2.0 * PI * CYCLES as f64 / FRAMES as f64
                }
            };
            assert!(
                angular_distance(phase, expected) < 1e-3,
                "{} at ({}, {}): got {}, expected {}",
                direction,
                y,
                x,
                phase,
                expected
            );
        }
    }
}

#[test]
fn test_reversed_sweep_labels_follow_reversed_angles() {
    let inputs = synthetic_session();
    let lr = inputs[&Direction::LR].label_frames().unwrap();
    let rl = inputs[&Direction::RL].label_frames().unwrap();
    assert_eq!(lr.len(), FRAMES);
    assert_eq!(rl.len(), FRAMES);
    assert!(lr.angle_labels().windows(2).all(|w| w[1] >= w[0]));
    assert!(rl.angle_labels().windows(2).all(|w| w[1] <= w[0]));
}

#[test]
fn test_full_pipeline_outputs_are_consistent() {
    let results = RetinotopyPipeline::new(config())
        .unwrap()
        .run(&synthetic_session())
        .unwrap();

    assert_eq!(results.fourier.len(), 4);
    assert_eq!(results.raw_vfs.dim(), (HEIGHT, WIDTH));
    assert!(results.raw_vfs.iter().all(|&v| (-1.0..=1.0).contains(&v)));
    assert!(results.filtered.filtered.iter().all(|&v| (-1.0..=1.0).contains(&v)));

    // a noiseless sinusoid is maximally coherent everywhere
    assert!(results.filtered.coherence_mask.iter().all(|&m| m));
    for (&v, &m) in results.filtered.filtered.iter().zip(results.filtered.final_mask.iter()) {
        if !m {
            assert_eq!(v, 0.0);
        }
    }
    assert_eq!(results.boundaries.positive_mask.dim(), (HEIGHT, WIDTH));
}

#[test]
fn test_backends_produce_matching_sessions() {
    let inputs = synthetic_session();
    let fft = RetinotopyPipeline::new(config()).unwrap().run(&inputs).unwrap();
    let projection = RetinotopyPipeline::with_backend(config(), ProjectionBackend)
        .unwrap()
        .run(&inputs)
        .unwrap();

    for (a, b) in fft.raw_vfs.iter().zip(projection.raw_vfs.iter()) {
        assert!((a - b).abs() < 1e-6);
    }
}

#[test]
fn test_missing_direction_fails_the_run() {
    let mut inputs = synthetic_session();
    inputs.remove(&Direction::BT);
    let result = RetinotopyPipeline::new(config()).unwrap().run(&inputs);
    assert!(matches!(
        result,
        Err(retinosync_analysis::AnalysisError::MissingDirection(Direction::BT))
    ));
}

#[test]
fn test_exact_timestamp_match_assigns_event_angle() {
    let (stimulus_timestamps, angles) = stimulus_log();
    let camera: Vec<i64> = vec![stimulus_timestamps[17], stimulus_timestamps[120]];
    let labels = PhaseAssigner::assign(&camera, &stimulus_timestamps, &angles).unwrap();
    assert_eq!(labels, vec![angles[17], angles[120]]);
}

#[test]
fn test_all_zero_vfs_yields_empty_boundaries() {
    let boundary = BoundaryDetector::new(0.2)
        .unwrap()
        .detect(&Array2::zeros((HEIGHT, WIDTH)));
    assert!(boundary.is_empty());
}

#[test]
fn test_stimulus_frequency_maps_to_cycle_bin() {
    let frames = sweep_frames(Direction::LR);
    let frequency = FourierAnalyzer::<ProjectionBackend>::stimulus_frequency(CYCLES as f64, FRAMES);
    assert!((frequency * FRAMES as f64 - CYCLES as f64).abs() < 1e-12);
    let maps = FourierAnalyzer::with_backend(ProjectionBackend)
        .analyze_frames(frames.view(), frequency)
        .unwrap();
    assert!((maps.phase[[0, 0]] - injected_phase(Direction::LR, 0, 0)).abs() < 1e-6);
}
