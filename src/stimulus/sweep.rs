use crate::core::Direction;
use crate::params::MonitorGeometry;
use crate::stimulus::StimulusFrame;
use ndarray::Array2;
use retinosync_analysis::SweepAxis;

/// Size and timing of a generated drifting-bar sequence
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarSweep {
    pub frames: usize,
    pub bar_width_deg: f64,
    pub width: usize,
    pub height: usize,
}

/// Render a bright bar drifting across the screen in `direction`.
///
/// Pixel angles use a flat-screen projection from the eye at
/// `distance_cm`. The bar starts fully off one edge and ends fully off the
/// other; each frame carries the bar-centre angle in degrees.
pub fn generate_bar_sweep(
    direction: Direction,
    geometry: &MonitorGeometry,
    sweep: &BarSweep,
) -> Vec<(StimulusFrame, f32)> {
    if sweep.frames == 0 || sweep.width == 0 || sweep.height == 0 {
        return Vec::new();
    }

    let (span, extent_cm, pixels) = match direction.axis() {
        SweepAxis::Azimuth => (geometry.horizontal_span_deg(), geometry.width_cm, sweep.width),
        SweepAxis::Elevation => (geometry.vertical_span_deg(), geometry.height_cm, sweep.height),
    };
    // angle of each pixel row/column along the swept axis
    let pixel_angles: Vec<f64> = (0..pixels)
        .map(|i| {
            let position_cm = (i as f64 + 0.5) / pixels as f64 * extent_cm - extent_cm / 2.0;
            position_cm.atan2(geometry.distance_cm).to_degrees()
        })
        .collect();

    let half_travel = span / 2.0 + sweep.bar_width_deg / 2.0;
    let half_bar = sweep.bar_width_deg / 2.0;
    let step = if sweep.frames > 1 {
        2.0 * half_travel / (sweep.frames - 1) as f64
    } else {
        0.0
    };

    (0..sweep.frames)
        .map(|k| {
            let progress = -half_travel + step * k as f64;
            // screen rows grow downwards, so top-to-bottom runs from +elevation
            let centre = match direction {
                Direction::LR | Direction::BT => progress,
                Direction::RL | Direction::TB => -progress,
            };
            let screen_centre = match direction.axis() {
                SweepAxis::Azimuth => centre,
                SweepAxis::Elevation => -centre,
            };
            let lit: Vec<bool> = pixel_angles
                .iter()
                .map(|a| (a - screen_centre).abs() <= half_bar)
                .collect();
            let pixels = Array2::from_shape_fn((sweep.height, sweep.width), |(r, c)| {
                let on = match direction.axis() {
                    SweepAxis::Azimuth => lit[c],
                    SweepAxis::Elevation => lit[r],
                };
                if on {
                    255
                } else {
                    0
                }
            });
            (StimulusFrame::new(pixels), centre as f32)
        })
        .collect()
}
