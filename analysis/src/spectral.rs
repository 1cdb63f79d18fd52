use ndarray::{Array2, Axis};
use rustfft::{num_complex::Complex, FftDirection, FftPlanner};

pub type Complex64 = Complex<f64>;

/// Lift a real map into the complex plane
pub fn to_complex(map: &Array2<f64>) -> Array2<Complex64> {
    map.mapv(|v| Complex64::new(v, 0.0))
}

/// 2-D discrete Fourier transform, rows first then columns.
///
/// The inverse transform is scaled by `1 / (rows * cols)` so that
/// `fft2(fft2(x, Forward), Inverse) == x` up to rounding.
pub fn fft2(data: &Array2<Complex64>, direction: FftDirection) -> Array2<Complex64> {
    let (rows, cols) = data.dim();
    let mut out = data.to_owned();
    if rows == 0 || cols == 0 {
        return out;
    }

    let mut planner = FftPlanner::new();
    transform_lanes(&mut out, Axis(1), planner.plan_fft(cols, direction).as_ref());
    transform_lanes(&mut out, Axis(0), planner.plan_fft(rows, direction).as_ref());

    if direction == FftDirection::Inverse {
        let scale = 1.0 / (rows * cols) as f64;
        out.mapv_inplace(|v| v * scale);
    }
    out
}

fn transform_lanes(data: &mut Array2<Complex64>, axis: Axis, fft: &dyn rustfft::Fft<f64>) {
    let len = data.len_of(axis);
    let mut buffer = vec![Complex64::new(0.0, 0.0); len];
    let mut scratch = vec![Complex64::new(0.0, 0.0); fft.get_inplace_scratch_len()];

    for mut lane in data.lanes_mut(axis) {
        for (slot, value) in buffer.iter_mut().zip(lane.iter()) {
            *slot = *value;
        }
        fft.process_with_scratch(&mut buffer, &mut scratch);
        for (value, slot) in lane.iter_mut().zip(buffer.iter()) {
            *value = *slot;
        }
    }
}
