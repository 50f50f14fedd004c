use std::f64::consts::PI;

/// Half-sine force profile of one pull, peaking at `peak`.
pub fn half_sine(length: usize, peak: f64) -> Vec<f64> {
    (0..length)
        .map(|i| ((i as f64 + 0.5) / length as f64 * PI).sin() * peak)
        .collect()
}
