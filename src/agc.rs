//! Automatic gain control for the world camera.
//!
//! A damped multiplicative controller that holds the scene mean at the
//! midpoint of the 8-bit range. Exposure carries the correction for as
//! long as the sensor allows; whatever the exposure clamp cannot express
//! rolls into analogue gain. With the damping factor below 1 the loop
//! approaches the target from one side and settles within a couple of
//! seconds at the 250 ms update cadence, without oscillating.

/// Damping applied to each correction step.
pub const SPEED: f64 = 0.95;

/// Exposure range supported by the sensor, in microseconds. The upper
/// bound is the longest exposure that still sustains the frame rate.
pub const EXPOSURE_MIN_US: i32 = 37;
pub const EXPOSURE_MAX_US: i32 = 4839;

/// Analogue gain range supported by the sensor.
pub const GAIN_MIN: f32 = 1.0;
pub const GAIN_MAX: f32 = 10.666;

/// Mean-intensity target: the midpoint of the 8-bit pixel range.
const TARGET: f64 = 128.0;

/// The exposure and gain applied to every capture request.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AgcSettings {
    pub gain: f32,
    pub exposure_us: i32,
}

impl AgcSettings {
    /// Starting point for a recording: unity gain, short exposure.
    pub fn initial() -> Self {
        Self {
            gain: GAIN_MIN,
            exposure_us: 100,
        }
    }
}

/// One controller step given the mean intensity of the latest frame.
pub fn adjust(settings: AgcSettings, mean: f64, speed: f64) -> AgcSettings {
    // A black frame would ask for an infinite correction.
    let mean = mean.max(1.0);
    let correction = 1.0 + speed * (TARGET / mean - 1.0);

    let wanted_exposure = settings.exposure_us as f64 * correction;
    let exposure_us =
        (wanted_exposure.round() as i32).clamp(EXPOSURE_MIN_US, EXPOSURE_MAX_US);

    // Whatever part of the correction the exposure clamp ate moves to gain.
    let applied = exposure_us as f64 / settings.exposure_us as f64;
    let residue = correction / applied;
    let gain = ((settings.gain as f64 * residue) as f32).clamp(GAIN_MIN, GAIN_MAX);

    AgcSettings { gain, exposure_us }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Linear scene model: mean intensity proportional to gain times
    /// exposure, saturating like the sensor does.
    fn scene_mean(luminance: f64, s: AgcSettings) -> f64 {
        (luminance * s.gain as f64 * s.exposure_us as f64).min(255.0)
    }

    fn run_loop(luminance: f64, mut s: AgcSettings, steps: usize) -> (AgcSettings, Vec<f64>) {
        let mut means = Vec::new();
        for _ in 0..steps {
            let mean = scene_mean(luminance, s);
            means.push(mean);
            s = adjust(s, mean, SPEED);
        }
        (s, means)
    }

    #[test]
    fn test_converges_from_dark() {
        // Target needs gain * exposure = 12800, reachable mid-range.
        let (s, means) = run_loop(0.01, AgcSettings::initial(), 20);
        let final_mean = scene_mean(0.01, s);
        assert!(
            (final_mean - 128.0).abs() / 128.0 < 0.1,
            "did not settle: {final_mean}"
        );
        // Approach from below stays monotonic once past the first step.
        for pair in means.windows(2) {
            assert!(pair[1] >= pair[0] - 128.0 * 0.1);
        }
    }

    #[test]
    fn test_converges_from_bright() {
        let start = AgcSettings {
            gain: 8.0,
            exposure_us: 4000,
        };
        let (s, _) = run_loop(0.01, start, 20);
        let final_mean = scene_mean(0.01, s);
        assert!((final_mean - 128.0).abs() / 128.0 < 0.1);
    }

    #[test]
    fn test_no_oscillation_once_settled() {
        let (s, _) = run_loop(0.01, AgcSettings::initial(), 20);
        let (_, means) = run_loop(0.01, s, 10);
        for mean in means {
            assert!((mean - 128.0).abs() < 128.0 * 0.1);
        }
    }

    #[test]
    fn test_exposure_saturates_before_gain_moves() {
        // Dim scene: even the longest exposure is not enough at unity
        // gain, so the clamp residue must flow into gain.
        let (s, _) = run_loop(0.005, AgcSettings::initial(), 20);
        assert_eq!(s.exposure_us, EXPOSURE_MAX_US);
        assert!(s.gain > GAIN_MIN);
        let final_mean = scene_mean(0.005, s);
        assert!((final_mean - 128.0).abs() / 128.0 < 0.1);
    }

    #[test]
    fn test_limits_respected_in_the_extremes() {
        // Pitch black: everything pegs at maximum.
        let mut s = AgcSettings::initial();
        for _ in 0..30 {
            s = adjust(s, 1.0, SPEED);
        }
        assert_eq!(s.exposure_us, EXPOSURE_MAX_US);
        assert_eq!(s.gain, GAIN_MAX);

        // Blinding: everything pegs at minimum.
        for _ in 0..30 {
            s = adjust(s, 255.0, SPEED);
        }
        assert_eq!(s.exposure_us, EXPOSURE_MIN_US);
        assert_eq!(s.gain, GAIN_MIN);
    }
}
