// SPDX-License-Identifier: CEPL-1.0
use std::f64::consts::PI;

/// Frames per full pulse of the background clear color.
pub const BACKGROUND_PERIOD_FRAMES: u64 = 120;

/// Clear color for the background pass: a blue channel pulsing with
/// `|sin(pi * frame / 120)|`, so it is dark at every multiple of 120 frames
/// and fully lit halfway between.
pub fn background_color(frame: u64) -> [f32; 4] {
    // Reduce first so the phase keeps full precision for long sessions.
    let phase = (frame % BACKGROUND_PERIOD_FRAMES) as f64 / BACKGROUND_PERIOD_FRAMES as f64;
    let flash = (phase * PI).sin().abs() as f32;
    [0.0, 0.0, flash, 1.0]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn period_is_120_frames() {
        let a = background_color(0);
        let b = background_color(120);
        for (x, y) in a.iter().zip(b.iter()) {
            assert_abs_diff_eq!(*x, *y, epsilon = 1e-6);
        }
    }

    #[test]
    fn peaks_halfway_through_the_period() {
        assert_abs_diff_eq!(background_color(60)[2], 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(background_color(0)[2], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn only_blue_channel_varies() {
        for frame in [1, 17, 59, 61, 119, 1_000_003] {
            let c = background_color(frame);
            assert_eq!(c[0], 0.0);
            assert_eq!(c[1], 0.0);
            assert_eq!(c[3], 1.0);
            assert!((0.0..=1.0).contains(&c[2]));
        }
    }

    #[test]
    fn stays_periodic_for_large_counters() {
        let far = 120 * 50_000_000;
        assert_abs_diff_eq!(
            background_color(far + 30)[2],
            background_color(30)[2],
            epsilon = 1e-6
        );
    }
}
