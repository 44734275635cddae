use std::ops::RangeInclusive;

use rand::Rng;

#[derive(Debug, Clone)]
pub struct AugmentConfig {
    pub gain_db: RangeInclusive<f32>,
    pub snr_db: RangeInclusive<f32>,
    pub flip_probability: f64,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            gain_db: -6.0..=6.0,
            snr_db: 10.0..=40.0,
            flip_probability: 0.5,
        }
    }
}

pub fn apply_gain(samples: &mut [f32], gain_db: f32) {
    let factor = 10f32.powf(gain_db / 20.0);
    samples.iter_mut().for_each(|s| *s *= factor);
}

fn mean_power(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32
}

/// Adds uniform white noise scaled so the result has the requested SNR.
pub fn add_noise(samples: &mut [f32], snr_db: f32, rng: &mut impl Rng) {
    let noise_power = mean_power(samples) / 10f32.powf(snr_db / 10.0);
    if noise_power <= 0.0 {
        return;
    }

    // uniform on [-a, a] has variance a^2 / 3
    let amplitude = (3.0 * noise_power).sqrt();
    samples
        .iter_mut()
        .for_each(|s| *s += rng.gen_range(-amplitude..=amplitude));
}

pub fn augment(samples: &mut [f32], config: &AugmentConfig, rng: &mut impl Rng) {
    apply_gain(samples, rng.gen_range(config.gain_db.clone()));
    add_noise(samples, rng.gen_range(config.snr_db.clone()), rng);

    if rng.gen_bool(config.flip_probability) {
        samples.iter_mut().for_each(|s| *s = -*s);
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    fn sine(len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (i as f32 * 0.05).sin() * 0.5)
            .collect()
    }

    #[test]
    fn gain_in_decibels() {
        let mut samples = vec![1.0, -0.5];
        apply_gain(&mut samples, 20.0);

        assert!((samples[0] - 10.0).abs() < 1e-4);
        assert!((samples[1] + 5.0).abs() < 1e-4);
    }

    #[test]
    fn noise_matches_requested_snr() {
        let mut rng = StdRng::seed_from_u64(1);
        let clean = sine(16_000);
        let mut noisy = clean.clone();

        add_noise(&mut noisy, 20.0, &mut rng);

        let noise = noisy.iter().zip(&clean).map(|(n, c)| n - c).collect::<Vec<_>>();
        let snr = 10.0 * (mean_power(&clean) / mean_power(&noise)).log10();
        assert!((snr - 20.0).abs() < 0.5, "snr {snr}");
    }

    #[test]
    fn silence_stays_silent() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut samples = vec![0.0; 32];

        augment(&mut samples, &AugmentConfig::default(), &mut rng);

        assert!(samples.iter().all(|s| *s == 0.0));
    }
}
