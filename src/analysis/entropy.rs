//! Shannon Entropy Calculation
//!
//! Global, windowed, and rate entropy over binary blobs, plus the
//! [`EntropyProfile`] builder used by the profiling stage and the
//! synchronous detection endpoint.

use crate::types::EntropyProfile;
use statrs::statistics::Statistics;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EntropyError {
    #[error("input data is empty")]
    EmptyInput,
    #[error("window size must be positive")]
    InvalidWindow,
    #[error("step size must be positive")]
    InvalidStep,
}

/// Shannon entropy calculator for byte streams.
///
/// Stateless — all methods are pure functions of their input.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntropyCalculator;

impl EntropyCalculator {
    /// Shannon entropy H(X) of the byte distribution, in bits per byte.
    ///
    /// H(X) = -Σ p(x) · log2 p(x). O(n) over the input.
    pub fn calculate(&self, data: &[u8]) -> Result<f64, EntropyError> {
        if data.is_empty() {
            return Err(EntropyError::EmptyInput);
        }

        let mut counts = [0u64; 256];
        for &b in data {
            counts[b as usize] += 1;
        }

        let len = data.len() as f64;
        let entropy = counts
            .iter()
            .filter(|&&c| c > 0)
            .map(|&c| {
                let p = c as f64 / len;
                -p * p.log2()
            })
            .sum();

        Ok(entropy)
    }

    /// Entropy over a sliding window of `window` bytes advanced by `step`.
    ///
    /// Returns an empty vector when the input is shorter than the window
    /// (zero complete windows fit).
    pub fn calculate_windowed(
        &self,
        data: &[u8],
        window: usize,
        step: usize,
    ) -> Result<Vec<f64>, EntropyError> {
        if data.is_empty() {
            return Err(EntropyError::EmptyInput);
        }
        if window == 0 {
            return Err(EntropyError::InvalidWindow);
        }
        if step == 0 {
            return Err(EntropyError::InvalidStep);
        }
        if window > data.len() {
            return Ok(Vec::new());
        }

        let mut entropies = Vec::with_capacity((data.len() - window) / step + 1);
        let mut offset = 0;
        while offset + window <= data.len() {
            entropies.push(self.calculate(&data[offset..offset + window])?);
            offset += step;
        }
        Ok(entropies)
    }

    /// Entropy rate (bits per byte). For an IID source this equals H(X).
    pub fn entropy_rate(&self, data: &[u8]) -> Result<f64, EntropyError> {
        self.calculate(data)
    }
}

/// Build the full [`EntropyProfile`] for a blob.
///
/// Inputs shorter than `window` are profiled with a window shrunk to the
/// input length, so small blobs still produce one windowed sample.
pub fn build_profile(
    data: &[u8],
    window: usize,
    step: usize,
) -> Result<EntropyProfile, EntropyError> {
    let calc = EntropyCalculator;
    let global = calc.calculate(data)?;
    let rate = calc.entropy_rate(data)?;

    let (window, step) = if data.len() < window {
        (data.len().max(1), data.len().max(1))
    } else {
        (window, step)
    };

    let windowed = calc.calculate_windowed(data, window, step)?;

    let (mean, variance, min, max) = if windowed.is_empty() {
        (0.0, 0.0, 0.0, 0.0)
    } else {
        let mean = windowed.as_slice().mean();
        let variance = if windowed.len() > 1 {
            windowed.as_slice().variance()
        } else {
            0.0
        };
        (mean, variance, windowed.as_slice().min(), windowed.as_slice().max())
    };

    Ok(EntropyProfile {
        global_entropy: global,
        entropy_rate: rate,
        windowed_entropy_mean: mean,
        windowed_entropy_variance: variance,
        windowed_entropy_min: min,
        windowed_entropy_max: max,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_rejected() {
        assert_eq!(
            EntropyCalculator.calculate(&[]),
            Err(EntropyError::EmptyInput)
        );
        assert_eq!(build_profile(&[], 256, 128), Err(EntropyError::EmptyInput));
    }

    #[test]
    fn constant_bytes_have_zero_entropy() {
        let data = vec![0u8; 1024];
        let h = EntropyCalculator.calculate(&data).unwrap();
        assert!(h.abs() < 1e-12);
    }

    #[test]
    fn uniform_bytes_approach_eight_bits() {
        let data: Vec<u8> = (0..=255).cycle().take(4096).map(|b: u16| b as u8).collect();
        let h = EntropyCalculator.calculate(&data).unwrap();
        assert!((h - 8.0).abs() < 1e-9, "uniform entropy was {h}");
    }

    #[test]
    fn windowed_smaller_than_window_yields_nothing() {
        let data = vec![1u8; 16];
        let windows = EntropyCalculator
            .calculate_windowed(&data, 256, 128)
            .unwrap();
        assert!(windows.is_empty());
    }

    #[test]
    fn profile_of_small_constant_blob() {
        // Ten zero bytes -> minimal entropy profile.
        let profile = build_profile(&[0u8; 10], 256, 128).unwrap();
        assert!(profile.global_entropy.abs() < 1e-12);
        assert!(profile.windowed_entropy_mean.abs() < 1e-12);
        assert_eq!(profile.windowed_entropy_variance, 0.0);
    }

    #[test]
    fn profile_windowed_stats_are_consistent() {
        let mut data = vec![0u8; 512];
        data.extend((0..=255).map(|b: u16| b as u8).cycle().take(512));
        let profile = build_profile(&data, 256, 128).unwrap();
        assert!(profile.windowed_entropy_min <= profile.windowed_entropy_mean);
        assert!(profile.windowed_entropy_mean <= profile.windowed_entropy_max);
        assert!(profile.windowed_entropy_variance > 0.0);
    }
}
