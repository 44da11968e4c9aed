// Wheel encoder tick conversion
// Converts raw tick deltas into wheel rotation angles (radians).

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use super::OdometryError;

/// One wheel's encoder sample pair plus its resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderReading {
    pub ticks: i64,
    pub prev_ticks: i64,
    pub resolution: u32, // ticks per full wheel revolution, must be > 0
}

impl EncoderReading {
    pub fn new(ticks: i64, prev_ticks: i64, resolution: u32) -> Self {
        Self {
            ticks,
            prev_ticks,
            resolution,
        }
    }

    /// Same as [`delta_phi`] on this reading
    pub fn delta_phi(&self) -> (f64, i64) {
        delta_phi(self.ticks, self.prev_ticks, self.resolution)
    }
}

/// Convert a tick delta into wheel rotation
///
/// # Arguments
/// * `ticks` - Current tick count
/// * `prev_ticks` - Previous tick count
/// * `resolution` - Ticks per full wheel revolution
///
/// # Returns
/// `(dphi, delta_ticks)`: signed rotation in radians and the raw signed tick difference.
///
/// `resolution` must be non-zero; a zero resolution yields a non-finite angle.
/// Counter wraparound is not handled here, see [`unwrap_ticks`].
pub fn delta_phi(ticks: i64, prev_ticks: i64, resolution: u32) -> (f64, i64) {
    let delta_ticks = ticks - prev_ticks;
    let radians_per_tick = 2.0 * PI / resolution as f64;
    let dphi = delta_ticks as f64 * radians_per_tick;

    (dphi, delta_ticks)
}

/// Adjust `ticks` from a fixed-width counter so that `result - prev_ticks`
/// is the shortest signed distance modulo `2^counter_bits`.
///
/// Only `prev_ticks` keeps its absolute value; the result is continuous with it.
/// Returns `None` when the adjusted count does not fit in an `i64`.
/// `counter_bits` must be in the range accepted by [`validate_counter_bits`].
pub fn unwrap_ticks(ticks: i64, prev_ticks: i64, counter_bits: u32) -> Option<i64> {
    let modulus = 1i64 << counter_bits;
    let half = modulus / 2;

    // 2^64 is a multiple of the modulus, so the wrapped difference is exact mod 2^bits
    let mut delta = ticks.wrapping_sub(prev_ticks).rem_euclid(modulus);
    if delta >= half {
        delta -= modulus;
    }

    prev_ticks.checked_add(delta)
}

/// Range of counter widths accepted by [`unwrap_ticks`]
pub fn validate_counter_bits(counter_bits: u32) -> Result<u32, OdometryError> {
    if (1..=62).contains(&counter_bits) {
        Ok(counter_bits)
    } else {
        Err(OdometryError::InvalidCounterBits(counter_bits))
    }
}
