//! Dial math: nearest station, off-tuning attenuation and effect intensity.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Channel offset at which the signal has faded to silence.
pub const SILENCE_OFFSET: f64 = 2.0;

/// Scale applied to the attenuated volume before it reaches the media element.
pub const ELEMENT_VOLUME_SCALE: f64 = 0.75;

/// Linearly map `value` from one range onto another.
///
/// With `clamp` set the result is limited to the target range, whichever way
/// round its bounds are given.
#[must_use]
pub fn map_range(value: f64, from: (f64, f64), to: (f64, f64), clamp: bool) -> f64 {
    let (from_min, from_max) = from;
    let (to_min, to_max) = to;
    let result = to_min + (value - from_min) * (to_max - to_min) / (from_max - from_min);

    if clamp {
        result.max(to_min.min(to_max)).min(to_min.max(to_max))
    } else {
        result
    }
}

/// The station a requested channel ends up on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tuned<'a, V> {
    pub frequency: u32,
    pub value: &'a V,
    /// Distance between the requested channel and `frequency`
    pub channel_offset: f64,
}

/// Find the station closest to `channel`.
///
/// An exact frequency match wins outright. Otherwise the frequency with the
/// smallest absolute distance is chosen; on a tie the first candidate in
/// ascending frequency order wins, so 90 between 88 and 92 lands on 88.
/// Returns `None` only for an empty map or a non-finite channel.
#[must_use]
pub fn nearest_station<V>(stations: &BTreeMap<u32, V>, channel: f64) -> Option<Tuned<'_, V>> {
    if !channel.is_finite() {
        return None;
    }

    let mut best: Option<Tuned<'_, V>> = None;
    for (frequency, value) in stations {
        let channel_offset = (f64::from(*frequency) - channel).abs();
        if best.as_ref().is_none_or(|b| channel_offset < b.channel_offset) {
            best = Some(Tuned {
                frequency: *frequency,
                value,
                channel_offset,
            });
        }
    }

    best
}

/// Volume after off-tuning attenuation: full `volume` on the station, fading
/// linearly to zero at [`SILENCE_OFFSET`].
#[must_use]
pub fn offset_volume(channel_offset: f64, volume: f64) -> f64 {
    let attenuated = map_range(channel_offset, (0.0, SILENCE_OFFSET), (volume, 0.0), false);
    attenuated.min(volume).max(0.0)
}

/// Volume to set on the media element itself.
#[must_use]
pub fn element_volume(channel_offset: f64, volume: f64) -> f64 {
    offset_volume(channel_offset, volume) * ELEMENT_VOLUME_SCALE
}

/// Parameters pushed to the external static-simulation effects graph.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectParams {
    /// Distortion amount, 0-1
    pub distortion: f64,
    /// Static noise level, 0-1
    pub noise: f64,
    /// Lowpass opening, 0-1 (1 = widest bandwidth)
    pub lowpass: f64,
    /// Highpass cutoff multiplier; large values thin out the bass
    pub highpass: f64,
    /// Reverb send, 0-1
    pub reverb: f64,
    /// Frequency drift amount, 0-1
    pub tuning_drift: f64,
    /// How strongly noise follows the signal level, 0-1
    pub signal_modulation: f64,
}

impl EffectParams {
    /// Effects for a given off-tuning distance and bass control.
    #[must_use]
    pub fn for_tuning(channel_offset: f64, bass: f64) -> Self {
        Self {
            distortion: map_range(channel_offset, (0.0, 1.0), (0.05, 0.8), true),
            noise: map_range(channel_offset, (0.5, 3.0), (0.0, 0.015), true),
            lowpass: 1.0,
            highpass: map_range(bass, (0.0, 1.0), (10.0, 0.1), false),
            reverb: 0.1,
            tuning_drift: 0.6,
            signal_modulation: 0.8,
        }
    }
}
