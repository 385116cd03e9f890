// src/analysis.rs
//! Normalization and the three grip metrics derived from it.
//!
//! - insertion: mean engagement across all channels
//! - focus: how concentrated the engagement is on few channels
//! - center: engagement-weighted position along the shaft (0 = base, 1 = tip)
use crate::calibration::CalibrationProfile;
use crate::drivers::{ChannelSampler, LinkError};
use crate::types::{MetricsSnapshot, NormalizedVector};

pub const DEFAULT_ACTIVE_THRESHOLD: f32 = 0.1;

/// `(raw - offset) / scale`, clamped to [0.0, 1.0] per channel.
///
/// 0.0 is untouched, 1.0 is the strongest touch seen during calibration.
pub fn normalize(raw: &[u32], profile: &CalibrationProfile) -> NormalizedVector {
    raw.iter()
        .zip(profile.offsets().iter().zip(profile.scales()))
        .map(|(value, (offset, scale))| {
            let v = (*value as f64 - *offset as f64) / (*scale).max(1) as f64;
            v.clamp(0.0, 1.0) as f32
        })
        .collect()
}

/// Mean of all normalized values; 0.0 for an empty vector.
pub fn insertion(normalized: &[f32]) -> f32 {
    if normalized.is_empty() {
        return 0.0;
    }
    normalized.iter().sum::<f32>() / normalized.len() as f32
}

/// Spread between the most and least engaged channel, scaled by how few channels are active.
///
/// Uniform engagement (no spread) and no engagement at all both give 0.0.
pub fn focus(normalized: &[f32], active_threshold: f32) -> f32 {
    let n = normalized.len();
    if n == 0 {
        return 0.0;
    }
    let max_val = normalized.iter().copied().fold(f32::MIN, f32::max);
    if max_val < active_threshold {
        return 0.0;
    }
    let min_val = normalized.iter().copied().fold(f32::MAX, f32::min);
    let spread = max_val - min_val;
    let num_active = normalized.iter().filter(|v| **v >= active_threshold).count();
    // 1.0 with a single active channel, 0.0 with all of them
    let concentration = if n > 1 {
        1.0 - (num_active - 1) as f32 / (n - 1) as f32
    } else {
        1.0
    };
    spread * concentration
}

/// Weighted mean position of the activity. `None` when there is nothing to locate.
pub fn center_of_activity(normalized: &[f32]) -> Option<f32> {
    match normalized.len() {
        0 => None,
        1 => Some(0.0),
        n => {
            let total: f32 = normalized.iter().sum();
            if total == 0.0 {
                return None;
            }
            let last = (n - 1) as f32;
            let weighted: f32 = normalized
                .iter()
                .enumerate()
                .map(|(i, v)| (i as f32 / last) * v)
                .sum();
            Some((weighted / total).clamp(0.0, 1.0))
        }
    }
}

/// Applies a calibration profile to raw vectors and derives the metrics.
#[derive(Clone, Debug)]
pub struct TouchAnalyzer {
    profile: CalibrationProfile,
    active_threshold: f32,
}
impl TouchAnalyzer {
    pub fn new(profile: CalibrationProfile, active_threshold: f32) -> Self {
        Self {
            profile,
            active_threshold,
        }
    }
    pub fn channel_count(&self) -> usize {
        self.profile.channel_count()
    }
    #[cfg(test)]
    pub fn profile(&self) -> &CalibrationProfile {
        &self.profile
    }
    /// Swaps in a freshly computed profile as a whole.
    #[cfg(test)]
    pub fn set_profile(&mut self, profile: CalibrationProfile) -> Result<(), LinkError> {
        profile.validate(self.channel_count())?;
        self.profile = profile;
        Ok(())
    }
    #[cfg(test)]
    pub fn active_threshold(&self) -> f32 {
        self.active_threshold
    }
    pub fn normalize(&self, raw: &[u32]) -> Result<NormalizedVector, LinkError> {
        if raw.len() != self.channel_count() {
            return Err(LinkError::ChannelMismatch {
                expected: self.channel_count(),
                actual: raw.len(),
            });
        }
        Ok(normalize(raw, &self.profile))
    }
    pub fn analyze(&self, raw: &[u32]) -> Result<MetricsSnapshot, LinkError> {
        let normalized = self.normalize(raw)?;
        Ok(MetricsSnapshot {
            insertion: insertion(&normalized),
            focus: focus(&normalized, self.active_threshold),
            center: center_of_activity(&normalized),
            normalized,
        })
    }
    /// Reads one sample and analyzes it.
    pub fn read_and_analyze<S: ChannelSampler>(
        &self,
        sampler: &mut S,
    ) -> Result<MetricsSnapshot, LinkError> {
        let raw = sampler.read()?;
        self.analyze(&raw)
    }
}
