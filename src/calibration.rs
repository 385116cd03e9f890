// src/calibration.rs
//! Two calibration strategies:
//!
//! - [`BaselineAverager`]: the display node averages the first few frames it
//!   receives and reports everything after that as a signed delta.
//! - [`CalibrationEngine`]: rest/handle calibration that extracts a per-channel
//!   offset and scale and persists them as the [`CalibrationProfile`].
use std::time::Duration;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use crate::drivers::{ChannelSampler, Clock, KeyValueStore, LinkError};
use crate::types::{ChannelVector, RelativeVector};

/// Per-channel idle offset and dynamic range. Every scale is at least 1.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationProfile {
    offsets: Vec<u32>,
    scales: Vec<u32>,
}
impl CalibrationProfile {
    #[cfg(test)]
    pub fn new(offsets: Vec<u32>, scales: Vec<u32>) -> Result<Self, LinkError> {
        let profile = Self { offsets, scales };
        profile.validate(profile.offsets.len())?;
        Ok(profile)
    }
    /// `offset = 0`, `scale = 1` for every channel.
    pub fn uncalibrated(channel_count: usize) -> Self {
        Self {
            offsets: vec![0; channel_count],
            scales: vec![1; channel_count],
        }
    }
    /// Builds a profile from the rest-phase minimums and handle-phase maximums.
    ///
    /// A channel whose maximum never rose above its rest minimum gets `scale = 1`.
    pub fn from_extremes(rest_mins: &[u32], handle_maxs: &[u32]) -> Result<Self, LinkError> {
        if rest_mins.len() != handle_maxs.len() {
            return Err(LinkError::ChannelMismatch {
                expected: rest_mins.len(),
                actual: handle_maxs.len(),
            });
        }
        let scales = rest_mins
            .iter()
            .zip(handle_maxs)
            .map(|(min, max)| max.saturating_sub(*min).max(1))
            .collect();
        Ok(Self {
            offsets: rest_mins.to_vec(),
            scales,
        })
    }
    pub fn channel_count(&self) -> usize {
        self.offsets.len()
    }
    pub fn offsets(&self) -> &[u32] {
        &self.offsets
    }
    pub fn scales(&self) -> &[u32] {
        &self.scales
    }
    pub fn validate(&self, channel_count: usize) -> Result<(), LinkError> {
        if self.offsets.len() != channel_count || self.scales.len() != channel_count {
            return Err(LinkError::InvalidProfile(format!(
                "expected {channel_count} offsets and scales, found {} and {}",
                self.offsets.len(),
                self.scales.len()
            )));
        }
        if let Some(idx) = self.scales.iter().position(|s| *s == 0) {
            return Err(LinkError::InvalidProfile(format!("channel {idx} has zero scale")));
        }
        Ok(())
    }
    pub fn to_bytes(&self) -> Result<Vec<u8>, LinkError> {
        Ok(serde_json::to_vec(self)?)
    }
    pub fn from_bytes(bytes: &[u8], channel_count: usize) -> Result<Self, LinkError> {
        let profile: Self = serde_json::from_slice(bytes)
            .map_err(|e| LinkError::InvalidProfile(e.to_string()))?;
        profile.validate(channel_count)?;
        Ok(profile)
    }
}

/// Reads and writes the profile under a single fixed key.
pub struct ProfileStore<K: KeyValueStore> {
    store: K,
    key: String,
    channel_count: usize,
}
impl<K: KeyValueStore> ProfileStore<K> {
    pub fn new(store: K, key: &str, channel_count: usize) -> Self {
        Self {
            store,
            key: key.to_string(),
            channel_count,
        }
    }
    #[cfg(test)]
    pub fn inner(&self) -> &K {
        &self.store
    }
    /// `Ok(None)` if nothing has been saved yet.
    pub fn load(&self) -> Result<Option<CalibrationProfile>, LinkError> {
        match self.store.load(&self.key)? {
            Some(bytes) => CalibrationProfile::from_bytes(&bytes, self.channel_count).map(Some),
            None => Ok(None),
        }
    }
    /// Never fails: anything short of a valid stored profile yields the uncalibrated default.
    pub fn load_or_default(&self) -> CalibrationProfile {
        match self.load() {
            Ok(Some(profile)) => {
                info!("Calibration loaded from {}.", self.key);
                profile
            }
            Ok(None) => {
                info!("No calibration found at {}; using defaults.", self.key);
                CalibrationProfile::uncalibrated(self.channel_count)
            }
            Err(e) => {
                warn!("No valid calibration found ({e}); using defaults.");
                CalibrationProfile::uncalibrated(self.channel_count)
            }
        }
    }
    pub fn save(&mut self, profile: &CalibrationProfile) -> Result<(), LinkError> {
        let bytes = profile.to_bytes()?;
        self.store.save(&self.key, &bytes)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CalibrationTiming {
    pub rest: Duration,
    pub handle: Duration,
    pub interval: Duration,
}
impl Default for CalibrationTiming {
    fn default() -> Self {
        Self {
            rest: Duration::from_millis(3000),
            handle: Duration::from_millis(10_000),
            interval: Duration::from_millis(50),
        }
    }
}

/// Samples every `interval` until `duration` has elapsed, trying at least once.
///
/// Faulty reads are skipped; a phase without a single usable sample fails.
fn run_phase<S: ChannelSampler, C: Clock>(
    sampler: &mut S,
    clock: &mut C,
    duration: Duration,
    interval: Duration,
    mut fold: impl FnMut(&[u32]),
) -> Result<usize, LinkError> {
    let start = clock.now_ms();
    let budget = duration.as_millis() as u64;
    let mut samples = 0;
    loop {
        match sampler.read() {
            Ok(raw) if raw.len() == sampler.channel_count() => {
                fold(&raw);
                samples += 1;
            }
            Ok(raw) => warn!("Calibration sample skipped: {} values", raw.len()),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => warn!("Calibration sample skipped: {e}"),
        }
        if clock.now_ms().saturating_sub(start) >= budget {
            break;
        }
        clock.sleep(interval);
        if clock.now_ms().saturating_sub(start) >= budget {
            break;
        }
    }
    if samples == 0 {
        return Err(LinkError::Sampler(format!(
            "no usable sample in a {} ms phase",
            budget
        )));
    }
    Ok(samples)
}

/// Rest/handle calibration owning the session's [`CalibrationProfile`].
pub struct CalibrationEngine<K: KeyValueStore> {
    store: ProfileStore<K>,
    profile: CalibrationProfile,
    timing: CalibrationTiming,
}
impl<K: KeyValueStore> CalibrationEngine<K> {
    /// Loads the persisted profile, falling back to defaults.
    pub fn new(store: ProfileStore<K>, timing: CalibrationTiming) -> Self {
        let profile = store.load_or_default();
        Self {
            store,
            profile,
            timing,
        }
    }
    #[cfg(test)]
    pub fn profile(&self) -> &CalibrationProfile {
        &self.profile
    }
    #[cfg(test)]
    pub fn store(&self) -> &ProfileStore<K> {
        &self.store
    }
    /// Runs both phases, replaces the in-memory profile, then persists it.
    ///
    /// A sampling failure leaves the previous profile untouched. A storage failure is
    /// returned, but the new profile stays in effect for this session.
    pub fn calibrate<S: ChannelSampler, C: Clock>(
        &mut self,
        sampler: &mut S,
        clock: &mut C,
    ) -> Result<&CalibrationProfile, LinkError> {
        let n = self.profile.channel_count();
        if sampler.channel_count() != n {
            return Err(LinkError::ChannelMismatch {
                expected: n,
                actual: sampler.channel_count(),
            });
        }
        let timing = self.timing;

        let mut rest_mins = vec![u32::MAX; n];
        info!(
            "Phase 1 ({} s): set the device down - do not touch it.",
            timing.rest.as_secs()
        );
        run_phase(sampler, clock, timing.rest, timing.interval, |raw| {
            for (min, v) in rest_mins.iter_mut().zip(raw) {
                *min = (*min).min(*v);
            }
        })?;

        let mut handle_maxs = vec![0u32; n];
        info!(
            "Phase 2 ({} s): handle the device now.",
            timing.handle.as_secs()
        );
        run_phase(sampler, clock, timing.handle, timing.interval, |raw| {
            for (max, v) in handle_maxs.iter_mut().zip(raw) {
                *max = (*max).max(*v);
            }
        })?;

        self.profile = CalibrationProfile::from_extremes(&rest_mins, &handle_maxs)?;
        info!("Calibration done.");
        info!("  offsets: {:?}", self.profile.offsets());
        info!("  scales:  {:?}", self.profile.scales());

        match self.store.save(&self.profile) {
            Ok(()) => {
                info!("Calibration saved.");
                Ok(&self.profile)
            }
            Err(e) => {
                warn!("Calibration kept for this session only: {e}");
                Err(e)
            }
        }
    }
}

/// Reference frame captured from the first frames of a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReferenceBaseline {
    values: Vec<u32>,
}
impl ReferenceBaseline {
    pub fn values(&self) -> &[u32] {
        &self.values
    }
    /// `raw[i] - baseline[i]`, signed and unclamped.
    pub fn relative(&self, raw: &[u32]) -> Result<RelativeVector, LinkError> {
        if raw.len() != self.values.len() {
            return Err(LinkError::ChannelMismatch {
                expected: self.values.len(),
                actual: raw.len(),
            });
        }
        Ok(raw
            .iter()
            .zip(&self.values)
            .map(|(v, base)| *v as i64 - *base as i64)
            .collect())
    }
}

/// Sums the first `frames` vectors and yields their truncated mean.
pub struct BaselineAverager {
    sums: Vec<u64>,
    seen: usize,
    frames: usize,
}
impl BaselineAverager {
    pub fn new(channel_count: usize, frames: usize) -> Self {
        Self {
            sums: vec![0; channel_count],
            seen: 0,
            frames: frames.max(1),
        }
    }
    #[cfg(test)]
    pub fn seen(&self) -> usize {
        self.seen
    }
    /// Returns the baseline once the last required frame has been pushed.
    pub fn push(&mut self, raw: &ChannelVector) -> Result<Option<ReferenceBaseline>, LinkError> {
        if raw.len() != self.sums.len() {
            return Err(LinkError::ChannelMismatch {
                expected: self.sums.len(),
                actual: raw.len(),
            });
        }
        if self.seen >= self.frames {
            return Ok(None);
        }
        for (sum, v) in self.sums.iter_mut().zip(raw) {
            *sum += *v as u64;
        }
        self.seen += 1;
        if self.seen < self.frames {
            return Ok(None);
        }
        let frames = self.frames as u64;
        Ok(Some(ReferenceBaseline {
            values: self.sums.iter().map(|sum| (sum / frames) as u32).collect(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::{ManualClock, ManualSampler, MemoryStore};
    const KEY: &str = "calibration.json";
    fn timing() -> CalibrationTiming {
        CalibrationTiming {
            rest: Duration::from_millis(100),
            handle: Duration::from_millis(100),
            interval: Duration::from_millis(50),
        }
    }
    #[test]
    fn extremes_floor_scale_at_one() {
        let profile = CalibrationProfile::from_extremes(&[50, 60, 55], &[300, 40, 55]).unwrap();
        assert_eq!(profile.offsets(), &[50, 60, 55]);
        assert_eq!(profile.scales(), &[250, 1, 1]);
    }
    #[test]
    fn profile_rejects_zero_scale_and_wrong_length() {
        assert!(CalibrationProfile::new(vec![0, 0], vec![1, 0]).is_err());
        let profile = CalibrationProfile::uncalibrated(3);
        assert!(profile.validate(9).is_err());
        assert!(profile.validate(3).is_ok());
    }
    #[test]
    fn profile_round_trips_through_store() {
        let profile = CalibrationProfile::new(
            vec![28_000, 27_500, 29_100, 30_000, 28_800, 27_000, 26_500, 29_900, 31_000],
            vec![12_000, 1, 9_000, 15_500, 14_000, 13_200, 1, 8_000, 20_000],
        )
        .unwrap();
        let mut store = ProfileStore::new(MemoryStore::new(), KEY, 9);
        store.save(&profile).unwrap();
        assert_eq!(store.load().unwrap(), Some(profile));
    }
    #[test]
    fn stored_record_uses_named_fields() {
        let mut store = ProfileStore::new(MemoryStore::new(), KEY, 2);
        store
            .save(&CalibrationProfile::new(vec![1, 2], vec![3, 4]).unwrap())
            .unwrap();
        let json: serde_json::Value =
            serde_json::from_slice(store.inner().get(KEY).unwrap()).unwrap();
        assert_eq!(json["offsets"], serde_json::json!([1, 2]));
        assert_eq!(json["scales"], serde_json::json!([3, 4]));
    }
    #[test]
    fn bad_stored_profiles_fall_back_to_defaults() {
        for bytes in [
            &b"not json"[..],
            &br#"{"offsets":[1,2,3]}"#[..],
            &br#"{"offsets":[1,2],"scales":[1,1]}"#[..],
            &br#"{"offsets":[1,2,3],"scales":[1,0,1]}"#[..],
        ] {
            let store = ProfileStore::new(MemoryStore::with_entry(KEY, bytes), KEY, 3);
            assert!(store.load().is_err());
            assert_eq!(store.load_or_default(), CalibrationProfile::uncalibrated(3));
        }
        let empty = ProfileStore::new(MemoryStore::new(), KEY, 3);
        assert_eq!(empty.load().unwrap(), None);
        assert_eq!(empty.load_or_default(), CalibrationProfile::uncalibrated(3));
    }
    #[test]
    fn engine_loads_persisted_profile_on_construction() {
        let saved = CalibrationProfile::new(vec![5, 6, 7], vec![10, 20, 30]).unwrap();
        let store = MemoryStore::with_entry(KEY, &saved.to_bytes().unwrap());
        let engine = CalibrationEngine::new(ProfileStore::new(store, KEY, 3), timing());
        assert_eq!(engine.profile(), &saved);
    }
    #[test]
    fn calibration_tracks_rest_minimum_and_handle_maximum() {
        // 100 ms phases at 50 ms spacing: two samples each.
        let mut sampler = ManualSampler::new(
            3,
            vec![
                vec![52, 60, 58],
                vec![50, 61, 55],
                vec![300, 40, 50],
                vec![120, 30, 55],
            ],
        );
        let mut clock = ManualClock::new();
        let mut engine =
            CalibrationEngine::new(ProfileStore::new(MemoryStore::new(), KEY, 3), timing());
        let profile = engine.calibrate(&mut sampler, &mut clock).unwrap().clone();
        assert_eq!(profile.offsets(), &[50, 60, 55]);
        assert_eq!(profile.scales(), &[250, 1, 1]);
        assert_eq!(sampler.remaining(), 0);
        assert_eq!(engine.store().load().unwrap(), Some(profile));
    }
    #[test]
    fn failed_save_keeps_new_profile_in_memory() {
        let mut store = MemoryStore::new();
        store.fail_writes = true;
        let mut engine = CalibrationEngine::new(ProfileStore::new(store, KEY, 2), timing());
        let mut sampler = ManualSampler::new(2, vec![vec![10, 10], vec![10, 10], vec![10, 10], vec![90, 10]]);
        let mut clock = ManualClock::new();
        let result = engine.calibrate(&mut sampler, &mut clock);
        assert!(matches!(result, Err(LinkError::StorageWrite(_))));
        assert_eq!(engine.profile().offsets(), &[10, 10]);
        assert_eq!(engine.profile().scales(), &[80, 1]);
    }
    #[test]
    fn calibration_skips_garbled_samples() {
        let mut sampler = ManualSampler::new(
            3,
            vec![
                vec![1, 2],
                vec![50, 60, 55],
                vec![300, 40, 55],
                vec![9],
            ],
        );
        let mut clock = ManualClock::new();
        let mut engine =
            CalibrationEngine::new(ProfileStore::new(MemoryStore::new(), KEY, 3), timing());
        let profile = engine.calibrate(&mut sampler, &mut clock).unwrap();
        assert_eq!(profile.offsets(), &[50, 60, 55]);
        assert_eq!(profile.scales(), &[250, 1, 1]);
    }
    #[test]
    fn sampling_failure_leaves_profile_untouched() {
        let mut engine =
            CalibrationEngine::new(ProfileStore::new(MemoryStore::new(), KEY, 2), timing());
        let mut sampler = ManualSampler::new(2, Vec::new());
        let mut clock = ManualClock::new();
        assert!(engine.calibrate(&mut sampler, &mut clock).is_err());
        assert_eq!(engine.profile(), &CalibrationProfile::uncalibrated(2));
    }
    #[test]
    fn averager_truncates_mean_after_k_frames() {
        let mut averager = BaselineAverager::new(2, 3);
        assert_eq!(averager.push(&vec![10, 100]).unwrap(), None);
        assert_eq!(averager.push(&vec![11, 100]).unwrap(), None);
        let baseline = averager.push(&vec![11, 101]).unwrap().unwrap();
        assert_eq!(baseline.values(), &[10, 100]);
        assert_eq!(averager.seen(), 3);
        assert_eq!(baseline.relative(&[5, 130]).unwrap(), vec![-5, 30]);
    }
    #[test]
    fn averager_rejects_wrong_length() {
        let mut averager = BaselineAverager::new(3, 10);
        assert!(averager.push(&vec![1, 2]).is_err());
        assert_eq!(averager.seen(), 0);
    }
}
