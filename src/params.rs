//! Fixed parameter set, atomic single-value reads, clamp-on-write.
//!
//! Grounded on `fx_components/filter.rs`'s `Arc<AtomicU32>` scaled-param pattern and
//! `original_source/ReSpeaker_Rockit_1.0/params.c`'s `param_spec_t` table. Unlike
//! float-scaled atomics used for continuous FX parameters elsewhere, every value here
//! is a small bounded integer (0..127 range, occasionally narrower), so each parameter is
//! a single `AtomicI32` holding its raw integer — no scaling, no torn reads.

use std::sync::atomic::{AtomicI32, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum ParamId {
    Osc1Wave = 0,
    Osc2Wave,
    OscMix,
    Tune,
    SubOsc,
    EnvAttack,
    EnvDecay,
    EnvSustain,
    EnvRelease,
    FilterCutoff,
    FilterResonance,
    FilterEnvAmount,
    FilterMode,
    Lfo1Rate,
    Lfo1Depth,
    Lfo1Destination,
    Lfo1Shape,
    Lfo2Rate,
    Lfo2Depth,
    Lfo2Destination,
    Lfo2Shape,
    Glide,
    MasterVolume,
    DroneMode,
    ArpPattern,
    ArpSpeed,
    ArpLength,
    ArpGate,
}

pub const PARAM_COUNT: usize = ParamId::ArpGate as usize + 1;

#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub name: &'static str,
    pub min: i32,
    pub max: i32,
    pub default: i32,
}

const fn spec(name: &'static str, min: i32, max: i32, default: i32) -> ParamSpec {
    ParamSpec {
        name,
        min,
        max,
        default,
    }
}

pub static PARAM_SPECS: [ParamSpec; PARAM_COUNT] = [
    spec("osc1_wave", 0, 15, 2),
    spec("osc2_wave", 0, 15, 3),
    spec("osc_mix", 0, 127, 64),
    spec("tune", 0, 127, 64),
    spec("sub_osc", 0, 1, 0),
    spec("env_attack", 0, 127, 4),
    spec("env_decay", 0, 127, 20),
    spec("env_sustain", 0, 127, 100),
    spec("env_release", 0, 127, 40),
    spec("filter_cutoff", 0, 127, 64),
    spec("filter_resonance", 0, 127, 0),
    spec("filter_env_amount", 0, 127, 64),
    spec("filter_mode", 0, 3, 0),
    spec("lfo1_rate", 0, 127, 32),
    spec("lfo1_depth", 0, 127, 0),
    spec("lfo1_destination", 0, 5, 0),
    spec("lfo1_shape", 0, 15, 0),
    spec("lfo2_rate", 0, 127, 32),
    spec("lfo2_depth", 0, 127, 0),
    spec("lfo2_destination", 0, 5, 0),
    spec("lfo2_shape", 0, 15, 0),
    spec("glide", 0, 127, 0),
    spec("master_volume", 0, 127, 100),
    spec("drone_mode", 0, 1, 0),
    spec("arp_pattern", 0, 15, 0),
    spec("arp_speed", 0, 127, 64),
    spec("arp_length", 1, 8, 4),
    spec("arp_gate", 0, 127, 100),
];

fn clamp(id: ParamId, value: i32) -> i32 {
    let s = &PARAM_SPECS[id as usize];
    value.clamp(s.min, s.max)
}

/// The shared parameter store. One word-atomic cell per parameter; `set`/`get` never
/// allocate and never tear, so the audio thread can read mid-buffer while a control
/// thread writes.
#[derive(Debug)]
pub struct ParamStore {
    values: [AtomicI32; PARAM_COUNT],
}

impl ParamStore {
    pub fn new() -> Self {
        let values = std::array::from_fn(|i| AtomicI32::new(PARAM_SPECS[i].default));
        Self { values }
    }

    pub fn set(&self, id: ParamId, value: i32) {
        self.values[id as usize].store(clamp(id, value), Ordering::Relaxed);
    }

    pub fn get(&self, id: ParamId) -> i32 {
        self.values[id as usize].load(Ordering::Relaxed)
    }

    pub fn reset_to_defaults(&self) {
        for (i, cell) in self.values.iter().enumerate() {
            cell.store(PARAM_SPECS[i].default, Ordering::Relaxed);
        }
    }
}

impl Default for ParamStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_on_write() {
        let store = ParamStore::new();
        store.set(ParamId::OscMix, 999);
        assert_eq!(store.get(ParamId::OscMix), 127);
        store.set(ParamId::OscMix, -5);
        assert_eq!(store.get(ParamId::OscMix), 0);
    }

    #[test]
    fn in_range_write_is_exact() {
        let store = ParamStore::new();
        store.set(ParamId::Tune, 70);
        assert_eq!(store.get(ParamId::Tune), 70);
    }

    #[test]
    fn defaults_match_spec() {
        let store = ParamStore::new();
        assert_eq!(store.get(ParamId::Osc1Wave), 2);
        assert_eq!(store.get(ParamId::Osc2Wave), 3);
        assert_eq!(store.get(ParamId::MasterVolume), 100);
        assert_eq!(store.get(ParamId::ArpLength), 4);
    }
}
