//! Patch text format, §6: one parameter per line `name=value`, `#` comments, unknown
//! names skipped, at most 16 slots addressed 0..15.
//!
//! Ported from `original_source/ReSpeaker_Rockit_1.0/patch_storage.c`'s `patch_save`/
//! `patch_recall`, with `exists`/`delete` carried over as natural companions (§4
//! supplemented feature).

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::PatchError;
use crate::params::{ParamId, ParamStore, PARAM_SPECS};

pub const MAX_PATCHES: u8 = 16;

fn param_id_by_name(name: &str) -> Option<ParamId> {
    match name {
        "osc1_wave" => Some(ParamId::Osc1Wave),
        "osc2_wave" => Some(ParamId::Osc2Wave),
        "osc_mix" => Some(ParamId::OscMix),
        "tune" => Some(ParamId::Tune),
        "sub_osc" => Some(ParamId::SubOsc),
        "env_attack" => Some(ParamId::EnvAttack),
        "env_decay" => Some(ParamId::EnvDecay),
        "env_sustain" => Some(ParamId::EnvSustain),
        "env_release" => Some(ParamId::EnvRelease),
        "filter_cutoff" => Some(ParamId::FilterCutoff),
        "filter_resonance" => Some(ParamId::FilterResonance),
        "filter_env_amount" => Some(ParamId::FilterEnvAmount),
        "filter_mode" => Some(ParamId::FilterMode),
        "lfo1_rate" => Some(ParamId::Lfo1Rate),
        "lfo1_depth" => Some(ParamId::Lfo1Depth),
        "lfo1_destination" => Some(ParamId::Lfo1Destination),
        "lfo1_shape" => Some(ParamId::Lfo1Shape),
        "lfo2_rate" => Some(ParamId::Lfo2Rate),
        "lfo2_depth" => Some(ParamId::Lfo2Depth),
        "lfo2_destination" => Some(ParamId::Lfo2Destination),
        "lfo2_shape" => Some(ParamId::Lfo2Shape),
        "glide" => Some(ParamId::Glide),
        "master_volume" => Some(ParamId::MasterVolume),
        "drone_mode" => Some(ParamId::DroneMode),
        "arp_pattern" => Some(ParamId::ArpPattern),
        "arp_speed" => Some(ParamId::ArpSpeed),
        "arp_length" => Some(ParamId::ArpLength),
        "arp_gate" => Some(ParamId::ArpGate),
        _ => None,
    }
}

pub fn patch_path(dir: &Path, slot: u8) -> Result<PathBuf, PatchError> {
    if slot >= MAX_PATCHES {
        return Err(PatchError::InvalidSlot(slot));
    }
    Ok(dir.join(format!("patch{slot:02}.txt")))
}

pub fn save(store: &ParamStore, dir: &Path, slot: u8) -> Result<(), PatchError> {
    let path = patch_path(dir, slot)?;
    let mut text = String::new();
    for spec in PARAM_SPECS.iter() {
        let id = param_id_by_name(spec.name).expect("every PARAM_SPECS entry has a matching ParamId");
        text.push_str(&format!("{}={}\n", spec.name, store.get(id)));
    }
    fs::write(path, text)?;
    Ok(())
}

/// Loads a patch into `store`. Unknown parameter names are skipped. Returns
/// `PatchError::NoParametersLoaded` if the file contained no recognized parameters,
/// leaving `store` unchanged — per §7.
pub fn recall(store: &ParamStore, dir: &Path, slot: u8) -> Result<(), PatchError> {
    let path = patch_path(dir, slot)?;
    let text = fs::read_to_string(path)?;
    let mut loaded = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((name, value)) = line.split_once('=') else {
            continue;
        };
        let Some(id) = param_id_by_name(name.trim()) else {
            continue;
        };
        let Ok(value) = value.trim().parse::<i32>() else {
            continue;
        };
        loaded.push((id, value));
    }
    if loaded.is_empty() {
        return Err(PatchError::NoParametersLoaded);
    }
    for (id, value) in loaded {
        store.set(id, value);
    }
    Ok(())
}

pub fn exists(dir: &Path, slot: u8) -> Result<bool, PatchError> {
    Ok(patch_path(dir, slot)?.exists())
}

pub fn delete(dir: &Path, slot: u8) -> Result<(), PatchError> {
    let path = patch_path(dir, slot)?;
    if path.exists() {
        fs::remove_file(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_recall_round_trips() {
        let dir = std::env::temp_dir().join(format!("rockit-para-test-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let store = ParamStore::new();
        store.set(ParamId::MasterVolume, 42);
        save(&store, &dir, 0).unwrap();

        store.set(ParamId::MasterVolume, 100);
        recall(&store, &dir, 0).unwrap();
        assert_eq!(store.get(ParamId::MasterVolume), 42);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn recall_of_empty_file_errors() {
        let dir = std::env::temp_dir().join(format!("rockit-para-test-empty-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("patch00.txt"), "# nothing here\n").unwrap();
        let store = ParamStore::new();
        let err = recall(&store, &dir, 0).unwrap_err();
        assert!(matches!(err, PatchError::NoParametersLoaded));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn invalid_slot_is_rejected() {
        let dir = std::env::temp_dir();
        let store = ParamStore::new();
        assert!(matches!(
            recall(&store, &dir, 20),
            Err(PatchError::InvalidSlot(20))
        ));
    }
}
