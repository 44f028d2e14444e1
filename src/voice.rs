//! Per-voice state machine: §3 voice slot + §4.5 trigger/tick/release.
//!
//! Ported from `original_source/ReSpeaker_Rockit_1.0/rockit_engine.c`'s `voice_trigger`/
//! `voice_tick`/`voice_release` and `calc_phase_inc`, restructured as methods on an owned
//! `VoiceSlot` rather than a global `voice_state_t[3]` array.

use std::sync::LazyLock;

use crate::oscillator::{self, MorphState, Waveshape};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeState {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// MIDI note 0..127 -> Hz, A4 = 440 at note 69, equal temperament, rounded.
static FREQ_HZ: LazyLock<[f32; 128]> =
    LazyLock::new(|| std::array::from_fn(|n| 440.0 * 2f32.powf((n as f32 - 69.0) / 12.0)));

/// 128-entry Q16.16 detune table: tune (0..127, center 64) -> `2^((tune-64)/48)`.
static DETUNE_Q16: LazyLock<[u32; 128]> = LazyLock::new(|| {
    std::array::from_fn(|tune| {
        let ratio = 2f32.powf((tune as f32 - 64.0) / 48.0);
        (ratio * 65536.0).round() as u32
    })
});

pub fn hz_to_inc(hz: f32, sample_rate: i32) -> u32 {
    let inc = (hz as f64 * 4294967296.0) / sample_rate as f64;
    inc.clamp(0.0, u32::MAX as f64) as u32
}

fn note_to_inc(note: u8, sample_rate: i32) -> u32 {
    hz_to_inc(FREQ_HZ[note.min(127) as usize], sample_rate)
}

/// §4.5: `ms = param/127 * 2000`, `samples = ms * sr / 1000`.
fn param_to_samples(param: i32, sample_rate: i32) -> u32 {
    let ms = (param as f32 / 127.0) * 2000.0;
    ((ms * sample_rate as f32) / 1000.0).max(1.0) as u32
}

fn sustain_to_q15(param: i32) -> i16 {
    ((param * 32767) / 127) as i16
}

/// Q1.15 fractional multiply with rounding.
#[inline]
pub fn qmul_q15(a: i16, b: i16) -> i16 {
    let product = a as i32 * b as i32;
    ((product + (1 << 14)) >> 15) as i16
}

#[derive(Debug, Clone, Copy)]
pub struct EnvelopeTimings {
    pub attack_samples: u32,
    pub decay_samples: u32,
    pub release_samples: u32,
    pub sustain_level: i16,
}

#[derive(Debug, Clone, Copy)]
pub struct VoiceSlot {
    pub active: bool,
    pub note: u8,
    ph1: u32,
    ph2: u32,
    inc1: u32,
    inc2_base: u32,
    env: EnvelopeState,
    env_level: i16,
    t: u32,
    release_start_level: i16,
    timings: EnvelopeTimings,
    glide_current: u32,
    glide_target: u32,
    morph1: MorphState,
    morph2: MorphState,
}

impl Default for VoiceSlot {
    fn default() -> Self {
        Self {
            active: false,
            note: 0,
            ph1: 0,
            ph2: 0,
            inc1: 0,
            inc2_base: 0,
            env: EnvelopeState::Idle,
            env_level: 0,
            t: 0,
            release_start_level: 0,
            timings: EnvelopeTimings {
                attack_samples: 1,
                decay_samples: 1,
                release_samples: 1,
                sustain_level: 0,
            },
            glide_current: 0,
            glide_target: 0,
            morph1: MorphState::default(),
            morph2: MorphState::default(),
        }
    }
}

impl VoiceSlot {
    pub fn envelope_state(&self) -> EnvelopeState {
        self.env
    }

    /// §4.5 Trigger. Phase accumulators are deliberately left alone to avoid clicks.
    #[allow(clippy::too_many_arguments)]
    pub fn trigger(
        &mut self,
        note: u8,
        sub_osc: bool,
        glide_param: i32,
        attack: i32,
        decay: i32,
        release: i32,
        sustain: i32,
        sample_rate: i32,
    ) {
        self.note = note;
        self.active = true;

        self.inc1 = note_to_inc(note, sample_rate);
        let note2 = if sub_osc { note.saturating_sub(12) } else { note };
        let target = note_to_inc(note2, sample_rate);
        self.glide_target = target;
        if glide_param == 0 {
            self.glide_current = target;
        }

        self.refresh_envelope_timings(attack, decay, release, sustain, sample_rate);
        self.env = EnvelopeState::Attack;
        self.t = 0;
        self.morph1.reseed(note, 0xACE1);
        self.morph2.reseed(note, 0x5EED);
    }

    /// Live envelope parameter updates (§4 supplemented feature): refresh timing/levels
    /// for an already-active voice every buffer, without touching the segment counter.
    pub fn refresh_envelope_timings(
        &mut self,
        attack: i32,
        decay: i32,
        release: i32,
        sustain: i32,
        sample_rate: i32,
    ) {
        self.timings = EnvelopeTimings {
            attack_samples: param_to_samples(attack, sample_rate),
            decay_samples: param_to_samples(decay, sample_rate),
            release_samples: param_to_samples(release, sample_rate),
            sustain_level: sustain_to_q15(sustain),
        };
    }

    pub fn release(&mut self) {
        if self.env == EnvelopeState::Idle {
            return;
        }
        self.release_start_level = self.env_level;
        self.env = EnvelopeState::Release;
        self.t = 0;
    }

    /// Forces Sustain at a fixed Q1.15 level, bypassing the envelope. Used by the drone
    /// mode (§4.7), which repurposes the sustain knob as direct amplitude.
    pub fn force_sustain(&mut self, level_q15: i16) {
        self.active = true;
        self.env = EnvelopeState::Sustain;
        self.env_level = level_q15;
        self.timings.sustain_level = level_q15;
    }

    /// §4.5 per-sample tick. Returns a mixed, enveloped Q1.15 sample.
    #[allow(clippy::too_many_arguments)]
    pub fn tick(
        &mut self,
        sample_rate: i32,
        tune_param: i32,
        mix_param: i32,
        osc1_wave: Waveshape,
        osc2_wave: Waveshape,
        sub_osc: bool,
        glide_param: i32,
    ) -> i16 {
        // 1. Glide: move current toward target.
        if glide_param > 0 && self.glide_current != self.glide_target {
            let glide = glide_param as f32 / 127.0;
            let glide_rate = ((glide * 100.0 * sample_rate as f32) / 1000.0).max(1.0) as u32;
            let diff = self.glide_target as i64 - self.glide_current as i64;
            let step = (diff.unsigned_abs() / glide_rate as u64).max(1) as i64;
            let step = step.min(diff.abs());
            self.glide_current = (self.glide_current as i64 + diff.signum() * step) as u32;
        } else {
            self.glide_current = self.glide_target;
        }
        self.inc2_base = self.glide_current;

        // 2. Detune multiplier on osc2, bypassed in sub-osc mode.
        let inc2 = if sub_osc {
            self.inc2_base
        } else {
            let ratio = DETUNE_Q16[tune_param.clamp(0, 127) as usize] as u64;
            ((self.inc2_base as u64 * ratio) >> 16) as u32
        };

        // 3. Sample both oscillators and crossfade.
        let s1 = oscillator::sample(self.ph1, osc1_wave, self.note, &mut self.morph1, self.env);
        let s2 = oscillator::sample(self.ph2, osc2_wave, self.note, &mut self.morph2, self.env);
        let mix = mix_param.clamp(0, 127);
        let mixed = ((127 - mix) * s1 as i32 + mix * s2 as i32) / 127;
        let mixed = mixed.clamp(i16::MIN as i32, i16::MAX as i32) as i16;

        // 4. Advance phases.
        self.ph1 = self.ph1.wrapping_add(self.inc1);
        self.ph2 = self.ph2.wrapping_add(inc2);

        // 5. Envelope step.
        self.step_envelope();

        // 6. Apply envelope.
        qmul_q15(mixed, self.env_level)
    }

    fn step_envelope(&mut self) {
        match self.env {
            EnvelopeState::Idle => {
                self.env_level = 0;
            }
            EnvelopeState::Attack => {
                let samples = self.timings.attack_samples.max(1);
                self.env_level = ((32767i64 * self.t as i64) / samples as i64) as i16;
                self.t += 1;
                if self.t >= samples {
                    self.env = EnvelopeState::Decay;
                    self.t = 0;
                    self.env_level = 32767;
                }
            }
            EnvelopeState::Decay => {
                let samples = self.timings.decay_samples.max(1);
                let sustain = self.timings.sustain_level as i64;
                let span = 32767 - sustain;
                self.env_level = (32767 - (span * self.t as i64) / samples as i64) as i16;
                self.t += 1;
                if self.t >= samples {
                    self.env = EnvelopeState::Sustain;
                    self.t = 0;
                    self.env_level = self.timings.sustain_level;
                }
            }
            EnvelopeState::Sustain => {
                self.env_level = self.timings.sustain_level;
            }
            EnvelopeState::Release => {
                let samples = self.timings.release_samples.max(1);
                let start = self.release_start_level as i64;
                self.env_level = (start - (start * self.t as i64) / samples as i64).max(0) as i16;
                self.t += 1;
                if self.t >= samples || self.env_level <= 0 {
                    self.env = EnvelopeState::Idle;
                    self.env_level = 0;
                    self.active = false;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detune_symmetry_at_center() {
        assert_eq!(DETUNE_Q16[64], 65536);
    }

    #[test]
    fn detune_ratio_matches_formula() {
        let d = 12;
        let expected = 2f32.powf(d as f32 / 48.0);
        let actual = DETUNE_Q16[64 + d as usize] as f32 / 65536.0;
        assert!((actual - expected).abs() < 0.001);
    }

    #[test]
    fn envelope_is_monotone_in_attack() {
        let mut voice = VoiceSlot::default();
        voice.trigger(60, false, 0, 64, 20, 40, 100, 48000);
        let mut last = -1i16;
        for _ in 0..voice.timings.attack_samples {
            voice.tick(48000, 64, 0, Waveshape::Sine, Waveshape::Sine, false, 0);
            assert!(voice.env_level >= last);
            last = voice.env_level;
        }
    }

    #[test]
    fn release_reaches_idle() {
        let mut voice = VoiceSlot::default();
        voice.trigger(60, false, 0, 0, 0, 1, 100, 48000);
        for _ in 0..10 {
            voice.tick(48000, 64, 0, Waveshape::Sine, Waveshape::Sine, false, 0);
        }
        voice.release();
        for _ in 0..voice.timings.release_samples + 10 {
            voice.tick(48000, 64, 0, Waveshape::Sine, Waveshape::Sine, false, 0);
        }
        assert_eq!(voice.envelope_state(), EnvelopeState::Idle);
        assert!(!voice.active);
    }

    #[test]
    fn no_detune_at_center_tune_keeps_oscs_in_sync() {
        let mut voice = VoiceSlot::default();
        voice.trigger(60, false, 0, 0, 0, 0, 127, 48000);
        assert_eq!(voice.glide_current, voice.inc1);
    }
}
