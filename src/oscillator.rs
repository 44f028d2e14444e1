//! Per-sample waveshape dispatch: the 16 waveshape families of §4.4, including the nine
//! time-varying morphs and their exact timer periods.
//!
//! Ported algorithmically from `original_source/ReSpeaker_Rockit_1.0/rockit_engine.c`'s
//! `wavetable_sample` and its morph-family switch, using this crate's generated mipmaps
//! (see `wavetables.rs`) in place of the original's literal LUT bytes.

use crate::voice::EnvelopeState;
use crate::wavetables::{
    blend_mipmap, lut_to_q15, mipmap_band_and_blend, HARDSYNC_MIPMAP, SAW_MIPMAP, SINE,
    SQUARE_MIPMAP, TRIANGLE_MIPMAP,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Waveshape {
    Sine = 0,
    Square = 1,
    Saw = 2,
    Triangle = 3,
    Morph1 = 4,
    Morph2 = 5,
    Morph3 = 6,
    Morph4 = 7,
    Morph5 = 8,
    Morph6 = 9,
    Morph7 = 10,
    Morph8 = 11,
    Morph9 = 12,
    HardSync = 13,
    Noise = 14,
    RawSquare = 15,
}

impl From<i32> for Waveshape {
    fn from(value: i32) -> Self {
        match value & 0x0F {
            0 => Waveshape::Sine,
            1 => Waveshape::Square,
            2 => Waveshape::Saw,
            3 => Waveshape::Triangle,
            4 => Waveshape::Morph1,
            5 => Waveshape::Morph2,
            6 => Waveshape::Morph3,
            7 => Waveshape::Morph4,
            8 => Waveshape::Morph5,
            9 => Waveshape::Morph6,
            10 => Waveshape::Morph7,
            11 => Waveshape::Morph8,
            12 => Waveshape::Morph9,
            13 => Waveshape::HardSync,
            14 => Waveshape::Noise,
            _ => Waveshape::RawSquare,
        }
    }
}

/// Per-oscillator-per-slot morph state, §3. Reseeded on trigger, then evolves freely.
#[derive(Debug, Clone, Copy, Default)]
pub struct MorphState {
    pub morph_timer: u8,
    pub morph_index: u8,
    pub morph_index_16: u16,
    pub morph_state: u8,
    pub phase_shifter: u8,
    pub phase_shift_timer: u8,
    pub lfsr: u16,
}

impl MorphState {
    /// §4.5: morph LFSRs reseeded as `0xACE1 + (note<<8)` / `0x5EED + (note<<8)` on trigger.
    pub fn reseed(&mut self, note: u8, seed: u16) {
        let lfsr = seed.wrapping_add((note as u16) << 8);
        *self = MorphState {
            lfsr: if lfsr == 0 { 1 } else { lfsr },
            ..MorphState::default()
        };
    }
}

const MORPH1_PERIOD: u8 = 15;
const MORPH2_PERIOD: u8 = 10;
const PHASE_SHIFT_PERIOD: u8 = 50;
const MORPH3_PERIOD: u8 = 50;
const MORPH4_PERIOD: u8 = 250;
const MORPH5_PERIOD: u8 = 10;
const MORPH6_PERIOD: u8 = 50;
const MORPH7_PERIOD: u8 = 25;
const MORPH8_PERIOD: u8 = 5;

fn phase_to_index(phase: u32, len: usize) -> usize {
    ((phase >> (32 - len.trailing_zeros())) as usize).min(len - 1)
}

fn sine_at(phase: u32) -> u8 {
    SINE[phase_to_index(phase, SINE.len())]
}

fn square_at(phase: u32, note: u8) -> u8 {
    let (band, blend) = mipmap_band_and_blend(note, SQUARE_MIPMAP.len());
    let idx = phase_to_index(phase, SQUARE_MIPMAP[0].len());
    blend_mipmap(&SQUARE_MIPMAP, band, blend, idx)
}

fn saw_at(phase: u32, note: u8) -> u8 {
    let (band, blend) = mipmap_band_and_blend(note, SAW_MIPMAP.len());
    let idx = phase_to_index(phase, SAW_MIPMAP[0].len());
    blend_mipmap(&SAW_MIPMAP, band, blend, idx)
}

fn triangle_at(phase: u32, note: u8) -> u8 {
    let (band, blend) = mipmap_band_and_blend(note, TRIANGLE_MIPMAP.len());
    let idx = phase_to_index(phase, TRIANGLE_MIPMAP[0].len());
    blend_mipmap(&TRIANGLE_MIPMAP, band, blend, idx)
}

fn hardsync_at(phase: u32, note: u8) -> u8 {
    let (band, blend) = mipmap_band_and_blend(note >> 1, HARDSYNC_MIPMAP.len());
    let idx = phase_to_index(phase, HARDSYNC_MIPMAP[0].len());
    blend_mipmap(&HARDSYNC_MIPMAP, band, blend, idx)
}

fn raw_square_at(phase: u32) -> u8 {
    if phase & 0x8000_0000 != 0 {
        255
    } else {
        0
    }
}

fn lfsr_advance(lfsr: &mut u16) -> u8 {
    let bit = ((*lfsr >> 15) ^ (*lfsr >> 13) ^ (*lfsr >> 12) ^ (*lfsr >> 10)) & 1;
    *lfsr = (*lfsr << 1) | bit;
    (*lfsr & 0xFF) as u8
}

/// Shared by waveshape 14 and M8's noise sub-state: the top 4 bits of `phase` act as a
/// step counter so the LFSR only advances once per 16 steps of the oscillator's own
/// phase, not once per sample. `last_step` is caller-owned storage so M8 can gate its
/// noise phase without clobbering its own `morph_state` FSM field.
fn gated_lfsr_byte(phase: u32, last_step: &mut u8, lfsr: &mut u16) -> u8 {
    let step = (phase >> 28) as u8;
    if step != *last_step {
        *last_step = step;
        lfsr_advance(lfsr);
    }
    (*lfsr & 0xFF) as u8
}

/// Waveshape 14: taps 15,13,12,10, advanced every 16 phase steps.
fn lfsr_noise_at(phase: u32, morph: &mut MorphState) -> u8 {
    gated_lfsr_byte(phase, &mut morph.morph_state, &mut morph.lfsr)
}

fn saw_shifted(phase: u32, note: u8, shift_u8: u8) -> u8 {
    let shift = (shift_u8 as u32) << 24;
    saw_at(phase.wrapping_add(shift), note)
}

fn square_shifted(phase: u32, note: u8, shift_u8: u8) -> u8 {
    let shift = (shift_u8 as u32) << 24;
    square_at(phase.wrapping_add(shift), note)
}

fn tick_timer(timer: &mut u8, period: u8) -> bool {
    if *timer == 0 {
        *timer = period;
        true
    } else {
        *timer -= 1;
        false
    }
}

/// Returns a Q1.15 sample for one oscillator at `phase`, given its waveshape, the
/// voice's MIDI note (for mipmap band selection), its morph state, and the voice's
/// current envelope state (needed only by M9).
pub fn sample(
    phase: u32,
    wave: Waveshape,
    note: u8,
    morph: &mut MorphState,
    env_state: EnvelopeState,
) -> i16 {
    let raw: u8 = match wave {
        Waveshape::Sine => sine_at(phase),
        Waveshape::Square => square_at(phase, note),
        Waveshape::Saw => saw_at(phase, note),
        Waveshape::Triangle => triangle_at(phase, note),
        Waveshape::HardSync => hardsync_at(phase, note),
        Waveshape::Noise => lfsr_noise_at(phase, morph),
        Waveshape::RawSquare => raw_square_at(phase),
        Waveshape::Morph1 => {
            if tick_timer(&mut morph.morph_timer, MORPH1_PERIOD) {
                morph.morph_index = morph.morph_index.wrapping_add(1);
            }
            let idx = morph.morph_index as i32;
            let sq = square_at(phase, note) as i32;
            let sw = saw_shifted(phase, note, 128) as i32;
            (((sq * idx) + (sw * (255 - idx))) >> 8) as u8
        }
        Waveshape::Morph2 => {
            if tick_timer(&mut morph.morph_timer, MORPH2_PERIOD) {
                morph.morph_index = morph.morph_index.wrapping_add(1);
            }
            if tick_timer(&mut morph.phase_shift_timer, PHASE_SHIFT_PERIOD) {
                morph.phase_shifter = morph.phase_shifter.wrapping_add(1);
            }
            let idx = morph.morph_index as i32;
            let tr = triangle_at(phase, note) as i32;
            let sw = saw_shifted(phase, note, morph.phase_shifter) as i32;
            (((tr * idx) + (sw * (255 - idx))) >> 8) as u8
        }
        Waveshape::Morph3 => {
            if tick_timer(&mut morph.morph_timer, MORPH3_PERIOD) {
                morph.morph_index = morph.morph_index.wrapping_add(1);
            }
            let tr = triangle_at(phase, note) as i32;
            let sq = square_shifted(phase, note, morph.morph_index.wrapping_neg()) as i32;
            let stemp = (tr - sq).clamp(-128, 127);
            (128 + stemp) as u8
        }
        Waveshape::Morph4 => {
            if tick_timer(&mut morph.morph_timer, MORPH4_PERIOD) {
                if morph.morph_state == 0 {
                    morph.morph_index = morph.morph_index.wrapping_add(1);
                    if morph.morph_index == 255 {
                        morph.morph_state = 1;
                    }
                } else {
                    morph.morph_index = morph.morph_index.wrapping_sub(1);
                    if morph.morph_index == 0 {
                        morph.morph_state = 0;
                    }
                }
            }
            let sw1 = saw_at(phase, note) as i32;
            let sw2 = saw_shifted(phase, note, morph.morph_index.wrapping_neg()) as i32;
            let stemp = (sw1 - sw2).clamp(-128, 127);
            (128 + stemp) as u8
        }
        Waveshape::Morph5 => {
            if tick_timer(&mut morph.morph_timer, MORPH5_PERIOD) {
                morph.morph_index_16 = (morph.morph_index_16 + 1) % 383;
            }
            if morph.morph_index_16 < 192 {
                sine_at(phase)
            } else {
                square_at(phase, note)
            }
        }
        Waveshape::Morph6 => {
            if tick_timer(&mut morph.morph_timer, MORPH6_PERIOD) {
                morph.morph_index_16 = (morph.morph_index_16 + 1) % 383;
            }
            if morph.morph_index_16 < 192 {
                saw_at(phase, note)
            } else {
                square_at(phase, note)
            }
        }
        Waveshape::Morph7 => {
            if tick_timer(&mut morph.morph_timer, MORPH7_PERIOD) {
                morph.morph_index = morph.morph_index.wrapping_add(1);
            }
            let sw = saw_at(phase, note) as i32;
            let shifted = saw_shifted(phase, note, morph.morph_index) as i32;
            ((sw - shifted) / 2 + 128).clamp(0, 255) as u8
        }
        Waveshape::Morph8 => {
            if tick_timer(&mut morph.morph_timer, MORPH8_PERIOD) {
                morph.morph_index = morph.morph_index.wrapping_add(1);
            }
            match morph.morph_state {
                0 => {
                    let out = triangle_at(phase, note);
                    if morph.morph_index == 255 {
                        morph.morph_state = 1;
                    }
                    out
                }
                1 => {
                    let out = gated_lfsr_byte(phase, &mut morph.phase_shift_timer, &mut morph.lfsr);
                    if morph.morph_index == 255 {
                        morph.morph_state = 2;
                    }
                    out
                }
                2 | 3 => {
                    let sw = saw_at(phase, note) as i32;
                    let shifted = saw_shifted(phase, note, morph.morph_index.wrapping_neg()) as i32;
                    let stemp = (sw - shifted).clamp(-128, 127);
                    if morph.morph_state == 2 && morph.morph_index == 255 {
                        morph.morph_state = 3;
                    }
                    (128 + stemp) as u8
                }
                _ => 128,
            }
        }
        Waveshape::Morph9 => match env_state {
            EnvelopeState::Attack => triangle_at(phase, note),
            EnvelopeState::Decay | EnvelopeState::Sustain => square_at(phase, note),
            EnvelopeState::Release => {
                let shift = 64u32 << 26;
                square_at(phase.wrapping_add(shift), note)
            }
            EnvelopeState::Idle => 128,
        },
    };
    lut_to_q15(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sine_at_zero_phase_is_silence() {
        assert_eq!(sine_at(0), SINE[0]);
    }

    #[test]
    fn morph1_index_advances_on_period() {
        let mut morph = MorphState::default();
        morph.reseed(60, 0xACE1);
        let before = morph.morph_index;
        for _ in 0..(MORPH1_PERIOD as u32 + 1) {
            sample(0, Waveshape::Morph1, 60, &mut morph, EnvelopeState::Attack);
        }
        assert_ne!(morph.morph_index, before);
    }

    #[test]
    fn morph9_follows_envelope_state() {
        let mut morph = MorphState::default();
        morph.reseed(60, 0xACE1);
        let quarter_cycle = 1u32 << 30;
        let attack = sample(quarter_cycle, Waveshape::Morph9, 60, &mut morph, EnvelopeState::Attack);
        let decay = sample(quarter_cycle, Waveshape::Morph9, 60, &mut morph, EnvelopeState::Decay);
        // Attack reads the triangle table, decay/sustain the square table, so the same
        // phase must not produce the same sample across both.
        assert_ne!(attack, decay);
    }
}
