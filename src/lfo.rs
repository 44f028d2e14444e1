//! Dual-LFO modulation matrix, §4.6.
//!
//! Ported from `rockit_engine.c`'s `lfo_wave`/`hz_to_inc` and the per-sample routing in
//! `rockit_engine_render`. Per the Open Question decision recorded in DESIGN.md, each LFO
//! owns an independent LFSR rather than sharing one function-local static.

use crate::voice::hz_to_inc;
use crate::wavetables::SINE;

#[derive(Debug, Clone, Copy, Default)]
pub struct LfoState {
    pub phase: u32,
    pub increment: u32,
    lfsr: u16,
}

impl LfoState {
    pub fn new(seed: u16) -> Self {
        Self {
            phase: 0,
            increment: 0,
            lfsr: seed,
        }
    }

    /// Recomputed once per buffer: `hz = 0.01 + (rate/127) * 20`.
    pub fn set_rate(&mut self, rate_param: i32, sample_rate: i32) {
        let hz = 0.01 + (rate_param.clamp(0, 127) as f32 / 127.0) * 20.0;
        self.increment = hz_to_inc(hz, sample_rate);
    }

    pub fn advance(&mut self) {
        self.phase = self.phase.wrapping_add(self.increment);
    }

    /// Bipolar Q1.15-ish wave value in `-128..=127`, shape mirrors the oscillator
    /// families at a coarser resolution (§4.6).
    pub fn wave(&mut self, shape: i32) -> i8 {
        let idx = (self.phase >> 24) as u8;
        let raw: u8 = match shape & 0x0F {
            0 => SINE[idx as usize],
            1..=3 => {
                // Simple (non-mipmapped) square/saw/triangle: reuse the sine LUT's
                // symmetric 256-point domain with a direct waveform formula.
                match shape {
                    1 => {
                        if idx < 128 {
                            255
                        } else {
                            0
                        }
                    }
                    2 => idx,
                    _ => {
                        if idx < 128 {
                            (idx as u16 * 2) as u8
                        } else {
                            (255u16 - (idx as u16 - 128) * 2) as u8
                        }
                    }
                }
            }
            4..=6 => {
                // Lower-resolution triangle family.
                if idx < 128 {
                    (idx as u16 * 2) as u8
                } else {
                    (255u16 - (idx as u16 - 128) * 2) as u8
                }
            }
            7..=9 => {
                if idx < 128 {
                    255
                } else {
                    0
                }
            }
            10 => 255u8.wrapping_sub(idx),
            11 | 12 => idx,
            13 => {
                if (idx & 0x40) != 0 {
                    255
                } else {
                    0
                }
            }
            14 => {
                let bit = ((self.lfsr >> 15) ^ (self.lfsr >> 13) ^ (self.lfsr >> 12) ^ (self.lfsr >> 10)) & 1;
                self.lfsr = (self.lfsr << 1) | bit;
                (self.lfsr & 0xFF) as u8
            }
            _ => {
                if idx & 0x80 != 0 {
                    255
                } else {
                    0
                }
            }
        };
        (raw as i16 - 128) as i8
    }
}

/// §4.6: `((wave-128)*depth) >> 7`, but `wave` above is already offset by -128.
pub fn modulation_amount(wave: i8, depth_param: i32) -> i32 {
    (wave as i32 * depth_param.clamp(0, 127)) >> 7
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_zero_is_slowest_nonzero_increment() {
        let mut lfo = LfoState::new(0xACE1);
        lfo.set_rate(0, 48000);
        assert!(lfo.increment > 0);
    }

    #[test]
    fn phase_wraps() {
        let mut lfo = LfoState::new(1);
        lfo.increment = u32::MAX;
        lfo.advance();
        lfo.advance();
        assert!(lfo.phase < u32::MAX);
    }
}
