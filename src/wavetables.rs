//! Static wavetable LUTs and the mipmap blend used by §4.4's square/saw/triangle and
//! hard-sync waveshapes.
//!
//! The original firmware's LUT contents (`original_source/respeaker_rockit_.0.9/
//! wavetables.h`) are only `extern const` declarations in the retrieved source — the
//! actual table bytes were never available. Tables here are generated once at startup
//! by band-limited additive synthesis (summing harmonics below the Nyquist limit of the
//! band's representative frequency), which is the standard way to build anti-aliased
//! wavetables and reproduces the same 32-band/256-sample/4-way-blend structure
//! `blend_mipmaps` describes.

use std::f32::consts::PI;
use std::sync::LazyLock;

pub const BANDS: usize = 32;
pub const TABLE_LEN: usize = 256;
pub const HARDSYNC_BANDS: usize = 16;
pub const HARDSYNC_LEN: usize = 128;

fn midi_to_hz(note: f32) -> f32 {
    440.0 * 2f32.powf((note - 69.0) / 12.0)
}

/// Converts a bipolar `-1.0..=1.0` sample into the LUT's 8-bit unsigned storage.
fn to_u8(sample: f32) -> u8 {
    let clamped = sample.clamp(-1.0, 1.0);
    ((clamped * 127.0) + 128.0).round().clamp(0.0, 255.0) as u8
}

/// Sums odd/all harmonics of `fundamental_hz` below `nyquist`, sampled at `len` points
/// over one cycle, weighted by `harmonic_weight` and alternating sign per `alternate_sign`.
fn additive_table(
    len: usize,
    fundamental_hz: f32,
    nyquist: f32,
    harmonic_weight: impl Fn(u32) -> f32,
    odd_only: bool,
) -> Vec<u8> {
    let max_harmonic = if fundamental_hz > 1.0 {
        (nyquist / fundamental_hz).floor() as u32
    } else {
        1
    };
    let mut out = vec![0f32; len];
    let mut peak = 0f32;
    for (i, sample) in out.iter_mut().enumerate() {
        let phase = i as f32 / len as f32;
        let mut acc = 0f32;
        let mut h = 1u32;
        while h <= max_harmonic.max(1) {
            if !odd_only || h % 2 == 1 {
                acc += harmonic_weight(h) * (2.0 * PI * h as f32 * phase).sin();
            }
            h += 1;
        }
        *sample = acc;
        peak = peak.max(acc.abs());
    }
    if peak > 0.0 {
        for sample in out.iter_mut() {
            *sample /= peak;
        }
    }
    out.into_iter().map(to_u8).collect()
}

fn square_table(len: usize, fundamental_hz: f32, nyquist: f32) -> Vec<u8> {
    additive_table(len, fundamental_hz, nyquist, |h| 1.0 / h as f32, true)
}

fn saw_table(len: usize, fundamental_hz: f32, nyquist: f32) -> Vec<u8> {
    additive_table(len, fundamental_hz, nyquist, |h| 1.0 / h as f32, false)
}

fn triangle_table(len: usize, fundamental_hz: f32, nyquist: f32) -> Vec<u8> {
    additive_table(
        len,
        fundamental_hz,
        nyquist,
        |h| {
            let sign = if (h / 2) % 2 == 0 { 1.0 } else { -1.0 };
            sign / (h as f32 * h as f32)
        },
        true,
    )
}

fn sine_table() -> [u8; TABLE_LEN] {
    std::array::from_fn(|i| to_u8((2.0 * PI * i as f32 / TABLE_LEN as f32).sin()))
}

/// Reference sample rate the mipmap bands are generated against. §4.4: the band is
/// `midi_note >> 2`, so band `b` is representative of notes `4b..4b+3`.
const REFERENCE_SR: f32 = 48000.0;

fn build_mipmap(len: usize, bands: usize, table_fn: impl Fn(usize, f32, f32) -> Vec<u8>) -> Vec<Vec<u8>> {
    let nyquist = REFERENCE_SR * 0.45;
    (0..bands)
        .map(|band| {
            let note = (band * 4) as f32;
            let hz = midi_to_hz(note);
            table_fn(len, hz, nyquist)
        })
        .collect()
}

pub static SINE: LazyLock<[u8; TABLE_LEN]> = LazyLock::new(sine_table);
pub static SQUARE_MIPMAP: LazyLock<Vec<Vec<u8>>> =
    LazyLock::new(|| build_mipmap(TABLE_LEN, BANDS, square_table));
pub static SAW_MIPMAP: LazyLock<Vec<Vec<u8>>> =
    LazyLock::new(|| build_mipmap(TABLE_LEN, BANDS, saw_table));
pub static TRIANGLE_MIPMAP: LazyLock<Vec<Vec<u8>>> =
    LazyLock::new(|| build_mipmap(TABLE_LEN, BANDS, triangle_table));
/// Half-resolution mipmap for hard sync (§4.4 item 13): half the bands, half the
/// per-cycle samples, built from a harder, more-aliased harmonic series to approximate
/// the extra discontinuity a sync reset introduces.
pub static HARDSYNC_MIPMAP: LazyLock<Vec<Vec<u8>>> = LazyLock::new(|| {
    build_mipmap(HARDSYNC_LEN, HARDSYNC_BANDS, |len, hz, nyq| {
        additive_table(len, hz * 2.0, nyq, |h| 1.0 / h as f32, false)
    })
});

/// §4.4: band = `midi_note >> 2` clamped to the table's band count; `blend_pos` is the
/// low two bits, selecting one of four blend weights against the neighboring band.
pub fn mipmap_band_and_blend(midi_note: u8, bands: usize) -> (usize, u8) {
    let band = ((midi_note >> 2) as usize).min(bands - 1);
    (band, midi_note & 0x03)
}

/// Four-way blend between a band and its neighbor, degenerating at the table edges.
/// Ported from `rockit_engine.c`'s `blend_mipmaps`.
pub fn blend_mipmap(table: &[Vec<u8>], band: usize, blend_pos: u8, phase_idx: usize) -> u8 {
    let last = table.len() - 1;
    let cur = table[band][phase_idx] as i32;
    match blend_pos {
        0 => {
            if band == 0 {
                cur as u8
            } else {
                let below = table[band - 1][phase_idx] as i32;
                ((cur + below) / 2) as u8
            }
        }
        1 => {
            if band == 0 {
                cur as u8
            } else {
                let below = table[band - 1][phase_idx] as i32;
                ((cur * 3 + below) / 4) as u8
            }
        }
        2 => {
            if band == last {
                cur as u8
            } else {
                let above = table[band + 1][phase_idx] as i32;
                ((cur * 3 + above) / 4) as u8
            }
        }
        _ => {
            if band == last {
                cur as u8
            } else {
                let above = table[band + 1][phase_idx] as i32;
                ((cur + above) / 2) as u8
            }
        }
    }
}

/// §4.4: `((s - 128) << 7)`, converting an 8-bit unsigned LUT sample to Q1.15.
#[inline]
pub fn lut_to_q15(s: u8) -> i16 {
    ((s as i32 - 128) << 7) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mipmaps_have_expected_shape() {
        assert_eq!(SQUARE_MIPMAP.len(), BANDS);
        assert_eq!(SQUARE_MIPMAP[0].len(), TABLE_LEN);
        assert_eq!(HARDSYNC_MIPMAP.len(), HARDSYNC_BANDS);
        assert_eq!(HARDSYNC_MIPMAP[0].len(), HARDSYNC_LEN);
    }

    #[test]
    fn band_edges_degenerate_to_self() {
        let band0 = blend_mipmap(&SQUARE_MIPMAP, 0, 0, 10);
        assert_eq!(band0, SQUARE_MIPMAP[0][10]);
        let last = BANDS - 1;
        let band_last = blend_mipmap(&SQUARE_MIPMAP, last, 3, 10);
        assert_eq!(band_last, SQUARE_MIPMAP[last][10]);
    }

    #[test]
    fn lut_midpoint_is_silence() {
        assert_eq!(lut_to_q15(128), 0);
    }
}
