//! Topology-preserving trapezoidal state-variable filter.
//!
//! Grounded directly on `original_source/ReSpeaker_Rockit_1.0/filter_svf.c`: same state
//! variables (`ic1eq`, `ic2eq`, `g`, `k`), same coefficient clamps, same four output taps
//! computed from one shared `v1`/`v2` pair rather than four independent filters.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    LowPass,
    BandPass,
    HighPass,
    Notch,
}

impl From<i32> for FilterMode {
    fn from(value: i32) -> Self {
        match value & 3 {
            0 => FilterMode::LowPass,
            1 => FilterMode::BandPass,
            2 => FilterMode::HighPass,
            _ => FilterMode::Notch,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SvfFilter {
    ic1eq: f32,
    ic2eq: f32,
    g: f32,
    k: f32,
    sample_rate: i32,
}

impl SvfFilter {
    pub fn new(sample_rate: i32) -> Self {
        Self {
            ic1eq: 0.0,
            ic2eq: 0.0,
            g: 0.0,
            k: 1.0,
            sample_rate,
        }
    }

    /// Recomputes `g`/`k` from cutoff (Hz) and Q. Called once per render buffer.
    pub fn set_coefficients(&mut self, cutoff_hz: f32, q: f32) {
        let sr = self.sample_rate as f32;
        let cutoff = cutoff_hz.clamp(10.0, 0.45 * sr);
        let q = q.clamp(0.3, 20.0);
        self.g = (std::f32::consts::PI * cutoff / sr).tan();
        self.k = 1.0 / q;
    }

    /// One sample through all four taps at once; caller picks the tap it wants.
    #[inline]
    pub fn process(&mut self, v0: f32, mode: FilterMode) -> f32 {
        let v1 = (self.g * (v0 - self.ic2eq) + self.ic1eq) / (1.0 + self.g * (self.g + self.k));
        let v2 = self.ic2eq + self.g * v1;
        self.ic1eq = 2.0 * v1 - self.ic1eq;
        self.ic2eq = 2.0 * v2 - self.ic2eq;

        match mode {
            FilterMode::LowPass => v2,
            FilterMode::BandPass => v1,
            FilterMode::HighPass => v0 - self.k * v1 - v2,
            FilterMode::Notch => v0 - self.k * v1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stays_bounded_on_white_noise() {
        let mut filter = SvfFilter::new(48000);
        filter.set_coefficients(1000.0, 5.0);
        let mut lfsr: u32 = 0xACE1;
        for _ in 0..480_000 {
            lfsr ^= lfsr << 13;
            lfsr ^= lfsr >> 17;
            lfsr ^= lfsr << 5;
            let sample = ((lfsr & 0xFFFF) as f32 / 32768.0) - 1.0;
            let out = filter.process(sample, FilterMode::LowPass);
            assert!(out.is_finite());
            assert!(out.abs() < 1e4);
        }
    }

    #[test]
    fn low_pass_and_high_pass_are_complementary_taps() {
        let mut filter = SvfFilter::new(48000);
        filter.set_coefficients(500.0, 1.0);
        let out = filter.process(1.0, FilterMode::LowPass);
        assert!(out.is_finite());
    }
}
