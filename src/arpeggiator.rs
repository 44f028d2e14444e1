//! Drone mode and the fixed-pattern arpeggiator, §4.7.
//!
//! The 16x8 pattern table is reproduced verbatim from §6. Step/gate timing is grounded
//! in the general shape of `original_source/rockit_1.13_paraphonic/drone_loop.c`'s
//! step-sequencer loop, adapted to this spec's fixed-pattern (not knob-recorded) design.

pub const PATTERN_COUNT: usize = 16;
pub const PATTERN_LEN: usize = 8;

#[rustfmt::skip]
pub static PATTERNS: [[i8; PATTERN_LEN]; PATTERN_COUNT] = [
    [0, 0, 0, 0, 0, 0, 0, 0],
    [0, 0, 0, 0, 0, 0, 0, 0],
    [0, 1, 2, 3, 4, 5, 6, 7],
    [0, -1, -2, -3, -4, -5, -6, -7],
    [0, 2, 4, 6, 8, 10, 12, 14],
    [0, 4, 7, 12, 4, 7, 12, 16],
    [0, 3, 7, 11, 3, 7, 11, 12],
    [0, -2, -4, -6, -8, -10, -12, -14],
    [0, 5, 2, 6, 5, 8, 6, 10],
    [0, -5, -2, -6, -5, -8, -6, -10],
    [0, 6, 2, 7, 6, 9, 7, 11],
    [0, -6, -2, -7, -6, -9, -7, -11],
    [0, 4, 7, 11, 4, 7, 11, 12],
    [0, 1, -1, 2, -2, 3, -3, 0],
    [0, 4, 7, 12, 7, 4, 0, 12],
    [0, 3, 7, 11, 7, 3, 0, 11],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArpEvent {
    NoteOn(u8),
    NoteOff(u8),
}

#[derive(Debug, Clone, Copy)]
pub struct ArpState {
    active: bool,
    step: usize,
    sample_counter: u32,
    step_samples: u32,
    gate_samples: u32,
    gate_open: bool,
    current_note: u8,
}

impl Default for ArpState {
    fn default() -> Self {
        Self {
            active: false,
            step: 0,
            sample_counter: 0,
            step_samples: 1,
            gate_samples: 1,
            gate_open: false,
            current_note: 0,
        }
    }
}

/// §4.7: envelope-knob repurposing while drone mode is active.
pub struct DroneParams {
    pub base_note: u8,
    pub pattern: usize,
    pub amplitude_q15: i16,
    pub speed: i32,
}

pub fn drone_params_from_envelope(attack: i32, decay: i32, sustain: i32, release: i32) -> DroneParams {
    DroneParams {
        base_note: (attack.clamp(0, 127) >> 1) as u8,
        pattern: ((decay.clamp(0, 127) * 15) / 127) as usize,
        amplitude_q15: ((sustain.clamp(0, 127) * 32767) / 127) as i16,
        speed: 255 - release.clamp(0, 127),
    }
}

impl ArpState {
    /// Called once per buffer with the current drone params; recomputes step/gate
    /// timing in samples. `length` clamps the active pattern's step count.
    pub fn configure(&mut self, speed: i32, gate_param: i32, sample_rate: i32) {
        let reference_step = (48000i32 - speed.clamp(0, 255) * 360).max(240) as f32;
        self.step_samples = ((reference_step * sample_rate as f32) / 48000.0).max(1.0) as u32;
        self.gate_samples = ((self.step_samples as i64 * gate_param.clamp(0, 127) as i64) / 127).max(1) as u32;
    }

    /// Activates the arpeggiator; called on drone-mode 0->1 transition.
    pub fn activate(&mut self) {
        self.active = true;
        self.step = 0;
        self.sample_counter = 0;
        self.gate_open = false;
    }

    /// Deactivates; caller is responsible for releasing any active voices.
    pub fn deactivate(&mut self) -> Option<ArpEvent> {
        self.active = false;
        if self.gate_open {
            self.gate_open = false;
            Some(ArpEvent::NoteOff(self.current_note))
        } else {
            None
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// One sample of arpeggiator substate; emits at most one event.
    pub fn tick(&mut self, base_note: u8, pattern: usize, length: i32) -> Option<ArpEvent> {
        if !self.active {
            return None;
        }
        self.sample_counter += 1;

        if self.gate_open && self.sample_counter >= self.gate_samples {
            self.gate_open = false;
            return Some(ArpEvent::NoteOff(self.current_note));
        }

        if self.sample_counter >= self.step_samples {
            self.sample_counter = 0;
            let len = (length.clamp(1, PATTERN_LEN as i32) as usize).max(1);
            self.step = (self.step + 1) % len;
            let pattern_idx = pattern.min(PATTERN_COUNT - 1);
            let offset = PATTERNS[pattern_idx][self.step] as i32;
            let note = (base_note as i32 + offset).clamp(0, 127) as u8;
            self.current_note = note;
            self.gate_open = true;
            return Some(ArpEvent::NoteOn(note));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_table_matches_spec_row_lengths() {
        for row in PATTERNS.iter() {
            assert_eq!(row.len(), PATTERN_LEN);
        }
        assert_eq!(PATTERNS[2], [0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(PATTERNS[13], [0, 1, -1, 2, -2, 3, -3, 0]);
    }

    #[test]
    fn emits_note_on_then_note_off_within_a_step() {
        let mut arp = ArpState::default();
        arp.configure(127, 64, 48000);
        arp.activate();
        let mut events = Vec::new();
        for _ in 0..(arp.step_samples * 2) {
            if let Some(event) = arp.tick(60, 2, 8) {
                events.push(event);
            }
        }
        assert!(events.iter().any(|e| matches!(e, ArpEvent::NoteOn(_))));
        assert!(events.iter().any(|e| matches!(e, ArpEvent::NoteOff(_))));
    }

    #[test]
    fn drone_param_repurposing_matches_formulas() {
        let p = drone_params_from_envelope(64, 127, 127, 0);
        assert_eq!(p.base_note, 32);
        assert_eq!(p.pattern, 15);
        assert_eq!(p.amplitude_q15, 32767);
        assert_eq!(p.speed, 255);
    }
}
