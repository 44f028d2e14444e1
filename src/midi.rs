//! MIDI-like 3-byte event parsing and the control-change map, §6.
//!
//! The dispatch style (one `match` over the controller number writing into the
//! parameter store) mirrors `mdemin914-Cypher`'s `midi.rs::scale_midi_to_param`
//! CC-handling pattern.

use crate::engine::Engine;
use crate::params::ParamId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEvent {
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8 },
    ControlChange { controller: u8, value: u8 },
}

/// Parses one 3-byte message. Channel (low nibble of status) is ignored. Returns `None`
/// for unrecognized statuses — §7: "unknown MIDI status — ignored silently".
pub fn parse(status: u8, data1: u8, data2: u8) -> Option<MidiEvent> {
    match status & 0xF0 {
        0x80 => Some(MidiEvent::NoteOff { note: data1 }),
        0x90 => {
            if data2 == 0 {
                Some(MidiEvent::NoteOff { note: data1 })
            } else {
                Some(MidiEvent::NoteOn {
                    note: data1,
                    velocity: data2,
                })
            }
        }
        0xB0 => Some(MidiEvent::ControlChange {
            controller: data1,
            value: data2,
        }),
        _ => None,
    }
}

/// Applies a control change to the engine per §6's CC map. Unknown controller numbers
/// are ignored silently.
pub fn dispatch_cc(engine: &Engine, controller: u8, value: u8) {
    let v = value as i32;
    let params = engine.params();
    match controller {
        1 => params.set(ParamId::Lfo1Depth, v),
        7 => params.set(ParamId::MasterVolume, v),
        70 => params.set(ParamId::EnvRelease, v),
        71 => params.set(ParamId::FilterResonance, v),
        72 => params.set(ParamId::OscMix, v),
        73 => params.set(ParamId::EnvAttack, v),
        74 => params.set(ParamId::FilterCutoff, v),
        75 => params.set(ParamId::EnvDecay, v),
        76 => params.set(ParamId::SubOsc, (value >= 64) as i32),
        80 => params.set(ParamId::Osc1Wave, v >> 3),
        81 => params.set(ParamId::Osc2Wave, v >> 3),
        82 => params.set(ParamId::Tune, v),
        84 => params.set(ParamId::FilterMode, v & 3),
        85 => params.set(ParamId::FilterEnvAmount, v),
        86 => params.set(ParamId::EnvSustain, v),
        87 => params.set(ParamId::Lfo1Rate, v),
        88 => params.set(ParamId::Lfo1Shape, v >> 3),
        89 => params.set(ParamId::Lfo1Destination, v >> 4),
        90 => params.set(ParamId::Glide, v),
        91 => params.set(ParamId::DroneMode, (value >= 64) as i32),
        92 => engine.request_save_patch(value >> 3),
        93 => engine.request_recall_patch(value >> 3),
        95 => params.set(ParamId::Lfo2Rate, v),
        96 => params.set(ParamId::Lfo2Depth, v),
        97 => params.set(ParamId::Lfo2Shape, v >> 3),
        98 => params.set(ParamId::Lfo2Destination, v >> 4),
        102 => engine.select_mono_or_paraphonic(value >= 64),
        103 => engine.set_three_voice_enabled(value >= 64),
        104 => engine.cycle_allocator_mode(),
        105 => engine.toggle_three_voice_enabled(),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_on_with_zero_velocity_is_note_off() {
        assert_eq!(parse(0x90, 60, 0), Some(MidiEvent::NoteOff { note: 60 }));
    }

    #[test]
    fn recognizes_note_on() {
        assert_eq!(
            parse(0x91, 60, 100),
            Some(MidiEvent::NoteOn {
                note: 60,
                velocity: 100
            })
        );
    }

    #[test]
    fn recognizes_control_change() {
        assert_eq!(
            parse(0xB3, 74, 90),
            Some(MidiEvent::ControlChange {
                controller: 74,
                value: 90
            })
        );
    }

    #[test]
    fn unknown_status_is_ignored() {
        assert_eq!(parse(0xF0, 0, 0), None);
    }
}
