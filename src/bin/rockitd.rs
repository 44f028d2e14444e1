//! `rockitd`: the CLI binary wiring the synth core to its external collaborators (§6) —
//! a cpal PCM sink, a midir MIDI transport, a TCP bridge for network-forwarded MIDI-like
//! events, and a cooperative stdin CLI. None of this lives in the core; it exists so the
//! crate builds and runs end to end around the render loop.

use std::io::{BufRead, Read};
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, Stream, StreamConfig};
use log::{error, info, warn};
use midir::{Ignore, MidiInput};

use rockit_para::{midi, Engine};

/// Config: CLI flags with environment-variable fallback, in the env-var-aware
/// construction style `settings.rs` uses in `mdemin914-Cypher`.
#[derive(Parser, Debug)]
#[command(name = "rockitd", about = "Paraphonic subtractive synth render daemon")]
struct Config {
    /// Output sample rate in Hz.
    #[arg(long, env = "ROCKIT_SAMPLE_RATE", default_value_t = 48000)]
    sample_rate: u32,

    /// PCM period size in frames.
    #[arg(long, env = "ROCKIT_PERIOD_FRAMES", default_value_t = 256)]
    period_frames: u32,

    /// Substring match against available MIDI input port names; first match wins. Omit
    /// to use the first available port.
    #[arg(long, env = "ROCKIT_MIDI_PORT")]
    midi_port: Option<String>,

    /// TCP bind address for the network MIDI-like event bridge.
    #[arg(long, env = "ROCKIT_BIND_ADDR", default_value = "127.0.0.1:7070")]
    bind_addr: String,

    /// Directory patches are saved to and recalled from.
    #[arg(long, env = "ROCKIT_PATCH_DIR", default_value = "patches")]
    patch_dir: PathBuf,
}

fn main() -> Result<()> {
    env_logger::init();
    let config = Config::parse();
    std::fs::create_dir_all(&config.patch_dir)
        .with_context(|| format!("creating patch directory {}", config.patch_dir.display()))?;

    let engine = Arc::new(Engine::new(config.sample_rate as i32, config.patch_dir.clone()));
    let shutdown = Arc::new(AtomicBool::new(false));

    let _stream = start_audio_sink(&engine, config.sample_rate, config.period_frames)?;
    let _midi_conn = start_midi_transport(&engine, config.midi_port.as_deref());
    let _tcp_handle = start_tcp_transport(&engine, &config.bind_addr, shutdown.clone())?;

    info!("rockitd ready; type 'help' at the prompt, 'quit' to exit");
    run_stdin_cli(&engine, shutdown.clone());

    shutdown.store(true, Ordering::Relaxed);
    Ok(())
}

/// Builds and starts the cpal output stream: the core's one permitted suspension point is
/// the sink write backpressure (§5); with cpal's callback model that backpressure is
/// internal to the host, so the render call itself remains the only thing we drive here.
fn start_audio_sink(engine: &Arc<Engine>, sample_rate: u32, period_frames: u32) -> Result<Stream> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .context("no default output device")?;
    info!("using output device: {}", device.name().unwrap_or_default());

    let default_config = device.default_output_config()?;
    let sample_format = default_config.sample_format();
    let mut stream_config: StreamConfig = default_config.into();
    stream_config.channels = 2;
    stream_config.sample_rate = cpal::SampleRate(sample_rate);
    stream_config.buffer_size = cpal::BufferSize::Fixed(period_frames);

    let err_fn = |err| error!("audio sink error: {err}");

    let stream = match sample_format {
        SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, engine.clone(), err_fn)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, engine.clone(), err_fn)?,
        SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, engine.clone(), err_fn)?,
        other => anyhow::bail!("unsupported sample format: {other:?}"),
    };
    stream.play()?;
    Ok(stream)
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    engine: Arc<Engine>,
    err_fn: impl FnMut(cpal::StreamError) + Send + 'static,
) -> Result<Stream>
where
    T: Sample + cpal::SizedSample + FromSample<i16>,
{
    let mut scratch: Vec<i16> = Vec::new();
    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let frames = data.len() / 2;
            scratch.resize(frames * 2, 0);
            engine.render(&mut scratch, frames);
            for (dst, &src) in data.iter_mut().zip(scratch.iter()) {
                *dst = T::from_sample(src);
            }
        },
        err_fn,
        None,
    )?;
    Ok(stream)
}

/// Opens a midir input connection on the first port matching `port_substr` (or the first
/// available port). Each incoming 3-byte message is parsed and dispatched into the engine
/// from the MIDI library's own callback thread — a control thread per §5.
fn start_midi_transport(
    engine: &Arc<Engine>,
    port_substr: Option<&str>,
) -> Option<midir::MidiInputConnection<()>> {
    let mut midi_in = match MidiInput::new("rockit-para") {
        Ok(m) => m,
        Err(e) => {
            warn!("midi input unavailable: {e}");
            return None;
        }
    };
    midi_in.ignore(Ignore::None);

    let ports = midi_in.ports();
    let port = ports.iter().find(|p| {
        port_substr.is_none_or(|needle| {
            midi_in
                .port_name(p)
                .map(|name| name.contains(needle))
                .unwrap_or(false)
        })
    });
    let Some(port) = port.or_else(|| ports.first()) else {
        warn!("no MIDI input ports available");
        return None;
    };
    let port_name = midi_in.port_name(port).unwrap_or_default();
    info!("connecting to MIDI input: {port_name}");

    let engine = engine.clone();
    midi_in
        .connect(
            port,
            "rockit-para-in",
            move |_stamp, message, _| dispatch_raw(&engine, message),
            (),
        )
        .map_err(|e| warn!("failed to connect MIDI input {port_name}: {e}"))
        .ok()
}

/// TCP bridge (§6, out-of-scope collaborator): accepts connections and forwards each
/// 3-byte MIDI-like message read from the socket into the control path, on its own
/// transport thread per §5.
fn start_tcp_transport(
    engine: &Arc<Engine>,
    bind_addr: &str,
    shutdown: Arc<AtomicBool>,
) -> Result<std::thread::JoinHandle<()>> {
    let listener = TcpListener::bind(bind_addr)
        .with_context(|| format!("binding TCP MIDI bridge to {bind_addr}"))?;
    listener.set_nonblocking(true)?;
    info!("TCP MIDI bridge listening on {bind_addr}");

    let engine = engine.clone();
    Ok(std::thread::spawn(move || {
        while !shutdown.load(Ordering::Relaxed) {
            match listener.accept() {
                Ok((stream, addr)) => {
                    info!("TCP MIDI bridge: connection from {addr}");
                    let engine = engine.clone();
                    let shutdown = shutdown.clone();
                    std::thread::spawn(move || handle_tcp_connection(stream, &engine, shutdown));
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(Duration::from_millis(50));
                }
                Err(e) => {
                    warn!("TCP MIDI bridge accept error: {e}");
                    std::thread::sleep(Duration::from_millis(200));
                }
            }
        }
    }))
}

fn handle_tcp_connection(mut stream: TcpStream, engine: &Arc<Engine>, shutdown: Arc<AtomicBool>) {
    stream
        .set_read_timeout(Some(Duration::from_millis(200)))
        .ok();
    let mut buf = [0u8; 3];
    while !shutdown.load(Ordering::Relaxed) {
        match stream.read_exact(&mut buf) {
            Ok(()) => dispatch_raw(engine, &buf),
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(_) => break,
        }
    }
}

fn dispatch_raw(engine: &Engine, message: &[u8]) {
    if message.len() < 3 {
        return;
    }
    match midi::parse(message[0], message[1], message[2]) {
        Some(midi::MidiEvent::NoteOn { note, velocity }) => engine.note_on(note, velocity),
        Some(midi::MidiEvent::NoteOff { note }) => engine.note_off(note),
        Some(midi::MidiEvent::ControlChange { controller, value }) => {
            midi::dispatch_cc(engine, controller, value)
        }
        None => {}
    }
}

/// Cooperative stdin CLI on the main thread (§5): a tiny line-oriented control surface
/// for exercising the engine without a MIDI device. Reads block the main thread only —
/// never the audio thread, which runs entirely inside the cpal callback.
fn run_stdin_cli(engine: &Engine, shutdown: Arc<AtomicBool>) {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("on") => {
                if let (Some(note), vel) = (parts.next().and_then(|s| s.parse().ok()), parts.next().and_then(|s| s.parse().ok())) {
                    engine.note_on(note, vel.unwrap_or(100));
                }
            }
            Some("off") => {
                if let Some(note) = parts.next().and_then(|s| s.parse().ok()) {
                    engine.note_off(note);
                }
            }
            Some("cc") => {
                if let (Some(num), Some(val)) = (
                    parts.next().and_then(|s| s.parse().ok()),
                    parts.next().and_then(|s| s.parse().ok()),
                ) {
                    midi::dispatch_cc(engine, num, val);
                }
            }
            Some("help") => {
                println!("commands: on <note> [vel], off <note>, cc <num> <val>, quit");
            }
            Some("quit") | Some("exit") => break,
            _ => {}
        }
        if shutdown.load(Ordering::Relaxed) {
            break;
        }
    }
}
