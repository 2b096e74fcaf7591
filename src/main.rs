use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use cantio::{spawn_engine, EngineCommand, EngineConfig, EngineUpdate, PlaybackState};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal;
use tracing_subscriber::EnvFilter;

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let midi_path = PathBuf::from(
        args.next()
            .context("usage: cantio <file.mid> [sample-dir]")?,
    );
    let sample_dir = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("samples"));

    let engine = spawn_engine(EngineConfig { sample_dir });
    engine
        .command_tx
        .send(EngineCommand::LoadFile(midi_path))?;

    terminal::enable_raw_mode()?;
    let _guard = RawModeGuard; // auto drops when out of scope
    println!(
        "space play/pause | s stop | \u{2190}/\u{2192} seek 5s | -/+ tempo | \u{2193}/\u{2191} volume | 0-9 instrument | m mute drums | j json | w wav | q quit\r"
    );

    let mut playing = false;
    let mut position = 0.0f64;
    let mut tempo: u16 = 100;
    let mut volume: u8 = 70;
    let mut drums_muted = false;

    loop {
        while let Ok(update) = engine.update_rx.try_recv() {
            match update {
                EngineUpdate::Loaded {
                    duration,
                    tracks,
                    notes,
                } => {
                    print!("\rloaded {tracks} tracks, {notes} notes, {duration:.1}s          ");
                }
                EngineUpdate::Playback {
                    state,
                    position: pos,
                    duration,
                } => {
                    playing = state == PlaybackState::Playing;
                    position = pos;
                    print!(
                        "\r[{state:?}] {position:6.1}s / {duration:.1}s  tempo {tempo}%  vol {volume}%      "
                    );
                }
                EngineUpdate::Exported { path } => print!("\rexported {}          ", path.display()),
                EngineUpdate::Rendered { path } => print!("\rrendered {}          ", path.display()),
                EngineUpdate::Error { message } => print!("\rerror: {message}          "),
            }
            std::io::stdout().flush()?;
        }

        if !event::poll(Duration::from_millis(50))? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        let tx = &engine.command_tx;
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => {
                tx.send(EngineCommand::Shutdown)?;
                break;
            }
            KeyCode::Char(' ') => {
                tx.send(if playing {
                    EngineCommand::Pause
                } else {
                    EngineCommand::Play
                })?;
                playing = !playing;
            }
            KeyCode::Char('s') => tx.send(EngineCommand::Stop)?,
            KeyCode::Left => tx.send(EngineCommand::Seek((position - 5.0).max(0.0)))?,
            KeyCode::Right => tx.send(EngineCommand::Seek(position + 5.0))?,
            KeyCode::Char('-') => {
                tempo = tempo.saturating_sub(25).max(25);
                tx.send(EngineCommand::SetTempo(tempo))?;
            }
            KeyCode::Char('+') | KeyCode::Char('=') => {
                tempo = (tempo + 25).min(300);
                tx.send(EngineCommand::SetTempo(tempo))?;
            }
            KeyCode::Down => {
                volume = volume.saturating_sub(10);
                tx.send(EngineCommand::SetVolume(volume))?;
            }
            KeyCode::Up => {
                volume = (volume + 10).min(100);
                tx.send(EngineCommand::SetVolume(volume))?;
            }
            KeyCode::Char('m') => {
                drums_muted = !drums_muted;
                tx.send(EngineCommand::SetChannelMute(9, drums_muted))?;
            }
            KeyCode::Char('j') => tx.send(EngineCommand::ExportJson(PathBuf::from("export.json")))?,
            KeyCode::Char('w') => tx.send(EngineCommand::RenderWav(PathBuf::from("render.wav")))?,
            // Digits pick the first program of each GM family.
            KeyCode::Char(c @ '0'..='9') => {
                let program = (c as u8 - b'0') * 8;
                tx.send(EngineCommand::ChangeInstrument(program))?;
            }
            _ => {}
        }
    }
    Ok(())
}

struct RawModeGuard;

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}
