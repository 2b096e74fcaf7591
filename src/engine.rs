//! The engine thread: single owner of transport and registry state, driven
//! by commands from the UI thread and a short tick while playing.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{error, info};

use crate::audio::{
    start_output, ChannelRegistry, LogObserver, NoteObserver, OutputStream, SampleLibrary,
    VoiceFactory,
};
use crate::midi::{self, MidiData};
use crate::render;
use crate::timing::scheduler::pair_notes;
use crate::timing::tempo::TempoMap;
use crate::timing::transport::{export_data, PlaybackState, Transport};

const ACTIVE_TICK: Duration = Duration::from_millis(1);
const IDLE_TICK: Duration = Duration::from_millis(50);
const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub enum EngineCommand {
    LoadFile(PathBuf),
    LoadBytes(Vec<u8>),
    Play,
    Pause,
    Stop,
    Seek(f64),
    SetTempo(u16),
    SetVolume(u8),
    ChangeInstrument(u8),
    SetChannelMute(u8, bool),
    SetSolo(Option<u8>),
    ExportJson(PathBuf),
    RenderWav(PathBuf),
    Shutdown,
}

#[derive(Debug, Clone)]
pub enum EngineUpdate {
    Loaded {
        duration: f64,
        tracks: usize,
        notes: usize,
    },
    Playback {
        state: PlaybackState,
        position: f64,
        duration: f64,
    },
    Exported {
        path: PathBuf,
    },
    Rendered {
        path: PathBuf,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub sample_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_dir: PathBuf::from("samples"),
        }
    }
}

pub struct EngineHandle {
    pub command_tx: Sender<EngineCommand>,
    pub update_rx: Receiver<EngineUpdate>,
}

pub fn spawn_engine(config: EngineConfig) -> EngineHandle {
    let (command_tx, command_rx) = crossbeam::channel::unbounded();
    let (update_tx, update_rx) = crossbeam::channel::unbounded();

    std::thread::spawn(move || {
        engine_thread(config, command_rx, update_tx);
    });

    EngineHandle {
        command_tx,
        update_rx,
    }
}

struct EngineState {
    library: Arc<SampleLibrary>,
    observer: Arc<dyn NoteObserver>,
    loaded: Option<MidiData>,
    transport: Option<Transport>,
    output: Option<OutputStream>,
}

impl EngineState {
    /// Warm-up gate: builds the audio output on first need and a transport
    /// for the loaded file. Everything transport-shaped funnels through
    /// here.
    fn ensure_transport(&mut self) -> Result<&mut Transport, String> {
        if self.transport.is_none() {
            let Some(data) = self.loaded.as_ref() else {
                return Err("no MIDI file loaded".into());
            };
            if self.output.is_none() {
                self.output = Some(start_output().map_err(|e| e.to_string())?);
            }
            let sink = self.output.as_ref().expect("just created").sink.clone();
            let factory = VoiceFactory::new(sink.clone(), self.library.clone());
            let registry = ChannelRegistry::new(factory, sink);
            self.transport = Some(Transport::new(data, registry, self.observer.clone()));
        }
        Ok(self.transport.as_mut().expect("just created"))
    }

    fn install_loaded(&mut self, data: MidiData, update_tx: &Sender<EngineUpdate>) {
        if let Some(mut old) = self.transport.take() {
            old.dispose();
        }

        let tempo = TempoMap::from_midi(&data);
        let duration = tempo.duration_seconds(&data);
        let _ = update_tx.send(EngineUpdate::Loaded {
            duration,
            tracks: data.tracks.len(),
            notes: data.note_count(),
        });
        info!(duration, tracks = data.tracks.len(), "MIDI file loaded");
        self.loaded = Some(data);

        // With the device already warm the new transport exists right away;
        // otherwise it is built on the first play.
        if self.output.is_some() {
            if let Err(message) = self.ensure_transport() {
                let _ = update_tx.send(EngineUpdate::Error { message });
            }
        }
    }
}

fn engine_thread(
    config: EngineConfig,
    command_rx: Receiver<EngineCommand>,
    update_tx: Sender<EngineUpdate>,
) {
    let mut state = EngineState {
        library: Arc::new(SampleLibrary::load(&config.sample_dir)),
        observer: Arc::new(LogObserver),
        loaded: None,
        transport: None,
        output: None,
    };
    let mut last_progress = Instant::now();

    loop {
        let playing = state.transport.as_ref().is_some_and(Transport::is_playing);
        let timeout = if playing { ACTIVE_TICK } else { IDLE_TICK };

        match command_rx.recv_timeout(timeout) {
            Ok(EngineCommand::Shutdown) => break,
            Ok(command) => handle_command(&mut state, command, &update_tx),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if let Some(transport) = state.transport.as_mut() {
            let was_playing = transport.is_playing();
            transport.tick();
            transport.service_sample_loads();

            let stopped_now = was_playing && !transport.is_playing();
            if stopped_now || (was_playing && last_progress.elapsed() >= PROGRESS_INTERVAL) {
                last_progress = Instant::now();
                let _ = update_tx.send(EngineUpdate::Playback {
                    state: transport.state(),
                    position: transport.position(),
                    duration: transport.duration(),
                });
            }
        }
    }

    if let Some(transport) = state.transport.as_mut() {
        transport.dispose();
    }
    info!("engine thread exiting");
}

fn handle_command(state: &mut EngineState, command: EngineCommand, update_tx: &Sender<EngineUpdate>) {
    let result = match command {
        EngineCommand::LoadFile(path) => match midi::load_file(&path) {
            Ok(data) => {
                state.install_loaded(data, update_tx);
                Ok(true)
            }
            // A failed load leaves the previous file playable.
            Err(err) => Err(format!("{err}")),
        },
        EngineCommand::LoadBytes(bytes) => match midi::parse(&bytes) {
            Ok(data) => {
                state.install_loaded(data, update_tx);
                Ok(true)
            }
            Err(err) => Err(format!("{err}")),
        },
        EngineCommand::Play => state.ensure_transport().map(|t| {
            t.play();
            true
        }),
        EngineCommand::Pause => state.ensure_transport().map(|t| {
            t.pause();
            true
        }),
        EngineCommand::Stop => state.ensure_transport().map(|t| {
            t.stop();
            true
        }),
        EngineCommand::Seek(seconds) => state.ensure_transport().map(|t| {
            t.seek(seconds);
            true
        }),
        EngineCommand::SetTempo(percent) => state.ensure_transport().map(|t| {
            t.set_tempo(percent);
            true
        }),
        EngineCommand::SetVolume(percent) => state.ensure_transport().map(|t| {
            t.set_volume(percent);
            true
        }),
        EngineCommand::ChangeInstrument(program) => state.ensure_transport().map(|t| {
            t.change_instrument(program);
            true
        }),
        EngineCommand::SetChannelMute(channel, muted) => state.ensure_transport().map(|t| {
            t.set_channel_mute(channel, muted);
            false
        }),
        EngineCommand::SetSolo(channel) => state.ensure_transport().map(|t| {
            t.set_solo(channel);
            false
        }),
        EngineCommand::ExportJson(path) => export_json(state, &path).map(|()| {
            let _ = update_tx.send(EngineUpdate::Exported { path });
            false
        }),
        EngineCommand::RenderWav(path) => render_wav(state, &path).map(|()| {
            let _ = update_tx.send(EngineUpdate::Rendered { path });
            false
        }),
        EngineCommand::Shutdown => unreachable!("handled by the loop"),
    };

    match result {
        Ok(report_playback) => {
            if report_playback {
                if let Some(transport) = state.transport.as_ref() {
                    let _ = update_tx.send(EngineUpdate::Playback {
                        state: transport.state(),
                        position: transport.position(),
                        duration: transport.duration(),
                    });
                }
            }
        }
        Err(message) => {
            error!(%message, "engine command failed");
            let _ = update_tx.send(EngineUpdate::Error { message });
        }
    }
}

fn export_json(state: &EngineState, path: &PathBuf) -> Result<(), String> {
    let export = match (&state.transport, &state.loaded) {
        (Some(transport), _) => transport.export_to_json(),
        (None, Some(data)) => {
            let tempo = TempoMap::from_midi(data);
            export_data(&pair_notes(data, &tempo))
        }
        (None, None) => return Err("no MIDI file loaded".into()),
    };
    let json = serde_json::to_string_pretty(&export).map_err(|e| e.to_string())?;
    std::fs::write(path, json).map_err(|e| e.to_string())
}

fn render_wav(state: &EngineState, path: &PathBuf) -> Result<(), String> {
    let Some(data) = state.loaded.as_ref() else {
        return Err("no MIDI file loaded".into());
    };
    render::render_wav(data, path)
        .map(|_| ())
        .map_err(|e| e.to_string())
}
