//! # Player
//!
//! One [`Player`] per guild. It owns the song queue, the vote ledger and the
//! handle to the voice connection, and runs exactly one background driver task
//! that streams the queue into the [`MediaSink`].
//!
//! ## States
//!
//! ```text
//! Idle ──join──► ConnectedIdle ──enqueue──► Playing ◄──resume── Paused
//!                    ▲                        │  └────pause────►  │
//!                    └──── stop / queue empty ┘                   │
//! any ──destroy──► Destroyed ◄────────────────────────────────────┘
//! ```
//!
//! The driver is the only writer of the current song and the only caller of
//! `play`/`stop` on the sink. Command handlers talk to it through a signal
//! channel (wake, skip, stop) and share the queue and vote ledger behind a
//! single lock.

use parking_lot::{Mutex, RwLock};
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        queue::SongQueue,
        sink::{Announcer, Completion, MediaSink, PlaybackEnd, VoiceConnector},
        song::Song,
        votes::{required_votes, Ballot, GatedCommand, VoteLedger, VoteOutcome, Voter},
    },
    error::{PlayerError, Result},
    ui::messages,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    #[default]
    Off,
    /// Repite la canción actual
    Single,
    /// Reinserta cada canción terminada al final de la cola
    Queue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerStatus {
    Idle,
    ConnectedIdle,
    Playing,
    Paused,
    Destroyed,
}

/// Señales que los comandos envían al driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DriverSignal {
    Wake,
    Skip,
    Stop,
}

/// Por qué terminó el driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DriverExit {
    Shutdown,
    SinkFailed,
}

enum SongEnd {
    Finished,
    Interrupted,
    Errored(String),
    Shutdown,
}

/// Valores iniciales de un reproductor nuevo.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerOptions {
    pub volume: f32,
    pub notify: bool,
    /// Fallos consecutivos del sink antes de destruir el reproductor
    pub max_sink_failures: u32,
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self {
            volume: 0.5,
            notify: true,
            max_sink_failures: 3,
        }
    }
}

/// Estado mutable compartido entre comandos y driver, siempre bajo un mismo lock.
#[derive(Debug)]
pub struct PlaybackState {
    queue: SongQueue,
    current: Option<Song>,
    loop_mode: LoopMode,
    volume: f32,
    notify: bool,
    votes: VoteLedger,
    /// La canción interrumpida vuelve a la cabeza; el loop de cola no la reinserta
    restarting: bool,
    signals: mpsc::UnboundedSender<DriverSignal>,
}

impl PlaybackState {
    fn new(options: &PlayerOptions, signals: mpsc::UnboundedSender<DriverSignal>) -> Self {
        Self {
            queue: SongQueue::new(),
            current: None,
            loop_mode: LoopMode::Off,
            volume: options.volume.clamp(0.0, 1.0),
            notify: options.notify,
            votes: VoteLedger::new(),
            restarting: false,
            signals,
        }
    }

    pub fn queue(&self) -> &SongQueue {
        &self.queue
    }

    pub fn queue_mut(&mut self) -> &mut SongQueue {
        &mut self.queue
    }

    pub fn current(&self) -> Option<&Song> {
        self.current.as_ref()
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn notify(&self) -> bool {
        self.notify
    }

    /// Interrumpe la canción actual; el driver avanza según el modo loop
    pub fn skip(&self) {
        self.signal(DriverSignal::Skip);
    }

    /// Vuelve a empezar la canción actual.
    ///
    /// Con loop de canción basta con saltar; en otro caso una copia nueva pasa
    /// a la cabeza de la cola y la interrumpida no vuelve a la rotación.
    pub fn start_over(&mut self) -> Result<Song> {
        let song = self.current.clone().ok_or(PlayerError::NothingPlaying)?;
        if self.loop_mode != LoopMode::Single {
            self.queue.enqueue_front(song.restarted());
            self.restarting = true;
        }
        self.skip();
        Ok(song)
    }

    /// URLs de la canción actual seguida de la cola, en orden
    pub fn export_urls(&self) -> Vec<String> {
        self.current
            .iter()
            .chain(self.queue.iter())
            .map(|song| song.url().to_string())
            .collect()
    }

    pub(crate) fn signal(&self, signal: DriverSignal) {
        if self.signals.send(signal).is_err() {
            debug!("Driver detenido, señal {:?} descartada", signal);
        }
    }

    /// Decide la siguiente canción y la deja como actual.
    pub(crate) fn advance(&mut self) -> Option<Song> {
        let restarting = std::mem::take(&mut self.restarting);

        match (self.current.take(), self.loop_mode) {
            (Some(_), _) if restarting => {}
            (Some(finished), LoopMode::Single) => {
                debug!("🔂 Repitiendo: {}", finished.title());
                self.current = Some(finished.clone());
                return Some(finished);
            }
            (Some(finished), LoopMode::Queue) => {
                debug!("🔁 Reinsertada al final por loop de cola: {}", finished.title());
                self.queue.enqueue(finished);
            }
            _ => {}
        }

        self.current = self.queue.dequeue().ok();
        self.current.clone()
    }
}

#[derive(Clone)]
struct VoiceConnection {
    channel_id: ChannelId,
    sink: Arc<dyn MediaSink>,
}

pub struct Player {
    guild_id: GuildId,
    text_channel: RwLock<ChannelId>,
    connection: RwLock<Option<VoiceConnection>>,
    join_lock: tokio::sync::Mutex<()>,
    state: Mutex<PlaybackState>,
    shutdown: CancellationToken,
    announcer: Arc<dyn Announcer>,
    max_sink_failures: u32,
}

impl Player {
    /// Crea el reproductor y el receptor de señales que debe consumir su driver.
    pub(crate) fn new(
        guild_id: GuildId,
        text_channel: ChannelId,
        options: PlayerOptions,
        announcer: Arc<dyn Announcer>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<DriverSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();

        let player = Arc::new(Self {
            guild_id,
            text_channel: RwLock::new(text_channel),
            connection: RwLock::new(None),
            join_lock: tokio::sync::Mutex::new(()),
            state: Mutex::new(PlaybackState::new(&options, tx)),
            shutdown: CancellationToken::new(),
            announcer,
            max_sink_failures: options.max_sink_failures.max(1),
        });

        (player, rx)
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn text_channel(&self) -> ChannelId {
        *self.text_channel.read()
    }

    pub fn bind_text_channel(&self, channel_id: ChannelId) {
        *self.text_channel.write() = channel_id;
    }

    pub fn voice_channel(&self) -> Option<ChannelId> {
        self.connection.read().as_ref().map(|c| c.channel_id)
    }

    pub fn is_connected(&self) -> bool {
        self.connection.read().is_some()
    }

    pub fn is_destroyed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Resolves when the player gets destroyed.
    pub async fn destroyed(&self) {
        self.shutdown.cancelled().await
    }

    pub fn status(&self) -> PlayerStatus {
        if self.is_destroyed() {
            return PlayerStatus::Destroyed;
        }

        let Some(sink) = self.sink() else {
            return PlayerStatus::Idle;
        };

        if self.state.lock().current.is_none() {
            PlayerStatus::ConnectedIdle
        } else if sink.is_paused() {
            PlayerStatus::Paused
        } else {
            PlayerStatus::Playing
        }
    }

    pub fn current(&self) -> Option<Song> {
        self.state.lock().current.clone()
    }

    pub fn queue_len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn queue_snapshot(&self) -> Vec<Song> {
        self.state.lock().queue.to_list()
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.state.lock().loop_mode
    }

    pub fn volume(&self) -> f32 {
        self.state.lock().volume
    }

    pub fn notify(&self) -> bool {
        self.state.lock().notify
    }

    /// Activa/desactiva los avisos de "reproduciendo ahora"
    pub fn toggle_notify(&self) -> bool {
        let mut state = self.state.lock();
        state.notify = !state.notify;
        state.notify
    }

    /// Acceso directo al estado bajo el lock (cola, ledger, modo loop).
    pub fn with_state<R>(&self, f: impl FnOnce(&mut PlaybackState) -> R) -> R {
        f(&mut self.state.lock())
    }

    /// URLs de la canción actual y de la cola, la actual primero
    pub fn export_urls(&self) -> Vec<String> {
        self.state.lock().export_urls()
    }

    /// Conecta al canal de voz, o se mueve si ya está conectado a otro.
    pub async fn join(&self, connector: &dyn VoiceConnector, channel_id: ChannelId) -> Result<()> {
        self.ensure_alive()?;
        let _guard = self.join_lock.lock().await;

        let existing = self.connection.read().clone();
        match existing {
            Some(connection) if connection.channel_id == channel_id => {
                debug!("Ya conectado al canal {} en guild {}", channel_id, self.guild_id);
            }
            Some(connection) => {
                connection.sink.move_to(channel_id).await?;
                if let Some(connection) = self.connection.write().as_mut() {
                    connection.channel_id = channel_id;
                }
                info!("🔀 Movido al canal {} en guild {}", channel_id, self.guild_id);
            }
            None => {
                let sink = connector.connect(self.guild_id, channel_id).await?;

                if self.is_destroyed() {
                    // destruido mientras conectábamos
                    if let Err(e) = sink.disconnect().await {
                        warn!("Error al desconectar en guild {}: {}", self.guild_id, e);
                    }
                    return Err(PlayerError::Destroyed);
                }

                *self.connection.write() = Some(VoiceConnection { channel_id, sink });
                info!("🔊 Conectado al canal {} en guild {}", channel_id, self.guild_id);
                self.state.lock().signal(DriverSignal::Wake);
            }
        }

        Ok(())
    }

    /// Agrega una canción a la cola y devuelve su posición (1-based)
    pub fn enqueue(&self, song: Song) -> Result<usize> {
        self.ensure_alive()?;
        let mut state = self.state.lock();
        info!("➕ Agregado a la cola en guild {}: {}", self.guild_id, song.title());
        state.queue.enqueue(song);
        state.signal(DriverSignal::Wake);
        Ok(state.queue.len())
    }

    /// Ejecuta `action` si el votante puede saltarse la votación o si su voto
    /// completa el umbral; en otro caso solo registra el voto.
    ///
    /// La acción corre bajo el mismo lock que registra el voto, de modo que la
    /// limpieza del set y la ejecución son una sola transición.
    pub fn vote_or_execute<R>(
        &self,
        command: GatedCommand,
        voter: Voter,
        listeners: usize,
        action: impl FnOnce(&mut PlaybackState) -> Result<R>,
    ) -> Result<VoteOutcome<R>> {
        self.ensure_alive()?;
        let mut state = self.state.lock();

        let is_requester = state
            .current
            .as_ref()
            .is_some_and(|song| song.requested_by() == voter.id);

        let required = match required_votes(listeners) {
            Some(required) if !voter.privileged && !is_requester => required,
            _ => {
                debug!(
                    "Votación de {} omitida para {} en guild {}",
                    command, voter.id, self.guild_id
                );
                state.votes.clear(command);
                return action(&mut state).map(VoteOutcome::Executed);
            }
        };

        match state.votes.cast(command, voter.id, required) {
            Ballot::Passed => {
                info!("🗳️ Votación de {} aprobada en guild {}", command, self.guild_id);
                action(&mut state).map(VoteOutcome::Executed)
            }
            Ballot::Pending { votes } => Ok(VoteOutcome::Pending { votes, required }),
            Ballot::AlreadyVoted { votes } => Ok(VoteOutcome::AlreadyVoted { votes, required }),
        }
    }

    /// Cambia el modo loop; `Single` y `Queue` se excluyen mutuamente
    pub fn set_loop_mode(&self, mode: LoopMode) {
        self.state.lock().loop_mode = mode;
        match mode {
            LoopMode::Off => info!("➡️ Repetición desactivada en guild {}", self.guild_id),
            LoopMode::Single => info!("🔂 Repetir canción activado en guild {}", self.guild_id),
            LoopMode::Queue => info!("🔁 Repetir cola activado en guild {}", self.guild_id),
        }
    }

    /// Ajusta el volumen a partir de un porcentaje en `[0, 100]`
    pub fn set_volume(&self, percent: i32) -> Result<f32> {
        if !(0..=100).contains(&percent) {
            warn!("Volumen inválido {} en guild {}", percent, self.guild_id);
            return Err(PlayerError::InvalidVolume(percent));
        }

        let volume = percent as f32 / 100.0;
        let sink = self.sink();
        let mut state = self.state.lock();

        if let (Some(sink), Some(_)) = (sink, state.current.as_ref()) {
            sink.set_volume(volume)?;
        }
        state.volume = volume;

        info!("🔊 Volumen ajustado a {}% en guild {}", percent, self.guild_id);
        Ok(volume)
    }

    /// Pausa la reproducción; `false` si no había nada sonando
    pub fn pause(&self) -> Result<bool> {
        let sink = self.sink().ok_or(PlayerError::NotConnected)?;
        if self.state.lock().current.is_none() {
            return Err(PlayerError::NothingPlaying);
        }
        if !sink.is_playing() {
            return Ok(false);
        }

        sink.pause()?;
        info!("⏸️ Reproducción pausada en guild {}", self.guild_id);
        Ok(true)
    }

    /// Reanuda la reproducción; `false` si no estaba pausada
    pub fn resume(&self) -> Result<bool> {
        let sink = self.sink().ok_or(PlayerError::NotConnected)?;
        if self.state.lock().current.is_none() {
            return Err(PlayerError::NothingPlaying);
        }
        if !sink.is_paused() {
            return Ok(false);
        }

        sink.resume()?;
        info!("▶️ Reproducción reanudada en guild {}", self.guild_id);
        Ok(true)
    }

    /// Salta la canción actual sin votación
    pub fn skip(&self) -> Result<()> {
        let state = self.state.lock();
        if state.current.is_none() {
            return Err(PlayerError::NothingPlaying);
        }
        state.skip();
        Ok(())
    }

    /// Limpia la cola, desactiva los loops y detiene la canción actual
    pub fn stop(&self) {
        let mut state = self.state.lock();
        state.queue.clear();
        state.loop_mode = LoopMode::Off;
        if state.current.is_some() {
            state.signal(DriverSignal::Stop);
        }
        info!("⏹️ Reproducción detenida en guild {}", self.guild_id);
    }

    pub async fn announce(&self, message: String) {
        self.announcer.announce(self.text_channel(), message).await;
    }

    /// Cancela el driver y libera la conexión de voz
    pub(crate) async fn destroy(&self) {
        self.shutdown.cancel();

        let connection = self.connection.write().take();
        if let Some(connection) = connection {
            if let Err(e) = connection.sink.stop() {
                debug!("Error al detener el sink en guild {}: {}", self.guild_id, e);
            }
            if let Err(e) = connection.sink.disconnect().await {
                warn!("Error al desconectar en guild {}: {}", self.guild_id, e);
            }
        }

        info!("👋 Reproductor destruido en guild {}", self.guild_id);
    }

    /// Bucle de reproducción; termina al destruir el reproductor o cuando el
    /// sink falla demasiadas veces seguidas.
    pub(crate) async fn drive(
        self: Arc<Self>,
        mut signals: mpsc::UnboundedReceiver<DriverSignal>,
    ) -> DriverExit {
        debug!("Driver iniciado para guild {}", self.guild_id);
        let mut failures = 0u32;

        loop {
            if self.is_destroyed() {
                return DriverExit::Shutdown;
            }

            let next = match self.sink() {
                Some(sink) => self.state.lock().advance().map(|song| (sink, song)),
                None => None,
            };

            let (sink, song) = match next {
                Some(next) => next,
                None => {
                    // Nada que reproducir: esperar a que llegue algo
                    tokio::select! {
                        _ = self.shutdown.cancelled() => return DriverExit::Shutdown,
                        signal = signals.recv() => {
                            if signal.is_none() {
                                return DriverExit::Shutdown;
                            }
                        }
                    }
                    continue;
                }
            };

            let volume = self.volume();
            info!("🎵 Reproduciendo en guild {}: {}", self.guild_id, song.title());

            let completion = match sink.play(&song, volume).await {
                Ok(completion) => completion,
                Err(e) => {
                    failures += 1;
                    error!(
                        "Error al reproducir {} en guild {} ({}/{}): {}",
                        song.title(),
                        self.guild_id,
                        failures,
                        self.max_sink_failures,
                        e
                    );
                    self.announce(messages::playback_failed(&song, &e.to_string()))
                        .await;
                    if failures >= self.max_sink_failures {
                        return DriverExit::SinkFailed;
                    }
                    continue;
                }
            };

            if self.notify() {
                self.announce(messages::now_playing(&song)).await;
            }

            match self.wait_for_end(&sink, completion, &mut signals).await {
                SongEnd::Finished => {
                    failures = 0;
                    debug!("Canción terminada en guild {}: {}", self.guild_id, song.title());
                }
                SongEnd::Interrupted => {
                    failures = 0;
                    debug!("Canción interrumpida en guild {}: {}", self.guild_id, song.title());
                }
                SongEnd::Errored(reason) => {
                    failures += 1;
                    warn!(
                        "La canción {} falló en guild {}: {}",
                        song.title(),
                        self.guild_id,
                        reason
                    );
                    self.announce(messages::playback_failed(&song, &reason)).await;
                    if failures >= self.max_sink_failures {
                        return DriverExit::SinkFailed;
                    }
                }
                SongEnd::Shutdown => {
                    if let Err(e) = sink.stop() {
                        debug!("Error al detener el sink en guild {}: {}", self.guild_id, e);
                    }
                    return DriverExit::Shutdown;
                }
            }

            // Señales pendientes eran para la canción que ya terminó
            while signals.try_recv().is_ok() {}
        }
    }

    async fn wait_for_end(
        &self,
        sink: &Arc<dyn MediaSink>,
        mut completion: Completion,
        signals: &mut mpsc::UnboundedReceiver<DriverSignal>,
    ) -> SongEnd {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return SongEnd::Shutdown,
                end = &mut completion => {
                    return match end {
                        Ok(PlaybackEnd::Errored(reason)) => SongEnd::Errored(reason),
                        Ok(PlaybackEnd::Finished) | Err(_) => SongEnd::Finished,
                    };
                }
                signal = signals.recv() => match signal {
                    Some(DriverSignal::Skip) | Some(DriverSignal::Stop) => {
                        if let Err(e) = sink.stop() {
                            warn!("Error al detener la canción en guild {}: {}", self.guild_id, e);
                        }
                        return SongEnd::Interrupted;
                    }
                    Some(DriverSignal::Wake) => {}
                    None => return SongEnd::Shutdown,
                },
            }
        }
    }

    fn sink(&self) -> Option<Arc<dyn MediaSink>> {
        self.connection.read().as_ref().map(|c| c.sink.clone())
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.is_destroyed() {
            Err(PlayerError::Destroyed)
        } else {
            Ok(())
        }
    }
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("guild_id", &self.guild_id)
            .field("text_channel", &self.text_channel())
            .field("voice_channel", &self.voice_channel())
            .field("status", &self.status())
            .finish()
    }
}
