//! Lógica de los comandos de música, independiente de Discord.
//!
//! Cada comando recibe un [`Invoker`] con lo que la capa de interacciones sabe
//! del usuario (canal de voz, permisos, oyentes) y devuelve el texto de la
//! respuesta o un [`PlayerError`].

use serenity::model::id::{ChannelId, GuildId, RoleId, UserId};
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

use crate::{
    audio::{
        player::{LoopMode, PlaybackState, Player, PlayerOptions, PlayerStatus},
        registry::PlayerRegistry,
        sink::VoiceConnector,
        votes::{GatedCommand, VoteOutcome, Voter},
    },
    config::Config,
    error::{PlayerError, QueueError, Result},
    sources::{
        is_youtube_playlist, load_bin, load_playlist, parse_query, paste::PasteService, resolve_with_timeout,
        MediaResolver, SourceHint,
    },
    storage::JsonStorage,
    ui::messages,
};

/// Quién invoca un comando y desde dónde.
#[derive(Debug, Clone)]
pub struct Invoker {
    pub guild_id: GuildId,
    pub user_id: UserId,
    pub text_channel: ChannelId,
    pub voice_channel: Option<ChannelId>,
    /// DJ: permiso de gestionar el servidor o rol DJ
    pub privileged: bool,
    /// Oyentes (sin bots) del canal de voz del reproductor
    pub listeners: usize,
}

impl Invoker {
    fn voter(&self) -> Voter {
        Voter::new(self.user_id, self.privileged)
    }

    fn require_privileged(&self) -> Result<()> {
        if self.privileged {
            Ok(())
        } else {
            Err(PlayerError::NotPrivileged)
        }
    }
}

/// Decide si un miembro es DJ.
///
/// Lo es si puede gestionar el servidor, si tiene el rol configurado para el
/// guild o, sin rol configurado, un rol llamado "DJ".
pub fn is_dj(manage_guild: bool, roles: &[(RoleId, &str)], dj_role: Option<RoleId>) -> bool {
    if manage_guild {
        return true;
    }

    match dj_role {
        Some(dj_role) => roles.iter().any(|(id, _)| *id == dj_role),
        None => roles.iter().any(|(_, name)| name.eq_ignore_ascii_case("dj")),
    }
}

pub struct MusicCommands {
    registry: PlayerRegistry,
    connector: Arc<dyn VoiceConnector>,
    resolver: Arc<dyn MediaResolver>,
    paste: Arc<dyn PasteService>,
    storage: Arc<tokio::sync::Mutex<JsonStorage>>,
    resolve_timeout: Duration,
    max_bin_lines: usize,
    max_playlist_songs: usize,
    max_sink_failures: u32,
}

impl MusicCommands {
    pub fn new(
        config: &Config,
        registry: PlayerRegistry,
        connector: Arc<dyn VoiceConnector>,
        resolver: Arc<dyn MediaResolver>,
        paste: Arc<dyn PasteService>,
        storage: Arc<tokio::sync::Mutex<JsonStorage>>,
    ) -> Self {
        Self {
            registry,
            connector,
            resolver,
            paste,
            storage,
            resolve_timeout: config.resolve_timeout,
            max_bin_lines: config.max_bin_lines,
            max_playlist_songs: config.max_playlist_songs,
            max_sink_failures: config.max_sink_failures,
        }
    }

    pub fn registry(&self) -> &PlayerRegistry {
        &self.registry
    }

    pub fn storage(&self) -> &Arc<tokio::sync::Mutex<JsonStorage>> {
        &self.storage
    }

    // Conexión

    pub async fn join(&self, invoker: &Invoker) -> Result<String> {
        let player = self.ensure_player(invoker).await?;
        let voice = player.voice_channel().ok_or(PlayerError::NotConnected)?;
        Ok(messages::joined(voice, invoker.text_channel))
    }

    /// Conecta o mueve el bot a `channel` (o al canal del DJ)
    pub async fn summon(&self, invoker: &Invoker, channel: Option<ChannelId>) -> Result<String> {
        invoker.require_privileged()?;
        let target = channel
            .or(invoker.voice_channel)
            .ok_or(PlayerError::NotInVoice)?;

        self.connect(invoker, target).await?;
        Ok(messages::joined(target, invoker.text_channel))
    }

    pub async fn leave(&self, invoker: &Invoker) -> Result<String> {
        invoker.require_privileged()?;
        if !self.registry.destroy(invoker.guild_id).await {
            return Err(PlayerError::NotConnected);
        }
        Ok(messages::left())
    }

    // Reproducción

    /// Busca y encola una canción. Sin consulta, un DJ reanuda la pausa.
    pub async fn play(&self, invoker: &Invoker, query: Option<&str>) -> Result<String> {
        let query = query.map(str::trim).filter(|q| !q.is_empty());

        let Some(query) = query else {
            return match self.registry.get(invoker.guild_id) {
                Some(player) if invoker.privileged && player.status() == PlayerStatus::Paused => {
                    player.resume()?;
                    Ok(messages::resumed())
                }
                _ => Err(PlayerError::EmptyQuery),
            };
        };

        let parsed = parse_query(query);
        match parsed.hint {
            SourceHint::Bin => return self.playbin(invoker, &parsed.query).await,
            SourceHint::YouTube if is_youtube_playlist(&parsed.query) => {
                return self.play_playlist(invoker, &parsed.query).await;
            }
            _ => {}
        }

        let player = self.ensure_player(invoker).await?;
        let song = resolve_with_timeout(
            self.resolver.as_ref(),
            &parsed.query,
            parsed.hint,
            invoker.user_id,
            self.resolve_timeout,
        )
        .await?;

        let position = player.enqueue(song.clone())?;
        Ok(messages::enqueued(&song, position))
    }

    /// Encola todas las canciones de un bin
    pub async fn playbin(&self, invoker: &Invoker, url: &str) -> Result<String> {
        let player = self.ensure_player(invoker).await?;
        let playlist = load_bin(
            self.paste.as_ref(),
            self.resolver.as_ref(),
            url,
            invoker.user_id,
            self.max_bin_lines,
            self.resolve_timeout,
        )
        .await?;

        for song in &playlist.songs {
            player.enqueue(song.clone())?;
        }

        Ok(messages::playlist_enqueued("del bin", &playlist.songs, playlist.failed))
    }

    /// Encola todas las canciones de una playlist de YouTube
    pub async fn play_playlist(&self, invoker: &Invoker, url: &str) -> Result<String> {
        let player = self.ensure_player(invoker).await?;
        let playlist = load_playlist(
            self.resolver.as_ref(),
            url,
            invoker.user_id,
            self.max_playlist_songs,
            self.resolve_timeout,
        )
        .await?;

        for song in &playlist.songs {
            player.enqueue(song.clone())?;
        }

        Ok(messages::playlist_enqueued("de la playlist", &playlist.songs, playlist.failed))
    }

    pub fn now(&self, invoker: &Invoker) -> Result<String> {
        let player = self.registry.require(invoker.guild_id)?;
        let song = player.current().ok_or(PlayerError::NothingPlaying)?;
        Ok(messages::now(&song, player.status() == PlayerStatus::Paused))
    }

    pub fn pause(&self, invoker: &Invoker) -> Result<String> {
        invoker.require_privileged()?;
        let player = self.registry.require(invoker.guild_id)?;
        Ok(if player.pause()? {
            messages::paused()
        } else {
            messages::already_paused()
        })
    }

    pub fn resume(&self, invoker: &Invoker) -> Result<String> {
        invoker.require_privileged()?;
        let player = self.registry.require(invoker.guild_id)?;
        Ok(if player.resume()? {
            messages::resumed()
        } else {
            messages::not_paused()
        })
    }

    pub fn stop(&self, invoker: &Invoker) -> Result<String> {
        invoker.require_privileged()?;
        self.registry.require(invoker.guild_id)?.stop();
        Ok(messages::stopped())
    }

    /// Sin nivel informa el volumen; con nivel (0-100) lo cambia
    pub fn volume(&self, invoker: &Invoker, percent: Option<i32>) -> Result<String> {
        let player = self.registry.require(invoker.guild_id)?;
        let Some(percent) = percent else {
            return Ok(messages::volume_report(player.volume()));
        };

        invoker.require_privileged()?;
        if player.current().is_none() {
            return Err(PlayerError::NothingPlaying);
        }
        let volume = player.set_volume(percent)?;
        Ok(messages::volume_set(volume))
    }

    // Comandos con votación

    pub fn skip(&self, invoker: &Invoker) -> Result<String> {
        let player = self.registry.require(invoker.guild_id)?;
        if player.current().is_none() {
            return Err(PlayerError::NothingPlaying);
        }

        let outcome = player.vote_or_execute(
            GatedCommand::Skip,
            invoker.voter(),
            invoker.listeners,
            |state| {
                if state.current().is_none() {
                    return Err(PlayerError::NothingPlaying);
                }
                state.skip();
                Ok(())
            },
        )?;

        Ok(vote_reply(GatedCommand::Skip, outcome, |()| messages::skipped()))
    }

    pub fn shuffle(&self, invoker: &Invoker) -> Result<String> {
        let player = self.registry.require(invoker.guild_id)?;
        if player.queue_len() == 0 {
            return Err(QueueError::Empty.into());
        }

        let outcome = player.vote_or_execute(
            GatedCommand::Shuffle,
            invoker.voter(),
            invoker.listeners,
            |state| {
                state.queue_mut().shuffle();
                Ok(())
            },
        )?;

        Ok(vote_reply(GatedCommand::Shuffle, outcome, |()| messages::shuffled()))
    }

    /// Quita la canción en `position` (1-based) de la cola
    pub fn remove(&self, invoker: &Invoker, position: usize) -> Result<String> {
        let player = self.registry.require(invoker.guild_id)?;
        if player.queue_len() == 0 {
            return Err(QueueError::Empty.into());
        }

        let outcome = player.vote_or_execute(
            GatedCommand::Remove,
            invoker.voter(),
            invoker.listeners,
            |state| Ok(state.queue_mut().remove_at(position)?),
        )?;

        Ok(vote_reply(GatedCommand::Remove, outcome, |song| messages::removed(&song)))
    }

    // Cola

    pub fn queue(&self, invoker: &Invoker, page: usize) -> Result<String> {
        let player = self.registry.require(invoker.guild_id)?;
        let (current, songs, loop_mode) =
            player.with_state(|state| (state.current().cloned(), state.queue().to_list(), state.loop_mode()));

        if songs.is_empty() {
            return Err(QueueError::Empty.into());
        }

        Ok(messages::queue_page(current.as_ref(), &songs, page, loop_mode))
    }

    pub fn queue_clear(&self, invoker: &Invoker) -> Result<String> {
        let player = self.registry.require(invoker.guild_id)?;
        player.with_state(|state| state.queue_mut().clear());
        info!("🗑️ Cola limpiada en guild {}", invoker.guild_id);
        Ok(messages::queue_cleared())
    }

    /// Publica la canción actual y la cola en el servicio de pastes
    pub async fn queue_save(&self, invoker: &Invoker) -> Result<String> {
        let player = self.registry.require(invoker.guild_id)?;
        if player.queue_len() == 0 {
            return Err(QueueError::Empty.into());
        }

        let urls = player.export_urls();
        let link = self.paste.publish(&urls.join("\n")).await?;
        info!("💾 Cola de guild {} guardada en {}", invoker.guild_id, link);
        Ok(messages::queue_saved(&link))
    }

    /// Salta hasta la canción `position` de la cola
    pub fn skipto(&self, invoker: &Invoker, position: usize) -> Result<String> {
        invoker.require_privileged()?;
        let player = self.registry.require(invoker.guild_id)?;

        player.with_state(|state| {
            if state.current().is_none() {
                return Err(PlayerError::NothingPlaying);
            }
            let len = state.queue().len();
            if position == 0 || position > len {
                return Err(QueueError::IndexOutOfRange { position, len }.into());
            }

            let requeue = state.loop_mode() == LoopMode::Queue;
            for _ in 1..position {
                let song = state.queue_mut().dequeue()?;
                if requeue {
                    state.queue_mut().enqueue(song);
                }
            }
            state.skip();
            Ok(())
        })?;

        Ok(messages::skipped_to(position))
    }

    /// Vuelve a empezar la canción actual
    pub fn startover(&self, invoker: &Invoker) -> Result<String> {
        let player = self.registry.require(invoker.guild_id)?;

        let song = player.with_state(PlaybackState::start_over)?;

        Ok(messages::started_over(&song))
    }

    /// Activa o desactiva la repetición de la canción actual
    pub fn loop_single(&self, invoker: &Invoker) -> Result<String> {
        let player = self.registry.require(invoker.guild_id)?;

        let mode = if player.loop_mode() == LoopMode::Single {
            LoopMode::Off
        } else {
            if player.current().is_none() {
                return Err(PlayerError::NothingPlaying);
            }
            LoopMode::Single
        };

        player.set_loop_mode(mode);
        Ok(messages::loop_state(mode))
    }

    /// Activa o desactiva la repetición de la cola
    pub fn loop_queue(&self, invoker: &Invoker) -> Result<String> {
        let player = self.registry.require(invoker.guild_id)?;

        let mode = if player.loop_mode() == LoopMode::Queue {
            LoopMode::Off
        } else {
            if player.current().is_none() {
                return Err(PlayerError::NothingPlaying);
            }
            if player.queue_len() == 0 {
                return Err(QueueError::Empty.into());
            }
            LoopMode::Queue
        };

        player.set_loop_mode(mode);
        Ok(messages::loop_state(mode))
    }

    /// Alterna los avisos de "reproduciendo ahora" y guarda la preferencia
    pub async fn notify(&self, invoker: &Invoker) -> Result<String> {
        let player = self.registry.require(invoker.guild_id)?;
        let enabled = player.toggle_notify();

        if let Err(e) = self
            .storage
            .lock()
            .await
            .set_notify(invoker.guild_id.get(), enabled)
            .await
        {
            warn!("No se pudo guardar la preferencia de avisos en guild {}: {:?}", invoker.guild_id, e);
        }

        Ok(messages::notify_state(enabled))
    }

    /// Configura (o quita) el rol DJ del servidor
    pub async fn set_dj_role(&self, invoker: &Invoker, role: Option<RoleId>) -> Result<String> {
        invoker.require_privileged()?;

        self.storage
            .lock()
            .await
            .set_dj_role(invoker.guild_id.get(), role.map(RoleId::get))
            .await
            .map_err(|e| PlayerError::Storage(e.to_string()))?;

        Ok(messages::dj_role(role))
    }

    // Métodos privados

    /// Reproductor del guild, conectado al canal de voz del invocador.
    async fn ensure_player(&self, invoker: &Invoker) -> Result<Arc<Player>> {
        let voice = invoker.voice_channel.ok_or(PlayerError::NotInVoice)?;

        if let Some(player) = self.registry.get(invoker.guild_id) {
            match player.voice_channel() {
                Some(current) if current != voice => return Err(PlayerError::InAnotherChannel),
                Some(_) => {
                    player.bind_text_channel(invoker.text_channel);
                    return Ok(player);
                }
                None => {}
            }
        }

        self.connect(invoker, voice).await
    }

    /// Conecta (o mueve) el reproductor del guild a `channel`.
    ///
    /// Un reproductor que no llegó a conectarse no queda registrado.
    async fn connect(&self, invoker: &Invoker, channel: ChannelId) -> Result<Arc<Player>> {
        let options = self.player_options(invoker.guild_id).await;
        let player = self
            .registry
            .create_or_get(invoker.guild_id, invoker.text_channel, options);
        let was_connected = player.is_connected();

        if let Err(e) = player.join(self.connector.as_ref(), channel).await {
            warn!("No se pudo conectar al canal {} en guild {}: {}", channel, invoker.guild_id, e);
            if !was_connected {
                self.registry.remove(&player).await;
            }
            return Err(e);
        }

        Ok(player)
    }

    async fn player_options(&self, guild_id: GuildId) -> PlayerOptions {
        match self.storage.lock().await.settings(guild_id.get()).await {
            Ok(settings) => settings.player_options(self.max_sink_failures),
            Err(e) => {
                warn!("Usando opciones por defecto para guild {}: {:?}", guild_id, e);
                PlayerOptions {
                    max_sink_failures: self.max_sink_failures,
                    ..PlayerOptions::default()
                }
            }
        }
    }
}

fn vote_reply<R>(command: GatedCommand, outcome: VoteOutcome<R>, executed: impl FnOnce(R) -> String) -> String {
    match outcome {
        VoteOutcome::Executed(result) => executed(result),
        VoteOutcome::Pending { votes, required } => messages::vote_pending(command, votes, required),
        VoteOutcome::AlreadyVoted { votes, required } => {
            messages::already_voted(command, votes, required)
        }
    }
}
