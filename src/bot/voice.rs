//! Transporte de voz sobre Songbird.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::{File, HttpRequest, Input},
    tracks::{PlayMode, Track, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        sink::{Completion, MediaSink, PlaybackEnd, VoiceConnector},
        song::{Song, StreamRef},
    },
    error::{PlayerError, Result},
};

/// Abre conexiones de voz con el manager de Songbird.
pub struct SongbirdConnector {
    manager: Arc<Songbird>,
    http_client: reqwest::Client,
}

impl SongbirdConnector {
    pub fn new(manager: Arc<Songbird>, http_client: reqwest::Client) -> Self {
        Self {
            manager,
            http_client,
        }
    }
}

#[async_trait]
impl VoiceConnector for SongbirdConnector {
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<Arc<dyn MediaSink>> {
        let call = self.manager.join(guild_id, channel_id).await.map_err(|e| {
            error!("Error al conectar al canal de voz en guild {}: {:?}", guild_id, e);
            PlayerError::Connection(e.to_string())
        })?;

        if let Err(e) = call.lock().await.deafen(true).await {
            warn!("No se pudo ensordecer al bot en guild {}: {:?}", guild_id, e);
        }

        info!("🔊 Conectado al canal de voz {} en guild {}", channel_id, guild_id);

        let sink: Arc<dyn MediaSink> = Arc::new(SongbirdSink {
            guild_id,
            manager: self.manager.clone(),
            call,
            http_client: self.http_client.clone(),
            track: Mutex::new(None),
            status: Arc::new(Mutex::new(TrackStatus::default())),
        });
        Ok(sink)
    }
}

/// Estado del track actual. `generation` distingue los eventos tardíos de
/// tracks ya reemplazados.
#[derive(Debug, Default, Clone, Copy)]
struct TrackStatus {
    generation: u64,
    active: bool,
    paused: bool,
}

/// [`MediaSink`] respaldado por un `Call` de Songbird.
pub struct SongbirdSink {
    guild_id: GuildId,
    manager: Arc<Songbird>,
    call: Arc<tokio::sync::Mutex<Call>>,
    http_client: reqwest::Client,
    track: Mutex<Option<TrackHandle>>,
    status: Arc<Mutex<TrackStatus>>,
}

impl SongbirdSink {
    fn input_for(&self, song: &Song) -> Input {
        match song.stream() {
            StreamRef::Url(url) => HttpRequest::new(self.http_client.clone(), url.clone()).into(),
            StreamRef::File(path) => File::new(path.clone()).into(),
        }
    }

    fn with_track(&self, action: impl FnOnce(&TrackHandle) -> songbird::tracks::TrackResult<()>) -> Result<()> {
        match self.track.lock().as_ref() {
            Some(track) => action(track).map_err(|e| PlayerError::Sink(e.to_string())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl MediaSink for SongbirdSink {
    async fn play(&self, song: &Song, volume: f32) -> Result<Completion> {
        let track = Track::from(self.input_for(song)).volume(volume);
        let handle = self.call.lock().await.play_only(track);

        let generation = {
            let mut status = self.status.lock();
            *status = TrackStatus {
                generation: status.generation + 1,
                active: true,
                paused: false,
            };
            status.generation
        };

        let (tx, rx) = oneshot::channel();
        let notifier = CompletionNotifier {
            guild_id: self.guild_id,
            generation,
            sender: Arc::new(Mutex::new(Some(tx))),
            status: self.status.clone(),
        };

        for event in [TrackEvent::End, TrackEvent::Error] {
            handle
                .add_event(Event::Track(event), notifier.clone())
                .map_err(|e| PlayerError::Sink(format!("Error al agregar event handler: {}", e)))?;
        }

        *self.track.lock() = Some(handle);

        Ok(rx)
    }

    fn pause(&self) -> Result<()> {
        self.with_track(TrackHandle::pause)?;
        self.status.lock().paused = true;
        Ok(())
    }

    fn resume(&self) -> Result<()> {
        self.with_track(TrackHandle::play)?;
        self.status.lock().paused = false;
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        {
            let mut status = self.status.lock();
            status.active = false;
            status.paused = false;
        }
        match self.track.lock().take() {
            Some(track) => track.stop().map_err(|e| PlayerError::Sink(e.to_string())),
            None => Ok(()),
        }
    }

    fn set_volume(&self, volume: f32) -> Result<()> {
        self.with_track(|track| track.set_volume(volume))
    }

    fn is_playing(&self) -> bool {
        let status = self.status.lock();
        status.active && !status.paused
    }

    fn is_paused(&self) -> bool {
        let status = self.status.lock();
        status.active && status.paused
    }

    async fn move_to(&self, channel_id: ChannelId) -> Result<()> {
        self.manager
            .join(self.guild_id, channel_id)
            .await
            .map_err(|e| PlayerError::Connection(e.to_string()))?;
        info!("🔀 Movido al canal {} en guild {}", channel_id, self.guild_id);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.manager
            .remove(self.guild_id)
            .await
            .map_err(|e| PlayerError::Connection(e.to_string()))?;
        info!("👋 Desconectado del canal de voz en guild {}", self.guild_id);
        Ok(())
    }
}

/// Avisa al driver cuando el track termina o falla.
#[derive(Clone)]
struct CompletionNotifier {
    guild_id: GuildId,
    generation: u64,
    sender: Arc<Mutex<Option<oneshot::Sender<PlaybackEnd>>>>,
    status: Arc<Mutex<TrackStatus>>,
}

#[async_trait]
impl VoiceEventHandler for CompletionNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let end = match ctx {
            EventContext::Track(tracks) => tracks
                .iter()
                .find_map(|(state, _)| match &state.playing {
                    PlayMode::Errored(e) => Some(PlaybackEnd::Errored(e.to_string())),
                    _ => None,
                })
                .unwrap_or(PlaybackEnd::Finished),
            _ => PlaybackEnd::Finished,
        };

        if let PlaybackEnd::Errored(reason) = &end {
            error!("❌ Error en track para guild {}: {}", self.guild_id, reason);
        } else {
            debug!("🎵 Track terminó en guild {}", self.guild_id);
        }

        {
            let mut status = self.status.lock();
            if status.generation == self.generation {
                status.active = false;
            }
        }
        if let Some(sender) = self.sender.lock().take() {
            // el driver pudo haber abandonado la canción (skip/stop)
            let _ = sender.send(end);
        }

        Some(Event::Cancel)
    }
}
