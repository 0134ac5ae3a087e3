//! Seams towards the voice transport and the text channel.
//!
//! The playback core never talks to the chat platform directly: it drives a
//! [`MediaSink`] obtained from a [`VoiceConnector`] and reports through an
//! [`Announcer`]. The binary plugs Songbird and the Discord HTTP API in here
//! (see `bot::voice` and `bot::announcer`).

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tokio::sync::oneshot;

use crate::audio::song::Song;
use crate::error::Result;

/// Cómo terminó la reproducción de una canción.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEnd {
    Finished,
    Errored(String),
}

/// Notificación de fin de canción. Si el emisor se descarta sin enviar nada
/// se interpreta como `Finished`.
pub type Completion = oneshot::Receiver<PlaybackEnd>;

/// Opaque playback device bound to one voice connection.
#[async_trait]
pub trait MediaSink: Send + Sync {
    /// Starts streaming `song`, replacing whatever was playing.
    async fn play(&self, song: &Song, volume: f32) -> Result<Completion>;

    fn pause(&self) -> Result<()>;

    fn resume(&self) -> Result<()>;

    fn stop(&self) -> Result<()>;

    fn set_volume(&self, volume: f32) -> Result<()>;

    fn is_playing(&self) -> bool;

    fn is_paused(&self) -> bool;

    /// Moves the connection to another voice channel of the same guild.
    async fn move_to(&self, channel_id: ChannelId) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;
}

#[async_trait]
pub trait VoiceConnector: Send + Sync {
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<Arc<dyn MediaSink>>;
}

/// Envía mensajes al canal de texto vinculado. Los fallos se registran en el
/// log y no se propagan.
#[async_trait]
pub trait Announcer: Send + Sync {
    async fn announce(&self, channel_id: ChannelId, message: String);
}
