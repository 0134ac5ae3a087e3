//! Dobles de prueba compartidos por los tests del crate.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::sync::oneshot;

use crate::audio::{
    sink::{Announcer, Completion, MediaSink, PlaybackEnd, VoiceConnector},
    song::{Song, StreamRef},
};
use crate::error::{PlayerError, Result};

pub fn song(name: &str) -> Song {
    song_from(name, 1)
}

pub fn song_from(name: &str, requester: u64) -> Song {
    Song::new(
        name,
        format!("https://youtu.be/{name}"),
        Duration::from_secs(180),
        StreamRef::Url(format!("https://cdn.test/{name}.webm")),
        UserId::new(requester),
    )
}

/// Deja correr a las tareas en segundo plano del runtime de test.
pub async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SinkCall {
    Play(String),
    Pause,
    Resume,
    Stop,
    Volume(f32),
    Move(ChannelId),
    Disconnect,
}

#[derive(Default)]
struct FakeStatus {
    playing: bool,
    paused: bool,
}

#[derive(Default)]
pub struct FakeSink {
    calls: Mutex<Vec<SinkCall>>,
    status: Mutex<FakeStatus>,
    completion: Mutex<Option<oneshot::Sender<PlaybackEnd>>>,
    failing: AtomicBool,
    failing_moves: AtomicBool,
}

impl FakeSink {
    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().clone()
    }

    pub fn played(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                SinkCall::Play(title) => Some(title.clone()),
                _ => None,
            })
            .collect()
    }

    /// Termina la canción actual con normalidad
    pub fn finish(&self) -> bool {
        self.end_with(PlaybackEnd::Finished)
    }

    pub fn end_with(&self, end: PlaybackEnd) -> bool {
        self.status.lock().playing = false;
        match self.completion.lock().take() {
            Some(tx) => tx.send(end).is_ok(),
            None => false,
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_failing_moves(&self, failing: bool) {
        self.failing_moves.store(failing, Ordering::SeqCst);
    }

    fn record(&self, call: SinkCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl MediaSink for FakeSink {
    async fn play(&self, song: &Song, _volume: f32) -> Result<Completion> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PlayerError::Sink(format!("no se pudo abrir {}", song.url())));
        }

        self.record(SinkCall::Play(song.title().to_string()));
        let (tx, rx) = oneshot::channel();
        *self.completion.lock() = Some(tx);
        *self.status.lock() = FakeStatus {
            playing: true,
            paused: false,
        };
        Ok(rx)
    }

    fn pause(&self) -> Result<()> {
        self.record(SinkCall::Pause);
        self.status.lock().paused = true;
        Ok(())
    }

    fn resume(&self) -> Result<()> {
        self.record(SinkCall::Resume);
        self.status.lock().paused = false;
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        self.record(SinkCall::Stop);
        *self.status.lock() = FakeStatus::default();
        self.completion.lock().take();
        Ok(())
    }

    fn set_volume(&self, volume: f32) -> Result<()> {
        self.record(SinkCall::Volume(volume));
        Ok(())
    }

    fn is_playing(&self) -> bool {
        let status = self.status.lock();
        status.playing && !status.paused
    }

    fn is_paused(&self) -> bool {
        let status = self.status.lock();
        status.playing && status.paused
    }

    async fn move_to(&self, channel_id: ChannelId) -> Result<()> {
        if self.failing_moves.load(Ordering::SeqCst) {
            return Err(PlayerError::Connection(format!("sin permiso para entrar a {}", channel_id)));
        }
        self.record(SinkCall::Move(channel_id));
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.record(SinkCall::Disconnect);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeConnector {
    pub sink: Arc<FakeSink>,
    connects: AtomicUsize,
    refusing: AtomicBool,
}

impl FakeConnector {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Hace fallar las próximas conexiones
    pub fn set_refusing(&self, refusing: bool) {
        self.refusing.store(refusing, Ordering::SeqCst);
    }
}

#[async_trait]
impl VoiceConnector for FakeConnector {
    async fn connect(&self, _guild_id: GuildId, channel_id: ChannelId) -> Result<Arc<dyn MediaSink>> {
        if self.refusing.load(Ordering::SeqCst) {
            return Err(PlayerError::Connection(format!("canal {} no disponible", channel_id)));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        let sink: Arc<dyn MediaSink> = self.sink.clone();
        Ok(sink)
    }
}

#[derive(Default)]
pub struct RecordingAnnouncer {
    messages: Mutex<Vec<(ChannelId, String)>>,
}

impl RecordingAnnouncer {
    pub fn messages(&self) -> Vec<(ChannelId, String)> {
        self.messages.lock().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.messages.lock().iter().map(|(_, text)| text.clone()).collect()
    }
}

#[async_trait]
impl Announcer for RecordingAnnouncer {
    async fn announce(&self, channel_id: ChannelId, message: String) {
        self.messages.lock().push((channel_id, message));
    }
}
