//! # Inactivity monitor
//!
//! Reacts to voice-channel membership changes. When the last listener leaves
//! the player's channel it pauses playback and waits for someone to come back:
//!
//! - someone rejoins in time: the wait is cancelled and playback resumes (only
//!   if the monitor was the one that paused it),
//! - nobody does: the current song and the queue are published to the paste
//!   service, the link (or a failure notice) goes to the bound text channel
//!   and the player is destroyed.

use dashmap::{mapref::entry::Entry, DashMap};
use serenity::model::id::{ChannelId, GuildId};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::{
    audio::{player::Player, registry::PlayerRegistry},
    sources::paste::PasteService,
    ui::messages,
};

/// Un usuario (no bot) entró o salió de un canal de voz.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MembershipChange {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    /// Ocupantes no bot del canal después del cambio
    pub listeners: usize,
    pub joined: bool,
}

struct PendingWait {
    id: u64,
    rejoined: oneshot::Sender<()>,
}

enum WaitEnd {
    Rejoined,
    Expired,
    Cancelled,
}

#[derive(Clone)]
pub struct InactivityMonitor {
    registry: PlayerRegistry,
    paste: Arc<dyn PasteService>,
    timeout: Duration,
    pending: Arc<DashMap<GuildId, PendingWait>>,
    next_wait: Arc<AtomicU64>,
}

impl InactivityMonitor {
    pub fn new(registry: PlayerRegistry, paste: Arc<dyn PasteService>, timeout: Duration) -> Self {
        Self {
            registry,
            paste,
            timeout,
            pending: Arc::new(DashMap::new()),
            next_wait: Arc::new(AtomicU64::new(0)),
        }
    }

    /// `true` mientras el guild espera a que vuelva alguien
    pub fn is_waiting(&self, guild_id: GuildId) -> bool {
        self.pending.contains_key(&guild_id)
    }

    pub fn on_membership_change(&self, change: MembershipChange) {
        let Some(player) = self.registry.get(change.guild_id) else {
            return;
        };
        if player.voice_channel() != Some(change.channel_id) {
            return;
        }

        if change.joined {
            if change.listeners > 0 {
                self.cancel_wait(change.guild_id);
            }
            return;
        }

        if change.listeners > 0 {
            return;
        }

        self.start_wait(player);
    }

    /// El bot cambió de canal de voz (por ejemplo con `/summon`).
    ///
    /// Con oyentes en el canal nuevo se cancela la espera pendiente; si el
    /// canal nuevo está vacío empieza una.
    pub fn on_player_moved(&self, guild_id: GuildId, channel_id: ChannelId, listeners: usize) {
        let Some(player) = self.registry.get(guild_id) else {
            return;
        };

        debug!(
            "Reproductor de guild {} movido al canal {} ({} oyentes)",
            guild_id, channel_id, listeners
        );

        if listeners > 0 {
            self.cancel_wait(guild_id);
        } else {
            self.start_wait(player);
        }
    }

    fn start_wait(&self, player: Arc<Player>) {
        let guild_id = player.guild_id();

        let (id, rejoined) = {
            match self.pending.entry(guild_id) {
                Entry::Occupied(_) => {
                    debug!("Guild {} ya está esperando oyentes", guild_id);
                    return;
                }
                Entry::Vacant(entry) => {
                    let id = self.next_wait.fetch_add(1, Ordering::Relaxed);
                    let (tx, rx) = oneshot::channel();
                    entry.insert(PendingWait { id, rejoined: tx });
                    (id, rx)
                }
            }
        };

        let paused = player.pause().unwrap_or(false);
        info!(
            "⏳ Canal vacío en guild {}, esperando {}s a que vuelva alguien",
            guild_id,
            self.timeout.as_secs()
        );

        let monitor = self.clone();
        tokio::spawn(async move {
            monitor.wait_for_listeners(player, id, rejoined, paused).await;
        });
    }

    fn cancel_wait(&self, guild_id: GuildId) {
        if let Some((_, wait)) = self.pending.remove(&guild_id) {
            info!("👋 Alguien volvió al canal en guild {}", guild_id);
            // el receptor puede haber terminado ya por timeout
            let _ = wait.rejoined.send(());
        }
    }

    async fn wait_for_listeners(
        self,
        player: Arc<Player>,
        id: u64,
        rejoined: oneshot::Receiver<()>,
        paused: bool,
    ) {
        let guild_id = player.guild_id();

        let end = tokio::select! {
            _ = player.destroyed() => WaitEnd::Cancelled,
            result = tokio::time::timeout(self.timeout, rejoined) => match result {
                Ok(Ok(())) => WaitEnd::Rejoined,
                Ok(Err(_)) => WaitEnd::Cancelled,
                Err(_) => {
                    if self.pending.remove_if(&guild_id, |_, wait| wait.id == id).is_some() {
                        WaitEnd::Expired
                    } else {
                        // un rejoin ganó la carrera contra el timeout
                        WaitEnd::Rejoined
                    }
                }
            },
        };

        match end {
            WaitEnd::Rejoined => {
                if paused {
                    match player.resume() {
                        Ok(_) => info!("▶️ Reproducción reanudada tras volver un oyente en guild {}", guild_id),
                        Err(e) => debug!("No se pudo reanudar en guild {}: {}", guild_id, e),
                    }
                }
            }
            WaitEnd::Cancelled => {
                self.pending.remove_if(&guild_id, |_, wait| wait.id == id);
            }
            WaitEnd::Expired => self.expire(player).await,
        }
    }

    async fn expire(&self, player: Arc<Player>) {
        let guild_id = player.guild_id();
        let urls = player.export_urls();
        info!("⌛ Tiempo de inactividad agotado en guild {}", guild_id);

        self.registry.remove(&player).await;

        if urls.is_empty() {
            player.announce(messages::left_inactive()).await;
            return;
        }

        match self.paste.publish(&urls.join("\n")).await {
            Ok(link) => {
                info!("💾 Cola de guild {} guardada en {}", guild_id, link);
                player
                    .announce(messages::queue_saved_on_leave(&link, urls.len()))
                    .await;
            }
            Err(e) => {
                warn!("No se pudo guardar la cola de guild {}: {}", guild_id, e);
                player.announce(messages::queue_lost_on_leave()).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::player::{PlayerOptions, PlayerStatus};
    use crate::error::PlayerError;
    use crate::sources::paste::MockPasteService;
    use crate::testing::{settle, song, FakeConnector, RecordingAnnouncer};
    use pretty_assertions::assert_eq;

    const GUILD: GuildId = GuildId::new(3);
    const TEXT: ChannelId = ChannelId::new(30);
    const VOICE: ChannelId = ChannelId::new(31);
    const TIMEOUT: Duration = Duration::from_secs(120);

    struct Fixture {
        monitor: InactivityMonitor,
        registry: PlayerRegistry,
        player: Arc<Player>,
        announcer: Arc<RecordingAnnouncer>,
        _connector: FakeConnector,
    }

    async fn playing(paste: MockPasteService, songs: &[&str]) -> Fixture {
        let announcer = Arc::new(RecordingAnnouncer::default());
        let registry = PlayerRegistry::new(announcer.clone());
        let options = PlayerOptions {
            notify: false,
            ..PlayerOptions::default()
        };
        let player = registry.create_or_get(GUILD, TEXT, options);

        let connector = FakeConnector::default();
        player.join(&connector, VOICE).await.unwrap();
        for name in songs {
            player.enqueue(song(name)).unwrap();
        }
        settle().await;

        let monitor = InactivityMonitor::new(registry.clone(), Arc::new(paste), TIMEOUT);
        Fixture {
            monitor,
            registry,
            player,
            announcer,
            _connector: connector,
        }
    }

    fn change(listeners: usize, joined: bool) -> MembershipChange {
        MembershipChange {
            guild_id: GUILD,
            channel_id: VOICE,
            listeners,
            joined,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_persists_current_first_and_destroys() {
        let mut paste = MockPasteService::new();
        paste
            .expect_publish()
            .withf(|text| text == "https://youtu.be/a\nhttps://youtu.be/b\nhttps://youtu.be/c")
            .times(1)
            .returning(|_| Ok("https://mystb.in/queue".to_string()));

        let fx = playing(paste, &["a", "b", "c"]).await;

        fx.monitor.on_membership_change(change(0, false));
        settle().await;
        assert_eq!(fx.player.status(), PlayerStatus::Paused);
        assert!(fx.monitor.is_waiting(GUILD));

        tokio::time::sleep(TIMEOUT + Duration::from_secs(1)).await;
        settle().await;

        assert!(fx.registry.get(GUILD).is_none());
        assert_eq!(fx.player.status(), PlayerStatus::Destroyed);
        assert!(!fx.monitor.is_waiting(GUILD));
        assert!(fx
            .announcer
            .texts()
            .iter()
            .any(|text| text.contains("https://mystb.in/queue")));
    }

    #[tokio::test(start_paused = true)]
    async fn rejoin_in_time_resumes_without_publishing() {
        let mut paste = MockPasteService::new();
        paste.expect_publish().never();

        let fx = playing(paste, &["a", "b"]).await;

        fx.monitor.on_membership_change(change(0, false));
        settle().await;
        assert_eq!(fx.player.status(), PlayerStatus::Paused);

        tokio::time::sleep(Duration::from_secs(60)).await;
        fx.monitor.on_membership_change(change(1, true));
        settle().await;

        assert_eq!(fx.player.status(), PlayerStatus::Playing);

        tokio::time::sleep(TIMEOUT * 2).await;
        settle().await;

        assert_eq!(fx.player.status(), PlayerStatus::Playing);
        assert!(fx.registry.get(GUILD).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn publish_failure_still_destroys_and_reports() {
        let mut paste = MockPasteService::new();
        paste
            .expect_publish()
            .times(1)
            .returning(|_| Err(PlayerError::Publish("HTTP 503".into())));

        let fx = playing(paste, &["a"]).await;

        fx.monitor.on_membership_change(change(0, false));
        tokio::time::sleep(TIMEOUT + Duration::from_secs(1)).await;
        settle().await;

        assert!(fx.registry.get(GUILD).is_none());
        assert_eq!(fx.announcer.texts().last(), Some(&messages::queue_lost_on_leave()));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_player_is_destroyed_without_publishing() {
        let mut paste = MockPasteService::new();
        paste.expect_publish().never();

        let fx = playing(paste, &[]).await;

        fx.monitor.on_membership_change(change(0, false));
        tokio::time::sleep(TIMEOUT + Duration::from_secs(1)).await;
        settle().await;

        assert!(fx.registry.get(GUILD).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn user_paused_playback_stays_paused_after_rejoin() {
        let mut paste = MockPasteService::new();
        paste.expect_publish().never();

        let fx = playing(paste, &["a"]).await;
        fx.player.pause().unwrap();

        fx.monitor.on_membership_change(change(0, false));
        fx.monitor.on_membership_change(change(1, true));
        settle().await;

        assert_eq!(fx.player.status(), PlayerStatus::Paused);
    }

    #[tokio::test(start_paused = true)]
    async fn other_channels_and_remaining_listeners_are_ignored() {
        let mut paste = MockPasteService::new();
        paste.expect_publish().never();

        let fx = playing(paste, &["a"]).await;

        fx.monitor.on_membership_change(MembershipChange {
            channel_id: ChannelId::new(999),
            ..change(0, false)
        });
        fx.monitor.on_membership_change(change(2, false));
        settle().await;

        assert!(!fx.monitor.is_waiting(GUILD));
        assert_eq!(fx.player.status(), PlayerStatus::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn moving_to_an_occupied_channel_cancels_the_wait() {
        let mut paste = MockPasteService::new();
        paste.expect_publish().never();

        let fx = playing(paste, &["a", "b"]).await;

        fx.monitor.on_membership_change(change(0, false));
        settle().await;
        assert!(fx.monitor.is_waiting(GUILD));

        fx.monitor.on_player_moved(GUILD, ChannelId::new(32), 3);
        settle().await;

        assert!(!fx.monitor.is_waiting(GUILD));
        assert_eq!(fx.player.status(), PlayerStatus::Playing);

        tokio::time::sleep(TIMEOUT * 2).await;
        settle().await;

        assert!(fx.registry.get(GUILD).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn moving_to_an_empty_channel_starts_a_wait() {
        let mut paste = MockPasteService::new();
        paste
            .expect_publish()
            .times(1)
            .returning(|_| Ok("https://mystb.in/movido".to_string()));

        let fx = playing(paste, &["a"]).await;

        fx.monitor.on_player_moved(GUILD, ChannelId::new(32), 0);
        settle().await;
        assert!(fx.monitor.is_waiting(GUILD));
        assert_eq!(fx.player.status(), PlayerStatus::Paused);

        tokio::time::sleep(TIMEOUT + Duration::from_secs(1)).await;
        settle().await;

        assert!(fx.registry.get(GUILD).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_leave_cancels_the_wait() {
        let mut paste = MockPasteService::new();
        paste.expect_publish().never();

        let fx = playing(paste, &["a"]).await;

        fx.monitor.on_membership_change(change(0, false));
        settle().await;
        fx.registry.destroy(GUILD).await;
        settle().await;

        assert!(!fx.monitor.is_waiting(GUILD));
    }
}
