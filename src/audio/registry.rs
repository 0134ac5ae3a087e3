use dashmap::{mapref::entry::Entry, DashMap};
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tracing::{error, info};

use crate::{
    audio::{
        player::{DriverExit, LoopMode, PlaybackState, Player, PlayerOptions},
        sink::Announcer,
        song::Song,
        votes::{GatedCommand, VoteOutcome, Voter},
    },
    error::{PlayerError, Result},
    ui::messages,
};

/// Reproductores activos, uno por guild.
///
/// Crear, consultar y eliminar son atómicos por guild: dos comandos
/// simultáneos para el mismo guild nunca crean dos reproductores.
#[derive(Clone)]
pub struct PlayerRegistry {
    players: Arc<DashMap<GuildId, Arc<Player>>>,
    announcer: Arc<dyn Announcer>,
}

impl PlayerRegistry {
    pub fn new(announcer: Arc<dyn Announcer>) -> Self {
        Self {
            players: Arc::new(DashMap::new()),
            announcer,
        }
    }

    /// Devuelve el reproductor del guild o crea uno nuevo con su driver.
    ///
    /// Si ya existía, `text_channel` pasa a ser su canal de texto vinculado.
    pub fn create_or_get(
        &self,
        guild_id: GuildId,
        text_channel: ChannelId,
        options: PlayerOptions,
    ) -> Arc<Player> {
        match self.players.entry(guild_id) {
            Entry::Occupied(entry) => {
                let player = entry.get().clone();
                player.bind_text_channel(text_channel);
                player
            }
            Entry::Vacant(entry) => {
                let (player, signals) =
                    Player::new(guild_id, text_channel, options, self.announcer.clone());
                entry.insert(player.clone());
                info!("🎛️ Reproductor creado para guild {}", guild_id);

                let registry = self.clone();
                let driven = player.clone();
                tokio::spawn(async move {
                    if driven.clone().drive(signals).await == DriverExit::SinkFailed {
                        error!(
                            "❌ Fallos repetidos del reproductor de audio en guild {}, destruyendo",
                            driven.guild_id()
                        );
                        driven.announce(messages::sink_failed()).await;
                        registry.remove(&driven).await;
                    }
                });

                player
            }
        }
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<Player>> {
        self.players.get(&guild_id).map(|entry| entry.value().clone())
    }

    /// Como [`get`](Self::get), pero falla con `NoPlayer`
    pub fn require(&self, guild_id: GuildId) -> Result<Arc<Player>> {
        self.get(guild_id).ok_or(PlayerError::NoPlayer)
    }

    /// Elimina y destruye el reproductor del guild; `false` si no había
    pub async fn destroy(&self, guild_id: GuildId) -> bool {
        let Some((_, player)) = self.players.remove(&guild_id) else {
            return false;
        };
        player.destroy().await;
        true
    }

    /// Destruye `player` solo si sigue siendo el registrado para su guild.
    pub(crate) async fn remove(&self, player: &Arc<Player>) {
        self.players
            .remove_if(&player.guild_id(), |_, registered| Arc::ptr_eq(registered, player));
        player.destroy().await;
    }

    /// Destruye todos los reproductores (apagado del proceso)
    pub async fn destroy_all(&self) {
        let guilds: Vec<GuildId> = self.players.iter().map(|entry| *entry.key()).collect();
        info!("🛑 Destruyendo {} reproductores", guilds.len());

        for guild_id in guilds {
            self.destroy(guild_id).await;
        }
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn enqueue(&self, guild_id: GuildId, song: Song) -> Result<usize> {
        self.require(guild_id)?.enqueue(song)
    }

    pub fn vote_or_execute<R>(
        &self,
        guild_id: GuildId,
        command: GatedCommand,
        voter: Voter,
        listeners: usize,
        action: impl FnOnce(&mut PlaybackState) -> Result<R>,
    ) -> Result<VoteOutcome<R>> {
        self.require(guild_id)?
            .vote_or_execute(command, voter, listeners, action)
    }

    pub fn set_loop_mode(&self, guild_id: GuildId, mode: LoopMode) -> Result<()> {
        self.require(guild_id)?.set_loop_mode(mode);
        Ok(())
    }

    pub fn set_volume(&self, guild_id: GuildId, percent: i32) -> Result<f32> {
        self.require(guild_id)?.set_volume(percent)
    }

    /// URLs de la canción actual y la cola; vacío si el guild no tiene reproductor
    pub fn snapshot_queue_for_export(&self, guild_id: GuildId) -> Vec<String> {
        self.get(guild_id)
            .map(|player| player.export_urls())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::player::PlayerStatus;
    use crate::testing::{settle, song, FakeConnector, RecordingAnnouncer, SinkCall};
    use pretty_assertions::assert_eq;

    const GUILD: GuildId = GuildId::new(7);
    const TEXT: ChannelId = ChannelId::new(70);
    const VOICE: ChannelId = ChannelId::new(71);

    fn registry() -> (PlayerRegistry, Arc<RecordingAnnouncer>) {
        let announcer = Arc::new(RecordingAnnouncer::default());
        (PlayerRegistry::new(announcer.clone()), announcer)
    }

    #[tokio::test]
    async fn one_player_per_guild() {
        let (registry, _) = registry();

        let first = registry.create_or_get(GUILD, TEXT, PlayerOptions::default());
        let second = registry.create_or_get(GUILD, ChannelId::new(99), PlayerOptions::default());

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
        assert_eq!(first.text_channel(), ChannelId::new(99));
    }

    #[tokio::test]
    async fn operations_on_unknown_guild_fail_with_no_player() {
        let (registry, _) = registry();

        assert_eq!(registry.enqueue(GUILD, song("a")), Err(PlayerError::NoPlayer));
        assert_eq!(registry.set_volume(GUILD, 40), Err(PlayerError::NoPlayer));
        assert_eq!(
            registry.set_loop_mode(GUILD, LoopMode::Queue),
            Err(PlayerError::NoPlayer)
        );
        assert!(registry.snapshot_queue_for_export(GUILD).is_empty());
    }

    #[tokio::test]
    async fn snapshot_lists_current_song_first() {
        let (registry, _) = registry();
        let player = registry.create_or_get(GUILD, TEXT, PlayerOptions::default());
        let connector = FakeConnector::default();
        player.join(&connector, VOICE).await.unwrap();

        for name in ["a", "b", "c"] {
            registry.enqueue(GUILD, song(name)).unwrap();
        }
        settle().await;

        assert_eq!(
            registry.snapshot_queue_for_export(GUILD),
            vec![
                "https://youtu.be/a",
                "https://youtu.be/b",
                "https://youtu.be/c"
            ]
        );
    }

    #[tokio::test]
    async fn destroy_removes_and_disconnects() {
        let (registry, _) = registry();
        let player = registry.create_or_get(GUILD, TEXT, PlayerOptions::default());
        let connector = FakeConnector::default();
        player.join(&connector, VOICE).await.unwrap();

        assert!(registry.destroy(GUILD).await);
        assert!(!registry.destroy(GUILD).await);

        assert!(registry.is_empty());
        assert_eq!(player.status(), PlayerStatus::Destroyed);
        assert!(connector.sink.calls().contains(&SinkCall::Disconnect));

        let fresh = registry.create_or_get(GUILD, TEXT, PlayerOptions::default());
        assert!(!Arc::ptr_eq(&player, &fresh));
        assert_eq!(fresh.status(), PlayerStatus::Idle);
    }

    #[tokio::test]
    async fn persistent_sink_failure_destroys_only_that_player() {
        let (registry, announcer) = registry();
        let options = PlayerOptions {
            max_sink_failures: 1,
            ..PlayerOptions::default()
        };
        let broken = registry.create_or_get(GUILD, TEXT, options);
        let healthy = registry.create_or_get(GuildId::new(8), TEXT, options);

        let connector = FakeConnector::default();
        connector.sink.set_failing(true);
        broken.join(&connector, VOICE).await.unwrap();
        broken.enqueue(song("a")).unwrap();
        settle().await;

        assert!(registry.get(GUILD).is_none());
        assert_eq!(broken.status(), PlayerStatus::Destroyed);
        assert!(registry.get(healthy.guild_id()).is_some());
        assert_eq!(announcer.texts().last(), Some(&messages::sink_failed()));
    }

    #[tokio::test]
    async fn destroy_all_empties_the_registry() {
        let (registry, _) = registry();
        for id in 1..=3 {
            registry.create_or_get(GuildId::new(id), TEXT, PlayerOptions::default());
        }

        registry.destroy_all().await;

        assert!(registry.is_empty());
    }
}
