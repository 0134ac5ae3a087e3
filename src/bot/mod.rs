//! # Bot Module
//!
//! Adaptadores de Discord para el núcleo de reproducción.
//!
//! - [`OpenMusicBot`] implementa el [`EventHandler`] de Serenity: registra
//!   los comandos slash, los despacha a [`music::MusicCommands`] y traduce
//!   los cambios de estado de voz en avisos para el
//!   [`InactivityMonitor`](crate::audio::inactivity::InactivityMonitor).
//! - [`voice`] conecta el reproductor con Songbird.
//! - [`announcer`] envía los avisos del reproductor al canal de texto.

use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub mod announcer;
pub mod commands;
pub mod handlers;
pub mod music;
pub mod voice;

use crate::{
    audio::inactivity::{InactivityMonitor, MembershipChange},
    config::Config,
};
use music::MusicCommands;

/// Main Discord bot handler for Open Music Bot.
///
/// Holds the command control plane and the inactivity monitor; every player
/// lives in the registry shared by both.
pub struct OpenMusicBot {
    config: Arc<Config>,
    pub music: Arc<MusicCommands>,
    monitor: InactivityMonitor,
}

impl OpenMusicBot {
    pub fn new(config: Arc<Config>, music: Arc<MusicCommands>, monitor: InactivityMonitor) -> Self {
        Self {
            config,
            music,
            monitor,
        }
    }

    /// Registers slash commands with Discord.
    ///
    /// With `GUILD_ID` set the commands are registered only in that guild
    /// (fast propagation, useful for development); otherwise globally.
    async fn register_commands(&self, ctx: &Context) -> anyhow::Result<()> {
        info!("📝 Registrando comandos slash...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);
                commands::register_guild_commands(ctx, guild_id).await?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for OpenMusicBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command_interaction) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                error!("Error manejando comando: {:?}", e);
            }
        }
    }

    /// Handles voice state updates for users and the bot.
    ///
    /// - **Bot disconnected**: the guild's player is destroyed.
    /// - **Bot moved**: the monitor re-checks listeners in the new channel.
    /// - **Users join/leave**: the inactivity monitor is told about the
    ///   channel left and the channel entered, with their listener counts.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else {
            return;
        };

        if new.user_id == ctx.cache.current_user().id {
            if new.channel_id.is_none() {
                if self.music.registry().destroy(guild_id).await {
                    warn!("🔌 Bot desconectado del canal de voz en guild {}", guild_id);
                }
            } else if let Some(channel_id) =
                moved_to(old.and_then(|state| state.channel_id), new.channel_id)
            {
                let listeners = listeners_in(&ctx, guild_id, channel_id);
                self.monitor.on_player_moved(guild_id, channel_id, listeners);
            }
            return;
        }

        let is_bot = new.member.as_ref().map(|member| member.user.bot).unwrap_or(false);
        if is_bot {
            return;
        }

        let old_channel = old.and_then(|state| state.channel_id);
        let changes = membership_changes(guild_id, old_channel, new.channel_id, |channel| {
            listeners_in(&ctx, guild_id, channel)
        });

        for change in changes {
            debug!(
                "Cambio de oyentes en guild {} canal {}: {} ({})",
                guild_id,
                change.channel_id,
                change.listeners,
                if change.joined { "entró" } else { "salió" }
            );
            self.monitor.on_membership_change(change);
        }
    }
}

/// Canal al que se movió el bot, si cambió de uno a otro.
fn moved_to(old: Option<ChannelId>, new: Option<ChannelId>) -> Option<ChannelId> {
    match (old, new) {
        (Some(old), Some(new)) if old != new => Some(new),
        _ => None,
    }
}

/// Traduce un movimiento de `old` a `new` en un aviso por canal afectado.
fn membership_changes(
    guild_id: GuildId,
    old: Option<ChannelId>,
    new: Option<ChannelId>,
    listeners: impl Fn(ChannelId) -> usize,
) -> Vec<MembershipChange> {
    // silenciar o ensordecer no cambia de canal
    if old == new {
        return Vec::new();
    }

    let left = old.map(|channel_id| MembershipChange {
        guild_id,
        channel_id,
        listeners: listeners(channel_id),
        joined: false,
    });
    let joined = new.map(|channel_id| MembershipChange {
        guild_id,
        channel_id,
        listeners: listeners(channel_id),
        joined: true,
    });

    left.into_iter().chain(joined).collect()
}

/// Ocupantes de un canal de voz que no son bots, según la caché.
pub(crate) fn listeners_in(ctx: &Context, guild_id: GuildId, channel_id: ChannelId) -> usize {
    let Some(guild) = ctx.cache.guild(guild_id) else {
        return 0;
    };

    guild
        .voice_states
        .values()
        .filter(|state| state.channel_id == Some(channel_id))
        .filter(|state| {
            let is_bot = state
                .member
                .as_ref()
                .map(|member| member.user.bot)
                .or_else(|| guild.members.get(&state.user_id).map(|member| member.user.bot))
                .unwrap_or(false);
            !is_bot
        })
        .count()
}
