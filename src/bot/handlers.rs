use anyhow::Result;
use serenity::{
    builder::{CreateInteractionResponse, CreateInteractionResponseMessage, EditInteractionResponse},
    model::{
        application::{CommandDataOptionValue, CommandInteraction},
        id::{ChannelId, GuildId, RoleId},
    },
    prelude::Context,
};
use tracing::{debug, info};

use crate::{
    bot::{
        music::{is_dj, Invoker},
        OpenMusicBot,
    },
    error::PlayerError,
    ui::messages,
};

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &OpenMusicBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    // conectar, buscar y leer bins puede tardar más que el plazo de respuesta
    let deferred = matches!(
        command.data.name.as_str(),
        "join" | "summon" | "play" | "playbin" | "savequeue"
    );
    if deferred {
        command
            .create_response(
                &ctx.http,
                CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
            )
            .await?;
    }

    let invoker = build_invoker(ctx, &command, guild_id, bot).await;
    let reply = dispatch(&command, &invoker, bot)
        .await
        .unwrap_or_else(|e| {
            debug!("Comando /{} rechazado en guild {}: {}", command.data.name, guild_id, e);
            messages::error(&e)
        });

    if deferred {
        command
            .edit_response(&ctx.http, EditInteractionResponse::new().content(reply))
            .await?;
    } else {
        command
            .create_response(
                &ctx.http,
                CreateInteractionResponse::Message(
                    CreateInteractionResponseMessage::new().content(reply),
                ),
            )
            .await?;
    }

    Ok(())
}

async fn dispatch(
    command: &CommandInteraction,
    invoker: &Invoker,
    bot: &OpenMusicBot,
) -> std::result::Result<String, PlayerError> {
    let music = &bot.music;

    match command.data.name.as_str() {
        "join" => music.join(invoker).await,
        "summon" => music.summon(invoker, channel_option(command, "channel")).await,
        "leave" => music.leave(invoker).await,
        "play" => music.play(invoker, string_option(command, "query")).await,
        "playbin" => {
            let url = string_option(command, "url").ok_or(PlayerError::EmptyQuery)?;
            music.playbin(invoker, url).await
        }
        "now" => music.now(invoker),
        "pause" => music.pause(invoker),
        "resume" => music.resume(invoker),
        "stop" => music.stop(invoker),
        "skip" => music.skip(invoker),
        "skipto" => music.skipto(invoker, position_option(command, "position")),
        "startover" => music.startover(invoker),
        "queue" => music.queue(invoker, position_option(command, "page").max(1)),
        "clear" => music.queue_clear(invoker),
        "savequeue" => music.queue_save(invoker).await,
        "shuffle" => music.shuffle(invoker),
        "remove" => music.remove(invoker, position_option(command, "position")),
        "loop" => match string_option(command, "mode") {
            Some("queue") => music.loop_queue(invoker),
            _ => music.loop_single(invoker),
        },
        "notify" => music.notify(invoker).await,
        "volume" => music.volume(
            invoker,
            integer_option(command, "level").map(|level| level.clamp(i32::MIN as i64, i32::MAX as i64) as i32),
        ),
        "djrole" => music.set_dj_role(invoker, role_option(command, "role")).await,
        _ => Ok("❌ Comando no reconocido".to_string()),
    }
}

/// Reúne lo que el control de música necesita saber del usuario.
async fn build_invoker(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &OpenMusicBot,
) -> Invoker {
    let user_id = command.user.id;

    let dj_role = match bot.music.storage().lock().await.settings(guild_id.get()).await {
        Ok(settings) => settings.dj_role_id.map(RoleId::new),
        Err(_) => None,
    };

    let manage_guild = command
        .member
        .as_ref()
        .and_then(|member| member.permissions)
        .is_some_and(|permissions| permissions.manage_guild());
    let member_roles: Vec<RoleId> = command
        .member
        .as_ref()
        .map(|member| member.roles.clone())
        .unwrap_or_default();

    let (voice_channel, role_names) = match ctx.cache.guild(guild_id) {
        Some(guild) => (
            guild.voice_states.get(&user_id).and_then(|state| state.channel_id),
            member_roles
                .iter()
                .map(|id| {
                    let name = guild.roles.get(id).map(|role| role.name.clone()).unwrap_or_default();
                    (*id, name)
                })
                .collect::<Vec<_>>(),
        ),
        None => (None, Vec::new()),
    };

    let roles: Vec<(RoleId, &str)> = role_names.iter().map(|(id, name)| (*id, name.as_str())).collect();
    let privileged = is_dj(manage_guild, &roles, dj_role);

    // los votos cuentan a los oyentes del canal donde suena el bot
    let listening_in = bot
        .music
        .registry()
        .get(guild_id)
        .and_then(|player| player.voice_channel())
        .or(voice_channel);
    let listeners = listening_in
        .map(|channel| super::listeners_in(ctx, guild_id, channel))
        .unwrap_or(0);

    Invoker {
        guild_id,
        user_id,
        text_channel: command.channel_id,
        voice_channel,
        privileged,
        listeners,
    }
}

// Funciones auxiliares

fn option<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a CommandDataOptionValue> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .map(|opt| &opt.value)
}

fn string_option<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    option(command, name).and_then(|value| value.as_str())
}

fn integer_option(command: &CommandInteraction, name: &str) -> Option<i64> {
    option(command, name).and_then(|value| value.as_i64())
}

fn position_option(command: &CommandInteraction, name: &str) -> usize {
    integer_option(command, name)
        .and_then(|value| usize::try_from(value).ok())
        .unwrap_or(0)
}

fn channel_option(command: &CommandInteraction, name: &str) -> Option<ChannelId> {
    option(command, name).and_then(|value| value.as_channel_id())
}

fn role_option(command: &CommandInteraction, name: &str) -> Option<RoleId> {
    option(command, name).and_then(|value| value.as_role_id())
}
