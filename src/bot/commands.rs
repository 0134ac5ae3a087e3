use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, channel::ChannelType, id::GuildId},
    prelude::Context,
};

fn all_commands() -> Vec<CreateCommand> {
    vec![
        join_command(),
        summon_command(),
        leave_command(),
        play_command(),
        playbin_command(),
        now_command(),
        pause_command(),
        resume_command(),
        stop_command(),
        skip_command(),
        skipto_command(),
        startover_command(),
        queue_command(),
        clear_command(),
        savequeue_command(),
        shuffle_command(),
        remove_command(),
        loop_command(),
        notify_command(),
        volume_command(),
        djrole_command(),
    ]
}

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;

    Ok(())
}

// Comandos de conexión

fn join_command() -> CreateCommand {
    CreateCommand::new("join").description("Conecta el bot a tu canal de voz")
}

fn summon_command() -> CreateCommand {
    CreateCommand::new("summon")
        .description("Mueve el bot a un canal de voz (DJ)")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Channel, "channel", "Canal de voz destino")
                .channel_types(vec![ChannelType::Voice, ChannelType::Stage]),
        )
}

fn leave_command() -> CreateCommand {
    CreateCommand::new("leave").description("Limpia la cola y desconecta el bot (DJ)")
}

// Comandos de reproducción

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Reproduce una canción (prefijos: yt:, db:, bin:)")
        .add_option(CreateCommandOption::new(
            CommandOptionType::String,
            "query",
            "URL o término de búsqueda; vacío para reanudar",
        ))
}

fn playbin_command() -> CreateCommand {
    CreateCommand::new("playbin")
        .description("Carga una playlist desde un bin (una canción por línea)")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "url", "URL del bin")
                .required(true),
        )
}

fn now_command() -> CreateCommand {
    CreateCommand::new("now").description("Muestra la canción actual")
}

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pausa la reproducción actual (DJ)")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Reanuda la reproducción pausada (DJ)")
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Detiene la reproducción y limpia la cola (DJ)")
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Vota para saltar la canción actual")
}

fn skipto_command() -> CreateCommand {
    CreateCommand::new("skipto")
        .description("Salta a una posición de la cola (DJ)")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "position", "Posición en la cola")
                .min_int_value(1)
                .required(true),
        )
}

fn startover_command() -> CreateCommand {
    CreateCommand::new("startover").description("Vuelve a empezar la canción actual")
}

// Comandos de cola

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue")
        .description("Muestra la cola de reproducción")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "page", "Número de página")
                .min_int_value(1),
        )
}

fn clear_command() -> CreateCommand {
    CreateCommand::new("clear").description("Limpia la cola de reproducción")
}

fn savequeue_command() -> CreateCommand {
    CreateCommand::new("savequeue").description("Guarda la cola en un bin")
}

fn shuffle_command() -> CreateCommand {
    CreateCommand::new("shuffle").description("Vota para mezclar la cola")
}

fn remove_command() -> CreateCommand {
    CreateCommand::new("remove")
        .description("Vota para quitar una canción de la cola")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "position", "Posición en la cola")
                .min_int_value(1)
                .required(true),
        )
}

fn loop_command() -> CreateCommand {
    CreateCommand::new("loop")
        .description("Activa/desactiva la repetición")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "mode", "Qué repetir")
                .add_string_choice("Canción", "song")
                .add_string_choice("Cola", "queue"),
        )
}

// Ajustes

fn notify_command() -> CreateCommand {
    CreateCommand::new("notify").description("Activa/desactiva los avisos de \"reproduciendo ahora\"")
}

fn volume_command() -> CreateCommand {
    CreateCommand::new("volume")
        .description("Muestra o ajusta el volumen (DJ)")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "level", "Nivel de volumen (0-100)")
                .min_int_value(0)
                .max_int_value(100),
        )
}

fn djrole_command() -> CreateCommand {
    CreateCommand::new("djrole")
        .description("Configura el rol DJ del servidor; vacío para volver al rol \"DJ\"")
        .add_option(CreateCommandOption::new(CommandOptionType::Role, "role", "Rol DJ"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_command_is_registered_once() {
        let commands = all_commands();
        let names: std::collections::HashSet<String> = commands
            .iter()
            .map(|command| serde_json::to_value(command).unwrap()["name"].as_str().unwrap().to_string())
            .collect();

        assert_eq!(names.len(), commands.len());
        assert!(names.contains("play"));
        assert!(names.contains("skip"));
    }
}
