use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

use open_music::{
    audio::{inactivity::InactivityMonitor, registry::PlayerRegistry},
    bot::{announcer::HttpAnnouncer, music::MusicCommands, voice::SongbirdConnector, OpenMusicBot},
    config::Config,
    sources::{paste::HasteClient, ytdlp::YtDlpResolver},
    storage::JsonStorage,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("open_music=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Open Music Bot v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Arc::new(Config::load()?);
    info!("{}", config.summary());

    // Inicializar almacenamiento JSON
    let storage = Arc::new(tokio::sync::Mutex::new(
        JsonStorage::new(config.data_dir.clone(), config.default_volume).await?,
    ));

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let songbird = Songbird::serenity();
    let http_client = reqwest::Client::builder()
        .user_agent(concat!("open-music/", env!("CARGO_PKG_VERSION")))
        .build()?;

    // El cliente HTTP de Discord existe antes que el handler
    let http = Arc::new(serenity::http::Http::new(&config.discord_token));
    let registry = PlayerRegistry::new(Arc::new(HttpAnnouncer::new(http)));
    let paste = Arc::new(HasteClient::new(&config.paste_url, config.paste_timeout)?);
    let monitor = InactivityMonitor::new(registry.clone(), paste.clone(), config.inactivity_timeout);

    let music = Arc::new(MusicCommands::new(
        &config,
        registry.clone(),
        Arc::new(SongbirdConnector::new(songbird.clone(), http_client)),
        Arc::new(YtDlpResolver::new(3)),
        paste,
        storage,
    ));

    let handler = OpenMusicBot::new(config.clone(), music, monitor);

    // Construir cliente
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        registry.destroy_all().await;
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}
