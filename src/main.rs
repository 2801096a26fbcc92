use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info, warn};

mod audio;
mod bot;
mod config;
mod stats;

use crate::audio::{
    catalog::{Catalog, COLLECTIONS},
    clip::DirClipStore,
    player::AudioPlayer,
    songbird_transport::SongbirdTransport,
};
use crate::bot::AirhornBot;
use crate::config::Config;
use crate::stats::{PlayCounters, StatsRecorder};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("airhorn=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("📯 Iniciando Airhorn Bot v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;
    info!("{}", config.summary());

    // Precargar todos los clips
    info!("📦 Precargando sonidos desde {}", config.audio_dir.display());
    let store = DirClipStore::new(config.audio_dir.clone());
    let (catalog, report) = Catalog::load(COLLECTIONS, &store).await?;
    if report.clips > 0 && report.unplayable == report.clips {
        warn!(
            "⚠️ Ningún clip tiene audio, revisa AUDIO_DIR ({})",
            config.audio_dir.display()
        );
    }

    // Estadísticas en segundo plano
    let (stats, counters) = if config.stats_enabled {
        let counters = Arc::new(PlayCounters::new());
        let (recorder, _worker) = StatsRecorder::spawn(counters.clone(), config.stats_buffer);
        info!("📊 Estadísticas activadas");
        (recorder, Some(counters))
    } else {
        (StatsRecorder::disabled(), None)
    };

    // Songbird compartido entre el cliente y el reproductor
    let songbird = Songbird::serenity();
    let player = Arc::new(AudioPlayer::new(
        Arc::new(SongbirdTransport::new(songbird.clone())),
        stats,
        config.max_queue_size,
        config.timing(),
    ));

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let handler = AirhornBot::new(Arc::new(catalog), player, counters);

    // Construir cliente
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("⚠️ Señal de shutdown recibida, cerrando...");
                shard_manager.shutdown_all().await;
            }
            Err(e) => error!("Error al registrar Ctrl+C: {:?}", e),
        }
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    let started = match config.shard_count {
        Some(shards) => client.start_shards(shards).await,
        None => client.start_autosharded().await,
    };
    if let Err(why) = started {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}
