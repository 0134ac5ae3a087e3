use async_process::Command;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use serenity::model::id::UserId;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use super::{MediaResolver, SourceHint};
use crate::audio::song::{Song, StreamRef};
use crate::error::{PlayerError, Result};

/// Resolvedor basado en yt-dlp
pub struct YtDlpResolver {
    // Limitar procesos concurrentes para evitar rate limiting
    rate_limiter: Semaphore,
}

/// Información extraída de yt-dlp
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    id: String,
    title: String,
    duration: Option<f64>,
    uploader: Option<String>,
    thumbnail: Option<String>,
    webpage_url: String,
    /// URL directa del formato elegido con `-f`
    url: Option<String>,
    extractor: Option<String>,
    is_live: Option<bool>,
}

impl YtDlpResolver {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            rate_limiter: Semaphore::new(max_concurrent.max(1)),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| PlayerError::Resolution(e.to_string()))?;

        debug!("📊 Ejecutando yt-dlp {}", args.join(" "));

        let output = Command::new("yt-dlp")
            .args(args)
            .output()
            .await
            .map_err(|e| PlayerError::Resolution(format!("Error al ejecutar yt-dlp: {}", e)))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(PlayerError::Resolution(format!("yt-dlp error: {}", error.trim())));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Búsqueda de un solo resultado, o la URL tal cual
fn search_target(query: &str) -> String {
    if query.starts_with("http://") || query.starts_with("https://") {
        query.to_string()
    } else {
        format!("ytsearch1:{}", query)
    }
}

/// Entrada de `--flat-playlist`: sin stream, solo identificadores
#[derive(Debug, Deserialize)]
struct YtDlpEntry {
    id: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct YtDlpPlaylist {
    #[serde(default)]
    entries: Vec<Option<YtDlpEntry>>,
}

fn parse_playlist(stdout: &str) -> Result<Vec<String>> {
    let playlist: YtDlpPlaylist = serde_json::from_str(stdout.trim())
        .map_err(|e| PlayerError::Resolution(format!("Error al parsear la playlist de yt-dlp: {}", e)))?;

    let urls = playlist
        .entries
        .into_iter()
        .flatten()
        .filter_map(|entry| match (entry.url, entry.id) {
            (Some(url), _) if url.starts_with("http") => Some(url),
            (_, Some(id)) => Some(format!("https://www.youtube.com/watch?v={}", id)),
            _ => None,
        })
        .collect();

    Ok(urls)
}

fn parse_song(stdout: &str, requester: UserId) -> Result<Song> {
    let line = stdout
        .lines()
        .find(|line| !line.trim().is_empty())
        .ok_or_else(|| PlayerError::Resolution("No se encontraron resultados".to_string()))?;

    let info: YtDlpInfo = serde_json::from_str(line)
        .map_err(|e| PlayerError::Resolution(format!("Error al parsear respuesta de yt-dlp: {}", e)))?;

    let stream = info
        .url
        .clone()
        .ok_or_else(|| PlayerError::Resolution(format!("Sin stream de audio para {}", info.title)))?;

    let duration = info
        .duration
        .filter(|secs| secs.is_finite() && *secs > 0.0)
        .map(Duration::from_secs_f64)
        .unwrap_or_default();

    let metadata = json!({
        "id": info.id,
        "uploader": info.uploader,
        "thumbnail": info.thumbnail,
        "extractor": info.extractor,
        "is_live": info.is_live.unwrap_or(false),
    });

    Ok(Song::new(info.title, info.webpage_url, duration, StreamRef::Url(stream), requester)
        .with_metadata(metadata))
}

#[async_trait]
impl MediaResolver for YtDlpResolver {
    async fn resolve(&self, query: &str, hint: SourceHint, requester: UserId) -> Result<Song> {
        match hint {
            SourceHint::YouTube => {
                info!("🔍 Buscando en YouTube: {}", query);
                let target = search_target(query);
                let stdout = self
                    .run(&[
                        "--no-playlist",
                        "--dump-json",
                        "-f",
                        "bestaudio/best",
                        "--no-warnings",
                        target.as_str(),
                    ])
                    .await?;
                parse_song(&stdout, requester)
            }
            other => Err(PlayerError::Resolution(format!(
                "La fuente {} no está disponible",
                other
            ))),
        }
    }

    async fn playlist_entries(&self, url: &str) -> Result<Vec<String>> {
        info!("📃 Listando playlist de YouTube: {}", url);
        let stdout = self
            .run(&["--flat-playlist", "-J", "--no-warnings", url])
            .await?;
        parse_playlist(&stdout)
    }
}
