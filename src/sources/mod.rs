//! # Sources
//!
//! Puente hacia el resolvedor externo de canciones: parseo de la consulta,
//! llamada acotada por timeout y carga de playlists (bins y playlists de
//! YouTube). El resolvedor de producción es [`ytdlp::YtDlpResolver`].

pub mod paste;
pub mod ytdlp;

use async_trait::async_trait;
use regex::Regex;
use serenity::model::id::UserId;
use std::{fmt, sync::OnceLock, time::Duration};
use tracing::{debug, info, warn};

use crate::audio::song::Song;
use crate::error::{PlayerError, Result};
use paste::PasteService;

/// Dónde buscar una consulta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceHint {
    #[default]
    YouTube,
    Database,
    /// La consulta es la URL de un bin con una canción por línea
    Bin,
}

impl SourceHint {
    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix.to_lowercase().as_str() {
            "youtube" | "yt" => Some(SourceHint::YouTube),
            "database" | "db" => Some(SourceHint::Database),
            "bin" => Some(SourceHint::Bin),
            _ => None,
        }
    }
}

impl fmt::Display for SourceHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceHint::YouTube => write!(f, "YouTube"),
            SourceHint::Database => write!(f, "base de datos"),
            SourceHint::Bin => write!(f, "bin"),
        }
    }
}

/// Resolvedor externo: convierte una búsqueda o URL en una [`Song`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaResolver: Send + Sync {
    async fn resolve(&self, query: &str, hint: SourceHint, requester: UserId) -> Result<Song>;

    /// URLs de las entradas de una playlist, en orden
    async fn playlist_entries(&self, url: &str) -> Result<Vec<String>>;
}

/// Consulta ya separada de su prefijo de fuente.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedQuery {
    pub hint: SourceHint,
    pub query: String,
}

fn source_prefix() -> Option<&'static Regex> {
    static PREFIX: OnceLock<Option<Regex>> = OnceLock::new();
    PREFIX
        .get_or_init(|| Regex::new(r"^(\w+):\s?(.+)$").ok())
        .as_ref()
}

fn youtube_url() -> Option<&'static Regex> {
    static YOUTUBE: OnceLock<Option<Regex>> = OnceLock::new();
    YOUTUBE
        .get_or_init(|| Regex::new(r"^(?:https?://)?(?:www\.|m\.|music\.)?(?:youtube\.com|youtu\.be)/\S+$").ok())
        .as_ref()
}

/// `true` para enlaces de YouTube que apuntan a una playlist (`list=`)
pub fn is_youtube_playlist(query: &str) -> bool {
    query.contains("list=") && youtube_url().is_some_and(|re| re.is_match(query))
}

/// Separa un prefijo `fuente:` conocido y quita los `<...>` que evitan el
/// embed de enlaces en el chat.
pub fn parse_query(input: &str) -> ParsedQuery {
    let input = input.trim();

    let (hint, query) = match source_prefix().and_then(|re| re.captures(input)) {
        Some(caps) => match SourceHint::from_prefix(&caps[1]) {
            Some(hint) => (hint, caps[2].trim().to_string()),
            None => (SourceHint::default(), input.to_string()),
        },
        None => (SourceHint::default(), input.to_string()),
    };

    let query = if query.starts_with('<') && query.ends_with('>') {
        query.trim_matches(|c| c == '<' || c == '>').to_string()
    } else {
        query
    };

    ParsedQuery { hint, query }
}

/// Llama al resolvedor con un límite de tiempo.
pub async fn resolve_with_timeout(
    resolver: &dyn MediaResolver,
    query: &str,
    hint: SourceHint,
    requester: UserId,
    limit: Duration,
) -> Result<Song> {
    debug!("🔍 Buscando en {}: {}", hint, query);

    match tokio::time::timeout(limit, resolver.resolve(query, hint, requester)).await {
        Ok(result) => result,
        Err(_) => {
            warn!("⏱️ Tiempo agotado al resolver: {}", query);
            Err(PlayerError::ResolutionTimeout(limit))
        }
    }
}

/// Canciones cargadas desde un bin o una playlist.
#[derive(Debug, Default)]
pub struct LoadedPlaylist {
    pub songs: Vec<Song>,
    pub failed: usize,
}

/// Descarga un bin y resuelve cada línea no vacía.
///
/// Los bins con más de `max_lines` líneas se rechazan sin resolver nada.
pub async fn load_bin(
    paste: &dyn PasteService,
    resolver: &dyn MediaResolver,
    url: &str,
    requester: UserId,
    max_lines: usize,
    limit: Duration,
) -> Result<LoadedPlaylist> {
    info!("📥 Cargando bin: {}", url);
    let body = paste.fetch(url).await?;

    let lines: Vec<&str> = body
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    if lines.len() > max_lines {
        return Err(PlayerError::Resolution(format!(
            "El bin tiene {} líneas (máximo {})",
            lines.len(),
            max_lines
        )));
    }

    let queries: Vec<ParsedQuery> = lines.into_iter().map(|line| {
        let parsed = parse_query(line);
        match parsed.hint {
            // no se permiten bins anidados
            SourceHint::Bin => ParsedQuery {
                hint: SourceHint::YouTube,
                ..parsed
            },
            _ => parsed,
        }
    }).collect();

    let playlist = resolve_each(resolver, queries, requester, limit).await;
    info!(
        "✅ Bin cargado: {} canciones, {} fallidas",
        playlist.songs.len(),
        playlist.failed
    );
    Ok(playlist)
}

/// Lista una playlist de YouTube y resuelve sus entradas.
///
/// Solo se cargan las primeras `max_songs` entradas.
pub async fn load_playlist(
    resolver: &dyn MediaResolver,
    url: &str,
    requester: UserId,
    max_songs: usize,
    limit: Duration,
) -> Result<LoadedPlaylist> {
    info!("📃 Cargando playlist: {}", url);

    let mut entries = match tokio::time::timeout(limit, resolver.playlist_entries(url)).await {
        Ok(entries) => entries?,
        Err(_) => {
            warn!("⏱️ Tiempo agotado al listar la playlist: {}", url);
            return Err(PlayerError::ResolutionTimeout(limit));
        }
    };

    if entries.is_empty() {
        return Err(PlayerError::Resolution("La playlist está vacía".to_string()));
    }
    if entries.len() > max_songs {
        warn!(
            "Playlist con {} entradas, se cargan las primeras {}",
            entries.len(),
            max_songs
        );
        entries.truncate(max_songs);
    }

    let queries = entries.into_iter().map(|query| ParsedQuery {
        hint: SourceHint::YouTube,
        query,
    });

    let playlist = resolve_each(resolver, queries, requester, limit).await;
    info!(
        "✅ Playlist cargada: {} canciones, {} fallidas",
        playlist.songs.len(),
        playlist.failed
    );
    Ok(playlist)
}

async fn resolve_each(
    resolver: &dyn MediaResolver,
    queries: impl IntoIterator<Item = ParsedQuery>,
    requester: UserId,
    limit: Duration,
) -> LoadedPlaylist {
    let mut playlist = LoadedPlaylist::default();

    for parsed in queries {
        match resolve_with_timeout(resolver, &parsed.query, parsed.hint, requester, limit).await {
            Ok(song) => playlist.songs.push(song),
            Err(e) => {
                debug!("Entrada descartada ({}): {}", parsed.query, e);
                playlist.failed += 1;
            }
        }
    }

    playlist
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::song;
    use paste::MockPasteService;
    use pretty_assertions::assert_eq;

    #[test]
    fn known_prefixes_select_the_source() {
        assert_eq!(
            parse_query("db: never gonna"),
            ParsedQuery {
                hint: SourceHint::Database,
                query: "never gonna".into()
            }
        );
        assert_eq!(parse_query("YT:lofi").hint, SourceHint::YouTube);
        assert_eq!(parse_query("bin: https://mystb.in/abc").hint, SourceHint::Bin);
    }

    #[test]
    fn unknown_prefix_keeps_the_whole_query() {
        let parsed = parse_query("https://youtu.be/dQw4w9WgXcQ");
        assert_eq!(parsed.hint, SourceHint::YouTube);
        assert_eq!(parsed.query, "https://youtu.be/dQw4w9WgXcQ");

        assert_eq!(parse_query("note: a song").query, "note: a song");
    }

    #[test]
    fn angle_brackets_are_stripped() {
        assert_eq!(
            parse_query("<https://youtu.be/abc>").query,
            "https://youtu.be/abc"
        );
        assert_eq!(parse_query("yt: <https://youtu.be/abc>").query, "https://youtu.be/abc");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_resolver_times_out() {
        struct Slow;

        #[async_trait]
        impl MediaResolver for Slow {
            async fn resolve(&self, query: &str, _: SourceHint, _: UserId) -> Result<Song> {
                tokio::time::sleep(Duration::from_secs(600)).await;
                Ok(song(query))
            }

            async fn playlist_entries(&self, _: &str) -> Result<Vec<String>> {
                tokio::time::sleep(Duration::from_secs(600)).await;
                Ok(Vec::new())
            }
        }

        let result = resolve_with_timeout(
            &Slow,
            "algo",
            SourceHint::YouTube,
            UserId::new(1),
            Duration::from_secs(180),
        )
        .await;

        assert_eq!(
            result,
            Err(PlayerError::ResolutionTimeout(Duration::from_secs(180)))
        );

        let listing = load_playlist(
            &Slow,
            "https://www.youtube.com/playlist?list=PL1",
            UserId::new(1),
            10,
            Duration::from_secs(180),
        )
        .await;
        assert!(matches!(listing, Err(PlayerError::ResolutionTimeout(_))));
    }

    #[test]
    fn playlist_links_are_detected() {
        assert!(is_youtube_playlist("https://www.youtube.com/playlist?list=PLx"));
        assert!(is_youtube_playlist("https://youtube.com/watch?v=abc&list=PLx"));
        assert!(is_youtube_playlist("youtu.be/abc?list=PLx"));
        assert!(!is_youtube_playlist("https://youtu.be/abc"));
        assert!(!is_youtube_playlist("https://example.com/?list=PLx"));
        assert!(!is_youtube_playlist("canciones list=rock"));
    }

    #[tokio::test]
    async fn playlist_entries_are_capped_and_resolved() {
        let mut resolver = MockMediaResolver::new();
        resolver.expect_playlist_entries().times(1).returning(|_| {
            Ok(vec![
                "https://youtu.be/a".to_string(),
                "https://youtu.be/privado".to_string(),
                "https://youtu.be/b".to_string(),
                "https://youtu.be/c".to_string(),
            ])
        });
        resolver
            .expect_resolve()
            .times(3)
            .returning(|query, _, _| match query {
                "https://youtu.be/privado" => Err(PlayerError::Resolution("video privado".into())),
                other => Ok(song(other)),
            });

        let playlist = load_playlist(
            &resolver,
            "https://www.youtube.com/playlist?list=PL1",
            UserId::new(1),
            3,
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        let titles: Vec<_> = playlist.songs.iter().map(|s| s.title().to_string()).collect();
        assert_eq!(titles, vec!["https://youtu.be/a", "https://youtu.be/b"]);
        assert_eq!(playlist.failed, 1);
    }

    #[tokio::test]
    async fn empty_playlists_are_rejected() {
        let mut resolver = MockMediaResolver::new();
        resolver.expect_playlist_entries().returning(|_| Ok(Vec::new()));
        resolver.expect_resolve().never();

        let result = load_playlist(
            &resolver,
            "https://www.youtube.com/playlist?list=PL1",
            UserId::new(1),
            10,
            Duration::from_secs(5),
        )
        .await;

        assert!(matches!(result, Err(PlayerError::Resolution(_))));
    }

    #[tokio::test]
    async fn bin_lines_are_resolved_and_failures_counted() {
        let mut paste = MockPasteService::new();
        paste
            .expect_fetch()
            .returning(|_| Ok("https://youtu.be/a\n\nroto\ndb: b\n".to_string()));

        let mut resolver = MockMediaResolver::new();
        resolver
            .expect_resolve()
            .returning(|query, hint, _| match (query, hint) {
                ("roto", _) => Err(PlayerError::Resolution("sin resultados".into())),
                ("b", SourceHint::Database) => Ok(song("b")),
                (other, _) => Ok(song(other)),
            });

        let playlist = load_bin(
            &paste,
            &resolver,
            "https://mystb.in/abc",
            UserId::new(1),
            50,
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        let titles: Vec<_> = playlist.songs.iter().map(|s| s.title().to_string()).collect();
        assert_eq!(titles, vec!["https://youtu.be/a", "b"]);
        assert_eq!(playlist.failed, 1);
    }

    #[tokio::test]
    async fn oversized_bins_are_rejected() {
        let mut paste = MockPasteService::new();
        paste
            .expect_fetch()
            .returning(|_| Ok("x\n".repeat(51)));

        let mut resolver = MockMediaResolver::new();
        resolver.expect_resolve().never();

        let result = load_bin(
            &paste,
            &resolver,
            "https://mystb.in/big",
            UserId::new(1),
            50,
            Duration::from_secs(5),
        )
        .await;

        assert!(matches!(result, Err(PlayerError::Resolution(_))));
    }
}
