use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    /// Registra los comandos solo en este guild (desarrollo)
    pub guild_id: Option<u64>,

    // Audio
    pub default_volume: f32,
    pub max_sink_failures: u32,

    // Tiempos
    pub inactivity_timeout: Duration,
    pub resolve_timeout: Duration,
    pub paste_timeout: Duration,

    // Paste / bins
    pub paste_url: String,
    pub max_bin_lines: usize,
    /// Entradas de una playlist de YouTube que se cargan como máximo
    pub max_playlist_songs: usize,

    // Paths
    pub data_dir: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;

        std::fs::create_dir_all(&config.data_dir).with_context(|| {
            format!("No se pudo crear el directorio {}", config.data_dir.display())
        })?;

        Ok(config)
    }

    /// Construye la configuración a partir de una función de búsqueda de
    /// variables (el entorno en producción, un mapa en los tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let duration = |key: &str, default: Duration| -> Result<Duration> {
            match var(key) {
                Some(value) => humantime::parse_duration(value.trim())
                    .with_context(|| format!("{} no es una duración válida: {}", key, value)),
                None => Ok(default),
            }
        };

        let config = Self {
            discord_token: var("DISCORD_TOKEN").context("DISCORD_TOKEN no está definido")?,
            guild_id: var("GUILD_ID")
                .map(|id| id.trim().parse())
                .transpose()
                .context("GUILD_ID inválido")?,

            default_volume: match var("DEFAULT_VOLUME") {
                Some(value) => value.trim().parse().context("DEFAULT_VOLUME inválido")?,
                None => defaults.default_volume,
            },
            max_sink_failures: match var("MAX_SINK_FAILURES") {
                Some(value) => value.trim().parse().context("MAX_SINK_FAILURES inválido")?,
                None => defaults.max_sink_failures,
            },

            inactivity_timeout: duration("INACTIVITY_TIMEOUT", defaults.inactivity_timeout)?,
            resolve_timeout: duration("RESOLVE_TIMEOUT", defaults.resolve_timeout)?,
            paste_timeout: duration("PASTE_TIMEOUT", defaults.paste_timeout)?,

            paste_url: var("PASTE_URL").unwrap_or(defaults.paste_url),
            max_bin_lines: match var("MAX_BIN_LINES") {
                Some(value) => value.trim().parse().context("MAX_BIN_LINES inválido")?,
                None => defaults.max_bin_lines,
            },
            max_playlist_songs: match var("MAX_PLAYLIST_SONGS") {
                Some(value) => value.trim().parse().context("MAX_PLAYLIST_SONGS inválido")?,
                None => defaults.max_playlist_songs,
            },

            data_dir: var("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// - Volume must be between 0.0 and 1.0
    /// - Timeouts must be non-zero
    /// - The paste URL must be an absolute http(s) URL
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.default_volume) {
            bail!("Default volume must be between 0.0 and 1.0, got: {}", self.default_volume);
        }

        if self.max_sink_failures == 0 {
            bail!("Max sink failures must be greater than 0");
        }

        if self.inactivity_timeout.is_zero() {
            bail!("Inactivity timeout must be greater than 0");
        }

        if self.resolve_timeout.is_zero() || self.paste_timeout.is_zero() {
            bail!("Resolve and paste timeouts must be greater than 0");
        }

        if self.max_bin_lines == 0 || self.max_playlist_songs == 0 {
            bail!("Max bin lines and playlist songs must be greater than 0");
        }

        let paste = url::Url::parse(&self.paste_url)
            .with_context(|| format!("Invalid paste URL: {}", self.paste_url))?;
        if !matches!(paste.scheme(), "http" | "https") {
            bail!("Paste URL must use http or https, got: {}", self.paste_url);
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// The Discord token is never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Audio: {}% vol, {} fallos máx. del sink\n  \
            Timeouts: inactividad {}, búsqueda {}, paste {}\n  \
            Paste: {} (bins de hasta {} líneas, playlists de hasta {} canciones)\n  \
            Data: {}",
            (self.default_volume * 100.0).round() as u32,
            self.max_sink_failures,
            humantime::format_duration(self.inactivity_timeout),
            humantime::format_duration(self.resolve_timeout),
            humantime::format_duration(self.paste_timeout),
            self.paste_url,
            self.max_bin_lines,
            self.max_playlist_songs,
            self.data_dir.display()
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (sin valor por defecto)
            discord_token: String::new(),
            guild_id: None,

            default_volume: 0.5,
            max_sink_failures: 3,

            inactivity_timeout: Duration::from_secs(120),
            resolve_timeout: Duration::from_secs(180),
            paste_timeout: Duration::from_secs(10),

            paste_url: "https://mystb.in".to_string(),
            max_bin_lines: 50,
            max_playlist_songs: 100,

            data_dir: "/app/data".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_the_token_is_set() {
        let config = Config::from_lookup(lookup(&[("DISCORD_TOKEN", "token")])).unwrap();

        assert_eq!(config.inactivity_timeout, Duration::from_secs(120));
        assert_eq!(config.resolve_timeout, Duration::from_secs(180));
        assert_eq!(config.paste_url, "https://mystb.in");
        assert_eq!(config.max_bin_lines, 50);
        assert_eq!(config.max_playlist_songs, 100);
        assert_eq!(config.default_volume, 0.5);
        assert_eq!(config.guild_id, None);
    }

    #[test]
    fn guild_id_is_optional_but_must_be_numeric() {
        let config =
            Config::from_lookup(lookup(&[("DISCORD_TOKEN", "token"), ("GUILD_ID", "1234")])).unwrap();
        assert_eq!(config.guild_id, Some(1234));

        assert!(Config::from_lookup(lookup(&[("DISCORD_TOKEN", "token"), ("GUILD_ID", "abc")])).is_err());
    }

    #[test]
    fn durations_use_humantime_syntax() {
        let config = Config::from_lookup(lookup(&[
            ("DISCORD_TOKEN", "token"),
            ("INACTIVITY_TIMEOUT", "2m 30s"),
            ("RESOLVE_TIMEOUT", "45s"),
        ]))
        .unwrap();

        assert_eq!(config.inactivity_timeout, Duration::from_secs(150));
        assert_eq!(config.resolve_timeout, Duration::from_secs(45));
    }

    #[test]
    fn missing_token_is_an_error() {
        assert!(Config::from_lookup(lookup(&[])).is_err());
        assert!(Config::from_lookup(lookup(&[("DISCORD_TOKEN", "  ")])).is_err());
    }

    #[test]
    fn invalid_values_are_rejected() {
        for (key, value) in [
            ("DEFAULT_VOLUME", "1.5"),
            ("INACTIVITY_TIMEOUT", "pronto"),
            ("PASTE_URL", "ftp://paste.example"),
            ("MAX_SINK_FAILURES", "0"),
            ("MAX_PLAYLIST_SONGS", "0"),
        ] {
            let result = Config::from_lookup(lookup(&[("DISCORD_TOKEN", "token"), (key, value)]));
            assert!(result.is_err(), "{key}={value} debería fallar");
        }
    }

    #[test]
    fn summary_never_leaks_the_token() {
        let config = Config::from_lookup(lookup(&[("DISCORD_TOKEN", "super-secreto")])).unwrap();
        assert!(!config.summary().contains("super-secreto"));
    }
}
