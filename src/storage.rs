use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::fs;
use tracing::{info, warn};

use crate::audio::player::PlayerOptions;

/// Preferencias de un servidor almacenadas en JSON
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildSettings {
    pub guild_id: u64,
    /// Volumen inicial del reproductor, en porcentaje (0..=100)
    pub default_volume: u8,
    /// Avisos de "reproduciendo ahora"
    pub notify: bool,
    pub dj_role_id: Option<u64>,
}

impl GuildSettings {
    pub fn new(guild_id: u64, default_volume: f32) -> Self {
        Self {
            guild_id,
            default_volume: (default_volume.clamp(0.0, 1.0) * 100.0).round() as u8,
            notify: true,
            dj_role_id: None,
        }
    }

    /// Opciones con las que se crea el reproductor de este servidor
    pub fn player_options(&self, max_sink_failures: u32) -> PlayerOptions {
        PlayerOptions {
            volume: f32::from(self.default_volume.min(100)) / 100.0,
            notify: self.notify,
            max_sink_failures,
        }
    }
}

/// Manager de almacenamiento basado en archivos JSON
pub struct JsonStorage {
    data_dir: PathBuf,
    default_volume: f32,
    cache: HashMap<u64, GuildSettings>,
}

impl JsonStorage {
    pub async fn new(data_dir: PathBuf, default_volume: f32) -> Result<Self> {
        let servers_dir = data_dir.join("servers");
        fs::create_dir_all(&servers_dir)
            .await
            .with_context(|| format!("No se pudo crear {}", servers_dir.display()))?;

        info!("📁 Storage inicializado en: {}", data_dir.display());

        let mut storage = Self {
            data_dir,
            default_volume,
            cache: HashMap::new(),
        };
        storage.load_all().await?;

        Ok(storage)
    }

    /// Obtiene las preferencias de un servidor, creándolas si no existen
    pub async fn settings(&mut self, guild_id: u64) -> Result<GuildSettings> {
        if let Some(settings) = self.cache.get(&guild_id) {
            return Ok(settings.clone());
        }

        let settings = GuildSettings::new(guild_id, self.default_volume);
        self.save(&settings).await?;
        self.cache.insert(guild_id, settings.clone());

        info!("📝 Configuración por defecto creada para guild {}", guild_id);
        Ok(settings)
    }

    pub async fn update(&mut self, settings: GuildSettings) -> Result<()> {
        self.save(&settings).await?;
        info!("💾 Configuración actualizada para guild {}", settings.guild_id);
        self.cache.insert(settings.guild_id, settings);
        Ok(())
    }

    pub async fn set_notify(&mut self, guild_id: u64, notify: bool) -> Result<()> {
        let mut settings = self.settings(guild_id).await?;
        settings.notify = notify;
        self.update(settings).await
    }

    pub async fn set_dj_role(&mut self, guild_id: u64, role_id: Option<u64>) -> Result<()> {
        let mut settings = self.settings(guild_id).await?;
        settings.dj_role_id = role_id;
        self.update(settings).await
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    // Métodos privados

    async fn save(&self, settings: &GuildSettings) -> Result<()> {
        let path = self.file_path(settings.guild_id);
        let content = serde_json::to_string_pretty(settings)?;
        fs::write(&path, content)
            .await
            .with_context(|| format!("No se pudo escribir {}", path.display()))?;
        Ok(())
    }

    async fn load_all(&mut self) -> Result<()> {
        let servers_dir = self.data_dir.join("servers");
        let mut files = fs::read_dir(&servers_dir).await?;
        let mut loaded = 0;

        while let Some(entry) = files.next_entry().await? {
            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }

            let Some(guild_id) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.strip_prefix("guild_"))
                .and_then(|id| id.parse::<u64>().ok())
            else {
                continue;
            };

            let parsed = fs::read_to_string(&path)
                .await
                .map_err(anyhow::Error::from)
                .and_then(|content| Ok(serde_json::from_str::<GuildSettings>(&content)?));

            match parsed {
                Ok(settings) => {
                    self.cache.insert(guild_id, settings);
                    loaded += 1;
                }
                Err(e) => warn!("Error cargando configuración para guild {}: {}", guild_id, e),
            }
        }

        if loaded > 0 {
            info!("📂 Cargadas {} configuraciones de servidor", loaded);
        }

        Ok(())
    }

    fn file_path(&self, guild_id: u64) -> PathBuf {
        self.data_dir.join("servers").join(format!("guild_{}.json", guild_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[tokio::test]
    async fn first_access_creates_defaults_on_disk() {
        let dir = TempDir::new().unwrap();
        let mut storage = JsonStorage::new(dir.path().to_path_buf(), 0.5).await.unwrap();

        let settings = storage.settings(42).await.unwrap();

        assert_eq!(settings, GuildSettings::new(42, 0.5));
        assert!(dir.path().join("servers/guild_42.json").exists());
    }

    #[tokio::test]
    async fn settings_survive_a_reload() {
        let dir = TempDir::new().unwrap();
        {
            let mut storage = JsonStorage::new(dir.path().to_path_buf(), 0.5).await.unwrap();
            storage.set_notify(7, false).await.unwrap();
            storage.set_dj_role(7, Some(99)).await.unwrap();
        }

        let mut storage = JsonStorage::new(dir.path().to_path_buf(), 0.5).await.unwrap();
        let settings = storage.settings(7).await.unwrap();

        assert!(!settings.notify);
        assert_eq!(settings.dj_role_id, Some(99));
        assert_eq!(storage.len(), 1);
    }

    #[tokio::test]
    async fn corrupt_files_are_skipped() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("servers")).unwrap();
        std::fs::write(dir.path().join("servers/guild_5.json"), "{ nope").unwrap();
        std::fs::write(dir.path().join("servers/notes.txt"), "hola").unwrap();

        let storage = JsonStorage::new(dir.path().to_path_buf(), 0.5).await.unwrap();

        assert!(storage.is_empty());
    }

    #[test]
    fn player_options_scale_the_volume() {
        let settings = GuildSettings {
            default_volume: 80,
            ..GuildSettings::new(1, 0.5)
        };

        let options = settings.player_options(3);

        assert_eq!(options.volume, 0.8);
        assert!(options.notify);
        assert_eq!(options.max_sink_failures, 3);
    }
}
