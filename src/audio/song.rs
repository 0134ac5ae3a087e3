use chrono::{DateTime, Utc};
use serde_json::Value;
use serenity::model::id::UserId;
use std::{path::PathBuf, time::Duration};

/// Dónde obtiene el sink el audio de una canción.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamRef {
    /// Stream remoto (URL directa de audio)
    Url(String),
    /// Archivo local ya descargado
    File(PathBuf),
}

/// A resolved media item.
///
/// Immutable once built: the resolver fills it in and the core only ever reads
/// `title`, `url` and `duration`. Whatever else the resolver knows travels in
/// the opaque `metadata` blob.
#[derive(Debug, Clone, PartialEq)]
pub struct Song {
    title: String,
    url: String,
    duration: Duration,
    stream: StreamRef,
    requested_by: UserId,
    metadata: Value,
    added_at: DateTime<Utc>,
}

impl Song {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        duration: Duration,
        stream: StreamRef,
        requested_by: UserId,
    ) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            duration,
            stream,
            requested_by,
            metadata: Value::Null,
            added_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    // Getters
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn url(&self) -> &str {
        &self.url
    }
    pub fn duration(&self) -> Duration {
        self.duration
    }
    pub fn duration_secs(&self) -> u64 {
        self.duration.as_secs()
    }
    pub fn stream(&self) -> &StreamRef {
        &self.stream
    }
    pub fn requested_by(&self) -> UserId {
        self.requested_by
    }
    pub fn metadata(&self) -> &Value {
        &self.metadata
    }
    pub fn added_at(&self) -> DateTime<Utc> {
        self.added_at
    }

    /// Copia de la canción para volver a reproducirla desde el principio
    pub fn restarted(&self) -> Self {
        Self {
            added_at: Utc::now(),
            ..self.clone()
        }
    }
}

impl std::fmt::Display for Song {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "**{}** ({})", self.title, self.url)
    }
}
