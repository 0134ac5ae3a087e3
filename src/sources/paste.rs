//! Cliente para servicios de paste compatibles con hastebin.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{PlayerError, Result};

/// Servicio externo donde se publican colas abandonadas y se leen playlists.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PasteService: Send + Sync {
    /// Publica `text` y devuelve la URL del documento
    async fn publish(&self, text: &str) -> Result<String>;

    /// Descarga el contenido en bruto de un documento publicado
    async fn fetch(&self, url: &str) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct DocumentCreated {
    key: String,
}

/// `POST {base}/documents` para publicar, `GET /raw/<key>` para leer.
#[derive(Debug, Clone)]
pub struct HasteClient {
    http: reqwest::Client,
    base_url: Url,
}

impl HasteClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| PlayerError::Publish(format!("URL de paste inválida: {}", e)))?;

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("open-music/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PlayerError::Publish(e.to_string()))?;

        Ok(Self { http, base_url })
    }

    fn documents_url(&self) -> String {
        format!("{}/documents", self.base_url.as_str().trim_end_matches('/'))
    }
}

/// Convierte `https://host/<key>` en `https://host/raw/<key>`.
pub fn raw_url(url: &str) -> Result<String> {
    let parsed =
        Url::parse(url).map_err(|e| PlayerError::Resolution(format!("URL inválida: {}", e)))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| PlayerError::Resolution(format!("URL sin host: {}", url)))?;

    let authority = match parsed.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };

    Ok(format!("{}://{}/raw{}", parsed.scheme(), authority, parsed.path()))
}

#[async_trait]
impl PasteService for HasteClient {
    async fn publish(&self, text: &str) -> Result<String> {
        debug!("📤 Publicando {} bytes en {}", text.len(), self.base_url);

        let response = self
            .http
            .post(self.documents_url())
            .body(text.to_owned())
            .send()
            .await
            .map_err(|e| PlayerError::Publish(e.to_string()))?;

        if !response.status().is_success() {
            warn!("El servicio de paste respondió {}", response.status());
            return Err(PlayerError::Publish(format!("HTTP {}", response.status())));
        }

        let created: DocumentCreated = response
            .json()
            .await
            .map_err(|e| PlayerError::Publish(e.to_string()))?;

        let link = format!("{}/{}", self.base_url.as_str().trim_end_matches('/'), created.key);
        info!("📄 Cola publicada en {}", link);
        Ok(link)
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        let raw = raw_url(url)?;
        debug!("📥 Descargando bin {}", raw);

        let response = self.http.get(&raw).send().await.map_err(|e| {
            if e.is_timeout() {
                PlayerError::Resolution("Tiempo agotado al descargar el bin".to_string())
            } else {
                PlayerError::Resolution(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            return Err(PlayerError::Resolution(format!(
                "No se pudo descargar el bin: HTTP {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| PlayerError::Resolution(e.to_string()))?;

        if body.trim().is_empty() || body.contains(r#""message":"Document not found."#) {
            return Err(PlayerError::Resolution("Documento no encontrado".to_string()));
        }

        Ok(body)
    }
}
