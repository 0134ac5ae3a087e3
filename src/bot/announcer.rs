use async_trait::async_trait;
use serenity::{builder::CreateMessage, http::Http, model::id::ChannelId};
use std::sync::Arc;
use tracing::error;

use crate::audio::sink::Announcer;

/// Envía los avisos del reproductor por la API HTTP de Discord.
pub struct HttpAnnouncer {
    http: Arc<Http>,
}

impl HttpAnnouncer {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Announcer for HttpAnnouncer {
    async fn announce(&self, channel_id: ChannelId, message: String) {
        if let Err(e) = channel_id
            .send_message(&self.http, CreateMessage::new().content(message))
            .await
        {
            error!("Error al enviar mensaje al canal {}: {:?}", channel_id, e);
        }
    }
}
