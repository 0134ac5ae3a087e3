//! Textos que el bot envía al canal de texto vinculado.

use serenity::model::id::{ChannelId, RoleId};
use std::time::Duration;

use crate::audio::{
    player::LoopMode,
    song::Song,
    votes::GatedCommand,
};
use crate::error::PlayerError;

/// Canciones por página en el listado de la cola
pub const QUEUE_PAGE_SIZE: usize = 10;

pub fn now_playing(song: &Song) -> String {
    format!(
        "🎵 **Reproduciendo ahora** {} `[{}]` (pedido por <@{}>)",
        song,
        format_duration(song.duration()),
        song.requested_by()
    )
}

pub fn playback_failed(song: &Song, reason: &str) -> String {
    format!("⚠️ No se pudo reproducir **{}**: {}", song.title(), reason)
}

pub fn sink_failed() -> String {
    "❌ El reproductor de audio falló varias veces seguidas. Me desconecto; usa `/play` para volver a empezar."
        .to_string()
}

pub fn left_inactive() -> String {
    "👋 Me fui del canal de voz por inactividad.".to_string()
}

pub fn queue_saved_on_leave(link: &str, songs: usize) -> String {
    format!(
        "👋 Me fui del canal de voz por inactividad.\n💾 Guardé la cola ({} canciones) en {}\nUsa `/playbin {}` para retomarla.",
        songs, link, link
    )
}

pub fn queue_lost_on_leave() -> String {
    "👋 Me fui del canal de voz por inactividad.\n⚠️ No pude guardar la cola, se perdió.".to_string()
}

pub fn joined(voice: ChannelId, text: ChannelId) -> String {
    format!("🔊 **Conectado a** <#{}> y **vinculado a** <#{}>", voice, text)
}

pub fn left() -> String {
    "👋 Cola limpiada y desconectado del canal de voz".to_string()
}

pub fn enqueued(song: &Song, position: usize) -> String {
    format!(
        "📄 **En cola** {} `[{}]` en la posición {}",
        song,
        format_duration(song.duration()),
        position
    )
}

/// Resumen de un bin o una playlist encolados (`origin`: "del bin", "de la playlist")
pub fn playlist_enqueued(origin: &str, songs: &[Song], failed: usize) -> String {
    let total: Duration = songs.iter().map(Song::duration).sum();
    let mut text = format!(
        "✅ **Agregadas {} canciones {}** • Duración total: {}",
        songs.len(),
        origin,
        format_duration(total)
    );

    for song in songs.iter().take(QUEUE_PAGE_SIZE) {
        text.push_str(&format!("\n• {} `[{}]`", song.title(), format_duration(song.duration())));
    }
    if songs.len() > QUEUE_PAGE_SIZE {
        text.push_str(&format!("\n...y {} más", songs.len() - QUEUE_PAGE_SIZE));
    }
    if failed > 0 {
        text.push_str(&format!("\n⚠️ {} canciones no se pudieron cargar", failed));
    }

    text
}

pub fn now(song: &Song, paused: bool) -> String {
    let status = if paused { "⏸️ **En pausa**" } else { "🎵 **Reproduciendo**" };
    format!(
        "{} {} `[{}]` (pedido por <@{}>)",
        status,
        song,
        format_duration(song.duration()),
        song.requested_by()
    )
}

/// Listado paginado de la cola (`page` es 1-based)
pub fn queue_page(current: Option<&Song>, queue: &[Song], page: usize, loop_mode: LoopMode) -> String {
    let mut text = String::from("📋 **Cola de reproducción**\n");

    if let Some(current) = current {
        let status = match loop_mode {
            LoopMode::Single => "🔂",
            LoopMode::Queue => "🔁",
            LoopMode::Off => "▶️",
        };
        text.push_str(&format!("{} {}\n", status, current.title()));
    }

    if queue.is_empty() {
        text.push_str("😴 La cola está vacía");
        return text;
    }

    let pages = queue.len().div_ceil(QUEUE_PAGE_SIZE);
    let page = page.clamp(1, pages);
    let start = (page - 1) * QUEUE_PAGE_SIZE;

    for (i, song) in queue.iter().enumerate().skip(start).take(QUEUE_PAGE_SIZE) {
        text.push_str(&format!(
            "**{}**. {} `[{}]`\n",
            i + 1,
            song.title(),
            format_duration(song.duration())
        ));
    }

    let total: Duration = queue.iter().map(Song::duration).sum();
    text.push_str(&format!(
        "**Total:** {} canciones • **Duración:** {}",
        queue.len(),
        format_duration(total)
    ));
    if pages > 1 {
        text.push_str(&format!(" • Página {} de {}", page, pages));
    }

    text
}

pub fn queue_cleared() -> String {
    "🗑️ Cola limpiada".to_string()
}

pub fn queue_saved(link: &str) -> String {
    format!("💾 Cola guardada en {}", link)
}

pub fn vote_pending(command: GatedCommand, votes: usize, required: usize) -> String {
    format!("🗳️ Voto para **{}** registrado ({}/{})", command, votes, required)
}

pub fn already_voted(command: GatedCommand, votes: usize, required: usize) -> String {
    format!("🗳️ Ya votaste para **{}** ({}/{})", command, votes, required)
}

pub fn skipped() -> String {
    "⏭️ Canción saltada".to_string()
}

pub fn shuffled() -> String {
    "🔀 Cola mezclada".to_string()
}

pub fn removed(song: &Song) -> String {
    format!("❌ Eliminada de la cola: **{}**", song.title())
}

pub fn skipped_to(position: usize) -> String {
    format!("⏭️ Saltando a la canción {} de la cola", position)
}

pub fn started_over(song: &Song) -> String {
    format!("⏪ Empezando de nuevo: **{}**", song.title())
}

pub fn loop_state(mode: LoopMode) -> String {
    match mode {
        LoopMode::Off => "➡️ Repetición desactivada".to_string(),
        LoopMode::Single => "🔂 Repitiendo la canción actual".to_string(),
        LoopMode::Queue => "🔁 Repitiendo la cola".to_string(),
    }
}

pub fn notify_state(enabled: bool) -> String {
    if enabled {
        "🔔 Avisos de \"reproduciendo ahora\" activados".to_string()
    } else {
        "🔕 Avisos de \"reproduciendo ahora\" desactivados".to_string()
    }
}

pub fn volume_report(volume: f32) -> String {
    let percent = (volume * 100.0).round() as u8;
    format!("{} **Volumen actual: {}%** {}", volume_emoji(percent), percent, volume_bar(volume))
}

pub fn volume_set(volume: f32) -> String {
    let percent = (volume * 100.0).round() as u8;
    format!("{} Volumen ajustado a **{}%**", volume_emoji(percent), percent)
}

pub fn paused() -> String {
    "⏸️ Reproducción pausada".to_string()
}

pub fn resumed() -> String {
    "▶️ Reproducción reanudada".to_string()
}

pub fn not_paused() -> String {
    "▶️ La reproducción no estaba en pausa".to_string()
}

pub fn already_paused() -> String {
    "⏸️ La reproducción ya estaba en pausa".to_string()
}

pub fn stopped() -> String {
    "⏹️ Reproducción detenida y cola limpiada".to_string()
}

pub fn dj_role(role: Option<RoleId>) -> String {
    match role {
        Some(role) => format!("🎧 Rol DJ configurado: <@&{}>", role),
        None => "🎧 Rol DJ eliminado; se usará el rol llamado \"DJ\"".to_string(),
    }
}

pub fn error(err: &PlayerError) -> String {
    format!("❌ {}", err)
}

/// `m:ss`, o `h:mm:ss` a partir de una hora
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

fn volume_emoji(percent: u8) -> &'static str {
    match percent {
        0 => "🔈",
        1..=50 => "🔉",
        _ => "🔊",
    }
}

fn volume_bar(volume: f32) -> String {
    let segments = 20;
    let filled = ((volume.clamp(0.0, 1.0) * segments as f32) as usize).min(segments);
    format!("`[{}{}]`", "█".repeat(filled), "▒".repeat(segments - filled))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::song;

    #[test]
    fn durations_switch_to_hours_format() {
        assert_eq!(format_duration(Duration::from_secs(59)), "0:59");
        assert_eq!(format_duration(Duration::from_secs(185)), "3:05");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1:02:05");
    }

    #[test]
    fn queue_listing_is_paged_by_ten() {
        let songs: Vec<Song> = (1..=23).map(|i| song(&format!("s{i}"))).collect();

        let last = queue_page(None, &songs, 3, LoopMode::Off);

        assert!(last.contains("**21**. s21"));
        assert!(!last.contains("**20**."));
        assert!(last.contains("Página 3 de 3"));
        assert!(last.contains("23 canciones"));
        // 23 canciones de 3 minutos
        assert!(last.contains("1:09:00"));
    }

    #[test]
    fn playlist_summary_lists_ten_and_counts_the_rest() {
        let songs: Vec<Song> = (1..=12).map(|i| song(&format!("s{i}"))).collect();

        let text = playlist_enqueued("de la playlist", &songs, 2);

        assert!(text.contains("Agregadas 12 canciones de la playlist"));
        assert!(text.contains("...y 2 más"));
        assert!(text.contains("2 canciones no se pudieron cargar"));
    }

    #[test]
    fn out_of_range_page_falls_back_to_last() {
        let songs: Vec<Song> = (1..=12).map(|i| song(&format!("s{i}"))).collect();
        assert!(queue_page(None, &songs, 9, LoopMode::Queue).contains("Página 2 de 2"));
    }

    #[test]
    fn volume_bar_is_clamped() {
        assert_eq!(volume_bar(0.5).matches('█').count(), 10);
        assert_eq!(volume_bar(1.0).matches('▒').count(), 0);
    }
}
