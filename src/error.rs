//! # Errors
//!
//! Error taxonomy for the playback core. Every variant is scoped to a single
//! guild's player: nothing here is fatal to the process.

use std::time::Duration;
use thiserror::Error;

/// Errores locales de la cola.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("La cola está vacía")]
    Empty,

    #[error("Posición {position} fuera de rango (la cola tiene {len} canciones)")]
    IndexOutOfRange { position: usize, len: usize },
}

/// Errores reportados al invocador de un comando.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlayerError {
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("Error al resolver la canción: {0}")]
    Resolution(String),

    #[error("Tiempo agotado al buscar la canción ({}s)", .0.as_secs())]
    ResolutionTimeout(Duration),

    #[error("Error al conectar al canal de voz: {0}")]
    Connection(String),

    #[error("No se pudo guardar la cola: {0}")]
    Publish(String),

    #[error("No se pudo guardar la configuración del servidor: {0}")]
    Storage(String),

    #[error("No tienes permisos para usar este comando")]
    NotPrivileged,

    #[error("No estás en ningún canal de voz")]
    NotInVoice,

    #[error("Ya estoy en otro canal de voz; usa `/summon` para moverme")]
    InAnotherChannel,

    #[error("Indica qué canción quieres reproducir")]
    EmptyQuery,

    #[error("Este servidor no tiene un reproductor")]
    NoPlayer,

    #[error("No estoy conectado a ningún canal de voz")]
    NotConnected,

    #[error("No se está reproduciendo nada")]
    NothingPlaying,

    #[error("El volumen debe estar entre 0 y 100 (recibido: {0})")]
    InvalidVolume(i32),

    #[error("Error del reproductor de audio: {0}")]
    Sink(String),

    #[error("El reproductor ya fue destruido")]
    Destroyed,
}

pub type Result<T> = std::result::Result<T, PlayerError>;
