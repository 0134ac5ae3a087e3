//! # Audio Module
//!
//! Núcleo de reproducción por guild.
//!
//! ## Architecture
//!
//! ### [`registry`] - PlayerRegistry
//! - Un [`player::Player`] por guild, creado y eliminado de forma atómica
//!
//! ### [`player`] - Player
//! - Máquina de estados (sin conexión, conectado sin canción, reproduciendo,
//!   en pausa, destruido) y el driver en segundo plano que avanza la cola
//! - Modos de repetición, volumen y la votación de comandos
//!
//! ### [`queue`] / [`votes`]
//! - Cola FIFO con posiciones 1-based y el registro de votos por comando
//!
//! ### [`inactivity`] - InactivityMonitor
//! - Pausa cuando el canal se vacía, reanuda si vuelve alguien y, si no,
//!   guarda la cola en un paste y destruye el reproductor
//!
//! ### [`sink`]
//! - Traits que separan el núcleo del transporte de voz y del chat

pub mod inactivity;
pub mod player;
pub mod queue;
pub mod registry;
pub mod sink;
pub mod song;
pub mod votes;
