//! # Open Music
//!
//! Planificador de reproducción por guild para el bot de música: cola,
//! votaciones, driver de reproducción, registro de reproductores y monitor de
//! inactividad, más los adaptadores de Discord que los conectan.

pub mod audio;
pub mod bot;
pub mod config;
pub mod error;
pub mod sources;
pub mod storage;
pub mod ui;

#[cfg(test)]
mod testing;

pub use audio::{
    inactivity::{InactivityMonitor, MembershipChange},
    player::{LoopMode, Player, PlayerOptions, PlayerStatus},
    registry::PlayerRegistry,
    song::Song,
};
pub use error::{PlayerError, QueueError};
