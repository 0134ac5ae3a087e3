//! # Vote gate
//!
//! Disruptive commands (skip, shuffle, remove) either run immediately or
//! collect votes from the listeners in the voice channel.
//!
//! ## Bypass
//!
//! The command runs at once, without recording a vote, when the caller:
//! - requested the song that is currently playing,
//! - holds a management or DJ privilege,
//! - shares the channel with fewer than 3 listeners.
//!
//! ## Threshold
//!
//! | Listeners (`N`) | Votes required |
//! |-----------------|----------------|
//! | `N < 3`         | bypass         |
//! | `3 <= N < 5`    | `N - 1`        |
//! | `N >= 5`        | `3`            |
//!
//! A vote set is cleared in the same critical section in which it reaches the
//! threshold, so a vote cast concurrently always lands either before the
//! clear (and counts) or after it (and opens a new round).

use serenity::model::id::UserId;
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::debug;

/// Comandos sujetos a votación
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatedCommand {
    Skip,
    Shuffle,
    Remove,
}

impl GatedCommand {
    pub fn name(&self) -> &'static str {
        match self {
            GatedCommand::Skip => "skip",
            GatedCommand::Shuffle => "shuffle",
            GatedCommand::Remove => "remove",
        }
    }
}

impl fmt::Display for GatedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Quién vota y con qué privilegios (resueltos por quien llama).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Voter {
    pub id: UserId,
    /// Gestionar servidor o rol DJ
    pub privileged: bool,
}

impl Voter {
    pub fn new(id: UserId, privileged: bool) -> Self {
        Self { id, privileged }
    }
}

/// Resultado de pasar un comando por la votación.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteOutcome<R> {
    /// La acción se ejecutó (bypass o umbral alcanzado)
    Executed(R),
    /// Voto registrado, aún faltan votos
    Pending { votes: usize, required: usize },
    /// El usuario ya había votado; no cambia nada
    AlreadyVoted { votes: usize, required: usize },
}

/// Resultado interno de registrar un voto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ballot {
    Passed,
    Pending { votes: usize },
    AlreadyVoted { votes: usize },
}

/// Votos necesarios según los oyentes del canal; `None` si no hace falta votar.
pub fn required_votes(listeners: usize) -> Option<usize> {
    match listeners {
        0..=2 => None,
        3..=4 => Some(listeners - 1),
        _ => Some(3),
    }
}

#[derive(Debug, Default)]
pub struct VoteLedger {
    votes: HashMap<GatedCommand, HashSet<UserId>>,
}

impl VoteLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registra el voto de `voter`; si se alcanza `required` limpia el set.
    pub fn cast(&mut self, command: GatedCommand, voter: UserId, required: usize) -> Ballot {
        let voters = self.votes.entry(command).or_default();

        if !voters.insert(voter) {
            return Ballot::AlreadyVoted {
                votes: voters.len(),
            };
        }

        let votes = voters.len();
        debug!("🗳️ Voto para {}: {}/{}", command, votes, required);

        if votes >= required {
            voters.clear();
            Ballot::Passed
        } else {
            Ballot::Pending { votes }
        }
    }

    pub fn clear(&mut self, command: GatedCommand) {
        if let Some(voters) = self.votes.get_mut(&command) {
            voters.clear();
        }
    }

    pub fn votes(&self, command: GatedCommand) -> usize {
        self.votes.get(&command).map_or(0, HashSet::len)
    }

    pub fn has_voted(&self, command: GatedCommand, voter: UserId) -> bool {
        self.votes
            .get(&command)
            .is_some_and(|voters| voters.contains(&voter))
    }
}
