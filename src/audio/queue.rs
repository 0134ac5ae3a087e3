use rand::seq::SliceRandom;
use std::{collections::VecDeque, time::Duration};
use tracing::{debug, info};

use crate::audio::song::Song;
use crate::error::QueueError;

/// Cola de canciones de un reproductor.
///
/// FIFO salvo por `shuffle` y por el modo loop de cola (que reinserta al
/// final, nunca al principio). Las posiciones públicas son 1-based.
#[derive(Debug, Default, Clone)]
pub struct SongQueue {
    items: VecDeque<Song>,
}

impl SongQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Agrega una canción al final de la cola
    pub fn enqueue(&mut self, song: Song) {
        debug!("➕ Agregado a la cola: {}", song.title());
        self.items.push_back(song);
    }

    /// Agrega una canción al principio (para repetir la actual)
    pub fn enqueue_front(&mut self, song: Song) {
        debug!("⏪ Agregado al principio de la cola: {}", song.title());
        self.items.push_front(song);
    }

    /// Obtiene la siguiente canción (FIFO - First In, First Out)
    pub fn dequeue(&mut self) -> Result<Song, QueueError> {
        self.items.pop_front().ok_or(QueueError::Empty)
    }

    /// Consulta la canción en la posición `position` (1-based)
    pub fn peek_at(&self, position: usize) -> Result<&Song, QueueError> {
        let index = self.index_of(position)?;
        self.items.get(index).ok_or(QueueError::IndexOutOfRange {
            position,
            len: self.items.len(),
        })
    }

    /// Elimina la canción en la posición `position` (1-based)
    pub fn remove_at(&mut self, position: usize) -> Result<Song, QueueError> {
        let index = self.index_of(position)?;
        let len = self.items.len();
        let removed = self
            .items
            .remove(index)
            .ok_or(QueueError::IndexOutOfRange { position, len })?;
        debug!("❌ Canción eliminada en posición {}: {}", position, removed.title());
        Ok(removed)
    }

    /// Mezcla la cola
    pub fn shuffle(&mut self) {
        let mut rng = rand::thread_rng();
        self.items.make_contiguous().shuffle(&mut rng);
        info!("🔀 Cola mezclada ({} canciones)", self.items.len());
    }

    /// Copia de la cola en orden. Modificar la copia no afecta a la cola.
    pub fn to_list(&self) -> Vec<Song> {
        self.items.iter().cloned().collect()
    }

    /// Limpia la cola
    pub fn clear(&mut self) {
        self.items.clear();
        info!("🗑️ Cola limpiada");
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Song> {
        self.items.iter()
    }

    pub fn total_duration(&self) -> Duration {
        self.items.iter().map(Song::duration).sum()
    }

    // Funciones privadas

    fn index_of(&self, position: usize) -> Result<usize, QueueError> {
        if position == 0 || position > self.items.len() {
            return Err(QueueError::IndexOutOfRange {
                position,
                len: self.items.len(),
            });
        }
        Ok(position - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::song;
    use pretty_assertions::assert_eq;

    fn titles(queue: &SongQueue) -> Vec<String> {
        queue.iter().map(|s| s.title().to_string()).collect()
    }

    fn queue_of(names: &[&str]) -> SongQueue {
        let mut queue = SongQueue::new();
        for name in names {
            queue.enqueue(song(name));
        }
        queue
    }

    #[test]
    fn enqueue_and_dequeue_keep_fifo_order() {
        let mut queue = queue_of(&["a", "b", "c"]);

        assert_eq!(queue.dequeue().unwrap().title(), "a");
        queue.enqueue(song("d"));
        assert_eq!(queue.dequeue().unwrap().title(), "b");

        assert_eq!(titles(&queue), vec!["c", "d"]);
    }

    #[test]
    fn dequeue_on_empty_queue_fails() {
        let mut queue = SongQueue::new();
        assert_eq!(queue.dequeue(), Err(QueueError::Empty));
    }

    #[test]
    fn remove_at_removes_exactly_one_and_keeps_order() {
        let mut queue = queue_of(&["a", "b", "c", "d"]);

        let removed = queue.remove_at(2).unwrap();

        assert_eq!(removed.title(), "b");
        assert_eq!(queue.len(), 3);
        assert_eq!(titles(&queue), vec!["a", "c", "d"]);
    }

    #[test]
    fn remove_at_rejects_positions_outside_range() {
        let mut queue = queue_of(&["a", "b"]);

        assert_eq!(
            queue.remove_at(0),
            Err(QueueError::IndexOutOfRange { position: 0, len: 2 })
        );
        assert_eq!(
            queue.remove_at(3),
            Err(QueueError::IndexOutOfRange { position: 3, len: 2 })
        );
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn peek_at_shares_the_range_contract() {
        let queue = queue_of(&["a", "b"]);

        assert_eq!(queue.peek_at(2).unwrap().title(), "b");
        assert!(queue.peek_at(3).is_err());
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn to_list_is_a_detached_snapshot() {
        let queue = queue_of(&["a", "b"]);

        let mut snapshot = queue.to_list();
        snapshot.clear();

        assert_eq!(titles(&queue), vec!["a", "b"]);
    }

    #[test]
    fn shuffle_keeps_the_same_songs() {
        let names: Vec<String> = (0..30).map(|i| format!("song-{i}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let mut queue = queue_of(&refs);

        queue.shuffle();

        let mut after = titles(&queue);
        after.sort();
        let mut expected = names.clone();
        expected.sort();
        assert_eq!(after, expected);
    }

    #[test]
    fn enqueue_front_jumps_the_line() {
        let mut queue = queue_of(&["a", "b"]);
        queue.enqueue_front(song("z"));
        assert_eq!(titles(&queue), vec!["z", "a", "b"]);
    }
}
