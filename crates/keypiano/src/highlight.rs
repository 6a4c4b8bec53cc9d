//! Highlight state for recently triggered notes
//!
//! Every trigger schedules its own removal deadline. A note stays active
//! while at least one of its deadlines is pending, so retriggering inside the
//! window keeps it lit until the latest deadline passes. Firing a deadline
//! for a note that is already gone is a no-op.

use crate::notes::Note;
use std::time::{Duration, Instant};

/// How long a triggered note stays highlighted
pub const HIGHLIGHT_DURATION: Duration = Duration::from_millis(300);

/// Set of notes inside their highlight window
#[derive(Debug, Clone)]
pub struct ActiveNotes {
    window: Duration,
    /// Pending removals, one per trigger
    deadlines: Vec<(Note, Instant)>,
}

impl Default for ActiveNotes {
    fn default() -> Self {
        Self::new(HIGHLIGHT_DURATION)
    }
}

impl ActiveNotes {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadlines: Vec::new(),
        }
    }

    /// Mark a note active as of `now` and schedule its removal
    pub fn activate(&mut self, note: Note, now: Instant) {
        self.deadlines.push((note, now + self.window));
    }

    /// Check if a note is currently highlighted
    pub fn contains(&self, note: Note) -> bool {
        self.deadlines.iter().any(|(n, _)| *n == note)
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }

    /// Active notes in ascending pitch order, without duplicates
    pub fn notes(&self) -> Vec<Note> {
        let mut notes: Vec<Note> = self.deadlines.iter().map(|(n, _)| *n).collect();
        notes.sort_by_key(|n| n.semitone());
        notes.dedup();
        notes
    }

    /// Fire every deadline due at `now`
    ///
    /// Returns the notes that are no longer highlighted afterwards.
    pub fn expire(&mut self, now: Instant) -> Vec<Note> {
        let due: Vec<Note> = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| *deadline <= now)
            .map(|(note, _)| *note)
            .collect();
        if due.is_empty() {
            return Vec::new();
        }

        self.deadlines.retain(|(_, deadline)| *deadline > now);

        let mut expired: Vec<Note> = due.into_iter().filter(|n| !self.contains(*n)).collect();
        expired.sort_by_key(|n| n.semitone());
        expired.dedup();
        expired
    }

    /// Drop all highlights at once
    pub fn clear(&mut self) -> Vec<Note> {
        let notes = self.notes();
        self.deadlines.clear();
        notes
    }
}
