use std::path::PathBuf;

use crate::generation::{ClipSlots, Generation};

/// Placeholder row shown when nothing has been generated yet.
pub const EMPTY_HISTORY_ROW: (&str, &str) = ("-1", "No generated item available");

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub id: u32,
    pub description: String,
    pub files: Vec<PathBuf>,
}

/// Append-only record of this run's generations.
#[derive(Debug, Default)]
pub struct History {
    entries: Vec<HistoryEntry>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, generation: &Generation) {
        self.entries.push(HistoryEntry {
            id: generation.id,
            description: generation.description.clone(),
            files: generation.files.clone(),
        });
    }

    /// `(id, description)` rows in generation order.
    pub fn list(&self) -> Vec<(String, String)> {
        if self.entries.is_empty() {
            return vec![(
                EMPTY_HISTORY_ROW.0.to_string(),
                EMPTY_HISTORY_ROW.1.to_string(),
            )];
        }
        self.entries
            .iter()
            .map(|e| (e.id.to_string(), e.description.clone()))
            .collect()
    }

    pub fn get(&self, id: u32) -> Option<&HistoryEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Clip paths recorded for `id`; all slots empty when the id is unknown.
    pub fn lookup(&self, id: u32) -> ClipSlots {
        let mut slots: ClipSlots = Default::default();
        if let Some(entry) = self.get(id) {
            for (slot, file) in slots.iter_mut().zip(&entry.files) {
                *slot = Some(file.clone());
            }
        }
        slots
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
