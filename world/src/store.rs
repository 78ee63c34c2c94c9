//! Seam to the durable string-keyed medium that holds session records.

use std::{cell::RefCell, collections::BTreeMap, fmt, rc::Rc};

/// Durable string-keyed storage owned by the world.
///
/// Writes are fire-and-forget: implementations handle their own I/O failures
/// and never report them back to game logic.
pub trait Store: fmt::Debug {
    /// Returns the value stored under `key`, if any.
    fn get(&self, key: &str) -> Option<String>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&mut self, key: &str, value: String);

    /// Removes every stored value.
    fn clear(&mut self);
}

/// In-memory [`Store`] whose clones share the same records.
///
/// Keeping a clone lets callers inspect or tamper with what the world wrote
/// after handing the store over.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    records: Rc<RefCell<BTreeMap<String, String>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    /// Reports whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }

    /// Copies out every stored record.
    #[must_use]
    pub fn records(&self) -> BTreeMap<String, String> {
        self.records.borrow().clone()
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.records.borrow().get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) {
        let _ = self.records.borrow_mut().insert(key.to_owned(), value);
    }

    fn clear(&mut self) {
        self.records.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_records() {
        let mut writer = MemoryStore::new();
        let reader = writer.clone();

        writer.set("player_position", "{}".to_owned());

        assert_eq!(reader.get("player_position").as_deref(), Some("{}"));
        assert_eq!(reader.len(), 1);

        writer.clear();
        assert!(reader.is_empty());
    }
}
