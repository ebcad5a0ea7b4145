//! Lookup of persisted rows by identity.

use std::collections::HashMap;

use crate::event::PersistedRow;

/// Identity → persisted row, built once per run from the store snapshot.
///
/// When several rows share an identity the first one in sheet order is kept;
/// the others are counted so the caller can report them.
#[derive(Debug, Default)]
pub struct IdentityIndex {
    rows: HashMap<String, PersistedRow>,
    duplicates: Vec<String>,
}

impl IdentityIndex {
    pub fn build(rows: impl IntoIterator<Item = PersistedRow>) -> Self {
        let mut index = IdentityIndex::default();

        for row in rows {
            if row.identity.is_empty() {
                continue;
            }
            if index.rows.contains_key(&row.identity) {
                index.duplicates.push(row.identity.clone());
                continue;
            }
            index.rows.insert(row.identity.clone(), row);
        }

        index
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.rows.contains_key(identity)
    }

    pub fn get(&self, identity: &str) -> Option<&PersistedRow> {
        self.rows.get(identity)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Identities that appeared on more than one row (one entry per extra row).
    pub fn duplicates(&self) -> &[String] {
        &self.duplicates
    }
}
