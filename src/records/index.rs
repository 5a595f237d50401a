//! Secondary indices for efficient lookups.

use crate::records::query::Field;
use crate::types::{Transaction, TxHash};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Insertion slot of a transaction inside its collection.
pub type Slot = u64;

/// Index mapping hashes and secondary attributes to slots.
///
/// Not synchronized on its own; the owning collection guards it.
#[derive(Default)]
pub struct RecordIndex {
    /// Unique index: hash -> slot.
    by_hash: HashMap<TxHash, Slot>,

    /// address -> slots.
    by_address: HashMap<String, BTreeSet<Slot>>,

    /// bundle -> slots.
    by_bundle: HashMap<String, BTreeSet<Slot>>,

    /// receivedAt -> slots.
    by_received_at: BTreeMap<i64, BTreeSet<Slot>>,
}

impl RecordIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry to the index.
    pub fn add(&mut self, slot: Slot, tx: &Transaction) {
        self.by_hash.insert(tx.hash.clone(), slot);

        if let Some(address) = &tx.address {
            self.by_address.entry(address.clone()).or_default().insert(slot);
        }

        if let Some(bundle) = &tx.bundle {
            self.by_bundle.entry(bundle.clone()).or_default().insert(slot);
        }

        if let Some(at) = tx.received_at {
            self.by_received_at.entry(at).or_default().insert(slot);
        }
    }

    /// Drop every entry pointing at `slot`.
    pub fn remove(&mut self, slot: Slot, tx: &Transaction) {
        self.by_hash.remove(&tx.hash);

        if let Some(address) = &tx.address {
            remove_from(&mut self.by_address, address, slot);
        }

        if let Some(bundle) = &tx.bundle {
            remove_from(&mut self.by_bundle, bundle, slot);
        }

        if let Some(at) = tx.received_at {
            if let Some(slots) = self.by_received_at.get_mut(&at) {
                slots.remove(&slot);
                if slots.is_empty() {
                    self.by_received_at.remove(&at);
                }
            }
        }
    }

    /// Re-index after an in-place update; only secondary attributes can move.
    pub fn reindex(&mut self, slot: Slot, old: &Transaction, new: &Transaction) {
        if old.address != new.address || old.bundle != new.bundle || old.received_at != new.received_at {
            self.remove(slot, old);
            self.add(slot, new);
        }
    }

    /// Get slot for a hash.
    pub fn get_slot(&self, hash: &str) -> Option<Slot> {
        self.by_hash.get(hash).copied()
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.by_hash.contains_key(hash)
    }

    /// Candidate slots for a string equality on an indexed field.
    ///
    /// `None` means the field is not indexed and the caller must scan.
    pub fn candidates(&self, field: Field, value: &str) -> Option<BTreeSet<Slot>> {
        match field {
            Field::Hash => Some(self.get_slot(value).into_iter().collect()),
            Field::Address => Some(self.by_address.get(value).cloned().unwrap_or_default()),
            Field::Bundle => Some(self.by_bundle.get(value).cloned().unwrap_or_default()),
            _ => None,
        }
    }

    /// Slots whose receivedAt lies within `[from, to]`.
    pub fn received_between(&self, from: i64, to: i64) -> BTreeSet<Slot> {
        if from > to {
            return BTreeSet::new();
        }
        self.by_received_at
            .range(from..=to)
            .flat_map(|(_, slots)| slots.iter().copied())
            .collect()
    }

    /// Get count of indexed transactions.
    pub fn count(&self) -> usize {
        self.by_hash.len()
    }
}

fn remove_from(map: &mut HashMap<String, BTreeSet<Slot>>, key: &str, slot: Slot) {
    if let Some(slots) = map.get_mut(key) {
        slots.remove(&slot);
        if slots.is_empty() {
            map.remove(key);
        }
    }
}
