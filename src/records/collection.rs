//! In-memory transaction collection.
//!
//! Transactions are kept in insertion order with a unique hash index and
//! secondary indices on address, bundle and receivedAt.

use crate::error::{Result, SyncError};
use crate::records::index::{RecordIndex, Slot};
use crate::records::query::{Field, Query, Sort};
use crate::records::TransactionStore;
use crate::types::{Transaction, TxHash};
use parking_lot::RwLock;
use std::collections::BTreeMap;

#[derive(Default)]
struct Inner {
    /// slot -> transaction, iterated in insertion order.
    records: BTreeMap<Slot, Transaction>,
    index: RecordIndex,
    /// Next slot to assign.
    next_slot: Slot,
}

/// Per-source transaction collection.
#[derive(Default)]
pub struct Collection {
    name: String,
    inner: RwLock<Inner>,
}

impl Collection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: RwLock::new(Inner::default()),
        }
    }

    fn insert_locked(inner: &mut Inner, tx: Transaction) -> Result<()> {
        if inner.index.contains(tx.hash.as_str()) {
            return Err(SyncError::StoreQuery(format!(
                "duplicate key for unique index 'hash': {}",
                tx.hash
            )));
        }

        let slot = inner.next_slot;
        inner.next_slot += 1;
        inner.index.add(slot, &tx);
        inner.records.insert(slot, tx);
        Ok(())
    }

    /// Slots matching `query`, in insertion order.
    fn matching_slots(inner: &Inner, query: &Query) -> Vec<Slot> {
        let indexed = [Field::Hash, Field::Address, Field::Bundle]
            .into_iter()
            .find_map(|field| {
                query
                    .equality_on(field)
                    .and_then(|value| inner.index.candidates(field, value))
            })
            .or_else(|| {
                query
                    .received_range()
                    .map(|(from, to)| inner.index.received_between(from, to))
            });

        match indexed {
            Some(candidates) => candidates
                .into_iter()
                .filter(|slot| {
                    inner
                        .records
                        .get(slot)
                        .map_or(false, |tx| query.matches(tx))
                })
                .collect(),
            None => inner
                .records
                .iter()
                .filter(|(_, tx)| query.matches(tx))
                .map(|(slot, _)| *slot)
                .collect(),
        }
    }
}

impl TransactionStore for Collection {
    fn insert(&self, tx: Transaction) -> Result<()> {
        let mut inner = self.inner.write();
        Self::insert_locked(&mut inner, tx)
    }

    fn insert_many(&self, txs: Vec<Transaction>) -> Result<usize> {
        let mut inner = self.inner.write();
        let mut inserted = 0;
        for tx in txs {
            let hash = tx.hash.clone();
            match Self::insert_locked(&mut inner, tx) {
                Ok(()) => inserted += 1,
                Err(_) => {
                    tracing::debug!(collection = %self.name, %hash, "skipping duplicate transaction");
                }
            }
        }
        Ok(inserted)
    }

    fn get(&self, hash: &TxHash) -> Result<Option<Transaction>> {
        let inner = self.inner.read();
        Ok(inner
            .index
            .get_slot(hash.as_str())
            .and_then(|slot| inner.records.get(&slot))
            .cloned())
    }

    fn update(&self, tx: Transaction) -> Result<()> {
        let mut inner = self.inner.write();
        let Some(slot) = inner.index.get_slot(tx.hash.as_str()) else {
            return Err(SyncError::RecordNotFound(tx.hash));
        };

        let Some(old) = inner.records.insert(slot, tx.clone()) else {
            return Err(SyncError::StoreQuery(format!(
                "index points at empty slot {} for {}",
                slot, tx.hash
            )));
        };
        inner.index.reindex(slot, &old, &tx);
        Ok(())
    }

    fn find(&self, query: &Query, sort: Option<&Sort>) -> Result<Vec<Transaction>> {
        let inner = self.inner.read();
        let mut found: Vec<Transaction> = Self::matching_slots(&inner, query)
            .into_iter()
            .filter_map(|slot| inner.records.get(&slot).cloned())
            .collect();
        drop(inner);

        if let Some(sort) = sort {
            sort.apply(&mut found);
        }
        Ok(found)
    }

    fn remove(&self, query: &Query, limit: Option<usize>) -> Result<usize> {
        let mut inner = self.inner.write();
        let mut slots = Self::matching_slots(&inner, query);
        if let Some(limit) = limit.filter(|l| *l > 0) {
            slots.truncate(limit);
        }

        let mut removed = 0;
        for slot in slots {
            if let Some(tx) = inner.records.remove(&slot) {
                inner.index.remove(slot, &tx);
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn len(&self) -> usize {
        self.inner.read().records.len()
    }
}
