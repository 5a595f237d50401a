//! Local transaction store.
//!
//! Each source keeps its transactions in a collection unique on `hash`
//! and queryable by secondary attributes.

mod collection;
mod index;
mod query;

pub use collection::Collection;
pub use index::{RecordIndex, Slot};
pub use query::{Condition, Field, FieldValue, Op, Query, Sort};

use crate::error::Result;
use crate::types::{Transaction, TxHash};

/// Key-addressable transaction collection.
///
/// Implementations own copies of what they are given; callers never observe
/// later store mutations through values they passed in or got back.
pub trait TransactionStore: Send + Sync {
    /// Insert a new transaction. Fails if the hash is already present.
    fn insert(&self, tx: Transaction) -> Result<()>;

    /// Insert a batch, skipping hashes already present. Returns the number inserted.
    fn insert_many(&self, txs: Vec<Transaction>) -> Result<usize>;

    fn get(&self, hash: &TxHash) -> Result<Option<Transaction>>;

    /// Replace the stored transaction with the same hash.
    /// Fails with `RecordNotFound` if there is none.
    fn update(&self, tx: Transaction) -> Result<()>;

    /// All matches in insertion order, then sorted if `sort` is given.
    fn find(&self, query: &Query, sort: Option<&Sort>) -> Result<Vec<Transaction>>;

    /// Remove up to `limit` matches (all if `None`). Returns the number removed.
    fn remove(&self, query: &Query, limit: Option<usize>) -> Result<usize>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
