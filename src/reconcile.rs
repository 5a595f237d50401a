//! Applying incoming transactions and status changes to a source's store.

use crate::error::Result;
use crate::sources::SourceContext;
use crate::subscriptions::{EventName, NotificationBus};
use crate::types::{StatusUpdate, Transaction, TxUpdate, UpdateKind};

/// What an update did to the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Inserted,
    Updated,
    /// The update referenced a hash the store does not hold.
    NotFound,
    /// The store refused the mutation (duplicate insert, store failure).
    Rejected,
}

/// Decides how an update mutates a source's store, then notifies the bus.
pub struct Reconciler<'a> {
    source: &'a SourceContext,
    bus: &'a NotificationBus,
}

impl<'a> Reconciler<'a> {
    pub fn new(source: &'a SourceContext, bus: &'a NotificationBus) -> Self {
        Self { source, bus }
    }

    /// Apply one live update and emit the matching event.
    ///
    /// Subscribers receive the update as delivered; the store holds its own copy.
    pub fn apply_update(&self, update: TxUpdate) -> Outcome {
        let outcome = match &update {
            TxUpdate::NewTransaction(tx) => self.insert(tx),
            TxUpdate::Confirmed(status)
            | TxUpdate::Milestone(status)
            | TxUpdate::Reattach(status) => self.update_status(status, update.kind()),
        };

        self.bus.emit(EventName::for_kind(update.kind()), &update);
        outcome
    }

    /// Insert a bulk batch without notifying. Returns the number inserted.
    ///
    /// Hashes already stored are skipped; a store failure rejects the batch.
    pub fn apply_history(&self, batch: Vec<Transaction>) -> Result<usize> {
        let offered = batch.len();
        let inserted = self.source.store().insert_many(batch)?;
        tracing::debug!(host = %self.source.host(), offered, inserted, "applied history batch");
        Ok(inserted)
    }

    fn insert(&self, tx: &Transaction) -> Outcome {
        match self.source.store().insert(tx.clone()) {
            Ok(()) => Outcome::Inserted,
            Err(e) => {
                tracing::warn!(host = %self.source.host(), hash = %tx.hash, error = %e, "insert rejected");
                Outcome::Rejected
            }
        }
    }

    fn update_status(&self, status: &StatusUpdate, kind: UpdateKind) -> Outcome {
        let store = self.source.store();

        let existing = match store.get(&status.hash) {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(host = %self.source.host(), hash = %status.hash, %kind, error = %e, "lookup failed");
                return Outcome::Rejected;
            }
        };

        let Some(mut tx) = existing else {
            tracing::warn!(
                host = %self.source.host(),
                hash = %status.hash,
                update_type = %kind,
                "{} not found in local store",
                if kind == UpdateKind::Milestone { "Milestone" } else { "TX" }
            );
            return Outcome::NotFound;
        };

        match kind {
            UpdateKind::Confirmed => {
                tx.ctime = status.ctime;
                tx.confirmed = true;
            }
            UpdateKind::Milestone => {
                tx.ctime = status.ctime;
                tx.confirmed = true;
                tx.milestone = status.milestone.clone();
            }
            UpdateKind::Reattach => {
                tx.reattached = true;
            }
            UpdateKind::NewTransaction => return Outcome::Rejected,
        }

        match store.update(tx) {
            Ok(()) => Outcome::Updated,
            Err(e) => {
                tracing::warn!(host = %self.source.host(), hash = %status.hash, %kind, error = %e, "update rejected");
                Outcome::Rejected
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{InstanceOptions, MirrorConfig, SourceEndpoint};
    use crate::records::{Collection, Query};
    use crate::types::{Milestone, TxHash};
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn source() -> SourceContext {
        let endpoint =
            SourceEndpoint::resolve(&InstanceOptions::host("node.example"), &MirrorConfig::default())
                .unwrap();
        SourceContext::new(endpoint, Arc::new(Collection::new("node.example")))
    }

    fn stored(source: &SourceContext, hash: &str) -> Option<Transaction> {
        source.store().get(&TxHash::from(hash)).unwrap()
    }

    #[test]
    fn test_duplicate_new_transaction_keeps_one_record() {
        let source = source();
        let bus = NotificationBus::new();
        let reconciler = Reconciler::new(&source, &bus);

        assert_eq!(
            reconciler.apply_update(TxUpdate::NewTransaction(Transaction::new("A"))),
            Outcome::Inserted
        );
        assert_eq!(
            reconciler.apply_update(TxUpdate::NewTransaction(Transaction::new("A"))),
            Outcome::Rejected
        );
        assert_eq!(source.store().find(&Query::all(), None).unwrap().len(), 1);
    }

    #[test]
    fn test_confirm_before_insert_is_tolerated() {
        let source = source();
        let bus = NotificationBus::new();
        let reconciler = Reconciler::new(&source, &bus);

        let outcome =
            reconciler.apply_update(TxUpdate::Confirmed(StatusUpdate::new("A").with_ctime(5)));
        assert_eq!(outcome, Outcome::NotFound);
        assert!(source.store().is_empty());

        reconciler.apply_update(TxUpdate::NewTransaction(Transaction::new("A")));
        reconciler.apply_update(TxUpdate::Confirmed(StatusUpdate::new("A").with_ctime(5)));
        let tx = stored(&source, "A").unwrap();
        assert!(tx.confirmed);
        assert_eq!(tx.ctime, Some(5));
    }

    #[test]
    fn test_milestone_implies_confirmed() {
        let source = source();
        let bus = NotificationBus::new();
        let reconciler = Reconciler::new(&source, &bus);

        reconciler.apply_update(TxUpdate::NewTransaction(Transaction::new("B")));
        reconciler.apply_update(TxUpdate::Confirmed(StatusUpdate::new("B").with_ctime(100)));
        reconciler.apply_update(TxUpdate::Milestone(
            StatusUpdate::new("B")
                .with_ctime(200)
                .with_milestone(Milestone::Index(7)),
        ));

        let tx = stored(&source, "B").unwrap();
        assert!(tx.confirmed);
        assert_eq!(tx.ctime, Some(200));
        assert_eq!(tx.milestone, Some(Milestone::Index(7)));
        assert!(!tx.reattached);
    }

    #[test]
    fn test_reattach_leaves_confirmation_untouched() {
        let source = source();
        let bus = NotificationBus::new();
        let reconciler = Reconciler::new(&source, &bus);

        reconciler.apply_update(TxUpdate::NewTransaction(Transaction::new("C")));
        reconciler.apply_update(TxUpdate::Reattach(StatusUpdate::new("C").with_ctime(9)));

        let tx = stored(&source, "C").unwrap();
        assert!(tx.reattached);
        assert!(!tx.confirmed);
        assert_eq!(tx.ctime, None);
    }

    #[test]
    fn test_every_kind_emits_even_when_not_found() {
        let source = source();
        let bus = NotificationBus::new();
        let instance = bus.register();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for name in EventName::ALL {
            let seen = Arc::clone(&seen);
            instance.on(
                name,
                Arc::new(move |u: &TxUpdate| seen.lock().push((name, u.hash().clone()))),
            );
        }

        let reconciler = Reconciler::new(&source, &bus);
        reconciler.apply_update(TxUpdate::Reattach(StatusUpdate::new("X")));
        reconciler.apply_update(TxUpdate::NewTransaction(Transaction::new("X")));
        reconciler.apply_update(TxUpdate::Milestone(StatusUpdate::new("X")));

        let seen = seen.lock();
        let names: Vec<_> = seen.iter().map(|(n, _)| *n).collect();
        assert_eq!(
            names,
            vec![EventName::TxReattaches, EventName::TxNew, EventName::Milestones]
        );
    }

    #[test]
    fn test_history_batch_does_not_emit() {
        let source = source();
        let bus = NotificationBus::new();
        let instance = bus.register();
        let hits = Arc::new(Mutex::new(0));
        let hits2 = Arc::clone(&hits);
        instance.on(EventName::TxNew, Arc::new(move |_: &TxUpdate| *hits2.lock() += 1));

        let inserted = Reconciler::new(&source, &bus)
            .apply_history(vec![Transaction::new("A"), Transaction::new("B")])
            .unwrap();
        assert_eq!(inserted, 2);
        assert_eq!(*hits.lock(), 0);
    }
}
