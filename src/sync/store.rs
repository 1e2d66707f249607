//! Shared in-memory view of every live query's latest snapshot.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::models::{QueryDescriptor, Record, Snapshot};

#[derive(Debug)]
struct Slot<R> {
    holders: usize,
    snapshot: Option<Arc<Snapshot<R>>>,
}

/// Result of offering a snapshot to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Replace {
    Applied,
    /// Older than the snapshot already held.
    Stale,
    /// The subscription was cancelled or its slot released.
    Detached,
}

/// Latest snapshot per query descriptor, shared by every subscription that
/// feeds it.
///
/// Updates replace the whole result set of a descriptor. A snapshot is only
/// accepted while its subscription's token is live, checked under the same
/// lock that [`RecordStore::detach`] takes.
#[derive(Debug)]
pub struct RecordStore<R> {
    slots: RwLock<HashMap<QueryDescriptor, Slot<R>>>,
}

impl<R: Record> Default for RecordStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Record> RecordStore<R> {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
        }
    }

    pub(crate) fn attach(&self, descriptor: &QueryDescriptor) {
        let mut slots = self.slots.write();
        slots
            .entry(descriptor.clone())
            .or_insert(Slot {
                holders: 0,
                snapshot: None,
            })
            .holders += 1;
    }

    pub(crate) fn detach(&self, descriptor: &QueryDescriptor) {
        let mut slots = self.slots.write();
        if let Some(slot) = slots.get_mut(descriptor) {
            slot.holders = slot.holders.saturating_sub(1);
            if slot.holders == 0 {
                slots.remove(descriptor);
            }
        }
    }

    pub(crate) fn replace(
        &self,
        descriptor: &QueryDescriptor,
        snapshot: Arc<Snapshot<R>>,
        token: &CancellationToken,
    ) -> Replace {
        let mut slots = self.slots.write();
        if token.is_cancelled() {
            return Replace::Detached;
        }
        let Some(slot) = slots.get_mut(descriptor) else {
            return Replace::Detached;
        };
        if let Some(current) = &slot.snapshot {
            if current.revision > snapshot.revision {
                return Replace::Stale;
            }
        }
        slot.snapshot = Some(snapshot);
        Replace::Applied
    }

    pub fn snapshot(&self, descriptor: &QueryDescriptor) -> Option<Arc<Snapshot<R>>> {
        self.slots
            .read()
            .get(descriptor)
            .and_then(|slot| slot.snapshot.clone())
    }

    /// Records of one descriptor in query order; empty before the first snapshot.
    pub fn list(&self, descriptor: &QueryDescriptor) -> Vec<R> {
        self.snapshot(descriptor)
            .map(|s| s.records.clone())
            .unwrap_or_default()
    }

    pub fn get(&self, descriptor: &QueryDescriptor, id: &str) -> Option<R> {
        self.snapshot(descriptor)
            .and_then(|s| s.get(id).cloned())
    }

    /// Look a record up across every descriptor, preferring the freshest snapshot.
    pub fn find(&self, id: &str) -> Option<R> {
        self.slots
            .read()
            .values()
            .filter_map(|slot| slot.snapshot.as_ref())
            .filter_map(|s| s.get(id).map(|r| (s.revision, r)))
            .max_by_key(|(revision, _)| *revision)
            .map(|(_, r)| r.clone())
    }

    pub fn descriptors(&self) -> Vec<QueryDescriptor> {
        self.slots.read().keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Application;
    use chrono::Utc;

    fn job(id: &str, company: &str) -> Application {
        Application {
            id: id.to_string(),
            user_id: "user-1".to_string(),
            company_name: company.to_string(),
            job_title: "Engineer".to_string(),
            applied_date: Utc::now(),
            outcome: None,
            priority: None,
            auto_follow_up: false,
            notes: None,
            contact_name: None,
            contact_email: None,
            contact_phone: None,
            job_posting_url: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_replace_requires_attached_slot() {
        let store = RecordStore::<Application>::new();
        let descriptor = Application::query_for("user-1");
        let token = CancellationToken::new();
        let snapshot = Arc::new(Snapshot::new(1, vec![job("a", "Acme")]));

        assert_eq!(
            store.replace(&descriptor, snapshot.clone(), &token),
            Replace::Detached
        );

        store.attach(&descriptor);
        assert_eq!(store.replace(&descriptor, snapshot, &token), Replace::Applied);
        assert_eq!(store.list(&descriptor).len(), 1);
    }

    #[test]
    fn test_replace_is_whole_set_and_rejects_older_revisions() {
        let store = RecordStore::<Application>::new();
        let descriptor = Application::query_for("user-1");
        let token = CancellationToken::new();
        store.attach(&descriptor);

        store.replace(
            &descriptor,
            Arc::new(Snapshot::new(2, vec![job("a", "Acme"), job("b", "Beta")])),
            &token,
        );
        store.replace(
            &descriptor,
            Arc::new(Snapshot::new(3, vec![job("b", "Beta")])),
            &token,
        );
        assert!(store.get(&descriptor, "a").is_none());

        let stale = store.replace(
            &descriptor,
            Arc::new(Snapshot::new(1, vec![job("a", "Acme")])),
            &token,
        );
        assert_eq!(stale, Replace::Stale);
        assert_eq!(store.snapshot(&descriptor).unwrap().revision, 3);
    }

    #[test]
    fn test_cancelled_token_never_applies() {
        let store = RecordStore::<Application>::new();
        let descriptor = Application::query_for("user-1");
        let token = CancellationToken::new();
        store.attach(&descriptor);
        token.cancel();

        let result = store.replace(
            &descriptor,
            Arc::new(Snapshot::new(1, vec![job("a", "Acme")])),
            &token,
        );
        assert_eq!(result, Replace::Detached);
        assert!(store.snapshot(&descriptor).is_none());
    }

    #[test]
    fn test_detach_is_reference_counted() {
        let store = RecordStore::<Application>::new();
        let descriptor = Application::query_for("user-1");
        store.attach(&descriptor);
        store.attach(&descriptor);

        store.detach(&descriptor);
        assert_eq!(store.descriptors(), vec![descriptor.clone()]);

        store.detach(&descriptor);
        assert!(store.is_empty());
    }

    #[test]
    fn test_find_prefers_freshest_snapshot() {
        let store = RecordStore::<Application>::new();
        let token = CancellationToken::new();
        let mine = Application::query_for("user-1");
        let other = QueryDescriptor::new("jobs", "companyName", crate::models::SortDirection::Asc);
        store.attach(&mine);
        store.attach(&other);

        store.replace(&mine, Arc::new(Snapshot::new(4, vec![job("a", "Old")])), &token);
        store.replace(&other, Arc::new(Snapshot::new(7, vec![job("a", "New")])), &token);

        assert_eq!(store.find("a").unwrap().company_name, "New");
        assert!(store.find("missing").is_none());
    }
}
