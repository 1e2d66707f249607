//! Live-record sync engine.
//!
//! A [`SnapshotSource`] turns a query descriptor into a stream of snapshots.
//! The [`SubscriptionManager`] gates subscriptions on the current principal,
//! pumps snapshots into a shared [`RecordStore`] and tears everything down on
//! cancellation or sign-out.

mod store;
mod subscription;

pub use store::*;
pub use subscription::*;

use tokio::sync::mpsc;

use crate::errors::AppError;
use crate::models::{QueryDescriptor, Record, Snapshot};

/// Snapshots of one live query, in revision order. An `Err` is terminal.
pub type SnapshotFeed<R> = mpsc::Receiver<Result<Snapshot<R>, AppError>>;

/// A remote store that can run live queries.
pub trait SnapshotSource<R: Record>: Send + Sync + 'static {
    /// Start a live query. Fails up front when the descriptor is invalid.
    fn watch(&self, descriptor: &QueryDescriptor) -> Result<SnapshotFeed<R>, AppError>;
}
