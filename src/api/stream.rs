//! Server-sent event streams over live queries.
//!
//! Each stream emits `snapshot` events and ends with a single `error` event
//! when its live query fails.

use std::convert::Infallible;

use axum::response::sse::Event;
use futures::stream::{self, Stream};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::db::Repository;
use crate::errors::AppError;
use crate::models::{Record, Snapshot};
use crate::sync::{Subscription, SubscriptionManager};

/// Events for one subscription. The manager is held until the stream ends.
pub(crate) fn subscription_events<R, P, F>(
    manager: SubscriptionManager<Repository>,
    subscription: Subscription<R>,
    payload: F,
) -> impl Stream<Item = Result<Event, Infallible>>
where
    R: Record,
    P: Serialize,
    F: Fn(&Snapshot<R>) -> P + Send + 'static,
{
    stream::unfold(Some((manager, subscription, payload)), |open| async move {
        let (manager, mut subscription, payload) = open?;
        match subscription.next().await? {
            Ok(snapshot) => match snapshot_event(&payload(snapshot.as_ref())) {
                Ok(event) => Some((Ok(event), Some((manager, subscription, payload)))),
                Err(event) => Some((Ok(event), None)),
            },
            Err(e) => Some((Ok(error_event(&e)), None)),
        }
    })
}

/// Events for a raw snapshot feed.
pub(crate) fn feed_events<T>(
    feed: mpsc::Receiver<Result<Snapshot<T>, AppError>>,
) -> impl Stream<Item = Result<Event, Infallible>>
where
    T: Serialize + Send + 'static,
{
    stream::unfold(Some(feed), |open| async move {
        let mut feed = open?;
        match feed.recv().await {
            Some(Ok(snapshot)) => match snapshot_event(&snapshot) {
                Ok(event) => Some((Ok(event), Some(feed))),
                Err(event) => Some((Ok(event), None)),
            },
            Some(Err(e)) => Some((Ok(error_event(&e)), None)),
            None => Some((
                Ok(error_event(&AppError::Subscription(
                    "Live query ended".to_string(),
                ))),
                None,
            )),
        }
    })
}

fn snapshot_event<P: Serialize>(payload: &P) -> Result<Event, Event> {
    Event::default()
        .event("snapshot")
        .json_data(payload)
        .map_err(|e| {
            tracing::error!("Failed to encode snapshot event: {}", e);
            error_event(&AppError::Internal(e.to_string()))
        })
}

fn error_event(error: &AppError) -> Event {
    Event::default().event("error").data(format!("{}", error))
}
