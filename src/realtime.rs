//! Change notifications for the three watched tables.
//!
//! [`ChangeFeed`] carries every committed insert, update and delete. A
//! [`RealtimeStore`] opens at most one channel per table on that feed and
//! routes each notification to the single callback registered for the table.

use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, sync::Arc};
use tokio::{
    sync::{broadcast, Mutex, RwLock},
    task::JoinHandle,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    Events,
    Clubs,
    Announcements,
}

impl Table {
    pub const ALL: [Table; 3] = [Table::Events, Table::Clubs, Table::Announcements];

    pub fn name(self) -> &'static str {
        match self {
            Table::Events => "events",
            Table::Clubs => "clubs",
            Table::Announcements => "announcements",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Raw change payload: the row after the change (`new`) and before it
/// (`old`), serialized the way the API serializes rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub table: Table,
    pub kind: ChangeKind,
    pub new: Option<serde_json::Value>,
    pub old: Option<serde_json::Value>,
}

fn to_json<T: Serialize>(row: &T) -> Option<serde_json::Value> {
    match serde_json::to_value(row) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("failed to serialize change payload: {e}");
            None
        }
    }
}

impl Change {
    pub fn insert<T: Serialize>(table: Table, row: &T) -> Change {
        Change {
            table,
            kind: ChangeKind::Insert,
            new: to_json(row),
            old: None,
        }
    }

    pub fn update<T: Serialize>(table: Table, old: Option<&T>, new: &T) -> Change {
        Change {
            table,
            kind: ChangeKind::Update,
            new: to_json(new),
            old: old.and_then(to_json),
        }
    }

    pub fn delete<T: Serialize>(table: Table, row: &T) -> Change {
        Change {
            table,
            kind: ChangeKind::Delete,
            new: None,
            old: to_json(row),
        }
    }
}

const FEED_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<Change>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        ChangeFeed::new(FEED_CAPACITY)
    }
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> ChangeFeed {
        let (sender, _) = broadcast::channel(capacity);
        ChangeFeed { sender }
    }

    /// Delivers `change` to every open channel. Nobody listening is not an
    /// error.
    pub fn publish(&self, change: Change) {
        tracing::debug!(table = %change.table, kind = ?change.kind, "publishing change");
        let _ = self.sender.send(change);
    }

    pub fn receiver(&self) -> broadcast::Receiver<Change> {
        self.sender.subscribe()
    }
}

pub type ChangeCallback = Arc<dyn Fn(Change) + Send + Sync>;

/// Subscription registry with one channel and one callback slot per table.
///
/// Each connection or view group owns its own store; `unsubscribe_all` (or
/// dropping the store) closes every channel it opened.
pub struct RealtimeStore {
    feed: ChangeFeed,
    channels: Mutex<HashMap<Table, JoinHandle<()>>>,
    callbacks: Arc<RwLock<HashMap<Table, ChangeCallback>>>,
}

impl RealtimeStore {
    pub fn new(feed: ChangeFeed) -> RealtimeStore {
        RealtimeStore {
            feed,
            channels: Mutex::new(HashMap::new()),
            callbacks: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Opens the channel for `table`. Returns `false` without doing anything
    /// when one is already open.
    pub async fn subscribe(&self, table: Table) -> bool {
        let mut channels = self.channels.lock().await;
        if channels.contains_key(&table) {
            return false;
        }

        // Receiver is taken before returning so no change published after
        // `subscribe` resolves can be missed.
        let mut receiver = self.feed.receiver();
        let callbacks = self.callbacks.clone();
        let handle = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(change) if change.table == table => {
                        let callback = callbacks.read().await.get(&table).cloned();
                        if let Some(callback) = callback {
                            callback(change);
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(%table, skipped, "realtime channel lagged behind");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::debug!(%table, "change feed closed");
                        break;
                    }
                }
            }
        });

        tracing::debug!(%table, "opened realtime channel");
        channels.insert(table, handle);
        true
    }

    pub async fn on_change<F>(&self, table: Table, callback: F)
    where
        F: Fn(Change) + Send + Sync + 'static,
    {
        self.callbacks
            .write()
            .await
            .insert(table, Arc::new(callback));
    }

    pub async fn is_subscribed(&self, table: Table) -> bool {
        self.channels.lock().await.contains_key(&table)
    }

    pub async fn unsubscribe_all(&self) {
        for (table, handle) in self.channels.lock().await.drain() {
            handle.abort();
            tracing::debug!(%table, "closed realtime channel");
        }
        self.callbacks.write().await.clear();
    }
}

impl Drop for RealtimeStore {
    fn drop(&mut self) {
        for (_, handle) in self.channels.get_mut().drain() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Announcement;
    use std::time::Duration;
    use tokio::{sync::mpsc, time::timeout};

    fn sample_change(table: Table) -> Change {
        Change {
            table,
            kind: ChangeKind::Insert,
            new: Some(serde_json::json!({ "id": "1" })),
            old: None,
        }
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<Change>) -> Option<Change> {
        timeout(Duration::from_millis(200), rx.recv())
            .await
            .ok()
            .flatten()
    }

    #[tokio::test]
    async fn second_subscribe_is_a_no_op() {
        let feed = ChangeFeed::default();
        let store = RealtimeStore::new(feed.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();
        store
            .on_change(Table::Events, move |change| {
                let _ = tx.send(change);
            })
            .await;

        assert!(store.subscribe(Table::Events).await);
        assert!(!store.subscribe(Table::Events).await);

        feed.publish(sample_change(Table::Events));
        assert!(next(&mut rx).await.is_some());
        assert!(next(&mut rx).await.is_none(), "one channel, one delivery");
    }

    #[tokio::test]
    async fn later_callback_replaces_earlier_one() {
        let feed = ChangeFeed::default();
        let store = RealtimeStore::new(feed.clone());
        let (first_tx, mut first_rx) = mpsc::unbounded_channel();
        let (second_tx, mut second_rx) = mpsc::unbounded_channel();

        store.subscribe(Table::Clubs).await;
        store
            .on_change(Table::Clubs, move |c| {
                let _ = first_tx.send(c);
            })
            .await;
        store
            .on_change(Table::Clubs, move |c| {
                let _ = second_tx.send(c);
            })
            .await;

        feed.publish(sample_change(Table::Clubs));
        assert_eq!(next(&mut second_rx).await, Some(sample_change(Table::Clubs)));
        assert!(next(&mut first_rx).await.is_none());
    }

    #[tokio::test]
    async fn changes_are_routed_by_table() {
        let feed = ChangeFeed::default();
        let store = RealtimeStore::new(feed.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();

        store.subscribe(Table::Announcements).await;
        store
            .on_change(Table::Announcements, move |c| {
                let _ = tx.send(c);
            })
            .await;

        feed.publish(sample_change(Table::Events));
        feed.publish(sample_change(Table::Announcements));
        let got = next(&mut rx).await.unwrap();
        assert_eq!(got.table, Table::Announcements);
        assert!(next(&mut rx).await.is_none());
    }

    #[tokio::test]
    async fn unsubscribe_all_tears_everything_down() {
        let feed = ChangeFeed::default();
        let store = RealtimeStore::new(feed.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();

        for table in Table::ALL {
            store.subscribe(table).await;
            let tx = tx.clone();
            store
                .on_change(table, move |c| {
                    let _ = tx.send(c);
                })
                .await;
        }
        store.unsubscribe_all().await;

        for table in Table::ALL {
            assert!(!store.is_subscribed(table).await);
            feed.publish(sample_change(table));
        }
        assert!(next(&mut rx).await.is_none());

        // A fresh subscription works again, but the old callbacks are gone.
        assert!(store.subscribe(Table::Events).await);
        feed.publish(sample_change(Table::Events));
        assert!(next(&mut rx).await.is_none());
    }

    #[test]
    fn payloads_use_row_serialization() {
        let row = Announcement {
            id: uuid::Uuid::new_v4(),
            title: "Library hours".to_string(),
            message: "Open late during finals".to_string(),
            category: "Campus".to_string(),
            created_at: chrono::Utc::now(),
            created_by: None,
        };
        let change = Change::delete(Table::Announcements, &row);
        assert_eq!(change.kind, ChangeKind::Delete);
        assert!(change.new.is_none());
        assert_eq!(change.old.unwrap()["title"], "Library hours");

        let wire = serde_json::to_value(sample_change(Table::Events)).unwrap();
        assert_eq!(wire["table"], "events");
        assert_eq!(wire["kind"], "INSERT");
    }
}
