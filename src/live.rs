//! Cached list views kept in step with the change feed.
//!
//! A view is filled by its [`ListSource`] and then either re-fetched on every
//! change of its table ([`ListView::mount`]) or patched in place from the
//! change payload ([`ListView::mount_patching`]).

use crate::realtime::{Change, ChangeKind, RealtimeStore, Table};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize};
use std::{
    collections::BTreeSet,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, RwLock, RwLockWriteGuard,
    },
};
use uuid::Uuid;

#[async_trait]
pub trait ListSource<T>: Send + Sync {
    async fn fetch(&self) -> anyhow::Result<Vec<T>>;
}

/// Rows that can be patched by id.
pub trait Keyed {
    fn key(&self) -> Uuid;
}

impl Keyed for crate::models::Announcement {
    fn key(&self) -> Uuid {
        self.id
    }
}

type Replay<T> = fn(&mut Vec<T>, &Change) -> bool;

struct Snapshot<T> {
    // ticket of the fetch the rows came from, 0 until one succeeded
    generation: u64,
    rows: Arc<Vec<T>>,
    in_flight: BTreeSet<u64>,
    // patches that fetches still in flight may predate
    pending: Vec<(u64, Change)>,
    replay: Option<Replay<T>>,
}

impl<T> Snapshot<T> {
    fn prune(&mut self) {
        let oldest = self.in_flight.iter().next().copied();
        self.pending
            .retain(|(ticket, _)| oldest.map_or(false, |oldest| *ticket > oldest));
    }
}

pub struct ListView<T> {
    name: &'static str,
    source: Arc<dyn ListSource<T>>,
    next_ticket: AtomicU64,
    snapshot: RwLock<Snapshot<T>>,
}

impl<T> ListView<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(name: &'static str, source: Arc<dyn ListSource<T>>) -> Arc<ListView<T>> {
        Arc::new(ListView {
            name,
            source,
            next_ticket: AtomicU64::new(1),
            snapshot: RwLock::new(Snapshot {
                generation: 0,
                rows: Arc::new(Vec::new()),
                in_flight: BTreeSet::new(),
                pending: Vec::new(),
                replay: None,
            }),
        })
    }

    fn snapshot(&self) -> RwLockWriteGuard<'_, Snapshot<T>> {
        self.snapshot.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn rows(&self) -> Arc<Vec<T>> {
        let snapshot = self.snapshot.read().unwrap_or_else(|e| e.into_inner());
        snapshot.rows.clone()
    }

    pub fn is_loaded(&self) -> bool {
        let snapshot = self.snapshot.read().unwrap_or_else(|e| e.into_inner());
        snapshot.generation > 0
    }

    fn ticket(&self) -> u64 {
        self.next_ticket.fetch_add(1, Ordering::SeqCst)
    }

    /// Re-fetches every row. A fetch that resolves after a later-started one
    /// is dropped, and patches applied while it ran are replayed onto its
    /// rows. On failure the previous rows stay.
    pub async fn refresh(&self) -> anyhow::Result<()> {
        let ticket = {
            let mut snapshot = self.snapshot();
            let ticket = self.ticket();
            snapshot.in_flight.insert(ticket);
            ticket
        };
        let fetched = self.source.fetch().await;

        let mut snapshot = self.snapshot();
        snapshot.in_flight.remove(&ticket);
        let outcome = match fetched {
            Ok(mut rows) if ticket > snapshot.generation => {
                if let Some(replay) = snapshot.replay {
                    for (_, change) in snapshot.pending.iter().filter(|(p, _)| *p > ticket) {
                        replay(&mut rows, change);
                    }
                }
                snapshot.generation = ticket;
                snapshot.rows = Arc::new(rows);
                Ok(())
            }
            Ok(_) => {
                tracing::debug!(view = self.name, ticket, "dropped stale list response");
                Ok(())
            }
            Err(e) => {
                tracing::error!(view = self.name, "failed to refresh list view: {e:#}");
                Err(e)
            }
        };
        snapshot.prune();
        outcome
    }

    fn spawn_refresh(self: &Arc<Self>) {
        let view = self.clone();
        tokio::spawn(async move {
            let _ = view.refresh().await;
        });
    }

    /// Subscribes to `table` and re-fetches the whole list once per change.
    pub async fn mount(self: &Arc<Self>, realtime: &RealtimeStore, table: Table) {
        let view = self.clone();
        realtime
            .on_change(table, move |_change| view.spawn_refresh())
            .await;
        realtime.subscribe(table).await;
    }
}

#[derive(Deserialize)]
struct KeyOnly {
    id: Uuid,
}

/// Applies one change payload to `rows`, newest first. Returns `false` when
/// the payload lacks what the change kind needs.
pub fn apply_change<T>(rows: &mut Vec<T>, change: &Change) -> bool
where
    T: Keyed + DeserializeOwned,
{
    match change.kind {
        ChangeKind::Insert | ChangeKind::Update => {
            let Some(row) = change
                .new
                .clone()
                .and_then(|value| serde_json::from_value::<T>(value).ok())
            else {
                return false;
            };
            match rows.iter_mut().find(|r| r.key() == row.key()) {
                Some(existing) => *existing = row,
                None => rows.insert(0, row),
            }
            true
        }
        ChangeKind::Delete => {
            let Some(KeyOnly { id }) = change
                .old
                .clone()
                .and_then(|value| serde_json::from_value::<KeyOnly>(value).ok())
            else {
                return false;
            };
            rows.retain(|r| r.key() != id);
            true
        }
    }
}

impl<T> ListView<T>
where
    T: Keyed + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Applies `change` to the cached rows. Returns `false` when the view was
    /// never loaded or the payload is unusable; the caller should re-fetch.
    pub fn patch(&self, change: &Change) -> bool {
        let mut snapshot = self.snapshot();
        if snapshot.generation == 0 {
            return false;
        }
        let mut rows = (*snapshot.rows).clone();
        if !apply_change(&mut rows, change) {
            return false;
        }
        snapshot.rows = Arc::new(rows);
        if !snapshot.in_flight.is_empty() {
            let ticket = self.ticket();
            snapshot.replay = Some(apply_change::<T>);
            snapshot.pending.push((ticket, change.clone()));
        }
        true
    }

    /// Subscribes to `table` and applies each payload in place, falling back
    /// to a full re-fetch until the first load succeeded or when a payload
    /// cannot be applied.
    pub async fn mount_patching(self: &Arc<Self>, realtime: &RealtimeStore, table: Table) {
        let view = self.clone();
        realtime
            .on_change(table, move |change| {
                if !view.patch(&change) {
                    tracing::warn!(view = view.name, "cannot patch list view, re-fetching");
                    view.spawn_refresh();
                }
            })
            .await;
        realtime.subscribe(table).await;
    }
}
