mod availability;
mod catalog;
mod conflict;
mod error;
mod mutations;
mod queries;
mod ranking;
mod store;
#[cfg(test)]
mod tests;

pub use availability::AvailabilityProvider;
pub use catalog::suggests_party_size;
pub use error::EngineError;
pub use ranking::{rank, score};
pub use store::InMemoryStore;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{OwnedRwLockWriteGuard, RwLock, mpsc, oneshot};
use tracing::info;
use ulid::Ulid;

use crate::city::CityNormalizer;
use crate::model::*;
use crate::observability;
use crate::wal::Wal;

pub type SharedEstablishmentState = Arc<RwLock<EstablishmentState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Owns the WAL. Appends that arrive while a flush is pending are folded
/// into the same fsync; other commands are handled between batches.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let WalCommand::Append { event, response } = cmd else {
            handle_control(&mut wal, cmd);
            continue;
        };
        let mut batch: Vec<PendingAppend> = vec![(event, response)];
        let mut deferred = None;
        while let Ok(next) = rx.try_recv() {
            match next {
                WalCommand::Append { event, response } => batch.push((event, response)),
                other => {
                    deferred = Some(other);
                    break;
                }
            }
        }
        commit_batch(&mut wal, &mut batch);
        if let Some(cmd) = deferred {
            handle_control(&mut wal, cmd);
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<PendingAppend>) {
    metrics::histogram!(observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = Instant::now();
    let result = write_batch(wal, batch);
    metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
    for (_, tx) in batch.drain(..) {
        let reply = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(reply);
    }
}

fn write_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    let appended = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event));
    // Flush even after a failed append so stray buffered bytes never leak
    // into the next batch; the whole batch is reported failed either way.
    let flushed = wal.flush_sync();
    appended.and(flushed)
}

fn handle_control(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let started = Instant::now();
            let result = Wal::write_compact_file(wal.path(), &events).and_then(|()| wal.swap_compact_file());
            metrics::histogram!(observability::WAL_COMPACTION_DURATION_SECONDS)
                .record(started.elapsed().as_secs_f64());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

/// Availability and reservation engine. One `RwLock` per establishment;
/// every capacity check, WAL append and apply for a reservation happens
/// under that establishment's write lock.
pub struct Engine {
    pub(super) store: InMemoryStore,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub(super) cities: CityNormalizer,
    /// Mutations hold it shared; compaction takes it exclusively so no
    /// append can land between the snapshot and the file swap.
    pub(super) compaction_gate: RwLock<()>,
}

impl Engine {
    pub fn new(wal_path: PathBuf, cities: CityNormalizer) -> io::Result<Self> {
        let (wal, events) = Wal::recover(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let store = InMemoryStore::new();
        store.replay(&events);
        info!(
            events = events.len(),
            establishments = store.establishment_count(),
            "engine state restored from WAL"
        );

        Ok(Self {
            store,
            wal_tx,
            cities,
            compaction_gate: RwLock::new(()),
        })
    }

    pub fn cities(&self) -> &CityNormalizer {
        &self.cities
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// Persist a store-level event (user or establishment creation) and apply it.
    pub(super) async fn persist_global(&self, event: &Event) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.store.apply_global(event);
        Ok(())
    }

    /// Persist an establishment-scoped event and apply it under the caller's lock.
    pub(super) async fn persist_and_apply(
        &self,
        es: &mut EstablishmentState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.store.apply_event(es, event);
        Ok(())
    }

    pub(super) fn establishment(&self, id: &str) -> Result<SharedEstablishmentState, EngineError> {
        self.store
            .get_establishment(id)
            .ok_or_else(|| EngineError::NotFound(format!("establishment {id}")))
    }

    pub(super) async fn establishment_write(
        &self,
        id: &str,
    ) -> Result<OwnedRwLockWriteGuard<EstablishmentState>, EngineError> {
        let guard = self.establishment(id)?.write_owned().await;
        // Deleted while we waited for the lock.
        if !self.store.contains_establishment(id) {
            return Err(EngineError::NotFound(format!("establishment {id}")));
        }
        Ok(guard)
    }

    /// Route a booking id to its establishment and lock it for writing.
    pub(super) async fn booking_write(
        &self,
        booking_id: &Ulid,
    ) -> Result<OwnedRwLockWriteGuard<EstablishmentState>, EngineError> {
        let establishment_id = self
            .store
            .establishment_for_booking(booking_id)
            .ok_or_else(|| EngineError::NotFound(format!("booking {booking_id}")))?;
        self.establishment_write(&establishment_id).await
    }

    pub(super) async fn unit_type_write(
        &self,
        unit_type_id: &Ulid,
    ) -> Result<OwnedRwLockWriteGuard<EstablishmentState>, EngineError> {
        let establishment_id = self
            .store
            .establishment_for_unit_type(unit_type_id)
            .ok_or_else(|| EngineError::NotFound(format!("unit type {unit_type_id}")))?;
        self.establishment_write(&establishment_id).await
    }

    pub(super) fn require_user(&self, id: UserId) -> Result<User, EngineError> {
        self.store
            .get_user(id)
            .ok_or_else(|| EngineError::NotFound(format!("user {id}")))
    }

    pub(super) fn require_partner(&self, id: UserId) -> Result<User, EngineError> {
        let user = self.require_user(id)?;
        if user.role != UserRole::Partner {
            return Err(EngineError::Forbidden(format!("user {id} is not a partner")));
        }
        Ok(user)
    }
}
