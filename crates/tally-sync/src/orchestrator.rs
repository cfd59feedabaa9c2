//! Optimistic writes: apply locally, persist in the background and fold
//! the server's answer back in as control events.
//!
//! ```text
//! submit(event) ──► Store::dispatch ──► spawn write per affected row
//!                                            │
//! settle_next() ◄── completion channel ◄─────┘
//!      │
//!      └─► placeholdersActivated / modelsUpdated / rowDelete (rollback)
//! ```
//!
//! Each row has at most one write in flight. A newer write for the same
//! row cancels the older one and carries its unsent fields; completions
//! are matched against the row's current generation so a superseded
//! answer never overwrites newer local state.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tally_core::Store;
use tally_core::consolidate::{ConsolidationError, consolidate_row_changes};
use tally_core::event::{ModelsUpdatedPayload, PlaceholdersActivatedPayload, RowChange, TableEvent};
use tally_core::model::ServerModel;
use tally_core::reducer::{ReduceError, StaleReference};
use tally_core::rows::{ModelId, PlaceholderId, RowCollection, RowData, RowId};

use crate::api::{ApiError, ModelApi};

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Reduce(#[from] ReduceError),

    #[error(transparent)]
    Consolidation(#[from] ConsolidationError),
}

/// What settling one write did.
#[derive(Debug, Clone, PartialEq)]
pub enum Settled {
    /// The placeholder was promoted to a model row.
    Activated {
        placeholder: PlaceholderId,
        model: ModelId,
    },
    /// The create failed and the placeholder was removed.
    RolledBack {
        placeholder: PlaceholderId,
        error: ApiError,
    },
    /// The server accepted an update; its state replaced the row's data.
    Confirmed { id: ModelId },
    Deleted { id: ModelId },
    /// The write failed; the local state is kept.
    Failed { id: RowId, error: ApiError },
    /// A newer write or a local delete overtook this one.
    Superseded { id: RowId },
}

enum Outcome {
    Created {
        placeholder: PlaceholderId,
        result: Result<ServerModel, ApiError>,
    },
    Updated {
        id: ModelId,
        result: Result<ServerModel, ApiError>,
    },
    Deleted {
        id: ModelId,
        result: Result<(), ApiError>,
    },
    Cancelled,
}

struct Completion {
    row: RowId,
    generation: u64,
    outcome: Outcome,
}

struct InFlight {
    generation: u64,
    token: CancellationToken,
    /// Fields an update is carrying, so a superseding update can resend them.
    patch: RowData,
}

/// Owns the store and every write in flight for it.
pub struct Orchestrator {
    api: Arc<dyn ModelApi>,
    store: Store,
    in_flight: HashMap<RowId, InFlight>,
    /// Edits to placeholders whose create has not returned yet.
    pending_edits: HashMap<PlaceholderId, RowData>,
    next_generation: u64,
    outstanding: usize,
    tx: mpsc::UnboundedSender<Completion>,
    rx: mpsc::UnboundedReceiver<Completion>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("rows", &self.store.rows().len())
            .field("in_flight", &self.in_flight.len())
            .field("outstanding", &self.outstanding)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    #[must_use]
    pub fn new(api: Arc<dyn ModelApi>, store: Store) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            api,
            store,
            in_flight: HashMap::new(),
            pending_edits: HashMap::new(),
            next_generation: 0,
            outstanding: 0,
            tx,
            rx,
        }
    }

    #[must_use]
    pub const fn store(&self) -> &Store {
        &self.store
    }

    #[must_use]
    pub const fn rows(&self) -> &RowCollection {
        self.store.rows()
    }

    /// Rows with a write in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Spawned writes whose completion has not been settled, cancelled
    /// ones included.
    #[must_use]
    pub const fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Apply `event` locally and start the writes it implies.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the reducer rejects the event or its cell
    /// changes cannot be consolidated; nothing is applied or sent then.
    pub fn submit(&mut self, event: &TableEvent) -> Result<Vec<StaleReference>, SyncError> {
        let edits = match event {
            TableEvent::DataChange(payload) => consolidate_row_changes(&payload.changes)?,
            _ => Vec::new(),
        };
        let deleted: Vec<RowId> = match event {
            TableEvent::RowDelete(payload) => payload
                .ids
                .iter()
                .filter(|id| self.store.rows().contains(id))
                .cloned()
                .collect(),
            _ => Vec::new(),
        };

        let stale = self.store.dispatch(event)?;

        match event {
            TableEvent::RowAdd(payload) => {
                for placeholder in &payload.placeholders {
                    self.create(&placeholder.id);
                }
            }
            TableEvent::RowInsert(payload) => self.create(&payload.placeholder.id),
            TableEvent::DataChange(_) => {
                for change in &edits {
                    self.persist_edit(change);
                }
            }
            TableEvent::RowDelete(_) => {
                for id in &deleted {
                    self.remove(id);
                }
            }
            _ => {}
        }
        Ok(stale)
    }

    /// Wait for the next write to finish and apply its result.
    ///
    /// Returns `None` when nothing is outstanding.
    ///
    /// # Errors
    ///
    /// Returns an error if the resulting control event is rejected by the
    /// reducer.
    pub async fn settle_next(&mut self) -> Result<Option<Settled>, SyncError> {
        if self.outstanding == 0 {
            return Ok(None);
        }
        let Some(completion) = self.rx.recv().await else {
            return Ok(None);
        };
        self.outstanding -= 1;
        self.settle(completion).map(Some)
    }

    /// Settle writes until none are outstanding, including writes started
    /// while settling.
    ///
    /// # Errors
    ///
    /// Stops at the first control event the reducer rejects.
    pub async fn settle_all(&mut self) -> Result<Vec<Settled>, SyncError> {
        let mut settled = Vec::new();
        while let Some(next) = self.settle_next().await? {
            settled.push(next);
        }
        Ok(settled)
    }

    #[must_use]
    pub fn into_store(self) -> Store {
        self.store
    }

    fn create(&mut self, placeholder: &PlaceholderId) {
        let row_id = RowId::Placeholder(placeholder.clone());
        let Some(row) = self.store.rows().get(&row_id) else {
            return;
        };
        let data = row.data().cloned().unwrap_or_default();
        let group = row.group();
        let placeholder = placeholder.clone();
        self.spawn(row_id, RowData::new(), move |api| async move {
            Outcome::Created {
                result: api.create(data, group).await,
                placeholder,
            }
        });
    }

    fn persist_edit(&mut self, change: &RowChange) {
        let patch: RowData = change
            .data
            .iter()
            .map(|(field, cell)| (field.clone(), cell.new_value.clone()))
            .collect();
        match &change.id {
            RowId::Model(id) if self.store.rows().contains(&change.id) => {
                let mut merged = self
                    .in_flight
                    .get(&change.id)
                    .map(|previous| previous.patch.clone())
                    .unwrap_or_default();
                merged.extend(patch);
                let id = *id;
                let sent = merged.clone();
                self.spawn(change.id.clone(), merged, move |api| async move {
                    Outcome::Updated {
                        result: api.update(id, sent).await,
                        id,
                    }
                });
            }
            RowId::Placeholder(placeholder) if self.in_flight.contains_key(&change.id) => {
                self.pending_edits
                    .entry(placeholder.clone())
                    .or_default()
                    .extend(patch);
            }
            _ => {}
        }
    }

    fn remove(&mut self, id: &RowId) {
        match id {
            RowId::Model(model) => {
                let model = *model;
                self.delete(model);
            }
            RowId::Placeholder(placeholder) => {
                if let Some(previous) = self.in_flight.remove(id) {
                    debug!(row = %id, "cancelling create for deleted placeholder");
                    previous.token.cancel();
                }
                self.pending_edits.remove(placeholder);
            }
            RowId::Group(_) | RowId::Markup(_) => {}
        }
    }

    fn delete(&mut self, id: ModelId) {
        self.spawn(RowId::Model(id), RowData::new(), move |api| async move {
            Outcome::Deleted {
                result: api.delete(id).await,
                id,
            }
        });
    }

    fn spawn<F, Fut>(&mut self, row: RowId, patch: RowData, write: F)
    where
        F: FnOnce(Arc<dyn ModelApi>) -> Fut,
        Fut: Future<Output = Outcome> + Send + 'static,
    {
        if let Some(previous) = self.in_flight.remove(&row) {
            debug!(row = %row, generation = previous.generation, "superseding write in flight");
            previous.token.cancel();
        }
        self.next_generation += 1;
        let generation = self.next_generation;
        let token = CancellationToken::new();
        self.in_flight.insert(
            row.clone(),
            InFlight {
                generation,
                token: token.clone(),
                patch,
            },
        );
        self.outstanding += 1;

        let write = write(Arc::clone(&self.api));
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let outcome = tokio::select! {
                biased;
                () = token.cancelled() => Outcome::Cancelled,
                outcome = write => outcome,
            };
            let completion = Completion {
                row,
                generation,
                outcome,
            };
            if tx.send(completion).is_err() {
                debug!("orchestrator dropped before write completed");
            }
        });
    }

    fn settle(&mut self, completion: Completion) -> Result<Settled, SyncError> {
        let Completion {
            row,
            generation,
            outcome,
        } = completion;

        let current = self
            .in_flight
            .get(&row)
            .is_some_and(|flight| flight.generation == generation);
        if !current {
            if let Outcome::Created {
                result: Ok(model), ..
            } = outcome
            {
                // Placeholder deleted locally after the server created it.
                info!(model = model.id, "deleting model created for a removed placeholder");
                self.delete(model.id);
            } else {
                debug!(row = %row, generation, "ignoring superseded write");
            }
            return Ok(Settled::Superseded { id: row });
        }
        self.in_flight.remove(&row);

        match outcome {
            Outcome::Created {
                placeholder,
                result: Ok(model),
            } => self.activate(placeholder, model),
            Outcome::Created {
                placeholder,
                result: Err(error),
            } => {
                warn!(%placeholder, %error, "create failed, rolling back placeholder");
                self.pending_edits.remove(&placeholder);
                self.store.dispatch(&TableEvent::row_delete(vec![RowId::Placeholder(
                    placeholder.clone(),
                )]))?;
                Ok(Settled::RolledBack { placeholder, error })
            }
            Outcome::Updated { result: Ok(model), .. } => {
                let id = model.id;
                self.store
                    .dispatch(&TableEvent::ModelsUpdated(ModelsUpdatedPayload {
                        models: vec![model],
                    }))?;
                Ok(Settled::Confirmed { id })
            }
            Outcome::Updated {
                id,
                result: Err(error),
            } => {
                warn!(model = id, %error, "update failed, keeping local values");
                Ok(Settled::Failed {
                    id: RowId::Model(id),
                    error,
                })
            }
            Outcome::Deleted {
                id,
                result: Ok(()) | Err(ApiError::NotFound(_)),
            } => Ok(Settled::Deleted { id }),
            Outcome::Deleted {
                id,
                result: Err(error),
            } => {
                warn!(model = id, %error, "delete failed");
                Ok(Settled::Failed {
                    id: RowId::Model(id),
                    error,
                })
            }
            Outcome::Cancelled => Ok(Settled::Superseded { id: row }),
        }
    }

    fn activate(
        &mut self,
        placeholder: PlaceholderId,
        model: ServerModel,
    ) -> Result<Settled, SyncError> {
        let id = model.id;
        self.store
            .dispatch(&TableEvent::PlaceholdersActivated(
                PlaceholdersActivatedPayload {
                    placeholder_ids: vec![placeholder.clone()],
                    models: vec![model],
                },
            ))?;

        if let Some(edits) = self.pending_edits.remove(&placeholder)
            && !edits.is_empty()
        {
            debug!(model = id, fields = edits.len(), "resending edits made during create");
            let change = edits
                .into_iter()
                .fold(RowChange::new(id), |change, (field, value)| {
                    change.with(field, (), value)
                });
            self.submit(&TableEvent::data_change(vec![change]))?;
        }
        Ok(Settled::Activated {
            placeholder,
            model: id,
        })
    }
}

