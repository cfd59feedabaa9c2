//! The server write surface and an in-memory implementation of it.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

use tally_core::model::ServerModel;
use tally_core::rows::{GroupId, ModelId, RowData};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("server rejected the write ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("model {0} does not exist on the server")]
    NotFound(ModelId),

    #[error("server unavailable: {0}")]
    Unavailable(String),
}

/// Persisting writes for one table's models.
#[async_trait]
pub trait ModelApi: Send + Sync {
    /// Create a model from a placeholder's data.
    async fn create(&self, data: RowData, group: Option<GroupId>) -> Result<ServerModel, ApiError>;

    /// Patch fields of an existing model and return its new state.
    async fn update(&self, id: ModelId, patch: RowData) -> Result<ServerModel, ApiError>;

    async fn delete(&self, id: ModelId) -> Result<(), ApiError>;
}

/// A write received by [`InMemoryApi`], in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    Create {
        data: RowData,
        group: Option<GroupId>,
    },
    Update {
        id: ModelId,
        patch: RowData,
    },
    Delete {
        id: ModelId,
    },
}

/// Server stand-in keeping models in memory, with a fixed latency per
/// write.
#[derive(Debug)]
pub struct InMemoryApi {
    models: Mutex<BTreeMap<ModelId, ServerModel>>,
    calls: Mutex<Vec<ApiCall>>,
    next_id: AtomicU64,
    latency: Duration,
    reject_creates: AtomicBool,
}

impl Default for InMemoryApi {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

impl InMemoryApi {
    #[must_use]
    pub fn new(latency: Duration) -> Self {
        Self {
            models: Mutex::new(BTreeMap::new()),
            calls: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            latency,
            reject_creates: AtomicBool::new(false),
        }
    }

    /// Start model ids at `first` instead of 1.
    #[must_use]
    pub fn with_first_id(self, first: ModelId) -> Self {
        self.next_id.store(first, Ordering::SeqCst);
        self
    }

    /// Make every following `create` fail with a 400.
    pub fn reject_creates(&self, reject: bool) {
        self.reject_creates.store(reject, Ordering::SeqCst);
    }

    /// Seed a model as if it had been created earlier.
    pub async fn insert(&self, model: ServerModel) {
        self.models.lock().await.insert(model.id, model);
    }

    pub async fn model(&self, id: ModelId) -> Option<ServerModel> {
        self.models.lock().await.get(&id).cloned()
    }

    pub async fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().await.clone()
    }

    async fn record(&self, call: ApiCall) {
        self.calls.lock().await.push(call);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl ModelApi for InMemoryApi {
    async fn create(&self, data: RowData, group: Option<GroupId>) -> Result<ServerModel, ApiError> {
        self.record(ApiCall::Create {
            data: data.clone(),
            group,
        })
        .await;
        if self.reject_creates.load(Ordering::SeqCst) {
            return Err(ApiError::Rejected {
                status: 400,
                message: "create rejected".into(),
            });
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let model = ServerModel {
            id,
            children: Vec::new(),
            fields: data,
        };
        self.models.lock().await.insert(id, model.clone());
        Ok(model)
    }

    async fn update(&self, id: ModelId, patch: RowData) -> Result<ServerModel, ApiError> {
        self.record(ApiCall::Update {
            id,
            patch: patch.clone(),
        })
        .await;
        let mut models = self.models.lock().await;
        let model = models.get_mut(&id).ok_or(ApiError::NotFound(id))?;
        model.fields.extend(patch);
        Ok(model.clone())
    }

    async fn delete(&self, id: ModelId) -> Result<(), ApiError> {
        self.record(ApiCall::Delete { id }).await;
        self.models
            .lock()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(ApiError::NotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(rate: i64) -> RowData {
        std::iter::once(("rate".to_string(), json!(rate))).collect()
    }

    #[tokio::test]
    async fn create_assigns_sequential_ids() {
        let api = InMemoryApi::default().with_first_id(40);
        let first = api.create(data(1), None).await.expect("create");
        let second = api.create(data(2), Some(GroupId(3))).await.expect("create");
        assert_eq!((first.id, second.id), (40, 41));
        assert_eq!(api.calls().await.len(), 2);
    }

    #[tokio::test]
    async fn update_merges_patch() {
        let api = InMemoryApi::default();
        let model = api.create(data(1), None).await.expect("create");
        let mut patch = data(5);
        patch.insert("description".into(), json!("Lens"));
        let updated = api.update(model.id, patch).await.expect("update");
        assert_eq!(updated.fields["rate"], 5);
        assert_eq!(updated.fields["description"], "Lens");
    }

    #[tokio::test]
    async fn missing_models_are_not_found() {
        let api = InMemoryApi::default();
        assert_eq!(api.delete(9).await, Err(ApiError::NotFound(9)));
        assert_eq!(
            api.update(9, RowData::new()).await.map(|m| m.id),
            Err(ApiError::NotFound(9))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn latency_is_applied_per_write() {
        let api = InMemoryApi::new(Duration::from_millis(250));
        let start = tokio::time::Instant::now();
        api.create(data(1), None).await.expect("create");
        assert!(start.elapsed() >= Duration::from_millis(250));
    }

    #[tokio::test]
    async fn rejected_creates_leave_no_model() {
        let api = InMemoryApi::default();
        api.reject_creates(true);
        assert!(matches!(
            api.create(data(1), None).await,
            Err(ApiError::Rejected { status: 400, .. })
        ));
        assert!(api.model(1).await.is_none());
    }
}
