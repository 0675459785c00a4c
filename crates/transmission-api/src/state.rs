//! # Application State
//!
//! Shared state for the Axum application, passed to all route handlers
//! via the `State` extractor.
//!
//! ## Architecture
//!
//! - **Stores**: one in-memory [`Store`] per record type. Reads are
//!   synchronous; locks are never held across `.await`.
//! - **Persistence**: when a pool is configured every mutation is written
//!   through to Postgres and the stores are hydrated from it on startup.
//! - **Collaborators**: identity service, device registry, device shadow,
//!   GTX and object storage sit behind traits so tests substitute fakes. An
//!   unconfigured collaborator is `None`.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use chrono::Utc;
use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::RwLock;
use sqlx::PgPool;
use transmission_core::{
    AccessRequestId, DeviceId, DocumentId, HistoryId, ImportId, NoteId, PermissionLinkId,
    ShipmentId, TagId, TelemetryId, TrackingId,
};
use transmission_profiles::{
    http_client, DeviceRegistry, DeviceRegistryClient, GtxClient, GtxValidator, IdentityGateway,
    ProfilesClient, ShadowClient, ShadowPublisher,
};
use transmission_state::AccessRequest;
use uuid::Uuid;

use crate::auth::JwtVerifier;
use crate::config::{AppConfig, ConfigError};
use crate::error::AppError;
use crate::history::HistoryEntry;
use crate::records::{
    DeviceRecord, DocumentRecord, ImportRecord, NoteRecord, PermissionLinkRecord, Persisted,
    ShipmentRecord, TagRecord, TelemetryRecord, TrackingRecord,
};
use crate::storage::{ObjectStorage, SignedUrlStorage};

// -- Generic In-Memory Store --------------------------------------------------

/// Thread-safe, cloneable in-memory key-value store.
///
/// All operations are synchronous (the RwLock is `parking_lot`, not
/// `tokio::sync`) because the lock is never held across `.await` points.
#[derive(Debug)]
pub struct Store<K, T> {
    data: Arc<RwLock<HashMap<K, T>>>,
}

impl<K, T> Clone for Store<K, T> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
        }
    }
}

impl<K: Copy + Eq + Hash, T: Clone + Send + Sync> Store<K, T> {
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert a record, returning the previous value if the key existed.
    pub fn insert(&self, id: K, value: T) -> Option<T> {
        self.data.write().insert(id, value)
    }

    pub fn get(&self, id: &K) -> Option<T> {
        self.data.read().get(id).cloned()
    }

    /// The record under `id`, inserting `f()` first if absent.
    pub fn get_or_insert_with(&self, id: K, f: impl FnOnce() -> T) -> T {
        self.data.write().entry(id).or_insert_with(f).clone()
    }

    pub fn list(&self) -> Vec<T> {
        self.data.read().values().cloned().collect()
    }

    /// Records matching `pred`.
    pub fn filter(&self, pred: impl Fn(&T) -> bool) -> Vec<T> {
        self.data
            .read()
            .values()
            .filter(|v| pred(v))
            .cloned()
            .collect()
    }

    /// Update a record in place. Returns the updated record, or `None` if not found.
    pub fn update(&self, id: &K, f: impl FnOnce(&mut T)) -> Option<T> {
        let mut guard = self.data.write();
        let entry = guard.get_mut(id)?;
        f(entry);
        Some(entry.clone())
    }

    /// Atomically read-validate-update a record.
    ///
    /// The closure runs under a single write lock. Returns `None` if the
    /// record doesn't exist, or `Some` with the closure's result.
    pub fn try_update<R, E>(&self, id: &K, f: impl FnOnce(&mut T) -> Result<R, E>) -> Option<Result<R, E>> {
        self.data.write().get_mut(id).map(f)
    }

    pub fn remove(&self, id: &K) -> Option<T> {
        self.data.write().remove(id)
    }

    pub fn contains(&self, id: &K) -> bool {
        self.data.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Copy + Eq + Hash, T: Clone + Send + Sync> Default for Store<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

// -- Application State --------------------------------------------------------

/// Shared application state accessible to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub shipments: Store<ShipmentId, ShipmentRecord>,
    pub devices: Store<DeviceId, DeviceRecord>,
    pub access_requests: Store<AccessRequestId, AccessRequest>,
    pub permission_links: Store<PermissionLinkId, PermissionLinkRecord>,
    pub documents: Store<DocumentId, DocumentRecord>,
    pub imports: Store<ImportId, ImportRecord>,
    pub notes: Store<NoteId, NoteRecord>,
    pub tags: Store<TagId, TagRecord>,
    pub tracking: Store<TrackingId, TrackingRecord>,
    pub telemetry: Store<TelemetryId, TelemetryRecord>,
    pub history: Store<HistoryId, HistoryEntry>,

    pub auth: Arc<JwtVerifier>,
    pub storage: Arc<dyn ObjectStorage>,
    /// Token storage notifications must present. `None` rejects them all.
    pub events_token: Option<Arc<str>>,

    pub identity: Option<Arc<dyn IdentityGateway>>,
    pub registry: Option<Arc<dyn DeviceRegistry>>,
    pub shadow: Option<Arc<dyn ShadowPublisher>>,
    pub gtx: Option<Arc<dyn GtxValidator>>,

    /// When `Some`, mutations are written through to Postgres.
    pub db_pool: Option<PgPool>,
    /// Installed by the binary; absent in tests.
    pub metrics: Option<PrometheusHandle>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("shipments", &self.shipments.len())
            .field("devices", &self.devices.len())
            .field("access_requests", &self.access_requests.len())
            .field("identity", &self.identity.is_some())
            .field("registry", &self.registry.is_some())
            .field("shadow", &self.shadow.is_some())
            .field("gtx", &self.gtx.is_some())
            .field("db_pool", &self.db_pool.is_some())
            .finish()
    }
}

impl AppState {
    /// State with empty stores and no collaborators.
    pub fn new(auth: JwtVerifier, storage: Arc<dyn ObjectStorage>) -> Self {
        Self {
            shipments: Store::new(),
            devices: Store::new(),
            access_requests: Store::new(),
            permission_links: Store::new(),
            documents: Store::new(),
            imports: Store::new(),
            notes: Store::new(),
            tags: Store::new(),
            tracking: Store::new(),
            telemetry: Store::new(),
            history: Store::new(),
            auth: Arc::new(auth),
            storage,
            events_token: None,
            identity: None,
            registry: None,
            shadow: None,
            gtx: None,
            db_pool: None,
            metrics: None,
        }
    }

    /// State wired to the HTTP collaborators named in `config`.
    pub fn from_config(config: &AppConfig, db_pool: Option<PgPool>) -> Result<Self, ConfigError> {
        let collaborators = config.collaborators();
        let http = http_client(&collaborators)?;
        let storage = SignedUrlStorage::new(http.clone(), config.storage()?);

        let mut state = Self::new(config.jwt_verifier()?, Arc::new(storage));
        state.db_pool = db_pool;
        state.events_token = config.storage_events_token.as_deref().map(Arc::from);
        state.identity = collaborators
            .profiles_url
            .map(|url| Arc::new(ProfilesClient::new(http.clone(), url)) as Arc<dyn IdentityGateway>);
        state.registry = collaborators
            .device_registry_url
            .map(|url| Arc::new(DeviceRegistryClient::new(http.clone(), url)) as Arc<dyn DeviceRegistry>);
        state.shadow = collaborators
            .device_shadow_url
            .map(|url| Arc::new(ShadowClient::new(http.clone(), url)) as Arc<dyn ShadowPublisher>);
        state.gtx = collaborators
            .gtx_url
            .map(|url| Arc::new(GtxClient::new(http.clone(), url)) as Arc<dyn GtxValidator>);

        if state.identity.is_none() {
            tracing::warn!("PROFILES_URL not set; wallet, storage credential and device checks will answer 503");
        }
        Ok(state)
    }

    /// The identity gateway, or 503.
    pub fn identity(&self) -> Result<&Arc<dyn IdentityGateway>, AppError> {
        self.identity
            .as_ref()
            .ok_or_else(|| AppError::Upstream("identity service not configured".to_string()))
    }

    /// The device registry, or 503.
    pub fn registry(&self) -> Result<&Arc<dyn DeviceRegistry>, AppError> {
        self.registry
            .as_ref()
            .ok_or_else(|| AppError::Upstream("device registry not configured".to_string()))
    }

    /// Write `record` through to Postgres when a pool is configured.
    pub async fn persist<T: Persisted>(&self, record: &T) -> Result<(), AppError> {
        if let Some(pool) = &self.db_pool {
            if let Err(e) = crate::db::save(pool, record).await {
                tracing::error!(table = T::TABLE, id = %record.key(), error = %e, "failed to persist record");
                return Err(AppError::Internal(format!("database persist failed: {e}")));
            }
        }
        Ok(())
    }

    /// Delete a row written by [`AppState::persist`].
    pub async fn persist_delete<T: Persisted>(&self, id: Uuid) -> Result<(), AppError> {
        if let Some(pool) = &self.db_pool {
            if let Err(e) = crate::db::delete::<T>(pool, id).await {
                tracing::error!(table = T::TABLE, %id, error = %e, "failed to delete record");
                return Err(AppError::Internal(format!("database delete failed: {e}")));
            }
        }
        Ok(())
    }

    /// Store and persist a history entry, if there is one.
    pub async fn record_history(&self, entry: Option<HistoryEntry>) -> Result<(), AppError> {
        let Some(entry) = entry else {
            return Ok(());
        };
        tracing::debug!(
            record_type = ?entry.record_type,
            record_id = %entry.record_id,
            changes = entry.changes.len(),
            "recorded history"
        );
        self.history.insert(entry.id, entry.clone());
        self.persist(&entry).await
    }

    /// Hydrate in-memory stores from the database.
    ///
    /// Called once on startup when a database pool is available.
    pub async fn hydrate_from_db(&self) -> Result<(), sqlx::Error> {
        let Some(pool) = &self.db_pool else {
            return Ok(());
        };
        let started = Utc::now();

        for r in crate::db::load_all::<ShipmentRecord>(pool).await? {
            self.shipments.insert(r.id, r);
        }
        for r in crate::db::load_all::<DeviceRecord>(pool).await? {
            self.devices.insert(r.id, r);
        }
        for r in crate::db::load_all::<AccessRequest>(pool).await? {
            self.access_requests.insert(r.id, r);
        }
        for r in crate::db::load_all::<PermissionLinkRecord>(pool).await? {
            self.permission_links.insert(r.id, r);
        }
        for r in crate::db::load_all::<DocumentRecord>(pool).await? {
            self.documents.insert(r.id, r);
        }
        for r in crate::db::load_all::<ImportRecord>(pool).await? {
            self.imports.insert(r.id, r);
        }
        for r in crate::db::load_all::<NoteRecord>(pool).await? {
            self.notes.insert(r.id, r);
        }
        for r in crate::db::load_all::<TagRecord>(pool).await? {
            self.tags.insert(r.id, r);
        }
        for r in crate::db::load_all::<TrackingRecord>(pool).await? {
            self.tracking.insert(r.id, r);
        }
        for r in crate::db::load_all::<TelemetryRecord>(pool).await? {
            self.telemetry.insert(r.id, r);
        }
        for r in crate::db::load_all::<HistoryEntry>(pool).await? {
            self.history.insert(r.id, r);
        }

        tracing::info!(
            shipments = self.shipments.len(),
            devices = self.devices.len(),
            access_requests = self.access_requests.len(),
            documents = self.documents.len(),
            tracking = self.tracking.len(),
            telemetry = self.telemetry.len(),
            elapsed_ms = (Utc::now() - started).num_milliseconds(),
            "Hydrated in-memory stores from database"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        n: u32,
    }

    #[test]
    fn store_insert_get_list() {
        let store: Store<ShipmentId, Item> = Store::new();
        let id = ShipmentId::new();
        assert!(store.is_empty());
        assert!(store.insert(id, Item { n: 1 }).is_none());
        assert_eq!(store.insert(id, Item { n: 2 }), Some(Item { n: 1 }));
        assert_eq!(store.get(&id), Some(Item { n: 2 }));
        assert_eq!(store.len(), 1);
        assert!(store.contains(&id));
        assert_eq!(store.list(), vec![Item { n: 2 }]);
    }

    #[test]
    fn store_clones_share_data() {
        let store: Store<TagId, Item> = Store::new();
        let clone = store.clone();
        let id = TagId::new();
        clone.insert(id, Item { n: 3 });
        assert_eq!(store.get(&id), Some(Item { n: 3 }));
    }

    #[test]
    fn try_update_leaves_record_on_error() {
        let store: Store<NoteId, Item> = Store::new();
        let id = NoteId::new();
        store.insert(id, Item { n: 1 });

        let result: Option<Result<(), &str>> = store.try_update(&id, |item| {
            if item.n == 1 {
                return Err("rejected");
            }
            item.n = 5;
            Ok(())
        });
        assert_eq!(result, Some(Err("rejected")));
        assert_eq!(store.get(&id), Some(Item { n: 1 }));

        let missing: Option<Result<(), &str>> = store.try_update(&NoteId::new(), |_| Ok(()));
        assert!(missing.is_none());
    }

    #[test]
    fn filter_and_remove() {
        let store: Store<NoteId, Item> = Store::new();
        let a = NoteId::new();
        store.insert(a, Item { n: 1 });
        store.insert(NoteId::new(), Item { n: 2 });
        assert_eq!(store.filter(|i| i.n > 1), vec![Item { n: 2 }]);
        assert_eq!(store.remove(&a), Some(Item { n: 1 }));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn update_returns_updated_record() {
        let store: Store<NoteId, Item> = Store::new();
        let id = NoteId::new();
        store.insert(id, Item { n: 1 });
        assert_eq!(store.update(&id, |i| i.n += 1), Some(Item { n: 2 }));
        assert!(store.update(&NoteId::new(), |i| i.n += 1).is_none());
    }
}
