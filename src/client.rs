//! Cached entity client - main entry point for resource access.
//!
//! One [`EntityClient`] serves one resource collection. It owns the cache
//! store and the loading tracker; nothing else mutates them.
//!
//! # Reads
//!
//! `list` and `get_by_id` compute a [`RequestSignature`] and return a valid
//! cached response without dispatching. On a miss they dispatch and store the
//! response for the TTL chosen by the [`TtlPolicy`].
//!
//! # Mutations
//!
//! Every successful mutation clears the whole cache once (bulk calls clear
//! once per batch, not per item) and emits an [`EntityEvent`]. `update`
//! re-populates `getById_<id>` with the fresh record right after the clear.
//!
//! Mutations run on a spawned task: dropping the caller's future stops
//! observing the result but the cache is still invalidated and the loading
//! flag still cleared when the request settles.
//!
//! # Errors
//!
//! Every failure leaves as one normalized [`Error`]. Errors that call for a
//! side effect (expired session, access denied) additionally emit a
//! [`HandlingDirective`] on [`EntityClient::directives`].
//!
//! # Example
//!
//! ```ignore
//! use resource_kit::{EntityClient, ListParams, SortDirection};
//! use resource_kit::transport::HttpTransport;
//!
//! let suppliers: EntityClient<Supplier, _> =
//!     EntityClient::new(HttpTransport::new("https://api.example.com/v1"));
//!
//! let page = suppliers
//!     .list(&ListParams::new().filter("status", "active").sort_by("name", SortDirection::Asc))
//!     .await?;
//!
//! let renamed = suppliers.update(page.items[0].id, SupplierPatch::rename("Acme")).await?;
//! ```

use crate::config::ClientConfig;
use crate::entity::{Entity, Page};
use crate::error::{Error, Result};
use crate::key::{ListParams, OperationKey, RequestSignature};
use crate::loading::LoadingTracker;
use crate::normalizer::{directive_for, normalize, HandlingDirective, RawFailure};
use crate::observability::{ClientMetrics, NoOpMetrics, TtlPolicy};
use crate::signal::{EventBus, Subscription};
use crate::store::{CacheStore, Clock, StoreStats, SystemClock};
use crate::strategy::ReadStrategy;
use crate::transport::{
    Envelope, ExportFormat, ImportFile, ImportReport, ListEnvelope, Transport, TransportResult,
};
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

const LIST: &str = "list";
const GET_BY_ID: &str = "getById";

/// Change notification emitted after a successful mutation.
#[derive(Debug, Clone)]
pub enum EntityEvent<T: Entity> {
    Created(T),
    Updated(T),
    Deleted(T::Id),
    CreatedMany(Vec<T>),
    UpdatedMany(Vec<T>),
    DeletedMany { ids: Vec<T::Id>, count: u64 },
    Imported(ImportReport),
}

/// Cached read payload.
#[derive(Clone)]
enum Cached<T> {
    Page(Page<T>),
    Entity(T),
}

/// Unwraps a transport response into what the caller receives.
trait Payload {
    type Data;

    fn into_payload(self) -> TransportResult<Self::Data>;
}

impl<D> Payload for Envelope<D> {
    type Data = D;

    fn into_payload(self) -> TransportResult<D> {
        self.into_data()
    }
}

impl<T> Payload for ListEnvelope<T> {
    type Data = Page<T>;

    fn into_payload(self) -> TransportResult<Page<T>> {
        Ok(Page::from(self))
    }
}

impl Payload for Vec<u8> {
    type Data = Vec<u8>;

    fn into_payload(self) -> TransportResult<Vec<u8>> {
        Ok(self)
    }
}

struct ClientInner<T: Entity, Tr> {
    transport: Tr,
    store: CacheStore<Cached<T>>,
    loading: Arc<LoadingTracker>,
    events: EventBus<EntityEvent<T>>,
    directives: EventBus<HandlingDirective>,
    metrics: Box<dyn ClientMetrics>,
    ttl_policy: TtlPolicy,
    config: ClientConfig,
}

impl<T: Entity, Tr: Transport<T>> ClientInner<T, Tr> {
    /// Cached payload for `signature`, honoring the strategy.
    fn lookup(&self, signature: &RequestSignature, strategy: ReadStrategy) -> Option<Cached<T>> {
        if !self.config.cache_enabled {
            return None;
        }
        match strategy {
            ReadStrategy::Refresh => {
                let hit = self.store.get(signature.as_str());
                match hit {
                    Some(_) => self.metrics.record_hit(signature.as_str()),
                    None => self.metrics.record_miss(signature.as_str()),
                }
                hit
            }
            ReadStrategy::Invalidate => {
                self.store.remove(signature.as_str());
                self.metrics.record_miss(signature.as_str());
                None
            }
            ReadStrategy::Bypass => {
                debug!("Bypassing cache for {}", signature);
                None
            }
        }
    }

    fn remember(&self, signature: &RequestSignature, operation: &str, payload: Cached<T>) {
        if self.config.cache_enabled {
            self.store.insert(
                signature.as_str(),
                payload,
                self.ttl_policy.ttl_for(operation),
            );
        }
    }

    /// Clear the whole cache after a mutation.
    fn invalidate(&self, reason: &OperationKey) {
        let removed = self.store.clear();
        self.metrics
            .record_invalidation(reason.as_str(), removed);
    }

    /// Run one transport call and unwrap its payload.
    async fn dispatch<P, F>(&self, key: &OperationKey, operation: &str, call: F) -> Result<P::Data>
    where
        P: Payload,
        F: Future<Output = TransportResult<P>>,
    {
        let timer = Instant::now();
        let outcome = call.await.and_then(Payload::into_payload);
        self.metrics
            .record_dispatch(operation, timer.elapsed(), outcome.is_ok());
        outcome.map_err(|failure| self.fail(key, normalize(failure)))
    }

    /// Record a failure and emit its directive, if any.
    fn fail(&self, key: &OperationKey, error: Error) -> Error {
        self.metrics.record_error(key.as_str(), &error);
        if let Some(directive) = directive_for(&error) {
            warn!("Handling directive for {}: {:?}", key, directive);
            self.directives.emit(directive);
        }
        error
    }
}

/// Typed, cached CRUD client for one resource collection.
///
/// Cheap to clone; clones share the cache, loading flags and event streams.
pub struct EntityClient<T: Entity, Tr> {
    inner: Arc<ClientInner<T, Tr>>,
}

impl<T: Entity, Tr> Clone for EntityClient<T, Tr> {
    fn clone(&self) -> Self {
        EntityClient {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Entity, Tr> fmt::Debug for EntityClient<T, Tr> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityClient")
            .field("resource", &T::resource())
            .field("config", &self.inner.config)
            .field("cached", &self.inner.store.len())
            .finish()
    }
}

impl<T: Entity, Tr: Transport<T>> EntityClient<T, Tr> {
    /// Client with default configuration, 5-minute TTL and no metrics.
    pub fn new(transport: Tr) -> Self {
        Self::builder(transport).build()
    }

    pub fn builder(transport: Tr) -> ClientBuilder<T, Tr> {
        ClientBuilder::new(transport)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// One page of the collection, cache-first.
    ///
    /// # Errors
    ///
    /// Returns the normalized transport failure; nothing is cached then.
    pub async fn list(&self, params: &ListParams) -> Result<Page<T>> {
        self.list_with(params, ReadStrategy::default()).await
    }

    pub async fn list_with(&self, params: &ListParams, strategy: ReadStrategy) -> Result<Page<T>> {
        let key = OperationKey::list();
        let _guard = self.inner.loading.begin(key.clone());
        let signature = RequestSignature::list(params);

        if let Some(Cached::Page(page)) = self.inner.lookup(&signature, strategy) {
            return Ok(page);
        }

        let page = self
            .inner
            .dispatch(&key, LIST, self.inner.transport.list(params))
            .await?;
        self.inner
            .remember(&signature, LIST, Cached::Page(page.clone()));
        Ok(page)
    }

    /// One record by id, cache-first under `getById_<id>`.
    ///
    /// # Errors
    ///
    /// Returns the normalized transport failure, e.g. kind `NotFound` for 404.
    pub async fn get_by_id(&self, id: &T::Id) -> Result<T> {
        self.get_by_id_with(id, ReadStrategy::default()).await
    }

    pub async fn get_by_id_with(&self, id: &T::Id, strategy: ReadStrategy) -> Result<T> {
        let key = OperationKey::get_by_id(id);
        let _guard = self.inner.loading.begin(key.clone());
        let signature = RequestSignature::get_by_id(id);

        if let Some(Cached::Entity(entity)) = self.inner.lookup(&signature, strategy) {
            return Ok(entity);
        }

        let entity = self
            .inner
            .dispatch(&key, GET_BY_ID, self.inner.transport.get(id))
            .await?;
        self.inner
            .remember(&signature, GET_BY_ID, Cached::Entity(entity.clone()));
        Ok(entity)
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    pub async fn create(&self, patch: T::Patch) -> Result<T> {
        let key = OperationKey::create();
        self.mutate(key, move |inner, key| async move {
            let created = inner
                .dispatch(&key, "create", inner.transport.create(&patch))
                .await?;
            inner.invalidate(&key);
            info!("✓ Created {} {}", T::resource(), created.id());
            inner.events.emit(EntityEvent::Created(created.clone()));
            Ok(created)
        })
        .await
    }

    /// Update one record and re-populate its `getById` entry.
    pub async fn update(&self, id: T::Id, patch: T::Patch) -> Result<T> {
        let key = OperationKey::update(&id);
        self.mutate(key, move |inner, key| async move {
            let updated = inner
                .dispatch(&key, "update", inner.transport.update(&id, &patch))
                .await?;
            inner.invalidate(&key);
            inner.remember(
                &RequestSignature::get_by_id(&id),
                GET_BY_ID,
                Cached::Entity(updated.clone()),
            );
            info!("✓ Updated {} {}", T::resource(), id);
            inner.events.emit(EntityEvent::Updated(updated.clone()));
            Ok(updated)
        })
        .await
    }

    /// Delete one record. The clear also drops its `getById` entry.
    pub async fn delete(&self, id: T::Id) -> Result<()> {
        let key = OperationKey::delete(&id);
        self.mutate(key, move |inner, key| async move {
            inner
                .dispatch(&key, "delete", inner.transport.delete(&id))
                .await?;
            inner.invalidate(&key);
            info!("✓ Deleted {} {}", T::resource(), id);
            inner.events.emit(EntityEvent::Deleted(id));
            Ok(())
        })
        .await
    }

    pub async fn create_many(&self, patches: Vec<T::Patch>) -> Result<Vec<T>> {
        let key = OperationKey::create_many();
        self.mutate(key, move |inner, key| async move {
            let created = inner
                .dispatch(&key, "createMany", inner.transport.create_many(&patches))
                .await?;
            inner.invalidate(&key);
            info!("✓ Created {} {}", created.len(), T::resource());
            inner.events.emit(EntityEvent::CreatedMany(created.clone()));
            Ok(created)
        })
        .await
    }

    /// Update a batch, then re-populate each updated record's `getById` entry.
    pub async fn update_many(&self, updates: Vec<(T::Id, T::Patch)>) -> Result<Vec<T>> {
        let key = OperationKey::update_many();
        self.mutate(key, move |inner, key| async move {
            let updated = inner
                .dispatch(&key, "updateMany", inner.transport.update_many(&updates))
                .await?;
            inner.invalidate(&key);
            for entity in &updated {
                inner.remember(
                    &RequestSignature::get_by_id(&entity.id()),
                    GET_BY_ID,
                    Cached::Entity(entity.clone()),
                );
            }
            info!("✓ Updated {} {}", updated.len(), T::resource());
            inner.events.emit(EntityEvent::UpdatedMany(updated.clone()));
            Ok(updated)
        })
        .await
    }

    /// Delete a batch, returning how many records the backend removed.
    pub async fn delete_many(&self, ids: Vec<T::Id>) -> Result<u64> {
        let key = OperationKey::delete_many();
        self.mutate(key, move |inner, key| async move {
            let count = inner
                .dispatch(&key, "deleteMany", inner.transport.delete_many(&ids))
                .await?;
            inner.invalidate(&key);
            info!("✓ Deleted {} {}", count, T::resource());
            inner.events.emit(EntityEvent::DeletedMany { ids, count });
            Ok(count)
        })
        .await
    }

    /// Upload a file for bulk import. Invalidates the cache on success.
    pub async fn import(&self, file: ImportFile) -> Result<ImportReport> {
        let key = OperationKey::import();
        self.mutate(key, move |inner, key| async move {
            let report = inner
                .dispatch(&key, "import", inner.transport.import(&file))
                .await?;
            inner.invalidate(&key);
            info!(
                "✓ Imported {} {} from {} ({} rejected)",
                report.imported_count,
                T::resource(),
                file.name,
                report.errors.len()
            );
            inner.events.emit(EntityEvent::Imported(report.clone()));
            Ok(report)
        })
        .await
    }

    /// Download the filtered collection. Never cached.
    pub async fn export(&self, format: ExportFormat, params: &ListParams) -> Result<Vec<u8>> {
        let key = OperationKey::export();
        let _guard = self.inner.loading.begin(key.clone());
        self.inner
            .dispatch(&key, "export", self.inner.transport.export(format, params))
            .await
    }

    /// Run a mutation on its own task so it settles even if the caller
    /// stops waiting. The task owns the loading guard.
    async fn mutate<R, F, Fut>(&self, key: OperationKey, work: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(Arc<ClientInner<T, Tr>>, OperationKey) -> Fut,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        let guard = self.inner.loading.begin(key.clone());
        let task = work(Arc::clone(&self.inner), key.clone());
        let handle = tokio::spawn(async move {
            let _guard = guard;
            task.await
        });

        match handle.await {
            Ok(result) => result,
            Err(join_error) => {
                let failure = RawFailure::Exception(format!("{} task failed: {}", key, join_error));
                Err(self.inner.fail(&key, normalize(failure)))
            }
        }
    }

    // ------------------------------------------------------------------
    // Observation
    // ------------------------------------------------------------------

    /// Flag for one operation: current value first, then every flip.
    pub fn is_loading(&self, key: &OperationKey) -> Subscription<bool> {
        self.inner.loading.subscribe(key)
    }

    /// `true` while any operation of this client is in flight.
    pub fn is_any_loading(&self) -> Subscription<bool> {
        self.inner.loading.subscribe_any()
    }

    pub fn loading(&self, key: &OperationKey) -> bool {
        self.inner.loading.is_loading(key)
    }

    pub fn any_loading(&self) -> bool {
        self.inner.loading.any_loading()
    }

    pub fn active_operations(&self) -> Vec<OperationKey> {
        self.inner.loading.active_keys()
    }

    /// Change notifications for successful mutations.
    pub fn events(&self) -> Subscription<EntityEvent<T>> {
        self.inner.events.subscribe()
    }

    /// Side effects requested by failed operations.
    pub fn directives(&self) -> Subscription<HandlingDirective> {
        self.inner.directives.subscribe()
    }

    pub fn cache_stats(&self) -> StoreStats {
        self.inner.store.stats()
    }

    /// Whether a valid entry exists for `signature`.
    pub fn is_cached(&self, signature: &RequestSignature) -> bool {
        self.inner.store.contains(signature.as_str())
    }

    pub fn purge_expired(&self) -> usize {
        self.inner.store.purge_expired()
    }

    /// Drop every cached read, returning how many entries were removed.
    pub fn invalidate_all(&self) -> usize {
        let removed = self.inner.store.clear();
        warn!(
            "⚠ {} cache CLEAR_ALL executed - {} entries dropped",
            T::resource(),
            removed
        );
        removed
    }

    pub fn transport(&self) -> &Tr {
        &self.inner.transport
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }
}

/// Assembles an [`EntityClient`].
///
/// ```ignore
/// let client = EntityClient::builder(transport)
///     .config(ClientConfig::default().with_max_entries(200))
///     .ttl_policy(TtlPolicy::Fixed(Duration::from_secs(60)))
///     .metrics(Box::new(DashboardMetrics))
///     .build();
/// ```
pub struct ClientBuilder<T: Entity, Tr> {
    transport: Tr,
    config: ClientConfig,
    ttl_policy: Option<TtlPolicy>,
    metrics: Box<dyn ClientMetrics>,
    clock: Arc<dyn Clock>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity, Tr: Transport<T>> ClientBuilder<T, Tr> {
    pub fn new(transport: Tr) -> Self {
        ClientBuilder {
            transport,
            config: ClientConfig::default(),
            ttl_policy: None,
            metrics: Box::new(NoOpMetrics),
            clock: Arc::new(SystemClock),
            _entity: PhantomData,
        }
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Overrides `config.default_ttl`.
    pub fn ttl_policy(mut self, policy: TtlPolicy) -> Self {
        self.ttl_policy = Some(policy);
        self
    }

    pub fn metrics(mut self, metrics: Box<dyn ClientMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Clock used for TTL checks.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> EntityClient<T, Tr> {
        let ttl_policy = self
            .ttl_policy
            .unwrap_or(TtlPolicy::Fixed(self.config.default_ttl));
        debug!(
            "Building {} client (cache: {}, max entries: {}, ttl: {:?})",
            T::resource(),
            self.config.cache_enabled,
            self.config.max_entries,
            ttl_policy
        );
        EntityClient {
            inner: Arc::new(ClientInner {
                transport: self.transport,
                store: CacheStore::new(self.clock, self.config.max_entries),
                loading: Arc::new(LoadingTracker::new()),
                events: EventBus::new(),
                directives: EventBus::new(),
                metrics: self.metrics,
                ttl_policy,
                config: self.config,
            }),
        }
    }
}
