use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use futures::stream::{self, StreamExt};
use log::{debug, warn};
use serde_json::Value;

use crate::collection::Collection;
use crate::diff::{ChangeDescriptor, ChangeDiffEngine};
use crate::error::ClientError;
use crate::object_id::{ConfigurationError, Fingerprint, ObjectIdGenerator};
use crate::query::{FindResult, LocalQueryExecutor, SortSpec};
use crate::queue::{QueueError, ResponseHandle};
use crate::realtime::path_spec::camelize;
use crate::realtime::{
    apply_payload, payload_route, ActivityEvent, ConnectionState, EventDisposition,
    RealtimeMessage, RealtimeReconciler, SequenceError,
};
use crate::schema::{SchemaRegistry, ValidationResult};
use crate::service::DataService;
use crate::storage::ObjectStore;
use crate::transport::{HttpMethod, HttpRequest, HttpTransport, RequestContext, UrlBuilder};

const STORE_NAME: &str = "mooring";
const STORE_VERSION: u32 = 1;

/// How initial full-collection loads are primed.
#[derive(Debug, Clone)]
pub struct LoadConfig {
    /// Maximum collections loading concurrently
    pub concurrency: usize,
    /// Collections to prime at startup; empty means all of them
    pub load_on_startup: Vec<String>,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            load_on_startup: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: String,
    pub api_path: Option<String>,
    pub token: String,
    /// Local user identity, compared against realtime events for self-echo
    /// suppression
    pub user_id: Option<String>,
    /// Stable device fingerprint; required before any object id can be
    /// generated
    pub fingerprint: Option<String>,
    pub load: LoadConfig,
}

/// Snapshot of the priming load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadProgress {
    pub current: usize,
    pub total: usize,
    pub loaded: bool,
}

/// What became of one inbound realtime message.
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeOutcome {
    /// Not a db-activity event, or no local collection for its route
    Ignored,
    /// Held back until resync (paused intake after a reconnect)
    Buffered,
    /// This client's own write; cursor advanced, nothing applied
    SelfEcho,
    /// Applied to the target collection
    Applied,
    /// Dropped: sequence continuity broke and the stream is now desynced
    OutOfSequence(SequenceError),
}

/// The synchronization client: owns every collection's pipeline, the realtime
/// reconciler and the query executor, and wires them to the composed-in
/// transport and persistent store.
pub struct SyncClient<T: HttpTransport> {
    transport: T,
    ctx: RequestContext,
    load: LoadConfig,
    ids: Rc<RefCell<ObjectIdGenerator>>,
    registry: Option<Rc<SchemaRegistry>>,
    services: HashMap<String, DataService>,
    reconciler: RealtimeReconciler,
    executor: LocalQueryExecutor,
    progress: LoadProgress,
    store: Option<Box<dyn ObjectStore>>,
}

impl<T: HttpTransport> SyncClient<T> {
    /// Fails fast when no device fingerprint is configured. Missing identity
    /// is the one fatal startup error in the system.
    pub fn new(config: ClientConfig, transport: T) -> Result<Self, ConfigurationError> {
        let fingerprint = config
            .fingerprint
            .as_deref()
            .ok_or(ConfigurationError::MissingFingerprint)?;
        let identity = Fingerprint::from_device(fingerprint);

        let urls = UrlBuilder::new(&config.endpoint, config.api_path.as_deref());
        Ok(Self {
            transport,
            ctx: RequestContext::new(urls, &config.token),
            load: config.load,
            ids: Rc::new(RefCell::new(ObjectIdGenerator::new(identity))),
            registry: None,
            services: HashMap::new(),
            reconciler: RealtimeReconciler::new(config.user_id.as_deref()),
            executor: LocalQueryExecutor::new(None),
            progress: LoadProgress::default(),
            store: None,
        })
    }

    pub fn with_store(mut self, store: Box<dyn ObjectStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    // Schema and collection registry

    /// Fetch the application schema document and build collections from it.
    pub async fn load_schema(&mut self) -> Result<(), ClientError> {
        let request = HttpRequest {
            method: HttpMethod::Get,
            url: self.ctx.urls.app_schema(),
            params: self.ctx.params(),
            body: None,
        };
        let document = self.transport.send(request).await?;
        self.apply_schema(document)
    }

    /// Build one data service per collection schema. Collection keys are the
    /// lower-camel-cased schema names; routes keep the raw names.
    pub fn apply_schema(&mut self, document: Value) -> Result<(), ClientError> {
        let registry = Rc::new(SchemaRegistry::from_value(document)?);

        self.services.clear();
        for name in registry.collection_names() {
            let diff = ChangeDiffEngine::new(self.ids.clone(), Some(registry.clone()));
            self.services
                .insert(camelize(name), DataService::new(name, diff));
        }
        self.executor = LocalQueryExecutor::new(Some(registry.clone()));
        self.registry = Some(registry);
        self.progress = LoadProgress {
            current: 0,
            total: self.services.len(),
            loaded: false,
        };
        Ok(())
    }

    /// Register a collection with no remote schema. It never triggers search
    /// round-trips; queries against it are answered locally.
    pub fn register_collection(&mut self, name: &str) {
        let diff = ChangeDiffEngine::new(self.ids.clone(), self.registry.clone());
        self.services
            .insert(camelize(name), DataService::new(name, diff));
    }

    pub fn collection_keys(&self) -> Vec<&str> {
        self.services.keys().map(String::as_str).collect()
    }

    pub fn service(&self, key: &str) -> Option<&DataService> {
        self.services.get(key)
    }

    pub fn service_mut(&mut self, key: &str) -> Option<&mut DataService> {
        self.services.get_mut(key)
    }

    pub fn collection(&self, key: &str) -> Option<&Collection> {
        self.services.get(key).map(DataService::collection)
    }

    pub fn progress(&self) -> LoadProgress {
        self.progress
    }

    // Local mutation intake

    /// Feed one mutation descriptor from the binding wrapper. Unsupported
    /// diff shapes are logged and dropped rather than corrupting the stream.
    pub fn observe(
        &mut self,
        key: &str,
        change: &ChangeDescriptor,
    ) -> Result<Option<ResponseHandle>, ClientError> {
        let service = self
            .services
            .get_mut(key)
            .ok_or_else(|| ClientError::UnknownCollection(key.to_string()))?;
        match service.observe(change) {
            Ok(handle) => Ok(handle),
            Err(err) => {
                warn!("dropping unsupported mutation on `{key}`: {err}");
                Ok(None)
            }
        }
    }

    /// Validated insert: schema violations are reported to the caller and
    /// nothing reaches the queue or the server.
    pub fn insert_entity(
        &mut self,
        key: &str,
        entity: Value,
    ) -> Result<Option<ResponseHandle>, ClientError> {
        let service = self
            .services
            .get_mut(key)
            .ok_or_else(|| ClientError::UnknownCollection(key.to_string()))?;
        let route = service.collection().route().to_string();

        if let Some(registry) = &self.registry {
            if registry.has(&route) {
                let result = registry.validate(&route, &entity)?;
                if !result.is_valid {
                    return Err(ClientError::Validation {
                        collection: route,
                        result,
                    });
                }
            }
        }

        match service.insert(entity) {
            Ok(handle) => Ok(handle),
            Err(err) => {
                warn!("dropping unsupported insert on `{key}`: {err}");
                Ok(None)
            }
        }
    }

    pub fn remove_entity(
        &mut self,
        key: &str,
        entity_id: &str,
    ) -> Result<Option<ResponseHandle>, ClientError> {
        let service = self
            .services
            .get_mut(key)
            .ok_or_else(|| ClientError::UnknownCollection(key.to_string()))?;
        match service.remove(entity_id) {
            Ok(handle) => Ok(handle),
            Err(err) => {
                warn!("dropping unsupported removal on `{key}`: {err}");
                Ok(None)
            }
        }
    }

    /// Default-valued entity body for a collection, from its schema.
    pub fn create_default(&self, key: &str) -> Result<Value, ClientError> {
        let route = self.route_of(key)?;
        let registry = self
            .registry
            .as_ref()
            .ok_or_else(|| ClientError::UnknownCollection(key.to_string()))?;
        Ok(registry.create_default(&route)?)
    }

    pub fn validate(&self, key: &str, entity: &Value) -> Result<ValidationResult, ClientError> {
        let route = self.route_of(key)?;
        let registry = self
            .registry
            .as_ref()
            .ok_or_else(|| ClientError::UnknownCollection(key.to_string()))?;
        Ok(registry.validate(&route, entity)?)
    }

    // Dispatch

    /// Drive one collection's queue until it drains or fails.
    pub async fn sync(&mut self, key: &str) -> Result<(), ClientError> {
        let Self {
            services,
            ctx,
            transport,
            ..
        } = self;
        let service = services
            .get_mut(key)
            .ok_or_else(|| ClientError::UnknownCollection(key.to_string()))?;
        service.flush(ctx, transport).await?;
        Ok(())
    }

    /// Drive every queue. A failing collection does not halt the others;
    /// failures are returned per collection.
    pub async fn sync_all(&mut self) -> Vec<(String, QueueError)> {
        let Self {
            services,
            ctx,
            transport,
            ..
        } = self;
        let mut failures = Vec::new();
        for (key, service) in services.iter_mut() {
            if let Err(err) = service.flush(ctx, transport).await {
                warn!("queue for `{key}` halted: {err}");
                failures.push((key.clone(), err));
            }
        }
        failures
    }

    /// Prime initial full-collection loads, bounded by the configured
    /// concurrency window. Cross-collection order is unspecified; within a
    /// collection the queue discipline still holds.
    pub async fn prime(&mut self) -> Vec<(String, QueueError)> {
        let Self {
            services,
            ctx,
            transport,
            load,
            progress,
            executor,
            ..
        } = self;
        // Shared reborrows: every in-flight load future needs these at once.
        let ctx: &RequestContext = ctx;
        let transport: &T = transport;

        let selected: Vec<String> = services
            .keys()
            .filter(|key| {
                load.load_on_startup.is_empty() || load.load_on_startup.contains(*key)
            })
            .cloned()
            .collect();
        *progress = LoadProgress {
            current: 0,
            total: selected.len(),
            loaded: false,
        };

        let tasks = services
            .iter_mut()
            .filter(|(key, _)| selected.contains(*key))
            .map(|(key, service)| {
                let _handle = service.load();
                async move {
                    let result = service.flush(ctx, transport).await;
                    (key.clone(), result)
                }
            });

        let mut failures = Vec::new();
        let mut completions = stream::iter(tasks).buffer_unordered(load.concurrency.max(1));
        while let Some((key, result)) = completions.next().await {
            progress.current += 1;
            match result {
                Ok(()) => executor.record_load_all(&key),
                Err(err) => {
                    warn!("priming load for `{key}` failed: {err}");
                    failures.push((key, err));
                }
            }
        }

        progress.loaded = failures.is_empty();
        failures
    }

    // Realtime intake

    pub fn realtime_connected(&mut self) {
        self.reconciler.on_connected();
    }

    pub fn realtime_disconnected(&mut self) {
        self.reconciler.on_disconnected();
    }

    pub fn realtime_reconnected(&mut self) {
        self.reconciler.on_reconnected();
    }

    pub fn realtime_state(&self) -> ConnectionState {
        self.reconciler.state()
    }

    pub fn synced(&self) -> bool {
        self.reconciler.is_synced()
    }

    /// Feed one raw message from the realtime transport.
    pub fn handle_realtime(&mut self, message: Value) -> Result<RealtimeOutcome, ClientError> {
        let message = RealtimeMessage::from_value(message)?;
        if !message.is_db_activity() {
            return Ok(RealtimeOutcome::Ignored);
        }
        let event = message.into_activity()?;
        let Self {
            services,
            reconciler,
            ..
        } = self;
        Ok(dispatch_event(services, reconciler, event))
    }

    /// Explicit resynchronization after a reconnect: reload authoritative
    /// snapshots for every loaded collection, then drain the buffered events
    /// in order through the normal sequence discipline. Never automatic; a
    /// missed state-clearing delete must not be silently skipped.
    pub async fn resync(&mut self) -> Result<(), ClientError> {
        let Self {
            services,
            ctx,
            transport,
            reconciler,
            ..
        } = self;

        for (key, service) in services.iter_mut() {
            if !service.collection().loaded() {
                continue;
            }
            let _handle = service.load();
            if let Err(err) = service.flush(ctx, transport).await {
                warn!("snapshot reload for `{key}` failed during resync: {err}");
            }
        }

        for event in reconciler.begin_resync() {
            dispatch_event(services, reconciler, event);
        }
        Ok(())
    }

    // Queries

    /// Answer a find request. Remote-sourced collections first confirm the
    /// superset server-side (search) and fetch the authoritative total
    /// (count); the page itself is always computed locally. Identical
    /// queries within a session skip the round-trip via a content hash.
    pub async fn find(
        &mut self,
        key: &str,
        query: &Value,
        limit: u64,
        skip: u64,
        sort: Option<SortSpec>,
    ) -> Result<FindResult, ClientError> {
        let route = self.route_of(key)?;

        let mut server_total = None;
        if self.executor.is_remote_sourced(&route) && self.executor.should_search(&route, query) {
            let (search_handle, count_handle) = {
                let service = self
                    .services
                    .get_mut(key)
                    .ok_or_else(|| ClientError::UnknownCollection(key.to_string()))?;
                (
                    service.search(query, limit, skip, sort.as_ref()),
                    service.count(query),
                )
            };
            self.sync(key).await?;
            search_handle.response().await?;
            let count = count_handle.response().await?;
            server_total = count
                .as_u64()
                .or_else(|| count.get("count").and_then(Value::as_u64));
            self.executor.record_search(&route, query);
        }

        let service = self
            .services
            .get(key)
            .ok_or_else(|| ClientError::UnknownCollection(key.to_string()))?;
        Ok(self.executor.run_local(
            service.collection().entities(),
            query,
            limit,
            skip,
            sort.as_ref(),
            server_total,
        )?)
    }

    /// Fetch one entity, locally when present, else via a `get` round-trip.
    pub async fn get_entity(&mut self, key: &str, entity_id: &str) -> Result<Value, ClientError> {
        {
            let service = self
                .services
                .get(key)
                .ok_or_else(|| ClientError::UnknownCollection(key.to_string()))?;
            if let Some(entity) = service.collection().find(entity_id) {
                return Ok(entity.value().clone());
            }
        }

        let handle = self
            .services
            .get_mut(key)
            .ok_or_else(|| ClientError::UnknownCollection(key.to_string()))?
            .fetch_entity(entity_id);
        self.sync(key).await?;
        Ok(handle.response().await?)
    }

    /// Load a whole collection once per session.
    pub async fn load_collection(&mut self, key: &str) -> Result<(), ClientError> {
        if !self.executor.should_load_all(key) {
            return Ok(());
        }
        let _handle = self
            .services
            .get_mut(key)
            .ok_or_else(|| ClientError::UnknownCollection(key.to_string()))?
            .load();
        self.sync(key).await?;
        self.executor.record_load_all(key);
        Ok(())
    }

    // Persistent store plumbing

    /// Initialise the composed-in store with every known collection.
    pub async fn init_store(&self) -> Result<(), ClientError> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let keys: Vec<String> = self.services.keys().cloned().collect();
        store.init(STORE_NAME, STORE_VERSION, &keys).await?;
        Ok(())
    }

    /// Persist every collection's current entities.
    pub async fn save_collections(&self) -> Result<(), ClientError> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        for (key, service) in &self.services {
            let items: Vec<Value> = service
                .collection()
                .entities()
                .iter()
                .map(|entity| entity.to_wire())
                .collect();
            store.bulk_write(key, items).await?;
        }
        Ok(())
    }

    pub async fn clear_collections(&self) -> Result<(), ClientError> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        for key in self.services.keys() {
            store.clear(key).await?;
        }
        Ok(())
    }

    /// Seed collections from the local store. A whole-array refresh: nothing
    /// here is diffed back toward the server.
    pub async fn load_local_collections(&mut self) -> Result<(), ClientError> {
        let Self {
            services, store, ..
        } = self;
        let Some(store) = store else {
            return Ok(());
        };
        for (key, service) in services.iter_mut() {
            let items = store.read_all(key).await?;
            let entities = items
                .into_iter()
                .filter_map(crate::collection::Entity::from_value)
                .collect();
            service.collection_mut().replace_all(entities);
        }
        Ok(())
    }

    fn route_of(&self, key: &str) -> Result<String, ClientError> {
        self.services
            .get(key)
            .map(|service| service.collection().route().to_string())
            .ok_or_else(|| ClientError::UnknownCollection(key.to_string()))
    }
}

/// Sequence-check one event and apply it to its target collection.
fn dispatch_event(
    services: &mut HashMap<String, DataService>,
    reconciler: &mut RealtimeReconciler,
    event: ActivityEvent,
) -> RealtimeOutcome {
    match reconciler.handle_event(event) {
        EventDisposition::Buffered => RealtimeOutcome::Buffered,
        EventDisposition::SelfEcho => RealtimeOutcome::SelfEcho,
        EventDisposition::Rejected(signal) => RealtimeOutcome::OutOfSequence(signal),
        EventDisposition::Apply(payload) => {
            let Some(route) = payload_route(&payload) else {
                return RealtimeOutcome::Ignored;
            };
            let Some(service) = services.get_mut(&route) else {
                debug!("no data service for `{route}`; event not applied");
                return RealtimeOutcome::Ignored;
            };
            if let Err(err) = apply_payload(&payload, service.collection_mut()) {
                warn!("realtime patch on `{route}` failed: {err}");
            }
            RealtimeOutcome::Applied
        }
    }
}
