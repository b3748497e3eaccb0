use std::{
    collections::{HashMap, VecDeque},
    fmt,
    sync::Arc,
};

use cache_config::CacheConfig;
use serde_json::Value;

use crate::{
    artifact::{SelectionSet, UpdateMode},
    error::CacheError,
    gc::GarbageCollector,
    identity::{Identifier, RecordId},
    key::{FieldKey, SlotSet, Variables},
    lists::ListRegistry,
    read::{self, ReadOutput, ReadRequest},
    scalars::{ScalarHandler, ScalarRegistry},
    stale::StaleTracker,
    store::{FieldValue, LayerTarget, MutationId, RecordStore, Snapshot},
    subscription::{ObserverId, SubscriptionManager},
    write::{self, WriteContext, WriteOutput, WriteRequest},
};

/// Writes queued by callbacks are applied in follow-up passes, up to this many per top level change.
pub const MAX_NOTIFICATION_PASSES: usize = 64;

type Callback = Box<dyn FnMut(&ReadOutput, &mut Deferred)>;

/// What an observer reads every time one of the slots it depends on changes.
#[derive(Debug, Clone)]
pub struct ObserverSpec {
    pub selection: Arc<SelectionSet>,
    pub parent: RecordId,
    pub variables: Variables,
    pub loading: bool,
}

impl ObserverSpec {
    pub fn new(selection: Arc<SelectionSet>, variables: Variables) -> Self {
        ObserverSpec {
            selection,
            parent: RecordId::root(),
            variables,
            loading: false,
        }
    }

    #[must_use]
    pub fn with_parent(mut self, parent: RecordId) -> Self {
        self.parent = parent;
        self
    }

    fn request(&self) -> ReadRequest<'_> {
        ReadRequest::new(&self.selection, &self.parent, &self.variables).loading(self.loading)
    }
}

#[derive(Debug)]
pub struct Subscription {
    pub id: ObserverId,
    /// The data as of subscribing.
    pub initial: ReadOutput,
}

/// Cache changes requested from within a notification callback.
///
/// Callbacks cannot reach the cache while it notifies, the queued work runs once the current
/// notification pass is over.
#[derive(Default)]
pub struct Deferred {
    writes: Vec<PendingWrite>,
    unsubscribes: Vec<ObserverId>,
    subscribes: Vec<(ObserverSpec, Callback)>,
}

impl Deferred {
    pub fn write(&mut self, write: PendingWrite) {
        self.writes.push(write);
    }

    pub fn unsubscribe(&mut self, observer: ObserverId) {
        self.unsubscribes.push(observer);
    }

    /// Adds an observer once the pass is over. Its callback receives the initial read right away.
    pub fn subscribe(&mut self, spec: ObserverSpec, callback: impl FnMut(&ReadOutput, &mut Deferred) + 'static) {
        let callback: Callback = Box::new(callback);
        self.subscribes.push((spec, callback));
    }

    fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.unsubscribes.is_empty() && self.subscribes.is_empty()
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("writes", &self.writes)
            .field("unsubscribes", &self.unsubscribes)
            .field("subscribes", &self.subscribes.len())
            .finish()
    }
}

/// An owned [`WriteRequest`].
#[derive(Debug, Clone)]
pub struct PendingWrite {
    pub selection: Arc<SelectionSet>,
    pub data: Value,
    pub parent: RecordId,
    pub variables: Variables,
    pub apply_updates: Vec<UpdateMode>,
}

impl PendingWrite {
    pub fn new(selection: Arc<SelectionSet>, data: Value, variables: Variables) -> Self {
        PendingWrite {
            selection,
            data,
            parent: RecordId::root(),
            variables,
            apply_updates: Vec::new(),
        }
    }

    fn request(&self) -> WriteRequest<'_> {
        WriteRequest::new(&self.selection, &self.data, &self.parent, &self.variables).apply_updates(&self.apply_updates)
    }
}

struct Observer {
    spec: ObserverSpec,
    callback: Callback,
}

/// A normalized cache instance: the record store and everything keeping its observers up to date.
pub struct Cache {
    identifier: Identifier,
    scalars: ScalarRegistry,
    store: RecordStore,
    lists: ListRegistry,
    subscriptions: SubscriptionManager,
    observers: HashMap<ObserverId, Observer>,
    stale: StaleTracker,
    gc: GarbageCollector,
}

impl Default for Cache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl Cache {
    pub fn new(config: CacheConfig) -> Self {
        let gc = GarbageCollector::new(config.default_lifetime);

        Cache {
            identifier: Identifier::new(Arc::new(config)),
            scalars: ScalarRegistry::default(),
            store: RecordStore::new(),
            lists: ListRegistry::default(),
            subscriptions: SubscriptionManager::new(),
            observers: HashMap::new(),
            stale: StaleTracker::default(),
            gc,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        self.identifier.config()
    }

    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn lists(&self) -> &ListRegistry {
        &self.lists
    }

    pub fn register_scalar(&mut self, type_name: impl Into<String>, handler: impl ScalarHandler + 'static) {
        self.scalars.register(type_name, handler);
    }

    pub fn read(&self, request: ReadRequest<'_>) -> Result<ReadOutput, CacheError> {
        let mut output = read::read(&self.store, request)?;
        output.stale = self.stale.any_stale(&output.visited);

        Ok(output)
    }

    /// Writes a response into the base layer and notifies the observers it affects.
    ///
    /// Nothing is written when an error is returned.
    pub fn write(&mut self, request: WriteRequest<'_>) -> Result<WriteOutput, CacheError> {
        let output = self.apply_write(LayerTarget::Base, request)?;
        self.notify(output.touched.clone());

        Ok(output)
    }

    /// Writes an optimistic response into the overlay of `mutation`.
    pub fn write_optimistic(&mut self, mutation: MutationId, request: WriteRequest<'_>) -> Result<WriteOutput, CacheError> {
        let output = self.apply_write(LayerTarget::Optimistic(mutation), request)?;
        self.notify(output.touched.clone());

        Ok(output)
    }

    pub fn commit(&mut self, mutation: MutationId) -> WriteOutput {
        let touched = self.store.commit(mutation);
        self.gc.reset(&touched);
        self.notify(touched.clone());

        WriteOutput { touched }
    }

    pub fn rollback(&mut self, mutation: MutationId) -> WriteOutput {
        let touched = self.store.rollback(mutation);
        self.notify(touched.clone());

        WriteOutput { touched }
    }

    /// Removes a record. Links to it elsewhere are left dangling and read as missing.
    pub fn delete(&mut self, record: &RecordId) -> WriteOutput {
        let touched = self.store.delete(record);
        self.lists.evict_record(record);
        self.stale.forget_record(record);
        self.notify(touched.clone());

        WriteOutput { touched }
    }

    /// Reads `spec` and calls `callback` with a fresh read whenever a slot it visited changes.
    pub fn subscribe(
        &mut self,
        spec: ObserverSpec,
        callback: impl FnMut(&ReadOutput, &mut Deferred) + 'static,
    ) -> Result<Subscription, CacheError> {
        let initial = self.read(spec.request())?;
        let id = self.attach(spec, Box::new(callback), initial.visited.clone());

        Ok(Subscription { id, initial })
    }

    fn attach(&mut self, spec: ObserverSpec, callback: Callback, visited: SlotSet) -> ObserverId {
        let id = self.subscriptions.next_id();

        self.gc.reset(&visited);
        self.subscriptions.subscribe(id, visited);
        self.observers.insert(id, Observer { spec, callback });

        id
    }

    pub fn unsubscribe(&mut self, observer: ObserverId) -> bool {
        self.observers.remove(&observer);
        self.subscriptions.unsubscribe(observer)
    }

    pub fn serialize(&self) -> Snapshot {
        self.store.snapshot()
    }

    /// Loads a snapshot taken by [`Cache::serialize`], keeping whatever the cache already holds.
    pub fn hydrate(&mut self, snapshot: Snapshot) -> WriteOutput {
        let touched = self.store.hydrate(snapshot);
        self.gc.reset(&touched);
        self.notify(touched.clone());

        WriteOutput { touched }
    }

    /// Marks a record, or only its fields named `field`, as stale.
    pub fn mark_record_stale(&mut self, record: &RecordId, field: Option<&str>) -> SlotSet {
        let fields = self.store.fields_of(record);
        let marked = self.stale.mark(record, fields, field);
        self.notify(marked.clone());

        marked
    }

    /// Marks every record of a type, or only their fields named `field`, as stale.
    pub fn mark_type_stale(&mut self, type_name: &str, field: Option<&str>) -> SlotSet {
        let typename = FieldKey::typename();
        let mut marked = SlotSet::new();

        for record in self.store.record_ids() {
            let is_of_type = self
                .store
                .get(&record, &typename)
                .and_then(FieldValue::as_scalar)
                .and_then(Value::as_str)
                .is_some_and(|name| name == type_name);

            if is_of_type {
                let fields = self.store.fields_of(&record);
                marked.extend(self.stale.mark(&record, fields, field));
            }
        }

        self.notify(marked.clone());
        marked
    }

    /// Ages every stored slot no observer depends on, and evicts the ones that outlived the
    /// configured lifetime. Returns the number of evicted slots.
    pub fn collect_garbage(&mut self) -> usize {
        let subscriptions = &self.subscriptions;
        let expired = self
            .gc
            .tick(self.store.base_slots(), |slot| subscriptions.is_tracked(slot));

        for slot in &expired {
            self.stale.forget(slot);
            if self.store.evict(slot) {
                self.lists.evict_record(&slot.record);
            }
        }

        if !expired.is_empty() {
            tracing::debug!(evicted = expired.len(), "collected garbage");
        }

        expired.len()
    }

    fn apply_write(&mut self, target: LayerTarget, request: WriteRequest<'_>) -> Result<WriteOutput, CacheError> {
        let context = WriteContext {
            identifier: &self.identifier,
            scalars: &self.scalars,
            lists: &self.lists,
        };

        let mut transaction = self.store.transaction(target);
        let effects = write::write(&mut transaction, &context, request)?;
        let staged = transaction.finish();
        let written = staged.written().clone();

        let touched = self.store.apply(staged);

        for handle in effects.lists {
            self.lists.register(handle);
        }

        if target == LayerTarget::Base {
            for record in &effects.deleted {
                self.lists.evict_record(record);
                self.stale.forget_record(record);
            }
            self.stale.clear(&written);
        }
        self.gc.reset(&written);

        tracing::debug!(?target, written = written.len(), touched = touched.len(), "applied write");

        Ok(WriteOutput { touched })
    }

    fn notify(&mut self, touched: SlotSet) {
        let mut queue = VecDeque::from([touched]);
        let mut passes = 0;

        while let Some(touched) = queue.pop_front() {
            if touched.is_empty() {
                continue;
            }

            passes += 1;
            if passes > MAX_NOTIFICATION_PASSES {
                tracing::warn!(
                    pending = queue.len() + 1,
                    "too many cascading notification passes, dropping the remaining writes"
                );
                break;
            }

            let mut notified = Vec::new();
            self.subscriptions.notify(&touched, |observer| notified.push(observer));

            let mut deferred = Deferred::default();
            for observer in notified {
                if !deferred.unsubscribes.contains(&observer) {
                    self.refresh(observer, &mut deferred);
                }
            }

            self.run_deferred(deferred, &mut queue);
        }
    }

    /// Applies the work queued by callbacks. Writes are queued for the next notification pass.
    fn run_deferred(&mut self, mut deferred: Deferred, queue: &mut VecDeque<SlotSet>) {
        let mut rounds = 0;

        while !deferred.is_empty() {
            rounds += 1;
            if rounds > MAX_NOTIFICATION_PASSES {
                tracing::warn!(?deferred, "too many nested subscriptions, dropping the remaining work");
                return;
            }

            for observer in std::mem::take(&mut deferred.unsubscribes) {
                self.unsubscribe(observer);
            }

            // new observers get their initial read, which may queue more work
            for (spec, callback) in std::mem::take(&mut deferred.subscribes) {
                let id = self.attach(spec, callback, SlotSet::new());
                self.refresh(id, &mut deferred);
            }

            for pending in std::mem::take(&mut deferred.writes) {
                match self.apply_write(LayerTarget::Base, pending.request()) {
                    Ok(output) => queue.push_back(output.touched),
                    Err(error) => tracing::warn!(%error, "write queued by an observer failed"),
                }
            }
        }
    }

    /// Re-reads an observer, tracks its new dependencies and hands it the result.
    fn refresh(&mut self, id: ObserverId, deferred: &mut Deferred) {
        let Some(observer) = self.observers.get_mut(&id) else {
            return;
        };

        let output = match read::read(&self.store, observer.spec.request()) {
            Ok(mut output) => {
                output.stale = self.stale.any_stale(&output.visited);
                output
            }
            Err(error) => {
                tracing::warn!(%id, %error, "observer read failed");
                return;
            }
        };

        self.gc.reset(&output.visited);
        self.subscriptions.subscribe(id, output.visited.clone());
        (observer.callback)(&output, deferred);
    }
}
