//! A normalized GraphQL client cache.
//!
//! Responses are flattened into records keyed by identity, so every document sees the same copy
//! of an object. Reads and writes are driven by the compiled selection of a document (its
//! [`Artifact`]) rather than by the query text.
//!
//! The moving parts:
//!
//! 1. [`Identifier`] and [`field_key`] decide where a value lives: which record, which slot.
//! 2. [`RecordStore`] holds the records, with optimistic overlays on top of the base layer.
//! 3. The read engine resolves a selection against the store and reports every slot it visited.
//! 4. The write engine normalizes a payload inside a transaction, then merges it in one step and
//!    reports the slots whose value changed.
//! 5. [`SubscriptionManager`] matches those changes against what each observer visited.
//!
//! [`Cache`] ties them together and is what most callers want.

mod artifact;
mod cache;
mod error;
mod gc;
mod identity;
mod key;
mod lists;
mod read;
mod scalars;
mod stale;
mod store;
mod subscription;
mod write;

pub mod pagination;

pub use cache_config::{CacheConfig, ListPosition, ListTarget};

pub use self::{
    artifact::{
        AbstractFields, Argument, Artifact, ArtifactKind, CachePolicy, FieldSelection, InputField, ListCondition,
        ListDirective, ListOperation, LoadingKind, LoadingList, LoadingSpec, OperationAction, PaginationDirection,
        PaginationMethod, ParentId, PolicyDecision, RefetchSpec, SelectionSet, UpdateMode,
    },
    cache::{Cache, Deferred, ObserverSpec, PendingWrite, Subscription, MAX_NOTIFICATION_PASSES},
    error::{CacheError, Result},
    gc::GarbageCollector,
    identity::{Identifier, RecordId, ROOT_ID},
    key::{field_key, FieldKey, FieldSlot, KeyMode, SlotSet, Variables, PAGINATED_MARKER, PAGINATION_ARGUMENTS},
    lists::{ListHandle, ListRegistry},
    read::{read, ReadOutput, ReadRequest, MAX_SELECTION_DEPTH, PENDING_PLACEHOLDER},
    scalars::{ScalarHandler, ScalarRegistry},
    stale::StaleTracker,
    store::{FieldValue, LayerTarget, MutationId, RecordStore, Snapshot, StagedWrite, Transaction, ValueShape},
    subscription::{ObserverId, SubscriptionManager},
    write::{WriteOutput, WriteRequest},
};
