use std::collections::HashMap;

use crate::auth::Requester;
use crate::error::ApiError;

/// Visible
///
/// The single question the read-side visibility rule asks of a record.
/// Nested resources answer with their owning parent's flag (a map set is
/// public iff its activation is public), which keeps the policy itself
/// identical across resource types.
pub trait Visible {
    fn is_public(&self) -> bool;
}

/// Decision
///
/// Outcome of a mutating-verb check. `NotImplemented` is deliberately
/// distinct from `Deny`: the former marks a surface the resource does not
/// support at all, the latter an operation the requester may not perform.
/// Both surface as an authorization failure at the HTTP boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decision {
    Allow,
    Deny,
    NotImplemented,
}

/// Verb
///
/// The mutating verbs governed by the access matrix. Reads are governed by
/// the visibility rule instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Create,
    Update,
    Delete,
}

/// Level
///
/// Whether a mutation targets the whole collection (bulk) or a single
/// record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    List,
    Detail,
}

/// ResourceKind
///
/// The catalog resource types the access matrix is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Activation,
    MapSet,
    ActivationMap,
}

/// AccessMatrix
///
/// Explicit configuration data: `(resource, level, verb) -> Decision`.
/// Kept as a table rather than a hierarchy of policy types so the whole
/// decision surface is visible in one place and testable case by case.
/// An entry missing from the table reads as `NotImplemented`.
#[derive(Debug, Clone, Default)]
pub struct AccessMatrix {
    entries: HashMap<(ResourceKind, Level, Verb), Decision>,
}

impl AccessMatrix {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Registers one cell of the matrix. Builder-style, used by
    /// `catalog_defaults` and by tests assembling bespoke matrices.
    pub fn with(mut self, kind: ResourceKind, level: Level, verb: Verb, decision: Decision) -> Self {
        self.entries.insert((kind, level, verb), decision);
        self
    }

    pub fn decision(&self, kind: ResourceKind, level: Level, verb: Verb) -> Decision {
        self.entries
            .get(&(kind, level, verb))
            .copied()
            .unwrap_or(Decision::NotImplemented)
    }

    /// The catalog's production matrix.
    ///
    /// Activations accept detail-level create/update from any authenticated
    /// requester and never accept deletes. Map sets are read-only through
    /// this API (they are maintained by the external editing UI). Composed
    /// maps accept detail-level create/update; their delete surface does not
    /// exist. All list-level (bulk) mutations are unsupported or denied.
    pub fn catalog_defaults() -> Self {
        use Decision::*;
        use Level::*;
        use ResourceKind::*;
        use Verb::*;

        Self::new()
            .with(Activation, Detail, Create, Allow)
            .with(Activation, Detail, Update, Allow)
            .with(Activation, Detail, Delete, Deny)
            .with(Activation, List, Create, NotImplemented)
            .with(Activation, List, Update, NotImplemented)
            .with(Activation, List, Delete, NotImplemented)
            .with(MapSet, Detail, Create, Deny)
            .with(MapSet, Detail, Update, Deny)
            .with(MapSet, Detail, Delete, Deny)
            .with(MapSet, List, Create, NotImplemented)
            .with(MapSet, List, Update, NotImplemented)
            .with(MapSet, List, Delete, NotImplemented)
            .with(ActivationMap, Detail, Create, Allow)
            .with(ActivationMap, Detail, Update, Allow)
            .with(ActivationMap, Detail, Delete, NotImplemented)
            .with(ActivationMap, List, Create, Deny)
            .with(ActivationMap, List, Update, Deny)
            .with(ActivationMap, List, Delete, Deny)
    }
}

/// VisibilityPolicy
///
/// The catalog's authorization component. Pure: every decision is a function
/// of the requester, the record's public flag, and the access matrix. It is
/// cloned freely into the shared application state and holds no per-request
/// data, so concurrent requests never contend on it.
///
/// The handlers apply `filter_visible` before any spatial/text filtering or
/// facet counting, so no downstream component ever observes a record the
/// requester cannot see.
#[derive(Debug, Clone, Default)]
pub struct VisibilityPolicy {
    matrix: AccessMatrix,
}

impl VisibilityPolicy {
    pub fn new(matrix: AccessMatrix) -> Self {
        Self { matrix }
    }

    /// True iff the requester may list the unscoped collection. Only
    /// superusers qualify; everyone else goes through `filter_visible`.
    pub fn can_list_all(&self, requester: &Requester) -> bool {
        requester.is_superuser
    }

    /// Narrows a candidate collection to what the requester may see.
    /// Superusers keep everything; other requesters keep only public
    /// records. Removal is silent, never an error.
    pub fn filter_visible<T: Visible>(&self, requester: &Requester, records: Vec<T>) -> Vec<T> {
        if requester.is_superuser {
            return records;
        }
        records.into_iter().filter(|r| r.is_public()).collect()
    }

    /// Single-record mirror of the list rule.
    pub fn can_read_detail<T: Visible>(&self, requester: &Requester, record: &T) -> bool {
        requester.is_superuser || record.is_public()
    }

    /// Matrix lookup for a mutating verb. Applies to every requester,
    /// superusers included: a surface the matrix closes is closed for
    /// everyone.
    pub fn mutation(&self, kind: ResourceKind, level: Level, verb: Verb) -> Decision {
        self.matrix.decision(kind, level, verb)
    }

    /// Boundary form of `mutation`: anything but `Allow` is an
    /// authorization failure, raised before any storage call so a denied
    /// write can never partially complete.
    pub fn authorize_mutation(
        &self,
        kind: ResourceKind,
        level: Level,
        verb: Verb,
    ) -> Result<(), ApiError> {
        match self.mutation(kind, level, verb) {
            Decision::Allow => Ok(()),
            Decision::Deny | Decision::NotImplemented => Err(ApiError::Authorization),
        }
    }
}
