//! Property validators
//!
//! Validators are registered per (type, property) as a [`ValidatorKind`] and
//! instantiated on lookup with the caller's security context. Built-in kinds
//! carry their own construction logic; `Named` kinds resolve through
//! factories registered on the builder.
//!
//! Uniqueness validators hold the coordinator permit for the check-and-write:
//! on success the permit is parked in the [`ValidationContext`], and the
//! caller drops the context once its write is done. On failure the permit is
//! dropped before the error is returned.

use std::fmt;
use std::sync::Arc;
use stratagraph_concurrency::{UniquenessCoordinator, UniquenessPermit, UniquenessScope};
use stratagraph_core::{
    GraphObject, NodeId, PropertyKey, SecurityContext, StrataError, StrataResult, TypedNode, Value,
};

/// Query capability the uniqueness validators check against
pub trait UniquenessLookup: Send + Sync {
    /// Ids of stored nodes holding `value` under `key`
    ///
    /// With `type_name` set, only nodes whose ancestor chain contains that
    /// type name are considered.
    fn nodes_with_value(
        &self,
        type_name: Option<&str>,
        key: &PropertyKey,
        value: &Value,
    ) -> StrataResult<Vec<NodeId>>;
}

/// Per-write validation state
pub struct ValidationContext<'a> {
    security: &'a SecurityContext,
    lookup: &'a dyn UniquenessLookup,
    coordinator: &'a UniquenessCoordinator,
    permits: Vec<UniquenessPermit>,
}

impl<'a> ValidationContext<'a> {
    /// Create a context for one write
    pub fn new(
        security: &'a SecurityContext,
        lookup: &'a dyn UniquenessLookup,
        coordinator: &'a UniquenessCoordinator,
    ) -> Self {
        Self {
            security,
            lookup,
            coordinator,
            permits: Vec::new(),
        }
    }

    /// Security context of the writer
    pub fn security(&self) -> &SecurityContext {
        self.security
    }

    /// Store query capability
    pub fn lookup(&self) -> &dyn UniquenessLookup {
        self.lookup
    }

    /// Coordinator owning the uniqueness locks
    pub fn coordinator(&self) -> &UniquenessCoordinator {
        self.coordinator
    }

    /// Keep `permit` held until the context is dropped
    pub fn hold(&mut self, permit: UniquenessPermit) {
        self.permits.push(permit);
    }

    /// Number of permits currently held
    pub fn held_permits(&self) -> usize {
        self.permits.len()
    }

    /// Release every held permit
    pub fn release_permits(&mut self) {
        self.permits.clear();
    }
}

impl fmt::Debug for ValidationContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationContext")
            .field("security", self.security)
            .field("permits", &self.permits)
            .finish()
    }
}

/// Check applied to a property value before it is written
pub trait PropertyValidator: Send + Sync {
    /// Accept or reject `value` for `key` on `node`
    ///
    /// `parameter` is the validation parameter registered for the key, if
    /// any.
    fn validate(
        &self,
        ctx: &mut ValidationContext<'_>,
        node: &TypedNode,
        key: &PropertyKey,
        value: &Value,
        parameter: Option<&Value>,
    ) -> StrataResult<()>;
}

/// Factory for `Named` validator kinds
pub type ValidatorFactory =
    Arc<dyn Fn(&SecurityContext) -> StrataResult<Box<dyn PropertyValidator>> + Send + Sync>;

/// Validator registered for a property
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValidatorKind {
    /// Value must be unique among all nodes of all types
    GlobalUniqueness,
    /// Value must be unique among nodes of the registering type
    TypeAndPropertyUniqueness,
    /// Value must not be null, blank or an empty collection
    NotEmpty,
    /// Value must equal one element of the array parameter
    MatchesAny,
    /// Validator built by the factory registered under this name
    Named(String),
}

impl ValidatorKind {
    /// Uniqueness scope the kind needs a lock for, given the registering type
    pub fn uniqueness_scope(&self, type_name: &str) -> Option<UniquenessScope> {
        match self {
            ValidatorKind::GlobalUniqueness => Some(UniquenessScope::Global),
            ValidatorKind::TypeAndPropertyUniqueness => {
                Some(UniquenessScope::Type(type_name.to_string()))
            }
            _ => None,
        }
    }
}

impl fmt::Display for ValidatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidatorKind::GlobalUniqueness => write!(f, "GlobalUniqueness"),
            ValidatorKind::TypeAndPropertyUniqueness => write!(f, "TypeAndPropertyUniqueness"),
            ValidatorKind::NotEmpty => write!(f, "NotEmpty"),
            ValidatorKind::MatchesAny => write!(f, "MatchesAny"),
            ValidatorKind::Named(name) => write!(f, "Named({})", name),
        }
    }
}

// ============================================================================
// Built-in validators
// ============================================================================

/// Rejects a value already held by another node in `scope`
pub struct UniquenessValidator {
    scope: UniquenessScope,
}

impl UniquenessValidator {
    /// Validator checking uniqueness within `scope`
    pub fn new(scope: UniquenessScope) -> Self {
        Self { scope }
    }
}

impl PropertyValidator for UniquenessValidator {
    fn validate(
        &self,
        ctx: &mut ValidationContext<'_>,
        node: &TypedNode,
        key: &PropertyKey,
        value: &Value,
        _parameter: Option<&Value>,
    ) -> StrataResult<()> {
        if value.is_null() {
            return Ok(());
        }

        let permit = ctx
            .coordinator()
            .get(&self.scope, key.name())
            .map(|lock| lock.acquire());

        let type_filter = match &self.scope {
            UniquenessScope::Type(name) => Some(name.as_str()),
            UniquenessScope::Global => None,
        };
        let holders = ctx.lookup().nodes_with_value(type_filter, key, value)?;
        if let Some(other) = holders.iter().find(|id| **id != node.id()) {
            return Err(StrataError::validation(
                node.type_name(),
                key.name(),
                format!("value {:?} already used by node {}", value, other),
            ));
        }

        if let Some(permit) = permit {
            ctx.hold(permit);
        }
        Ok(())
    }
}

/// Rejects null, blank strings and empty collections
pub struct NotEmptyValidator;

impl PropertyValidator for NotEmptyValidator {
    fn validate(
        &self,
        _ctx: &mut ValidationContext<'_>,
        node: &TypedNode,
        key: &PropertyKey,
        value: &Value,
        _parameter: Option<&Value>,
    ) -> StrataResult<()> {
        if value.is_empty() {
            Err(StrataError::validation(
                node.type_name(),
                key.name(),
                "must not be empty",
            ))
        } else {
            Ok(())
        }
    }
}

/// Accepts only values listed in the array parameter; null passes
pub struct MatchesAnyValidator;

impl PropertyValidator for MatchesAnyValidator {
    fn validate(
        &self,
        _ctx: &mut ValidationContext<'_>,
        node: &TypedNode,
        key: &PropertyKey,
        value: &Value,
        parameter: Option<&Value>,
    ) -> StrataResult<()> {
        if value.is_null() {
            return Ok(());
        }
        let allowed = parameter.and_then(Value::as_array).ok_or_else(|| {
            StrataError::validation(
                node.type_name(),
                key.name(),
                "no list of allowed values registered",
            )
        })?;
        if allowed.contains(value) {
            Ok(())
        } else {
            Err(StrataError::validation(
                node.type_name(),
                key.name(),
                format!("{:?} is not one of {:?}", value, allowed),
            ))
        }
    }
}
