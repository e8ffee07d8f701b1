//! Post-creation transformations
//!
//! Applied to a freshly created node before it becomes visible, e.g. to
//! fill in derived properties.

use stratagraph_core::{SecurityContext, StrataResult, TypedNode};

/// Mutation applied to a node right after it is created
pub trait Transformation: Send + Sync {
    /// Apply to `node`
    fn apply(&self, security: &SecurityContext, node: &mut TypedNode) -> StrataResult<()>;
}

impl<F> Transformation for F
where
    F: Fn(&SecurityContext, &mut TypedNode) -> StrataResult<()> + Send + Sync,
{
    fn apply(&self, security: &SecurityContext, node: &mut TypedNode) -> StrataResult<()> {
        self(security, node)
    }
}
