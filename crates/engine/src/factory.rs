//! Entity factory capability
//!
//! Supplied by the store adapter. Turns store-native identities into typed
//! entities using the metadata registry; `None` means the identity cannot be
//! resolved (unknown node or type).

use crate::change::RelationshipRecord;
use stratagraph_core::{NodeId, StrataResult, TypedNode, TypedRelationship};

/// Rehydrates store identities into typed graph objects
pub trait EntityFactory {
    /// Typed view of node `id` as of the pending commit
    fn instantiate_node(&self, id: NodeId) -> StrataResult<Option<TypedNode>>;

    /// Typed view of a created or deleted relationship
    fn instantiate_relationship(
        &self,
        record: &RelationshipRecord,
    ) -> StrataResult<Option<TypedRelationship>>;
}
