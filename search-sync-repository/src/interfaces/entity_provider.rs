//! Entity provider trait definition.

use async_trait::async_trait;

use crate::errors::StoreError;
use search_sync_shared::{EntityDocument, EntityId};

/// Loads the current state of entities from the system of record.
///
/// The provider owns whatever session it needs to read entities; callers
/// only pass the entity type and ids.
#[async_trait]
pub trait EntityProvider: Send + Sync {
    /// Load one entity. Returns `Ok(None)` if it does not exist.
    async fn get(
        &self,
        entity_type: &str,
        id: &EntityId,
    ) -> Result<Option<EntityDocument>, StoreError>;

    /// Load several entities of one type in a single round trip.
    ///
    /// The result has the same length and order as `ids`; missing entities
    /// are `None`.
    async fn get_batch(
        &self,
        entity_type: &str,
        ids: &[EntityId],
    ) -> Result<Vec<Option<EntityDocument>>, StoreError>;
}
