//! Mapping store: append-only raw-name to standard-code associations.

use async_trait::async_trait;

use obs_common::Mapping;

use crate::error::StoreResult;

/// Result of an insert-if-absent.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertOutcome {
    /// The mapping now stored under the raw name (the first writer's).
    pub mapping: Mapping,
    /// Whether this call created the row.
    pub created: bool,
}

/// Append-only mapping storage.
///
/// Raw names are looked up and stored in normalized form. Conflict
/// resolution for concurrent inserts of the same raw name belongs to the
/// backend: `insert_if_absent` must be a single atomic operation where the
/// first writer wins and later writers receive the stored row.
#[async_trait]
pub trait MappingStore: Send + Sync {
    /// Look up a mapping by (normalized) raw name.
    async fn get(&self, raw_name: &str) -> StoreResult<Option<Mapping>>;

    /// Create the mapping unless its raw name already exists.
    async fn insert_if_absent(&self, mapping: &Mapping) -> StoreResult<InsertOutcome>;

    /// Correct the unit and description of an existing mapping.
    /// Returns `false` if the raw name is unknown.
    async fn update_unit(
        &self,
        raw_name: &str,
        unit: &str,
        description: Option<&str>,
    ) -> StoreResult<bool>;

    /// All mappings, ordered by raw name.
    async fn all(&self) -> StoreResult<Vec<Mapping>>;

    /// Load seed entries with create-or-ignore semantics.
    /// Returns how many rows were newly created.
    async fn seed(&self, mappings: &[Mapping]) -> StoreResult<usize> {
        let mut created = 0;
        for mapping in mappings {
            let normalized = mapping.clone().normalized();
            if self.insert_if_absent(&normalized).await?.created {
                created += 1;
            }
        }
        Ok(created)
    }
}
