//! Entity Store contract
//!
//! Persistence trait for pets, groups and traits. The resolution service
//! operates exclusively through this trait, enabling pluggable backends
//! (InMemoryPetStore for tests and local runs, PgPetStore for production).
//!
//! Every mutation goes through a [`PetStoreTx`] unit of work obtained from
//! [`PetStore::begin`]. Nothing written on a transaction is visible to other
//! callers until `commit`; dropping an uncommitted transaction discards it.

use async_trait::async_trait;

use crate::models::{Group, GroupAttributes, NewPetFields, Pet, PetFieldUpdates, PetTrait};

/// Entity Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Pet not found: {pet_id}")]
    PetNotFound { pet_id: i64 },

    #[error("Natural key conflict on {entity} '{key}' could not be resolved")]
    Conflict { entity: &'static str, key: String },

    #[error("Integrity violation: {0}")]
    Integrity(String),

    #[cfg(feature = "database")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Filter and window for pet listings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PetFilter {
    /// Exact match against the stored (lower-case) trait name
    pub trait_name: Option<String>,
    pub offset: u64,
    pub limit: Option<u64>,
}

impl PetFilter {
    pub fn with_trait(trait_name: impl Into<String>) -> Self {
        Self {
            trait_name: Some(trait_name.into()),
            ..Default::default()
        }
    }

    pub fn window(mut self, offset: u64, limit: u64) -> Self {
        self.offset = offset;
        self.limit = Some(limit);
        self
    }

    /// Filter without the window, for counting
    pub fn unwindowed(&self) -> Self {
        Self {
            trait_name: self.trait_name.clone(),
            offset: 0,
            limit: None,
        }
    }
}

#[async_trait]
pub trait PetStore: Send + Sync {
    // ── Units of work ──

    async fn begin(&self) -> StoreResult<Box<dyn PetStoreTx>>;

    // ── Groups ──

    async fn find_group_by_scientific_name(&self, name: &str) -> StoreResult<Option<Group>>;
    async fn list_groups(&self) -> StoreResult<Vec<Group>>;

    // ── Traits ──

    async fn find_trait_by_name_case_insensitive(&self, name: &str)
        -> StoreResult<Option<PetTrait>>;
    async fn list_traits(&self) -> StoreResult<Vec<PetTrait>>;

    // ── Pets ──

    /// Fails with `PetNotFound` if absent.
    async fn get_pet_by_id(&self, id: i64) -> StoreResult<Pet>;

    /// Pets in ascending id order, restricted by the filter's trait and window.
    async fn list_pets(&self, filter: &PetFilter) -> StoreResult<Vec<Pet>>;

    /// Number of pets matching the filter's trait, ignoring the window.
    async fn count_pets(&self, filter: &PetFilter) -> StoreResult<u64>;
}

/// A single logical request's writes against the store
#[async_trait]
pub trait PetStoreTx: Send {
    /// Exact match on scientific name; creates the group if absent.
    /// Returns the group and whether this call created it.
    async fn get_or_create_group(&mut self, attrs: &GroupAttributes)
        -> StoreResult<(Group, bool)>;

    /// Keyed on the already lower-cased name.
    async fn get_or_create_trait_normalized(
        &mut self,
        normalized_name: &str,
    ) -> StoreResult<(PetTrait, bool)>;

    /// Inserts the pet row and its trait links. Returns the new pet id.
    async fn create_pet(
        &mut self,
        group_id: i64,
        trait_ids: &[i64],
        fields: &NewPetFields,
    ) -> StoreResult<i64>;

    /// Loads the expanded pet as seen by this transaction. Locks the pet
    /// against concurrent writers where the backend supports it.
    async fn load_pet(&mut self, id: i64) -> StoreResult<Pet>;

    /// Replaces only the supplied scalar fields.
    async fn update_pet_fields(&mut self, id: i64, updates: &PetFieldUpdates) -> StoreResult<()>;

    async fn set_pet_group(&mut self, id: i64, group_id: i64) -> StoreResult<()>;

    /// Installs exactly `trait_ids` as the pet's trait set.
    async fn replace_pet_traits(&mut self, id: i64, trait_ids: &[i64]) -> StoreResult<()>;

    /// Removes the pet and its trait links. Groups and traits are untouched.
    async fn delete_pet(&mut self, id: i64) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
