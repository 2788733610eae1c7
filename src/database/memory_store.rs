//! In-memory Entity Store
//!
//! Process-local backend used by tests and by `PETS_STORE=memory` runs.
//! Writers are serialized: a transaction holds the state lock for its whole
//! lifetime and works on a copy that replaces the shared state on commit.
//! That makes get-or-create trivially race-free and gives all-or-nothing
//! commits without any undo log.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use super::pet_store::{PetFilter, PetStore, PetStoreTx, StoreError, StoreResult};
use crate::models::{
    normalize_trait_name, Group, GroupAttributes, NewPetFields, Pet, PetFieldUpdates, PetTrait,
    Sex,
};

/// Stored pet row; traits are held as an owned id set
#[derive(Debug, Clone)]
struct PetRow {
    id: i64,
    name: String,
    age: i32,
    weight: f64,
    sex: Sex,
    group_id: i64,
    trait_ids: BTreeSet<i64>,
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    next_group_id: i64,
    next_trait_id: i64,
    next_pet_id: i64,
    groups: BTreeMap<i64, Group>,
    groups_by_name: HashMap<String, i64>,
    traits: BTreeMap<i64, PetTrait>,
    traits_by_name: HashMap<String, i64>,
    pets: BTreeMap<i64, PetRow>,
}

impl MemoryState {
    fn expand(&self, row: &PetRow) -> StoreResult<Pet> {
        let group = self.groups.get(&row.group_id).cloned().ok_or_else(|| {
            StoreError::Integrity(format!(
                "pet {} references missing group {}",
                row.id, row.group_id
            ))
        })?;

        let mut traits = row
            .trait_ids
            .iter()
            .map(|id| {
                self.traits.get(id).cloned().ok_or_else(|| {
                    StoreError::Integrity(format!("pet {} references missing trait {}", row.id, id))
                })
            })
            .collect::<StoreResult<Vec<_>>>()?;
        traits.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(Pet {
            id: row.id,
            name: row.name.clone(),
            age: row.age,
            weight: row.weight,
            sex: row.sex,
            group,
            traits,
        })
    }

    fn pet(&self, id: i64) -> StoreResult<Pet> {
        let row = self
            .pets
            .get(&id)
            .ok_or(StoreError::PetNotFound { pet_id: id })?;
        self.expand(row)
    }

    fn pet_row_mut(&mut self, id: i64) -> StoreResult<&mut PetRow> {
        self.pets
            .get_mut(&id)
            .ok_or(StoreError::PetNotFound { pet_id: id })
    }

    fn matching_rows<'a>(&'a self, filter: &'a PetFilter) -> impl Iterator<Item = &'a PetRow> {
        let trait_id = filter
            .trait_name
            .as_ref()
            .map(|name| self.traits_by_name.get(name).copied());

        self.pets.values().filter(move |row| match trait_id {
            None => true,
            Some(None) => false,
            Some(Some(id)) => row.trait_ids.contains(&id),
        })
    }

    fn check_refs(&self, group_id: i64, trait_ids: &[i64]) -> StoreResult<()> {
        if !self.groups.contains_key(&group_id) {
            return Err(StoreError::Integrity(format!("unknown group {}", group_id)));
        }
        if let Some(missing) = trait_ids.iter().find(|id| !self.traits.contains_key(id)) {
            return Err(StoreError::Integrity(format!("unknown trait {}", missing)));
        }
        Ok(())
    }
}

/// In-memory pet store
#[derive(Clone, Default)]
pub struct InMemoryPetStore {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryPetStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PetStore for InMemoryPetStore {
    async fn begin(&self) -> StoreResult<Box<dyn PetStoreTx>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryTx { guard, working }))
    }

    async fn find_group_by_scientific_name(&self, name: &str) -> StoreResult<Option<Group>> {
        let state = self.state.lock().await;
        Ok(state
            .groups_by_name
            .get(name)
            .and_then(|id| state.groups.get(id))
            .cloned())
    }

    async fn list_groups(&self) -> StoreResult<Vec<Group>> {
        let state = self.state.lock().await;
        Ok(state.groups.values().cloned().collect())
    }

    async fn find_trait_by_name_case_insensitive(
        &self,
        name: &str,
    ) -> StoreResult<Option<PetTrait>> {
        let state = self.state.lock().await;
        Ok(state
            .traits_by_name
            .get(&normalize_trait_name(name))
            .and_then(|id| state.traits.get(id))
            .cloned())
    }

    async fn list_traits(&self) -> StoreResult<Vec<PetTrait>> {
        let state = self.state.lock().await;
        Ok(state.traits.values().cloned().collect())
    }

    async fn get_pet_by_id(&self, id: i64) -> StoreResult<Pet> {
        self.state.lock().await.pet(id)
    }

    async fn list_pets(&self, filter: &PetFilter) -> StoreResult<Vec<Pet>> {
        let state = self.state.lock().await;
        let limit = filter
            .limit
            .map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
        let offset = usize::try_from(filter.offset).unwrap_or(usize::MAX);

        state
            .matching_rows(filter)
            .skip(offset)
            .take(limit)
            .map(|row| state.expand(row))
            .collect()
    }

    async fn count_pets(&self, filter: &PetFilter) -> StoreResult<u64> {
        let state = self.state.lock().await;
        Ok(state.matching_rows(filter).count() as u64)
    }
}

/// Unit of work over a private copy of the state
struct InMemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl PetStoreTx for InMemoryTx {
    async fn get_or_create_group(
        &mut self,
        attrs: &GroupAttributes,
    ) -> StoreResult<(Group, bool)> {
        let state = &mut self.working;
        if let Some(group) = state
            .groups_by_name
            .get(&attrs.scientific_name)
            .and_then(|id| state.groups.get(id))
        {
            return Ok((group.clone(), false));
        }

        state.next_group_id += 1;
        let group = Group {
            id: state.next_group_id,
            scientific_name: attrs.scientific_name.clone(),
            created_at: Utc::now(),
        };
        state
            .groups_by_name
            .insert(group.scientific_name.clone(), group.id);
        state.groups.insert(group.id, group.clone());
        debug!("Created group {} ({})", group.id, group.scientific_name);
        Ok((group, true))
    }

    async fn get_or_create_trait_normalized(
        &mut self,
        normalized_name: &str,
    ) -> StoreResult<(PetTrait, bool)> {
        let state = &mut self.working;
        if let Some(existing) = state
            .traits_by_name
            .get(normalized_name)
            .and_then(|id| state.traits.get(id))
        {
            return Ok((existing.clone(), false));
        }

        state.next_trait_id += 1;
        let created = PetTrait {
            id: state.next_trait_id,
            name: normalized_name.to_string(),
            created_at: Utc::now(),
        };
        state
            .traits_by_name
            .insert(created.name.clone(), created.id);
        state.traits.insert(created.id, created.clone());
        debug!("Created trait {} ({})", created.id, created.name);
        Ok((created, true))
    }

    async fn create_pet(
        &mut self,
        group_id: i64,
        trait_ids: &[i64],
        fields: &NewPetFields,
    ) -> StoreResult<i64> {
        let state = &mut self.working;
        state.check_refs(group_id, trait_ids)?;

        state.next_pet_id += 1;
        let id = state.next_pet_id;
        state.pets.insert(
            id,
            PetRow {
                id,
                name: fields.name.clone(),
                age: fields.age,
                weight: fields.weight,
                sex: fields.sex,
                group_id,
                trait_ids: trait_ids.iter().copied().collect(),
            },
        );
        Ok(id)
    }

    async fn load_pet(&mut self, id: i64) -> StoreResult<Pet> {
        self.working.pet(id)
    }

    async fn update_pet_fields(&mut self, id: i64, updates: &PetFieldUpdates) -> StoreResult<()> {
        let row = self.working.pet_row_mut(id)?;
        if let Some(name) = &updates.name {
            row.name = name.clone();
        }
        if let Some(age) = updates.age {
            row.age = age;
        }
        if let Some(weight) = updates.weight {
            row.weight = weight;
        }
        if let Some(sex) = updates.sex {
            row.sex = sex;
        }
        Ok(())
    }

    async fn set_pet_group(&mut self, id: i64, group_id: i64) -> StoreResult<()> {
        self.working.check_refs(group_id, &[])?;
        self.working.pet_row_mut(id)?.group_id = group_id;
        Ok(())
    }

    async fn replace_pet_traits(&mut self, id: i64, trait_ids: &[i64]) -> StoreResult<()> {
        let group_id = self.working.pet_row_mut(id)?.group_id;
        self.working.check_refs(group_id, trait_ids)?;
        self.working.pet_row_mut(id)?.trait_ids = trait_ids.iter().copied().collect();
        Ok(())
    }

    async fn delete_pet(&mut self, id: i64) -> StoreResult<()> {
        self.working
            .pets
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::PetNotFound { pet_id: id })
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let InMemoryTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}
