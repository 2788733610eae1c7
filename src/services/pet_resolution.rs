//! Pet Resolution Service
//!
//! Implements the upsert-and-link protocol for pets:
//! 1. Resolve the group by exact scientific name, creating it if absent
//! 2. Normalize each trait name to lower-case and get-or-create it
//! 3. Create (or update) the pet with the resolved group and trait set
//!
//! Each create/update/delete runs inside exactly one store transaction, so a
//! reader never observes a half-linked pet. On update, a supplied trait list
//! fully replaces the pet's trait set; omitted fields are left untouched.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::database::{PetFilter, PetStore, PetStoreTx, StoreResult};
use crate::error::PetResult;
use crate::models::{normalize_trait_name, CreatePetPayload, Pet, PetTrait, UpdatePetPayload};
use crate::services::pet_validator::{validate_create, validate_update};

/// One window of a filtered listing plus the filter's total match count
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PetPage {
    pub count: u64,
    pub pets: Vec<Pet>,
}

/// Resolution service over a shared Entity Store
#[derive(Clone)]
pub struct PetResolutionService {
    store: Arc<dyn PetStore>,
}

impl PetResolutionService {
    pub fn new(store: Arc<dyn PetStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn PetStore> {
        &self.store
    }

    // ============================================
    // Create
    // ============================================

    /// Validate a raw body, then create. Invalid input never touches the store.
    pub async fn create_pet_from_json(&self, body: &Value) -> PetResult<Pet> {
        let payload = validate_create(body)?;
        self.create_pet(payload).await
    }

    pub async fn create_pet(&self, payload: CreatePetPayload) -> PetResult<Pet> {
        let mut tx = self.store.begin().await?;

        let (group, group_created) = tx.get_or_create_group(&payload.group).await?;
        debug!(
            "Resolved group {} ({}), created: {}",
            group.id, group.scientific_name, group_created
        );

        let traits = resolve_traits(tx.as_mut(), &payload.traits).await?;
        let trait_ids: Vec<i64> = traits.iter().map(|t| t.id).collect();

        let pet_id = tx.create_pet(group.id, &trait_ids, &payload.fields).await?;
        let pet = tx.load_pet(pet_id).await?;
        tx.commit().await?;

        info!(
            "Created pet {} '{}' in group '{}' with {} trait(s)",
            pet.id,
            pet.name,
            pet.group.scientific_name,
            pet.traits.len()
        );
        Ok(pet)
    }

    // ============================================
    // Update (partial)
    // ============================================

    /// Validate a raw body, then update. Validation errors win over NotFound.
    pub async fn update_pet_from_json(&self, pet_id: i64, body: &Value) -> PetResult<Pet> {
        let payload = validate_update(body)?;
        self.update_pet(pet_id, payload).await
    }

    pub async fn update_pet(&self, pet_id: i64, payload: UpdatePetPayload) -> PetResult<Pet> {
        let mut tx = self.store.begin().await?;

        // Fails with NotFound before anything is written
        tx.load_pet(pet_id).await?;

        if let Some(group_attrs) = &payload.group {
            let (group, _) = tx.get_or_create_group(group_attrs).await?;
            tx.set_pet_group(pet_id, group.id).await?;
            debug!("Pet {} reassigned to group {}", pet_id, group.id);
        }

        if let Some(names) = &payload.traits {
            let traits = resolve_traits(tx.as_mut(), names).await?;
            let trait_ids: Vec<i64> = traits.iter().map(|t| t.id).collect();
            tx.replace_pet_traits(pet_id, &trait_ids).await?;
            debug!("Pet {} trait set replaced ({} trait(s))", pet_id, trait_ids.len());
        }

        if !payload.fields.is_empty() {
            tx.update_pet_fields(pet_id, &payload.fields).await?;
        }

        let pet = tx.load_pet(pet_id).await?;
        tx.commit().await?;

        info!("Updated pet {}", pet_id);
        Ok(pet)
    }

    // ============================================
    // Read
    // ============================================

    pub async fn get_pet(&self, pet_id: i64) -> PetResult<Pet> {
        Ok(self.store.get_pet_by_id(pet_id).await?)
    }

    /// Filtered window of pets in id order, with the unwindowed match count.
    ///
    /// The count and the window are separate reads, so a write committed in
    /// between can leave `count` off by that write. Each read is still
    /// consistent on its own and never shows a half-linked pet.
    pub async fn list_pets(&self, filter: &PetFilter) -> PetResult<PetPage> {
        let count = self.store.count_pets(&filter.unwindowed()).await?;
        let pets = self.store.list_pets(filter).await?;
        Ok(PetPage { count, pets })
    }

    // ============================================
    // Delete
    // ============================================

    /// Removes the pet and its trait links only; groups and traits stay.
    pub async fn delete_pet(&self, pet_id: i64) -> PetResult<()> {
        let mut tx = self.store.begin().await?;
        tx.delete_pet(pet_id).await?;
        tx.commit().await?;

        info!("Deleted pet {}", pet_id);
        Ok(())
    }
}

/// Lower-cased trait names with duplicates removed, first occurrence kept
pub fn normalized_trait_names(names: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .iter()
        .map(|name| normalize_trait_name(name))
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

async fn resolve_traits(tx: &mut dyn PetStoreTx, names: &[String]) -> StoreResult<Vec<PetTrait>> {
    let mut traits = Vec::with_capacity(names.len());
    for name in normalized_trait_names(names) {
        let (resolved, created) = tx.get_or_create_trait_normalized(&name).await?;
        debug!("Resolved trait '{}', created: {}", resolved.name, created);
        traits.push(resolved);
    }
    Ok(traits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::InMemoryPetStore;
    use crate::error::PetError;
    use crate::models::{GroupAttributes, NewPetFields, Sex};

    fn service() -> PetResolutionService {
        PetResolutionService::new(Arc::new(InMemoryPetStore::new()))
    }

    fn payload(group: &str, traits: &[&str]) -> CreatePetPayload {
        CreatePetPayload {
            group: GroupAttributes::new(group),
            traits: traits.iter().map(|t| t.to_string()).collect(),
            fields: NewPetFields {
                name: "Rex".to_string(),
                age: 3,
                weight: 12.5,
                sex: Sex::Male,
            },
        }
    }

    #[test]
    fn test_normalized_trait_names_dedupes_by_identity() {
        let names = vec![
            "Friendly".to_string(),
            "LOYAL".to_string(),
            "friendly".to_string(),
        ];
        assert_eq!(normalized_trait_names(&names), vec!["friendly", "loyal"]);
    }

    #[tokio::test]
    async fn test_duplicate_input_traits_collapse() {
        let service = service();
        let pet = service
            .create_pet(payload("Canis lupus", &["Friendly", "FRIENDLY", "friendly"]))
            .await
            .unwrap();
        assert_eq!(pet.trait_names(), vec!["friendly"]);
        assert_eq!(service.store().list_traits().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_missing_pet_writes_nothing() {
        let service = service();
        let update = UpdatePetPayload {
            group: Some(GroupAttributes::new("Felis catus")),
            traits: Some(vec!["curious".to_string()]),
            ..Default::default()
        };
        let err = service.update_pet(404, update).await.unwrap_err();
        assert!(matches!(err, PetError::NotFound { pet_id: 404 }));

        assert!(service.store().list_groups().await.unwrap().is_empty());
        assert!(service.store().list_traits().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_json_creates_nothing() {
        let service = service();
        let err = service
            .create_pet_from_json(&serde_json::json!({
                "name": "Rex",
                "group": {"scientific_name": "Canis lupus"},
                "traits": [{"name": "loyal"}]
            }))
            .await
            .unwrap_err();

        match err {
            PetError::ValidationFailed(errors) => {
                assert!(errors.contains("age"));
                assert!(errors.contains("weight"));
            }
            other => panic!("expected validation failure, got {:?}", other),
        }
        assert!(service.store().list_groups().await.unwrap().is_empty());
        assert!(service.store().list_traits().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_missing_pet_is_not_found() {
        let service = service();
        let err = service.delete_pet(1).await.unwrap_err();
        assert!(matches!(err, PetError::NotFound { pet_id: 1 }));
    }
}
