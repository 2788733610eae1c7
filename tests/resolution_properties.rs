//! Property tests for natural-key resolution
//!
//! Any mix of casings of the same trait names must resolve to one row per
//! lower-cased name, and re-resolving a scientific name never creates a
//! second group.

use std::collections::BTreeSet;
use std::sync::Arc;

use proptest::prelude::*;

use pet_registry::database::{InMemoryPetStore, PetStore};
use pet_registry::models::{CreatePetPayload, GroupAttributes, NewPetFields, Sex};
use pet_registry::services::normalized_trait_names;
use pet_registry::PetResolutionService;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build runtime")
}

/// Randomly re-case an ASCII name
fn recase(name: &str, mask: u32) -> String {
    name.chars()
        .enumerate()
        .map(|(i, c)| {
            if mask & (1 << (i % 32)) != 0 {
                c.to_ascii_uppercase()
            } else {
                c
            }
        })
        .collect()
}

fn payload(group: &str, traits: Vec<String>) -> CreatePetPayload {
    CreatePetPayload {
        group: GroupAttributes::new(group),
        traits,
        fields: NewPetFields {
            name: "Prop".to_string(),
            age: 1,
            weight: 1.0,
            sex: Sex::NotInformed,
        },
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_normalized_names_are_unique_and_lowercase(
        names in proptest::collection::vec("[a-zA-Z]{1,8}", 0..12)
    ) {
        let normalized = normalized_trait_names(&names);
        let unique: BTreeSet<&String> = normalized.iter().collect();
        prop_assert_eq!(unique.len(), normalized.len());
        prop_assert!(normalized.iter().all(|n| *n == n.to_lowercase()));

        let expected: BTreeSet<String> = names.iter().map(|n| n.to_lowercase()).collect();
        let actual: BTreeSet<String> = normalized.into_iter().collect();
        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn prop_traits_resolve_once_per_lowercase_name(
        names in proptest::collection::vec("[a-z]{1,8}", 1..6),
        masks in proptest::collection::vec(any::<u32>(), 3),
        group in "[A-Z][a-z]{2,10} [a-z]{2,10}",
    ) {
        let rt = runtime();
        let (trait_names, group_count, pet_trait_counts) = rt.block_on(async {
            let store = Arc::new(InMemoryPetStore::new());
            let service = PetResolutionService::new(store.clone());

            let mut pet_trait_counts = Vec::new();
            for mask in &masks {
                let recased: Vec<String> = names.iter().map(|n| recase(n, *mask)).collect();
                let pet = service.create_pet(payload(&group, recased)).await.unwrap();
                pet_trait_counts.push(pet.traits.len());
            }

            let traits: Vec<String> = store
                .list_traits()
                .await
                .unwrap()
                .into_iter()
                .map(|t| t.name)
                .collect();
            let groups = store.list_groups().await.unwrap().len();
            (traits, groups, pet_trait_counts)
        });

        let expected: BTreeSet<String> = names.iter().cloned().collect();
        let stored: BTreeSet<String> = trait_names.iter().cloned().collect();
        prop_assert_eq!(trait_names.len(), expected.len());
        prop_assert_eq!(stored, expected.clone());
        prop_assert_eq!(group_count, 1);
        prop_assert!(pet_trait_counts.iter().all(|c| *c == expected.len()));
    }
}
