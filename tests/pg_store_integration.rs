//! Integration tests for the Postgres Entity Store
//!
//! These tests verify that:
//! 1. Get-or-create converges on one row under concurrent transactions
//! 2. A failed request leaves no partial writes behind
//! 3. Deleting a pet keeps its group and traits
//!
//! Requires: DATABASE_URL environment variable and `database` feature.
//! Tests return early when DATABASE_URL is not set.

#![cfg(feature = "database")]

use std::sync::Arc;

use sqlx::PgPool;
use tokio::sync::Barrier;

use pet_registry::database::{DatabaseConfig, DatabaseManager, PetFilter, PetStore, PgPetStore};
use pet_registry::models::{CreatePetPayload, GroupAttributes, NewPetFields, Sex};
use pet_registry::{PetError, PetResolutionService};

// =========================================================================
// TEST INFRASTRUCTURE
// =========================================================================

struct TestDb {
    pool: PgPool,
    prefix: String,
}

impl TestDb {
    async fn connect() -> Option<Self> {
        let url = std::env::var("TEST_DATABASE_URL")
            .or_else(|_| std::env::var("DATABASE_URL"))
            .ok()?;

        let manager = DatabaseManager::new(DatabaseConfig {
            database_url: url,
            ..DatabaseConfig::default()
        })
        .await
        .expect("Failed to connect to test database");
        manager
            .run_migrations()
            .await
            .expect("Failed to run migrations");

        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .subsec_nanos();
        let prefix = format!("t{:08x}", nanos);
        Some(Self {
            pool: manager.pool().clone(),
            prefix,
        })
    }

    /// Unique, lower-case, at most 20 chars (fits the traits column)
    fn name(&self, base: &str) -> String {
        format!("{}{}", self.prefix, base).chars().take(20).collect()
    }

    fn service(&self) -> PetResolutionService {
        PetResolutionService::new(Arc::new(PgPetStore::new(self.pool.clone())))
    }

    async fn trait_rows(&self, name: &str) -> i64 {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM traits WHERE name = $1")
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .unwrap();
        count
    }

    async fn cleanup(&self) {
        let pattern = format!("{}%", self.prefix);
        sqlx::query(
            r#"DELETE FROM pets WHERE group_id IN
               (SELECT id FROM groups WHERE scientific_name LIKE $1)"#,
        )
        .bind(&pattern)
        .execute(&self.pool)
        .await
        .ok();
        sqlx::query("DELETE FROM groups WHERE scientific_name LIKE $1")
            .bind(&pattern)
            .execute(&self.pool)
            .await
            .ok();
        sqlx::query(
            r#"DELETE FROM traits WHERE name LIKE $1
               AND NOT EXISTS (SELECT 1 FROM pet_traits pt WHERE pt.trait_id = traits.id)"#,
        )
        .bind(&pattern)
        .execute(&self.pool)
        .await
        .ok();
    }
}

fn new_pet(name: &str, group: &str, traits: &[String]) -> CreatePetPayload {
    CreatePetPayload {
        group: GroupAttributes::new(group),
        traits: traits.to_vec(),
        fields: NewPetFields {
            name: name.to_string(),
            age: 2,
            weight: 3.5,
            sex: Sex::Female,
        },
    }
}

// =========================================================================
// TESTS
// =========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_converge_on_one_trait() {
    let Some(db) = TestDb::connect().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };
    const N: usize = 8;
    let rare = db.name("rare");
    let group = db.name("Group");
    let barrier = Arc::new(Barrier::new(N));

    let handles: Vec<_> = (0..N)
        .map(|i| {
            let service = db.service();
            let barrier = barrier.clone();
            let traits = vec![rare.to_uppercase()];
            let group = group.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                service
                    .create_pet(new_pet(&format!("pet-{}", i), &group, &traits))
                    .await
            })
        })
        .collect();

    for handle in handles {
        handle.await.expect("task panicked").expect("create failed");
    }

    assert_eq!(db.trait_rows(&rare).await, 1);
    let page = db
        .service()
        .list_pets(&PetFilter::with_trait(rare.clone()))
        .await
        .unwrap();
    assert_eq!(page.count, N as u64);

    db.cleanup().await;
}

#[tokio::test]
async fn test_failed_create_leaves_nothing_behind() {
    let Some(db) = TestDb::connect().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };
    let group = db.name("Orphan");
    let orphan_trait = db.name("orphan");

    // Negative age passes the typed payload but violates the schema CHECK
    let mut payload = new_pet("Bad", &group, &[orphan_trait.clone()]);
    payload.fields.age = -1;
    let err = db.service().create_pet(payload).await.unwrap_err();
    assert!(matches!(err, PetError::Store(_)));

    let store = PgPetStore::new(db.pool.clone());
    assert!(store
        .find_group_by_scientific_name(&group)
        .await
        .unwrap()
        .is_none());
    assert_eq!(db.trait_rows(&orphan_trait).await, 0);

    db.cleanup().await;
}

#[tokio::test]
async fn test_update_and_delete_keep_shared_rows() {
    let Some(db) = TestDb::connect().await else {
        eprintln!("DATABASE_URL not set, skipping");
        return;
    };
    let service = db.service();
    let group = db.name("Keep");
    let a = db.name("a");
    let b = db.name("b");
    let c = db.name("c");

    let pet = service
        .create_pet(new_pet("Keeper", &group, &[a.clone(), b.clone()]))
        .await
        .unwrap();
    assert_eq!(pet.traits.len(), 2);

    let updated = service
        .update_pet_from_json(
            pet.id,
            &serde_json::json!({"name": "Renamed", "traits": [{"name": c.to_uppercase()}]}),
        )
        .await
        .unwrap();
    assert_eq!(updated.name, "Renamed");
    assert_eq!(updated.group, pet.group);
    assert_eq!(updated.trait_names(), vec![c.as_str()]);

    service.delete_pet(pet.id).await.unwrap();
    assert!(matches!(
        service.get_pet(pet.id).await,
        Err(PetError::NotFound { .. })
    ));

    let store = PgPetStore::new(db.pool.clone());
    assert!(store
        .find_group_by_scientific_name(&group)
        .await
        .unwrap()
        .is_some());
    for name in [&a, &b, &c] {
        assert_eq!(db.trait_rows(name).await, 1);
    }

    db.cleanup().await;
}
