//! PostgreSQL Entity Store
//!
//! Natural-key uniqueness is enforced by the schema (`groups.scientific_name`,
//! `traits.name`). Get-or-create inserts with `ON CONFLICT DO NOTHING` and,
//! when another request won the race, falls back to reading the committed
//! winner, so concurrent callers always converge on a single row.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use tracing::{debug, warn};

use super::pet_store::{PetFilter, PetStore, PetStoreTx, StoreError, StoreResult};
use crate::models::{
    normalize_trait_name, Group, GroupAttributes, NewPetFields, Pet, PetFieldUpdates, PetTrait,
    Sex,
};

const PET_SELECT: &str = r#"
    SELECT p.id, p.name, p.age, p.weight, p.sex, p.group_id,
           g.scientific_name AS group_scientific_name,
           g.created_at AS group_created_at
    FROM pets p
    JOIN groups g ON g.id = p.group_id
"#;

#[derive(sqlx::FromRow)]
struct PetJoinRow {
    id: i64,
    name: String,
    age: i32,
    weight: f64,
    sex: String,
    group_id: i64,
    group_scientific_name: String,
    group_created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct PetTraitRow {
    pet_id: i64,
    id: i64,
    name: String,
    created_at: DateTime<Utc>,
}

impl PetJoinRow {
    fn into_pet(self, traits: Vec<PetTrait>) -> StoreResult<Pet> {
        let sex = Sex::from_db_str(&self.sex).ok_or_else(|| {
            StoreError::Integrity(format!("pet {} has unknown sex '{}'", self.id, self.sex))
        })?;

        Ok(Pet {
            id: self.id,
            name: self.name,
            age: self.age,
            weight: self.weight,
            sex,
            group: Group {
                id: self.group_id,
                scientific_name: self.group_scientific_name,
                created_at: self.group_created_at,
            },
            traits,
        })
    }
}

/// Traits for a batch of pets, keyed by pet id, each list ordered by name
async fn fetch_traits_for(
    conn: &mut PgConnection,
    pet_ids: &[i64],
) -> StoreResult<HashMap<i64, Vec<PetTrait>>> {
    let rows = sqlx::query_as::<_, PetTraitRow>(
        r#"
        SELECT pt.pet_id, t.id, t.name, t.created_at
        FROM pet_traits pt
        JOIN traits t ON t.id = pt.trait_id
        WHERE pt.pet_id = ANY($1)
        ORDER BY t.name
        "#,
    )
    .bind(pet_ids)
    .fetch_all(&mut *conn)
    .await?;

    let mut by_pet: HashMap<i64, Vec<PetTrait>> = HashMap::new();
    for row in rows {
        by_pet.entry(row.pet_id).or_default().push(PetTrait {
            id: row.id,
            name: row.name,
            created_at: row.created_at,
        });
    }
    Ok(by_pet)
}

async fn expand_rows(conn: &mut PgConnection, rows: Vec<PetJoinRow>) -> StoreResult<Vec<Pet>> {
    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    let mut traits = fetch_traits_for(conn, &ids).await?;
    rows.into_iter()
        .map(|row| {
            let pet_traits = traits.remove(&row.id).unwrap_or_default();
            row.into_pet(pet_traits)
        })
        .collect()
}

async fn load_pet(conn: &mut PgConnection, id: i64, for_update: bool) -> StoreResult<Pet> {
    let sql = if for_update {
        format!("{} WHERE p.id = $1 FOR UPDATE OF p", PET_SELECT)
    } else {
        format!("{} WHERE p.id = $1", PET_SELECT)
    };

    let row = sqlx::query_as::<_, PetJoinRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(StoreError::PetNotFound { pet_id: id })?;

    expand_rows(conn, vec![row])
        .await?
        .pop()
        .ok_or(StoreError::PetNotFound { pet_id: id })
}

async fn link_traits(conn: &mut PgConnection, pet_id: i64, trait_ids: &[i64]) -> StoreResult<()> {
    if trait_ids.is_empty() {
        return Ok(());
    }
    sqlx::query(
        r#"
        INSERT INTO pet_traits (pet_id, trait_id)
        SELECT $1, UNNEST($2::bigint[])
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(pet_id)
    .bind(trait_ids)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Postgres-backed pet store
#[derive(Clone)]
pub struct PgPetStore {
    pool: PgPool,
}

impl PgPetStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl PetStore for PgPetStore {
    async fn begin(&self) -> StoreResult<Box<dyn PetStoreTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgPetStoreTx { tx }))
    }

    async fn find_group_by_scientific_name(&self, name: &str) -> StoreResult<Option<Group>> {
        let group = sqlx::query_as::<_, Group>(
            r#"SELECT id, scientific_name, created_at FROM groups WHERE scientific_name = $1"#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(group)
    }

    async fn list_groups(&self) -> StoreResult<Vec<Group>> {
        let groups = sqlx::query_as::<_, Group>(
            r#"SELECT id, scientific_name, created_at FROM groups ORDER BY id"#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(groups)
    }

    async fn find_trait_by_name_case_insensitive(
        &self,
        name: &str,
    ) -> StoreResult<Option<PetTrait>> {
        // Stored names are lower-case, so an exact match on the normalized
        // input is the case-insensitive match.
        let found = sqlx::query_as::<_, PetTrait>(
            r#"SELECT id, name, created_at FROM traits WHERE name = $1"#,
        )
        .bind(normalize_trait_name(name))
        .fetch_optional(&self.pool)
        .await?;

        Ok(found)
    }

    async fn list_traits(&self) -> StoreResult<Vec<PetTrait>> {
        let traits =
            sqlx::query_as::<_, PetTrait>(r#"SELECT id, name, created_at FROM traits ORDER BY id"#)
                .fetch_all(&self.pool)
                .await?;

        Ok(traits)
    }

    async fn get_pet_by_id(&self, id: i64) -> StoreResult<Pet> {
        let mut conn = self.pool.acquire().await?;
        load_pet(&mut conn, id, false).await
    }

    async fn list_pets(&self, filter: &PetFilter) -> StoreResult<Vec<Pet>> {
        let mut conn = self.pool.acquire().await?;

        let sql = format!(
            r#"{}
            WHERE ($1::text IS NULL OR EXISTS (
                SELECT 1 FROM pet_traits pt
                JOIN traits t ON t.id = pt.trait_id
                WHERE pt.pet_id = p.id AND t.name = $1
            ))
            ORDER BY p.id
            OFFSET $2
            LIMIT $3"#,
            PET_SELECT
        );

        let rows = sqlx::query_as::<_, PetJoinRow>(&sql)
            .bind(filter.trait_name.as_deref())
            .bind(i64::try_from(filter.offset).unwrap_or(i64::MAX))
            .bind(filter.limit.map(|l| i64::try_from(l).unwrap_or(i64::MAX)))
            .fetch_all(&mut *conn)
            .await?;

        expand_rows(&mut conn, rows).await
    }

    async fn count_pets(&self, filter: &PetFilter) -> StoreResult<u64> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM pets p
            WHERE ($1::text IS NULL OR EXISTS (
                SELECT 1 FROM pet_traits pt
                JOIN traits t ON t.id = pt.trait_id
                WHERE pt.pet_id = p.id AND t.name = $1
            ))
            "#,
        )
        .bind(filter.trait_name.as_deref())
        .fetch_one(&self.pool)
        .await?;

        Ok(count.max(0) as u64)
    }
}

/// Unit of work backed by a database transaction
pub struct PgPetStoreTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl PetStoreTx for PgPetStoreTx {
    async fn get_or_create_group(
        &mut self,
        attrs: &GroupAttributes,
    ) -> StoreResult<(Group, bool)> {
        let inserted = sqlx::query_as::<_, Group>(
            r#"
            INSERT INTO groups (scientific_name)
            VALUES ($1)
            ON CONFLICT (scientific_name) DO NOTHING
            RETURNING id, scientific_name, created_at
            "#,
        )
        .bind(&attrs.scientific_name)
        .fetch_optional(&mut *self.tx)
        .await?;

        if let Some(group) = inserted {
            debug!("Created group {} ({})", group.id, group.scientific_name);
            return Ok((group, true));
        }

        let existing = sqlx::query_as::<_, Group>(
            r#"SELECT id, scientific_name, created_at FROM groups WHERE scientific_name = $1"#,
        )
        .bind(&attrs.scientific_name)
        .fetch_optional(&mut *self.tx)
        .await?;

        match existing {
            Some(group) => Ok((group, false)),
            None => {
                warn!(
                    "Group '{}' conflicted on insert but is not readable",
                    attrs.scientific_name
                );
                Err(StoreError::Conflict {
                    entity: "group",
                    key: attrs.scientific_name.clone(),
                })
            }
        }
    }

    async fn get_or_create_trait_normalized(
        &mut self,
        normalized_name: &str,
    ) -> StoreResult<(PetTrait, bool)> {
        let inserted = sqlx::query_as::<_, PetTrait>(
            r#"
            INSERT INTO traits (name)
            VALUES ($1)
            ON CONFLICT (name) DO NOTHING
            RETURNING id, name, created_at
            "#,
        )
        .bind(normalized_name)
        .fetch_optional(&mut *self.tx)
        .await?;

        if let Some(created) = inserted {
            debug!("Created trait {} ({})", created.id, created.name);
            return Ok((created, true));
        }

        let existing = sqlx::query_as::<_, PetTrait>(
            r#"SELECT id, name, created_at FROM traits WHERE name = $1"#,
        )
        .bind(normalized_name)
        .fetch_optional(&mut *self.tx)
        .await?;

        match existing {
            Some(found) => Ok((found, false)),
            None => {
                warn!(
                    "Trait '{}' conflicted on insert but is not readable",
                    normalized_name
                );
                Err(StoreError::Conflict {
                    entity: "trait",
                    key: normalized_name.to_string(),
                })
            }
        }
    }

    async fn create_pet(
        &mut self,
        group_id: i64,
        trait_ids: &[i64],
        fields: &NewPetFields,
    ) -> StoreResult<i64> {
        let (pet_id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO pets (name, age, weight, sex, group_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(&fields.name)
        .bind(fields.age)
        .bind(fields.weight)
        .bind(fields.sex.as_db_str())
        .bind(group_id)
        .fetch_one(&mut *self.tx)
        .await?;

        link_traits(&mut self.tx, pet_id, trait_ids).await?;
        Ok(pet_id)
    }

    async fn load_pet(&mut self, id: i64) -> StoreResult<Pet> {
        load_pet(&mut self.tx, id, true).await
    }

    async fn update_pet_fields(&mut self, id: i64, updates: &PetFieldUpdates) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE pets SET
                name = COALESCE($2, name),
                age = COALESCE($3, age),
                weight = COALESCE($4, weight),
                sex = COALESCE($5, sex)
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(updates.name.as_deref())
        .bind(updates.age)
        .bind(updates.weight)
        .bind(updates.sex.map(|s| s.as_db_str()))
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::PetNotFound { pet_id: id });
        }
        Ok(())
    }

    async fn set_pet_group(&mut self, id: i64, group_id: i64) -> StoreResult<()> {
        let result = sqlx::query(r#"UPDATE pets SET group_id = $2 WHERE id = $1"#)
            .bind(id)
            .bind(group_id)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::PetNotFound { pet_id: id });
        }
        Ok(())
    }

    async fn replace_pet_traits(&mut self, id: i64, trait_ids: &[i64]) -> StoreResult<()> {
        let exists = sqlx::query(r#"SELECT 1 FROM pets WHERE id = $1 FOR UPDATE"#)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        if exists.is_none() {
            return Err(StoreError::PetNotFound { pet_id: id });
        }

        sqlx::query(r#"DELETE FROM pet_traits WHERE pet_id = $1"#)
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        link_traits(&mut self.tx, id, trait_ids).await
    }

    async fn delete_pet(&mut self, id: i64) -> StoreResult<()> {
        // pet_traits rows go with the pet (ON DELETE CASCADE)
        let result = sqlx::query(r#"DELETE FROM pets WHERE id = $1"#)
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::PetNotFound { pet_id: id });
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
