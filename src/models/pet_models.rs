//! Pet registry domain models
//!
//! Records held by the Entity Store and the typed payloads produced by the
//! validation boundary. Groups and traits are shared rows identified by their
//! natural keys; a pet references exactly one group and a set of traits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Taxonomic classification, keyed by its exact scientific name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct Group {
    pub id: i64,
    pub scientific_name: String,
    pub created_at: DateTime<Utc>,
}

/// Named characteristic shared by many pets. `name` is always lower-case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct PetTrait {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Pet sex choices
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sex {
    Male,
    Female,
    #[default]
    #[serde(rename = "Not Informed")]
    NotInformed,
}

impl Sex {
    pub const CHOICES: [&'static str; 3] = ["Male", "Female", "Not Informed"];

    pub fn as_db_str(&self) -> &'static str {
        match self {
            Sex::Male => "Male",
            Sex::Female => "Female",
            Sex::NotInformed => "Not Informed",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "Male" => Some(Sex::Male),
            "Female" => Some(Sex::Female),
            "Not Informed" => Some(Sex::NotInformed),
            _ => None,
        }
    }
}

impl std::fmt::Display for Sex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_db_str())
    }
}

/// Fully expanded pet, as returned by every read and write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pet {
    pub id: i64,
    pub name: String,
    pub age: i32,
    pub weight: f64,
    pub sex: Sex,
    pub group: Group,
    /// Ordered by trait name; never contains the same trait twice
    pub traits: Vec<PetTrait>,
}

impl Pet {
    /// Trait names as stored (lower-case)
    pub fn trait_names(&self) -> Vec<&str> {
        self.traits.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn has_trait(&self, name: &str) -> bool {
        self.traits.iter().any(|t| t.name == name)
    }
}

/// Attributes used to resolve (or create) a group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupAttributes {
    pub scientific_name: String,
}

impl GroupAttributes {
    pub fn new(scientific_name: impl Into<String>) -> Self {
        Self {
            scientific_name: scientific_name.into(),
        }
    }
}

/// Scalar fields of a new pet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPetFields {
    pub name: String,
    pub age: i32,
    pub weight: f64,
    #[serde(default)]
    pub sex: Sex,
}

/// Allow-list of scalar fields a partial update may touch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PetFieldUpdates {
    pub name: Option<String>,
    pub age: Option<i32>,
    pub weight: Option<f64>,
    pub sex: Option<Sex>,
}

impl PetFieldUpdates {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.age.is_none() && self.weight.is_none() && self.sex.is_none()
    }
}

/// Validated creation input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatePetPayload {
    pub group: GroupAttributes,
    /// Raw trait names as supplied; normalized during resolution
    pub traits: Vec<String>,
    pub fields: NewPetFields,
}

/// Validated partial update input
///
/// `traits: Some(vec![])` clears the trait set; `None` leaves it untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdatePetPayload {
    pub group: Option<GroupAttributes>,
    pub traits: Option<Vec<String>>,
    pub fields: PetFieldUpdates,
}

/// Normalized trait identity: lower-cased name
pub fn normalize_trait_name(name: &str) -> String {
    name.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sex_serializes_with_display_names() {
        assert_eq!(
            serde_json::to_string(&Sex::NotInformed).unwrap(),
            "\"Not Informed\""
        );
        assert_eq!(serde_json::to_string(&Sex::Male).unwrap(), "\"Male\"");
        assert_eq!(Sex::from_db_str("Female"), Some(Sex::Female));
        assert_eq!(Sex::from_db_str("female"), None);
        assert_eq!(Sex::default(), Sex::NotInformed);
    }

    #[test]
    fn test_field_updates_is_empty() {
        assert!(PetFieldUpdates::default().is_empty());
        let updates = PetFieldUpdates {
            age: Some(4),
            ..Default::default()
        };
        assert!(!updates.is_empty());
    }

    #[test]
    fn test_normalize_trait_name() {
        assert_eq!(normalize_trait_name("FRIENDLY"), "friendly");
        assert_eq!(normalize_trait_name("Friendly"), "friendly");
        assert_eq!(normalize_trait_name("friendly"), "friendly");
    }
}
