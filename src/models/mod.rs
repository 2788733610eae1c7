//! Models module for the pet registry
//!
//! This module contains the records the Entity Store persists (pets, groups,
//! traits) and the typed payloads the resolution service consumes.

pub mod pet_models;

// Re-export commonly used types for convenience
pub use pet_models::{
    normalize_trait_name, CreatePetPayload, Group, GroupAttributes, NewPetFields, Pet,
    PetFieldUpdates, PetTrait, Sex, UpdatePetPayload,
};
