//! Pet Validator - request boundary validation
//!
//! Turns raw JSON bodies into typed payloads before the resolution service
//! runs. Every problem is reported against its field path; nothing reaches
//! the store unless the whole body is valid. Unknown keys are ignored and
//! never applied.

use serde_json::{Map, Value};

use crate::error::ValidationErrors;
use crate::models::{
    normalize_trait_name, CreatePetPayload, GroupAttributes, NewPetFields, PetFieldUpdates, Sex,
    UpdatePetPayload,
};

pub const PET_NAME_MAX_LEN: usize = 50;
pub const SCIENTIFIC_NAME_MAX_LEN: usize = 50;
pub const TRAIT_NAME_MAX_LEN: usize = 20;

const NON_FIELD_ERRORS: &str = "non_field_errors";

const REQUIRED: &str = "This field is required.";
const NOT_NULL: &str = "This field may not be null.";
const NOT_BLANK: &str = "This field may not be blank.";
const INVALID_STRING: &str = "Not a valid string.";
const INVALID_INTEGER: &str = "A valid integer is required.";
const INVALID_NUMBER: &str = "A valid number is required.";
const NOT_NEGATIVE: &str = "Ensure this value is greater than or equal to 0.";

/// Validate a create body. `sex` defaults to "Not Informed"; every other
/// field is required.
pub fn validate_create(body: &Value) -> Result<CreatePetPayload, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let Some(obj) = expect_object(body, &mut errors) else {
        return Err(errors);
    };

    let mut reader = FieldReader::new(obj, "", true, &mut errors);
    let name = reader.field("name", |v| parse_string(v, PET_NAME_MAX_LEN));
    let age = reader.field("age", parse_age);
    let weight = reader.field("weight", parse_weight);
    let sex = reader.optional_field("sex", parse_sex);
    let group = reader.nested("group", parse_group);
    let traits = reader.nested("traits", parse_traits);

    match (name, age, weight, group, traits) {
        (Some(name), Some(age), Some(weight), Some(group), Some(traits)) if errors.is_empty() => {
            Ok(CreatePetPayload {
                group,
                traits,
                fields: NewPetFields {
                    name,
                    age,
                    weight,
                    sex: sex.unwrap_or_default(),
                },
            })
        }
        _ => Err(errors),
    }
}

/// Validate a partial update body. Every field is optional; a present
/// `traits` key (even an empty list) requests full replacement.
pub fn validate_update(body: &Value) -> Result<UpdatePetPayload, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let Some(obj) = expect_object(body, &mut errors) else {
        return Err(errors);
    };

    let mut reader = FieldReader::new(obj, "", false, &mut errors);
    let fields = PetFieldUpdates {
        name: reader.field("name", |v| parse_string(v, PET_NAME_MAX_LEN)),
        age: reader.field("age", parse_age),
        weight: reader.field("weight", parse_weight),
        sex: reader.field("sex", parse_sex),
    };
    let group = reader.nested("group", parse_group);
    let traits = reader.nested("traits", parse_traits);

    errors.into_result(UpdatePetPayload {
        group,
        traits,
        fields,
    })
}

fn expect_object<'a>(body: &'a Value, errors: &mut ValidationErrors) -> Option<&'a Map<String, Value>> {
    match body {
        Value::Object(obj) => Some(obj),
        other => {
            errors.add(
                NON_FIELD_ERRORS,
                format!(
                    "Invalid data. Expected a dictionary, but got {}.",
                    type_name(other)
                ),
            );
            None
        }
    }
}

/// Reads fields of one JSON object, recording errors under `prefix`
struct FieldReader<'a, 'e> {
    obj: &'a Map<String, Value>,
    prefix: &'a str,
    required: bool,
    errors: &'e mut ValidationErrors,
}

impl<'a, 'e> FieldReader<'a, 'e> {
    fn new(
        obj: &'a Map<String, Value>,
        prefix: &'a str,
        required: bool,
        errors: &'e mut ValidationErrors,
    ) -> Self {
        Self {
            obj,
            prefix,
            required,
            errors,
        }
    }

    fn path(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", self.prefix, key)
        }
    }

    /// Present and non-null value, or `None` after recording why not
    fn present(&mut self, key: &str, required: bool) -> Option<&'a Value> {
        match self.obj.get(key) {
            None => {
                if required {
                    let path = self.path(key);
                    self.errors.add(path, REQUIRED);
                }
                None
            }
            Some(Value::Null) => {
                let path = self.path(key);
                self.errors.add(path, NOT_NULL);
                None
            }
            Some(value) => Some(value),
        }
    }

    fn field<T>(&mut self, key: &str, parse: impl FnOnce(&Value) -> Result<T, String>) -> Option<T> {
        let required = self.required;
        self.scalar(key, required, parse)
    }

    fn optional_field<T>(
        &mut self,
        key: &str,
        parse: impl FnOnce(&Value) -> Result<T, String>,
    ) -> Option<T> {
        self.scalar(key, false, parse)
    }

    fn scalar<T>(
        &mut self,
        key: &str,
        required: bool,
        parse: impl FnOnce(&Value) -> Result<T, String>,
    ) -> Option<T> {
        let value = self.present(key, required)?;
        match parse(value) {
            Ok(parsed) => Some(parsed),
            Err(message) => {
                let path = self.path(key);
                self.errors.add(path, message);
                None
            }
        }
    }

    fn nested<T>(
        &mut self,
        key: &str,
        parse: impl FnOnce(&Value, &str, &mut ValidationErrors) -> Option<T>,
    ) -> Option<T> {
        let required = self.required;
        let value = self.present(key, required)?;
        let path = self.path(key);
        parse(value, &path, self.errors)
    }
}

fn parse_group(value: &Value, path: &str, errors: &mut ValidationErrors) -> Option<GroupAttributes> {
    let Value::Object(obj) = value else {
        errors.add(
            path,
            format!(
                "Invalid data. Expected a dictionary, but got {}.",
                type_name(value)
            ),
        );
        return None;
    };

    // Nested group attributes are always required, even on partial update
    let mut reader = FieldReader::new(obj, path, true, errors);
    let scientific_name =
        reader.field("scientific_name", |v| parse_string(v, SCIENTIFIC_NAME_MAX_LEN))?;
    Some(GroupAttributes { scientific_name })
}

fn parse_traits(value: &Value, path: &str, errors: &mut ValidationErrors) -> Option<Vec<String>> {
    let Value::Array(items) = value else {
        errors.add(
            path,
            format!(
                "Expected a list of items but got type \"{}\".",
                type_name(value)
            ),
        );
        return None;
    };

    let mut names = Vec::with_capacity(items.len());
    let mut ok = true;
    for (index, item) in items.iter().enumerate() {
        let item_path = format!("{}.{}", path, index);
        let Value::Object(obj) = item else {
            errors.add(
                item_path,
                format!(
                    "Invalid data. Expected a dictionary, but got {}.",
                    type_name(item)
                ),
            );
            ok = false;
            continue;
        };

        let mut reader = FieldReader::new(obj, &item_path, true, errors);
        match reader.field("name", parse_trait_name) {
            Some(name) => names.push(name),
            None => ok = false,
        }
    }

    ok.then_some(names)
}

fn parse_string(value: &Value, max_len: usize) -> Result<String, String> {
    let raw = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return Err(INVALID_STRING.to_string()),
    };

    if raw.is_empty() {
        return Err(NOT_BLANK.to_string());
    }
    if raw.chars().count() > max_len {
        return Err(format!(
            "Ensure this field has no more than {} characters.",
            max_len
        ));
    }
    Ok(raw)
}

/// Length is enforced on the stored (lower-cased) form, which can be longer
fn parse_trait_name(value: &Value) -> Result<String, String> {
    let raw = parse_string(value, TRAIT_NAME_MAX_LEN)?;
    if normalize_trait_name(&raw).chars().count() > TRAIT_NAME_MAX_LEN {
        return Err(format!(
            "Ensure this field has no more than {} characters.",
            TRAIT_NAME_MAX_LEN
        ));
    }
    Ok(raw)
}

fn parse_integer(value: &Value) -> Result<i64, String> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && f.is_finite()).map(|f| f as i64))
            .ok_or_else(|| INVALID_INTEGER.to_string()),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| INVALID_INTEGER.to_string()),
        _ => Err(INVALID_INTEGER.to_string()),
    }
}

fn parse_age(value: &Value) -> Result<i32, String> {
    let age = parse_integer(value)?;
    if age < 0 {
        return Err(NOT_NEGATIVE.to_string());
    }
    i32::try_from(age)
        .map_err(|_| format!("Ensure this value is less than or equal to {}.", i32::MAX))
}

fn parse_weight(value: &Value) -> Result<f64, String> {
    let weight = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|w| w.is_finite())
    .ok_or_else(|| INVALID_NUMBER.to_string())?;

    if weight < 0.0 {
        return Err(NOT_NEGATIVE.to_string());
    }
    Ok(weight)
}

fn parse_sex(value: &Value) -> Result<Sex, String> {
    let raw = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    Sex::from_db_str(&raw).ok_or_else(|| format!("\"{}\" is not a valid choice.", raw))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "NoneType",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_create_body() {
        let payload = validate_create(&json!({
            "name": "Rex",
            "age": 3,
            "weight": 12.5,
            "sex": "Male",
            "group": {"scientific_name": "Canis lupus"},
            "traits": [{"name": "Friendly"}, {"name": "Loyal"}]
        }))
        .expect("body should validate");

        assert_eq!(payload.fields.name, "Rex");
        assert_eq!(payload.fields.sex, Sex::Male);
        assert_eq!(payload.group.scientific_name, "Canis lupus");
        assert_eq!(payload.traits, vec!["Friendly", "Loyal"]);
    }

    #[test]
    fn test_create_defaults_sex() {
        let payload = validate_create(&json!({
            "name": "Rex",
            "age": 3,
            "weight": 12.5,
            "group": {"scientific_name": "Canis lupus"},
            "traits": []
        }))
        .unwrap();
        assert_eq!(payload.fields.sex, Sex::NotInformed);
    }

    #[test]
    fn test_create_reports_missing_fields() {
        let errors = validate_create(&json!({})).unwrap_err();
        for field in ["name", "age", "weight", "group", "traits"] {
            assert_eq!(errors.messages(field), [REQUIRED], "field {}", field);
        }
        assert!(!errors.contains("sex"));
    }

    #[test]
    fn test_create_reports_nested_errors() {
        let errors = validate_create(&json!({
            "name": "",
            "age": "three",
            "weight": -1,
            "sex": "Unknown",
            "group": {},
            "traits": [{"name": "a-very-long-trait-name-indeed"}, "calm"]
        }))
        .unwrap_err();

        assert_eq!(errors.messages("name"), [NOT_BLANK]);
        assert_eq!(errors.messages("age"), [INVALID_INTEGER]);
        assert_eq!(errors.messages("weight"), [NOT_NEGATIVE]);
        assert_eq!(
            errors.messages("sex"),
            ["\"Unknown\" is not a valid choice."]
        );
        assert_eq!(errors.messages("group.scientific_name"), [REQUIRED]);
        assert_eq!(
            errors.messages("traits.0.name"),
            ["Ensure this field has no more than 20 characters."]
        );
        assert_eq!(
            errors.messages("traits.1"),
            ["Invalid data. Expected a dictionary, but got str."]
        );
    }

    #[test]
    fn test_rejects_null_and_wrong_container_types() {
        let errors = validate_create(&json!({
            "name": null,
            "age": 1,
            "weight": 1.0,
            "group": "Canis lupus",
            "traits": "friendly"
        }))
        .unwrap_err();

        assert_eq!(errors.messages("name"), [NOT_NULL]);
        assert_eq!(
            errors.messages("group"),
            ["Invalid data. Expected a dictionary, but got str."]
        );
        assert_eq!(
            errors.messages("traits"),
            ["Expected a list of items but got type \"str\"."]
        );
    }

    #[test]
    fn test_non_object_body() {
        let errors = validate_update(&json!([1, 2])).unwrap_err();
        assert_eq!(
            errors.messages(NON_FIELD_ERRORS),
            ["Invalid data. Expected a dictionary, but got list."]
        );
    }

    #[test]
    fn test_update_only_name() {
        let payload = validate_update(&json!({"name": "Max"})).unwrap();
        assert_eq!(payload.fields.name.as_deref(), Some("Max"));
        assert!(payload.fields.age.is_none());
        assert!(payload.group.is_none());
        assert!(payload.traits.is_none());
    }

    #[test]
    fn test_update_empty_traits_is_present() {
        let payload = validate_update(&json!({"traits": []})).unwrap();
        assert_eq!(payload.traits, Some(vec![]));
        assert!(payload.fields.is_empty());
    }

    #[test]
    fn test_update_group_requires_scientific_name() {
        let errors = validate_update(&json!({"group": {}})).unwrap_err();
        assert_eq!(errors.messages("group.scientific_name"), [REQUIRED]);
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let payload = validate_update(&json!({"id": 99, "owner": "someone"})).unwrap();
        assert_eq!(payload, UpdatePetPayload::default());
    }

    #[test]
    fn test_numeric_coercions() {
        assert_eq!(parse_age(&json!("4")), Ok(4));
        assert_eq!(parse_age(&json!(4.0)), Ok(4));
        assert_eq!(parse_age(&json!(4.5)), Err(INVALID_INTEGER.to_string()));
        assert_eq!(parse_weight(&json!("2.25")), Ok(2.25));
        assert_eq!(parse_weight(&json!(true)), Err(INVALID_NUMBER.to_string()));
        assert_eq!(parse_string(&json!(12), 50), Ok("12".to_string()));
        assert_eq!(parse_string(&json!(false), 50), Err(INVALID_STRING.to_string()));
    }

    #[test]
    fn test_trait_name_length_checked_after_lowercasing() {
        // U+0130 lower-cases to two chars
        let dotted = "\u{130}".repeat(TRAIT_NAME_MAX_LEN);
        let errors = validate_update(&json!({"traits": [{"name": dotted}]})).unwrap_err();
        assert_eq!(
            errors.messages("traits.0.name"),
            ["Ensure this field has no more than 20 characters."]
        );

        let plain = "A".repeat(TRAIT_NAME_MAX_LEN);
        let payload = validate_update(&json!({"traits": [{"name": plain}]})).unwrap();
        assert_eq!(payload.traits, Some(vec![plain]));
    }
}
