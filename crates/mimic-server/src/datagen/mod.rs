//! Schema-driven fake data generation.
//!
//! Priority per node: inline `example`, first of `examples`, random `enum`
//! pick, structural generation, manual per-type fallback. A second pass then
//! rewrites string leaves whose field name or `format` matches a semantic
//! category with a realistic value, so `email` fields carry addresses
//! instead of lorem words.

mod smart;

use crate::config::DataConfig;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{Map, Value};
use smart::SmartField;

/// Recursion guard for self-referential dereferenced schemas.
const MAX_DEPTH: usize = 16;

/// Classified schema node. Traversal is an exhaustive match over this,
/// never duck-typing on the raw JSON.
enum SchemaKind<'a> {
    Object(Option<&'a Map<String, Value>>),
    Array(Option<&'a Value>),
    String { format: Option<&'a str> },
    Integer,
    Number,
    Boolean,
    /// First alternative of a oneOf/anyOf/allOf.
    Composite(&'a Value),
    Unknown,
}

fn classify(schema: &Value) -> SchemaKind<'_> {
    for combinator in ["oneOf", "anyOf", "allOf"] {
        if let Some(first) = schema
            .get(combinator)
            .and_then(Value::as_array)
            .and_then(|alts| alts.first())
        {
            return SchemaKind::Composite(first);
        }
    }

    match schema.get("type").and_then(Value::as_str) {
        Some("object") => SchemaKind::Object(schema.get("properties").and_then(Value::as_object)),
        Some("array") => SchemaKind::Array(schema.get("items")),
        Some("string") => SchemaKind::String {
            format: schema.get("format").and_then(Value::as_str),
        },
        Some("integer") => SchemaKind::Integer,
        Some("number") => SchemaKind::Number,
        Some("boolean") => SchemaKind::Boolean,
        // Untyped nodes with properties are treated as objects.
        None if schema.get("properties").is_some() => {
            SchemaKind::Object(schema.get("properties").and_then(Value::as_object))
        }
        _ => SchemaKind::Unknown,
    }
}

/// Realistic-value generator for schema fragments.
///
/// With a configured seed, all output is reproducible for the lifetime of
/// the instance: every random draw goes through one seeded `StdRng`.
pub struct DataGenerator {
    array_min: usize,
    array_max: usize,
    rng: Mutex<StdRng>,
}

impl DataGenerator {
    pub fn new(data: &DataConfig) -> Self {
        let rng = match data.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            array_min: data.array_min,
            array_max: data.array_max,
            rng: Mutex::new(rng),
        }
    }

    /// Produce a value for `schema`, optionally hinted by the field name the
    /// value will be stored under.
    pub fn generate(&self, schema: Option<&Value>, hint: Option<&str>) -> Value {
        let Some(schema) = schema else {
            return Value::Null;
        };
        let mut rng = self.rng.lock();
        let value = self.generate_value(schema, hint, MAX_DEPTH, &mut rng);
        self.apply_smart_fields(value, schema, hint, &mut rng)
    }

    fn generate_value(
        &self,
        schema: &Value,
        hint: Option<&str>,
        depth: usize,
        rng: &mut StdRng,
    ) -> Value {
        if depth == 0 {
            return Value::Null;
        }

        if let Some(example) = schema.get("example") {
            return example.clone();
        }
        if let Some(first) = schema
            .get("examples")
            .and_then(Value::as_array)
            .and_then(|examples| examples.first())
        {
            return first.clone();
        }
        if let Some(variants) = schema.get("enum").and_then(Value::as_array) {
            if !variants.is_empty() {
                return variants[rng.gen_range(0..variants.len())].clone();
            }
        }

        match classify(schema) {
            SchemaKind::Object(properties) => {
                let mut out = Map::new();
                if let Some(properties) = properties {
                    for (key, prop_schema) in properties {
                        out.insert(
                            key.clone(),
                            self.generate_value(prop_schema, Some(key), depth - 1, rng),
                        );
                    }
                }
                Value::Object(out)
            }
            SchemaKind::Array(items) => {
                let len = self.array_len(rng);
                let values = (0..len)
                    .map(|_| match items {
                        Some(items) => self.generate_value(items, hint, depth - 1, rng),
                        None => Value::Null,
                    })
                    .collect();
                Value::Array(values)
            }
            SchemaKind::String { format } => {
                match SmartField::from_format(format).or_else(|| SmartField::from_field_name(hint))
                {
                    Some(field) => Value::String(field.render(rng)),
                    None => Value::String(smart::lorem_word(rng)),
                }
            }
            SchemaKind::Integer => {
                let min = schema.get("minimum").and_then(Value::as_i64).unwrap_or(0);
                let max = schema
                    .get("maximum")
                    .and_then(Value::as_i64)
                    .unwrap_or(1000)
                    .max(min);
                Value::from(rng.gen_range(min..=max))
            }
            SchemaKind::Number => {
                let min = schema.get("minimum").and_then(Value::as_f64).unwrap_or(0.0);
                let max = schema
                    .get("maximum")
                    .and_then(Value::as_f64)
                    .unwrap_or(1000.0)
                    .max(min);
                let raw = if max > min {
                    rng.gen_range(min..max)
                } else {
                    min
                };
                // Two decimal places keeps payloads readable.
                Value::from((raw * 100.0).round() / 100.0)
            }
            SchemaKind::Boolean => Value::Bool(rng.gen()),
            SchemaKind::Composite(first) => self.generate_value(first, hint, depth - 1, rng),
            SchemaKind::Unknown => Value::Null,
        }
    }

    fn array_len(&self, rng: &mut StdRng) -> usize {
        if self.array_max <= self.array_min {
            self.array_min
        } else {
            rng.gen_range(self.array_min..=self.array_max)
        }
    }

    /// Walk a generated value alongside its schema and override string
    /// leaves that match a semantic category. Always wins over whatever the
    /// structural pass produced.
    fn apply_smart_fields(
        &self,
        value: Value,
        schema: &Value,
        hint: Option<&str>,
        rng: &mut StdRng,
    ) -> Value {
        if value.is_null() {
            return value;
        }

        if let SchemaKind::Composite(first) = classify(schema) {
            return self.apply_smart_fields(value, first, hint, rng);
        }

        match value {
            Value::Array(items) => {
                let item_schema = schema.get("items").cloned().unwrap_or(Value::Null);
                Value::Array(
                    items
                        .into_iter()
                        .map(|item| self.apply_smart_fields(item, &item_schema, hint, rng))
                        .collect(),
                )
            }
            Value::Object(entries) => {
                let empty = Map::new();
                let properties = schema
                    .get("properties")
                    .and_then(Value::as_object)
                    .unwrap_or(&empty);
                let mut out = Map::new();
                for (key, entry) in entries {
                    let prop_schema = properties.get(&key).cloned().unwrap_or(Value::Null);
                    let rewritten = self.apply_smart_fields(entry, &prop_schema, Some(&key), rng);
                    out.insert(key, rewritten);
                }
                Value::Object(out)
            }
            Value::String(text) => {
                let format = schema.get("format").and_then(Value::as_str);
                match SmartField::from_format(format).or_else(|| SmartField::from_field_name(hint))
                {
                    Some(field) => Value::String(field.render(rng)),
                    None => Value::String(text),
                }
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn generator(seed: Option<u64>) -> DataGenerator {
        DataGenerator::new(&DataConfig {
            array_min: 1,
            array_max: 3,
            seed,
        })
    }

    #[test]
    fn test_example_wins_over_everything() {
        let schema = json!({
            "type": "string",
            "example": "fixed",
            "enum": ["a", "b"]
        });
        assert_eq!(generator(None).generate(Some(&schema), None), json!("fixed"));
    }

    #[test]
    fn test_first_of_examples_list() {
        let schema = json!({"type": "integer", "examples": [42, 7]});
        assert_eq!(generator(None).generate(Some(&schema), None), json!(42));
    }

    #[test]
    fn test_enum_pick_is_a_member() {
        let schema = json!({"type": "string", "enum": ["red", "green", "blue"]});
        let value = generator(None).generate(Some(&schema), None);
        let picked = value.as_str().unwrap();
        assert!(["red", "green", "blue"].contains(&picked));
    }

    #[test]
    fn test_object_generation_covers_all_properties() {
        let schema = json!({
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "age": {"type": "integer", "minimum": 18, "maximum": 99},
                "active": {"type": "boolean"}
            }
        });
        let value = generator(None).generate(Some(&schema), None);
        assert!(value["name"].is_string());
        let age = value["age"].as_i64().unwrap();
        assert!((18..=99).contains(&age));
        assert!(value["active"].is_boolean());
    }

    #[test]
    fn test_array_bounds_respected() {
        let schema = json!({"type": "array", "items": {"type": "integer"}});
        for _ in 0..20 {
            let value = generator(None).generate(Some(&schema), None);
            let len = value.as_array().unwrap().len();
            assert!((1..=3).contains(&len));
        }
    }

    #[test]
    fn test_one_of_takes_first_alternative() {
        let schema = json!({
            "oneOf": [
                {"type": "object", "properties": {"kind": {"type": "string"}}},
                {"type": "integer"}
            ]
        });
        let value = generator(None).generate(Some(&schema), None);
        assert!(value.is_object());
    }

    #[test]
    fn test_email_field_looks_like_email() {
        let schema = json!({
            "type": "object",
            "properties": {"email": {"type": "string"}}
        });
        let value = generator(None).generate(Some(&schema), None);
        assert!(value["email"].as_str().unwrap().contains('@'));
    }

    #[test]
    fn test_format_hint_overrides_lorem() {
        let schema = json!({"type": "string", "format": "uuid"});
        let value = generator(None).generate(Some(&schema), Some("whatever"));
        let text = value.as_str().unwrap();
        assert_eq!(text.len(), 36);
        assert_eq!(text.matches('-').count(), 4);
    }

    #[test]
    fn test_missing_schema_is_null() {
        assert_eq!(generator(None).generate(None, None), Value::Null);
        assert_eq!(
            generator(None).generate(Some(&json!({"type": "unknowable"})), None),
            Value::Null
        );
    }

    #[test]
    fn test_seeded_generators_agree() {
        let schema = json!({
            "type": "array",
            "items": {
                "type": "object",
                "properties": {
                    "id": {"type": "string", "format": "uuid"},
                    "name": {"type": "string"},
                    "score": {"type": "number"}
                }
            }
        });

        let a = DataGenerator::new(&DataConfig {
            array_min: 1,
            array_max: 1,
            seed: Some(12345),
        });
        let b = DataGenerator::new(&DataConfig {
            array_min: 1,
            array_max: 1,
            seed: Some(12345),
        });

        let first = a.generate(Some(&schema), None);
        let second = b.generate(Some(&schema), None);
        assert_eq!(first, second);
        assert_eq!(first.as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_deeply_nested_schema_is_capped() {
        let mut schema = json!({"type": "string"});
        for _ in 0..40 {
            schema = json!({
                "type": "object",
                "properties": {"child": schema}
            });
        }
        // Deeper than MAX_DEPTH; generation must still terminate cleanly.
        let value = generator(Some(1)).generate(Some(&schema), None);
        assert!(value.is_object());
    }
}
