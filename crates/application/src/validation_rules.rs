use std::collections::BTreeMap;

use formwork_core::{AppError, AppResult};
use formwork_domain::{FieldSchema, FieldType, FormSchema, Nesting, is_empty_value};
use regex::Regex;
use serde_json::Value;

/// Messages keyed by dotted state path (`contacts.0.phone`).
pub type FieldErrors = BTreeMap<String, Vec<String>>;

const REQUIRED_MESSAGE: &str = "This field is required";
const PATTERN_MESSAGE: &str = "Invalid format";

/// Pattern constraint with its message.
#[derive(Debug, Clone)]
pub struct PatternRule {
    regex: Regex,
    message: String,
}

impl PatternRule {
    /// Returns the pattern source.
    #[must_use]
    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    /// Returns the failure message.
    #[must_use]
    pub fn message(&self) -> &str {
        self.message.as_str()
    }
}

/// Structural constraints derived from one field.
#[derive(Debug, Clone, Default)]
pub struct FieldRules {
    required: Option<String>,
    pattern: Option<PatternRule>,
    min_items: Option<usize>,
    max_items: Option<usize>,
}

impl FieldRules {
    /// Derives constraints from a field. Invalid patterns are schema errors.
    pub fn derive(field: &FieldSchema) -> AppResult<Self> {
        let validation = field.validation();
        let required = field.required().then(|| {
            validation
                .required_message
                .clone()
                .unwrap_or_else(|| REQUIRED_MESSAGE.to_owned())
        });

        let pattern = validation
            .regex
            .as_deref()
            .filter(|source| !source.is_empty())
            .map(|source| {
                Regex::new(source)
                    .map(|regex| PatternRule {
                        regex,
                        message: validation
                            .validation_message
                            .clone()
                            .unwrap_or_else(|| PATTERN_MESSAGE.to_owned()),
                    })
                    .map_err(|error| {
                        AppError::Schema(format!(
                            "field '{}' has an invalid pattern: {error}",
                            field.path()
                        ))
                    })
            })
            .transpose()?;

        let (min_items, max_items) = match field.nesting() {
            Some(Nesting::Array {
                min_items,
                max_items,
            }) => (min_items, max_items),
            _ if field.field_type() == FieldType::Autocomplete && field.is_multiple() => {
                (None, field.autocomplete().max_tags)
            }
            _ => (None, None),
        };

        Ok(Self {
            required,
            pattern,
            min_items,
            max_items,
        })
    }

    /// Returns the required-value message when the field is required.
    #[must_use]
    pub fn required(&self) -> Option<&str> {
        self.required.as_deref()
    }

    /// Returns the pattern constraint.
    #[must_use]
    pub fn pattern(&self) -> Option<&PatternRule> {
        self.pattern.as_ref()
    }

    /// Returns the minimum item count.
    #[must_use]
    pub fn min_items(&self) -> Option<usize> {
        self.min_items
    }

    /// Returns the maximum item count.
    #[must_use]
    pub fn max_items(&self) -> Option<usize> {
        self.max_items
    }

    /// Checks a leaf value.
    #[must_use]
    pub fn check_value(&self, value: &Value) -> Vec<String> {
        if is_empty_value(value) {
            return self.required.iter().cloned().collect();
        }

        let mut messages = Vec::new();
        if let Some(pattern) = &self.pattern {
            let text = match value {
                Value::String(text) => Some(text.clone()),
                Value::Number(number) => Some(number.to_string()),
                _ => None,
            };
            if text.is_some_and(|text| !pattern.regex.is_match(&text)) {
                messages.push(pattern.message.clone());
            }
        }

        if let Value::Array(items) = value
            && let Some(message) = self.check_count(items.len())
        {
            messages.push(message);
        }

        messages
    }

    /// Checks a live item count against the cardinality bounds.
    #[must_use]
    pub fn check_count(&self, count: usize) -> Option<String> {
        if let Some(min) = self.min_items
            && count < min
        {
            return Some(format!("At least {min} items are required"));
        }

        if let Some(max) = self.max_items
            && count > max
        {
            return Some(format!("At most {max} items are allowed"));
        }

        None
    }
}

/// Rules for every field of a schema, keyed by schema path.
#[derive(Debug, Clone, Default)]
pub struct RuleBook {
    rules: BTreeMap<String, FieldRules>,
}

impl RuleBook {
    /// Derives rules for a whole schema.
    pub fn derive(schema: &FormSchema) -> AppResult<Self> {
        let mut rules = BTreeMap::new();
        collect_rules(schema.fields(), &mut rules)?;
        Ok(Self { rules })
    }

    /// Returns rules for a schema path.
    #[must_use]
    pub fn rules_for(&self, schema_path: &str) -> Option<&FieldRules> {
        self.rules.get(schema_path)
    }
}

fn collect_rules(
    fields: &[FieldSchema],
    rules: &mut BTreeMap<String, FieldRules>,
) -> AppResult<()> {
    for field in fields {
        rules.insert(field.path().to_owned(), FieldRules::derive(field)?);
        collect_rules(field.fields(), rules)?;
        if let Some(composite) = field.composite() {
            for item in composite.items() {
                collect_rules(item.fields(), rules)?;
            }
        }
    }

    Ok(())
}

/// Appends a message for `path`.
pub fn push_error(errors: &mut FieldErrors, path: impl Into<String>, message: impl Into<String>) {
    errors.entry(path.into()).or_default().push(message.into());
}

/// Removes every message at or below `path`.
pub fn clear_errors_under(errors: &mut FieldErrors, path: &str) {
    let prefix = format!("{path}.");
    errors.retain(|key, _| key != path && !key.starts_with(&prefix));
}
