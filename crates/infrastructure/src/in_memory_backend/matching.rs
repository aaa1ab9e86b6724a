use formwork_application::OptionsLookupRequest;
use formwork_domain::{Entity, SortOrder};
use serde_json::{Map, Value};

/// Returns a field as display text; `_id` names the record id.
pub(super) fn display_value(entity: &Entity, field: &str) -> String {
    if field == "_id" {
        return entity.id.clone();
    }

    match entity.field(field) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

/// Renders `{field}` placeholders; missing fields render empty.
pub(super) fn render_template(template: &str, entity: &Entity) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        rendered.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) if close > 0 => {
                rendered.push_str(display_value(entity, &after[..close]).as_str());
                rest = &after[close + 1..];
            }
            _ => {
                rendered.push('{');
                rest = after;
            }
        }
    }

    rendered.push_str(rest);
    rendered
}

/// Builds an option label from the template or the label fields.
pub(super) fn option_label(request: &OptionsLookupRequest, entity: &Entity) -> String {
    if let Some(template) = &request.custom_label {
        return render_template(template, entity);
    }

    [
        Some(request.label_field.as_str()),
        request.label_field2.as_deref(),
        request.label_field3.as_deref(),
    ]
    .into_iter()
    .flatten()
    .map(|field| display_value(entity, field))
    .filter(|part| !part.is_empty())
    .collect::<Vec<_>>()
    .join(" ")
}

/// Exact lookup filter match. A string filter also matches a non-string
/// value with the same spelling.
pub(super) fn lookup_matches(entity: &Entity, filter: &Map<String, Value>) -> bool {
    filter.iter().all(|(key, expected)| {
        let actual = if key == "_id" {
            Some(Value::String(entity.id.clone()))
        } else {
            entity.field(key).cloned()
        };
        match (actual, expected) {
            (Some(actual), expected) if &actual == expected => true,
            (Some(actual), Value::String(expected)) => display(&actual) == *expected,
            _ => false,
        }
    })
}

/// Filter semantics of the record list. Strings match case-insensitive
/// substrings and arrays match when any entry matches. Objects match field by
/// field, other values exactly. Empty values do not constrain.
pub(super) fn filter_matches(entity: &Entity, filters: &Map<String, Value>) -> bool {
    filters
        .iter()
        .all(|(key, expected)| value_matches(entity.field(key), expected))
}

fn value_matches(actual: Option<&Value>, expected: &Value) -> bool {
    match expected {
        Value::Null => true,
        Value::String(text) if text.is_empty() => true,
        Value::String(text) => actual.is_some_and(|actual| contains_text(actual, text)),
        Value::Array(options) if options.is_empty() => true,
        Value::Array(options) => actual.is_some_and(|actual| {
            options.iter().any(|option| match actual {
                Value::Array(values) => {
                    values.iter().any(|value| value_matches(Some(value), option))
                }
                value => value_matches(Some(value), option),
            })
        }),
        Value::Object(fields) => actual.is_some_and(|actual| match actual {
            Value::Object(stored) => fields
                .iter()
                .all(|(key, expected)| value_matches(stored.get(key), expected)),
            Value::Array(items) => items
                .iter()
                .any(|item| value_matches(Some(item), expected)),
            _ => false,
        }),
        exact => actual.is_some_and(|actual| match actual {
            Value::Array(values) => values.contains(exact),
            value => value == exact,
        }),
    }
}

fn contains_text(actual: &Value, text: &str) -> bool {
    let needle = text.to_lowercase();
    match actual {
        Value::String(value) => value.to_lowercase().contains(needle.as_str()),
        Value::Array(items) => items.iter().any(|item| contains_text(item, text)),
        other => other.to_string().to_lowercase().contains(needle.as_str()),
    }
}

/// Free-text search over every string value of a record.
pub(super) fn query_matches(entity: &Entity, query: &str) -> bool {
    let needle = query.to_lowercase();
    entity.data.values().any(|value| match value {
        Value::String(text) => text.to_lowercase().contains(needle.as_str()),
        _ => false,
    })
}

/// Orders lookup rows by a field's display text.
pub(super) fn sort_by_field(rows: &mut [Entity], field: &str, order: SortOrder) {
    rows.sort_by(|left, right| {
        let ordering = display_value(left, field).cmp(&display_value(right, field));
        match order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });
}

fn display(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
