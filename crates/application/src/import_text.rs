use formwork_domain::{ImportBinding, ImportColumnType, ImportTextConfig};
use serde_json::{Map, Number, Value};

/// Parses pasted tab-separated text into row objects keyed by binding name.
///
/// Defaults are applied first and non-empty cells override them. When a
/// binding is unique, only the latest row carrying a given value survives.
#[must_use]
pub fn parse_import_text(config: &ImportTextConfig, text: &str) -> Vec<Map<String, Value>> {
    let bindings = config.name_binding.as_slice();
    let rows: Vec<Map<String, Value>> = text
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .map(|line| parse_row(bindings, line))
        .collect();

    dedupe_unique(bindings, rows)
}

fn parse_row(bindings: &[ImportBinding], line: &str) -> Map<String, Value> {
    let mut row = Map::new();
    for binding in bindings {
        if let Some(default) = &binding.default_value {
            row.insert(binding.name.clone(), default_cell(binding, default));
        }
    }

    for (binding, cell) in bindings.iter().zip(line.split('\t')) {
        let cell = cell.trim();
        if cell.is_empty() && binding.default_value.is_some() {
            continue;
        }
        row.insert(binding.name.clone(), convert_cell(binding.column_type, cell));
    }

    row
}

fn default_cell(binding: &ImportBinding, default: &Value) -> Value {
    match (binding.column_type, default) {
        (ImportColumnType::Number, Value::Number(_)) => default.clone(),
        (ImportColumnType::Number, Value::String(text)) => {
            number_value(&latin_digits(text.trim())).unwrap_or_else(|| Value::from(0))
        }
        (ImportColumnType::Number, _) => Value::from(0),
        (ImportColumnType::Boolean, Value::Bool(_)) => default.clone(),
        (ImportColumnType::Boolean, Value::String(text)) => Value::Bool(truthy(text)),
        (_, Value::String(text)) => Value::String(text.clone()),
        (_, other) => Value::String(other.to_string()),
    }
}

fn convert_cell(column_type: ImportColumnType, cell: &str) -> Value {
    match column_type {
        ImportColumnType::Number if cell.is_empty() => Value::from(0),
        ImportColumnType::Number => {
            let digits = latin_digits(cell);
            number_value(&digits).unwrap_or(Value::String(digits))
        }
        ImportColumnType::Boolean => Value::Bool(truthy(cell)),
        ImportColumnType::Text | ImportColumnType::Date => Value::String(cell.to_owned()),
    }
}

fn truthy(text: &str) -> bool {
    matches!(
        text.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes"
    )
}

fn number_value(text: &str) -> Option<Value> {
    if let Ok(integer) = text.parse::<i64>() {
        return Some(Value::from(integer));
    }

    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

/// Replaces Persian and Arabic-Indic digits with ASCII digits.
#[must_use]
pub fn latin_digits(text: &str) -> String {
    text.chars()
        .map(|character| match character {
            '۰'..='۹' => shift_digit(character, '۰'),
            '٠'..='٩' => shift_digit(character, '٠'),
            _ => character,
        })
        .collect()
}

fn shift_digit(character: char, zero: char) -> char {
    let offset = u32::from(character) - u32::from(zero);
    char::from_digit(offset, 10).unwrap_or(character)
}

fn dedupe_unique(
    bindings: &[ImportBinding],
    rows: Vec<Map<String, Value>>,
) -> Vec<Map<String, Value>> {
    let unique: Vec<&str> = bindings
        .iter()
        .filter(|binding| binding.is_unique)
        .map(|binding| binding.name.as_str())
        .collect();
    if unique.is_empty() {
        return rows;
    }

    let key = |row: &Map<String, Value>, name: &str| -> Option<String> {
        match row.get(name)? {
            Value::String(text) if text.is_empty() => None,
            Value::String(text) => Some(text.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    };

    let superseded = |index: usize, row: &Map<String, Value>| {
        unique.iter().any(|name| {
            key(row, name).is_some_and(|value| {
                rows[index + 1..]
                    .iter()
                    .any(|later| key(later, name).as_deref() == Some(value.as_str()))
            })
        })
    };

    rows.iter()
        .enumerate()
        .filter(|(index, row)| !superseded(*index, row))
        .map(|(_, row)| row.clone())
        .collect()
}
