//! Transport shape of a form definition, as authored and as sent back to the
//! record API under `formStructure`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

fn default_true() -> bool {
    true
}

/// Authored field definition before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinition {
    /// Key within the parent scope.
    pub name: String,
    /// Display label.
    #[serde(default)]
    pub title: String,
    /// Field type name.
    #[serde(rename = "type")]
    pub field_type: String,
    /// Whether a value is required.
    #[serde(default)]
    pub required: bool,
    /// Whether the value is frozen once the record exists.
    #[serde(default)]
    pub readonly: bool,
    /// Whether the control accepts edits.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Whether the control is shown.
    #[serde(default = "default_true")]
    pub visible: bool,
    /// Whether the advanced search offers this field.
    #[serde(default)]
    pub is_searchable: bool,
    /// Whether list views show this field.
    #[serde(default)]
    pub is_show_in_list: bool,
    /// Whether the record API enforces a unique value.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_unique: bool,
    /// Whether the record API enforces uniqueness across all group-unique fields.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub group_uniqueness: bool,
    /// Seed value for new records and new repeating-group items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    /// Input placeholder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    /// Pattern and message overrides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<FieldValidation>,
    /// Static choices.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<OptionItem>>,
    /// Dynamic choices.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source: Option<DataSource>,
    /// Child definitions of a nested group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<FieldDefinition>>,
    /// Single nested object or repeating array.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nested_type: Option<NestedType>,
    /// Minimum number of items in a repeating group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array_min_items: Option<usize>,
    /// Maximum number of items in a repeating group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array_max_items: Option<usize>,
    /// Whether the field holds a list of values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_multiple: Option<bool>,
    /// Whether a nested group starts expanded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_open: Option<bool>,
    /// Upload constraints for file fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_config: Option<FileConfig>,
    /// Tag and search behaviour for autocomplete fields.
    #[serde(
        default,
        alias = "autoCompleteStyle",
        skip_serializing_if = "Option::is_none"
    )]
    pub autocomplete_style: Option<AutocompleteConfig>,
    /// Column bindings for bulk tabular paste.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_text_box_style: Option<ImportTextConfig>,
    /// Discriminated sub-shapes of a composite field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composite_fields_style: Option<CompositeDefinition>,
}

impl FieldDefinition {
    /// Creates a minimal definition with the given name, title and type.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        title: impl Into<String>,
        field_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            field_type: field_type.into(),
            required: false,
            readonly: false,
            enabled: true,
            visible: true,
            is_searchable: false,
            is_show_in_list: false,
            is_unique: false,
            group_uniqueness: false,
            default_value: None,
            placeholder: None,
            validation: None,
            options: None,
            data_source: None,
            fields: None,
            nested_type: None,
            array_min_items: None,
            array_max_items: None,
            is_multiple: None,
            is_open: None,
            file_config: None,
            autocomplete_style: None,
            import_text_box_style: None,
            composite_fields_style: None,
        }
    }
}

/// Pattern and message configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldValidation {
    /// Pattern the value must match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
    /// Message shown when a required value is missing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_message: Option<String>,
    /// Message shown when the pattern does not match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_message: Option<String>,
    /// Message returned by the record API for duplicate values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_message: Option<String>,
    /// Message returned by the record API for duplicate value groups.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_unique_message: Option<String>,
}

/// One label/value choice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionItem {
    /// Display text.
    pub label: String,
    /// Stored value.
    pub value: Value,
}

impl OptionItem {
    /// Creates an option.
    #[must_use]
    pub fn new(label: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

/// Sort direction requested from the lookup API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

impl SortOrder {
    /// Returns the query-string value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// One or more sibling field names a data source depends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependsOn {
    /// Single dependency.
    One(String),
    /// Several dependencies, all of which must be present.
    Many(Vec<String>),
}

impl DependsOn {
    /// Returns the dependency names in declaration order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        match self {
            Self::One(name) => vec![name.as_str()],
            Self::Many(names) => names.iter().map(String::as_str).collect(),
        }
    }
}

/// Binding of a choice field to a collection served by the lookup API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSource {
    /// Source collection.
    pub collection_name: String,
    /// Field rendered as the option label.
    pub label_field: String,
    /// Secondary label field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_field2: Option<String>,
    /// Third label field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_field3: Option<String>,
    /// Field stored as the option value.
    pub value_field: String,
    /// Fixed filter merged into every lookup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_query: Option<Map<String, Value>>,
    /// Sort field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_field: Option<String>,
    /// Sort direction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<SortOrder>,
    /// Maximum number of options.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    /// Sibling fields whose values scope the lookup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<DependsOn>,
    /// Label template such as `{firstName} {lastName}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_label: Option<String>,
    /// Polling interval in seconds; zero disables polling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_interval: Option<u64>,
}

impl DataSource {
    /// Returns declared dependency names, empty when the source is independent.
    #[must_use]
    pub fn dependency_names(&self) -> Vec<&str> {
        self.depends_on
            .as_ref()
            .map(DependsOn::names)
            .unwrap_or_default()
    }
}

/// Nesting mode of a group field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NestedType {
    /// One nested record.
    Object,
    /// Ordered repeating records.
    Array,
}

/// Upload constraints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileConfig {
    /// Accepted MIME types (`image/png`), wildcards (`image/*`) or extensions (`.pdf`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_types: Vec<String>,
    /// Maximum size in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<u64>,
    /// Storage directory forwarded to the upload API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
    /// Whether several files are accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multiple: Option<bool>,
}

/// Autocomplete behaviour.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutocompleteConfig {
    /// Whether values outside the option list may be entered.
    #[serde(default)]
    pub allow_new: bool,
    /// Maximum number of selected tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tags: Option<usize>,
    /// Minimum query length before a search is issued.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
}

/// Column type of an import binding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportColumnType {
    /// Plain text.
    #[default]
    Text,
    /// Number, accepting Persian and Arabic digits.
    Number,
    /// Date text.
    Date,
    /// Boolean flag.
    Boolean,
}

/// Maps one pasted column to a row field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportBinding {
    /// Row key.
    pub name: String,
    /// Column caption.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Column type.
    #[serde(default, rename = "type")]
    pub column_type: ImportColumnType,
    /// Whether duplicate values collapse to the latest row.
    #[serde(default)]
    pub is_unique: bool,
    /// Value applied when the cell is missing or empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
}

/// Bulk paste configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportTextConfig {
    /// Textarea rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<u32>,
    /// Textarea placeholder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    /// Column bindings in paste order.
    #[serde(default)]
    pub name_binding: Vec<ImportBinding>,
}

/// One authored composite branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeItemDefinition {
    /// Discriminator label.
    pub label: String,
    /// Discriminant stored under `type`.
    pub value: String,
    /// Branch fields.
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
}

/// Authored composite configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeDefinition {
    /// Available branches.
    pub items: Vec<CompositeItemDefinition>,
    /// Branch selected when the form opens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_item: Option<String>,
}
