use std::collections::HashSet;
use std::str::FromStr;

use formwork_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::definition::{
    AutocompleteConfig, DataSource, FieldDefinition, FieldValidation, FileConfig,
    ImportTextConfig, NestedType, OptionItem,
};

/// Closed set of renderable field types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum FieldType {
    /// Single-line text.
    Text,
    /// Email address.
    Email,
    /// Masked text.
    Password,
    /// Numeric input.
    Number,
    /// Multi-line text.
    Textarea,
    /// Native date input.
    Date,
    /// Native time input.
    Time,
    /// Select list.
    Dropdown,
    /// Single flag or multi-choice checkbox list.
    Checkbox,
    /// Radio buttons.
    Radio,
    /// On/off switch.
    Switch,
    /// Button group.
    ToggleGroup,
    /// Calendar picker, optionally multi-date.
    Datepicker,
    /// File attachments.
    File,
    /// Searchable tag picker.
    Autocomplete,
    /// Free text with suggestions.
    AutocompleteText,
    /// Always-multi select.
    MultiSelect,
    /// Discriminated union of sub-shapes.
    Composite,
    /// Bulk tabular paste.
    ImportText,
    /// Non-editable caption.
    Label,
    /// Formatted text.
    RichText,
    /// Nested object or repeating group.
    Group,
}

impl FieldType {
    /// Every variant, in declaration order.
    pub const ALL: [Self; 22] = [
        Self::Text,
        Self::Email,
        Self::Password,
        Self::Number,
        Self::Textarea,
        Self::Date,
        Self::Time,
        Self::Dropdown,
        Self::Checkbox,
        Self::Radio,
        Self::Switch,
        Self::ToggleGroup,
        Self::Datepicker,
        Self::File,
        Self::Autocomplete,
        Self::AutocompleteText,
        Self::MultiSelect,
        Self::Composite,
        Self::ImportText,
        Self::Label,
        Self::RichText,
        Self::Group,
    ];

    /// Returns the canonical type name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Email => "email",
            Self::Password => "password",
            Self::Number => "number",
            Self::Textarea => "textarea",
            Self::Date => "date",
            Self::Time => "time",
            Self::Dropdown => "dropdown",
            Self::Checkbox => "checkbox",
            Self::Radio => "radio",
            Self::Switch => "switch",
            Self::ToggleGroup => "toggle-group",
            Self::Datepicker => "datepicker",
            Self::File => "file",
            Self::Autocomplete => "autocomplete",
            Self::AutocompleteText => "autocomplete-text",
            Self::MultiSelect => "shadcn-multiselect",
            Self::Composite => "composite",
            Self::ImportText => "import-text",
            Self::Label => "label",
            Self::RichText => "richtext",
            Self::Group => "group",
        }
    }

    /// Returns whether the field draws its value from an option list.
    #[must_use]
    pub fn is_choice(&self) -> bool {
        matches!(
            self,
            Self::Dropdown
                | Self::Checkbox
                | Self::Radio
                | Self::ToggleGroup
                | Self::Autocomplete
                | Self::AutocompleteText
                | Self::MultiSelect
        )
    }

    /// Returns whether the field owns child fields instead of a value.
    #[must_use]
    pub fn is_container(&self) -> bool {
        matches!(self, Self::Group | Self::Composite)
    }
}

impl FromStr for FieldType {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "text" => Ok(Self::Text),
            "email" => Ok(Self::Email),
            "password" => Ok(Self::Password),
            "number" => Ok(Self::Number),
            "textarea" => Ok(Self::Textarea),
            "date" => Ok(Self::Date),
            "time" => Ok(Self::Time),
            "dropdown" => Ok(Self::Dropdown),
            "checkbox" => Ok(Self::Checkbox),
            "radio" => Ok(Self::Radio),
            "switch" => Ok(Self::Switch),
            "toggle-group" | "togglegroup" => Ok(Self::ToggleGroup),
            "datepicker" => Ok(Self::Datepicker),
            "file" => Ok(Self::File),
            "autocomplete" => Ok(Self::Autocomplete),
            "autocomplete-text" | "autoCompleteText" => Ok(Self::AutocompleteText),
            "shadcn-multiselect" | "shadcnmultiselect" => Ok(Self::MultiSelect),
            "composite" | "compositefields" => Ok(Self::Composite),
            "import-text" | "importTextBox" => Ok(Self::ImportText),
            "label" => Ok(Self::Label),
            "richtext" | "richtextbox" => Ok(Self::RichText),
            "group" => Ok(Self::Group),
            _ => Err(AppError::Schema(format!("unknown field type '{value}'"))),
        }
    }
}

impl TryFrom<String> for FieldType {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_str(value.as_str())
    }
}

impl From<FieldType> for &'static str {
    fn from(value: FieldType) -> Self {
        value.as_str()
    }
}

/// Nesting of a group field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Nesting {
    /// A single nested record.
    Object,
    /// Ordered items bounded by optional cardinality limits.
    Array {
        /// Minimum item count.
        min_items: Option<usize>,
        /// Maximum item count.
        max_items: Option<usize>,
    },
}

/// One validated composite branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeItem {
    label: String,
    value: String,
    fields: Vec<FieldSchema>,
}

impl CompositeItem {
    /// Returns the discriminator label.
    #[must_use]
    pub fn label(&self) -> &str {
        self.label.as_str()
    }

    /// Returns the discriminant.
    #[must_use]
    pub fn value(&self) -> &str {
        self.value.as_str()
    }

    /// Returns the branch fields.
    #[must_use]
    pub fn fields(&self) -> &[FieldSchema] {
        &self.fields
    }
}

/// Validated composite configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeConfig {
    items: Vec<CompositeItem>,
    default_item: Option<String>,
}

impl CompositeConfig {
    /// Returns available branches.
    #[must_use]
    pub fn items(&self) -> &[CompositeItem] {
        &self.items
    }

    /// Returns the branch selected on open.
    #[must_use]
    pub fn default_item(&self) -> Option<&str> {
        self.default_item.as_deref()
    }

    /// Finds a branch by discriminant.
    #[must_use]
    pub fn item(&self, value: &str) -> Option<&CompositeItem> {
        self.items.iter().find(|item| item.value == value)
    }
}

/// One validated node of a form schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    name: String,
    path: String,
    title: String,
    field_type: FieldType,
    required: bool,
    readonly: bool,
    enabled: bool,
    visible: bool,
    searchable: bool,
    show_in_list: bool,
    unique: bool,
    default_value: Option<Value>,
    placeholder: Option<String>,
    validation: FieldValidation,
    options: Vec<OptionItem>,
    data_source: Option<DataSource>,
    fields: Vec<FieldSchema>,
    nesting: Option<Nesting>,
    multiple: bool,
    open: bool,
    file_config: FileConfig,
    autocomplete: AutocompleteConfig,
    import_text: ImportTextConfig,
    composite: Option<CompositeConfig>,
}

impl FieldSchema {
    /// Validates an authored definition below `parent_path` (empty at the root).
    pub fn from_definition(definition: &FieldDefinition, parent_path: &str) -> AppResult<Self> {
        let name = definition.name.trim();
        let path = if parent_path.is_empty() {
            name.to_owned()
        } else {
            format!("{parent_path}.{name}")
        };

        validate_name(name, &path)?;

        let declared_type = FieldType::from_str(definition.field_type.as_str())
            .map_err(|_| {
                AppError::Schema(format!(
                    "field '{path}' has unknown type '{}'",
                    definition.field_type
                ))
            })?;

        let nesting = match (definition.nested_type, declared_type) {
            (Some(NestedType::Array), _) => Some(Nesting::Array {
                min_items: definition.array_min_items,
                max_items: definition.array_max_items,
            }),
            (Some(NestedType::Object), _) | (None, FieldType::Group) => Some(Nesting::Object),
            (None, _) => None,
        };
        let field_type = if nesting.is_some() {
            FieldType::Group
        } else {
            declared_type
        };

        if let Some(Nesting::Array {
            min_items: Some(min),
            max_items: Some(max),
        }) = nesting
            && min > max
        {
            return Err(AppError::Schema(format!(
                "field '{path}' has arrayMinItems {min} greater than arrayMaxItems {max}"
            )));
        }

        let fields = if field_type == FieldType::Group {
            let children = definition.fields.as_deref().unwrap_or_default();
            if children.is_empty() {
                return Err(AppError::Schema(format!(
                    "group field '{path}' declares no child fields"
                )));
            }
            build_children(children, &path)?
        } else {
            Vec::new()
        };

        let composite = if field_type == FieldType::Composite {
            Some(build_composite(definition, &path)?)
        } else {
            None
        };

        let multiple = match field_type {
            FieldType::MultiSelect => true,
            FieldType::File => definition
                .is_multiple
                .or(definition.file_config.as_ref().and_then(|config| config.multiple))
                .unwrap_or(false),
            FieldType::Dropdown
            | FieldType::Checkbox
            | FieldType::ToggleGroup
            | FieldType::Datepicker
            | FieldType::Autocomplete => definition.is_multiple.unwrap_or(false),
            _ => false,
        };

        Ok(Self {
            name: name.to_owned(),
            path,
            title: definition.title.clone(),
            field_type,
            required: definition.required,
            readonly: definition.readonly,
            enabled: definition.enabled,
            visible: definition.visible,
            searchable: definition.is_searchable,
            show_in_list: definition.is_show_in_list,
            unique: definition.is_unique || definition.group_uniqueness,
            default_value: definition.default_value.clone(),
            placeholder: definition.placeholder.clone(),
            validation: definition.validation.clone().unwrap_or_default(),
            options: definition.options.clone().unwrap_or_default(),
            data_source: definition.data_source.clone(),
            fields,
            nesting,
            multiple,
            open: definition.is_open.unwrap_or(false),
            file_config: definition.file_config.clone().unwrap_or_default(),
            autocomplete: definition.autocomplete_style.clone().unwrap_or_default(),
            import_text: definition.import_text_box_style.clone().unwrap_or_default(),
            composite,
        })
    }

    /// Returns the key within the parent scope.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the dotted schema path (no item indices).
    #[must_use]
    pub fn path(&self) -> &str {
        self.path.as_str()
    }

    /// Returns the display label.
    #[must_use]
    pub fn title(&self) -> &str {
        self.title.as_str()
    }

    /// Returns the field type.
    #[must_use]
    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    /// Returns whether a value is required.
    #[must_use]
    pub fn required(&self) -> bool {
        self.required
    }

    /// Returns whether edits are blocked for existing records.
    #[must_use]
    pub fn readonly(&self) -> bool {
        self.readonly
    }

    /// Returns whether edits are accepted.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Returns whether the control is shown.
    #[must_use]
    pub fn visible(&self) -> bool {
        self.visible
    }

    /// Returns whether the advanced search offers this field.
    #[must_use]
    pub fn searchable(&self) -> bool {
        self.searchable
    }

    /// Returns whether list views show this field.
    #[must_use]
    pub fn show_in_list(&self) -> bool {
        self.show_in_list
    }

    /// Returns whether the record API enforces uniqueness on this field.
    #[must_use]
    pub fn unique(&self) -> bool {
        self.unique
    }

    /// Returns the authored default value.
    #[must_use]
    pub fn default_value(&self) -> Option<&Value> {
        self.default_value.as_ref()
    }

    /// Returns the placeholder text.
    #[must_use]
    pub fn placeholder(&self) -> Option<&str> {
        self.placeholder.as_deref()
    }

    /// Returns pattern and message configuration.
    #[must_use]
    pub fn validation(&self) -> &FieldValidation {
        &self.validation
    }

    /// Returns static options.
    #[must_use]
    pub fn options(&self) -> &[OptionItem] {
        &self.options
    }

    /// Returns the dynamic data source.
    #[must_use]
    pub fn data_source(&self) -> Option<&DataSource> {
        self.data_source.as_ref()
    }

    /// Returns child fields of a group.
    #[must_use]
    pub fn fields(&self) -> &[FieldSchema] {
        &self.fields
    }

    /// Returns nesting for group fields.
    #[must_use]
    pub fn nesting(&self) -> Option<Nesting> {
        self.nesting
    }

    /// Returns whether the field holds a list of values.
    #[must_use]
    pub fn is_multiple(&self) -> bool {
        self.multiple
    }

    /// Returns whether a group starts expanded.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Returns upload constraints.
    #[must_use]
    pub fn file_config(&self) -> &FileConfig {
        &self.file_config
    }

    /// Returns autocomplete behaviour.
    #[must_use]
    pub fn autocomplete(&self) -> &AutocompleteConfig {
        &self.autocomplete
    }

    /// Returns import bindings.
    #[must_use]
    pub fn import_text(&self) -> &ImportTextConfig {
        &self.import_text
    }

    /// Returns composite branches.
    #[must_use]
    pub fn composite(&self) -> Option<&CompositeConfig> {
        self.composite.as_ref()
    }

    /// Returns whether the field is a repeating group.
    #[must_use]
    pub fn is_array(&self) -> bool {
        matches!(self.nesting, Some(Nesting::Array { .. }))
    }

    /// Returns the value a cleared field takes.
    #[must_use]
    pub fn empty_value(&self) -> Value {
        if self.multiple {
            return Value::Array(Vec::new());
        }

        match self.field_type {
            FieldType::File | FieldType::Label => Value::Null,
            FieldType::Switch => Value::Bool(false),
            FieldType::Checkbox if self.options.is_empty() && self.data_source.is_none() => {
                Value::Bool(false)
            }
            FieldType::ImportText => Value::Array(Vec::new()),
            _ => Value::String(String::new()),
        }
    }

    /// Returns the authored default, or the empty value.
    #[must_use]
    pub fn initial_value(&self) -> Value {
        match (&self.default_value, self.field_type) {
            (_, FieldType::Label) => Value::Null,
            (Some(value), _) => value.clone(),
            (None, _) => self.empty_value(),
        }
    }
}

fn validate_name(name: &str, path: &str) -> AppResult<()> {
    if name.is_empty() {
        return Err(AppError::Schema(format!(
            "a field below '{path}' has an empty name"
        )));
    }

    if name.contains('.') {
        return Err(AppError::Schema(format!(
            "field '{path}' must not contain '.' in its name"
        )));
    }

    if name.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(AppError::Schema(format!(
            "field '{path}' must not use a numeric name"
        )));
    }

    Ok(())
}

/// Validates sibling definitions below `parent_path`.
pub(crate) fn build_children(
    definitions: &[FieldDefinition],
    parent_path: &str,
) -> AppResult<Vec<FieldSchema>> {
    let mut seen = HashSet::new();
    let mut fields = Vec::with_capacity(definitions.len());
    for definition in definitions {
        let field = FieldSchema::from_definition(definition, parent_path)?;
        if !seen.insert(field.name.clone()) {
            return Err(AppError::Schema(format!(
                "duplicate field name '{}'",
                field.path
            )));
        }
        fields.push(field);
    }

    Ok(fields)
}

fn build_composite(definition: &FieldDefinition, path: &str) -> AppResult<CompositeConfig> {
    let Some(style) = definition.composite_fields_style.as_ref() else {
        return Err(AppError::Schema(format!(
            "composite field '{path}' declares no compositeFieldsStyle"
        )));
    };

    if style.items.is_empty() {
        return Err(AppError::Schema(format!(
            "composite field '{path}' declares no items"
        )));
    }

    let mut seen = HashSet::new();
    let mut items = Vec::with_capacity(style.items.len());
    for item in &style.items {
        let value = item.value.trim();
        if value == "type" {
            return Err(AppError::Schema(format!(
                "composite field '{path}' must not use 'type' as a discriminant"
            )));
        }
        validate_name(value, &format!("{path}.{value}"))?;
        if !seen.insert(value.to_owned()) {
            return Err(AppError::Schema(format!(
                "composite field '{path}' repeats discriminant '{value}'"
            )));
        }

        let branch_path = format!("{path}.{value}");
        items.push(CompositeItem {
            label: item.label.clone(),
            value: value.to_owned(),
            fields: build_children(&item.fields, &branch_path)?,
        });
    }

    if let Some(default_item) = style.default_item.as_deref()
        && !seen.contains(default_item)
    {
        return Err(AppError::Schema(format!(
            "composite field '{path}' defaults to unknown item '{default_item}'"
        )));
    }

    Ok(CompositeConfig {
        items,
        default_item: style.default_item.clone(),
    })
}
