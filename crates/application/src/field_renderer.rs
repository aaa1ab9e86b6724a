use formwork_core::{AppError, AppResult};
use formwork_domain::{
    FieldPath, FieldSchema, FieldType, FormState, ImportBinding, Nesting, OptionItem, StateNode,
    UploadedFile, attachments_from_value,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::options_resolver::OptionsResolver;
use crate::repeating_group::{RemovalConfirmation, can_insert, can_remove};
use crate::validation_rules::FieldErrors;

pub(crate) const DEFAULT_MIN_SEARCH_LENGTH: usize = 2;

/// Why a form is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormMode {
    /// New record.
    Create,
    /// Existing record.
    Edit,
    /// Advanced-search filter.
    Search,
}

impl FormMode {
    /// Returns the stable name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Edit => "edit",
            Self::Search => "search",
        }
    }
}

/// Presentation of a choice field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SelectStyle {
    /// Drop-down list.
    Dropdown,
    /// Radio buttons.
    Radio,
    /// One checkbox per option.
    CheckboxList,
    /// Button group.
    ToggleGroup,
    /// Multi-select with chips.
    MultiSelect,
}

/// Type-specific part of a control.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Widget {
    /// Native input or textarea.
    Input {
        /// HTML input type.
        input_type: &'static str,
        /// Current value.
        value: Value,
        /// Placeholder text.
        placeholder: Option<String>,
        /// Pattern enforced on submit.
        pattern: Option<String>,
        /// Whether the input spans several lines.
        multiline: bool,
    },
    /// Rich-text editor.
    RichText {
        /// Current HTML.
        value: Value,
    },
    /// Option-based selection.
    Select {
        /// Presentation.
        style: SelectStyle,
        /// Selected value or values.
        value: Value,
        /// Available options.
        options: Vec<OptionItem>,
        /// Whether several options can be selected.
        multiple: bool,
        /// Whether options are being fetched.
        loading: bool,
        /// Last lookup failure.
        error: Option<String>,
    },
    /// Switch or single checkbox.
    Toggle {
        /// Current flag; unset in search forms until chosen.
        value: Option<bool>,
    },
    /// Calendar picker.
    DatePicker {
        /// Selected date or dates.
        value: Value,
        /// Whether several dates can be picked.
        multiple: bool,
    },
    /// Search-as-you-type picker.
    Autocomplete {
        /// Selected tags or free text.
        value: Value,
        /// Current suggestions.
        options: Vec<OptionItem>,
        /// Whether several tags can be selected.
        multiple: bool,
        /// Whether values outside the suggestions are accepted.
        allow_new: bool,
        /// Whether the value is free text rather than tags.
        free_text: bool,
        /// Whether another tag fits under `maxTags`.
        can_add_tag: bool,
        /// Minimum query length before searching.
        min_length: usize,
        /// Whether suggestions are being fetched.
        loading: bool,
        /// Last lookup failure.
        error: Option<String>,
    },
    /// Attachment list with an upload button.
    File {
        /// Current attachments.
        files: Vec<UploadedFile>,
        /// Whether several files are accepted.
        multiple: bool,
        /// Accepted types.
        accept: Vec<String>,
        /// Maximum size in bytes.
        max_size: Option<u64>,
    },
    /// Tab-separated paste box with a preview table.
    ImportText {
        /// Parsed rows.
        rows: Vec<Value>,
        /// Column bindings.
        columns: Vec<ImportBinding>,
        /// Paste box placeholder.
        placeholder: Option<String>,
        /// Paste box height in rows.
        text_rows: Option<u32>,
    },
    /// Static caption.
    Label {
        /// Caption text.
        text: String,
    },
    /// Single nested object.
    Group {
        /// Child controls.
        children: Vec<Control>,
    },
    /// Repeating group.
    Repeater {
        /// Items, newest first.
        items: Vec<RepeaterItem>,
        /// Whether the group is expanded.
        expanded: bool,
        /// Whether the add control is enabled.
        can_add: bool,
        /// Minimum item count.
        min_items: Option<usize>,
        /// Maximum item count.
        max_items: Option<usize>,
    },
    /// Discriminated union.
    Composite {
        /// Discriminator options.
        choices: Vec<OptionItem>,
        /// Selected discriminant.
        selected: Option<String>,
        /// Controls of the selected branch.
        children: Vec<Control>,
    },
}

/// One item of a repeating group.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepeaterItem {
    /// Position in the group.
    pub index: usize,
    /// Controls of the item's fields.
    pub children: Vec<Control>,
    /// Whether the remove control is enabled.
    pub can_remove: bool,
    /// Whether removal awaits confirmation.
    pub confirming_removal: bool,
}

/// Interactive control bound to one form-state node.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Control {
    /// Dotted state path.
    pub path: String,
    /// Field name.
    pub name: String,
    /// Display label.
    pub label: String,
    /// Field type.
    pub field_type: FieldType,
    /// Whether a value is required.
    pub required: bool,
    /// Whether edits are blocked.
    pub disabled: bool,
    /// Whether the control is hidden.
    pub hidden: bool,
    /// Validation and action messages for this path.
    pub errors: Vec<String>,
    /// Type-specific part.
    pub widget: Widget,
}

/// Everything a render pass reads.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    /// Form values.
    pub state: &'a FormState,
    /// Resolved option sets.
    pub options: &'a OptionsResolver,
    /// Messages keyed by state path.
    pub errors: &'a FieldErrors,
    /// Item removal awaiting confirmation.
    pub removal: &'a RemovalConfirmation,
    /// Why the form is open.
    pub mode: FormMode,
}

/// Renders every top-level field.
pub fn render_fields(
    fields: &[FieldSchema],
    context: RenderContext<'_>,
) -> AppResult<Vec<Control>> {
    render_scope(fields, &FieldPath::root(), context)
}

fn render_scope(
    fields: &[FieldSchema],
    scope_path: &FieldPath,
    context: RenderContext<'_>,
) -> AppResult<Vec<Control>> {
    fields
        .iter()
        .map(|field| render_field(field, &scope_path.child(field.name()), context))
        .collect()
}

/// Returns whether edits to `field` are blocked in `mode`.
#[must_use]
pub fn is_disabled(field: &FieldSchema, mode: FormMode) -> bool {
    !field.enabled() || (field.readonly() && mode == FormMode::Edit)
}

/// Renders one field at a concrete state path.
///
/// Fails with a schema error when the state holds no node for the path.
pub fn render_field(
    field: &FieldSchema,
    path: &FieldPath,
    context: RenderContext<'_>,
) -> AppResult<Control> {
    let node = context
        .state
        .get(path)
        .ok_or_else(|| AppError::Schema(format!("field '{path}' has no form state")))?;
    let disabled = is_disabled(field, context.mode);

    let widget = match field.field_type() {
        FieldType::Text
        | FieldType::Email
        | FieldType::Password
        | FieldType::Number
        | FieldType::Textarea
        | FieldType::Date
        | FieldType::Time => Widget::Input {
            input_type: input_type(field.field_type()),
            value: leaf(node, path)?.clone(),
            placeholder: field.placeholder().map(str::to_owned),
            pattern: field.validation().regex.clone(),
            multiline: field.field_type() == FieldType::Textarea,
        },
        FieldType::RichText => Widget::RichText {
            value: leaf(node, path)?.clone(),
        },
        FieldType::Switch => Widget::Toggle {
            value: leaf(node, path)?.as_bool(),
        },
        FieldType::Checkbox if field.options().is_empty() && field.data_source().is_none() => {
            Widget::Toggle {
                value: leaf(node, path)?.as_bool(),
            }
        }
        FieldType::Dropdown
        | FieldType::Checkbox
        | FieldType::Radio
        | FieldType::ToggleGroup
        | FieldType::MultiSelect => {
            let slot = context.options.slot(path);
            Widget::Select {
                style: select_style(field.field_type()),
                value: leaf(node, path)?.clone(),
                options: options_for(field, path, context),
                multiple: field.is_multiple(),
                loading: slot.is_some_and(|slot| slot.loading()),
                error: slot.and_then(|slot| slot.error()).map(str::to_owned),
            }
        }
        FieldType::Datepicker => Widget::DatePicker {
            value: leaf(node, path)?.clone(),
            multiple: field.is_multiple(),
        },
        FieldType::Autocomplete | FieldType::AutocompleteText => {
            let value = leaf(node, path)?.clone();
            let config = field.autocomplete();
            let free_text = field.field_type() == FieldType::AutocompleteText;
            let selected = value.as_array().map_or(0, Vec::len);
            let slot = context.options.slot(path);
            Widget::Autocomplete {
                options: options_for(field, path, context),
                multiple: field.is_multiple(),
                allow_new: config.allow_new || free_text,
                free_text,
                can_add_tag: !disabled
                    && field.is_multiple()
                    && config.max_tags.is_none_or(|max| selected < max),
                min_length: config.min_length.unwrap_or(DEFAULT_MIN_SEARCH_LENGTH),
                loading: slot.is_some_and(|slot| slot.loading()),
                error: slot.and_then(|slot| slot.error()).map(str::to_owned),
                value,
            }
        }
        FieldType::File => {
            let config = field.file_config();
            Widget::File {
                files: attachments_from_value(leaf(node, path)?)?,
                multiple: field.is_multiple(),
                accept: config.allowed_types.clone(),
                max_size: config.max_size,
            }
        }
        FieldType::ImportText => {
            let config = field.import_text();
            Widget::ImportText {
                rows: leaf(node, path)?.as_array().cloned().unwrap_or_default(),
                columns: config.name_binding.clone(),
                placeholder: config.placeholder.clone(),
                text_rows: config.rows,
            }
        }
        FieldType::Label => Widget::Label {
            text: field
                .default_value()
                .and_then(Value::as_str)
                .unwrap_or(field.title())
                .to_owned(),
        },
        FieldType::Group => render_group(field, node, path, disabled, context)?,
        FieldType::Composite => render_composite(field, node, path, context)?,
    };

    Ok(Control {
        path: path.to_string(),
        name: field.name().to_owned(),
        label: field.title().to_owned(),
        field_type: field.field_type(),
        required: field.required() && context.mode != FormMode::Search,
        disabled,
        hidden: !field.visible(),
        errors: context
            .errors
            .get(&path.to_string())
            .cloned()
            .unwrap_or_default(),
        widget,
    })
}

fn render_group(
    field: &FieldSchema,
    node: &StateNode,
    path: &FieldPath,
    disabled: bool,
    context: RenderContext<'_>,
) -> AppResult<Widget> {
    match (field.nesting(), node) {
        (Some(Nesting::Object), StateNode::Group(_)) => Ok(Widget::Group {
            children: render_scope(field.fields(), path, context)?,
        }),
        (
            Some(Nesting::Array {
                min_items,
                max_items,
            }),
            StateNode::Array(array),
        ) => {
            let count = array.len();
            let items = (0..count)
                .map(|index| {
                    Ok(RepeaterItem {
                        index,
                        children: render_scope(field.fields(), &path.item(index), context)?,
                        can_remove: !disabled && can_remove(field, count),
                        confirming_removal: context.removal.is_pending(path, index),
                    })
                })
                .collect::<AppResult<Vec<_>>>()?;

            Ok(Widget::Repeater {
                items,
                expanded: array.expanded(),
                can_add: !disabled && can_insert(field, count),
                min_items,
                max_items,
            })
        }
        _ => Err(AppError::Schema(format!(
            "group field '{path}' does not match its form state"
        ))),
    }
}

fn render_composite(
    field: &FieldSchema,
    node: &StateNode,
    path: &FieldPath,
    context: RenderContext<'_>,
) -> AppResult<Widget> {
    let (Some(config), StateNode::Composite(composite)) = (field.composite(), node) else {
        return Err(AppError::Schema(format!(
            "composite field '{path}' does not match its form state"
        )));
    };

    let choices = config
        .items()
        .iter()
        .map(|item| OptionItem::new(item.label(), item.value()))
        .collect();

    let children = match composite.selected().and_then(|value| config.item(value)) {
        Some(item) => render_scope(item.fields(), &path.child(item.value()), context)?,
        None => Vec::new(),
    };

    Ok(Widget::Composite {
        choices,
        selected: composite.selected().map(str::to_owned),
        children,
    })
}

fn leaf<'a>(node: &'a StateNode, path: &FieldPath) -> AppResult<&'a Value> {
    match node {
        StateNode::Leaf(value) => Ok(value),
        _ => Err(AppError::Schema(format!(
            "field '{path}' expects a value in form state"
        ))),
    }
}

fn options_for(
    field: &FieldSchema,
    path: &FieldPath,
    context: RenderContext<'_>,
) -> Vec<OptionItem> {
    if field.data_source().is_some() {
        context.options.options(path).to_vec()
    } else {
        field.options().to_vec()
    }
}

fn input_type(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::Email => "email",
        FieldType::Password => "password",
        FieldType::Number => "number",
        FieldType::Date => "date",
        FieldType::Time => "time",
        _ => "text",
    }
}

fn select_style(field_type: FieldType) -> SelectStyle {
    match field_type {
        FieldType::Radio => SelectStyle::Radio,
        FieldType::Checkbox => SelectStyle::CheckboxList,
        FieldType::ToggleGroup => SelectStyle::ToggleGroup,
        FieldType::MultiSelect => SelectStyle::MultiSelect,
        _ => SelectStyle::Dropdown,
    }
}
