use formwork_core::{AppError, AppResult};

use crate::definition::{DependsOn, FieldDefinition};
use crate::dependency_graph::DependencyGraph;
use crate::field::{FieldSchema, FieldType, build_children};
use crate::path::{FieldPath, PathSegment};

/// Validated form definition with its dependency graph.
#[derive(Debug, Clone, PartialEq)]
pub struct FormSchema {
    definitions: Vec<FieldDefinition>,
    fields: Vec<FieldSchema>,
    graph: DependencyGraph,
}

impl FormSchema {
    /// Validates authored definitions.
    pub fn new(definitions: Vec<FieldDefinition>) -> AppResult<Self> {
        let fields = build_children(&definitions, "")?;
        let graph = DependencyGraph::build(&fields)?;

        Ok(Self {
            definitions,
            fields,
            graph,
        })
    }

    /// Parses and validates a JSON array of field definitions.
    pub fn from_json(value: serde_json::Value) -> AppResult<Self> {
        let definitions: Vec<FieldDefinition> = serde_json::from_value(value)
            .map_err(|error| AppError::Schema(format!("invalid form definition: {error}")))?;
        Self::new(definitions)
    }

    /// Returns the authored definitions, forwarded as `formStructure`.
    #[must_use]
    pub fn definitions(&self) -> &[FieldDefinition] {
        &self.definitions
    }

    /// Returns top-level fields.
    #[must_use]
    pub fn fields(&self) -> &[FieldSchema] {
        &self.fields
    }

    /// Returns the dependency graph.
    #[must_use]
    pub fn dependency_graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Finds a field by schema path (`contacts.phone`, no item indices).
    #[must_use]
    pub fn find(&self, schema_path: &str) -> Option<&FieldSchema> {
        let mut scope = self.fields.as_slice();
        let mut found = None;
        let mut parts = schema_path.split('.').peekable();
        while let Some(part) = parts.next() {
            let field = scope.iter().find(|field| field.name() == part)?;
            found = Some(field);
            if parts.peek().is_none() {
                break;
            }

            scope = match field.composite() {
                Some(composite) => {
                    let branch = parts.next()?;
                    composite.item(branch)?.fields()
                }
                None => field.fields(),
            };
        }

        found
    }

    /// Resolves the field addressed by a state path, walking item indices.
    pub fn resolve(&self, path: &FieldPath) -> AppResult<&FieldSchema> {
        let mut scope = self.fields.as_slice();
        let mut found: Option<&FieldSchema> = None;
        let mut segments = path.segments().iter().peekable();

        while let Some(segment) = segments.next() {
            match segment {
                PathSegment::Index(_) => {
                    if !found.is_some_and(FieldSchema::is_array) {
                        return Err(AppError::Validation(format!(
                            "path '{path}' indexes a field that is not a repeating group"
                        )));
                    }
                }
                PathSegment::Key(key) => {
                    let field = scope
                        .iter()
                        .find(|field| field.name() == key.as_str())
                        .ok_or_else(|| {
                            AppError::Validation(format!("path '{path}' names no field '{key}'"))
                        })?;
                    found = Some(field);

                    scope = match field.composite() {
                        Some(composite) => match segments.peek().copied() {
                            Some(PathSegment::Key(branch)) => {
                                segments.next();
                                composite
                                    .item(branch)
                                    .ok_or_else(|| {
                                        AppError::Validation(format!(
                                            "path '{path}' names no branch '{branch}'"
                                        ))
                                    })?
                                    .fields()
                            }
                            _ => &[],
                        },
                        None => field.fields(),
                    };
                }
            }
        }

        found.ok_or_else(|| AppError::Validation("the root path names no field".to_owned()))
    }

    /// Returns top-level field names.
    #[must_use]
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(FieldSchema::name).collect()
    }

    /// Derives the schema rendered by the advanced search: searchable and
    /// visible fields only, never file fields, with requirement and minimum
    /// item constraints removed.
    pub fn searchable_subset(&self) -> AppResult<Self> {
        Self::new(filter_searchable(&self.definitions))
    }
}

fn filter_searchable(definitions: &[FieldDefinition]) -> Vec<FieldDefinition> {
    let mut kept: Vec<FieldDefinition> = definitions
        .iter()
        .filter_map(|definition| {
            if !definition.visible || is_file(definition) {
                return None;
            }

            let mut definition = definition.clone();
            if let Some(children) = definition.fields.take() {
                let children = filter_searchable(&children);
                if children.is_empty() {
                    return None;
                }
                definition.fields = Some(children);
            } else if !definition.is_searchable {
                return None;
            }

            if let Some(style) = definition.composite_fields_style.as_mut() {
                style.default_item = None;
                for item in &mut style.items {
                    item.fields = filter_searchable(&item.fields);
                }
            }

            definition.required = false;
            definition.readonly = false;
            definition.array_min_items = None;
            definition.default_value = None;
            Some(definition)
        })
        .collect();

    let names: Vec<String> = kept.iter().map(|definition| definition.name.clone()).collect();
    for definition in &mut kept {
        if let Some(source) = definition.data_source.as_mut() {
            source.depends_on = match source.depends_on.take() {
                Some(depends_on) => {
                    let remaining: Vec<String> = depends_on
                        .names()
                        .into_iter()
                        .filter(|name| names.iter().any(|kept| kept.as_str() == *name))
                        .map(str::to_owned)
                        .collect();
                    match remaining.len() {
                        0 => None,
                        1 => remaining.into_iter().next().map(DependsOn::One),
                        _ => Some(DependsOn::Many(remaining)),
                    }
                }
                None => None,
            };
        }
    }

    kept
}

fn is_file(definition: &FieldDefinition) -> bool {
    definition
        .field_type
        .parse::<FieldType>()
        .is_ok_and(|field_type| field_type == FieldType::File)
}
