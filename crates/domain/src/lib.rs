//! Form schema model, field paths, dependency graph and form state.

#![forbid(unsafe_code)]

mod definition;
mod dependency_graph;
mod entity;
mod field;
mod form_state;
mod path;
mod schema;
mod search_filter;
mod uploaded_file;
mod value;

pub use definition::{
    AutocompleteConfig, CompositeDefinition, CompositeItemDefinition, DataSource, DependsOn,
    FieldDefinition, FieldValidation, FileConfig, ImportBinding, ImportColumnType,
    ImportTextConfig, NestedType, OptionItem, SortOrder,
};
pub use dependency_graph::DependencyGraph;
pub use entity::Entity;
pub use field::{CompositeConfig, CompositeItem, FieldSchema, FieldType, Nesting};
pub use form_state::{ArrayNode, CompositeNode, FormState, StateNode, StateScope, seed_scope};
pub use path::{FieldPath, PathSegment};
pub use schema::FormSchema;
pub use search_filter::SearchFilter;
pub use uploaded_file::{UploadedFile, attachments_from_value, attachments_to_value};
pub use value::is_empty_value;
