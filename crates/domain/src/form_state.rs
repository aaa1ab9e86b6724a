use std::collections::BTreeMap;

use formwork_core::{AppError, AppResult};
use serde_json::{Map, Value};

use crate::field::{CompositeItem, FieldSchema, FieldType, Nesting};
use crate::path::{FieldPath, PathSegment};
use crate::schema::FormSchema;
use crate::uploaded_file::{attachments_from_value, attachments_to_value};

/// Named child nodes of one scope: the form root, a nested object, an array
/// item or a composite branch.
pub type StateScope = BTreeMap<String, StateNode>;

/// One node of the form-state tree.
#[derive(Debug, Clone, PartialEq)]
pub enum StateNode {
    /// Current value of an editable field.
    Leaf(Value),
    /// Single nested object.
    Group(StateScope),
    /// Repeating group.
    Array(ArrayNode),
    /// Discriminated union with one scope per visited branch.
    Composite(CompositeNode),
}

/// Items of a repeating group plus its expand/collapse flag.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayNode {
    items: Vec<StateScope>,
    expanded: bool,
}

impl ArrayNode {
    /// Returns the items in display order.
    #[must_use]
    pub fn items(&self) -> &[StateScope] {
        &self.items
    }

    /// Returns the item count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns whether the group holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns whether the group is expanded.
    #[must_use]
    pub fn expanded(&self) -> bool {
        self.expanded
    }

    /// Sets the expand/collapse flag.
    pub fn set_expanded(&mut self, expanded: bool) {
        self.expanded = expanded;
    }

    /// Inserts an item at `index`, clamped to the current length.
    pub fn insert(&mut self, index: usize, item: StateScope) {
        let index = index.min(self.items.len());
        self.items.insert(index, item);
    }

    /// Removes and returns the item at `index`.
    pub fn remove(&mut self, index: usize) -> Option<StateScope> {
        (index < self.items.len()).then(|| self.items.remove(index))
    }
}

/// Composite selection and every branch visited so far.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeNode {
    selected: Option<String>,
    branches: BTreeMap<String, StateScope>,
}

impl CompositeNode {
    /// Returns the selected discriminant.
    #[must_use]
    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Returns the scope of a visited branch.
    #[must_use]
    pub fn branch(&self, value: &str) -> Option<&StateScope> {
        self.branches.get(value)
    }

    /// Returns whether a branch has been visited.
    #[must_use]
    pub fn visited(&self, value: &str) -> bool {
        self.branches.contains_key(value)
    }

    /// Selects a branch. A first visit seeds its fields from their defaults;
    /// revisits keep the values left there. Returns whether this was a first visit.
    pub fn select(&mut self, item: &CompositeItem) -> bool {
        self.selected = Some(item.value().to_owned());
        if self.branches.contains_key(item.value()) {
            return false;
        }

        self.branches
            .insert(item.value().to_owned(), seed_scope(item.fields()));
        true
    }
}

/// The mutable value tree behind one open form.
///
/// Every leaf corresponds to exactly one schema field; nodes are only
/// created from schema fields.
#[derive(Debug, Clone, PartialEq)]
pub struct FormState {
    root: StateScope,
}

enum Cursor<'a> {
    Scope(&'a StateScope),
    Node(&'a StateNode),
}

enum CursorMut<'a> {
    Scope(&'a mut StateScope),
    Node(&'a mut StateNode),
}

impl FormState {
    /// Creates the state for a new record, seeded from defaults.
    #[must_use]
    pub fn empty(schema: &FormSchema) -> Self {
        Self {
            root: seed_scope(schema.fields()),
        }
    }

    /// Creates the state for an existing record. Keys the schema does not
    /// declare are ignored; declared keys missing from `data` are seeded.
    pub fn hydrate(schema: &FormSchema, data: &Map<String, Value>) -> AppResult<Self> {
        Ok(Self {
            root: hydrate_scope(schema.fields(), data)?,
        })
    }

    /// Returns the root scope.
    #[must_use]
    pub fn root(&self) -> &StateScope {
        &self.root
    }

    /// Returns the node at `path`.
    #[must_use]
    pub fn get(&self, path: &FieldPath) -> Option<&StateNode> {
        match self.walk(path)? {
            Cursor::Node(node) => Some(node),
            Cursor::Scope(_) => None,
        }
    }

    /// Returns the leaf value at `path`.
    #[must_use]
    pub fn value(&self, path: &FieldPath) -> Option<&Value> {
        match self.get(path)? {
            StateNode::Leaf(value) => Some(value),
            _ => None,
        }
    }

    /// Replaces the leaf value at `path`.
    pub fn set_value(&mut self, path: &FieldPath, value: Value) -> AppResult<()> {
        match self.node_mut(path) {
            Some(StateNode::Leaf(current)) => {
                *current = value;
                Ok(())
            }
            Some(_) => Err(AppError::Validation(format!(
                "path '{path}' does not hold a value"
            ))),
            None => Err(AppError::Validation(format!(
                "path '{path}' is not part of the form"
            ))),
        }
    }

    /// Returns the repeating group at `path`.
    #[must_use]
    pub fn array(&self, path: &FieldPath) -> Option<&ArrayNode> {
        match self.get(path)? {
            StateNode::Array(node) => Some(node),
            _ => None,
        }
    }

    /// Returns the repeating group at `path` for mutation.
    pub fn array_mut(&mut self, path: &FieldPath) -> Option<&mut ArrayNode> {
        match self.node_mut(path)? {
            StateNode::Array(node) => Some(node),
            _ => None,
        }
    }

    /// Returns the composite at `path`.
    #[must_use]
    pub fn composite(&self, path: &FieldPath) -> Option<&CompositeNode> {
        match self.get(path)? {
            StateNode::Composite(node) => Some(node),
            _ => None,
        }
    }

    /// Returns the composite at `path` for mutation.
    pub fn composite_mut(&mut self, path: &FieldPath) -> Option<&mut CompositeNode> {
        match self.node_mut(path)? {
            StateNode::Composite(node) => Some(node),
            _ => None,
        }
    }

    /// Builds the plain payload sent to the record API.
    ///
    /// Labels are skipped; composites emit only the selected branch as
    /// `{"type": <selected>, <selected>: {...}}`.
    #[must_use]
    pub fn to_payload(&self, fields: &[FieldSchema]) -> Map<String, Value> {
        scope_payload(fields, &self.root)
    }

    /// Returns the path of every leaf, including unselected composite branches.
    #[must_use]
    pub fn leaf_paths(&self) -> Vec<FieldPath> {
        let mut paths = Vec::new();
        collect_leaves(&self.root, &FieldPath::root(), &mut paths);
        paths
    }

    fn walk(&self, path: &FieldPath) -> Option<Cursor<'_>> {
        let mut cursor = Cursor::Scope(&self.root);
        for segment in path.segments() {
            cursor = match (cursor, segment) {
                (Cursor::Scope(scope), PathSegment::Key(key))
                | (Cursor::Node(StateNode::Group(scope)), PathSegment::Key(key)) => {
                    Cursor::Node(scope.get(key)?)
                }
                (Cursor::Node(StateNode::Composite(node)), PathSegment::Key(key)) => {
                    Cursor::Scope(node.branches.get(key)?)
                }
                (Cursor::Node(StateNode::Array(node)), PathSegment::Index(index)) => {
                    Cursor::Scope(node.items.get(*index)?)
                }
                _ => return None,
            };
        }

        Some(cursor)
    }

    fn walk_mut(&mut self, path: &FieldPath) -> Option<CursorMut<'_>> {
        let mut cursor = CursorMut::Scope(&mut self.root);
        for segment in path.segments() {
            cursor = match (cursor, segment) {
                (CursorMut::Scope(scope), PathSegment::Key(key))
                | (CursorMut::Node(StateNode::Group(scope)), PathSegment::Key(key)) => {
                    CursorMut::Node(scope.get_mut(key)?)
                }
                (CursorMut::Node(StateNode::Composite(node)), PathSegment::Key(key)) => {
                    CursorMut::Scope(node.branches.get_mut(key)?)
                }
                (CursorMut::Node(StateNode::Array(node)), PathSegment::Index(index)) => {
                    CursorMut::Scope(node.items.get_mut(*index)?)
                }
                _ => return None,
            };
        }

        Some(cursor)
    }

    fn node_mut(&mut self, path: &FieldPath) -> Option<&mut StateNode> {
        match self.walk_mut(path)? {
            CursorMut::Node(node) => Some(node),
            CursorMut::Scope(_) => None,
        }
    }
}

/// Seeds a fresh scope for `fields`, as used for new records and new items.
#[must_use]
pub fn seed_scope(fields: &[FieldSchema]) -> StateScope {
    fields
        .iter()
        .map(|field| (field.name().to_owned(), seed_node(field)))
        .collect()
}

fn seed_node(field: &FieldSchema) -> StateNode {
    match field.nesting() {
        Some(Nesting::Object) => StateNode::Group(seed_scope(field.fields())),
        Some(Nesting::Array { min_items, .. }) => StateNode::Array(ArrayNode {
            items: (0..min_items.unwrap_or(0))
                .map(|_| seed_scope(field.fields()))
                .collect(),
            expanded: field.is_open(),
        }),
        None => match field.composite() {
            Some(composite) => {
                let mut node = CompositeNode {
                    selected: None,
                    branches: BTreeMap::new(),
                };
                if let Some(item) = composite
                    .default_item()
                    .and_then(|value| composite.item(value))
                {
                    node.select(item);
                }
                StateNode::Composite(node)
            }
            None => StateNode::Leaf(field.initial_value()),
        },
    }
}

fn hydrate_scope(fields: &[FieldSchema], data: &Map<String, Value>) -> AppResult<StateScope> {
    fields
        .iter()
        .map(|field| {
            let node = match data.get(field.name()) {
                Some(value) => hydrate_node(field, value)?,
                None => seed_node(field),
            };
            Ok((field.name().to_owned(), node))
        })
        .collect()
}

fn hydrate_node(field: &FieldSchema, value: &Value) -> AppResult<StateNode> {
    match (field.nesting(), value) {
        (Some(Nesting::Object), Value::Object(map)) => {
            return Ok(StateNode::Group(hydrate_scope(field.fields(), map)?));
        }
        (Some(Nesting::Array { .. }), Value::Array(items)) => {
            let items = items
                .iter()
                .map(|item| match item {
                    Value::Object(map) => hydrate_scope(field.fields(), map),
                    _ => Ok(seed_scope(field.fields())),
                })
                .collect::<AppResult<Vec<_>>>()?;
            return Ok(StateNode::Array(ArrayNode {
                items,
                expanded: field.is_open(),
            }));
        }
        (Some(_), _) => return Ok(seed_node(field)),
        (None, _) => {}
    }

    if let Some(composite) = field.composite() {
        let StateNode::Composite(mut node) = seed_node(field) else {
            return Ok(seed_node(field));
        };
        let selected = value
            .get("type")
            .and_then(Value::as_str)
            .and_then(|discriminant| composite.item(discriminant));
        if let Some(item) = selected {
            let branch = match value.get(item.value()) {
                Some(Value::Object(map)) => hydrate_scope(item.fields(), map)?,
                _ => seed_scope(item.fields()),
            };
            node.selected = Some(item.value().to_owned());
            node.branches.insert(item.value().to_owned(), branch);
        }
        return Ok(StateNode::Composite(node));
    }

    let value = match field.field_type() {
        FieldType::Label => Value::Null,
        FieldType::File => {
            attachments_to_value(&attachments_from_value(value)?, field.is_multiple())?
        }
        _ => value.clone(),
    };

    Ok(StateNode::Leaf(value))
}

fn scope_payload(fields: &[FieldSchema], scope: &StateScope) -> Map<String, Value> {
    let mut payload = Map::new();
    for field in fields {
        if field.field_type() == FieldType::Label {
            continue;
        }

        let Some(node) = scope.get(field.name()) else {
            continue;
        };

        let value = match node {
            StateNode::Leaf(value) => value.clone(),
            StateNode::Group(children) => Value::Object(scope_payload(field.fields(), children)),
            StateNode::Array(array) => Value::Array(
                array
                    .items
                    .iter()
                    .map(|item| Value::Object(scope_payload(field.fields(), item)))
                    .collect(),
            ),
            StateNode::Composite(node) => composite_payload(field, node),
        };
        payload.insert(field.name().to_owned(), value);
    }

    payload
}

fn composite_payload(field: &FieldSchema, node: &CompositeNode) -> Value {
    let selected = node
        .selected()
        .and_then(|value| field.composite()?.item(value));
    let Some(item) = selected else {
        return Value::Null;
    };

    let branch = node
        .branch(item.value())
        .map(|scope| scope_payload(item.fields(), scope))
        .unwrap_or_default();

    let mut payload = Map::new();
    payload.insert("type".to_owned(), Value::String(item.value().to_owned()));
    payload.insert(item.value().to_owned(), Value::Object(branch));
    Value::Object(payload)
}

fn collect_leaves(scope: &StateScope, prefix: &FieldPath, paths: &mut Vec<FieldPath>) {
    for (name, node) in scope {
        let path = prefix.child(name.clone());
        match node {
            StateNode::Leaf(_) => paths.push(path),
            StateNode::Group(children) => collect_leaves(children, &path, paths),
            StateNode::Array(array) => {
                for (index, item) in array.items.iter().enumerate() {
                    collect_leaves(item, &path.item(index), paths);
                }
            }
            StateNode::Composite(composite) => {
                for (value, branch) in &composite.branches {
                    collect_leaves(branch, &path.child(value.clone()), paths);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests;
