use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use formwork_core::{AppError, AppResult};

use crate::field::FieldSchema;

/// Directed graph of `dataSource.dependsOn` edges between schema paths.
///
/// Dependencies name siblings in the same scope; a field inside a repeating
/// group depends on fields of the same item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    order: Vec<String>,
    dependencies: BTreeMap<String, Vec<String>>,
    dependents: BTreeMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// Builds and validates the graph for a field tree.
    pub fn build(fields: &[FieldSchema]) -> AppResult<Self> {
        let mut declared = Vec::new();
        collect_paths(fields, &mut declared);
        let known: BTreeSet<&str> = declared.iter().map(String::as_str).collect();

        let mut dependencies: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut dependents: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut edges = Vec::new();
        collect_edges(fields, &mut edges);

        for (dependent, parent, names) in edges {
            for name in names {
                let dependency = if parent.is_empty() {
                    name.clone()
                } else {
                    format!("{parent}.{name}")
                };

                if dependency == dependent {
                    return Err(AppError::Schema(format!(
                        "field '{dependent}' depends on itself"
                    )));
                }

                if !known.contains(dependency.as_str()) {
                    return Err(AppError::Schema(format!(
                        "field '{dependent}' depends on unknown sibling '{name}'"
                    )));
                }

                dependencies
                    .entry(dependent.clone())
                    .or_default()
                    .push(dependency.clone());
                dependents
                    .entry(dependency)
                    .or_default()
                    .push(dependent.clone());
            }
        }

        let order = topological_order(&declared, &dependencies, &dependents)?;

        Ok(Self {
            order,
            dependencies,
            dependents,
        })
    }

    /// Returns every schema path in dependency order.
    #[must_use]
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Returns the schema paths `path` depends on.
    #[must_use]
    pub fn dependencies_of(&self, path: &str) -> &[String] {
        self.dependencies
            .get(path)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Returns the direct dependents of `path`.
    #[must_use]
    pub fn dependents_of(&self, path: &str) -> &[String] {
        self.dependents
            .get(path)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Returns every field transitively affected by a change to `path`, in
    /// topological order. `path` itself is excluded.
    #[must_use]
    pub fn affected_by(&self, path: &str) -> Vec<String> {
        let mut reached = BTreeSet::new();
        let mut queue = VecDeque::from([path.to_owned()]);
        while let Some(current) = queue.pop_front() {
            for dependent in self.dependents_of(current.as_str()) {
                if reached.insert(dependent.clone()) {
                    queue.push_back(dependent.clone());
                }
            }
        }

        self.order
            .iter()
            .filter(|candidate| reached.contains(*candidate))
            .cloned()
            .collect()
    }
}

fn collect_paths(fields: &[FieldSchema], paths: &mut Vec<String>) {
    for field in fields {
        paths.push(field.path().to_owned());
        collect_paths(field.fields(), paths);
        if let Some(composite) = field.composite() {
            for item in composite.items() {
                collect_paths(item.fields(), paths);
            }
        }
    }
}

fn collect_edges(fields: &[FieldSchema], edges: &mut Vec<(String, String, Vec<String>)>) {
    for field in fields {
        if let Some(source) = field.data_source() {
            let names: Vec<String> = source
                .dependency_names()
                .into_iter()
                .map(str::to_owned)
                .collect();
            if !names.is_empty() {
                let parent = field
                    .path()
                    .rsplit_once('.')
                    .map(|(parent, _)| parent.to_owned())
                    .unwrap_or_default();
                edges.push((field.path().to_owned(), parent, names));
            }
        }

        collect_edges(field.fields(), edges);
        if let Some(composite) = field.composite() {
            for item in composite.items() {
                collect_edges(item.fields(), edges);
            }
        }
    }
}

fn topological_order(
    declared: &[String],
    dependencies: &BTreeMap<String, Vec<String>>,
    dependents: &BTreeMap<String, Vec<String>>,
) -> AppResult<Vec<String>> {
    let mut in_degree: HashMap<&str, usize> = declared
        .iter()
        .map(|path| {
            let degree = dependencies.get(path).map(Vec::len).unwrap_or(0);
            (path.as_str(), degree)
        })
        .collect();

    let mut queue: VecDeque<&str> = declared
        .iter()
        .map(String::as_str)
        .filter(|path| in_degree.get(path).copied() == Some(0))
        .collect();

    let mut order = Vec::with_capacity(declared.len());
    while let Some(path) = queue.pop_front() {
        order.push(path.to_owned());
        for dependent in dependents.get(path).map(Vec::as_slice).unwrap_or_default() {
            if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(dependent.as_str());
                }
            }
        }
    }

    if order.len() != declared.len() {
        let cyclic: Vec<&str> = declared
            .iter()
            .map(String::as_str)
            .filter(|path| in_degree.get(path).copied().unwrap_or(0) > 0)
            .collect();
        return Err(AppError::Schema(format!(
            "dependsOn cycle between fields: {}",
            cyclic.join(", ")
        )));
    }

    Ok(order)
}
