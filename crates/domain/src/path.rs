use std::fmt::{Display, Formatter};
use std::str::FromStr;

use formwork_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// One segment of a dotted field path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathSegment {
    /// Named field, group member or composite branch.
    Key(String),
    /// Position inside a repeating group.
    Index(usize),
}

/// Dotted path addressing one node of a form (`contacts.0.phone`).
///
/// Numeric segments address repeating-group items; every other segment is a
/// field name or a composite discriminant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldPath(Vec<PathSegment>);

impl FieldPath {
    /// Returns the empty root path.
    #[must_use]
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Parses a dotted path.
    pub fn parse(value: &str) -> AppResult<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Ok(Self::root());
        }

        let mut segments = Vec::new();
        for part in trimmed.split('.') {
            if part.is_empty() {
                return Err(AppError::Validation(format!(
                    "field path '{trimmed}' contains an empty segment"
                )));
            }

            if part.bytes().all(|byte| byte.is_ascii_digit()) {
                let index = part.parse::<usize>().map_err(|error| {
                    AppError::Validation(format!(
                        "field path '{trimmed}' has invalid index '{part}': {error}"
                    ))
                })?;
                segments.push(PathSegment::Index(index));
            } else {
                segments.push(PathSegment::Key(part.to_owned()));
            }
        }

        Ok(Self(segments))
    }

    /// Returns a new path with a named child appended.
    #[must_use]
    pub fn child(&self, key: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(PathSegment::Key(key.into()));
        Self(segments)
    }

    /// Returns a new path with an item index appended.
    #[must_use]
    pub fn item(&self, index: usize) -> Self {
        let mut segments = self.0.clone();
        segments.push(PathSegment::Index(index));
        Self(segments)
    }

    /// Returns the path segments.
    #[must_use]
    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    /// Returns whether this is the root path.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the parent path, or `None` at the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            return None;
        }

        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    /// Returns the trailing key segment when the path ends in a name.
    #[must_use]
    pub fn last_key(&self) -> Option<&str> {
        match self.0.last() {
            Some(PathSegment::Key(key)) => Some(key.as_str()),
            _ => None,
        }
    }

    /// Returns whether `prefix` is a leading portion of this path.
    #[must_use]
    pub fn starts_with(&self, prefix: &FieldPath) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Returns the schema-level path: item indices removed.
    #[must_use]
    pub fn schema_path(&self) -> String {
        self.0
            .iter()
            .filter_map(|segment| match segment {
                PathSegment::Key(key) => Some(key.as_str()),
                PathSegment::Index(_) => None,
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Rewrites the item index directly below `array_path`.
    ///
    /// Returns `None` when this path does not live inside the array.
    #[must_use]
    pub fn with_item_index(&self, array_path: &FieldPath, index: usize) -> Option<Self> {
        if !self.starts_with(array_path) {
            return None;
        }

        let position = array_path.0.len();
        match self.0.get(position) {
            Some(PathSegment::Index(_)) => {
                let mut segments = self.0.clone();
                segments[position] = PathSegment::Index(index);
                Some(Self(segments))
            }
            _ => None,
        }
    }

    /// Returns the item index directly below `array_path`, if any.
    #[must_use]
    pub fn item_index_under(&self, array_path: &FieldPath) -> Option<usize> {
        if !self.starts_with(array_path) {
            return None;
        }

        match self.0.get(array_path.0.len()) {
            Some(PathSegment::Index(index)) => Some(*index),
            _ => None,
        }
    }
}

impl Display for FieldPath {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        for (position, segment) in self.0.iter().enumerate() {
            if position > 0 {
                formatter.write_str(".")?;
            }
            match segment {
                PathSegment::Key(key) => formatter.write_str(key)?,
                PathSegment::Index(index) => write!(formatter, "{index}")?,
            }
        }

        Ok(())
    }
}

impl FromStr for FieldPath {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for FieldPath {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value.as_str())
    }
}

impl From<FieldPath> for String {
    fn from(value: FieldPath) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::{FieldPath, PathSegment};

    #[test]
    fn numeric_segments_parse_as_item_indices() {
        let path = FieldPath::parse("contacts.2.phone").unwrap_or_else(|_| unreachable!());
        assert_eq!(
            path.segments(),
            &[
                PathSegment::Key("contacts".to_owned()),
                PathSegment::Index(2),
                PathSegment::Key("phone".to_owned()),
            ]
        );
        assert_eq!(path.schema_path(), "contacts.phone");
        assert_eq!(path.to_string(), "contacts.2.phone");
    }

    #[test]
    fn empty_segments_are_rejected() {
        assert!(FieldPath::parse("contacts..phone").is_err());
    }

    #[test]
    fn item_index_can_be_rewritten_under_an_array() {
        let array = FieldPath::parse("contacts").unwrap_or_else(|_| unreachable!());
        let path = FieldPath::parse("contacts.2.phone").unwrap_or_else(|_| unreachable!());

        assert_eq!(path.item_index_under(&array), Some(2));
        assert_eq!(
            path.with_item_index(&array, 3).map(|path| path.to_string()),
            Some("contacts.3.phone".to_owned())
        );
    }
}
