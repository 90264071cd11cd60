use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single typed option value stored in a [`Settings`] tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<OptionValue>),
}

impl OptionValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            Self::Text(text) => match text.to_lowercase().as_str() {
                "yes" | "true" => Some(true),
                "no" | "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            Self::Text(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
            Self::List(values) => {
                for (index, value) in values.iter().enumerate() {
                    if index > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{value}")?;
                }

                Ok(())
            }
        }
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for OptionValue {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<u32> for OptionValue {
    fn from(value: u32) -> Self {
        Self::Int(value.into())
    }
}

impl From<f64> for OptionValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl<T: Into<OptionValue>> From<Vec<T>> for OptionValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

/// A node of the tree, either a leaf value or a nested block
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Value(OptionValue),
    Branch(Settings),
}

#[derive(Debug, Clone, PartialEq)]
struct Entry {
    // key as it was first written, used when rendering input files
    key: String,
    node: Node,
}

/// Ordered, case-insensitive settings tree addressed by dotted paths.
///
/// Writing `scf.iterations` creates the `scf` block if needed; writing a path
/// that already exists overwrites it, so the last write wins. Lookups ignore
/// case but rendering keeps the spelling of the first write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    entries: IndexMap<String, Entry>,
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('.').map(str::trim).filter(|segment| !segment.is_empty())
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// set `path` to `value`, creating intermediate blocks on the way
    pub fn set(&mut self, path: &str, value: impl Into<OptionValue>) -> &mut Self {
        let parts = segments(path).collect::<Vec<_>>();

        if let Some((last, blocks)) = parts.split_last() {
            let mut current = &mut *self;

            for block in blocks {
                current = current.branch_or_insert(block);
            }

            let lower = last.to_lowercase();
            let key = current
                .entries
                .get(&lower)
                .map(|existing| existing.key.clone())
                .unwrap_or_else(|| (*last).to_owned());

            current.entries.insert(
                lower,
                Entry {
                    key,
                    node: Node::Value(value.into()),
                },
            );
        }

        self
    }

    /// return the block at `key`, replacing a leaf value if one is in the way
    fn branch_or_insert(&mut self, key: &str) -> &mut Settings {
        let entry = self
            .entries
            .entry(key.to_lowercase())
            .or_insert_with(|| Entry {
                key: key.to_owned(),
                node: Node::Branch(Settings::new()),
            });

        if !matches!(entry.node, Node::Branch(_)) {
            entry.node = Node::Branch(Settings::new());
        }

        match entry.node {
            Node::Branch(ref mut settings) => settings,
            Node::Value(_) => unreachable!("leaf was replaced by a block above"),
        }
    }

    pub fn node(&self, path: &str) -> Option<&Node> {
        let parts = segments(path).collect::<Vec<_>>();
        let (last, blocks) = parts.split_last()?;
        let mut current = self;

        for block in blocks {
            match current.entries.get(&block.to_lowercase()).map(|entry| &entry.node) {
                Some(Node::Branch(settings)) => current = settings,
                _ => return None,
            }
        }

        current
            .entries
            .get(&last.to_lowercase())
            .map(|entry| &entry.node)
    }

    pub fn get(&self, path: &str) -> Option<&OptionValue> {
        match self.node(path)? {
            Node::Value(value) => Some(value),
            Node::Branch(_) => None,
        }
    }

    pub fn branch(&self, path: &str) -> Option<&Settings> {
        match self.node(path)? {
            Node::Branch(settings) => Some(settings),
            Node::Value(_) => None,
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.node(path).is_some()
    }

    /// remove `path` from the tree, empty parent blocks are kept
    pub fn remove(&mut self, path: &str) -> Option<Node> {
        let parts = segments(path).collect::<Vec<_>>();
        let (last, blocks) = parts.split_last()?;
        let mut current = self;

        for block in blocks {
            match current
                .entries
                .get_mut(&block.to_lowercase())
                .map(|entry| &mut entry.node)
            {
                Some(Node::Branch(settings)) => current = settings,
                _ => return None,
            }
        }

        current
            .entries
            .shift_remove(&last.to_lowercase())
            .map(|entry| entry.node)
    }

    /// overlay `other` onto `self`, values of `other` win
    pub fn merge(&mut self, other: &Settings) {
        for (lower, entry) in other.entries.iter() {
            match &entry.node {
                Node::Branch(nested) => {
                    let target = self.branch_or_insert(&entry.key);
                    target.merge(nested);
                }
                Node::Value(value) => {
                    let key = self
                        .entries
                        .get(lower)
                        .map(|existing| existing.key.clone())
                        .unwrap_or_else(|| entry.key.clone());

                    self.entries.insert(
                        lower.clone(),
                        Entry {
                            key,
                            node: Node::Value(value.clone()),
                        },
                    );
                }
            }
        }
    }

    /// copy of the tree with all `paths` removed
    pub fn without(&self, paths: &[&str]) -> Settings {
        let mut copy = self.clone();

        for path in paths {
            copy.remove(path);
        }

        copy
    }

    /// iterate over the direct children with their display keys
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.entries
            .values()
            .map(|entry| (entry.key.as_str(), &entry.node))
    }

    /// all leaves as `(dotted path, value)` in insertion order
    pub fn flatten(&self) -> Vec<(String, OptionValue)> {
        let mut leaves = Vec::new();
        self.collect_leaves("", &mut leaves);
        leaves
    }

    fn collect_leaves(&self, prefix: &str, leaves: &mut Vec<(String, OptionValue)>) {
        for (key, node) in self.iter() {
            let path = if prefix.is_empty() {
                key.to_owned()
            } else {
                format!("{prefix}.{key}")
            };

            match node {
                Node::Value(value) => leaves.push((path, value.clone())),
                Node::Branch(nested) => nested.collect_leaves(&path, leaves),
            }
        }
    }
}

impl<K: AsRef<str>, V: Into<OptionValue>> FromIterator<(K, V)> for Settings {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut settings = Settings::new();

        for (path, value) in iter {
            settings.set(path.as_ref(), value);
        }

        settings
    }
}
