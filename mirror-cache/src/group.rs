//! Multi-level grouping index.
//!
//! A [`GroupIndex`] built for the path `[region, city]` looks like
//!
//! ```text
//! EU ─┬─ Berlin → ["1"]
//!     └─ Paris  → ["2", "5"]
//! US ─── Boston → ["3"]
//! ```
//!
//! Every level but the last maps a key to the next level; the last maps a key
//! to the identifiers of the records carrying it, in fetch order. Nodes are
//! reference counted so lookups can hand out subtrees without copying them.

use std::collections::BTreeMap;
use std::sync::Arc;

use mirror_core::FieldValue;
use serde::{Serialize, Serializer};

/// One level of the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum GroupNode {
    /// Non-terminal level: key → next level.
    Level(BTreeMap<String, Arc<GroupNode>>),
    /// Terminal entry: identifiers in fetch order.
    Ids(Vec<String>),
}

impl GroupNode {
    fn empty_level() -> Self {
        Self::Level(BTreeMap::new())
    }
}

/// Grouping index whose depth always equals the grouping path length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupIndex {
    root: Arc<GroupNode>,
    depth: usize,
}

impl GroupIndex {
    /// An index with no entries. Depth 0 means grouping is disabled.
    pub fn empty(depth: usize) -> Self {
        Self {
            root: Arc::new(GroupNode::empty_level()),
            depth,
        }
    }

    /// Configured path length.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_empty(&self) -> bool {
        matches!(&*self.root, GroupNode::Level(children) if children.is_empty())
    }

    /// File `id` under every combination of `path` values.
    ///
    /// `path` holds one extracted value per grouping level. A multi-valued
    /// entry fans out; repeated values within one entry count once.
    pub(crate) fn insert(&mut self, id: &str, path: &[FieldValue]) {
        debug_assert_eq!(path.len(), self.depth);
        if path.is_empty() {
            return;
        }
        insert_at(Arc::make_mut(&mut self.root), id, path);
    }

    /// Navigate by `keys`.
    ///
    /// - more keys than levels, or grouping disabled: empty
    /// - as many keys as levels: the identifier list
    /// - fewer keys: the level at that prefix
    /// - any unknown key: empty
    pub fn lookup<K: AsRef<str>>(&self, keys: &[K]) -> GroupLookup {
        if self.depth == 0 || keys.len() > self.depth {
            return GroupLookup::empty();
        }
        GroupLookup::from_node(Arc::clone(&self.root)).descend(keys)
    }
}

fn insert_at(node: &mut GroupNode, id: &str, path: &[FieldValue]) {
    let GroupNode::Level(children) = node else {
        return;
    };
    let Some((head, rest)) = path.split_first() else {
        return;
    };

    for (position, key) in head.iter().enumerate() {
        if head.as_slice()[..position].contains(key) {
            continue;
        }

        if rest.is_empty() {
            let leaf = children
                .entry(key.clone())
                .or_insert_with(|| Arc::new(GroupNode::Ids(Vec::new())));
            if let GroupNode::Ids(ids) = Arc::make_mut(leaf) {
                ids.push(id.to_string());
            }
        } else {
            let level = children
                .entry(key.clone())
                .or_insert_with(|| Arc::new(GroupNode::empty_level()));
            insert_at(Arc::make_mut(level), id, rest);
        }
    }
}

/// Result of a grouping lookup: empty, an identifier list, or a level that
/// can be enumerated or drilled into further.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupLookup {
    node: Option<Arc<GroupNode>>,
}

impl GroupLookup {
    pub fn empty() -> Self {
        Self::default()
    }

    fn from_node(node: Arc<GroupNode>) -> Self {
        Self { node: Some(node) }
    }

    fn descend<K: AsRef<str>>(self, keys: &[K]) -> Self {
        keys.iter().fold(self, |lookup, key| lookup.child(key.as_ref()))
    }

    /// The underlying node, if the lookup found one.
    pub fn node(&self) -> Option<&GroupNode> {
        self.node.as_deref()
    }

    /// True for a miss, an empty level or an empty identifier list.
    pub fn is_empty(&self) -> bool {
        match self.node() {
            None => true,
            Some(GroupNode::Level(children)) => children.is_empty(),
            Some(GroupNode::Ids(ids)) => ids.is_empty(),
        }
    }

    /// Whether the lookup landed on an identifier list.
    pub fn is_ids(&self) -> bool {
        matches!(self.node(), Some(GroupNode::Ids(_)))
    }

    /// Whether the lookup landed on an intermediate level.
    pub fn is_level(&self) -> bool {
        matches!(self.node(), Some(GroupNode::Level(_)))
    }

    /// Identifiers at a terminal entry; empty otherwise.
    pub fn ids(&self) -> &[String] {
        match self.node() {
            Some(GroupNode::Ids(ids)) => ids,
            _ => &[],
        }
    }

    pub fn into_ids(self) -> Vec<String> {
        self.ids().to_vec()
    }

    /// Keys of an intermediate level, sorted; empty otherwise.
    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        let children = match self.node() {
            Some(GroupNode::Level(children)) => Some(children),
            _ => None,
        };
        children
            .into_iter()
            .flat_map(|children| children.keys().map(String::as_str))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        matches!(self.node(), Some(GroupNode::Level(children)) if children.contains_key(key))
    }

    /// Drill one level down.
    pub fn child(&self, key: &str) -> GroupLookup {
        match self.node() {
            Some(GroupNode::Level(children)) => children
                .get(key)
                .map(|node| Self::from_node(Arc::clone(node)))
                .unwrap_or_default(),
            _ => Self::empty(),
        }
    }

    /// Drill several levels down.
    pub fn get<K: AsRef<str>>(&self, keys: &[K]) -> GroupLookup {
        self.clone().descend(keys)
    }
}

impl Serialize for GroupLookup {
    /// Misses serialize as an empty list.
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.node() {
            Some(node) => node.serialize(serializer),
            None => serializer.collect_seq(std::iter::empty::<&str>()),
        }
    }
}
