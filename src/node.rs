//! Node data model for the mirrored virtual tree.
//!
//! Two representations exist: `ElementNode` is the nested wire form the
//! backend sends (children inline), and `VNode` is the arena-resident
//! form the tree stores (children as slot indices). Property bags are a
//! closed set of JSON-shaped variants rather than an open `any`, since
//! the only consumers are generic edit and diagnostic logic.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Reserved tag marking a text node. Text nodes carry `text` instead of
/// children and cannot be addressed by edits unless they have an id.
pub const TEXT_TAG: &str = "#text";

/// Index of a node slot in the tree arena.
pub type NodeIdx = u32;

/// One value in a node's property bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<PropValue>),
    Map(BTreeMap<String, PropValue>),
}

impl PropValue {
    /// String contents, if this is a string variant.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropValue::String(s) => Some(s),
            _ => None,
        }
    }
}

/// Backend-authored tree node in wire form (children nested inline).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementNode {
    /// Stable identity. Nodes without an id are purely structural and
    /// cannot be targeted by later edits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Element kind, or the reserved text marker.
    pub tag: String,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub props: HashMap<String, PropValue>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ElementNode>,

    /// Present only on text-marker nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl ElementNode {
    /// Convenience constructor for an element with a given tag.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            id: None,
            tag: tag.into(),
            props: HashMap::new(),
            children: Vec::new(),
            text: None,
        }
    }

    /// Construct a text node.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            id: None,
            tag: TEXT_TAG.to_string(),
            props: HashMap::new(),
            children: Vec::new(),
            text: Some(text.into()),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_child(mut self, child: ElementNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_prop(mut self, key: impl Into<String>, value: PropValue) -> Self {
        self.props.insert(key.into(), value);
        self
    }
}

/// Arena-resident node. Children are slot indices into the owning tree.
#[derive(Debug, Clone, PartialEq)]
pub struct VNode {
    pub id: Option<String>,
    pub tag: String,
    pub props: HashMap<String, PropValue>,
    pub children: Vec<NodeIdx>,
    pub text: Option<String>,
}

impl VNode {
    /// Whether this is a text-marker node.
    pub fn is_text(&self) -> bool {
        self.tag == TEXT_TAG
    }
}
