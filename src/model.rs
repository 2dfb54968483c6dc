//! Graph entities exchanged between replicas.
//!
//! Entities here are *descriptions* of stored records rather than handles to
//! them: a read-set node may carry only the properties the client looked at,
//! and still has to be recognised as the same record as a fully populated
//! copy committed by another transaction. That is why matching is
//! subset-based instead of structural (see [`Node::matches`]).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind tag given to nodes built through [`Node::with_id`].
pub const DEFAULT_NODE_KIND: &str = "Node";
/// Property carrying a node's user-visible identity.
pub const IDENTITY_KEY: &str = "idx";
/// Property stamped on read copies with the content hash of the stored record.
pub const HASH_KEY: &str = "hash";
/// Property stamped on read copies with the snapshot the read happened at.
pub const SNAPSHOT_KEY: &str = "snapshotId";

const VOLATILE_KEYS: [&str; 2] = [HASH_KEY, SNAPSHOT_KEY];

/// Property value attached to nodes and relationships.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum PropertyValue {
    /// Boolean value.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit floating point number.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Bool(v) => write!(f, "{v}"),
            PropertyValue::Int(v) => write!(f, "{v}"),
            PropertyValue::Float(v) => write!(f, "{v}"),
            PropertyValue::String(v) => write!(f, "{v}"),
            PropertyValue::Bytes(v) => write!(f, "0x{}", hex::encode(v)),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_owned())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::String(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Int(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Float(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

/// Ordered property map shared by nodes and relationships.
pub type Properties = BTreeMap<String, PropertyValue>;

fn kinds_compatible(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    }
}

fn is_subset(small: &Properties, big: &Properties) -> bool {
    small.iter().all(|(key, value)| big.get(key) == Some(value))
}

fn properties_nested(a: &Properties, b: &Properties) -> bool {
    is_subset(a, b) || is_subset(b, a)
}

fn push_properties(out: &mut Vec<u8>, properties: &Properties) {
    for (key, value) in properties {
        out.extend_from_slice(key.as_bytes());
        out.extend_from_slice(value.to_string().as_bytes());
    }
}

fn strip_volatile(properties: &Properties) -> Properties {
    properties
        .iter()
        .filter(|(key, _)| !VOLATILE_KEYS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn fmt_properties(f: &mut fmt::Formatter<'_>, properties: &Properties) -> fmt::Result {
    f.write_str("[")?;
    let mut first = true;
    for (key, value) in properties {
        if VOLATILE_KEYS.contains(&key.as_str()) {
            continue;
        }
        if !first {
            f.write_str(",")?;
        }
        first = false;
        write!(f, "{key}={value}")?;
    }
    f.write_str("]")
}

/// A graph node: optional kind tag plus properties.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Node {
    /// Kind tag; `None` matches any kind.
    pub kind: Option<String>,
    /// Node properties keyed by name.
    pub properties: Properties,
}

impl Node {
    /// Creates a node with the given kind and no properties.
    ///
    /// An empty kind is treated as unset.
    pub fn new(kind: impl Into<String>) -> Self {
        let kind = kind.into();
        Self {
            kind: (!kind.is_empty()).then_some(kind),
            properties: Properties::new(),
        }
    }

    /// Creates a node of kind [`DEFAULT_NODE_KIND`] identified by `idx = id`.
    pub fn with_id(id: impl Into<String>) -> Self {
        let id: String = id.into();
        Self::new(DEFAULT_NODE_KIND).with_property(IDENTITY_KEY, id)
    }

    /// Adds or replaces a property, returning the node.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Adds or replaces a property in place.
    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) {
        self.properties.insert(key.into(), value.into());
    }

    /// Returns a property by name.
    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    /// Returns the kind tag, if any.
    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    /// Returns `true` when both nodes may describe the same record.
    ///
    /// Kinds must agree unless either is unset, and one property set must
    /// contain the other. Two property sets that each hold an entry the
    /// other lacks do not match.
    pub fn matches(&self, other: &Node) -> bool {
        kinds_compatible(self.kind(), other.kind())
            && properties_nested(&self.properties, &other.properties)
    }

    /// Kind followed by every `key` + `value` pair in key order.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_canonical(&mut out);
        out
    }

    fn write_canonical(&self, out: &mut Vec<u8>) {
        if let Some(kind) = self.kind() {
            out.extend_from_slice(kind.as_bytes());
        }
        push_properties(out, &self.properties);
    }

    /// Copy of the node without the `hash` and `snapshotId` bookkeeping entries.
    pub fn without_volatile(&self) -> Node {
        Node {
            kind: self.kind.clone(),
            properties: strip_volatile(&self.properties),
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind().unwrap_or(""))?;
        fmt_properties(f, &self.properties)
    }
}

/// A labelled directed edge between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Relationship label; `None` matches any label.
    pub kind: Option<String>,
    /// Relationship properties keyed by name.
    pub properties: Properties,
    /// Start endpoint.
    pub start: Node,
    /// End endpoint.
    pub end: Node,
}

impl Relationship {
    /// Creates a relationship `start -[kind]-> end` without properties.
    pub fn new(kind: impl Into<String>, start: Node, end: Node) -> Self {
        let kind = kind.into();
        Self {
            kind: (!kind.is_empty()).then_some(kind),
            properties: Properties::new(),
            start,
            end,
        }
    }

    /// Adds or replaces a property, returning the relationship.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Adds or replaces a property in place.
    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) {
        self.properties.insert(key.into(), value.into());
    }

    /// Returns the label, if any.
    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    /// Same rule as [`Node::matches`], applied to the label and properties,
    /// with both endpoints required to match pairwise.
    pub fn matches(&self, other: &Relationship) -> bool {
        kinds_compatible(self.kind(), other.kind())
            && properties_nested(&self.properties, &other.properties)
            && self.start.matches(&other.start)
            && self.end.matches(&other.end)
    }

    /// Returns `true` when `node` matches either endpoint.
    pub fn touches(&self, node: &Node) -> bool {
        node.matches(&self.start) || node.matches(&self.end)
    }

    /// Label, properties, then the canonical bytes of both endpoints.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        if let Some(kind) = self.kind() {
            out.extend_from_slice(kind.as_bytes());
        }
        push_properties(&mut out, &self.properties);
        self.start.write_canonical(&mut out);
        self.end.write_canonical(&mut out);
        out
    }

    /// Copy without bookkeeping entries on the edge or its endpoints.
    pub fn without_volatile(&self) -> Relationship {
        Relationship {
            kind: self.kind.clone(),
            properties: strip_volatile(&self.properties),
            start: self.start.without_volatile(),
            end: self.end.without_volatile(),
        }
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -{}", self.start, self.kind().unwrap_or(""))?;
        fmt_properties(f, &self.properties)?;
        write!(f, "-> {}", self.end)
    }
}

/// Anything an [`crate::storage::Operation`] can wrap.
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    /// A node.
    Node(Node),
    /// A relationship.
    Relationship(Relationship),
    /// An entity whose wire tag this build does not know. Never matches
    /// anything and cannot be applied.
    Unrecognized {
        /// Tag found on the wire.
        kind: String,
    },
}

impl Entity {
    /// Short name of the entity type, used in logs.
    pub fn type_name(&self) -> &str {
        match self {
            Entity::Node(_) => "node",
            Entity::Relationship(_) => "relationship",
            Entity::Unrecognized { kind } => kind,
        }
    }

    /// Same-type match: node against node, relationship against relationship.
    pub fn matches(&self, other: &Entity) -> bool {
        match (self, other) {
            (Entity::Node(a), Entity::Node(b)) => a.matches(b),
            (Entity::Relationship(a), Entity::Relationship(b)) => a.matches(b),
            _ => false,
        }
    }

    /// [`Entity::matches`] widened with the node/relationship endpoint overlap,
    /// in either direction.
    pub fn overlaps(&self, other: &Entity) -> bool {
        match (self, other) {
            (Entity::Node(node), Entity::Relationship(rel))
            | (Entity::Relationship(rel), Entity::Node(node)) => rel.touches(node),
            _ => self.matches(other),
        }
    }

    /// Canonical byte form used for content hashing.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        match self {
            Entity::Node(node) => node.canonical_bytes(),
            Entity::Relationship(rel) => rel.canonical_bytes(),
            Entity::Unrecognized { kind } => kind.as_bytes().to_vec(),
        }
    }

    /// Copy without bookkeeping properties.
    pub fn without_volatile(&self) -> Entity {
        match self {
            Entity::Node(node) => Entity::Node(node.without_volatile()),
            Entity::Relationship(rel) => Entity::Relationship(rel.without_volatile()),
            Entity::Unrecognized { kind } => Entity::Unrecognized { kind: kind.clone() },
        }
    }

    /// The `hash` property stamped on a read copy, if present.
    pub fn stamped_hash(&self) -> Option<&str> {
        let value = match self {
            Entity::Node(node) => node.properties.get(HASH_KEY),
            Entity::Relationship(rel) => rel.properties.get(HASH_KEY),
            Entity::Unrecognized { .. } => None,
        };
        match value {
            Some(PropertyValue::String(hash)) => Some(hash.as_str()),
            _ => None,
        }
    }
}

impl From<Node> for Entity {
    fn from(value: Node) -> Self {
        Entity::Node(value)
    }
}

impl From<Relationship> for Entity {
    fn from(value: Relationship) -> Self {
        Entity::Relationship(value)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::Node(node) => fmt::Display::fmt(node, f),
            Entity::Relationship(rel) => fmt::Display::fmt(rel, f),
            Entity::Unrecognized { kind } => write!(f, "<unrecognized {kind}>"),
        }
    }
}
