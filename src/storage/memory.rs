use parking_lot::RwLock;
use tracing::debug;

use crate::model::{Entity, Node, Relationship, HASH_KEY, SNAPSHOT_KEY};
use crate::storage::operation::DatabaseAccess;
use crate::storage::rowhash::content_hash;
use crate::types::{ClientId, SnapshotId};

#[derive(Clone, Debug)]
struct Stored<T> {
    value: T,
    written_at: SnapshotId,
}

/// In-memory [`DatabaseAccess`] backend.
///
/// Holds nodes and relationships in two tables. Reads hand out copies
/// stamped with the stored record's content hash so a later
/// [`DatabaseAccess::equal_hash`] call can tell whether the record changed.
#[derive(Default)]
pub struct MemoryGraph {
    nodes: RwLock<Vec<Stored<Node>>>,
    relationships: RwLock<Vec<Stored<Relationship>>>,
}

impl MemoryGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.read().len()
    }

    /// Number of stored relationships.
    pub fn relationship_count(&self) -> usize {
        self.relationships.read().len()
    }

    /// Reads the first node matching `pattern`, stamped for later validation.
    pub fn read_node(&self, pattern: &Node, snapshot: SnapshotId) -> Option<Node> {
        let nodes = self.nodes.read();
        let stored = nodes.iter().find(|stored| pattern.matches(&stored.value))?;
        let hash = content_hash(&Entity::Node(stored.value.clone()));
        Some(
            stored
                .value
                .clone()
                .with_property(HASH_KEY, hash)
                .with_property(SNAPSHOT_KEY, snapshot_stamp(snapshot)),
        )
    }

    /// Reads the first relationship matching `pattern`, stamped for later validation.
    pub fn read_relationship(
        &self,
        pattern: &Relationship,
        snapshot: SnapshotId,
    ) -> Option<Relationship> {
        let relationships = self.relationships.read();
        let stored = relationships
            .iter()
            .find(|stored| pattern.matches(&stored.value))?;
        let hash = content_hash(&Entity::Relationship(stored.value.clone()));
        Some(
            stored
                .value
                .clone()
                .with_property(HASH_KEY, hash)
                .with_property(SNAPSHOT_KEY, snapshot_stamp(snapshot)),
        )
    }

    /// Snapshot at which the first node matching `pattern` was last written.
    pub fn node_written_at(&self, pattern: &Node) -> Option<SnapshotId> {
        self.nodes
            .read()
            .iter()
            .find(|stored| pattern.matches(&stored.value))
            .map(|stored| stored.written_at)
    }

    fn stored_hash_matches(&self, entity: &Entity) -> bool {
        let expected = match entity.stamped_hash() {
            Some(hash) => hash.to_owned(),
            None => content_hash(entity),
        };
        match entity.without_volatile() {
            Entity::Node(pattern) => self.nodes.read().iter().any(|stored| {
                pattern.matches(&stored.value)
                    && content_hash(&Entity::Node(stored.value.clone())) == expected
            }),
            Entity::Relationship(pattern) => self.relationships.read().iter().any(|stored| {
                pattern.matches(&stored.value)
                    && content_hash(&Entity::Relationship(stored.value.clone())) == expected
            }),
            Entity::Unrecognized { .. } => false,
        }
    }
}

/// Snapshot ids past `i64::MAX` clamp instead of wrapping negative.
fn snapshot_stamp(snapshot: SnapshotId) -> i64 {
    i64::try_from(snapshot.0).unwrap_or(i64::MAX)
}

fn merge_node(stored: &mut Node, value: &Node) {
    let value = value.without_volatile();
    if value.kind.is_some() {
        stored.kind = value.kind;
    }
    stored.properties.extend(value.properties);
}

impl DatabaseAccess for MemoryGraph {
    fn apply_create_node(&self, node: &Node, snapshot: SnapshotId, client: ClientId) -> bool {
        debug!(%node, %snapshot, %client, "memory.create_node");
        self.nodes.write().push(Stored {
            value: node.without_volatile(),
            written_at: snapshot,
        });
        true
    }

    fn apply_create_relationship(
        &self,
        relationship: &Relationship,
        snapshot: SnapshotId,
        client: ClientId,
    ) -> bool {
        let endpoints_exist = {
            let nodes = self.nodes.read();
            let has = |endpoint: &Node| nodes.iter().any(|stored| endpoint.matches(&stored.value));
            has(&relationship.start) && has(&relationship.end)
        };
        if !endpoints_exist {
            debug!(%relationship, %client, "memory.create_relationship.missing_endpoint");
            return false;
        }
        self.relationships.write().push(Stored {
            value: relationship.without_volatile(),
            written_at: snapshot,
        });
        true
    }

    fn apply_update_node(
        &self,
        target: &Node,
        value: &Node,
        snapshot: SnapshotId,
        client: ClientId,
    ) -> bool {
        let target = target.without_volatile();
        let mut updated = false;
        for stored in self.nodes.write().iter_mut() {
            if target.matches(&stored.value) {
                merge_node(&mut stored.value, value);
                stored.written_at = snapshot;
                updated = true;
            }
        }
        debug!(%target, %client, updated, "memory.update_node");
        updated
    }

    fn apply_update_relationship(
        &self,
        target: &Relationship,
        value: &Relationship,
        snapshot: SnapshotId,
        client: ClientId,
    ) -> bool {
        let target = target.without_volatile();
        let value = value.without_volatile();
        let mut updated = false;
        for stored in self.relationships.write().iter_mut() {
            if target.matches(&stored.value) {
                if value.kind.is_some() {
                    stored.value.kind = value.kind.clone();
                }
                stored.value.properties.extend(value.properties.clone());
                stored.written_at = snapshot;
                updated = true;
            }
        }
        debug!(%target, %client, updated, "memory.update_relationship");
        updated
    }

    fn apply_delete_node(&self, node: &Node, _snapshot: SnapshotId, client: ClientId) -> bool {
        let pattern = node.without_volatile();
        let removed: Vec<Node> = {
            let mut nodes = self.nodes.write();
            let (removed, kept): (Vec<_>, Vec<_>) = nodes
                .drain(..)
                .partition(|stored| pattern.matches(&stored.value));
            *nodes = kept;
            removed.into_iter().map(|stored| stored.value).collect()
        };
        if removed.is_empty() {
            return false;
        }
        self.relationships
            .write()
            .retain(|stored| !removed.iter().any(|node| stored.value.touches(node)));
        debug!(%pattern, %client, removed = removed.len(), "memory.delete_node");
        true
    }

    fn apply_delete_relationship(
        &self,
        relationship: &Relationship,
        _snapshot: SnapshotId,
        client: ClientId,
    ) -> bool {
        let pattern = relationship.without_volatile();
        let mut relationships = self.relationships.write();
        let before = relationships.len();
        relationships.retain(|stored| !pattern.matches(&stored.value));
        let removed = before - relationships.len();
        debug!(%pattern, %client, removed, "memory.delete_relationship");
        removed > 0
    }

    fn equal_hash(&self, entities: &[Entity]) -> bool {
        entities.iter().all(|entity| self.stored_hash_matches(entity))
    }
}
