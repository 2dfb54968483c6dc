use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::model::{Entity, Node, Relationship};
use crate::types::{ClientId, GraphError, Result, SnapshotId};

/// Storage capabilities the operation model and the live-state check rely on.
///
/// Every `apply_*` method reports whether the database accepted the change.
pub trait DatabaseAccess: Send + Sync {
    /// Creates a node.
    fn apply_create_node(&self, node: &Node, snapshot: SnapshotId, client: ClientId) -> bool;

    /// Creates a relationship.
    fn apply_create_relationship(
        &self,
        relationship: &Relationship,
        snapshot: SnapshotId,
        client: ClientId,
    ) -> bool;

    /// Replaces every node matching `target` with `value`.
    fn apply_update_node(
        &self,
        target: &Node,
        value: &Node,
        snapshot: SnapshotId,
        client: ClientId,
    ) -> bool;

    /// Replaces every relationship matching `target` with `value`.
    fn apply_update_relationship(
        &self,
        target: &Relationship,
        value: &Relationship,
        snapshot: SnapshotId,
        client: ClientId,
    ) -> bool;

    /// Deletes every node matching `node`.
    fn apply_delete_node(&self, node: &Node, snapshot: SnapshotId, client: ClientId) -> bool;

    /// Deletes every relationship matching `relationship`.
    fn apply_delete_relationship(
        &self,
        relationship: &Relationship,
        snapshot: SnapshotId,
        client: ClientId,
    ) -> bool;

    /// Recomputes authoritative hashes for `entities` and returns `true` when
    /// all of them still agree with what the caller observed.
    fn equal_hash(&self, entities: &[Entity]) -> bool;
}

/// What to do with an operation whose entity cannot be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownEntityPolicy {
    /// Log a warning, report the operation as not applied, keep going.
    #[default]
    Skip,
    /// Fail the batch with [`GraphError::UnrecognizedEntity`].
    Reject,
}

/// Mutation discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Create a fresh entity.
    Create,
    /// Replace an existing entity.
    Update,
    /// Remove an existing entity.
    Delete,
}

impl OperationKind {
    /// Lowercase name, used in logs and on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        }
    }
}

/// A single mutation over one entity.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Create `Entity`.
    Create(Entity),
    /// Replace records matching `target` with `value`.
    Update {
        /// Records to replace.
        target: Entity,
        /// Replacement value.
        value: Entity,
    },
    /// Delete records matching `Entity`.
    Delete(Entity),
}

impl Operation {
    /// Builds a create operation.
    pub fn create(entity: impl Into<Entity>) -> Self {
        Operation::Create(entity.into())
    }

    /// Builds an update operation.
    pub fn update(target: impl Into<Entity>, value: impl Into<Entity>) -> Self {
        Operation::Update {
            target: target.into(),
            value: value.into(),
        }
    }

    /// Builds a delete operation.
    pub fn delete(entity: impl Into<Entity>) -> Self {
        Operation::Delete(entity.into())
    }

    /// Returns the mutation kind.
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Create(_) => OperationKind::Create,
            Operation::Update { .. } => OperationKind::Update,
            Operation::Delete(_) => OperationKind::Delete,
        }
    }

    /// The wrapped entity; for updates, the target being replaced.
    pub fn entity(&self) -> &Entity {
        match self {
            Operation::Create(entity) | Operation::Delete(entity) => entity,
            Operation::Update { target, .. } => target,
        }
    }

    /// Update and delete operations can clash with concurrent writes; creates
    /// target a fresh identity and never do.
    pub fn is_write_conflict_candidate(&self) -> bool {
        !matches!(self, Operation::Create(_))
    }

    /// `false` when [`Operation::apply`] has no storage call for the entity:
    /// an unrecognized entity, or an update whose target and value differ in
    /// type.
    pub fn is_applicable(&self) -> bool {
        match self {
            Operation::Update { target, value } => matches!(
                (target, value),
                (Entity::Node(_), Entity::Node(_))
                    | (Entity::Relationship(_), Entity::Relationship(_))
            ),
            Operation::Create(entity) | Operation::Delete(entity) => {
                !matches!(entity, Entity::Unrecognized { .. })
            }
        }
    }

    /// Returns `true` when this committed operation invalidates `entity`.
    ///
    /// Same-type operands use [`Entity::matches`]. Deletes also reach across
    /// types: deleting a node invalidates every relationship touching it, and
    /// deleting a relationship invalidates its endpoints.
    pub fn conflicts_with(&self, entity: &Entity) -> bool {
        match self {
            Operation::Delete(target) => target.overlaps(entity),
            _ => self.entity().matches(entity),
        }
    }

    /// Applies the operation through `access`.
    ///
    /// Returns whether the database accepted the change. An entity that
    /// cannot be applied is handled according to `policy`.
    pub fn apply<A: DatabaseAccess + ?Sized>(
        &self,
        access: &A,
        snapshot: SnapshotId,
        client: ClientId,
        policy: UnknownEntityPolicy,
    ) -> Result<bool> {
        let applied = match self {
            Operation::Create(Entity::Node(node)) => access.apply_create_node(node, snapshot, client),
            Operation::Create(Entity::Relationship(rel)) => {
                access.apply_create_relationship(rel, snapshot, client)
            }
            Operation::Update {
                target: Entity::Node(target),
                value: Entity::Node(value),
            } => access.apply_update_node(target, value, snapshot, client),
            Operation::Update {
                target: Entity::Relationship(target),
                value: Entity::Relationship(value),
            } => access.apply_update_relationship(target, value, snapshot, client),
            Operation::Delete(Entity::Node(node)) => access.apply_delete_node(node, snapshot, client),
            Operation::Delete(Entity::Relationship(rel)) => {
                access.apply_delete_relationship(rel, snapshot, client)
            }
            Operation::Update { target, value } => {
                let kind = format!("{}->{}", target.type_name(), value.type_name());
                return unapplicable(self.kind(), kind, policy);
            }
            Operation::Create(entity) | Operation::Delete(entity) => {
                return unapplicable(self.kind(), entity.type_name().to_owned(), policy);
            }
        };
        Ok(applied)
    }
}

fn unapplicable(kind: OperationKind, entity: String, policy: UnknownEntityPolicy) -> Result<bool> {
    match policy {
        UnknownEntityPolicy::Skip => {
            warn!(op = kind.as_str(), entity = %entity, "operation.apply.unrecognized_entity");
            Ok(false)
        }
        UnknownEntityPolicy::Reject => Err(GraphError::UnrecognizedEntity(entity)),
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Create(entity) => write!(f, "Create: {entity}"),
            Operation::Update { target, value } => write!(f, "Update: {target} => {value}"),
            Operation::Delete(entity) => write!(f, "Delete: {entity}"),
        }
    }
}

/// Result of applying a list of operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Operations the database accepted.
    pub applied: usize,
    /// Operations the database refused or that were skipped.
    pub not_applied: usize,
}

/// Applies `ops` in order.
///
/// Under [`UnknownEntityPolicy::Skip`] an unrecognized entity is counted as
/// not applied and the batch continues; under
/// [`UnknownEntityPolicy::Reject`] the first one stops the batch.
pub fn apply_batch<A: DatabaseAccess + ?Sized>(
    ops: &[Operation],
    access: &A,
    snapshot: SnapshotId,
    client: ClientId,
    policy: UnknownEntityPolicy,
) -> Result<BatchOutcome> {
    let mut outcome = BatchOutcome::default();
    for op in ops {
        if op.apply(access, snapshot, client, policy)? {
            outcome.applied += 1;
        } else {
            outcome.not_applied += 1;
        }
    }
    Ok(outcome)
}
