use crate::model::{Entity, Node, Relationship};
use crate::storage::Operation;
use crate::types::{ClientId, SnapshotId};

/// Read and write sets accumulated by one transaction.
///
/// A context is filled while the client issues reads and writes and is
/// consumed by value when it is committed, so it cannot be validated twice.
///
/// # Example
///
/// ```rust
/// use bftgraph::db::TransactionContext;
/// use bftgraph::model::Node;
/// use bftgraph::types::{ClientId, SnapshotId};
///
/// let mut tx = TransactionContext::new(SnapshotId(10), ClientId(1));
/// tx.read_node(Node::with_id("A"));
/// tx.delete(Node::with_id("B"));
/// assert!(!tx.is_read_only());
/// ```
#[derive(Debug, Clone)]
pub struct TransactionContext {
    snapshot: SnapshotId,
    client: ClientId,
    read_nodes: Vec<Node>,
    read_relationships: Vec<Relationship>,
    operations: Vec<Operation>,
}

impl TransactionContext {
    /// Starts an empty context reading at `snapshot`.
    pub fn new(snapshot: SnapshotId, client: ClientId) -> Self {
        Self {
            snapshot,
            client,
            read_nodes: Vec::new(),
            read_relationships: Vec::new(),
            operations: Vec::new(),
        }
    }

    /// Snapshot the transaction reads at.
    pub fn snapshot(&self) -> SnapshotId {
        self.snapshot
    }

    /// Client that owns the transaction.
    pub fn client(&self) -> ClientId {
        self.client
    }

    /// Records a node read.
    pub fn read_node(&mut self, node: Node) {
        self.read_nodes.push(node);
    }

    /// Records several node reads.
    pub fn read_nodes(&mut self, nodes: impl IntoIterator<Item = Node>) {
        self.read_nodes.extend(nodes);
    }

    /// Records a relationship read.
    pub fn read_relationship(&mut self, relationship: Relationship) {
        self.read_relationships.push(relationship);
    }

    /// Records several relationship reads.
    pub fn read_relationships(&mut self, relationships: impl IntoIterator<Item = Relationship>) {
        self.read_relationships.extend(relationships);
    }

    /// Queues an operation.
    pub fn push_operation(&mut self, op: Operation) {
        self.operations.push(op);
    }

    /// Queues a create.
    pub fn create(&mut self, entity: impl Into<Entity>) {
        self.push_operation(Operation::create(entity));
    }

    /// Queues an update of `target` to `value`.
    pub fn update(&mut self, target: impl Into<Entity>, value: impl Into<Entity>) {
        self.push_operation(Operation::update(target, value));
    }

    /// Queues a delete.
    pub fn delete(&mut self, entity: impl Into<Entity>) {
        self.push_operation(Operation::delete(entity));
    }

    /// Nodes read so far, in read order.
    pub fn node_reads(&self) -> &[Node] {
        &self.read_nodes
    }

    /// Relationships read so far, in read order.
    pub fn relationship_reads(&self) -> &[Relationship] {
        &self.read_relationships
    }

    /// Pending operations, in issue order.
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// `true` when no operation has been queued.
    pub fn is_read_only(&self) -> bool {
        self.operations.is_empty()
    }

    /// Total number of entities read.
    pub fn read_count(&self) -> usize {
        self.read_nodes.len() + self.read_relationships.len()
    }

    /// Hands the pending operations over, ending the context.
    pub fn into_operations(self) -> Vec<Operation> {
        self.operations
    }
}
