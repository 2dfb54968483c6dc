//! JSON wire form for operations.
//!
//! ```text
//! {"op":"update","entity":{"type":"node",...},"value":{"type":"node",...}}
//! ```
//!
//! Entity `type` tags other than `node` and `relationship` decode to
//! [`Entity::Unrecognized`] so a replica running an older build can still
//! read the batch and apply its policy instead of failing to parse.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::{Entity, Node, Relationship};
use crate::storage::operation::{Operation, OperationKind};
use crate::types::{GraphError, Result};

#[derive(Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum WireEntity {
    Node(Node),
    Relationship(Relationship),
}

#[derive(Serialize, Deserialize)]
struct WireOperation {
    op: String,
    entity: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<Value>,
}

fn ser_err(err: serde_json::Error) -> GraphError {
    GraphError::Serialization(err.to_string())
}

fn entity_to_value(entity: &Entity) -> Result<Value> {
    match entity {
        Entity::Node(node) => serde_json::to_value(WireEntity::Node(node.clone())).map_err(ser_err),
        Entity::Relationship(rel) => {
            serde_json::to_value(WireEntity::Relationship(rel.clone())).map_err(ser_err)
        }
        Entity::Unrecognized { kind } => {
            let mut map = Map::new();
            map.insert("type".into(), Value::String(kind.clone()));
            Ok(Value::Object(map))
        }
    }
}

fn entity_from_value(value: Value) -> Result<Entity> {
    let tag = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| GraphError::Serialization("entity without type tag".into()))?
        .to_owned();
    match tag.as_str() {
        "node" | "relationship" => {
            let wire: WireEntity = serde_json::from_value(value).map_err(ser_err)?;
            Ok(match wire {
                WireEntity::Node(node) => Entity::Node(node),
                WireEntity::Relationship(rel) => Entity::Relationship(rel),
            })
        }
        _ => Ok(Entity::Unrecognized { kind: tag }),
    }
}

/// Encodes an operation into its JSON wire form.
pub fn encode_operation(op: &Operation) -> Result<Vec<u8>> {
    let wire = match op {
        Operation::Create(entity) | Operation::Delete(entity) => WireOperation {
            op: op.kind().as_str().to_owned(),
            entity: entity_to_value(entity)?,
            value: None,
        },
        Operation::Update { target, value } => WireOperation {
            op: OperationKind::Update.as_str().to_owned(),
            entity: entity_to_value(target)?,
            value: Some(entity_to_value(value)?),
        },
    };
    serde_json::to_vec(&wire).map_err(ser_err)
}

/// Decodes an operation from its JSON wire form.
pub fn decode_operation(bytes: &[u8]) -> Result<Operation> {
    let wire: WireOperation = serde_json::from_slice(bytes).map_err(ser_err)?;
    let entity = entity_from_value(wire.entity)?;
    match wire.op.as_str() {
        "create" => Ok(Operation::Create(entity)),
        "delete" => Ok(Operation::Delete(entity)),
        "update" => {
            let value = wire
                .value
                .ok_or_else(|| GraphError::Serialization("update without value".into()))?;
            Ok(Operation::Update {
                target: entity,
                value: entity_from_value(value)?,
            })
        }
        other => Err(GraphError::Serialization(format!(
            "unknown operation kind {other}"
        ))),
    }
}

/// Encodes a batch as a JSON array of operations.
pub fn encode_batch(ops: &[Operation]) -> Result<Vec<u8>> {
    let mut values = Vec::with_capacity(ops.len());
    for op in ops {
        let bytes = encode_operation(op)?;
        values.push(serde_json::from_slice::<Value>(&bytes).map_err(ser_err)?);
    }
    serde_json::to_vec(&values).map_err(ser_err)
}

/// Decodes a batch produced by [`encode_batch`].
pub fn decode_batch(bytes: &[u8]) -> Result<Vec<Operation>> {
    let values: Vec<Value> = serde_json::from_slice(bytes).map_err(ser_err)?;
    values
        .into_iter()
        .map(|value| {
            let bytes = serde_json::to_vec(&value).map_err(ser_err)?;
            decode_operation(&bytes)
        })
        .collect()
}
