//! CRDT codec abstraction.
//!
//! The engine never interprets machine state itself; every decode, merge,
//! capture, and projection goes through the [`StateCodec`] trait defined
//! here. [`YrsCodec`] is the default implementation, backed by yrs, and
//! any conforming implementation can be substituted.
//!
//! # State model
//!
//! A machine's live state and its snapshots are both opaque byte blobs.
//! Live state is the merged CRDT log; a snapshot is a consolidated,
//! self-sufficient capture that decodes into a full document without the
//! live machine or any other snapshot.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::Value;
use yrs::types::ToJson;
use yrs::updates::decoder::Decode;
use yrs::{Any, Doc, ReadTxn, StateVector, Transact, Update};

use crate::error::{EngineError, Result};

/// Canonical, key-ordered structural view of a machine's content.
///
/// Keys are the document's root type names; values are their JSON
/// materialization. `serde_json::Map` keeps keys sorted, so two equal
/// documents always produce byte-identical projections.
pub type Projection = serde_json::Map<String, Value>;

/// Capability set the engine needs from a CRDT implementation.
///
/// All operations are byte-in/byte-out so implementations stay
/// substitutable behind a trait object. Merge must be commutative,
/// associative, and idempotent; `snapshot` output must decode on its own.
pub trait StateCodec: Send + Sync {
    /// Encoded state of a brand-new, empty machine.
    fn empty_state(&self) -> Vec<u8>;

    /// Merge an incoming update into an existing state and return the new
    /// full state encoding.
    fn merge(&self, state: &[u8], update: &[u8]) -> Result<Vec<u8>>;

    /// Compute a compact, self-sufficient capture of a state.
    fn snapshot(&self, state: &[u8]) -> Result<Vec<u8>>;

    /// Expand a snapshot capture back into a full live-state encoding.
    fn materialize(&self, snapshot: &[u8]) -> Result<Vec<u8>>;

    /// Materialize a state into its canonical logical projection.
    fn project(&self, state: &[u8]) -> Result<Projection>;
}

/// Default [`StateCodec`] backed by yrs (the Rust port of Yjs).
#[derive(Debug, Default, Clone, Copy)]
pub struct YrsCodec;

impl YrsCodec {
    /// Create a new codec instance.
    pub fn new() -> Self {
        Self
    }

    /// Decode a binary blob into a fresh yrs document.
    fn decode(blob: &[u8], context: &str) -> Result<Doc> {
        let doc = Doc::new();
        let update = Update::decode_v1(blob)
            .map_err(|e| EngineError::Corrupt(format!("failed to decode {}: {}", context, e)))?;

        {
            let mut txn = doc.transact_mut();
            txn.apply_update(update)
                .map_err(|e| EngineError::Corrupt(format!("failed to apply {}: {}", context, e)))?;
        }

        Ok(doc)
    }

    /// Encode the full state of a document as a single update blob.
    fn encode_full(doc: &Doc) -> Vec<u8> {
        let txn = doc.transact();
        txn.encode_state_as_update_v1(&StateVector::default())
    }
}

impl StateCodec for YrsCodec {
    fn empty_state(&self) -> Vec<u8> {
        Self::encode_full(&Doc::new())
    }

    fn merge(&self, state: &[u8], update: &[u8]) -> Result<Vec<u8>> {
        let doc = Self::decode(state, "machine state")?;

        let incoming = Update::decode_v1(update)
            .map_err(|e| EngineError::Corrupt(format!("failed to decode update: {}", e)))?;

        {
            let mut txn = doc.transact_mut();
            txn.apply_update(incoming)
                .map_err(|e| EngineError::Corrupt(format!("failed to apply update: {}", e)))?;
        }

        Ok(Self::encode_full(&doc))
    }

    fn snapshot(&self, state: &[u8]) -> Result<Vec<u8>> {
        // Re-encoding from a fresh document consolidates the operation log
        // into a single self-sufficient blob.
        let doc = Self::decode(state, "machine state")?;
        Ok(Self::encode_full(&doc))
    }

    fn materialize(&self, snapshot: &[u8]) -> Result<Vec<u8>> {
        let doc = Self::decode(snapshot, "snapshot state")?;
        Ok(Self::encode_full(&doc))
    }

    fn project(&self, state: &[u8]) -> Result<Projection> {
        let doc = Self::decode(state, "machine state")?;
        let txn = doc.transact();

        let mut projection = Projection::new();
        for (name, value) in txn.root_refs() {
            projection.insert(name.to_string(), any_to_json(&value.to_json(&txn)));
        }

        Ok(projection)
    }
}

/// Convert a yrs [`Any`] into a `serde_json` value.
///
/// Binary buffers become base64 strings so projections stay printable.
fn any_to_json(any: &Any) -> Value {
    match any {
        Any::Null | Any::Undefined => Value::Null,
        Any::Bool(value) => Value::Bool(*value),
        Any::Number(value) => serde_json::Number::from_f64(*value)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Any::BigInt(value) => Value::Number((*value).into()),
        Any::String(value) => Value::String(value.to_string()),
        Any::Buffer(bytes) => Value::String(BASE64.encode(bytes)),
        Any::Array(items) => Value::Array(items.iter().map(any_to_json).collect()),
        Any::Map(entries) => {
            let mut object = serde_json::Map::new();
            for (key, value) in entries.iter() {
                object.insert(key.clone(), any_to_json(value));
            }
            Value::Object(object)
        }
        _ => Value::Null,
    }
}
