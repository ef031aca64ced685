use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `getNodeInfo()` response: the node's current tip hash and height.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NodeInfo {
    pub current: String,
    pub height: u64,
}

/// A single `{name, value}` tag attached to a transaction or block at a
/// positional index.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Tag {
    pub name: String,
    pub value: String,
}

/// Proof-of-access substructure. Treated as an opaque JSON payload — the
/// Writer projects it verbatim into the `poa` table; no field inside it is
/// individually addressed by this system (validating it is explicitly out of
/// scope, SPEC_FULL.md §1).
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Poa {
    #[serde(flatten)]
    pub fields: serde_json::Map<String, Value>,
}

/// Wire shape of a transaction as returned by the remote node. Numeric
/// fields are kept as loosely-typed `Value` because the upstream node
/// serializes them as either JSON numbers or decimal strings (SPEC_FULL.md
/// §3, "wire shape"); the Type Adapter normalizes them at projection time.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Transaction {
    pub id: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub quantity: Option<Value>,
    #[serde(default)]
    pub reward: Option<Value>,
    #[serde(default)]
    pub data_root: Option<String>,
    #[serde(default)]
    pub data_size: Option<Value>,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub last_tx: Option<String>,
    #[serde(default)]
    pub format: Option<Value>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    /// Fields this system doesn't model. Logged and dropped, never a parse
    /// error (SPEC_FULL.md §4.1 error policy).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Wire shape of a block as returned by the remote node.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Block {
    pub indep_hash: String,
    pub height: Value,
    #[serde(default)]
    pub previous_block: Option<String>,
    pub timestamp: Value,
    #[serde(default)]
    pub txs: Vec<String>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub poa: Option<Poa>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Block {
    /// Names of fields present on the wire that this system doesn't model
    /// (proof/difficulty metadata, etc). Logged at `debug!` by callers per
    /// the "unknown field -> log and skip" policy.
    pub fn unknown_field_names(&self) -> impl Iterator<Item = &str> {
        self.extra.keys().map(String::as_str)
    }
}
