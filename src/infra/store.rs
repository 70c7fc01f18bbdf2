use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub type Fields = Map<String, Value>;

/// A document as returned by the store: its id plus the stored fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Deserialize into a model, exposing the document id as its `id` field.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        let mut fields = self.fields.clone();
        fields.insert("id".to_string(), Value::String(self.id.clone()));
        serde_json::from_value(Value::Object(fields))
            .map_err(|err| anyhow!("malformed document {}: {}", self.id, err))
    }
}

/// Serialize a model into stored fields. The `id` field lives in the key, not the body.
pub fn encode<T: Serialize>(value: &T) -> Result<Fields> {
    match serde_json::to_value(value)? {
        Value::Object(mut fields) => {
            fields.remove("id");
            Ok(fields)
        }
        other => Err(anyhow!("expected an object, got {}", other)),
    }
}

/// Server-side field mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    Set(Value),
    Increment(i64),
    ArrayUnion(Vec<Value>),
    ArrayRemove(Vec<Value>),
    ServerTimestamp,
}

/// An ordered set of field operations applied to one document in a single request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    ops: Vec<(String, FieldOp)>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fields(fields: Fields) -> Self {
        Self {
            ops: fields
                .into_iter()
                .map(|(field, value)| (field, FieldOp::Set(value)))
                .collect(),
        }
    }

    pub fn set(self, field: &str, value: Value) -> Self {
        self.op(field, FieldOp::Set(value))
    }

    pub fn increment(self, field: &str, by: i64) -> Self {
        self.op(field, FieldOp::Increment(by))
    }

    pub fn array_union(self, field: &str, value: Value) -> Self {
        self.op(field, FieldOp::ArrayUnion(vec![value]))
    }

    pub fn array_remove(self, field: &str, value: Value) -> Self {
        self.op(field, FieldOp::ArrayRemove(vec![value]))
    }

    pub fn server_timestamp(self, field: &str) -> Self {
        self.op(field, FieldOp::ServerTimestamp)
    }

    pub fn op(mut self, field: &str, op: FieldOp) -> Self {
        self.ops.push((field.to_string(), op));
        self
    }

    /// Apply every operation to `fields`. Union and remove are set semantics:
    /// adding a present value or removing an absent one leaves the array as is.
    pub fn apply(&self, fields: &mut Fields, now: OffsetDateTime) -> Result<()> {
        for (field, op) in &self.ops {
            match op {
                FieldOp::Set(value) => {
                    fields.insert(field.clone(), value.clone());
                }
                FieldOp::Increment(by) => {
                    let current = fields.get(field).and_then(Value::as_i64).unwrap_or(0);
                    fields.insert(field.clone(), Value::from(current + by));
                }
                FieldOp::ArrayUnion(values) => {
                    let mut items = array_field(fields, field);
                    for value in values {
                        if !items.contains(value) {
                            items.push(value.clone());
                        }
                    }
                    fields.insert(field.clone(), Value::Array(items));
                }
                FieldOp::ArrayRemove(values) => {
                    let mut items = array_field(fields, field);
                    items.retain(|item| !values.contains(item));
                    fields.insert(field.clone(), Value::Array(items));
                }
                FieldOp::ServerTimestamp => {
                    let stamp = now.format(&Rfc3339)?;
                    fields.insert(field.clone(), Value::String(stamp));
                }
            }
        }
        Ok(())
    }
}

fn array_field(fields: &Fields, field: &str) -> Vec<Value> {
    match fields.get(field) {
        Some(Value::Array(items)) => items.clone(),
        _ => Vec::new(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
}

impl Filter {
    pub fn matches(&self, fields: &Fields) -> bool {
        match self {
            Self::Eq(field, value) => fields.get(field) == Some(value),
        }
    }
}

/// Filters plus an optional limit. No ordering is promised to callers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &str, value: Value) -> Self {
        self.filters.push(Filter::Eq(field.to_string(), value));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, fields: &Fields) -> bool {
        self.filters.iter().all(|filter| filter.matches(fields))
    }
}

pub type Snapshot = Result<Vec<Document>>;

/// A live query. Every change delivers the full current result set; an error ends it.
/// Dropping the subscription stops the task feeding it.
pub struct Subscription {
    updates: mpsc::UnboundedReceiver<Snapshot>,
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn new(updates: mpsc::UnboundedReceiver<Snapshot>, task: JoinHandle<()>) -> Self {
        Self { updates, task }
    }

    pub async fn next(&mut self) -> Option<Snapshot> {
        self.updates.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[async_trait]
pub trait DataStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Overwrite the whole document.
    async fn set(&self, collection: &str, id: &str, fields: Fields) -> Result<()>;

    /// Create a document with a store-assigned id.
    async fn add(&self, collection: &str, patch: Patch) -> Result<Document>;

    /// Apply field operations atomically to an existing document.
    async fn update_fields(&self, collection: &str, id: &str, patch: Patch) -> Result<()>;

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>>;

    async fn subscribe(&self, collection: &str, query: Query) -> Result<Subscription>;
}
