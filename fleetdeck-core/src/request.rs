//! Request and push-notification envelopes exchanged with the backend.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// Remote operation kinds understood by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    List,
    Get,
    Create,
    Update,
    Delete,
    SetActive,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::List => "list",
            Method::Get => "get",
            Method::Create => "create",
            Method::Update => "update",
            Method::Delete => "delete",
            Method::SetActive => "set_active",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single request handed to a [`crate::Dispatcher`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub method: Method,
    /// Backend model name, e.g. "machine".
    pub model: String,
    pub params: JsonValue,
}

impl Request {
    pub fn new(method: Method, model: impl Into<String>, params: JsonValue) -> Self {
        Self {
            method,
            model: model.into(),
            params,
        }
    }

    /// Create a `list` request with no params.
    pub fn list(model: impl Into<String>) -> Self {
        Self::new(Method::List, model, JsonValue::Null)
    }

    /// The dotted RPC endpoint, e.g. "machine.list".
    pub fn endpoint(&self) -> String {
        format!("{}.{}", self.model, self.method)
    }
}

/// What happened to the entity carried by a [`Notify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyAction {
    Create,
    Update,
    Delete,
    #[serde(other)]
    Unknown,
}

/// Unsolicited server push describing a change to one entity.
///
/// For `create`/`update` the data is the full record; for `delete` it is the
/// bare primary key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notify {
    pub name: String,
    pub action: NotifyAction,
    pub data: JsonValue,
}
