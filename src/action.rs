//! The dispatchable unit of work.
//!
//! An [`Action`] names a backend operation ("project/fetchAll") together with
//! the REST call that performs it. The middleware treats actions as opaque
//! apart from the name (retry bookkeeping) and the dedupe key (debounce).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// HTTP method of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl From<Method> for reqwest::Method {
    fn from(m: Method) -> Self {
        match m {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// A named backend operation and its REST shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Operation name, e.g. `"project/fetchAll"`. Retry records are keyed
    /// by this.
    pub name: String,
    pub method: Method,
    /// Path relative to the backend base URL, e.g. `"/api/project/"`.
    pub path: String,
    /// JSON body, when the operation carries one.
    pub payload: Option<Value>,
}

impl Action {
    pub fn get(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            method: Method::Get,
            path: path.into(),
            payload: None,
        }
    }

    pub fn post(name: impl Into<String>, path: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            method: Method::Post,
            path: path.into(),
            payload: Some(payload),
        }
    }

    pub fn delete(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            method: Method::Delete,
            path: path.into(),
            payload: None,
        }
    }

    /// Key used for duplicate-dispatch suppression: name plus payload.
    pub fn dedupe_key(&self) -> String {
        match &self.payload {
            Some(body) => format!("{}{}", self.name, body),
            None => format!("{}{{}}", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dedupe_key_includes_payload() {
        let a = Action::post("farm/create", "/api/farm/", json!({"name": "north"}));
        let b = Action::post("farm/create", "/api/farm/", json!({"name": "south"}));
        assert_ne!(a.dedupe_key(), b.dedupe_key());
    }

    #[test]
    fn test_dedupe_key_stable_without_payload() {
        let a = Action::get("farm/list", "/api/farm/");
        let b = Action::get("farm/list", "/api/farm/");
        assert_eq!(a.dedupe_key(), b.dedupe_key());
    }
}
