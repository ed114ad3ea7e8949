use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const THREAD_NAME_REQUIRED: i64 = 220_001;

pub const DELIVERED_STATUS: &str = "204 Success";

/// The message being composed. Entries are opaque to the pipeline; they only
/// need to survive a trip through JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentTree(pub Vec<Value>);

impl ComponentTree {
    /// Accepts a bare array or an object carrying a `components` array.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Array(items) => Some(Self(items)),
            Value::Object(mut map) => match map.remove("components") {
                Some(Value::Array(items)) => Some(Self(items)),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiError(pub Value);

impl ApiError {
    pub fn code(&self) -> Option<i64> {
        self.0.get("code").and_then(Value::as_i64)
    }

    pub fn message(&self) -> Option<&str> {
        self.0.get("message").and_then(Value::as_str)
    }

    pub fn requires_thread_name(&self) -> bool {
        self.code() == Some(THREAD_NAME_REQUIRED)
    }

    /// Flattens the nested `errors` tree into one entry per reported problem.
    pub fn field_errors(&self) -> Vec<FieldError> {
        let mut found = Vec::new();
        if let Some(errors) = self.0.get("errors") {
            collect_field_errors(errors, &mut Vec::new(), &mut found);
        }
        found
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub path: String,
    pub code: Option<String>,
    pub message: String,
}

fn collect_field_errors<'a>(node: &'a Value, path: &mut Vec<&'a str>, found: &mut Vec<FieldError>) {
    let Some(map) = node.as_object() else {
        return;
    };

    for (key, child) in map {
        if key == "_errors" {
            for entry in child.as_array().into_iter().flatten() {
                let message = entry
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("invalid value");
                found.push(FieldError {
                    path: path.join("."),
                    code: entry
                        .get("code")
                        .and_then(Value::as_str)
                        .map(ToOwned::to_owned),
                    message: message.to_owned(),
                });
            }
        } else {
            path.push(key.as_str());
            collect_field_errors(child, path, found);
            path.pop();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum WebhookResponse {
    Delivered { status: String },
    Rejected(ApiError),
}

impl WebhookResponse {
    pub fn delivered() -> Self {
        Self::Delivered {
            status: DELIVERED_STATUS.to_owned(),
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }

    pub fn as_error(&self) -> Option<&ApiError> {
        match self {
            Self::Rejected(error) => Some(error),
            Self::Delivered { .. } => None,
        }
    }
}
