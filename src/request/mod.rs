use std::path::Path;

use reqwest::{
    Method,
    header::{CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT},
};
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::protocol::ComponentTree;

/// Message flag marking a payload built from layout components.
pub const COMPONENTS_V2_FLAG: u64 = 1 << 15;

const USER_AGENT_VALUE: &str = concat!("hookcast/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub async fn read(path: &Path) -> Result<Self, DraftError> {
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(ToOwned::to_owned)
            .ok_or_else(|| DraftError::BadFileName(path.display().to_string()))?;
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| DraftError::Read {
                path: path.display().to_string(),
                source,
            })?;

        Ok(Self { name, bytes })
    }
}

#[derive(Debug, Clone, Default)]
pub struct MessageDraft {
    pub components: ComponentTree,
    pub attachments: Vec<Attachment>,
}

impl MessageDraft {
    pub async fn load_components(path: &Path) -> Result<ComponentTree, DraftError> {
        let raw = tokio::fs::read(path)
            .await
            .map_err(|source| DraftError::Read {
                path: path.display().to_string(),
                source,
            })?;
        let value: Value = serde_json::from_slice(&raw)?;

        ComponentTree::from_value(value).ok_or_else(|| DraftError::NotAComponentTree(path.display().to_string()))
    }
}

#[derive(Debug, Error)]
pub enum DraftError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("message file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0} holds neither a component array nor an object with `components`")]
    NotAComponentTree(String),
    #[error("cannot derive an upload name from {0}")]
    BadFileName(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(String),
    Multipart {
        payload_json: String,
        files: Vec<Attachment>,
    },
}

#[derive(Debug, Clone)]
pub struct WebhookRequest {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: RequestBody,
}

impl WebhookRequest {
    pub fn payload_json(&self) -> &str {
        match &self.body {
            RequestBody::Json(payload) => payload,
            RequestBody::Multipart { payload_json, .. } => payload_json,
        }
    }
}

pub fn build(draft: &MessageDraft, thread_name: Option<&str>) -> WebhookRequest {
    let payload = payload(draft, thread_name).to_string();

    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

    let body = if draft.attachments.is_empty() {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        RequestBody::Json(payload)
    } else {
        RequestBody::Multipart {
            payload_json: payload,
            files: draft.attachments.clone(),
        }
    };

    WebhookRequest {
        method: Method::POST,
        headers,
        body,
    }
}

fn payload(draft: &MessageDraft, thread_name: Option<&str>) -> Value {
    let mut payload = Map::new();
    payload.insert("components".into(), json!(draft.components));
    payload.insert("flags".into(), json!(COMPONENTS_V2_FLAG));

    if !draft.attachments.is_empty() {
        let attachments = draft
            .attachments
            .iter()
            .enumerate()
            .map(|(id, file)| json!({ "id": id, "filename": file.name }))
            .collect();
        payload.insert("attachments".into(), Value::Array(attachments));
    }

    if let Some(name) = thread_name.filter(|name| !name.is_empty()) {
        payload.insert("thread_name".into(), json!(name));
    }

    Value::Object(payload)
}
