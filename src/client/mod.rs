use std::time::Duration;

use reqwest::{
    StatusCode,
    multipart::{Form, Part},
};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
    request::{RequestBody, WebhookRequest},
    response::{self, Classification, TitlePrompt},
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no valid webhook url is set")]
    NoTarget,
    #[error("webhook request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("webhook replied {status} with a body that is not JSON: {source}")]
    MalformedBody {
        status: StatusCode,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone)]
pub struct RawReply {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct WebhookClient {
    http: reqwest::Client,
}

impl WebhookClient {
    pub fn new() -> Result<Self, DispatchError> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { http })
    }

    pub async fn dispatch(&self, target: Option<&Url>, request: WebhookRequest) -> Result<RawReply, DispatchError> {
        let url = target.ok_or(DispatchError::NoTarget)?;
        let payload_bytes = request.payload_json().len();

        let builder = self
            .http
            .request(request.method, url.clone())
            .headers(request.headers);

        let builder = match request.body {
            RequestBody::Json(payload) => builder.body(payload),
            RequestBody::Multipart { payload_json, files } => {
                let mut form = Form::new().text("payload_json", payload_json);
                for (index, file) in files.into_iter().enumerate() {
                    form = form.part(format!("files[{index}]"), Part::bytes(file.bytes).file_name(file.name));
                }
                builder.multipart(form)
            }
        };

        debug!(url = %redact(url), payload_bytes, "dispatching webhook request");
        let reply = builder.send().await?;
        let status = reply.status();
        let body = reply.bytes().await?.to_vec();
        info!(%status, bytes = body.len(), "webhook replied");

        Ok(RawReply { status, body })
    }

    pub async fn send(
        &self,
        target: Option<&Url>,
        request: WebhookRequest,
        prompt: TitlePrompt,
    ) -> Result<Classification, DispatchError> {
        let reply = self.dispatch(target, request).await?;
        response::classify(reply.status, &reply.body, prompt).map_err(|source| DispatchError::MalformedBody {
            status: reply.status,
            source,
        })
    }
}

/// Webhook URLs embed their secret token; keep it out of logs.
pub fn redact(url: &Url) -> String {
    let mut segments: Vec<&str> = url.path().split('/').collect();
    if let Some(position) = segments.iter().position(|segment| *segment == "webhooks") {
        if let Some(token) = segments.get_mut(position + 2) {
            if !token.is_empty() {
                *token = "***";
            }
        }
    }

    let mut shown = url.clone();
    shown.set_query(None);
    shown.set_path(&segments.join("/"));
    shown.to_string()
}

#[cfg(test)]
pub mod testing {
    use std::{
        net::SocketAddr,
        sync::{Arc, Mutex},
    };

    use axum::{
        Json, Router,
        body::Bytes,
        extract::{Path, RawQuery, State},
        http::{HeaderMap, StatusCode, header::CONTENT_TYPE},
        response::{IntoResponse, Response},
        routing::post,
    };
    use serde_json::json;
    use tokio::net::TcpListener;

    #[derive(Debug, Clone)]
    pub struct Recorded {
        pub query: Option<String>,
        pub content_type: Option<String>,
        pub body: Vec<u8>,
    }

    impl Recorded {
        pub fn body_text(&self) -> String {
            String::from_utf8_lossy(&self.body).into_owned()
        }
    }

    #[derive(Clone, Default)]
    pub struct MockWebhook {
        pub received: Arc<Mutex<Vec<Recorded>>>,
    }

    impl MockWebhook {
        pub fn received(&self) -> Vec<Recorded> {
            self.received.lock().map(|items| items.clone()).unwrap_or_default()
        }
    }

    /// Stand-in for the webhook API. The webhook id picks the behavior:
    /// `ok` delivers, `forum` wants a thread name, `stubborn` always wants
    /// one, `invalid` rejects the form, `broken` answers with HTML.
    pub async fn spawn() -> (SocketAddr, MockWebhook) {
        let mock = MockWebhook::default();
        let router = Router::new()
            .route("/api/webhooks/:id/:token", post(handle))
            .with_state(mock.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock webhook");
        let addr = listener.local_addr().expect("mock address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, router.into_make_service()).await;
        });

        (addr, mock)
    }

    async fn handle(
        State(mock): State<MockWebhook>,
        Path((id, _token)): Path<(String, String)>,
        RawQuery(query): RawQuery,
        headers: HeaderMap,
        body: Bytes,
    ) -> Response {
        let recorded = Recorded {
            query,
            content_type: headers
                .get(CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .map(ToOwned::to_owned),
            body: body.to_vec(),
        };
        let has_thread_name = recorded.body_text().contains("\"thread_name\"");
        if let Ok(mut items) = mock.received.lock() {
            items.push(recorded);
        }

        match id.as_str() {
            "ok" => StatusCode::NO_CONTENT.into_response(),
            "forum" if has_thread_name => StatusCode::NO_CONTENT.into_response(),
            "forum" | "stubborn" => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "code": 220001,
                    "message": "Webhooks posted to forum channels must have a thread_name or thread_id"
                })),
            )
                .into_response(),
            "broken" => (StatusCode::BAD_GATEWAY, "<html>bad gateway</html>").into_response(),
            _ => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "code": 50035,
                    "message": "Invalid Form Body",
                    "errors": { "components": { "_errors": [
                        { "code": "BASE_TYPE_REQUIRED", "message": "This field is required" }
                    ]}}
                })),
            )
                .into_response(),
        }
    }
}
