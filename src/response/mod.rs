use reqwest::StatusCode;

use crate::protocol::{ApiError, WebhookResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitlePrompt {
    Available,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Delivered,
    NeedsTitle,
    Rejected(ApiError),
}

impl Classification {
    pub fn into_response(self) -> Option<WebhookResponse> {
        match self {
            Self::Delivered => Some(WebhookResponse::delivered()),
            Self::NeedsTitle => None,
            Self::Rejected(error) => Some(WebhookResponse::Rejected(error)),
        }
    }
}

/// Classifies one webhook reply. Any body that is not JSON is returned as the
/// parse error so the caller can report it generically.
pub fn classify(status: StatusCode, body: &[u8], prompt: TitlePrompt) -> Result<Classification, serde_json::Error> {
    if status == StatusCode::NO_CONTENT {
        return Ok(Classification::Delivered);
    }

    let error = ApiError(serde_json::from_slice(body)?);

    if error.requires_thread_name() && prompt == TitlePrompt::Available {
        return Ok(Classification::NeedsTitle);
    }

    Ok(Classification::Rejected(error))
}
