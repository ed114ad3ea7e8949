use crate::{
    protocol::WebhookResponse,
    response::{Classification, TitlePrompt},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    AwaitingSend,
    AwaitingTitle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    Initial,
    Titled,
}

impl Attempt {
    /// A titled retry never prompts again, so a repeated 220001 is shown as an error.
    pub fn prompt(self, surface_available: bool) -> TitlePrompt {
        match self {
            Self::Initial if surface_available => TitlePrompt::Available,
            _ => TitlePrompt::Unavailable,
        }
    }
}

/// Snapshot of the response slot and title protocol. Transitions consume the
/// snapshot and hand back the next one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    response: Option<WebhookResponse>,
    phase: Phase,
}

impl Session {
    pub fn response(&self) -> Option<&WebhookResponse> {
        self.response.as_ref()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn begin_send(self) -> Self {
        Self {
            response: None,
            phase: Phase::AwaitingSend,
        }
    }

    pub fn settle(self, outcome: Classification) -> Self {
        match outcome {
            Classification::NeedsTitle => Self {
                response: None,
                phase: Phase::AwaitingTitle,
            },
            other => Self {
                response: other.into_response(),
                phase: Phase::AwaitingSend,
            },
        }
    }

    pub fn can_submit_title(&self, title: &str) -> bool {
        self.phase == Phase::AwaitingTitle && !title.is_empty()
    }

    /// Closing the prompt has no side effects; nothing was sent for it yet.
    pub fn dismiss_title(self) -> Self {
        Self {
            phase: Phase::AwaitingSend,
            ..self
        }
    }
}
