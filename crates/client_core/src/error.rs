use std::fmt;

use shared::error::RemoteFailure;
use thiserror::Error;

pub const LOGIN_REQUIRED_FOR_SAVE_MESSAGE: &str = "Please log in to save your changes.";
pub const LOGIN_REQUIRED_FOR_SETTINGS_MESSAGE: &str = "Please log in to access settings.";
pub const LOGIN_REQUIRED_FOR_CHECKOUT_MESSAGE: &str = "Please log in to upgrade your plan.";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("not authenticated")]
    NotAuthenticated,
    /// Silent token refresh failed; the user has to sign in again.
    #[error("session expired; login required")]
    LoginRequired,
    #[error("access token unavailable: {0}")]
    Unavailable(String),
}

/// Which auth-gated surface refused an unauthenticated call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginGate {
    Save,
    Settings,
    Checkout,
}

impl LoginGate {
    pub fn message(self) -> &'static str {
        match self {
            LoginGate::Save => LOGIN_REQUIRED_FOR_SAVE_MESSAGE,
            LoginGate::Settings => LOGIN_REQUIRED_FOR_SETTINGS_MESSAGE,
            LoginGate::Checkout => LOGIN_REQUIRED_FOR_CHECKOUT_MESSAGE,
        }
    }
}

/// UI surface owning a busy flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Surface {
    Details,
    Settings,
    Paywall,
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Surface::Details => "details",
            Surface::Settings => "settings",
            Surface::Paywall => "paywall",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    FetchPrompts,
    CreatePrompt,
    UpdatePrompt,
    DeletePrompt,
    UpdateNotes,
    CreateVersion,
    AddTag,
    RemoveTag,
    FetchApiKeys,
    AddApiKey,
    UpdateApiKey,
    DeleteApiKey,
    FetchProfile,
    MarkPaywallSeen,
    RunPlaygroundTest,
    CreateCheckoutSession,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::FetchPrompts => "fetch prompts",
            Operation::CreatePrompt => "create prompt",
            Operation::UpdatePrompt => "update prompt",
            Operation::DeletePrompt => "delete prompt",
            Operation::UpdateNotes => "update notes",
            Operation::CreateVersion => "create version",
            Operation::AddTag => "add tag",
            Operation::RemoveTag => "remove tag",
            Operation::FetchApiKeys => "fetch user API keys",
            Operation::AddApiKey => "add API key",
            Operation::UpdateApiKey => "update API key",
            Operation::DeleteApiKey => "delete API key",
            Operation::FetchProfile => "fetch user profile",
            Operation::MarkPaywallSeen => "update paywall modal preference",
            Operation::RunPlaygroundTest => "run playground test",
            Operation::CreateCheckoutSession => "create checkout session",
        })
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{}", .0.message())]
    LoginRequired(LoginGate),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("{0}")]
    Validation(String),
    #[error("{0} is busy with another operation")]
    Busy(Surface),
    #[error("Failed to {operation}: {failure}")]
    Remote {
        operation: Operation,
        #[source]
        failure: RemoteFailure,
    },
    #[error("Failed to {operation}: {source}")]
    Transport {
        operation: Operation,
        #[source]
        source: reqwest::Error,
    },
    #[error("Failed to {operation}: invalid response: {reason}")]
    InvalidResponse { operation: Operation, reason: String },
    #[error("billing: {0}")]
    Billing(String),
    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),
}

impl ClientError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn is_login_required(&self) -> bool {
        matches!(
            self,
            ClientError::LoginRequired(_) | ClientError::Auth(AuthError::LoginRequired)
        )
    }

    pub fn remote_status(&self) -> Option<u16> {
        match self {
            ClientError::Remote { failure, .. } => Some(failure.status),
            _ => None,
        }
    }
}
