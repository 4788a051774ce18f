use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// Non-success response other than 401.
    #[error("{message}")]
    Api { status: u16, message: String },

    #[error("Session expired or invalid")]
    Unauthenticated,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("Session storage error: {0}")]
    Storage(String),

    /// A newer login/registration attempt replaced this one.
    #[error("Superseded by a newer attempt")]
    Superseded,

    #[error("Invalid client configuration: {0}")]
    Config(String),
}

impl ClientError {
    /// Human-readable text for a transient notification.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Api { message, .. } if !message.trim().is_empty() => message.clone(),
            ClientError::Api { status, .. } => format!("Request failed with status {}", status),
            ClientError::Unauthenticated => "Your session has expired, please log in again".to_string(),
            ClientError::Network(_) => "Network error: no response from server".to_string(),
            ClientError::Timeout => "The server took too long to respond".to_string(),
            ClientError::Decode(_) | ClientError::Storage(_) | ClientError::Config(_) => {
                "Something went wrong, please try again".to_string()
            }
            ClientError::Superseded => String::new(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            ClientError::Unauthenticated => Some(401),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout
        } else if err.is_decode() {
            ClientError::Decode(err.to_string())
        } else {
            ClientError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Decode(err.to_string())
    }
}
