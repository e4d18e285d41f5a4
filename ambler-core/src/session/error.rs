use thiserror::Error;

pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("chromium launch failed: {0}")]
    Launch(String),
    #[error("transport severed: {0}")]
    Transport(String),
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("timeout waiting for {0}")]
    Timeout(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("profile error: {0}")]
    Profile(String),
    #[error("no healthy proxies remain")]
    ProxyExhausted,
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl SessionError {
    /// Fatal conditions escape the scheduler and trigger recovery; anything
    /// else is absorbed as a no-effect action.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SessionError::Launch(_)
                | SessionError::Transport(_)
                | SessionError::Navigation(_)
                | SessionError::ProxyExhausted
        )
    }
}

impl From<chromiumoxide::error::CdpError> for SessionError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        use chromiumoxide::error::CdpError;
        match &err {
            CdpError::Ws(_) | CdpError::NoResponse | CdpError::ChannelSendError(_) => {
                SessionError::Transport(err.to_string())
            }
            _ => SessionError::Unexpected(err.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for SessionError {
    fn from(err: tokio::task::JoinError) -> Self {
        SessionError::Unexpected(err.to_string())
    }
}
