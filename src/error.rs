//! Closed error taxonomy for the sweep.
//!
//! Per-item failures (one page fetch, one unfollow) are retried where they
//! occur; the variants here are what escapes those local retry loops.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SweepError {
    #[error("invalid handle: {0:?}")]
    InvalidHandle(String),
    #[error("session error: {0}")]
    Session(String),
    #[error("login timeout after {0:?}, please try again")]
    LoginTimeout(Duration),
    #[error("rate limited, retry after {0:?}")]
    RateLimited(Duration),
    #[error("auth headers not captured within {0:?}")]
    HarvestTimeout(Duration),
    #[error("transient HTTP {status} after {attempts} attempts")]
    TransientHttp { status: u16, attempts: u32 },
    #[error("unauthorized after {refreshes} auth refreshes")]
    Unauthorized { refreshes: u32 },
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SweepError {
    /// Timeouts end the run without the extra session cooldown.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::LoginTimeout(_) | Self::HarvestTimeout(_))
    }

    /// Errors that say the browser session itself can no longer be trusted.
    pub fn is_session(&self) -> bool {
        matches!(
            self,
            Self::Session(_) | Self::LoginTimeout(_) | Self::HarvestTimeout(_) | Self::Unauthorized { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, SweepError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_classification() {
        assert!(SweepError::LoginTimeout(Duration::from_secs(300)).is_timeout());
        assert!(SweepError::HarvestTimeout(Duration::from_secs(20)).is_timeout());
        assert!(!SweepError::Session("gone".into()).is_timeout());
        assert!(!SweepError::RateLimited(Duration::from_secs(60)).is_timeout());
    }

    #[test]
    fn test_session_classification() {
        assert!(SweepError::Session("x".into()).is_session());
        assert!(SweepError::Unauthorized { refreshes: 3 }.is_session());
        assert!(!SweepError::MalformedResponse("x".into()).is_session());
    }

    #[test]
    fn test_other_wraps_anyhow() {
        let err: SweepError = anyhow::anyhow!("browser crashed").into();
        assert_eq!(err.to_string(), "browser crashed");
    }
}
