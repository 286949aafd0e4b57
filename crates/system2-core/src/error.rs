//! Error handling for System2

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("network error: {0}")]
    Network(String),

    #[error("transfer timed out: {0}")]
    Timeout(String),

    #[error("HTTP {status} returned by {url}")]
    HttpStatus { status: u16, url: String },

    #[error("FTP error: {message}")]
    Ftp { code: Option<u32>, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to start command: {0}")]
    Spawn(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("channel error: {0}")]
    Channel(String),

    #[error("worker failed: {0}")]
    Worker(String),

    #[error("callback failed: {0}")]
    Callback(String),
}

impl Error {
    /// Nonzero status reported in the terminal record of a failed task.
    pub fn status_code(&self) -> i32 {
        match self {
            Error::HttpStatus { status, .. } => i32::from(*status),
            Error::Ftp { code: Some(code), .. } => *code as i32,
            Error::Ftp { code: None, .. } => 8,
            Error::Network(_) => 7,
            Error::Timeout(_) => 28,
            Error::Io(_) => 23,
            Error::Spawn(_) => 127,
            Error::InvalidInput(_) => 3,
            Error::Serialization(_) => 26,
            Error::Channel(_) | Error::Worker(_) | Error::Callback(_) => 1,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout(err.to_string())
        } else if let Some(status) = err.status() {
            Error::HttpStatus {
                status: status.as_u16(),
                url: err.url().map(|u| u.to_string()).unwrap_or_default(),
            }
        } else {
            Error::Network(err.to_string())
        }
    }
}

impl From<suppaftp::FtpError> for Error {
    fn from(err: suppaftp::FtpError) -> Self {
        let code = match &err {
            suppaftp::FtpError::ConnectionError(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                return Error::Timeout(e.to_string());
            }
            suppaftp::FtpError::ConnectionError(e) => return Error::Network(e.to_string()),
            suppaftp::FtpError::UnexpectedResponse(response) => Some(response.status.code()),
            _ => None,
        };
        Error::Ftp {
            code,
            message: err.to_string(),
        }
    }
}

impl<T> From<async_channel::SendError<T>> for Error {
    fn from(err: async_channel::SendError<T>) -> Self {
        Error::Channel(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_are_nonzero() {
        let errors = [
            Error::Network("refused".into()),
            Error::Timeout("slow".into()),
            Error::Io(std::io::Error::other("disk")),
            Error::Spawn("missing".into()),
            Error::Ftp {
                code: None,
                message: "bad".into(),
            },
            Error::Channel("closed".into()),
        ];
        for err in errors {
            assert_ne!(err.status_code(), 0, "{err}");
        }
    }

    #[test]
    fn test_http_status_passes_through() {
        let err = Error::HttpStatus {
            status: 404,
            url: "http://example.invalid/".into(),
        };
        assert_eq!(err.status_code(), 404);
        assert_eq!(err.to_string(), "HTTP 404 returned by http://example.invalid/");
    }

    #[test]
    fn test_ftp_reply_code_passes_through() {
        let err = Error::Ftp {
            code: Some(550),
            message: "no such file".into(),
        };
        assert_eq!(err.status_code(), 550);
    }
}
