use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("invalid download URL")]
    InvalidUrl,

    #[error("download URL host is not allowed")]
    HostNotAllowed,

    #[error("file exceeds {0}MB limit")]
    TooLarge(u64),

    #[error("download failed: HTTP {0}")]
    Http(u16),

    #[error("download failed: {0}")]
    Download(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("download timed out")]
    Timeout,
}

impl FetchError {
    pub fn from_reqwest_error(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if let Some(status) = err.status() {
            Self::Http(status.as_u16())
        } else {
            Self::Download(err.to_string())
        }
    }
}
