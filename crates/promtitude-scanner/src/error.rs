use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Browser error: {0}")]
    Browser(#[from] promtitude_browser::BrowserError),
}

pub type Result<T> = std::result::Result<T, ScanError>;
