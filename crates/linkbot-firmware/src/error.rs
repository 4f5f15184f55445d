use linkbot_backend::BridgeError;
use linkbot_core::UpdateError;
use linkbot_platform::AppPathsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Paths(#[from] AppPathsError),
    #[error("failed to create application directories: {0}")]
    Dirs(#[source] std::io::Error),
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    #[error(transparent)]
    Update(#[from] UpdateError),
}
