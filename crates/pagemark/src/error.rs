#[derive(thiserror::Error, Debug, serde::Deserialize, serde::Serialize)]
pub enum Error {
    #[error("Generic {0}")]
    Generic(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}
