use thiserror::Error;

#[derive(Error, Debug)]
pub enum ToolError {
    /// The argument object is missing or mistypes a required field.
    #[error("invalid arguments: {0}")]
    BadArguments(String),

    /// The external service answered with a non-success status.
    #[error("service error: {0}")]
    Service(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}
