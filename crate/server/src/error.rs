use keybridge_hsm::HsmError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    // a request the transport could decode but the gateway cannot act on
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    // configuration rejected at startup
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // any failure from the PKCS#11 layer, surfaced per request
    #[error(transparent)]
    Hsm(#[from] HsmError),

    // a misbehavior of the server itself, unrelated to user input
    #[error("unexpected server error: {0}")]
    ServerError(String),
}

impl From<std::io::Error> for ServerError {
    fn from(e: std::io::Error) -> Self {
        Self::ServerError(e.to_string())
    }
}
