use thiserror::Error;

pub type HResult<T> = Result<T, HsmError>;

/// Errors surfaced by the PKCS#11 layer.
///
/// The startup variants (`Init`, `Session`, `Auth`) are fatal to the caller;
/// everything else is a per-operation failure that the gateway converts into
/// an error response.
#[derive(Error, Debug, Clone)]
pub enum HsmError {
    /// The module could not be loaded or `C_Initialize` failed
    #[error("PKCS#11 module initialization failed: {0}")]
    Init(String),

    /// `C_OpenSession` or session teardown failed
    #[error("session error: {0}")]
    Session(String),

    /// `C_Login` failed (bad PIN, locked slot)
    #[error("login failed: {0}")]
    Auth(String),

    /// No object matches the requested class and label
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// `C_GenerateKey` failed
    #[error("key creation failed: {0}")]
    Create(String),

    /// `C_DestroyObject` failed
    #[error("object destruction failed: {0}")]
    Destroy(String),

    /// A cipher mechanism failed or was invoked with invalid parameters
    #[error("cryptographic operation failed: {0}")]
    Crypto(String),

    /// PKCS#7 padding could not be applied or removed
    #[error("invalid PKCS#7 padding: {0}")]
    Padding(String),

    /// An envelope is too short to carry the configured IV
    #[error("invalid envelope: {0}")]
    Format(String),

    /// `C_GenerateRandom` failed or was asked for an empty IV
    #[error("random generation failed: {0}")]
    Random(String),

    #[error("{0}")]
    Default(String),
}

impl From<libloading::Error> for HsmError {
    fn from(e: libloading::Error) -> Self {
        Self::Init(e.to_string())
    }
}

impl From<std::num::TryFromIntError> for HsmError {
    fn from(e: std::num::TryFromIntError) -> Self {
        Self::Default(format!("length conversion failed: {e}"))
    }
}
