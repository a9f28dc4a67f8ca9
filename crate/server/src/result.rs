use crate::error::ServerError;

pub type SResult<R> = Result<R, ServerError>;

/// A helper trait for `SResult` that attaches context to errors.
pub trait SResultHelper<T> {
    /// Sets the context for the error.
    ///
    /// # Errors
    /// Returns an `SResult` with the specified context if the original result
    /// is an error.
    fn context(self, context: &str) -> SResult<T>;
}

impl<T, E> SResultHelper<T> for Result<T, E>
where
    E: std::error::Error,
{
    fn context(self, context: &str) -> SResult<T> {
        self.map_err(|e| ServerError::ServerError(format!("{context}: {e}")))
    }
}

impl<T> SResultHelper<T> for Option<T> {
    fn context(self, context: &str) -> SResult<T> {
        self.ok_or_else(|| ServerError::ServerError(context.to_owned()))
    }
}
