//! Result type definition and extension traits.
//!
//! Provides the call-site helpers that recognise expected-absence errors by
//! kind, so absence can be read as information instead of failure.

use crate::error::Error;

/// The standard Result type for LogSet operations.
///
/// # Examples
///
/// ```ignore
/// // NotFound becomes None, every other error propagates
/// let sts: Option<StatefulSet> = accessor.get(ns, name).await.found()?;
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for object store results.
pub trait ResultExt<T> {
    /// Map `NotFound` to `Ok(None)`; any other error is returned unchanged.
    fn found(self) -> Result<Option<T>>;
}

impl<T> ResultExt<T> for Result<T> {
    fn found(self) -> Result<Option<T>> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Swallow errors matching `predicate`, discarding the value.
///
/// ```ignore
/// ignore(Error::is_already_exists, accessor.create(&svc).await)?;
/// ```
pub fn ignore<T>(predicate: fn(&Error) -> bool, result: Result<T>) -> Result<()> {
    match result {
        Ok(_) => Ok(()),
        Err(e) if predicate(&e) => Ok(()),
        Err(e) => Err(e),
    }
}
