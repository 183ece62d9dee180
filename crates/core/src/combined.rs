//! Error accumulation for fan-out steps.
//!
//! A step that touches several independent resources records every failure
//! instead of stopping at the first one, then reports them together.

use std::fmt;

use itertools::Itertools;

use crate::error::Error;
use crate::result::Result;

/// Several errors reported as one.
///
/// Every constituent is kept for logging; control flow only asks whether
/// there was any error at all.
#[derive(Debug, Default)]
pub struct CombinedError {
    errors: Vec<Error>,
}

impl CombinedError {
    /// The constituent errors, in the order they were recorded.
    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for CombinedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors.as_slice() {
            [single] => write!(f, "{single}"),
            errors => write!(
                f,
                "{} errors occurred: {}",
                errors.len(),
                errors.iter().map(ToString::to_string).join("; ")
            ),
        }
    }
}

impl std::error::Error for CombinedError {}

/// Combine errors into one, or `None` when there are none.
pub fn combine(errors: impl IntoIterator<Item = Error>) -> Option<CombinedError> {
    let errors = errors.into_iter().collect_vec();
    (!errors.is_empty()).then_some(CombinedError { errors })
}

/// Collects errors from independent sub-operations.
#[derive(Debug, Default)]
pub struct ErrorSet {
    errors: Vec<Error>,
}

impl ErrorSet {
    /// Create an empty error set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error.
    pub fn push(&mut self, err: Error) {
        tracing::warn!(error = %err, "Sub-operation failed, continuing");
        self.errors.push(err);
    }

    /// Record the error of a result, passing the value through.
    pub fn record<T>(&mut self, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.push(err);
                None
            }
        }
    }

    /// Whether any error was recorded.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// The combined error, if any was recorded.
    pub fn into_error(self) -> Option<Error> {
        combine(self.errors).map(Error::Combined)
    }

    /// `Ok(())` when nothing failed, otherwise the combined error.
    pub fn into_result(self) -> Result<()> {
        self.into_error().map_or(Ok(()), Err)
    }
}

impl Extend<Error> for ErrorSet {
    fn extend<I: IntoIterator<Item = Error>>(&mut self, iter: I) {
        iter.into_iter().for_each(|err| self.push(err));
    }
}
