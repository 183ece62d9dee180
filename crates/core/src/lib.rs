//! Core types shared by the LogSet operator crates.
//!
//! - [`Error`]: the error taxonomy every accessor and reconciler operation returns
//! - [`ErrorSet`] / [`CombinedError`]: fan-out error accumulation without short-circuiting
//! - [`ResultExt`]: call-site helpers that turn expected absence into information

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod combined;
pub mod error;
pub mod result;

pub use combined::{CombinedError, ErrorSet, combine};
pub use error::Error;
pub use result::{Result, ResultExt, ignore};
