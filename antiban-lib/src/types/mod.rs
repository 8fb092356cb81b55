#![allow(unreachable_pub)]

mod error;
mod event;

pub use error::ErrorKind;
pub use event::CompletionEvent;

/// The antiban `Result` type
pub type Result<T> = std::result::Result<T, crate::ErrorKind>;
