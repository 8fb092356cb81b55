//! `test-utils` is used for testing `antiban-lib`, both in unit tests and in
//! integration tests.
//! This crate does not depend on `antiban-lib`, else we would get a dependency cycle.
//! Macros are used instead, so that the importer is responsible for providing
//! `CompletionEvent`.

/// A completion through the given slot which the remote service rejected
#[macro_export]
macro_rules! banned {
    ($slot:expr $(,)?) => {
        CompletionEvent::ban($slot)
    };
}

/// A completion through the given slot which was not banned
#[macro_export]
macro_rules! succeeded {
    ($slot:expr $(,)?) => {
        CompletionEvent::success($slot)
    };
}

/// A list of completions, written as `slot => banned` pairs
///
/// ```ignore
/// let events = events!["a" => true, "a" => false, "b" => false];
/// ```
#[macro_export]
macro_rules! events {
    ($($slot:expr => $banned:expr),* $(,)?) => {
        vec![$(CompletionEvent::new($slot, $banned)),*]
    };
}
