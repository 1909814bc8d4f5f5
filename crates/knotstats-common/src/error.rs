use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// The upstream answered with valid JSON whose top level is not an object.
    #[error("expected a JSON object, found {found}")]
    NotAnObject { found: &'static str },
}
