use thiserror::Error;

/// Possible errors when interacting with `antiban_lib`
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A slot key was derived from a URL which has no host
    #[error("URL is missing a host")]
    InvalidUrlHost,
    /// A slot key must not be empty
    #[error("Slot key must not be empty")]
    EmptySlotKey,
    /// The throttle configuration could not be parsed
    #[error("Cannot parse throttle configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl PartialEq for ErrorKind {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::ConfigParse(e1), Self::ConfigParse(e2)) => e1.to_string() == e2.to_string(),
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }
}
