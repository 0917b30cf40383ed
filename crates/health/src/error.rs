//! Registration errors.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HealthError {
    #[error("health check name must not be empty")]
    EmptyName,

    #[error("health check \"{0}\" is already registered")]
    Duplicate(String),

    /// A probe passed to the builder could not be registered.
    #[error("could not register health check \"{name}\": {source}")]
    Registration {
        name: String,
        #[source]
        source: Box<HealthError>,
    },
}

impl HealthError {
    pub(crate) fn registration(name: impl Into<String>, source: HealthError) -> Self {
        Self::Registration {
            name: name.into(),
            source: Box::new(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, HealthError>;
