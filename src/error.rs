use std::{
    fmt::{Debug, Display},
    time::Duration,
};

use crate::validation::ValidationErrors;

pub struct Error {
    kind: ErrorKind,
    context: Vec<String>,
}

pub enum ErrorKind {
    /// The requested invoice does not exist. Callers should treat this as recoverable.
    NotFound(String),
    Validation(ValidationErrors),
    Database(sqlx::Error),
    Migration(sqlx::migrate::MigrateError),
    Template(minijinja::Error),
    WebDriverSession(fantoccini::error::NewSessionError),
    WebDriverCommand(fantoccini::error::CmdError),
    PrintConfiguration(fantoccini::error::PrintConfigurationError),
    RenderTimeout(Duration),
    Config(config::ConfigError),
    Io(std::io::Error),
    Other(String),
}

pub trait AddContext<T> {
    fn add_context(self, ctx: &str) -> Result<T, Error>;
}

impl Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut context = self.context.clone();
        context.reverse();
        let context = if context.is_empty() {
            String::from("no context")
        } else {
            context.join(" -> ")
        };
        write!(f, "{context}")
    }
}

impl std::error::Error for Error {}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        let root = match &kind {
            ErrorKind::NotFound(id) => format!("invoice '{id}' not found"),
            ErrorKind::Validation(errors) => errors.to_string(),
            ErrorKind::Database(e) => format!("{:?}", e),
            ErrorKind::Migration(e) => format!("{:?}", e),
            ErrorKind::Template(e) => format!("{:?}", e),
            ErrorKind::WebDriverSession(e) => format!("{:?}", e),
            ErrorKind::WebDriverCommand(e) => format!("{:?}", e),
            ErrorKind::PrintConfiguration(e) => format!("{:?}", e),
            ErrorKind::RenderTimeout(limit) => {
                format!("rasterizer did not finish within {}ms", limit.as_millis())
            }
            ErrorKind::Config(e) => format!("{:?}", e),
            ErrorKind::Io(e) => format!("{:?}", e),
            ErrorKind::Other(msg) => msg.clone(),
        };
        Error {
            context: vec![root],
            kind,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        ErrorKind::Io(value).into()
    }
}

impl From<sqlx::Error> for Error {
    fn from(value: sqlx::Error) -> Self {
        ErrorKind::Database(value).into()
    }
}

impl From<sqlx::migrate::MigrateError> for Error {
    fn from(value: sqlx::migrate::MigrateError) -> Self {
        ErrorKind::Migration(value).into()
    }
}

impl From<minijinja::Error> for Error {
    fn from(value: minijinja::Error) -> Self {
        ErrorKind::Template(value).into()
    }
}

impl From<fantoccini::error::PrintConfigurationError> for Error {
    fn from(value: fantoccini::error::PrintConfigurationError) -> Self {
        ErrorKind::PrintConfiguration(value).into()
    }
}

impl From<fantoccini::error::NewSessionError> for Error {
    fn from(value: fantoccini::error::NewSessionError) -> Self {
        ErrorKind::WebDriverSession(value).into()
    }
}

impl From<fantoccini::error::CmdError> for Error {
    fn from(value: fantoccini::error::CmdError) -> Self {
        ErrorKind::WebDriverCommand(value).into()
    }
}

impl From<config::ConfigError> for Error {
    fn from(value: config::ConfigError) -> Self {
        ErrorKind::Config(value).into()
    }
}

impl From<ValidationErrors> for Error {
    fn from(value: ValidationErrors) -> Self {
        ErrorKind::Validation(value).into()
    }
}

impl From<String> for Error {
    fn from(value: String) -> Self {
        ErrorKind::Other(value).into()
    }
}

impl Error {
    /// Build the distinct "no such invoice" error for `id`.
    pub fn not_found(id: &str) -> Error {
        ErrorKind::NotFound(id.to_string()).into()
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Whether this error means the requested invoice is absent, as opposed to a failure
    /// talking to the store or the rasterizer.
    pub fn is_not_found(&self) -> bool {
        matches!(self.kind, ErrorKind::NotFound(_))
    }

    /// Message that is safe to show to an end user. Persistence and rendering internals are
    /// collapsed into a generic failure; the full chain is still available through `Display`.
    pub fn public_message(&self) -> String {
        match &self.kind {
            ErrorKind::NotFound(_) => String::from("invoice not found"),
            ErrorKind::Validation(errors) => errors.to_string(),
            ErrorKind::RenderTimeout(_) => String::from("document rendering timed out"),
            _ => String::from("internal error"),
        }
    }

    /// Add more context to the given error. This context will ultimately be displayed to the user
    /// and could be useful for correcting bad input or filing a help ticket.
    ///
    /// Generally a single layer of context should be added for every level that an error is
    /// surfaced. If the error is surfaced all the way to main and not handled there, then all the
    /// context will be displayed to the user in reverse order
    ///
    /// # Arguments
    /// * `context` - Any additional information that would be useful for the user to see if the
    /// error is surfaced to them
    pub fn add_context(self, context: &str) -> Error {
        let mut existing = self.context;
        existing.push(context.to_string());
        Self {
            context: existing,
            ..self
        }
    }
}

impl<T> AddContext<T> for Result<T, Error> {
    fn add_context(self, ctx: &str) -> Result<T, Error> {
        match self {
            Ok(d) => Ok(d),
            Err(e) => Err(e.add_context(ctx)),
        }
    }
}
