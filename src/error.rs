use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("project {0} not found")]
    ProjectNotFound(Uuid),
    #[error("plot `{0}` not found")]
    PlotNotFound(String),
    #[error("plot number `{0}` already exists")]
    DuplicateKey(String),
    #[error("duplicate plot numbers in batch: {0:?}")]
    DuplicateInBatch(Vec<String>),
    #[error("plot numbers already exist: {0:?}")]
    DuplicateWithExisting(Vec<String>),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("project version conflict")]
    VersionConflict,
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Innermost error, looking through `Context` wrappers.
    pub fn root(&self) -> &Error {
        match self {
            Error::Context { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self.root(),
            Error::ProjectNotFound(_) | Error::PlotNotFound(_)
        )
    }

    /// Data conflicts raised by the ledger. Never retried.
    pub fn is_duplicate(&self) -> bool {
        matches!(
            self.root(),
            Error::DuplicateKey(_) | Error::DuplicateInBatch(_) | Error::DuplicateWithExisting(_)
        )
    }

    /// Offending plot numbers for duplicate errors, empty otherwise.
    pub fn duplicate_plot_numbers(&self) -> Vec<String> {
        match self.root() {
            Error::DuplicateKey(n) => vec![n.clone()],
            Error::DuplicateInBatch(ns) | Error::DuplicateWithExisting(ns) => ns.clone(),
            _ => Vec::new(),
        }
    }

    /// Indicative HTTP status for the surrounding transport layer.
    pub fn http_status(&self) -> u16 {
        match self.root() {
            Error::ProjectNotFound(_) | Error::PlotNotFound(_) => 404,
            Error::DuplicateKey(_)
            | Error::DuplicateInBatch(_)
            | Error::DuplicateWithExisting(_)
            | Error::Validation(_) => 400,
            Error::VersionConflict => 409,
            _ => 500,
        }
    }
}

pub trait WithContext<T> {
    fn context(self, msg: impl Into<String>) -> Result<T>;
}

impl<T> WithContext<T> for Result<T> {
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Context {
            context: msg.into(),
            source: Box::new(e),
        })
    }
}
