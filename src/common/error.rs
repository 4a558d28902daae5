use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("missing {name} source: {} is absent or unreadable", path.display())]
    MissingSource { name: &'static str, path: PathBuf },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unparseable timestamp {value:?} on {entity} {id}")]
    Timestamp {
        entity: &'static str,
        id: u64,
        value: String,
    },

    #[error("session {session_id} is linked to orders {first} and {second}; expected at most one order per session")]
    AmbiguousConversion {
        session_id: u64,
        first: u64,
        second: u64,
    },

    #[error("cannot impute {column}: no non-null values in this batch")]
    EmptyImputation { column: &'static str },

    #[error("invalid pipeline configuration: {message}")]
    Config { message: String },

    #[error("job config error: {message}")]
    Job { message: String },
}

pub type Result<T> = std::result::Result<T, EtlError>;
