use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Batch(#[from] BatchError),
    #[error("command failed: {0}")]
    Command(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Fatal driver-level errors. Anything that reaches this type ends the run.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("config error: {0}")]
    Config(String),

    #[error("cannot create output root {path}: {source}")]
    OutputRoot {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot discover groups under {path}: {source}")]
    InputRoot {
        path: PathBuf,
        source: EnumerationError,
    },

    #[error("failed to load reference '{name}' from {path}: {source}")]
    Reference {
        name: String,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    State(#[from] crate::driver::TransitionError),
}

/// Group-level errors raised while listing a group's input or preparing its
/// output directory. The group is marked failed and the batch continues.
#[derive(Error, Debug)]
pub enum EnumerationError {
    #[error("input directory does not exist: {0}")]
    MissingInput(PathBuf),

    #[error("cannot read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot create output directory {path}: {source}")]
    CreateOutput {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("group id '{0}' must be a relative path inside the input root")]
    InvalidGroupId(String),
}

impl EnumerationError {
    pub(crate) fn unreadable(path: &std::path::Path, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::MissingInput(path.to_path_buf())
        } else {
            Self::Unreadable {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}
