use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::path::{Path, PathBuf};

type Cause = Box<dyn StdError + Send + Sync + 'static>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    MalformedKey(String),
    BadIteration(String),
    BadTimestamp(String),
    InvalidUserId(String),
    ForeignKey { expected: String, found: String },
    NotFound(String),
    NoBackupsFound(String),
    NoValidSnapshots { user_id: String, rejected: usize },
    Storage(String),
    Io(PathBuf),
    Config(String),
    Cancelled,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    cause: Option<Cause>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Error {
        Error { kind, cause: None }
    }

    pub fn malformed_key<S: Into<String>>(key: S) -> Error {
        Error::new(ErrorKind::MalformedKey(key.into()))
    }

    pub fn bad_iteration<S, E>(key: S, err: E) -> Error
    where
        S: Into<String>,
        E: Into<Cause>,
    {
        Error {
            kind: ErrorKind::BadIteration(key.into()),
            cause: Some(err.into()),
        }
    }

    pub fn bad_timestamp<S, E>(key: S, err: E) -> Error
    where
        S: Into<String>,
        E: Into<Cause>,
    {
        Error {
            kind: ErrorKind::BadTimestamp(key.into()),
            cause: Some(err.into()),
        }
    }

    pub fn invalid_user_id<S: Into<String>>(user_id: S) -> Error {
        Error::new(ErrorKind::InvalidUserId(user_id.into()))
    }

    pub fn foreign_key<E, F>(expected: E, found: F) -> Error
    where
        E: Into<String>,
        F: Into<String>,
    {
        Error::new(ErrorKind::ForeignKey {
            expected: expected.into(),
            found: found.into(),
        })
    }

    pub fn not_found<S: Into<String>>(key: S) -> Error {
        Error::new(ErrorKind::NotFound(key.into()))
    }

    pub fn no_backups_found<S: Into<String>>(user_id: S) -> Error {
        Error::new(ErrorKind::NoBackupsFound(user_id.into()))
    }

    pub fn no_valid_snapshots<S: Into<String>>(user_id: S, rejected: usize) -> Error {
        Error::new(ErrorKind::NoValidSnapshots {
            user_id: user_id.into(),
            rejected,
        })
    }

    pub fn storage<E>(err: E) -> Error
    where
        E: Into<Cause>,
    {
        Error {
            kind: ErrorKind::Storage("Store request failed".into()),
            cause: Some(err.into()),
        }
    }

    pub fn storage_with<T, E>(message: T) -> impl FnOnce(E) -> Error
    where
        T: Into<String>,
        E: Into<Cause>,
    {
        |err: E| Error {
            kind: ErrorKind::Storage(message.into()),
            cause: Some(err.into()),
        }
    }

    pub fn io<T, E>(path: T) -> impl FnOnce(E) -> Error
    where
        T: AsRef<Path>,
        E: Into<Cause>,
    {
        let path = path.as_ref().to_path_buf();
        |err: E| Error {
            kind: ErrorKind::Io(path),
            cause: Some(err.into()),
        }
    }

    pub fn config<S: Into<String>>(message: S) -> Error {
        Error::new(ErrorKind::Config(message.into()))
    }

    pub fn cancelled() -> Error {
        Error::new(ErrorKind::Cancelled)
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Covers every "nothing to serve" outcome: a missing exact key, a user
    /// without objects and a user whose objects are all unparseable.
    pub fn is_not_found(&self) -> bool {
        match self.kind {
            ErrorKind::NotFound(_)
            | ErrorKind::NoBackupsFound(_)
            | ErrorKind::NoValidSnapshots { .. } => true,
            _ => false,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self.kind, ErrorKind::Storage(_))
    }

    fn description(&self) -> &str {
        match &self.kind {
            ErrorKind::MalformedKey(_) => "Malformed backup key",
            ErrorKind::BadIteration(_) => "Bad iteration in backup key",
            ErrorKind::BadTimestamp(_) => "Bad timestamp in backup key",
            ErrorKind::InvalidUserId(_) => "Invalid user id",
            ErrorKind::ForeignKey { .. } => "Backup key belongs to another user",
            ErrorKind::NotFound(_) => "Object not found",
            ErrorKind::NoBackupsFound(_) => "No backups found",
            ErrorKind::NoValidSnapshots { .. } => "No valid snapshots",
            ErrorKind::Storage(_) => "Storage temporarily unavailable",
            ErrorKind::Io(_) => "I/O error",
            ErrorKind::Config(_) => "Configuration error",
            ErrorKind::Cancelled => "Cancelled",
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        let description = self.description();
        match &self.kind {
            ErrorKind::MalformedKey(key)
            | ErrorKind::BadIteration(key)
            | ErrorKind::BadTimestamp(key)
            | ErrorKind::NotFound(key) => write!(f, "{} '{}'", description, key)?,
            ErrorKind::InvalidUserId(user_id) => write!(f, "{} '{}'", description, user_id)?,
            ErrorKind::ForeignKey { expected, found } => write!(
                f,
                "{}; expected '{}', found '{}'",
                description, expected, found
            )?,
            ErrorKind::NoBackupsFound(user_id) => {
                write!(f, "{} for user '{}'", description, user_id)?
            }
            ErrorKind::NoValidSnapshots { user_id, rejected } => write!(
                f,
                "{} for user '{}' ({} rejected)",
                description, user_id, rejected
            )?,
            ErrorKind::Storage(message) => write!(f, "{}; {}", description, message)?,
            ErrorKind::Io(path) => write!(f, "{} at {:?}", description, path.as_os_str())?,
            ErrorKind::Config(message) => write!(f, "{}; {}", description, message)?,
            ErrorKind::Cancelled => write!(f, "{}", description)?,
        };

        let mut cause = self.source();
        while let Some(err) = cause {
            write!(f, "; {}", err)?;
            cause = err.source()
        }

        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        if let Some(ref err) = self.cause {
            return Some(err.as_ref());
        }
        None
    }
}

pub trait ResultExt<T, E> {
    fn io_err<P>(self, path: P) -> Result<T, Error>
    where
        P: AsRef<Path>;

    fn storage_err<S>(self, message: S) -> Result<T, Error>
    where
        S: Into<String>;
}

impl<T, E> ResultExt<T, E> for Result<T, E>
where
    E: Into<Cause>,
{
    fn io_err<P>(self, path: P) -> Result<T, Error>
    where
        P: AsRef<Path>,
    {
        self.map_err(Error::io(path))
    }

    fn storage_err<S>(self, message: S) -> Result<T, Error>
    where
        S: Into<String>,
    {
        self.map_err(Error::storage_with(message))
    }
}
