use std::fmt;

// Every failure aborts the generation pass; the kind records which failure
// class produced it so callers can tell a bad model apart from a generator
// defect without parsing the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    // A referenced entity is missing or a definition is malformed.
    Model,
    // The output script (or a metadata artifact) could not be written.
    Io,
    // A generator produced an ill-formed script: forward reference,
    // duplicate output, undefined rule. Always a bug, never user error.
    Script,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    msg: String,
}

impl Error {
    pub fn msg<M: Into<String>>(msg: M) -> Self {
        Self::model(msg)
    }

    pub fn model<M: Into<String>>(msg: M) -> Self {
        Self {
            kind: ErrorKind::Model,
            msg: msg.into(),
        }
    }

    pub fn io<M: Into<String>>(msg: M) -> Self {
        Self {
            kind: ErrorKind::Io,
            msg: msg.into(),
        }
    }

    pub fn script<M: Into<String>>(msg: M) -> Self {
        Self {
            kind: ErrorKind::Script,
            msg: msg.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::model(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
