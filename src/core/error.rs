use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed case folding, synonym, stopword or morphology setup
    Config,
    /// Incompatible attribute layouts between documents, sources or indexes
    Schema,
    Io,
    /// Malformed query, unknown attribute in filter/sort/group-by
    Query,
    Parse,
    NotFound,
    InvalidState,
    Internal,
}

#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub context: String,
}

impl Error {
    pub fn new(kind: ErrorKind, context: String) -> Self {
        Error { kind, context }
    }

    pub fn config(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Config, context.into())
    }

    pub fn schema(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Schema, context.into())
    }

    pub fn query(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Query, context.into())
    }

    pub fn io(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Io, context.into())
    }

    pub fn is_kind(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.context)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error {
            kind: ErrorKind::Io,
            context: err.to_string(),
        }
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error {
            kind: ErrorKind::Parse,
            context: err.to_string(),
        }
    }
}

impl From<fst::Error> for Error {
    fn from(err: fst::Error) -> Self {
        Error {
            kind: ErrorKind::Internal,
            context: format!("FST error: {}", err),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            kind: ErrorKind::Config,
            context: format!("invalid config: {}", err),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_map_to_io_kind() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(err.is_kind(ErrorKind::Io));
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn display_carries_kind_and_context() {
        let err = Error::schema("attribute 'price' changed type");
        assert_eq!(err.to_string(), "Schema: attribute 'price' changed type");
    }
}
