use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;

pub type MpcResult<T> = Result<T, MpcError>;

#[derive(Debug)]
pub enum MpcError {
    Commitment,
    Io(io::Error),
    InsufficientPreprocessing(String),
    InvalidParameters(String),
}

impl Display for MpcError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            MpcError::Commitment => f.write_str("CommitmentError"),
            MpcError::Io(io_err) => write!(f, "IoError({})", io_err),
            MpcError::InsufficientPreprocessing(what) => {
                write!(f, "InsufficientPreprocessing({})", what)
            }
            MpcError::InvalidParameters(msg) => write!(f, "InvalidParameters({})", msg),
        }
    }
}

impl Error for MpcError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MpcError::Io(io_err) => Some(io_err),
            _ => None,
        }
    }
}

impl From<io::Error> for MpcError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}
