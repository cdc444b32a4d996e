use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Expected exactly one input file, got {0}")]
    UnsupportedInput(usize),

    #[error("Unknown sample: {0}")]
    UnknownSample(String),

    #[error("Sample {0} already exists with a different representation")]
    InconsistentState(String),

    #[error("Inconsistent BIOM state: master table {master}, additional table {additional}")]
    InconsistentBiomState {
        master: &'static str,
        additional: &'static str,
    },

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(&'static str),

    #[error("Only a root tree can be persisted")]
    NotRoot,

    #[error("Distance between {a} and {b} cannot be computed")]
    NotComputable { a: String, b: String },

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    pub(crate) fn not_computable(a: &str, b: &str) -> Self {
        Error::NotComputable {
            a: a.to_string(),
            b: b.to_string(),
        }
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
