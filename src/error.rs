use std::fmt;

/// Structural failures: the only errors allowed to abort a dataset.
#[derive(Debug)]
pub enum AccessError {
    IndexOutOfRange { what: &'static str, index: usize, len: usize },
    ShapeMismatch { expected: [usize; 2], found: [usize; 2] },
    MissingGroup(String),
    NotAVolume(Vec<usize>),
    BadProvenance(String),
    Cache(String),
    Hdf5(hdf5::Error),
    Io(std::io::Error),
}

impl fmt::Display for AccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use AccessError::*;
        match self {
            IndexOutOfRange { what, index, len } =>
                write!(f, "{what} index {index} out of range (volume has {len})"),
            ShapeMismatch { expected: [er, ec], found: [fr, fc] } =>
                write!(f, "expected a {er}x{ec} image, got {fr}x{fc}"),
            MissingGroup(path) => write!(f, "required group `{path}` not found"),
            NotAVolume(shape)  => write!(f, "expected a 3-D dataset, found shape {shape:?}"),
            BadProvenance(why) => write!(f, "unusable provenance table: {why}"),
            Cache(why)         => write!(f, "plan cache: {why}"),
            Hdf5(e)            => write!(f, "HDF5: {e}"),
            Io(e)              => write!(f, "I/O: {e}"),
        }
    }
}

impl std::error::Error for AccessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AccessError::Hdf5(e) => Some(e),
            AccessError::Io(e)   => Some(e),
            _ => None,
        }
    }
}

impl From<hdf5::Error> for AccessError {
    fn from(e: hdf5::Error) -> Self { Self::Hdf5(e) }
}

impl From<std::io::Error> for AccessError {
    fn from(e: std::io::Error) -> Self { Self::Io(e) }
}

pub type Result<T> = std::result::Result<T, AccessError>;
