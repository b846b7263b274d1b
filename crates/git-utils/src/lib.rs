pub mod error;
pub mod lockfile;
pub mod tempfile;

pub use error::{LockError, UtilError};

pub type Result<T> = std::result::Result<T, UtilError>;
