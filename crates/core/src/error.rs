use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReclaimError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("insufficient privilege: running as uid {euid}, root is required")]
    InsufficientPrivilege { euid: u32 },

    #[error("no discovery roots were given")]
    NoRoots,

    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type Result<T, E = ReclaimError> = std::result::Result<T, E>;
