use thiserror::Error;

use crate::memory::{ConfigError, HeapError};

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid heap configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Heap(#[from] HeapError),
}
