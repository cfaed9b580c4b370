//! A small object model for exercising the heap
//!
//! Six types cover the shapes a language runtime needs: uncollected
//! singletons (nil, symbols), objects without references (integer
//! vectors), objects with fixed reference fields (pairs, cells) and
//! objects with a variable number of references (vectors).
pub mod error;
pub mod runtime;
pub mod types;

pub use error::ModelError;
pub use runtime::{RootStack, Runtime};
pub use types::ModelLayout;
