//! Result type aliases for jobgraph.

use crate::JobgraphError;

/// A specialized `Result` type for jobgraph operations.
pub type JobgraphResult<T> = Result<T, JobgraphError>;
