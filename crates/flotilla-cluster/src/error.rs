use thiserror::Error;

use crate::state::StateError;

pub type ClusterResult<T> = Result<T, ClusterError>;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("internal error: {0}")]
    InternalError(String),
    #[error(transparent)]
    CommonError(#[from] flotilla_common::error::CommonError),
    #[error("error in state storage: {0}")]
    StateError(#[from] StateError),
}
