use thiserror::Error;

pub type CommonResult<T> = Result<T, CommonError>;

#[derive(Debug, Error)]
pub enum CommonError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("missing argument: {0}")]
    MissingArgument(String),
    #[error("error in IO: {0}")]
    IoError(#[from] std::io::Error),
}
