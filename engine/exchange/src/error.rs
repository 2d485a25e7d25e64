use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ExchangeResult<T> = Result<T, ExchangeError>;
