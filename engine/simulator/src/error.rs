use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimulatorError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("exchange closed the connection")]
    Disconnected,
    #[error("protocol violation on feed: {0}")]
    Protocol(#[from] protocol::FrameError),
}

pub type SimulatorResult<T> = Result<T, SimulatorError>;
