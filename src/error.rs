use thiserror::Error;

/// Failures that end a pump connection.
#[derive(Debug, Error)]
pub enum PumpError {
    /// Read or write on the serial link failed (device unplugged, port gone).
    #[error("transport: {0}")]
    Transport(#[from] std::io::Error),
    #[error("open {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },
    #[error("dispatcher thread panicked")]
    WorkerPanicked,
}

pub type Result<T> = std::result::Result<T, PumpError>;
