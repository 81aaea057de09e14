use std::io;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetError {
    #[error("Network init failed (error {0})")]
    Init(i32),
    #[error("Failed to create socket (error {0})")]
    Socket(i32),
    #[error("Server is not listening")]
    NotListening,
    #[error("Failed to bind to port {port} (error {code})")]
    Bind { port: u16, code: i32 },
    #[error("Failed to listen (error {0})")]
    Listen(i32),
    #[error("Accept failed (error {0})")]
    Accept(i32),
    #[error("Send error (error {0})")]
    Send(i32),
    #[error("Receive error (error {0})")]
    Recv(i32),
    #[error("Send stalled for {0} ms")]
    Timeout(u64),
    #[error("Client disconnected")]
    Disconnected,
}

impl NetError {
    pub fn code(&self) -> i32 {
        match self {
            Self::Init(_) => -1,
            Self::Socket(_) | Self::NotListening => -2,
            Self::Bind { .. } => -3,
            Self::Listen(_) => -4,
            Self::Accept(_) => -5,
            Self::Send(_) => -6,
            Self::Recv(_) => -7,
            Self::Timeout(_) => -8,
            Self::Disconnected => -9,
        }
    }
}

/// Negative platform code for an OS error.
pub fn os_code(err: &io::Error) -> i32 {
    -err.raw_os_error().unwrap_or(1).abs()
}
