//! Non-blocking socket calls the server is written against.

use super::error::NetError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recv {
    Data(usize),
    /// would block, nothing yet
    Pending,
    /// end of stream
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sent {
    Bytes(usize),
    Pending,
}

pub trait Connection {
    fn recv(&mut self, buf: &mut [u8]) -> Result<Recv, NetError>;
    fn send(&mut self, buf: &[u8]) -> Result<Sent, NetError>;
}

pub trait Listener {
    type Conn: Connection;

    /// `Ok(None)` when no connection is pending.
    fn accept(&mut self) -> Result<Option<Self::Conn>, NetError>;
}

pub trait Network {
    type Listener: Listener;

    /// Binds a non-blocking listener on all interfaces.
    fn listen(&mut self, port: u16) -> Result<Self::Listener, NetError>;
}
