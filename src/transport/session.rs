use std::time::Duration;

use tracing::debug;

use super::{
    error::NetError,
    request::{self, Parse, Request},
    socket::{Connection, Recv, Sent},
};
use crate::{config::TransportConfig, pacer::Pacer};

const RECV_CHUNK: usize = 1024;
const MIN_STEP: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    Got(Request),
    TimedOut,
    Disconnected,
}

/// The one connected client. Dropping it closes the connection.
pub struct Session<C: Connection> {
    conn: C,
    buf: Vec<u8>,
    /// length of the message at the front of `buf` last returned
    used: usize,
    limit: usize,
}

impl<C: Connection> Session<C> {
    pub fn new(conn: C, limit: usize) -> Self {
        Self {
            conn,
            buf: Vec::with_capacity(limit),
            used: 0,
            limit,
        }
    }

    /// Buffers incoming bytes until they form a complete message, the buffer
    /// limit is hit, or `timeout` worth of empty polls have passed. Bytes
    /// received after the previous message are kept and read first.
    pub fn wait_message(
        &mut self,
        timeout: Duration,
        poll: Duration,
        pacer: &mut impl Pacer,
    ) -> Result<Wait, NetError> {
        self.buf.drain(..self.used);
        self.used = 0;
        if !self.buf.is_empty() {
            if let Some(req) = self.take_message() {
                return Ok(Wait::Got(req));
            }
        }

        let mut chunk = [0u8; RECV_CHUNK];
        let mut waited = Duration::ZERO;
        let poll = poll.max(MIN_STEP);

        loop {
            match self.conn.recv(&mut chunk)? {
                Recv::Data(n) => {
                    let room = self.limit.saturating_sub(self.buf.len());
                    self.buf.extend_from_slice(&chunk[..n.min(room)]);
                    if let Some(req) = self.take_message() {
                        return Ok(Wait::Got(req));
                    }
                }
                Recv::Pending => {
                    if waited >= timeout {
                        return Ok(Wait::TimedOut);
                    }
                    pacer.pause(poll);
                    waited += poll;
                }
                Recv::Closed => return Ok(Wait::Disconnected),
            }
        }
    }

    fn take_message(&mut self) -> Option<Request> {
        match request::classify(&self.buf) {
            Parse::Complete(req, used) => {
                self.used = used;
                Some(req)
            }
            Parse::Incomplete if self.buf.len() >= self.limit => {
                debug!("message hit the {} byte limit", self.limit);
                self.used = self.buf.len();
                Some(request::classify_final(&self.buf))
            }
            Parse::Incomplete => None,
        }
    }

    /// What the last [`Session::wait_message`] returned, for logging.
    pub fn received(&self) -> &[u8] {
        &self.buf[..self.used]
    }

    /// Sends `data` in `send_chunk` pieces. Would-block is retried until the
    /// connection has made no progress for `send_stall_timeout_ms`.
    pub fn send_all(
        &mut self,
        data: &[u8],
        cfg: &TransportConfig,
        pacer: &mut impl Pacer,
    ) -> Result<usize, NetError> {
        let chunk = cfg.send_chunk.max(1);
        let stall_limit = Duration::from_millis(cfg.send_stall_timeout_ms);
        let retry = cfg.retry_delay().max(MIN_STEP);
        let mut sent = 0;
        let mut stalled = Duration::ZERO;

        while sent < data.len() {
            let end = (sent + chunk).min(data.len());
            match self.conn.send(&data[sent..end])? {
                Sent::Bytes(0) => return Err(NetError::Disconnected),
                Sent::Bytes(n) => {
                    sent += n.min(end - sent);
                    stalled = Duration::ZERO;
                    if sent < data.len() {
                        pacer.pause(cfg.chunk_delay());
                    }
                }
                Sent::Pending => {
                    if stalled >= stall_limit {
                        return Err(NetError::Timeout(cfg.send_stall_timeout_ms));
                    }
                    pacer.pause(retry);
                    stalled += retry;
                }
            }
        }
        Ok(sent)
    }
}
