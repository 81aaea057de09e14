use std::{
    io::{self, Read, Write},
    net::{Ipv4Addr, TcpListener, TcpStream},
};

use tracing::debug;

use crate::transport::{
    error::{os_code, NetError},
    socket::{Connection, Listener, Network, Recv, Sent},
};

/// Non-blocking std sockets.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdNetwork;

pub struct StdListener(TcpListener);

impl StdListener {
    pub fn local_port(&self) -> Option<u16> {
        self.0.local_addr().ok().map(|a| a.port())
    }
}

pub struct StdConn(TcpStream);

impl Network for StdNetwork {
    type Listener = StdListener;

    fn listen(&mut self, port: u16) -> Result<StdListener, NetError> {
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .map_err(|e| NetError::Bind { port, code: os_code(&e) })?;
        listener
            .set_nonblocking(true)
            .map_err(|e| NetError::Listen(os_code(&e)))?;
        Ok(StdListener(listener))
    }
}

impl Listener for StdListener {
    type Conn = StdConn;

    fn accept(&mut self) -> Result<Option<StdConn>, NetError> {
        match self.0.accept() {
            Ok((stream, peer)) => {
                debug!("accepted {peer}");
                stream
                    .set_nonblocking(true)
                    .map_err(|e| NetError::Socket(os_code(&e)))?;
                Ok(Some(StdConn(stream)))
            }
            Err(e) if is_transient(&e) => Ok(None),
            Err(e) => Err(NetError::Accept(os_code(&e))),
        }
    }
}

impl Connection for StdConn {
    fn recv(&mut self, buf: &mut [u8]) -> Result<Recv, NetError> {
        match self.0.read(buf) {
            Ok(0) => Ok(Recv::Closed),
            Ok(n) => Ok(Recv::Data(n)),
            Err(e) if is_transient(&e) => Ok(Recv::Pending),
            Err(e) => Err(NetError::Recv(os_code(&e))),
        }
    }

    fn send(&mut self, buf: &[u8]) -> Result<Sent, NetError> {
        match self.0.write(buf) {
            Ok(n) => Ok(Sent::Bytes(n)),
            Err(e) if is_transient(&e) => Ok(Sent::Pending),
            Err(e) => Err(NetError::Send(os_code(&e))),
        }
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted)
}

#[cfg(test)]
mod tests {
    use std::{thread, time::Duration};

    use super::*;

    fn accept_one(listener: &mut StdListener) -> StdConn {
        for _ in 0..500 {
            if let Some(conn) = listener.accept().unwrap() {
                return conn;
            }
            thread::sleep(Duration::from_millis(2));
        }
        panic!("no connection");
    }

    #[test]
    fn test_loopback_exchange() {
        let mut listener = StdNetwork.listen(0).unwrap();
        let port = listener.local_port().unwrap();
        assert!(listener.accept().unwrap().is_none());

        let mut client = TcpStream::connect((Ipv4Addr::LOCALHOST, port)).unwrap();
        let mut conn = accept_one(&mut listener);

        let mut buf = [0u8; 64];
        assert_eq!(conn.recv(&mut buf).unwrap(), Recv::Pending);

        client.write_all(b"ping").unwrap();
        let n = loop {
            match conn.recv(&mut buf).unwrap() {
                Recv::Data(n) => break n,
                Recv::Pending => thread::sleep(Duration::from_millis(2)),
                Recv::Closed => panic!("closed"),
            }
        };
        assert_eq!(&buf[..n], b"ping");

        assert_eq!(conn.send(b"pong").unwrap(), Sent::Bytes(4));
        let mut reply = [0u8; 4];
        client.read_exact(&mut reply).unwrap();
        assert_eq!(&reply, b"pong");

        drop(client);
        let closed = loop {
            match conn.recv(&mut buf) {
                Ok(Recv::Pending) => thread::sleep(Duration::from_millis(2)),
                other => break other,
            }
        };
        assert!(matches!(closed, Ok(Recv::Closed) | Err(NetError::Recv(_))));
    }
}
