use std::fmt::{Debug, Display};
use std::net::{SocketAddr, UdpSocket};
#[cfg(test)]
use std::sync::mpsc::{self, Receiver, Sender};
use crate::drivers::LinkError;
/// Largest datagram received in one piece. A frame must fit into it.
pub const MAX_DATAGRAM: usize = 1500;
/// Point-to-point radio link. Delivery is best-effort, FIFO per sender.
pub trait Transport {
    type Peer: Clone + Debug + Display;
    /// Bring the link up. Called once before any other operation.
    fn activate(&mut self) -> Result<(), LinkError> {
        Ok(())
    }
    fn add_peer(&mut self, peer: &Self::Peer) -> Result<(), LinkError>;
    fn send(&mut self, peer: &Self::Peer, frame: &[u8]) -> Result<(), LinkError>;
    /// Blocks until the next frame arrives.
    fn receive_next(&mut self) -> Result<(Self::Peer, Vec<u8>), LinkError>;
}
/// One UDP datagram per frame.
pub struct UdpTransport {
    socket: UdpSocket,
    peers: Vec<SocketAddr>,
    buf: Vec<u8>,
}
impl UdpTransport {
    pub fn bind(addr: &str) -> Result<Self, LinkError> {
        let socket = UdpSocket::bind(addr)
            .map_err(|e| LinkError::Transport(format!("cannot bind to {addr}: {e}")))?;
        Ok(Self {
            socket,
            peers: Vec::new(),
            buf: vec![0; MAX_DATAGRAM],
        })
    }
    pub fn local_addr(&self) -> Result<SocketAddr, LinkError> {
        Ok(self.socket.local_addr()?)
    }
}
impl Transport for UdpTransport {
    type Peer = SocketAddr;
    fn add_peer(&mut self, peer: &SocketAddr) -> Result<(), LinkError> {
        if !self.peers.contains(peer) {
            self.peers.push(*peer);
        }
        Ok(())
    }
    fn send(&mut self, peer: &SocketAddr, frame: &[u8]) -> Result<(), LinkError> {
        if !self.peers.contains(peer) {
            return Err(LinkError::Transport(format!("peer {peer} is not registered")));
        }
        let sent = self
            .socket
            .send_to(frame, peer)
            .map_err(|e| LinkError::Transport(format!("send to {peer}: {e}")))?;
        if sent != frame.len() {
            return Err(LinkError::Transport(format!(
                "short send to {peer}: {sent} of {} bytes",
                frame.len()
            )));
        }
        Ok(())
    }
    fn receive_next(&mut self) -> Result<(SocketAddr, Vec<u8>), LinkError> {
        let (n, src) = self
            .socket
            .recv_from(&mut self.buf)
            .map_err(|e| LinkError::Transport(format!("recv: {e}")))?;
        Ok((src, self.buf[..n].to_vec()))
    }
}
/// In-process link built on a pair of channels.
#[cfg(test)]
pub struct LoopbackTransport {
    name: String,
    sender: Sender<(String, Vec<u8>)>,
    receiver: Receiver<(String, Vec<u8>)>,
    peers: Vec<String>,
    /// Number of upcoming sends that should fail.
    pub fail_sends: usize,
}
#[cfg(test)]
impl LoopbackTransport {
    /// Creates two connected endpoints.
    pub fn pair(a: &str, b: &str) -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::channel();
        let (b_tx, a_rx) = mpsc::channel();
        (
            Self::from_parts(a, a_tx, a_rx),
            Self::from_parts(b, b_tx, b_rx),
        )
    }
    fn from_parts(
        name: &str,
        sender: Sender<(String, Vec<u8>)>,
        receiver: Receiver<(String, Vec<u8>)>,
    ) -> Self {
        Self {
            name: name.to_string(),
            sender,
            receiver,
            peers: Vec::new(),
            fail_sends: 0,
        }
    }
}
#[cfg(test)]
impl Transport for LoopbackTransport {
    type Peer = String;
    fn add_peer(&mut self, peer: &String) -> Result<(), LinkError> {
        if !self.peers.contains(peer) {
            self.peers.push(peer.clone());
        }
        Ok(())
    }
    fn send(&mut self, peer: &String, frame: &[u8]) -> Result<(), LinkError> {
        if self.fail_sends > 0 {
            self.fail_sends -= 1;
            return Err(LinkError::Transport("injected send failure".into()));
        }
        if !self.peers.contains(peer) {
            return Err(LinkError::Transport(format!("peer {peer} is not registered")));
        }
        self.sender
            .send((self.name.clone(), frame.to_vec()))
            .map_err(|_| LinkError::TransportClosed)
    }
    fn receive_next(&mut self) -> Result<(String, Vec<u8>), LinkError> {
        self.receiver.recv().map_err(|_| LinkError::TransportClosed)
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn loopback_delivers_in_order() {
        let (mut a, mut b) = LoopbackTransport::pair("sensor", "display");
        a.add_peer(&"display".to_string()).unwrap();
        a.send(&"display".to_string(), &[1, 2]).unwrap();
        a.send(&"display".to_string(), &[3]).unwrap();
        assert_eq!(b.receive_next().unwrap(), ("sensor".to_string(), vec![1, 2]));
        assert_eq!(b.receive_next().unwrap(), ("sensor".to_string(), vec![3]));
    }
    #[test]
    fn loopback_requires_registered_peer() {
        let (mut a, _b) = LoopbackTransport::pair("sensor", "display");
        assert!(matches!(
            a.send(&"display".to_string(), &[0]),
            Err(LinkError::Transport(_))
        ));
    }
    #[test]
    fn loopback_reports_closed_link() {
        let (a, mut b) = LoopbackTransport::pair("sensor", "display");
        drop(a);
        assert!(matches!(b.receive_next(), Err(LinkError::TransportClosed)));
    }
    #[test]
    fn udp_round_trip_on_localhost() {
        let mut rx = UdpTransport::bind("127.0.0.1:0").unwrap();
        let mut tx = UdpTransport::bind("127.0.0.1:0").unwrap();
        let peer = rx.local_addr().unwrap();
        tx.add_peer(&peer).unwrap();
        tx.send(&peer, &[9, 8, 7, 6]).unwrap();
        let (from, bytes) = rx.receive_next().unwrap();
        assert_eq!(from, tx.local_addr().unwrap());
        assert_eq!(bytes, vec![9, 8, 7, 6]);
    }
}
