//! Live pose feed over UDP.
//!
//! The sink binds two sockets: one pushes `c` lines to the peer, the other
//! listens for discovery. Any datagram arriving while the feed is started
//! binds its source address as the peer; the payload is ignored.
//!
//! ```text
//! Idle --start--> AwaitingPeer --datagram--> Streaming --stop--> Idle
//! ```

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::watch;

use crate::config::StreamConfig;
use crate::error::{CaptureError, Result};
use crate::protocol::pose_line;
use crate::types::Pose;

/// Pause before listening again after a receive error
const RECEIVE_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Streaming sink state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamingState {
    /// Not started; discovery datagrams are ignored
    Idle,
    /// Started, no peer yet
    AwaitingPeer,
    /// Started with a bound peer
    Streaming,
}

impl std::fmt::Display for StreamingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StreamingState::Idle => "idle",
            StreamingState::AwaitingPeer => "awaiting-peer",
            StreamingState::Streaming => "streaming",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Default)]
struct PeerState {
    active: bool,
    peer: Option<SocketAddr>,
}

impl PeerState {
    fn state(&self) -> StreamingState {
        match (self.active, self.peer) {
            (false, _) => StreamingState::Idle,
            (true, None) => StreamingState::AwaitingPeer,
            (true, Some(_)) => StreamingState::Streaming,
        }
    }
}

/// UDP pose feed with reactive peer discovery.
///
/// The receive task is spawned at bind time and keeps listening until the
/// sink is dropped, across any number of start/stop cycles.
pub struct StreamingSink {
    send_socket: UdpSocket,
    send_addr: SocketAddr,
    listen_addr: SocketAddr,
    shared: Arc<Mutex<PeerState>>,
    shutdown_tx: watch::Sender<bool>,
}

impl StreamingSink {
    /// Bind both endpoints and start listening. Must run inside a tokio runtime.
    pub async fn bind(config: &StreamConfig) -> Result<Self> {
        let send_socket = UdpSocket::bind(config.send_addr()).await?;
        let listen_socket = UdpSocket::bind(config.listen_addr()).await?;
        let send_addr = send_socket.local_addr()?;
        let listen_addr = listen_socket.local_addr()?;

        let shared = Arc::new(Mutex::new(PeerState::default()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(receive_loop(listen_socket, Arc::clone(&shared), shutdown_rx));

        log::info!(
            "Streaming sink bound: sending from {}, discovery on {}",
            send_addr,
            listen_addr
        );

        Ok(Self {
            send_socket,
            send_addr,
            listen_addr,
            shared,
            shutdown_tx,
        })
    }

    /// Local address pose datagrams are sent from.
    pub fn send_addr(&self) -> SocketAddr {
        self.send_addr
    }

    /// Local address discovery datagrams are received on.
    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    pub fn state(&self) -> StreamingState {
        self.lock().state()
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        let shared = self.lock();
        if shared.active {
            shared.peer
        } else {
            None
        }
    }

    pub fn is_started(&self) -> bool {
        self.lock().active
    }

    /// Move to `AwaitingPeer`. No-op if already started.
    pub fn start(&self) -> StreamingState {
        let mut shared = self.lock();
        if !shared.active {
            shared.active = true;
            shared.peer = None;
            log::info!("Streaming started, awaiting peer on {}", self.listen_addr);
        }
        shared.state()
    }

    /// Return to `Idle` and forget the peer.
    pub fn stop(&self) {
        let mut shared = self.lock();
        if shared.active {
            log::info!(
                "Streaming stopped{}",
                shared
                    .peer
                    .map(|peer| format!(", released peer {peer}"))
                    .unwrap_or_default()
            );
        }
        shared.active = false;
        shared.peer = None;
    }

    /// Send one pose line to the bound peer without waiting.
    ///
    /// Returns `Ok(false)` when there is no peer to send to.
    pub fn push_pose(&self, pose: &Pose) -> Result<bool> {
        let Some(peer) = self.peer() else {
            return Ok(false);
        };
        let line = pose_line(pose);
        self.send_socket
            .try_send_to(line.as_bytes(), peer)
            .map_err(CaptureError::NetworkTransient)?;
        log::trace!("Pose sent to {}: {}", peer, line);
        Ok(true)
    }

    /// Bind `peer` as if it had sent a discovery datagram.
    #[cfg(test)]
    pub(crate) fn force_peer(&self, peer: SocketAddr) {
        let mut shared = self.lock();
        shared.active = true;
        shared.peer = Some(peer);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PeerState> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for StreamingSink {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

async fn receive_loop(
    socket: UdpSocket,
    shared: Arc<Mutex<PeerState>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut buf = [0u8; 1500];

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                log::debug!("Discovery listener shutting down");
                break;
            }
            result = socket.recv_from(&mut buf) => match result {
                Ok((_, from)) => {
                    let mut state = shared.lock().unwrap_or_else(|e| e.into_inner());
                    if !state.active {
                        log::debug!("Ignoring datagram from {} while idle", from);
                    } else if state.peer.is_none() {
                        state.peer = Some(from);
                        log::info!("Peer discovered: {}", from);
                    }
                }
                Err(e) => {
                    log::warn!("{}", CaptureError::NetworkTransient(e));
                    tokio::time::sleep(RECEIVE_RETRY_DELAY).await;
                }
            }
        }
    }
}
