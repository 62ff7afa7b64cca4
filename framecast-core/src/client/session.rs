//! Client session: per-frame start / await / stop lifecycle over one
//! datagram socket shared by all streams.
//!
//! ## Frame protocol
//!
//! 1. [`start`](Session::start) re-arms the reassembler, opens the packet
//!    gate, and sends one render command per server.
//! 2. [`wait_until`](Session::wait_until) blocks until every stream has
//!    delivered its frame or the deadline passes.
//! 3. [`stop`](Session::stop) closes the gate and moves the result out;
//!    streams that delivered nothing are absent from its bitmask.
//!
//! The reassembler is only mutated by the receiver while the gate is open,
//! so the display side may read the screen buffer freely between `stop`
//! and the next `start`.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use socket2::SockRef;
use tokio::net::UdpSocket;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::receiver::{receiver_task, ClientState, Reassembler, ReceiverShared};
use crate::client::result::FrameResult;
use crate::config::{NUM_STREAMS, SCREEN_BUFFER_SIZE};
use crate::error::FramecastError;
use crate::protocol::RenderCommand;

/// DSCP CS6 in the IPv4 TOS byte: network-control priority for the frame
/// stream on links that honour it.
const DSCP_CS6: u32 = 0xC0;

/// Current wall-clock timestamp in nanoseconds; the timebase shared by
/// pose stamping and RTT measurement.
pub fn timestamp_ns() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

// ── SessionConfig ────────────────────────────────────────────────

/// Configuration for [`Session`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Server addresses in canonical stream order (index = stream id).
    pub servers: [SocketAddr; NUM_STREAMS],
    /// Local bind address; ephemeral by default.
    pub bind_addr: SocketAddr,
    /// Initial screen buffer contents; zeroed if absent. Resized to
    /// `NUM_STREAMS × SCREEN_BUFFER_SIZE` either way.
    pub screen: Option<Vec<u8>>,
}

impl SessionConfig {
    /// Default configuration for the given server table.
    pub fn new(servers: [SocketAddr; NUM_STREAMS]) -> Self {
        Self {
            servers,
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            screen: None,
        }
    }
}

// ── Session ──────────────────────────────────────────────────────

/// One client session: a socket, its receiver task, and the per-frame
/// reassembly state. Lives for the life of the process.
pub struct Session {
    socket: Arc<UdpSocket>,
    servers: [SocketAddr; NUM_STREAMS],
    shared: Arc<ReceiverShared>,
    token: CancellationToken,
    recv_handle: Option<JoinHandle<()>>,
}

impl Session {
    /// Bind the socket, apply socket options, and spawn the receiver.
    ///
    /// The packet gate starts closed: nothing is ingested before the first
    /// [`start`](Self::start).
    pub async fn new(config: SessionConfig) -> Result<Self, FramecastError> {
        let socket = UdpSocket::bind(config.bind_addr).await?;
        if let Err(e) = SockRef::from(&socket).set_tos_v4(DSCP_CS6) {
            debug!("failed to set DSCP/TOS: {e}");
        }
        let socket = Arc::new(socket);

        let routes: HashMap<SocketAddr, usize> = config
            .servers
            .iter()
            .enumerate()
            .map(|(id, &addr)| (addr, id))
            .collect();

        let mut screen = config.screen.unwrap_or_default();
        screen.resize(NUM_STREAMS * SCREEN_BUFFER_SIZE, 0);

        let shared = Arc::new(ReceiverShared {
            state: Mutex::new(ClientState {
                reassembler: Reassembler::new(),
                screen,
            }),
            drop_incoming: AtomicBool::new(true),
            all_streams: Notify::new(),
        });

        let token = CancellationToken::new();
        let recv_handle = tokio::spawn(receiver_task(
            Arc::clone(&socket),
            routes,
            Arc::clone(&shared),
            token.child_token(),
        ));

        info!(local = %socket.local_addr()?, "session ready");
        Ok(Self {
            socket,
            servers: config.servers,
            shared,
            token,
            recv_handle: Some(recv_handle),
        })
    }

    /// The socket's bound local address.
    pub fn local_addr(&self) -> Result<SocketAddr, FramecastError> {
        Ok(self.socket.local_addr()?)
    }

    /// Begin a frame: re-arm reassembly, open the packet gate, and send one
    /// render command per server.
    ///
    /// A failed send is logged and costs that stream the frame; there is
    /// nothing to retry.
    pub async fn start(&self, cmds: &[RenderCommand; NUM_STREAMS]) {
        self.shared.lock_state().reassembler.arm();
        self.shared.drop_incoming.store(false, Ordering::Release);

        for (stream_id, cmd) in cmds.iter().enumerate() {
            if let Err(e) = self
                .socket
                .send_to(&cmd.encode(), self.servers[stream_id])
                .await
            {
                warn!(stream_id, "render command send failed: {e}");
            }
        }
    }

    /// Wait until every stream has delivered the in-flight frame, or until
    /// `deadline`. Returns whether all streams completed.
    pub async fn wait_until(&self, deadline: Instant) -> bool {
        loop {
            let notified = self.shared.all_streams.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.all_streams_complete() {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.all_streams_complete();
            }
        }
    }

    /// End the frame: close the packet gate and take the result.
    pub fn stop(&self) -> FrameResult {
        self.shared.drop_incoming.store(true, Ordering::Release);
        self.shared.lock_state().reassembler.finalize()
    }

    /// Read access to the composited screen buffer
    /// (`NUM_STREAMS × SCREEN_BUFFER_SIZE` bytes, one region per stream).
    ///
    /// Call between `stop()` and the next `start()`; slices that did not
    /// complete retain the previous frame's pixels.
    pub fn with_screen<T>(&self, f: impl FnOnce(&[u8]) -> T) -> T {
        f(&self.shared.lock_state().screen)
    }

    /// Stop the receiver task and wait for it to exit.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(handle) = self.recv_handle.take() {
            let _ = handle.await;
        }
    }

    fn all_streams_complete(&self) -> bool {
        self.shared.lock_state().reassembler.all_streams_active()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

// ── Tests ────────────────────────────────────────────────────────
