//! Server render-stream pipeline.
//!
//! Two cooperating tasks per server:
//!
//! 1. **Render task**: waits for a frame start, then renders and encodes
//!    the frame slice by slice into one of two recycled slice buffers.
//! 2. **Emitter**: owns the socket. Receives render commands, splits each
//!    encoded slice into MTU-sized packets, and appends the frame-info
//!    trailer to the terminal packet (or a trailer-only packet when the
//!    last payload leaves no room).
//!
//! The two slice buffers move renderer → emitter → renderer through a pair
//! of capacity-1/2 channels, so each buffer is owned by exactly one task at
//! any moment and a slice can be streamed while the next one renders.
//!
//! There is no retransmission: a failed send abandons the frame and the
//! pipeline re-arms on the next command. Commands that arrive while a frame
//! is in flight are drained and superseded; only the newest pose is
//! rendered.

use std::ops::Range;
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::codec::rle;
use crate::config::{
    ENC_SLICE_CAPACITY, MTU, NUM_SLICES, PKT_PAYLOAD_CAP, PKT_PAYLOAD_WITH_TRAILER, SCREEN_W,
    SERVER_RECV_TIMEOUT, SLICE_BUFFER_SIZE,
};
use crate::error::FramecastError;
use crate::protocol::{FrameInfo, PacketInfo, RenderCommand};
use crate::server::renderer::SliceRenderer;

// ── Slice handoff ────────────────────────────────────────────────

/// One of the two recycled encode buffers.
struct EncodedSlice {
    buf: Vec<u8>,
    len: usize,
}

impl EncodedSlice {
    fn new() -> Self {
        Self {
            buf: vec![0u8; ENC_SLICE_CAPACITY],
            len: 0,
        }
    }
}

/// Renderer → emitter message: the encoded slice, plus the whole frame's
/// render duration once the last slice is done.
struct SliceMsg {
    slice: EncodedSlice,
    render_us: Option<u32>,
}

// ── Packetization ────────────────────────────────────────────────

/// Where one packet's payload comes from and which header bits it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PacketSpec {
    pub pkt_id: u8,
    pub payload: Range<usize>,
    pub slice_end: bool,
    pub has_data: bool,
    pub trailer: bool,
}

/// Split an encoded slice of `enc_len` bytes into packet specs.
///
/// Data packets carry `PKT_PAYLOAD_CAP` bytes each except the last. For the
/// frame's final slice the trailer rides in the last data packet when its
/// payload leaves 16 bytes of tail room; otherwise the last data packet
/// loses its `slice_end` bit and a trailer-only packet follows, so exactly
/// one packet per slice ends it and exactly one per frame carries the
/// trailer.
pub(crate) fn plan_slice_packets(enc_len: usize, final_slice: bool) -> Vec<PacketSpec> {
    if enc_len == 0 {
        return vec![PacketSpec {
            pkt_id: 0,
            payload: 0..0,
            slice_end: true,
            has_data: false,
            trailer: final_slice,
        }];
    }

    let num_pkts = enc_len.div_ceil(PKT_PAYLOAD_CAP);
    let mut specs: Vec<PacketSpec> = (0..num_pkts)
        .map(|k| {
            let start = k * PKT_PAYLOAD_CAP;
            let end = (start + PKT_PAYLOAD_CAP).min(enc_len);
            PacketSpec {
                pkt_id: k as u8,
                payload: start..end,
                slice_end: k == num_pkts - 1,
                has_data: true,
                trailer: false,
            }
        })
        .collect();

    if final_slice {
        let last = specs.last_mut().expect("num_pkts >= 1");
        if last.payload.len() <= PKT_PAYLOAD_WITH_TRAILER {
            last.trailer = true;
        } else {
            last.slice_end = false;
            specs.push(PacketSpec {
                pkt_id: num_pkts as u8,
                payload: 0..0,
                slice_end: true,
                has_data: false,
                trailer: true,
            });
        }
    }

    specs
}

/// Assemble one fixed-size datagram from its spec.
fn fill_packet(
    pkt: &mut [u8; MTU],
    spec: &PacketSpec,
    slice_id: usize,
    enc: &[u8],
    frame_info: &FrameInfo,
) {
    let info = PacketInfo {
        slice_end: spec.slice_end,
        has_data: spec.has_data,
        slice_id: slice_id as u8,
        pkt_id: spec.pkt_id,
    };
    pkt[..PacketInfo::SIZE].copy_from_slice(&info.encode());
    if spec.has_data {
        let dst = &mut pkt[PacketInfo::SIZE..PacketInfo::SIZE + spec.payload.len()];
        dst.copy_from_slice(&enc[spec.payload.clone()]);
    }
    if spec.trailer {
        frame_info.write_trailer(pkt);
    }
}

// ── RenderServer ─────────────────────────────────────────────────

/// Configuration for [`RenderServer`].
#[derive(Debug, Clone)]
pub struct RenderServerConfig {
    /// How long the emitter waits for a render command before checking for
    /// shutdown again.
    pub recv_timeout: Duration,
}

impl Default for RenderServerConfig {
    fn default() -> Self {
        Self {
            recv_timeout: SERVER_RECV_TIMEOUT,
        }
    }
}

/// One render server: receives render commands on its socket and answers
/// each with a frame's worth of packets.
///
/// # Lifetime
///
/// [`run`](Self::run) consumes the server and loops until the token from
/// [`cancel_token`](Self::cancel_token) is cancelled.
pub struct RenderServer {
    socket: UdpSocket,
    token: CancellationToken,
    config: RenderServerConfig,
}

impl RenderServer {
    /// Wrap an already-bound socket with default configuration.
    pub fn new(socket: UdpSocket) -> Self {
        Self::with_config(socket, RenderServerConfig::default())
    }

    /// Wrap an already-bound socket with explicit configuration.
    pub fn with_config(socket: UdpSocket, config: RenderServerConfig) -> Self {
        Self {
            socket,
            token: CancellationToken::new(),
            config,
        }
    }

    /// Token that stops the pipeline when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Run the pipeline until cancelled.
    pub async fn run<R: SliceRenderer>(self, renderer: R) -> Result<(), FramecastError> {
        let (cmd_tx, cmd_rx) = mpsc::channel::<RenderCommand>(1);
        let (slice_tx, mut slice_rx) = mpsc::channel::<SliceMsg>(1);
        let (recycle_tx, recycle_rx) = mpsc::channel::<EncodedSlice>(2);
        for _ in 0..2 {
            recycle_tx
                .try_send(EncodedSlice::new())
                .map_err(|_| FramecastError::ChannelClosed)?;
        }

        let render_handle = tokio::spawn(render_task(renderer, cmd_rx, slice_tx, recycle_rx));

        let mut cmd_buf = [0u8; 64];
        let mut pkt_buf = [0u8; MTU];

        loop {
            let recv = tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                r = tokio::time::timeout(
                    self.config.recv_timeout,
                    self.socket.recv_from(&mut cmd_buf),
                ) => r,
            };
            let (len, peer) = match recv {
                Ok(Ok(pair)) => pair,
                Ok(Err(e)) => {
                    warn!("command recv error: {e}");
                    continue;
                }
                Err(_) => continue, // idle: no client this interval
            };

            let mut cmd = match RenderCommand::decode(&cmd_buf[..len]) {
                Ok(c) => c,
                Err(e) => {
                    warn!(%peer, "dropping uplink datagram: {e}");
                    continue;
                }
            };
            let mut dest = peer;

            // Anything already queued supersedes the command we just read.
            while let Ok((len, peer)) = self.socket.try_recv_from(&mut cmd_buf) {
                match RenderCommand::decode(&cmd_buf[..len]) {
                    Ok(c) => {
                        cmd = c;
                        dest = peer;
                    }
                    Err(e) => warn!(%peer, "dropping uplink datagram: {e}"),
                }
            }

            let mut frame_info = FrameInfo {
                timestamp_ns: cmd.pose.timestamp_ns,
                ..FrameInfo::default()
            };

            cmd_tx
                .send(cmd)
                .await
                .map_err(|_| FramecastError::ChannelClosed)?;

            let mut stream_elapsed = Duration::ZERO;
            let mut abandoned = false;

            for slice_id in 0..NUM_SLICES {
                let msg = slice_rx
                    .recv()
                    .await
                    .ok_or(FramecastError::ChannelClosed)?;
                if let Some(us) = msg.render_us {
                    frame_info.render_us = us;
                }

                let emit_start = Instant::now();
                if !abandoned {
                    let final_slice = slice_id == NUM_SLICES - 1;
                    for spec in plan_slice_packets(msg.slice.len, final_slice) {
                        if spec.trailer {
                            frame_info.stream_us =
                                (stream_elapsed + emit_start.elapsed()).as_micros() as u32;
                        }
                        fill_packet(&mut pkt_buf, &spec, slice_id, &msg.slice.buf, &frame_info);
                        if let Err(e) = self.socket.send_to(&pkt_buf, dest).await {
                            warn!(%dest, slice_id, "send failed, abandoning frame: {e}");
                            abandoned = true;
                            break;
                        }
                    }
                }
                stream_elapsed += emit_start.elapsed();

                // Buffer goes back to the renderer even on an abandoned frame
                // so the two tasks stay in step.
                recycle_tx
                    .send(msg.slice)
                    .await
                    .map_err(|_| FramecastError::ChannelClosed)?;
            }

            if !abandoned {
                debug!(
                    frame = cmd.pose.frame_num,
                    render_us = frame_info.render_us,
                    stream_us = frame_info.stream_us,
                    "frame streamed"
                );
            }
        }

        drop(cmd_tx);
        drop(recycle_tx);
        drop(slice_rx);
        let _ = render_handle.await;
        Ok(())
    }
}

/// Render-task loop: one frame per received command, one slice at a time.
async fn render_task<R: SliceRenderer>(
    mut renderer: R,
    mut cmd_rx: mpsc::Receiver<RenderCommand>,
    slice_tx: mpsc::Sender<SliceMsg>,
    mut recycle_rx: mpsc::Receiver<EncodedSlice>,
) {
    let mut pixels = vec![0u8; SLICE_BUFFER_SIZE];

    while let Some(cmd) = cmd_rx.recv().await {
        let mut render_elapsed = Duration::ZERO;

        for slice_id in 0..NUM_SLICES {
            let Some(mut slice) = recycle_rx.recv().await else {
                return;
            };

            let t0 = Instant::now();
            renderer.render_slice(&cmd, slice_id, &mut pixels);
            match rle::encode(&pixels, SCREEN_W, &mut slice.buf) {
                Ok(n) => slice.len = n,
                Err(e) => {
                    error!(slice_id, "slice encode failed: {e}");
                    slice.len = 0;
                }
            }
            render_elapsed += t0.elapsed();

            let render_us =
                (slice_id == NUM_SLICES - 1).then(|| render_elapsed.as_micros() as u32);
            if slice_tx.send(SliceMsg { slice, render_us }).await.is_err() {
                return;
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
