//! Datagram ingest: the reassembly state machine and the receiver task.
//!
//! The receiver never trusts a packet further than its bitmasks allow: a
//! slice reaches the screen buffer only once its `slice_end` packet has
//! arrived **and** every packet `0..=pkt_id` is present. Anything less and
//! the slice region keeps its previous frame's pixels: fast degradation,
//! visible to the presenter through the slice bitmask.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::net::UdpSocket;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use crate::codec::rle;
use crate::config::{
    ALL_STREAM_BITMASK, CLIENT_RECV_TIMEOUT, ENC_SLICE_STRIDE, ENC_STREAM_STRIDE,
    MAX_PKTS_PER_SLICE, MTU, NUM_SLICES, NUM_STREAMS, PKT_PAYLOAD_CAP, SCREEN_BUFFER_SIZE,
    SLICE_BUFFER_SIZE,
};
use crate::client::result::FrameResult;
use crate::client::session::timestamp_ns;
use crate::error::FramecastError;
use crate::protocol::{FrameInfo, PacketInfo};

// ── Reassembler ──────────────────────────────────────────────────

/// Per-session reassembly state, mutated only by the receiver between
/// `start()` and `stop()`.
pub(crate) struct Reassembler {
    /// Packet payloads staged at `stream · slice · pkt` offsets until a
    /// slice completes.
    enc_buffer: Vec<u8>,
    /// Bit `k` set ⇔ packet `k` of that slice received.
    pkt_bitmasks: [[u32; NUM_SLICES]; NUM_STREAMS],
    /// Bit `i` set ⇔ stream `i` delivered its frame-terminal packet.
    active_stream_bitmask: u32,
    /// The result being assembled for the in-flight frame.
    pub(crate) result: FrameResult,
}

impl Reassembler {
    pub(crate) fn new() -> Self {
        Self {
            enc_buffer: vec![0u8; NUM_STREAMS * ENC_STREAM_STRIDE],
            pkt_bitmasks: [[0; NUM_SLICES]; NUM_STREAMS],
            active_stream_bitmask: 0,
            result: FrameResult::default(),
        }
    }

    /// Reset for a new frame. Must happen before the drop flag clears.
    pub(crate) fn arm(&mut self) {
        self.pkt_bitmasks = [[0; NUM_SLICES]; NUM_STREAMS];
        self.active_stream_bitmask = 0;
        self.result = FrameResult::armed();
    }

    /// Whether every stream has delivered its frame-terminal packet.
    pub(crate) fn all_streams_active(&self) -> bool {
        self.active_stream_bitmask == ALL_STREAM_BITMASK
    }

    /// Close the frame: streams that delivered nothing are cleared from the
    /// stream bitmask and the result is moved out.
    pub(crate) fn finalize(&mut self) -> FrameResult {
        for i in 0..NUM_STREAMS {
            if self.result.stats[i].slice_bitmask == 0 {
                self.result.stream_bitmask &= !(1 << i);
            }
        }
        std::mem::take(&mut self.result)
    }

    /// Ingest one full-size datagram already attributed to `stream_id`.
    ///
    /// Decodes into `screen` any slice this packet completes. Returns
    /// `true` once every stream has delivered its frame-terminal packet.
    pub(crate) fn ingest(
        &mut self,
        stream_id: usize,
        pkt: &[u8],
        screen: &mut [u8],
        now_ns: u64,
    ) -> bool {
        debug_assert_eq!(pkt.len(), MTU);

        let info = match PacketInfo::decode(pkt) {
            Ok(info) => info,
            Err(e) => {
                warn!(stream_id, "bad packet header: {e}");
                return false;
            }
        };
        let slice_id = info.slice_id as usize;
        let pkt_id = info.pkt_id as usize;
        if slice_id >= NUM_SLICES || pkt_id >= MAX_PKTS_PER_SLICE {
            warn!(stream_id, slice_id, pkt_id, "packet ids out of range");
            return false;
        }

        // Stage the payload at its fixed offset.
        if info.has_data {
            let off = stream_id * ENC_STREAM_STRIDE
                + slice_id * ENC_SLICE_STRIDE
                + pkt_id * PKT_PAYLOAD_CAP;
            self.enc_buffer[off..off + PKT_PAYLOAD_CAP]
                .copy_from_slice(&pkt[PacketInfo::SIZE..PacketInfo::SIZE + PKT_PAYLOAD_CAP]);
        }

        self.pkt_bitmasks[stream_id][slice_id] |= 1 << pkt_id;

        // A slice is delivered only when its end packet has arrived and
        // packets 0..=pkt_id are contiguously present.
        let contiguous = (1u32 << (pkt_id + 1)) - 1;
        if info.slice_end && self.pkt_bitmasks[stream_id][slice_id] == contiguous {
            let slice_bit = 1u32 << slice_id;
            let stats = &mut self.result.stats[stream_id];

            if stats.slice_bitmask & slice_bit == 0 {
                stats.slice_bitmask |= slice_bit;

                let enc_start = stream_id * ENC_STREAM_STRIDE + slice_id * ENC_SLICE_STRIDE;
                let enc = &self.enc_buffer[enc_start..enc_start + ENC_SLICE_STRIDE];
                let out_start = stream_id * SCREEN_BUFFER_SIZE + slice_id * SLICE_BUFFER_SIZE;
                let out = &mut screen[out_start..out_start + SLICE_BUFFER_SIZE];

                let decoded = rle::decode(enc, out);
                stats.num_enc_bytes += decoded.enc_bytes as u32;
            }

            if slice_id == NUM_SLICES - 1 {
                match FrameInfo::read_trailer(pkt) {
                    Ok(trailer) => {
                        let stats = &mut self.result.stats[stream_id];
                        stats.rtt_ns = now_ns.saturating_sub(trailer.timestamp_ns);
                        stats.render_us = trailer.render_us;
                        stats.stream_us = trailer.stream_us;
                    }
                    Err(e) => warn!(stream_id, "unreadable frame trailer: {e}"),
                }
                self.active_stream_bitmask |= 1 << stream_id;
            }
        }

        self.active_stream_bitmask == ALL_STREAM_BITMASK
    }
}

// ── Shared session state ─────────────────────────────────────────

/// Reassembler plus the composited screen: the receiver writes, the display
/// reads between `stop()` and the next `start()`.
pub(crate) struct ClientState {
    pub(crate) reassembler: Reassembler,
    pub(crate) screen: Vec<u8>,
}

/// State shared between the session handle and its receiver task.
pub(crate) struct ReceiverShared {
    pub(crate) state: Mutex<ClientState>,
    /// Per-frame gate: packets arriving outside start..stop are dropped.
    pub(crate) drop_incoming: AtomicBool,
    /// Signalled when every stream has completed the in-flight frame.
    pub(crate) all_streams: Notify,
}

impl ReceiverShared {
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, ClientState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

// ── Receiver task ────────────────────────────────────────────────

/// Receive loop: resolve, gate, ingest, and signal completion.
///
/// Runs until `token` is cancelled; the coarse socket timeout only bounds
/// how long cancellation can go unnoticed.
pub(crate) async fn receiver_task(
    socket: Arc<UdpSocket>,
    routes: HashMap<SocketAddr, usize>,
    shared: Arc<ReceiverShared>,
    token: CancellationToken,
) {
    let mut buf = [0u8; MTU + 64];

    loop {
        let recv = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            r = tokio::time::timeout(CLIENT_RECV_TIMEOUT, socket.recv_from(&mut buf)) => r,
        };
        let (len, peer) = match recv {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => {
                warn!("recv error: {e}");
                continue;
            }
            Err(_) => continue, // timeout: re-check cancellation
        };

        if shared.drop_incoming.load(Ordering::Acquire) {
            continue;
        }
        let Some(&stream_id) = routes.get(&peer) else {
            trace!(%peer, "dropping: {}", FramecastError::UnknownSource(peer.ip()));
            continue;
        };
        if len != MTU {
            let e = FramecastError::ShortPacket {
                got: len,
                expected: MTU,
            };
            warn!(%peer, "dropping: {e}");
            continue;
        }

        let now_ns = timestamp_ns();
        let mut guard = shared.lock_state();
        let ClientState { reassembler, screen } = &mut *guard;
        let all_complete = reassembler.ingest(stream_id, &buf[..len], screen, now_ns);
        drop(guard);

        if all_complete {
            shared.all_streams.notify_waiters();
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PKT_PAYLOAD_WITH_TRAILER;

    /// Build the datagrams of one encoded slice the way the server does.
    fn slice_packets(enc: &[u8], slice_id: usize, trailer: Option<FrameInfo>) -> Vec<Vec<u8>> {
        use crate::server::pipeline::plan_slice_packets;

        let final_slice = trailer.is_some();
        plan_slice_packets(enc.len(), final_slice)
            .into_iter()
            .map(|spec| {
                let info = PacketInfo {
                    slice_end: spec.slice_end,
                    has_data: spec.has_data,
                    slice_id: slice_id as u8,
                    pkt_id: spec.pkt_id,
                };
                let mut pkt = [0u8; MTU];
                pkt[..2].copy_from_slice(&info.encode());
                if spec.has_data {
                    pkt[2..2 + spec.payload.len()].copy_from_slice(&enc[spec.payload.clone()]);
                }
                if spec.trailer {
                    trailer.unwrap().write_trailer(&mut pkt);
                }
                pkt.to_vec()
            })
            .collect()
    }

    /// Encode a slice of noisy pixels large enough to need several packets.
    fn noisy_slice_enc() -> (Vec<u8>, Vec<u8>) {
        let pixels: Vec<u8> = (0..SLICE_BUFFER_SIZE)
            .map(|i| ((i * 7 + i / 320) % 127) as u8)
            .collect();
        let mut enc = vec![0u8; 2 * SLICE_BUFFER_SIZE + 2];
        let n = rle::encode(&pixels, 320, &mut enc).unwrap();
        enc.truncate(n);
        assert!(n > PKT_PAYLOAD_CAP, "test slice must span packets, got {n}");
        (pixels, enc)
    }

    fn fresh() -> (Reassembler, Vec<u8>) {
        let mut r = Reassembler::new();
        r.arm();
        (r, vec![0u8; NUM_STREAMS * SCREEN_BUFFER_SIZE])
    }

    #[test]
    fn complete_slice_decodes_into_its_region() {
        let (pixels, enc) = noisy_slice_enc();
        let (mut r, mut screen) = fresh();

        for pkt in slice_packets(&enc, 1, None) {
            r.ingest(0, &pkt, &mut screen, 0);
        }

        assert_eq!(r.result.stats[0].slice_bitmask, 0b0010);
        assert_eq!(r.result.stats[0].num_enc_bytes as usize, enc.len());
        let region = &screen[SLICE_BUFFER_SIZE..2 * SLICE_BUFFER_SIZE];
        assert_eq!(region, &pixels[..]);
    }

    #[test]
    fn missing_packet_keeps_slice_unverified() {
        let (_, enc) = noisy_slice_enc();
        let (mut r, mut screen) = fresh();

        let pkts = slice_packets(&enc, 2, None);
        assert!(pkts.len() >= 2);
        // Drop packet 0; deliver the rest including the slice end.
        for pkt in &pkts[1..] {
            r.ingest(0, pkt, &mut screen, 0);
        }

        assert_eq!(r.result.stats[0].slice_bitmask, 0);
        assert!(screen.iter().all(|&b| b == 0), "screen must stay untouched");
    }

    #[test]
    fn out_of_order_arrival_completes_on_the_end_packet() {
        let (pixels, enc) = noisy_slice_enc();
        let (mut r, mut screen) = fresh();

        let mut pkts = slice_packets(&enc, 0, None);
        let end = pkts.pop().unwrap();
        pkts.reverse();
        for pkt in &pkts {
            assert!(!r.ingest(0, pkt, &mut screen, 0));
            assert_eq!(r.result.stats[0].slice_bitmask, 0);
        }
        r.ingest(0, &end, &mut screen, 0);
        assert_eq!(r.result.stats[0].slice_bitmask, 0b0001);
        assert_eq!(&screen[..SLICE_BUFFER_SIZE], &pixels[..]);
    }

    #[test]
    fn duplicate_end_packet_is_idempotent() {
        let (_, enc) = noisy_slice_enc();
        let (mut r, mut screen) = fresh();

        let pkts = slice_packets(&enc, 3, Some(FrameInfo::default()));
        for pkt in &pkts {
            r.ingest(0, pkt, &mut screen, 0);
        }
        let once = r.result.stats[0].num_enc_bytes;
        r.ingest(0, pkts.last().unwrap(), &mut screen, 0);
        assert_eq!(r.result.stats[0].num_enc_bytes, once);
        assert_eq!(r.result.stats[0].slice_bitmask, 0b1000);
    }

    #[test]
    fn trailer_populates_stream_stats() {
        let (_, enc) = noisy_slice_enc();
        let (mut r, mut screen) = fresh();

        let trailer = FrameInfo {
            timestamp_ns: 1_000,
            render_us: 11,
            stream_us: 22,
        };
        for pkt in slice_packets(&enc, NUM_SLICES - 1, Some(trailer)) {
            r.ingest(1, &pkt, &mut screen, 5_000);
        }

        let stats = &r.result.stats[1];
        assert_eq!(stats.rtt_ns, 4_000);
        assert_eq!(stats.render_us, 11);
        assert_eq!(stats.stream_us, 22);
        assert_eq!(r.active_stream_bitmask, 0b10);
    }

    #[test]
    fn frame_completes_without_a_lost_middle_slice() {
        // Slice 1 loses a packet; the frame still "delivers" because the
        // terminal slice arrives, and stop() keeps the stream in the mask.
        let (_, enc) = noisy_slice_enc();
        let (mut r, mut screen) = fresh();

        for slice_id in 0..NUM_SLICES {
            let trailer = (slice_id == NUM_SLICES - 1).then(FrameInfo::default);
            let pkts = slice_packets(&enc, slice_id, trailer);
            for (k, pkt) in pkts.iter().enumerate() {
                if slice_id == 1 && k == 0 {
                    continue; // lost
                }
                r.ingest(0, pkt, &mut screen, 0);
            }
        }

        let expected_mask = crate::config::ALL_SLICE_BITMASK & !0b0010;
        assert_eq!(r.result.stats[0].slice_bitmask, expected_mask);
        assert_eq!(r.active_stream_bitmask, 0b01);

        let result = r.finalize();
        assert!(result.stream_active(0));
        assert!(!result.stream_active(1), "silent stream must be cleared");
    }

    #[test]
    fn oversized_packet_ids_are_dropped() {
        let (mut r, mut screen) = fresh();
        let mut pkt = vec![0u8; MTU];
        let info = PacketInfo {
            slice_end: true,
            has_data: true,
            slice_id: 0,
            pkt_id: (MAX_PKTS_PER_SLICE) as u8,
        };
        pkt[..2].copy_from_slice(&info.encode());
        assert!(!r.ingest(0, &pkt, &mut screen, 0));
        assert_eq!(r.pkt_bitmasks[0][0], 0);
    }

    #[test]
    fn arm_resets_everything_between_frames() {
        let (_, enc) = noisy_slice_enc();
        let (mut r, mut screen) = fresh();
        for pkt in slice_packets(&enc, 0, None) {
            r.ingest(0, &pkt, &mut screen, 0);
        }
        assert_ne!(r.result.stats[0].slice_bitmask, 0);

        r.arm();
        assert_eq!(r.result, FrameResult::armed());
        assert_eq!(r.pkt_bitmasks, [[0; NUM_SLICES]; NUM_STREAMS]);
        assert_eq!(r.active_stream_bitmask, 0);
    }

    #[test]
    fn finalize_with_no_streams_returns_empty() {
        let (mut r, _) = fresh();
        let result = r.finalize();
        assert_eq!(result.stream_bitmask, 0);
        assert_eq!(result.stats[0], Default::default());
        // The live result was replaced by an empty one.
        assert_eq!(r.result, FrameResult::default());
    }

    #[test]
    fn trailer_only_end_packet_completes_the_slice() {
        // Force the spill case: last data packet exactly full.
        let enc: Vec<u8> = vec![1u8; PKT_PAYLOAD_WITH_TRAILER + 1];
        let (mut r, mut screen) = fresh();

        let pkts = slice_packets(&enc, NUM_SLICES - 1, Some(FrameInfo::default()));
        assert_eq!(pkts.len(), 2);
        let last_info = PacketInfo::decode(&pkts[1]).unwrap();
        assert!(last_info.slice_end && !last_info.has_data);

        for pkt in &pkts {
            r.ingest(0, pkt, &mut screen, 0);
        }
        assert_eq!(
            r.result.stats[0].slice_bitmask,
            1 << (NUM_SLICES - 1)
        );
        assert_eq!(r.active_stream_bitmask, 0b01);
    }
}
