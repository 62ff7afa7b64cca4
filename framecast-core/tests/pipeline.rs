//! End-to-end pipeline tests: real render servers, real UDP on localhost,
//! and a scripted lossy server, exercising the full frame lifecycle.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::Instant;

use framecast_core::client::session::timestamp_ns;
use framecast_core::codec::rle;
use framecast_core::config::{
    ALL_SLICE_BITMASK, ALL_STREAM_BITMASK, MTU, NUM_SLICES, NUM_STREAMS, PKT_PAYLOAD_CAP,
    PKT_PAYLOAD_WITH_TRAILER, SCREEN_BUFFER_SIZE, SCREEN_W, SLICE_BUFFER_SIZE,
};
use framecast_core::{
    FrameInfo, PacketInfo, Pose, RenderCommand, RenderServer, Session, SessionConfig,
    TestPatternRenderer, Tile, TileController, TileLayout,
};

// ── Helpers ──────────────────────────────────────────────────────

/// Spin up a real render server on an ephemeral port.
async fn spawn_server() -> (SocketAddr, tokio_util::sync::CancellationToken) {
    let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = sock.local_addr().unwrap();
    let server = RenderServer::new(sock);
    let token = server.cancel_token();
    tokio::spawn(server.run(TestPatternRenderer));
    (addr, token)
}

fn test_pose(frame_num: u16) -> Pose {
    Pose {
        timestamp_ns: timestamp_ns(),
        frame_num,
        pos: [22.0, 11.5],
        dir: [-1.0, 0.0],
        plane: [0.0, -0.577],
    }
}

/// Split one encoded slice into wire datagrams the way the protocol
/// specifies: full payloads at `pkt_id * payload_cap`, `slice_end` on the
/// last, trailer in the tail of the frame-terminal packet (or its own
/// packet when the payload leaves no room).
fn packets_for_slice(enc: &[u8], slice_id: u8, trailer: Option<FrameInfo>) -> Vec<[u8; MTU]> {
    let num_pkts = enc.len().div_ceil(PKT_PAYLOAD_CAP).max(1);
    let mut pkts = Vec::new();

    for k in 0..num_pkts {
        let start = k * PKT_PAYLOAD_CAP;
        let payload = &enc[start..(start + PKT_PAYLOAD_CAP).min(enc.len())];
        let last = k == num_pkts - 1;
        let trailer_fits = payload.len() <= PKT_PAYLOAD_WITH_TRAILER;

        let mut pkt = [0u8; MTU];
        let info = PacketInfo {
            slice_end: last && (trailer.is_none() || trailer_fits),
            has_data: true,
            slice_id,
            pkt_id: k as u8,
        };
        pkt[..2].copy_from_slice(&info.encode());
        pkt[2..2 + payload.len()].copy_from_slice(payload);
        if last && trailer_fits {
            if let Some(t) = trailer {
                t.write_trailer(&mut pkt);
            }
        }
        pkts.push(pkt);

        if last && !trailer_fits {
            if let Some(t) = trailer {
                let mut tail = [0u8; MTU];
                let info = PacketInfo {
                    slice_end: true,
                    has_data: false,
                    slice_id,
                    pkt_id: (k + 1) as u8,
                };
                tail[..2].copy_from_slice(&info.encode());
                t.write_trailer(&mut tail);
                pkts.push(tail);
            }
        }
    }
    pkts
}

/// A textured slice whose encoding spans several packets (runs of eight
/// keep the burst small enough for loopback receive buffers).
fn noisy_slice() -> (Vec<u8>, Vec<u8>) {
    let pixels: Vec<u8> = (0..SLICE_BUFFER_SIZE)
        .map(|i| ((i / 8) % 120) as u8)
        .collect();
    let mut enc = vec![0u8; 2 * SLICE_BUFFER_SIZE + 2];
    let n = rle::encode(&pixels, SCREEN_W, &mut enc).unwrap();
    enc.truncate(n);
    assert!(enc.len() > PKT_PAYLOAD_CAP);
    (pixels, enc)
}

// ── Scenario: all streams on time ────────────────────────────────

#[tokio::test]
async fn two_streams_complete_a_frame() {
    let (addr0, token0) = spawn_server().await;
    let (addr1, token1) = spawn_server().await;
    let session = Session::new(SessionConfig::new([addr0, addr1]))
        .await
        .unwrap();

    let mut ctl = TileController::new();
    let mut last = None;

    for frame_num in 0..3u16 {
        let (cmds, layout) = ctl.commands(test_pose(frame_num));
        assert_eq!(layout, TileLayout::ideal());

        session.start(&cmds).await;
        let complete = session
            .wait_until(Instant::now() + Duration::from_secs(5))
            .await;
        assert!(complete, "frame {frame_num} did not complete");

        let result = session.stop();
        assert_eq!(result.stream_bitmask, ALL_STREAM_BITMASK);
        for stats in &result.stats {
            assert_eq!(stats.slice_bitmask, ALL_SLICE_BITMASK);
            assert!(stats.rtt_ns > 0);
            assert!(stats.num_enc_bytes > 0);
        }
        ctl.observe(result.stream_bitmask);
        last = Some((cmds[0], result));
    }

    // Every stream region holds the test pattern of the last frame.
    let (cmd, _) = last.unwrap();
    session.with_screen(|screen| {
        for stream in 0..NUM_STREAMS {
            for slice_id in 0..NUM_SLICES {
                for row in [0usize, 30, 59] {
                    let expect = TestPatternRenderer::pixel(&cmd, slice_id, row);
                    let off = stream * SCREEN_BUFFER_SIZE
                        + slice_id * SLICE_BUFFER_SIZE
                        + row * SCREEN_W;
                    assert_eq!(
                        screen[off], expect,
                        "stream {stream} slice {slice_id} row {row}"
                    );
                }
            }
        }
    });

    token0.cancel();
    token1.cancel();
    session.shutdown().await;
}

// ── Scenario: one stream misses the budget ───────────────────────

#[tokio::test]
async fn missing_stream_is_retiled_next_frame() {
    let (addr0, token0) = spawn_server().await;
    // Stream 1 exists but never answers.
    let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr1 = silent.local_addr().unwrap();

    let session = Session::new(SessionConfig::new([addr0, addr1]))
        .await
        .unwrap();
    let mut ctl = TileController::new();

    let (cmds, _) = ctl.commands(test_pose(0));
    session.start(&cmds).await;
    let complete = session
        .wait_until(Instant::now() + Duration::from_millis(500))
        .await;
    assert!(!complete);

    let result = session.stop();
    assert_eq!(result.stream_bitmask, 0b01);
    assert!(result.stats[1].slice_bitmask == 0);

    // Next frame the survivor covers the whole screen; the lost stream is
    // assigned its ideal slot for when it recovers.
    ctl.observe(result.stream_bitmask);
    let layout = ctl.layout();
    assert_eq!(layout.tiles[0].x_scale, 2.0);
    assert_eq!(layout.tiles[0].x_offset, -1.0);
    assert_eq!(layout.tiles[1], Tile::nth_of(1, NUM_STREAMS));

    token0.cancel();
    session.shutdown().await;
}

// ── Scenario: packet loss inside one slice ───────────────────────

#[tokio::test]
async fn lost_packet_leaves_one_slice_stale() {
    // Two scripted servers: stream 0 sends a complete frame, stream 1
    // drops packet 0 of slice 1 but still finishes the frame.
    let server0 = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let server1 = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addrs = [
        server0.local_addr().unwrap(),
        server1.local_addr().unwrap(),
    ];
    let session = Session::new(SessionConfig::new(addrs)).await.unwrap();

    let (pixels, enc) = noisy_slice();
    let run_server = |sock: UdpSocket, lossy: bool| {
        let enc = enc.clone();
        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let (_, client) = sock.recv_from(&mut buf).await.unwrap();
            for slice_id in 0..NUM_SLICES as u8 {
                let trailer = (slice_id == (NUM_SLICES - 1) as u8).then(|| FrameInfo {
                    timestamp_ns: 1,
                    render_us: 5,
                    stream_us: 6,
                });
                for (k, pkt) in packets_for_slice(&enc, slice_id, trailer).iter().enumerate() {
                    if lossy && slice_id == 1 && k == 0 {
                        continue;
                    }
                    sock.send_to(pkt, client).await.unwrap();
                }
            }
        })
    };
    let h0 = run_server(server0, false);
    let h1 = run_server(server1, true);

    session
        .start(&[RenderCommand::default(); NUM_STREAMS])
        .await;
    let complete = session
        .wait_until(Instant::now() + Duration::from_secs(5))
        .await;
    assert!(complete, "both streams sent their terminal packet");

    let result = session.stop();
    assert_eq!(result.stream_bitmask, ALL_STREAM_BITMASK);
    assert_eq!(result.stats[0].slice_bitmask, ALL_SLICE_BITMASK);
    assert_eq!(
        result.stats[1].slice_bitmask,
        ALL_SLICE_BITMASK & !0b0010,
        "slice 1 must stay unverified"
    );

    session.with_screen(|screen| {
        // Stream 0, slice 1 decoded; stream 1, slice 1 untouched (zeros).
        let s0 = &screen[SLICE_BUFFER_SIZE..2 * SLICE_BUFFER_SIZE];
        assert_eq!(s0, &pixels[..]);
        let s1 = &screen
            [SCREEN_BUFFER_SIZE + SLICE_BUFFER_SIZE..SCREEN_BUFFER_SIZE + 2 * SLICE_BUFFER_SIZE];
        assert!(s1.iter().all(|&b| b == 0), "stale region must be untouched");
    });

    let _ = h0.await;
    let _ = h1.await;
    session.shutdown().await;
}

// ── Scenario: recovery after a missed frame ──────────────────────

#[tokio::test]
async fn recovered_stream_rejoins_the_ideal_partition() {
    let (addr0, token0) = spawn_server().await;
    let (addr1, token1) = spawn_server().await;
    let session = Session::new(SessionConfig::new([addr0, addr1]))
        .await
        .unwrap();
    let mut ctl = TileController::new();

    // Pretend stream 1 missed the previous frame.
    ctl.observe(0b01);
    let (cmds, layout) = ctl.commands(test_pose(1));
    assert_eq!(layout.active_mask, 0b01);
    assert_eq!(cmds[0].tile.x_scale, 2.0);

    // Both servers answer this frame.
    session.start(&cmds).await;
    assert!(
        session
            .wait_until(Instant::now() + Duration::from_secs(5))
            .await
    );
    let result = session.stop();
    assert_eq!(result.stream_bitmask, ALL_STREAM_BITMASK);

    ctl.observe(result.stream_bitmask);
    assert_eq!(ctl.layout(), TileLayout::ideal());

    token0.cancel();
    token1.cancel();
    session.shutdown().await;
}
