//! # framecast-core — split-rendering stream protocol
//!
//! A fixed-cadence, first-person view is rendered cooperatively by several
//! resource-constrained servers and reassembled by one client over plain
//! UDP datagrams.
//!
//! ```text
//! SERVER (× NUM_STREAMS)                       CLIENT
//! ┌──────────────────────────┐                ┌───────────────────────────┐
//! │ SliceRenderer (external) │                │ Session::start            │
//! │   ↓ render task          │   pose+tile    │   ↑ TileController        │
//! │ codec::rle encode        │ ◄──────────    │                           │
//! │   ↓ slice handoff        │                │ receiver task             │
//! │ emitter: MTU packets     │ ──────────►    │   bitmask reassembly      │
//! │   + frame-info trailer   │   datagrams    │   ↓ codec::rle decode     │
//! └──────────────────────────┘                │ screen buffer → presenter │
//!                                             └───────────────────────────┘
//! ```
//!
//! Per display frame the client broadcasts one pose, each server renders
//! and streams its horizontal tile slice by slice, and the client decodes
//! every slice it can verify before the frame budget runs out. Streams
//! that miss the budget are simply re-tiled around on the next frame:
//! loss is a layout problem here, not an error.
//!
//! ## Sub-modules
//!
//! | Module | Purpose |
//! |---|---|
//! | `config` | Compile-time geometry, transport, and timing constants |
//! | `error` | `FramecastError`: every recoverable failure, typed |
//! | `bitstream` | MSB-first bit reader/writer over a byte buffer |
//! | `codec` | Per-slice RLE (default) and predictive (alternate) codecs |
//! | `protocol` | Bit-exact packet header, trailer, and uplink command |
//! | `server` | Render/emit pipeline and the renderer contract |
//! | `client` | Reassembly, session lifecycle, re-tiling, presentation |

pub mod bitstream;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod protocol;
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────

pub use bitstream::Bitstream;
pub use client::{
    FpsWindow, FrameResult, FrameView, PresentationSink, Session, SessionConfig, StreamStats,
    ThroughputEstimator, TileController, TileLayout,
};
pub use error::FramecastError;
pub use protocol::{FrameInfo, PacketInfo, Pose, RenderCommand, Tile};
pub use server::{RenderServer, RenderServerConfig, SliceRenderer, TestPatternRenderer};
