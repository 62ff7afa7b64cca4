//! Client-side stream session: reassembly, lifecycle, re-tiling, and the
//! presentation contract.
//!
//! | Module | Purpose |
//! |---|---|
//! | `result` | Per-frame result and per-stream statistics |
//! | `receiver` | Datagram ingest state machine + receiver task |
//! | `session` | `start` / `wait_until` / `stop` frame lifecycle |
//! | `controller` | Adaptive redistribution of screen area across streams |
//! | `present` | What the display layer gets to see |
//! | `stats` | Windowed throughput and smoothed RTT |

pub mod controller;
pub mod present;
pub mod receiver;
pub mod result;
pub mod session;
pub mod stats;

pub use controller::{TileController, TileLayout};
pub use present::{FpsWindow, FrameView, PresentationSink};
pub use result::{FrameResult, StreamStats};
pub use session::{Session, SessionConfig};
pub use stats::ThroughputEstimator;
