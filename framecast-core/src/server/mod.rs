//! Server-side render-stream pipeline.
//!
//! | Module | Purpose |
//! |---|---|
//! | `renderer` | [`SliceRenderer`] contract + deterministic test renderer |
//! | `pipeline` | Two-task render/emit pipeline and packetization rules |

pub mod pipeline;
pub mod renderer;

pub use pipeline::{RenderServer, RenderServerConfig};
pub use renderer::{SliceRenderer, TestPatternRenderer};
