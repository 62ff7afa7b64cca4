//! Wire protocol: downlink packet framing and the uplink render command.
//!
//! All multi-byte fields are packed manually so the layout is bit-exact on
//! every platform; nothing here is derived serialization.

pub mod command;
pub mod packet;

pub use command::{Pose, RenderCommand, Tile};
pub use packet::{FrameInfo, PacketInfo};
