pub mod attrs;
pub mod chunk;
pub mod packet;

pub use attrs::Attrs;
pub use chunk::{Carry, Chunk};
pub use packet::{CanonicalPacket, Packet, PacketProvenance, SystemKind};

/// `(chunk origin time, column offset)` persisted after every flush.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Checkpoint {
    pub origin_time: f64,
    pub cursor: u32,
}
