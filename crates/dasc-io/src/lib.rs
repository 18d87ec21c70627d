pub mod reader;
pub mod source;

pub use reader::{ColumnarReader, PacketReader, SegYReader};
pub use source::{Descriptor, DirectoryPacketSource, PacketSource};
