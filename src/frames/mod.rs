mod decode;
mod frame;
mod io;
mod opcode;

pub use decode::{FrameDecoder, FrameState};
pub use frame::Frame;
pub use io::{FrameReader, FrameWriter};
pub use opcode::Opcode;
