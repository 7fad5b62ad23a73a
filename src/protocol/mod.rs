mod mask;
mod message;

pub(crate) use mask::mask;
pub use message::Message;
