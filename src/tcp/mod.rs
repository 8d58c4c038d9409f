pub mod byte_stream;
pub mod config;
pub mod messages;
pub mod reassembler;
pub mod receiver;
pub mod sender;
pub mod wrap32;

// -- Re-export structs for more concise usage

pub use byte_stream::ByteStream;
pub use messages::{ReceiverMessage, SenderMessage};
pub use reassembler::Reassembler;
pub use receiver::TcpReceiver;
pub use sender::{TcpSender, Transmit};
pub use wrap32::Wrap32;
