//! A user-space TCP/IP core.
//!
//! The `tcp` module turns an unreliable, unordered datagram channel into a
//! reliable in-order byte stream: a bounded [`tcp::ByteStream`], a
//! [`tcp::Reassembler`] that heals reordering, and the
//! [`tcp::TcpSender`]/[`tcp::TcpReceiver`] pair that speaks the protocol.
//! The `net` module carries IP datagrams across an Ethernet segment — ARP
//! resolution in [`net::NetworkInterface`] and longest-prefix forwarding in
//! [`net::Router`] — with the header records living in `wire`.
//!
//! Everything is single-threaded and externally clocked: the host calls
//! `push`/`receive`/`tick` and supplies virtual time in milliseconds. No
//! wall clocks, no threads, no locks.

pub mod net;
pub mod tcp;
pub mod wire;
