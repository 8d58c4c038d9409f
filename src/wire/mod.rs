pub mod arp;
pub mod errors;
pub mod ethernet;
pub mod ipv4;

// -- Re-export structs for more concise usage

pub use arp::ArpMessage;
pub use errors::HeaderError;
pub use ethernet::{EthernetFrame, EthernetHeader, MacAddress};
pub use ipv4::{IpFlags, Ipv4Datagram, Ipv4Header};
