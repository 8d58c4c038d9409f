use crate::wire::errors::HeaderError;
use crate::wire::ethernet::{EthernetHeader, MacAddress};
use std::net::Ipv4Addr;

/// An ARP message for IPv4 over Ethernet (hardware type 1, protocol type
/// 0x0800, address lengths 6 and 4). Other combinations fail to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpMessage {
    pub opcode: u16,
    pub sender_mac: MacAddress,
    pub sender_ip: Ipv4Addr,
    pub target_mac: MacAddress,
    pub target_ip: Ipv4Addr,
}

impl ArpMessage {
    pub const LENGTH: usize = 28;
    pub const TYPE_ETHERNET: u16 = 1;
    pub const OPCODE_REQUEST: u16 = 1;
    pub const OPCODE_REPLY: u16 = 2;

    /// Build a who-has request. The target hardware address is left zeroed.
    pub fn request(sender_mac: MacAddress, sender_ip: Ipv4Addr, target_ip: Ipv4Addr) -> Self {
        ArpMessage {
            opcode: Self::OPCODE_REQUEST,
            sender_mac,
            sender_ip,
            target_mac: MacAddress::NULL,
            target_ip,
        }
    }

    /// Build a reply addressed to the requester.
    pub fn reply(
        sender_mac: MacAddress,
        sender_ip: Ipv4Addr,
        target_mac: MacAddress,
        target_ip: Ipv4Addr,
    ) -> Self {
        ArpMessage {
            opcode: Self::OPCODE_REPLY,
            sender_mac,
            sender_ip,
            target_mac,
            target_ip,
        }
    }

    /// Serialize an `ArpMessage` into a byte array of size 28.
    pub fn serialize(&self, buf: &mut [u8]) -> Result<usize, HeaderError> {
        if buf.len() < Self::LENGTH {
            return Err(HeaderError::BufferTooSmall {
                expected: Self::LENGTH,
                found: buf.len(),
            });
        }

        buf[0..2].copy_from_slice(&Self::TYPE_ETHERNET.to_be_bytes());
        buf[2..4].copy_from_slice(&EthernetHeader::TYPE_IPV4.to_be_bytes());
        buf[4] = 6; // hardware address length
        buf[5] = 4; // protocol address length
        buf[6..8].copy_from_slice(&self.opcode.to_be_bytes());
        buf[8..14].copy_from_slice(&self.sender_mac.octets());
        buf[14..18].copy_from_slice(&self.sender_ip.octets());
        buf[18..24].copy_from_slice(&self.target_mac.octets());
        buf[24..28].copy_from_slice(&self.target_ip.octets());

        Ok(Self::LENGTH)
    }

    /// Serialize into a fresh byte vector.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; Self::LENGTH];
        self.serialize(&mut buf)
            .expect("28-byte buffer fits an ARP message");
        buf
    }

    /// Parse a byte array into an `ArpMessage`.
    pub fn parse(buf: &[u8]) -> Result<Self, HeaderError> {
        if buf.len() < Self::LENGTH {
            return Err(HeaderError::BufferTooSmall {
                expected: Self::LENGTH,
                found: buf.len(),
            });
        }

        let hardware_type = u16::from_be_bytes([buf[0], buf[1]]);
        let protocol_type = u16::from_be_bytes([buf[2], buf[3]]);
        if hardware_type != Self::TYPE_ETHERNET {
            return Err(HeaderError::Unsupported {
                field: "ARP hardware type",
                value: hardware_type,
            });
        }
        if protocol_type != EthernetHeader::TYPE_IPV4 {
            return Err(HeaderError::Unsupported {
                field: "ARP protocol type",
                value: protocol_type,
            });
        }
        if buf[4] != 6 || buf[5] != 4 {
            return Err(HeaderError::Unsupported {
                field: "ARP address lengths",
                value: u16::from_be_bytes([buf[4], buf[5]]),
            });
        }

        let opcode = u16::from_be_bytes([buf[6], buf[7]]);
        let mut sender_mac = [0u8; 6];
        let mut target_mac = [0u8; 6];
        sender_mac.copy_from_slice(&buf[8..14]);
        target_mac.copy_from_slice(&buf[18..24]);
        let sender_ip = Ipv4Addr::new(buf[14], buf[15], buf[16], buf[17]);
        let target_ip = Ipv4Addr::new(buf[24], buf[25], buf[26], buf[27]);

        Ok(ArpMessage {
            opcode,
            sender_mac: sender_mac.into(),
            sender_ip,
            target_mac: target_mac.into(),
            target_ip,
        })
    }
}

// -- Unit tests --

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_round_trip() {
        let msg = ArpMessage::request(
            MacAddress::from([0xaa; 6]),
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(10, 0, 0, 2),
        );

        let bytes = msg.to_bytes();
        let parsed = ArpMessage::parse(&bytes).unwrap();
        assert_eq!(parsed, msg);
        assert!(parsed.target_mac.is_unspecified());
    }

    #[test]
    fn test_reply_round_trip() {
        let msg = ArpMessage::reply(
            MacAddress::from([0xbb; 6]),
            Ipv4Addr::new(10, 0, 0, 2),
            MacAddress::from([0xaa; 6]),
            Ipv4Addr::new(10, 0, 0, 1),
        );

        let parsed = ArpMessage::parse(&msg.to_bytes()).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn test_known_request_bytes() {
        // Who has 10.0.0.2? Tell aa:aa:aa:aa:aa:aa at 10.0.0.1.
        let fixture = hex::decode(concat!(
            "0001",         // hardware type: Ethernet
            "0800",         // protocol type: IPv4
            "06",           // hardware address length
            "04",           // protocol address length
            "0001",         // opcode: request
            "aaaaaaaaaaaa", // sender MAC
            "0a000001",     // sender IP
            "000000000000", // target MAC (unknown)
            "0a000002",     // target IP
        ))
        .unwrap();

        let msg = ArpMessage::request(
            MacAddress::from([0xaa; 6]),
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(10, 0, 0, 2),
        );
        assert_eq!(msg.to_bytes(), fixture);
        assert_eq!(ArpMessage::parse(&fixture).unwrap(), msg);
    }

    #[test]
    fn test_rejects_foreign_hardware_type() {
        let mut bytes = ArpMessage::request(
            MacAddress::NULL,
            Ipv4Addr::UNSPECIFIED,
            Ipv4Addr::UNSPECIFIED,
        )
        .to_bytes();
        bytes[1] = 6; // IEEE 802 instead of Ethernet

        assert_eq!(
            ArpMessage::parse(&bytes).unwrap_err(),
            HeaderError::Unsupported {
                field: "ARP hardware type",
                value: 6
            }
        );
    }

    #[test]
    fn test_rejects_short_buffer() {
        let result = ArpMessage::parse(&[0u8; 27]);
        assert_eq!(
            result.unwrap_err(),
            HeaderError::BufferTooSmall {
                expected: 28,
                found: 27
            }
        );
    }
}
