use crate::wire::errors::HeaderError;
use bitflags::bitflags;
use std::net::Ipv4Addr;

bitflags! {
    // Top three bits of the flags/fragment-offset word
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IpFlags: u16 {
        const RF = 0b100 << 13; // Reserved
        const DF = 0b010 << 13; // Don't Fragment
        const MF = 0b001 << 13; // More Fragments
    }
}

impl IpFlags {
    const OFFSET_MASK: u16 = (1 << 13) - 1;

    /// Combine the flags with a fragment offset into the wire word
    pub fn with_offset(self, frag_offset: u16) -> u16 {
        self.bits() | (frag_offset & Self::OFFSET_MASK)
    }

    /// Split a wire word back into flags and fragment offset
    pub fn split(word: u16) -> (Self, u16) {
        (Self::from_bits_truncate(word), word & Self::OFFSET_MASK)
    }
}

/// The 20-byte IPv4 header. Options are not supported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv4Header {
    pub version: u8, // Always 4
    pub ihl: u8,     // Always 5 since we have no options
    pub tos: u8,
    pub total_len: u16,
    pub id: u16,
    pub flags: IpFlags,   // 3 bits, part of u16
    pub frag_offset: u16, // 13 bits, part of u16
    pub ttl: u8,
    pub protocol: u8,
    pub checksum: u16,
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
}

impl Ipv4Header {
    pub const LENGTH: usize = 20;

    /// Serialize into the first 20 bytes of `buf`, computing the checksum
    /// in the process.
    pub fn serialize(&self, buf: &mut [u8]) -> Result<usize, HeaderError> {
        if buf.len() < Self::LENGTH {
            return Err(HeaderError::BufferTooSmall {
                expected: Self::LENGTH,
                found: buf.len(),
            });
        }
        self.write_into(buf);
        Ok(Self::LENGTH)
    }

    /// Parse the first 20 bytes of `buf` into an `Ipv4Header`.
    pub fn parse(buf: &[u8]) -> Result<Self, HeaderError> {
        let Some(header) = buf.get(..Self::LENGTH) else {
            return Err(HeaderError::BufferTooSmall {
                expected: Self::LENGTH,
                found: buf.len(),
            });
        };
        if Self::checksum(header) != 0 {
            return Err(HeaderError::BadChecksum("IPv4"));
        }

        let word = |i: usize| u16::from_be_bytes([header[2 * i], header[2 * i + 1]]);

        let ihl = header[0] & 0x0f;
        if ihl != 5 {
            return Err(HeaderError::Unsupported {
                field: "IPv4 header length",
                value: u16::from(ihl),
            });
        }
        let (flags, frag_offset) = IpFlags::split(word(3));

        Ok(Ipv4Header {
            version: header[0] >> 4,
            ihl,
            tos: header[1],
            total_len: word(1),
            id: word(2),
            flags,
            frag_offset,
            ttl: header[8],
            protocol: header[9],
            checksum: word(5),
            src_ip: Ipv4Addr::from((u32::from(word(6)) << 16) | u32::from(word(7))),
            dst_ip: Ipv4Addr::from((u32::from(word(8)) << 16) | u32::from(word(9))),
        })
    }

    /// Refresh the stored checksum after a field edit (e.g. a TTL decrement).
    pub fn recompute_checksum(&mut self) {
        let mut bytes = [0u8; Self::LENGTH];
        self.write_into(&mut bytes);
        self.checksum = u16::from_be_bytes([bytes[10], bytes[11]]);
    }

    /// RFC 1071 internet checksum: one's-complement sum over big-endian
    /// 16-bit words, with an odd trailing byte padded by zero.
    pub fn checksum(data: &[u8]) -> u16 {
        let mut words = data.chunks_exact(2);
        let mut sum: u32 = words
            .by_ref()
            .map(|pair| u32::from(u16::from_be_bytes([pair[0], pair[1]])))
            .sum();
        if let Some(&last) = words.remainder().first() {
            sum += u32::from(u16::from_be_bytes([last, 0]));
        }
        while sum > 0xffff {
            sum = (sum & 0xffff) + (sum >> 16);
        }
        !(sum as u16)
    }

    /// The header as its ten wire words, with the checksum slot zeroed
    fn to_words(&self) -> [u16; 10] {
        let src = u32::from(self.src_ip);
        let dst = u32::from(self.dst_ip);
        [
            u16::from_be_bytes([(self.version << 4) | (self.ihl & 0x0f), self.tos]),
            self.total_len,
            self.id,
            self.flags.with_offset(self.frag_offset),
            u16::from_be_bytes([self.ttl, self.protocol]),
            0,
            (src >> 16) as u16,
            src as u16,
            (dst >> 16) as u16,
            dst as u16,
        ]
    }

    fn write_into(&self, out: &mut [u8]) {
        for (slot, word) in out[..Self::LENGTH].chunks_exact_mut(2).zip(self.to_words()) {
            slot.copy_from_slice(&word.to_be_bytes());
        }
        let checksum = Self::checksum(&out[..Self::LENGTH]);
        out[10..12].copy_from_slice(&checksum.to_be_bytes());
    }
}

impl Default for Ipv4Header {
    fn default() -> Self {
        Ipv4Header {
            version: 4,
            ihl: 5,
            tos: 0,
            total_len: Self::LENGTH as u16,
            id: 0,
            flags: IpFlags::DF,
            frag_offset: 0,
            ttl: 64,
            protocol: 0,
            checksum: 0,
            src_ip: Ipv4Addr::UNSPECIFIED,
            dst_ip: Ipv4Addr::UNSPECIFIED,
        }
    }
}

/// An IPv4 datagram: header plus an opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv4Datagram {
    pub header: Ipv4Header,
    pub payload: Vec<u8>,
}

impl Ipv4Datagram {
    /// New datagram with `total_len` and checksum filled in from the payload.
    pub fn new(src_ip: Ipv4Addr, dst_ip: Ipv4Addr, payload: Vec<u8>) -> Self {
        let mut header = Ipv4Header {
            src_ip,
            dst_ip,
            total_len: (Ipv4Header::LENGTH + payload.len()) as u16,
            ..Ipv4Header::default()
        };
        header.recompute_checksum();
        Ipv4Datagram { header, payload }
    }

    /// Serialize the whole datagram into a fresh byte vector.
    pub fn serialize(&self) -> Result<Vec<u8>, HeaderError> {
        let mut buf = vec![0u8; Ipv4Header::LENGTH + self.payload.len()];
        self.header.serialize(&mut buf)?;
        buf[Ipv4Header::LENGTH..].copy_from_slice(&self.payload);
        Ok(buf)
    }

    /// Parse a raw byte buffer into a datagram, honoring the header's
    /// `total_len` (trailing link-layer padding is discarded).
    pub fn parse(buf: &[u8]) -> Result<Self, HeaderError> {
        let header = Ipv4Header::parse(buf)?;
        let total_len = header.total_len as usize;
        if total_len < Ipv4Header::LENGTH || buf.len() < total_len {
            return Err(HeaderError::BufferTooSmall {
                expected: total_len.max(Ipv4Header::LENGTH),
                found: buf.len(),
            });
        }

        Ok(Ipv4Datagram {
            header,
            payload: buf[Ipv4Header::LENGTH..total_len].to_vec(),
        })
    }
}

// -- Unit tests --
