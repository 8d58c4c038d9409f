use crate::tcp::wrap32::Wrap32;

/// The segment record a sender emits: everything the peer's receiver needs,
/// with header serialization left to the wire layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderMessage {
    pub seqno: Wrap32,
    pub syn: bool,
    pub payload: Vec<u8>,
    pub fin: bool,
    pub rst: bool,
}

impl SenderMessage {
    /// How many sequence numbers this segment occupies (SYN and FIN each
    /// take one, in addition to the payload).
    pub fn sequence_length(&self) -> u64 {
        self.syn as u64 + self.payload.len() as u64 + self.fin as u64
    }
}

/// The acknowledgment record a receiver reports back to the peer's sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiverMessage {
    /// Next sequence number expected; absent until a SYN has been seen.
    pub ackno: Option<Wrap32>,
    pub window_size: u16,
    pub rst: bool,
}

// -- Unit tests --
