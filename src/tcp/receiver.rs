use crate::tcp::byte_stream::ByteStream;
use crate::tcp::messages::{ReceiverMessage, SenderMessage};
use crate::tcp::reassembler::Reassembler;
use crate::tcp::wrap32::Wrap32;

/// The receiving half of a connection: turns peer segments into reassembled
/// stream bytes and reports the acknowledgment and window to send back.
///
/// The ISN is pinned by the first SYN-bearing segment; everything arriving
/// earlier is ignored. A peer RST poisons the output stream and forgets the
/// ISN, after which the connection is dead.
#[derive(Debug)]
pub struct TcpReceiver {
    isn: Option<Wrap32>, // Initial seq number, set once by the peer's SYN
    reassembler: Reassembler,
}

impl TcpReceiver {
    pub fn new(reassembler: Reassembler) -> Self {
        TcpReceiver {
            isn: None,
            reassembler,
        }
    }

    /// Process one segment from the peer's sender
    pub fn receive(&mut self, msg: &SenderMessage) {
        if msg.rst {
            self.reassembler.output_mut().set_error();
            self.isn = None;
            return;
        }

        let isn = match self.isn {
            Some(isn) => isn,
            None => {
                if !msg.syn {
                    return;
                }
                self.isn = Some(msg.seqno);
                msg.seqno
            }
        };

        // The SYN occupies absolute seqno 0, so the first byte of the stream
        // lives at absolute seqno 1; unwrap near the next byte we expect.
        let checkpoint = self.reassembler.output().bytes_pushed() + 1;
        let abs_seqno = msg.seqno.unwrap(isn, checkpoint);

        // A data segment claiming the ISN's slot has no valid stream index
        let Some(stream_index) = (abs_seqno + msg.syn as u64).checked_sub(1) else {
            return;
        };
        self.reassembler.insert(stream_index, &msg.payload, msg.fin);
    }

    /// The acknowledgment to report back to the peer
    pub fn send(&self) -> ReceiverMessage {
        let output = self.reassembler.output();
        let ackno = self.isn.map(|isn| {
            // SYN plus assembled bytes, plus the FIN once the stream closed
            Wrap32::wrap(1 + output.bytes_pushed() + output.is_closed() as u64, isn)
        });

        ReceiverMessage {
            ackno,
            window_size: output.available_capacity().min(u16::MAX as usize) as u16,
            rst: output.has_error(),
        }
    }

    /// The assembled output stream
    pub fn output(&self) -> &ByteStream {
        self.reassembler.output()
    }

    /// The assembled output stream, for the reading side
    pub fn output_mut(&mut self) -> &mut ByteStream {
        self.reassembler.output_mut()
    }

    /// The reassembler's pending byte count
    pub fn bytes_pending(&self) -> usize {
        self.reassembler.bytes_pending()
    }
}

// -- Unit tests --
