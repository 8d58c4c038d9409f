use crate::tcp::byte_stream::ByteStream;
use crate::tcp::config::MAX_PAYLOAD_SIZE;
use crate::tcp::messages::{ReceiverMessage, SenderMessage};
use crate::tcp::wrap32::Wrap32;
use std::collections::VecDeque;
use tracing::trace;

/// Capability for handing a finished segment to the wire.
///
/// The host must not re-enter the sender from inside `transmit`.
pub trait Transmit {
    fn transmit(&mut self, segment: &SenderMessage);
}

/// A segment that has been transmitted but not yet fully acknowledged.
#[derive(Debug)]
struct Outstanding {
    segment: SenderMessage,
    sent_at_ms: u64,
}

/// The sending half of a connection: drains the input stream into sized
/// segments, tracks what is outstanding, and retransmits the oldest segment
/// with exponential back-off when the timer expires.
///
/// Time is virtual; it only advances through `tick`. A zero advertised
/// window is probed as if it were one byte wide, but such probes never back
/// the timer off.
#[derive(Debug)]
pub struct TcpSender {
    input: ByteStream,
    isn: Wrap32,
    initial_rto_ms: u64,
    rto_ms: u64,
    now_ms: u64,
    peer_window: u16,
    window_nonzero: bool,
    syn_sent: bool,
    fin_sent: bool,
    consecutive_retransmissions: u64,
    outstanding: VecDeque<Outstanding>,
}

impl TcpSender {
    pub fn new(input: ByteStream, isn: Wrap32, initial_rto_ms: u64) -> Self {
        TcpSender {
            input,
            isn,
            initial_rto_ms,
            rto_ms: initial_rto_ms,
            now_ms: 0,
            peer_window: 1, // Assume room for the SYN until the peer says otherwise
            window_nonzero: true,
            syn_sent: false,
            fin_sent: false,
            consecutive_retransmissions: 0,
            outstanding: VecDeque::new(),
        }
    }

    /// Emit as many segments as the window allows, draining the input stream
    pub fn push(&mut self, transmit: &mut dyn Transmit) {
        loop {
            let window = u64::max(self.peer_window as u64, 1);
            let available = window.saturating_sub(self.sequence_numbers_in_flight());

            let syn = !self.syn_sent;
            let have_data = self.input.bytes_buffered() > 0 && available > 0;
            if !(syn || have_data || self.fin_ready(available)) {
                break;
            }

            // Seqno comes before this segment's payload leaves the stream
            let abs_seqno = self.syn_sent as u64 + self.input.bytes_popped();

            let payload_len = (available.saturating_sub(syn as u64) as usize)
                .min(MAX_PAYLOAD_SIZE)
                .min(self.input.bytes_buffered());
            let payload = self.drain_payload(payload_len);

            let remaining = available.saturating_sub(syn as u64 + payload_len as u64);
            let fin = self.fin_ready(remaining);

            let segment = SenderMessage {
                seqno: Wrap32::wrap(abs_seqno, self.isn),
                syn,
                payload,
                fin,
                rst: self.input.has_error(),
            };
            if segment.sequence_length() == 0 {
                break;
            }

            self.syn_sent |= syn;
            self.fin_sent |= fin;
            transmit.transmit(&segment);
            self.outstanding.push_back(Outstanding {
                segment,
                sent_at_ms: self.now_ms,
            });
        }
    }

    /// A zero-length segment carrying the next seqno; used for probes and
    /// ack-only replies. Meaningful only once the connection is established.
    pub fn make_empty_message(&self) -> SenderMessage {
        let abs_seqno = self.syn_sent as u64 + self.input.bytes_popped() + self.fin_sent as u64;
        SenderMessage {
            seqno: Wrap32::wrap(abs_seqno, self.isn),
            syn: false,
            payload: Vec::new(),
            fin: false,
            rst: self.input.has_error(),
        }
    }

    /// Process the peer receiver's acknowledgment and window report. May
    /// transmit (e.g. a FIN that just became sendable), so the capability is
    /// taken here as well.
    pub fn receive(&mut self, msg: &ReceiverMessage, transmit: &mut dyn Transmit) {
        if msg.rst {
            self.input.close();
            self.input.set_error();
            self.syn_sent = false;
            self.peer_window = 0;
            return;
        }

        self.peer_window = msg.window_size;
        self.window_nonzero = msg.window_size != 0;

        if let (Some(ackno), true) = (msg.ackno, self.syn_sent) {
            let checkpoint = self.input.bytes_popped() + self.syn_sent as u64;
            let ack = ackno.unwrap(self.isn, checkpoint);

            // An ack for sequence numbers we never sent is malformed
            if ack <= self.next_abs_seqno() {
                let mut acked_something = false;
                while let Some(front) = self.outstanding.front() {
                    let first = front.segment.seqno.unwrap(self.isn, checkpoint);
                    if first + front.segment.sequence_length() > ack {
                        // Partially-covered segments stay outstanding whole
                        break;
                    }
                    self.outstanding.pop_front();
                    acked_something = true;
                }

                if acked_something {
                    self.rto_ms = self.initial_rto_ms;
                    self.consecutive_retransmissions = 0;
                    for entry in &mut self.outstanding {
                        entry.sent_at_ms = self.now_ms;
                    }
                }
            }
        }

        // The window may have opened; in particular a FIN may now fit
        self.push(transmit);
    }

    /// Advance virtual time; retransmit the oldest outstanding segment once
    /// its timer expires
    pub fn tick(&mut self, ms_since_last_tick: u64, transmit: &mut dyn Transmit) {
        self.now_ms += ms_since_last_tick;

        if let Some(oldest) = self.outstanding.front_mut() {
            if self.now_ms - oldest.sent_at_ms >= self.rto_ms {
                transmit.transmit(&oldest.segment);
                oldest.sent_at_ms = self.now_ms;
                if self.window_nonzero {
                    self.consecutive_retransmissions += 1;
                    self.rto_ms *= 2;
                    trace!(
                        rto_ms = self.rto_ms,
                        consecutive = self.consecutive_retransmissions,
                        "retransmission back-off"
                    );
                }
            }
        }
    }

    /// Sum of the sequence lengths of all outstanding segments
    pub fn sequence_numbers_in_flight(&self) -> u64 {
        self.outstanding
            .iter()
            .map(|entry| entry.segment.sequence_length())
            .sum()
    }

    /// How many times in a row the timer has fired without an intervening ack
    pub fn consecutive_retransmissions(&self) -> u64 {
        self.consecutive_retransmissions
    }

    /// The outbound stream, for the writing side
    pub fn input_mut(&mut self) -> &mut ByteStream {
        &mut self.input
    }

    /// The outbound stream
    pub fn input(&self) -> &ByteStream {
        &self.input
    }

    /// Can a FIN go out with `available` sequence numbers left in the window?
    fn fin_ready(&self, available: u64) -> bool {
        self.input.is_closed()
            && self.input.bytes_buffered() == 0
            && !self.fin_sent
            && available >= 1
    }

    /// One past the highest absolute sequence number sent so far
    fn next_abs_seqno(&self) -> u64 {
        self.syn_sent as u64 + self.input.bytes_popped() + self.fin_sent as u64
    }

    fn drain_payload(&mut self, len: usize) -> Vec<u8> {
        let mut payload = Vec::with_capacity(len);
        while payload.len() < len {
            let chunk = self.input.peek();
            let take = chunk.len().min(len - payload.len());
            if take == 0 {
                break;
            }
            payload.extend_from_slice(&chunk[..take]);
            self.input.pop(take);
        }
        payload
    }
}

// -- Unit tests --
