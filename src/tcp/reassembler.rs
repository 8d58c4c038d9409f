use crate::tcp::byte_stream::ByteStream;
use std::collections::BTreeMap;

/// Reassembles out-of-order, possibly overlapping substrings into the
/// contiguous prefix of a `ByteStream`.
///
/// Only bytes that land inside the acceptance window — between the first
/// unassembled index and the index the output could still buffer — are kept.
/// Stored extents are pairwise disjoint and never touching; overlapping or
/// adjacent inserts coalesce, with incoming bytes winning over stored ones.
#[derive(Debug)]
pub struct Reassembler {
    pending: BTreeMap<u64, Box<[u8]>>, // Out-of-order extents. key = first index
    output: ByteStream,                // The assembled ByteStream, ready to be read
    last_index: Option<u64>,           // One past the final byte, if known
}

impl Reassembler {
    /// New `Reassembler` with the provided `ByteStream` as output
    pub fn new(output: ByteStream) -> Self {
        Reassembler {
            pending: BTreeMap::new(),
            output,
            last_index: None,
        }
    }

    /// Insert a new substring into the `Reassembler`
    pub fn insert(&mut self, first_index: u64, data: &[u8], is_last: bool) {
        let next = self.output.bytes_pushed();
        let window_end = next + self.output.available_capacity() as u64;
        let end = first_index + data.len() as u64;

        // A tail cut off by the capacity window no longer ends the stream.
        let is_last = is_last && end <= window_end;
        if is_last {
            self.last_index = Some(end);
        }

        let start = first_index.max(next);
        let end = end.min(window_end);
        if start < end {
            let offset = (start - first_index) as usize;
            let len = (end - start) as usize;
            self.store(start, &data[offset..offset + len]);
            self.flush();
        }

        if let Some(last) = self.last_index {
            if self.output.bytes_pushed() >= last {
                self.output.close();
            }
        }
    }

    /// The total number of bytes pending reassembly
    pub fn bytes_pending(&self) -> usize {
        self.pending.values().map(|extent| extent.len()).sum()
    }

    /// The assembled output stream
    pub fn output(&self) -> &ByteStream {
        &self.output
    }

    /// The assembled output stream, for the reading side
    pub fn output_mut(&mut self) -> &mut ByteStream {
        &mut self.output
    }

    /// Merge a windowed extent into the pending set, coalescing everything
    /// it overlaps or touches
    fn store(&mut self, start: u64, data: &[u8]) {
        let mut merged_start = start;
        let mut merged_end = start + data.len() as u64;

        let touching: Vec<u64> = self
            .pending
            .range(..=merged_end)
            .filter(|(&s, extent)| s + extent.len() as u64 >= merged_start)
            .map(|(&s, _)| s)
            .collect();

        let mut absorbed = Vec::with_capacity(touching.len());
        for key in touching {
            if let Some(extent) = self.pending.remove(&key) {
                merged_start = merged_start.min(key);
                merged_end = merged_end.max(key + extent.len() as u64);
                absorbed.push((key, extent));
            }
        }

        let mut merged = vec![0u8; (merged_end - merged_start) as usize];
        for (key, extent) in &absorbed {
            let at = (key - merged_start) as usize;
            merged[at..at + extent.len()].copy_from_slice(extent);
        }
        // Incoming bytes win over what was already stored
        let at = (start - merged_start) as usize;
        merged[at..at + data.len()].copy_from_slice(data);

        self.pending.insert(merged_start, merged.into_boxed_slice());
    }

    /// Push every extent that now lines up with the output's next index
    fn flush(&mut self) {
        loop {
            let next = self.output.bytes_pushed();
            let Some(extent) = self.pending.remove(&next) else {
                break;
            };
            let n = self.output.push(&extent);
            if n < extent.len() {
                // Output refused bytes (closed stream); keep the remainder
                let rest = extent[n..].to_vec().into_boxed_slice();
                self.pending.insert(next + n as u64, rest);
                break;
            }
        }
    }
}

// -- Unit tests --
