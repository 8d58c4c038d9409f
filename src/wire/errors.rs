use thiserror::Error;

#[derive(Debug, PartialEq, Eq, Error)]
pub enum HeaderError {
    #[error("Buffer too small: expected at least {expected} bytes, actual {found} bytes")]
    BufferTooSmall { expected: usize, found: usize },

    #[error("Bad checksum in {0} header")]
    BadChecksum(&'static str),

    #[error("Unsupported {field}: {value:#06x}")]
    Unsupported { field: &'static str, value: u16 },
}
