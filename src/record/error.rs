#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RecordError {
    #[error("Not enough bytes")]
    NotEnoughData { actual: usize, minimum: usize },

    #[error("bad quality indicator {0:#04x}")]
    BadIndicator(u8),

    #[error("corrupt header: {0}")]
    BadHeader(&'static str),

    #[error("record has no blockette 1000")]
    NoRecordInfo,

    #[error("invalid record length exponent {0}")]
    RecordLength(u8),

    #[error("unsupported data encoding {0}")]
    UnsupportedEncoding(u8),

    #[error("decompression failed: {0}")]
    Decompression(String),
}
