/// Errors which may arise while decoding a GPT header or its entry array.
#[cfg_attr(rustfmt, rustfmt_skip)]
#[derive(Debug, Fail, PartialEq)]
pub enum GptError {
    #[fail(display = "{} requires {} bytes, but only {} were supplied", what, need, len)]
    ShortBuffer { what: &'static str, need: usize, len: usize },
    #[fail(display = "GPT signature was not found")]
    InvalidSignature,
    #[fail(display = "unsupported GPT header size: {}", size)]
    InvalidHeaderSize { size: u32 },
    #[fail(display = "GPT header checksum mismatch (stored {:#010x}, computed {:#010x})", stored, computed)]
    HeaderChecksum { stored: u32, computed: u32 },
    #[fail(display = "partition entries checksum mismatch (stored {:#010x}, computed {:#010x})", stored, computed)]
    EntriesChecksum { stored: u32, computed: u32 },
    #[fail(display = "unsupported partition entry size: {}", size)]
    InvalidEntrySize { size: u32 },
}
