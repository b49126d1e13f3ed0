use std::io;

/// A message that can be decoded from a received frame.
pub trait Deserialize<'a>: Sized {
    /// Decodes a frame, borrowing from `buf` where possible.
    fn deserialize(buf: &'a [u8]) -> io::Result<Self>;
}
