use std::io;

/// A message that knows how to lay itself out on the wire.
pub trait Serialize<'a> {
    /// Writes the owned part of the message into `buf`.
    ///
    /// # Arguments
    /// * `buf` - The buffer to append the serialized header into.
    ///
    /// # Returns
    /// An optional borrowed tail that should be written right after `buf`
    /// without copying, or an io error if the message can't be encoded.
    fn serialize(&'a self, buf: &mut Vec<u8>) -> io::Result<Option<&'a [u8]>>;
}
