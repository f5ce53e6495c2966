use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::message::{BackendMessage, MESSAGE_HEADER_SIZE};

/// PostgreSQL message codec for use with tokio Framed.
///
/// Decodes backend messages (tag + length framing); encodes pre-built
/// frontend messages as raw bytes (the startup message has no tag byte,
/// so frontend framing happens at construction time).
#[derive(Debug, Default)]
pub struct MessageCodec;

impl Decoder for MessageCodec {
    type Item = BackendMessage;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // The length field counts itself; anything below 4 is garbage and
        // would otherwise stall the decoder forever.
        if src.len() >= MESSAGE_HEADER_SIZE {
            let len = u32::from_be_bytes([src[1], src[2], src[3], src[4]]);
            if len < 4 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "malformed message length",
                ));
            }
        }
        Ok(BackendMessage::decode(src))
    }
}

impl Encoder<Bytes> for MessageCodec {
    type Error = std::io::Error;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(&item);
        Ok(())
    }
}
