//! `tokio_util` codec adapter over the resumable sessions.

use std::sync::Arc;

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::message::{Message, MessageFactoryRegistry};
use super::session::{ReadSession, WriteSession};
use crate::error::{GridwireError, Result};
use crate::serialization::BinaryMarshaller;

/// Codec for framed network messages.
///
/// Implements the `tokio_util::codec::{Encoder, Decoder}` traits for use
/// with tokio's framed I/O. Encoding grows the destination in chunks of the
/// configured encode chunk size; decoding consumes whatever prefix of the
/// source it can and leaves the rest for the next call.
#[derive(Debug)]
pub struct MessageCodec {
    writer: WriteSession,
    reader: ReadSession,
    chunk_size: usize,
}

impl MessageCodec {
    /// Creates a codec decoding the message types in `factories`.
    pub fn new(marshaller: Arc<BinaryMarshaller>, factories: Arc<MessageFactoryRegistry>) -> Self {
        let chunk_size = marshaller.config().encode_chunk_size();
        Self {
            writer: WriteSession::new(Arc::clone(&marshaller)),
            reader: ReadSession::new(marshaller, factories),
            chunk_size,
        }
    }

    /// Returns `true` while a message is partially decoded.
    pub fn is_decoding(&self) -> bool {
        self.reader.is_active()
    }
}

impl Encoder<Box<dyn Message>> for MessageCodec {
    type Error = GridwireError;

    fn encode(&mut self, item: Box<dyn Message>, dst: &mut BytesMut) -> Result<()> {
        loop {
            let start = dst.len();
            dst.resize(start + self.chunk_size, 0);
            let progress = match self.writer.encode(&*item, &mut dst[start..]) {
                Ok(progress) => progress,
                Err(e) => {
                    dst.truncate(start);
                    return Err(e);
                }
            };
            dst.truncate(start + progress.written);
            if progress.finished {
                return Ok(());
            }
            if progress.written == 0 {
                self.writer.reset();
                return Err(GridwireError::Protocol(format!(
                    "no progress encoding message type {} into {} bytes",
                    item.direct_type(),
                    self.chunk_size
                )));
            }
        }
    }
}

impl Decoder for MessageCodec {
    type Item = Box<dyn Message>;
    type Error = GridwireError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        let progress = self.reader.decode(&src[..])?;
        src.advance(progress.consumed);
        Ok(progress.message)
    }
}
