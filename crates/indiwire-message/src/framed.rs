//! `tokio_util` codec for use with `FramedRead` / `FramedWrite`.

use std::sync::Arc;

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::encode_message;
use crate::decoder::{DecoderConfig, StreamDecoder};
use crate::error::CodecError;
use crate::message::Message;

/// Async codec backed by [`StreamDecoder`].
///
/// Decoding never fails on bad content: broken or unknown fragments are
/// logged and skipped, so only I/O errors end a framed stream.
#[derive(Debug, Default)]
pub struct IndiCodec {
    decoder: StreamDecoder,
}

impl IndiCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: DecoderConfig) -> Self {
        Self {
            decoder: StreamDecoder::with_config(config),
        }
    }
}

impl Decoder for IndiCodec {
    type Item = Message;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if !src.is_empty() {
            let chunk = src.split();
            self.decoder.feed(&chunk);
        }
        Ok(self.decoder.next_message())
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Whatever is still pending at EOF can never complete.
        self.decode(src)
    }
}

impl Encoder<Message> for IndiCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_message(&item, dst);
        Ok(())
    }
}

impl Encoder<Arc<Message>> for IndiCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Arc<Message>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_message(&item, dst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{SinkExt, StreamExt};
    use tokio_util::codec::{FramedRead, FramedWrite};

    use super::*;
    use crate::message::{GetProperties, Notice};

    #[test]
    fn decode_across_calls() {
        let mut codec = IndiCodec::new();
        let mut buf = BytesMut::from(&b"<message device=\"A\""[..]);
        assert!(codec.decode(&mut buf).expect("decode").is_none());
        assert!(buf.is_empty());

        buf.extend_from_slice(b" message=\"hi\"/><getProperties version=\"1.7\"/>");
        let first = codec.decode(&mut buf).expect("decode").expect("message");
        let second = codec.decode(&mut buf).expect("decode").expect("message");
        assert_eq!(first.tag_name(), "message");
        assert_eq!(second.tag_name(), "getProperties");
        assert!(codec.decode(&mut buf).expect("decode").is_none());
    }

    #[tokio::test]
    async fn framed_roundtrip_over_duplex() {
        let (client, server) = tokio::io::duplex(64);
        let mut sink = FramedWrite::new(client, IndiCodec::new());
        let mut stream = FramedRead::new(server, IndiCodec::new());

        let msgs = vec![
            Message::GetProperties(GetProperties::all()),
            Message::Notice(Notice {
                device: Some("Dev".into()),
                timestamp: None,
                message: Some("x".repeat(200)),
            }),
        ];

        let expected = msgs.clone();
        let writer = tokio::spawn(async move {
            for msg in msgs {
                sink.send(Arc::new(msg)).await.expect("send");
            }
        });

        for want in expected {
            let got = stream.next().await.expect("item").expect("message");
            assert_eq!(got, want);
        }
        writer.await.expect("writer task");
    }
}
