use bytes::{Bytes, BytesMut};
use std::fmt;

/// One item of a streamed body: a chunk of bytes or the error that ended the stream.
pub type BodyChunk = anyhow::Result<Bytes>;

/// A lazily produced body: an iterator of byte chunks.
///
/// Streams are pulled one chunk at a time; nothing is read ahead, so whoever
/// drives the iterator controls how much of the body is resident at once.
pub struct BodyStream {
    inner: Box<dyn Iterator<Item = BodyChunk> + Send>,
}

impl BodyStream {
    pub fn new<I>(iter: I) -> Self
    where
        I: Iterator<Item = BodyChunk> + Send + 'static,
    {
        Self {
            inner: Box::new(iter),
        }
    }
}

impl Iterator for BodyStream {
    type Item = BodyChunk;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

impl fmt::Debug for BodyStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BodyStream { .. }")
    }
}

/// Request or response body.
#[derive(Debug, Default)]
pub enum Body {
    #[default]
    Empty,
    /// The whole body is already in memory.
    Full(Bytes),
    /// The body arrives incrementally.
    Stream(BodyStream),
}

impl Body {
    pub fn empty() -> Self {
        Body::Empty
    }

    /// Build a streamed body from any iterator of chunks.
    pub fn from_stream<I>(iter: I) -> Self
    where
        I: Iterator<Item = BodyChunk> + Send + 'static,
    {
        Body::Stream(BodyStream::new(iter))
    }

    /// Build a streamed body from infallible chunks.
    pub fn from_chunks<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        I::IntoIter: Send + 'static,
        C: Into<Bytes>,
    {
        Body::from_stream(chunks.into_iter().map(|c| Ok(c.into())))
    }

    /// True when the body is known to be empty without reading it.
    pub fn is_empty(&self) -> bool {
        match self {
            Body::Empty => true,
            Body::Full(bytes) => bytes.is_empty(),
            Body::Stream(_) => false,
        }
    }

    /// Consume the body as a sequence of chunks.
    pub fn into_chunks(self) -> BodyChunks {
        BodyChunks { body: Some(self) }
    }

    /// Read the whole body into memory.
    pub fn collect(self) -> anyhow::Result<Bytes> {
        match self {
            Body::Empty => Ok(Bytes::new()),
            Body::Full(bytes) => Ok(bytes),
            Body::Stream(stream) => {
                let mut buf = BytesMut::new();
                for chunk in stream {
                    buf.extend_from_slice(&chunk?);
                }
                Ok(buf.freeze())
            }
        }
    }

    /// Read the whole body and decode it as UTF-8, replacing invalid sequences.
    pub fn text(self) -> anyhow::Result<String> {
        let bytes = self.collect()?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::Full(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Full(Bytes::from(bytes))
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Full(Bytes::from(text))
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self {
        Body::Full(Bytes::from_static(text.as_bytes()))
    }
}

/// Iterator returned by [`Body::into_chunks`].
///
/// `Full` bodies yield a single chunk, `Empty` bodies none. Empty chunks coming
/// out of a stream are skipped.
pub struct BodyChunks {
    body: Option<Body>,
}

impl Iterator for BodyChunks {
    type Item = BodyChunk;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.body.take()? {
                Body::Empty => return None,
                Body::Full(bytes) => {
                    return if bytes.is_empty() {
                        None
                    } else {
                        Some(Ok(bytes))
                    };
                }
                Body::Stream(mut stream) => match stream.next() {
                    Some(Ok(chunk)) if chunk.is_empty() => {
                        self.body = Some(Body::Stream(stream));
                    }
                    Some(item) => {
                        self.body = Some(Body::Stream(stream));
                        return Some(item);
                    }
                    None => return None,
                },
            }
        }
    }
}
