//! Response body decoding.
//!
//! Two layers are undone here. The transfer framing (`Content-Length`,
//! `Transfer-Encoding: chunked` or read-until-close) tells us where the body
//! ends; the content coding (`gzip`/`deflate`) is inflated with `flate2`'s
//! write-side decoders so input can be pushed in whatever pieces the socket
//! hands out.

use crate::error::{Error, Result};
use crate::http::headers::ResponseHead;
use crate::http::request::Method;

use flate2::write::{DeflateDecoder, GzDecoder, ZlibDecoder};
use std::io::{self, Write};

/// Chunk-size and trailer lines longer than this are rejected.
const MAX_CHUNK_LINE: usize = 4096;

/// Content coding announced by `Content-Encoding`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentEncoding {
    #[default]
    Identity,
    Gzip,
    Deflate,
}

impl ContentEncoding {
    /// Interprets a `Content-Encoding` value; `None` means identity.
    ///
    /// Anything other than identity, gzip or deflate fails with
    /// [`Error::UnsupportedEncoding`].
    pub fn from_header(value: Option<&str>) -> Result<Self> {
        let Some(value) = value else {
            return Ok(ContentEncoding::Identity);
        };
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "identity" => Ok(ContentEncoding::Identity),
            "gzip" | "x-gzip" => Ok(ContentEncoding::Gzip),
            "deflate" => Ok(ContentEncoding::Deflate),
            _ => Err(Error::UnsupportedEncoding(value.trim().to_string())),
        }
    }

    pub fn is_identity(&self) -> bool {
        matches!(self, ContentEncoding::Identity)
    }
}

/// How the end of the body is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Exactly this many bytes follow the head.
    Length(u64),
    /// `Transfer-Encoding: chunked`.
    Chunked,
    /// The body runs until the server closes the connection.
    UntilClose,
}

impl Framing {
    /// Picks the framing of a response to a `method` request.
    pub fn for_response(method: Method, head: &ResponseHead) -> Self {
        if method == Method::Head || head.status == 204 || head.status == 304 {
            Framing::Length(0)
        } else if head.is_chunked() {
            Framing::Chunked
        } else if let Some(length) = head.content_length() {
            Framing::Length(length)
        } else {
            Framing::UntilClose
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkState {
    Size,
    Data(u64),
    DataEnd,
    Trailer,
    Done,
}

/// Incremental decoder for chunked transfer coding.
#[derive(Debug)]
pub struct ChunkedDecoder {
    state: ChunkState,
    line: Vec<u8>,
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self {
            state: ChunkState::Size,
            line: Vec::new(),
        }
    }

    /// Returns `true` once the last chunk and its trailer have been read.
    pub fn is_done(&self) -> bool {
        self.state == ChunkState::Done
    }

    /// Feeds wire bytes, appending chunk payloads to `out`.
    ///
    /// Bytes after the terminating chunk are ignored.
    pub fn decode(&mut self, mut input: &[u8], out: &mut Vec<u8>) -> Result<()> {
        while !input.is_empty() {
            match self.state {
                ChunkState::Size => {
                    let Some(line) = self.take_line(&mut input)? else {
                        break;
                    };
                    let size = line.split(';').next().unwrap_or_default().trim();
                    let size = u64::from_str_radix(size, 16).map_err(|_| {
                        Error::Protocol(format!("invalid chunk size line `{}`", line))
                    })?;
                    self.state = if size == 0 {
                        ChunkState::Trailer
                    } else {
                        ChunkState::Data(size)
                    };
                }
                ChunkState::Data(remaining) => {
                    let n = input.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
                    out.extend_from_slice(&input[..n]);
                    input = &input[n..];
                    let remaining = remaining - n as u64;
                    self.state = if remaining == 0 {
                        ChunkState::DataEnd
                    } else {
                        ChunkState::Data(remaining)
                    };
                }
                ChunkState::DataEnd => {
                    let Some(line) = self.take_line(&mut input)? else {
                        break;
                    };
                    if !line.is_empty() {
                        return Err(Error::Protocol("missing CRLF after chunk data".into()));
                    }
                    self.state = ChunkState::Size;
                }
                ChunkState::Trailer => {
                    let Some(line) = self.take_line(&mut input)? else {
                        break;
                    };
                    if line.is_empty() {
                        self.state = ChunkState::Done;
                    }
                }
                ChunkState::Done => break,
            }
        }
        Ok(())
    }

    fn take_line(&mut self, input: &mut &[u8]) -> Result<Option<String>> {
        match input.iter().position(|b| *b == b'\n') {
            Some(newline) => {
                self.line.extend_from_slice(&input[..newline]);
                *input = &input[newline + 1..];
                let mut line = std::mem::take(&mut self.line);
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                Ok(Some(String::from_utf8_lossy(&line).into_owned()))
            }
            None => {
                self.line.extend_from_slice(input);
                *input = &[];
                if self.line.len() > MAX_CHUNK_LINE {
                    return Err(Error::Protocol("chunk line too long".into()));
                }
                Ok(None)
            }
        }
    }
}

enum Inflater {
    Identity,
    Gzip(GzDecoder<Vec<u8>>),
    Zlib(ZlibDecoder<Vec<u8>>),
    Raw(DeflateDecoder<Vec<u8>>),
    /// Deflate whose wrapping is not known yet; holds the first byte.
    Sniff(Vec<u8>),
}

/// Undoes a content coding.
pub struct ContentDecoder {
    inflater: Inflater,
}

impl ContentDecoder {
    pub fn new(encoding: ContentEncoding) -> Self {
        let inflater = match encoding {
            ContentEncoding::Identity => Inflater::Identity,
            ContentEncoding::Gzip => Inflater::Gzip(GzDecoder::new(Vec::new())),
            ContentEncoding::Deflate => Inflater::Sniff(Vec::with_capacity(2)),
        };
        Self { inflater }
    }

    /// Decodes `input`, appending the result to `out`.
    pub fn write(&mut self, input: &[u8], out: &mut Vec<u8>) -> io::Result<()> {
        if input.is_empty() {
            return Ok(());
        }
        if let Inflater::Sniff(head) = &mut self.inflater {
            head.extend_from_slice(input);
            if head.len() < 2 {
                return Ok(());
            }
            let head = std::mem::take(head);
            self.inflater = if is_zlib_header(head[0], head[1]) {
                Inflater::Zlib(ZlibDecoder::new(Vec::new()))
            } else {
                Inflater::Raw(DeflateDecoder::new(Vec::new()))
            };
            return self.write(&head, out);
        }

        match &mut self.inflater {
            Inflater::Identity => out.extend_from_slice(input),
            Inflater::Gzip(decoder) => {
                decoder.write_all(input)?;
                out.append(decoder.get_mut());
            }
            Inflater::Zlib(decoder) => {
                decoder.write_all(input)?;
                out.append(decoder.get_mut());
            }
            Inflater::Raw(decoder) => {
                decoder.write_all(input)?;
                out.append(decoder.get_mut());
            }
            Inflater::Sniff(_) => {}
        }
        Ok(())
    }

    /// Flushes whatever the inflater still holds.
    pub fn finish(&mut self, out: &mut Vec<u8>) -> io::Result<()> {
        match &mut self.inflater {
            Inflater::Identity => {}
            Inflater::Gzip(decoder) => {
                decoder.try_finish()?;
                out.append(decoder.get_mut());
            }
            Inflater::Zlib(decoder) => {
                decoder.try_finish()?;
                out.append(decoder.get_mut());
            }
            Inflater::Raw(decoder) => {
                decoder.try_finish()?;
                out.append(decoder.get_mut());
            }
            Inflater::Sniff(head) => {
                if !head.is_empty() {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "deflate stream ended after one byte",
                    ));
                }
            }
        }
        Ok(())
    }
}

/// A zlib stream starts with CM = 8 and a header checksum divisible by 31.
fn is_zlib_header(cmf: u8, flg: u8) -> bool {
    cmf & 0x0f == 8 && (u16::from(cmf) << 8 | u16::from(flg)) % 31 == 0
}

/// Turns wire bytes that follow a response head into decoded body bytes.
pub struct BodyDecoder {
    framing: Framing,
    remaining: u64,
    chunked: ChunkedDecoder,
    content: ContentDecoder,
    complete: bool,
}

impl BodyDecoder {
    pub fn new(framing: Framing, encoding: ContentEncoding) -> Self {
        let remaining = match framing {
            Framing::Length(length) => length,
            _ => 0,
        };
        Self {
            framing,
            remaining,
            chunked: ChunkedDecoder::new(),
            content: ContentDecoder::new(encoding),
            complete: false,
        }
    }

    /// Returns `true` when the framing says the body has ended.
    pub fn is_complete(&self) -> bool {
        self.complete || matches!(self.framing, Framing::Length(0))
    }

    /// Largest read that cannot overrun the body, given a buffer of
    /// `buffer_size` bytes.
    pub fn max_read(&self, buffer_size: usize) -> usize {
        match self.framing {
            Framing::Length(_) => usize::try_from(self.remaining)
                .unwrap_or(usize::MAX)
                .min(buffer_size),
            _ => buffer_size,
        }
    }

    /// Feeds wire bytes and appends decoded bytes to `out`.
    ///
    /// When the body ends the content decoder is flushed as well.
    pub fn feed(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<()> {
        if self.complete {
            return Ok(());
        }
        match self.framing {
            Framing::Length(_) => {
                let n = input
                    .len()
                    .min(usize::try_from(self.remaining).unwrap_or(usize::MAX));
                self.content.write(&input[..n], out)?;
                self.remaining -= n as u64;
                if self.remaining == 0 {
                    self.finish(out)?;
                }
            }
            Framing::Chunked => {
                let mut payload = Vec::with_capacity(input.len());
                self.chunked.decode(input, &mut payload)?;
                self.content.write(&payload, out)?;
                if self.chunked.is_done() {
                    self.finish(out)?;
                }
            }
            Framing::UntilClose => self.content.write(input, out)?,
        }
        Ok(())
    }

    /// Handles the connection closing.
    ///
    /// A body cut short of its declared length or last chunk fails with
    /// [`Error::Protocol`].
    pub fn finish_at_eof(&mut self, out: &mut Vec<u8>) -> Result<()> {
        if self.is_complete() {
            return self.finish(out);
        }
        match self.framing {
            Framing::Length(_) => Err(Error::Protocol(format!(
                "body truncated with {} bytes outstanding",
                self.remaining
            ))),
            Framing::Chunked => Err(Error::Protocol(
                "connection closed before the last chunk".into(),
            )),
            Framing::UntilClose => self.finish(out),
        }
    }

    fn finish(&mut self, out: &mut Vec<u8>) -> Result<()> {
        if !self.complete {
            self.complete = true;
            self.content.finish(out).map_err(|error| {
                Error::Protocol(format!("corrupt compressed body: {}", error))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::{DeflateEncoder, GzEncoder, ZlibEncoder};
    use flate2::Compression;

    const TEXT: &[u8] = b"the quick brown fox jumps over the lazy dog, again and again and again";

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn decode_in_pieces(encoding: ContentEncoding, data: &[u8], piece: usize) -> Vec<u8> {
        let mut decoder = ContentDecoder::new(encoding);
        let mut out = Vec::new();
        for chunk in data.chunks(piece) {
            decoder.write(chunk, &mut out).unwrap();
        }
        decoder.finish(&mut out).unwrap();
        out
    }

    #[test]
    fn test_encoding_from_header() {
        assert_eq!(ContentEncoding::from_header(None).unwrap(), ContentEncoding::Identity);
        assert_eq!(
            ContentEncoding::from_header(Some("identity")).unwrap(),
            ContentEncoding::Identity
        );
        assert_eq!(ContentEncoding::from_header(Some("gzip")).unwrap(), ContentEncoding::Gzip);
        assert_eq!(
            ContentEncoding::from_header(Some(" deflate ")).unwrap(),
            ContentEncoding::Deflate
        );
        assert!(matches!(
            ContentEncoding::from_header(Some("br")),
            Err(Error::UnsupportedEncoding(e)) if e == "br"
        ));
    }

    #[test]
    fn test_gzip_in_small_pieces() {
        let compressed = gzip(TEXT);
        for piece in [1, 3, 64] {
            assert_eq!(decode_in_pieces(ContentEncoding::Gzip, &compressed, piece), TEXT);
        }
    }

    #[test]
    fn test_deflate_sniffs_zlib_and_raw() {
        let mut zlib = ZlibEncoder::new(Vec::new(), Compression::default());
        zlib.write_all(TEXT).unwrap();
        let zlib = zlib.finish().unwrap();

        let mut raw = DeflateEncoder::new(Vec::new(), Compression::default());
        raw.write_all(TEXT).unwrap();
        let raw = raw.finish().unwrap();

        assert_eq!(decode_in_pieces(ContentEncoding::Deflate, &zlib, 1), TEXT);
        assert_eq!(decode_in_pieces(ContentEncoding::Deflate, &raw, 1), TEXT);
        assert_eq!(decode_in_pieces(ContentEncoding::Deflate, &raw, 1024), TEXT);
    }

    #[test]
    fn test_chunked_decoding() {
        let wire = b"5\r\nhello\r\n7;ext=1\r\n, world\r\n0\r\nX-Trailer: yes\r\n\r\nIGNORED";
        for piece in [1, 2, 9, wire.len()] {
            let mut decoder = ChunkedDecoder::new();
            let mut out = Vec::new();
            for chunk in wire.chunks(piece) {
                decoder.decode(chunk, &mut out).unwrap();
            }
            assert!(decoder.is_done());
            assert_eq!(out, b"hello, world");
        }
    }

    #[test]
    fn test_chunked_rejects_bad_size() {
        let mut decoder = ChunkedDecoder::new();
        let result = decoder.decode(b"zz\r\nhello\r\n", &mut Vec::new());
        assert!(matches!(result, Err(Error::Protocol(_))));
    }

    #[test]
    fn test_length_framing_stops_at_declared_length() {
        let mut body = BodyDecoder::new(Framing::Length(5), ContentEncoding::Identity);
        assert_eq!(body.max_read(16), 5);

        let mut out = Vec::new();
        body.feed(b"hel", &mut out).unwrap();
        assert!(!body.is_complete());
        assert_eq!(body.max_read(16), 2);
        body.feed(b"lo and more", &mut out).unwrap();
        assert!(body.is_complete());
        assert_eq!(out, b"hello");
    }

    #[test]
    fn test_truncated_length_body() {
        let mut body = BodyDecoder::new(Framing::Length(10), ContentEncoding::Identity);
        let mut out = Vec::new();
        body.feed(b"12345", &mut out).unwrap();
        assert!(matches!(body.finish_at_eof(&mut out), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_until_close_completes_at_eof() {
        let mut body = BodyDecoder::new(Framing::UntilClose, ContentEncoding::Identity);
        let mut out = Vec::new();
        body.feed(b"abc", &mut out).unwrap();
        body.finish_at_eof(&mut out).unwrap();
        assert_eq!(out, b"abc");
    }

    #[test]
    fn test_chunked_gzip_body() {
        let compressed = gzip(TEXT);
        let mut wire = format!("{:x}\r\n", compressed.len()).into_bytes();
        wire.extend_from_slice(&compressed);
        wire.extend_from_slice(b"\r\n0\r\n\r\n");

        let mut body = BodyDecoder::new(Framing::Chunked, ContentEncoding::Gzip);
        let mut out = Vec::new();
        for chunk in wire.chunks(7) {
            body.feed(chunk, &mut out).unwrap();
        }
        assert!(body.is_complete());
        assert_eq!(out, TEXT);
    }
}
