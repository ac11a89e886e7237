//! Content-encoding decoder for captured response bodies
//!
//! The forwarding client leaves compressed bodies alone so the agent receives
//! the exact bytes upstream sent. The inspector decodes its own copy here.

use flate2::read::{DeflateDecoder, MultiGzDecoder, ZlibDecoder};
use std::borrow::Cow;
use std::io::{self, Read};
use thiserror::Error;

/// Brotli decompressor internal buffer size
const BROTLI_BUFFER: usize = 4096;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unsupported content-encoding: {0}")]
    Unsupported(String),

    #[error("corrupt {encoding} body: {source}")]
    Corrupt {
        encoding: &'static str,
        #[source]
        source: io::Error,
    },
}

/// Decode `raw` according to a `Content-Encoding` header value
///
/// Multiple codings (`gzip, br`) were applied in order, so they are undone
/// in reverse. Invalid UTF-8 in the result is replaced, never rejected.
pub fn decode(raw: &[u8], encoding: Option<&str>) -> Result<String, DecodeError> {
    let mut body = Cow::Borrowed(raw);

    let codings = encoding
        .into_iter()
        .flat_map(|header| header.split(','))
        .map(str::trim)
        .filter(|coding| !coding.is_empty())
        .collect::<Vec<_>>();

    for coding in codings.into_iter().rev() {
        if let Some(decoded) = decode_one(&body, coding)? {
            body = Cow::Owned(decoded);
        }
    }

    Ok(String::from_utf8_lossy(&body).into_owned())
}

/// Undo one coding; `None` means the bytes are unchanged
fn decode_one(input: &[u8], coding: &str) -> Result<Option<Vec<u8>>, DecodeError> {
    let decoded = match coding.to_ascii_lowercase().as_str() {
        "identity" => return Ok(None),
        "gzip" | "x-gzip" => read_all(MultiGzDecoder::new(input)).map_err(corrupt("gzip"))?,
        // Servers disagree on whether deflate means zlib-wrapped or raw
        "deflate" => read_all(ZlibDecoder::new(input))
            .or_else(|_| read_all(DeflateDecoder::new(input)))
            .map_err(corrupt("deflate"))?,
        "br" => read_all(brotli::Decompressor::new(input, BROTLI_BUFFER)).map_err(corrupt("br"))?,
        other => return Err(DecodeError::Unsupported(other.to_string())),
    };
    Ok(Some(decoded))
}

fn read_all(mut reader: impl Read) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    reader.read_to_end(&mut out)?;
    Ok(out)
}

fn corrupt(encoding: &'static str) -> impl Fn(io::Error) -> DecodeError {
    move |source| DecodeError::Corrupt { encoding, source }
}
