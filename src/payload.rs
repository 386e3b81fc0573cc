//! Decoding of embedded module payloads.
//!
//! A payload is a WebAssembly module image compressed with raw (headerless)
//! deflate and then base64 encoded, so that it can be pasted into source as
//! a string literal.

use std::{fmt, str::FromStr};

use anyhow::{bail, Context};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use flate2::{Decompress, FlushDecompress, Status};

/// The token a payload template carries before the build step substitutes it.
pub const PLACEHOLDER: &str = "$$$$binary_base64$$$$";

// growth step for the inflate buffer
const INFLATE_CHUNK: usize = 32 * 1024;

/// Decode an embedded base64 payload into the module image it carries.
pub fn decompress(text: &str) -> anyhow::Result<Vec<u8>> {
    if text.trim() == PLACEHOLDER {
        bail!("no payload embedded: the template placeholder was never substituted");
    }

    let compressed = decode_base64(text).context("decoding payload")?;
    let image = inflate_raw(&compressed).context("inflating payload")?;

    log::debug!(
        "inflated payload: {} base64 chars -> {} compressed -> {} bytes",
        text.len(),
        compressed.len(),
        image.len()
    );

    Ok(image)
}

/// Decode standard, padded base64. ASCII whitespace anywhere in the input is
/// ignored, so wrapped payloads decode the same as single-line ones.
pub fn decode_base64(text: &str) -> anyhow::Result<Vec<u8>> {
    let compact: Vec<u8> = text
        .bytes()
        .filter(|byte| !byte.is_ascii_whitespace())
        .collect();

    Ok(STANDARD.decode(compact)?)
}

/// Inflate a raw deflate stream (no zlib or gzip framing).
///
/// A stream that ends before its final block is reported as truncated
/// instead of yielding a partial image. Input past the end of the stream is
/// ignored.
pub fn inflate_raw(bytes: &[u8]) -> anyhow::Result<Vec<u8>> {
    let mut inflater = Decompress::new(false);
    let mut image = Vec::with_capacity(bytes.len().saturating_mul(3).max(INFLATE_CHUNK));

    loop {
        if image.len() == image.capacity() {
            image.reserve(INFLATE_CHUNK);
        }

        let (before_in, before_out) = (inflater.total_in(), inflater.total_out());
        let consumed = before_in as usize;

        let status = inflater.decompress_vec(&bytes[consumed..], &mut image, FlushDecompress::None)?;

        match status {
            Status::StreamEnd => return Ok(image),
            Status::Ok | Status::BufError => {
                if inflater.total_in() == before_in && inflater.total_out() == before_out {
                    bail!(
                        "deflate stream is truncated after {} of {} bytes",
                        consumed,
                        bytes.len()
                    );
                }
            }
        }
    }
}

/// How a payload file given at runtime is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayloadFormat {
    /// Base64 text of a raw deflate stream, the same form that gets embedded.
    #[default]
    Base64Deflate,
    /// A raw deflate stream.
    Deflate,
    /// An uncompressed module image.
    Wasm,
}

impl PayloadFormat {
    /// Turn the contents of a payload file into a module image.
    pub fn decode(self, bytes: &[u8]) -> anyhow::Result<Vec<u8>> {
        match self {
            PayloadFormat::Base64Deflate => {
                let text = std::str::from_utf8(bytes).context("base64 payload is not text")?;
                decompress(text)
            }
            PayloadFormat::Deflate => inflate_raw(bytes).context("inflating payload"),
            PayloadFormat::Wasm => Ok(bytes.to_vec()),
        }
    }
}

impl FromStr for PayloadFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "base64" => Ok(PayloadFormat::Base64Deflate),
            "deflate" => Ok(PayloadFormat::Deflate),
            "wasm" => Ok(PayloadFormat::Wasm),
            _ => Err(format!(
                "unknown payload format '{s}', expected one of: base64, deflate, wasm"
            )),
        }
    }
}

impl fmt::Display for PayloadFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PayloadFormat::Base64Deflate => "base64",
            PayloadFormat::Deflate => "deflate",
            PayloadFormat::Wasm => "wasm",
        })
    }
}
