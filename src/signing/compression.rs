//! Response body encoding negotiation.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{self, Read, Write};

const BROTLI_BUFFER: usize = 4096;
const BROTLI_QUALITY: u32 = 5;
const BROTLI_WINDOW: u32 = 22;

/// Encoding applied to a response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentEncoding {
    Brotli,
    Gzip,
    Identity,
}

impl ContentEncoding {
    /// Value for the `Content-Encoding` header; `None` for identity.
    pub fn header_value(self) -> Option<&'static str> {
        match self {
            ContentEncoding::Brotli => Some("br"),
            ContentEncoding::Gzip => Some("gzip"),
            ContentEncoding::Identity => None,
        }
    }

    pub fn from_header(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("br") => ContentEncoding::Brotli,
            Some(v) if v.eq_ignore_ascii_case("gzip") => ContentEncoding::Gzip,
            _ => ContentEncoding::Identity,
        }
    }
}

/// Tokens the client accepts, ignoring any with `q=0`.
fn accepted_tokens(accept_encoding: &str) -> impl Iterator<Item = &str> {
    accept_encoding.split(',').filter_map(|entry| {
        let mut parts = entry.split(';');
        let token = parts.next()?.trim();
        let refused = parts.any(|param| {
            param
                .trim()
                .strip_prefix("q=")
                .and_then(|q| q.trim().parse::<f32>().ok())
                .is_some_and(|q| q <= 0.0)
        });
        (!token.is_empty() && !refused).then_some(token)
    })
}

/// Brotli if offered, else gzip, else identity.
pub fn negotiate(accept_encoding: Option<&str>) -> ContentEncoding {
    let Some(header) = accept_encoding else {
        return ContentEncoding::Identity;
    };

    let mut gzip = false;
    for token in accepted_tokens(header) {
        if token.eq_ignore_ascii_case("br") {
            return ContentEncoding::Brotli;
        }
        gzip |= token.eq_ignore_ascii_case("gzip");
    }

    if gzip {
        ContentEncoding::Gzip
    } else {
        ContentEncoding::Identity
    }
}

pub fn compress(encoding: ContentEncoding, data: &[u8]) -> io::Result<Vec<u8>> {
    match encoding {
        ContentEncoding::Brotli => {
            let mut writer =
                brotli::CompressorWriter::new(Vec::new(), BROTLI_BUFFER, BROTLI_QUALITY, BROTLI_WINDOW);
            writer.write_all(data)?;
            writer.flush()?;
            Ok(writer.into_inner())
        }
        ContentEncoding::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(data)?;
            encoder.finish()
        }
        ContentEncoding::Identity => Ok(data.to_vec()),
    }
}

pub fn decompress(encoding: ContentEncoding, data: &[u8]) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    match encoding {
        ContentEncoding::Brotli => {
            brotli::Decompressor::new(data, BROTLI_BUFFER).read_to_end(&mut out)?;
        }
        ContentEncoding::Gzip => {
            GzDecoder::new(data).read_to_end(&mut out)?;
        }
        ContentEncoding::Identity => out.extend_from_slice(data),
    }
    Ok(out)
}
