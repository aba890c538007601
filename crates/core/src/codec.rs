//! Compressed fingerprint format (chromaprint "compressed" layout).
//!
//! Header: algorithm id (1 byte) + big-endian 24-bit value count. The body is a
//! stream of 3-bit symbols followed by a stream of 5-bit exception symbols, both
//! packed least-significant-bit first. Each value is stored as the XOR delta from
//! the previous one: every non-zero symbol is the distance to the next set bit,
//! and a zero symbol terminates the value.

use crate::error::{PrdbError, Result};
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;

const HEADER_LEN: usize = 4;
const NORMAL_BITS: usize = 3;
const EXCEPTION_BITS: usize = 5;
const MAX_NORMAL_VALUE: u8 = 7;
const MAX_VALUE_COUNT: usize = 0x00ff_ffff;

/// Producers emit url-safe base64, usually without padding.
const FP_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decoded fingerprint: one 32-bit code per audio frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawFingerprint {
    algorithm: u8,
    values: Vec<u32>,
}

impl RawFingerprint {
    pub fn new(algorithm: u8, values: Vec<u32>) -> Self {
        Self { algorithm, values }
    }

    pub fn algorithm(&self) -> u8 {
        self.algorithm
    }

    pub fn values(&self) -> &[u32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn malformed(msg: impl Into<String>) -> PrdbError {
    PrdbError::MalformedFingerprint(msg.into())
}

fn packed_len(count: usize, width: usize) -> usize {
    (count * width + 7) / 8
}

/// Reads the `index`-th `width`-bit symbol. Caller guarantees it fits in `bytes`.
fn read_symbol(bytes: &[u8], index: usize, width: usize) -> u8 {
    let bit = index * width;
    let byte = bit / 8;
    let shift = bit % 8;
    let mut word = bytes[byte] as u16;
    if shift + width > 8 {
        word |= (bytes[byte + 1] as u16) << 8;
    }
    ((word >> shift) & ((1u16 << width) - 1)) as u8
}

fn pack_symbols(symbols: &[u8], width: usize, out: &mut Vec<u8>) {
    let start = out.len();
    out.resize(start + packed_len(symbols.len(), width), 0);
    let packed = &mut out[start..];
    for (index, &symbol) in symbols.iter().enumerate() {
        let bit = index * width;
        let byte = bit / 8;
        let shift = bit % 8;
        let word = (symbol as u16) << shift;
        packed[byte] |= word as u8;
        if shift + width > 8 {
            packed[byte + 1] |= (word >> 8) as u8;
        }
    }
}

pub fn decode(bytes: &[u8]) -> Result<RawFingerprint> {
    if bytes.len() < HEADER_LEN {
        return Err(malformed(format!("header needs 4 bytes, got {}", bytes.len())));
    }
    let algorithm = bytes[0];
    let expected =
        (bytes[1] as usize) << 16 | (bytes[2] as usize) << 8 | bytes[3] as usize;
    let body = &bytes[HEADER_LEN..];
    let capacity = body.len() * 8 / NORMAL_BITS;

    // Consume normal symbols up to the terminator of the last expected value.
    let mut symbols: Vec<u8> = Vec::new();
    let mut found = 0usize;
    let mut exceptions = 0usize;
    while found < expected {
        if symbols.len() == capacity {
            return Err(malformed(format!(
                "stream ended after {} of {} values",
                found, expected
            )));
        }
        let symbol = read_symbol(body, symbols.len(), NORMAL_BITS);
        if symbol == 0 {
            found += 1;
        } else if symbol == MAX_NORMAL_VALUE {
            exceptions += 1;
        }
        symbols.push(symbol);
    }

    let exception_bytes = &body[packed_len(symbols.len(), NORMAL_BITS)..];
    if exception_bytes.len() < packed_len(exceptions, EXCEPTION_BITS) {
        return Err(malformed(format!(
            "exception stream truncated: {} symbols need {} bytes, got {}",
            exceptions,
            packed_len(exceptions, EXCEPTION_BITS),
            exception_bytes.len()
        )));
    }

    let mut values = Vec::with_capacity(expected);
    let mut next_exception = 0usize;
    let mut acc = 0u32;
    let mut last_bit = 0u32;
    for symbol in symbols {
        let mut step = symbol as u32;
        if symbol == MAX_NORMAL_VALUE {
            step += read_symbol(exception_bytes, next_exception, EXCEPTION_BITS) as u32;
            next_exception += 1;
        }
        if step == 0 {
            values.push(acc);
            last_bit = 0;
            continue;
        }
        last_bit += step;
        if last_bit > 32 {
            return Err(malformed(format!("bit index {} out of range", last_bit)));
        }
        acc ^= 1 << (last_bit - 1);
    }

    Ok(RawFingerprint { algorithm, values })
}

/// Reference compressor, the exact inverse of [`decode`].
pub fn encode(raw: &RawFingerprint) -> Result<Vec<u8>> {
    let count = raw.values.len();
    if count > MAX_VALUE_COUNT {
        return Err(malformed(format!("{} values exceed the 24-bit header", count)));
    }

    let mut normal = Vec::with_capacity(count * 4);
    let mut exceptional = Vec::new();
    let mut prev = 0u32;
    for &value in &raw.values {
        let mut diff = value ^ prev;
        let mut bit = 1u8;
        let mut last_bit = 0u8;
        while diff != 0 {
            if diff & 1 == 1 {
                let step = bit - last_bit;
                if step >= MAX_NORMAL_VALUE {
                    normal.push(MAX_NORMAL_VALUE);
                    exceptional.push(step - MAX_NORMAL_VALUE);
                } else {
                    normal.push(step);
                }
                last_bit = bit;
            }
            diff >>= 1;
            bit += 1;
        }
        normal.push(0);
        prev = value;
    }

    let mut out = Vec::with_capacity(
        HEADER_LEN
            + packed_len(normal.len(), NORMAL_BITS)
            + packed_len(exceptional.len(), EXCEPTION_BITS),
    );
    out.push(raw.algorithm);
    out.extend_from_slice(&[(count >> 16) as u8, (count >> 8) as u8, count as u8]);
    pack_symbols(&normal, NORMAL_BITS, &mut out);
    pack_symbols(&exceptional, EXCEPTION_BITS, &mut out);
    Ok(out)
}

pub fn decode_base64(text: &str) -> Result<RawFingerprint> {
    let bytes = FP_BASE64
        .decode(text.trim())
        .map_err(|e| malformed(format!("invalid base64: {}", e)))?;
    decode(&bytes)
}

pub fn encode_base64(raw: &RawFingerprint) -> Result<String> {
    Ok(FP_BASE64.encode(encode(raw)?))
}
