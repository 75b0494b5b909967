//! Decoder for the lz-string `compressToBase64` format, sent by posthog-js when the
//! request carries `compression=lz64`.
//!
//! The stream is a sequence of dictionary codes packed into 6-bit base64 symbols, most
//! significant bit first. Codes start 3 bits wide and widen each time the dictionary
//! doubles. Codes 0 and 1 introduce an 8 or 16 bit literal, code 2 ends the stream, and
//! every other code refers to a previously decoded entry.

use std::collections::HashMap;

use once_cell::sync::Lazy;

const KEY_STR_BASE64: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/=";

static BASE64_REVERSE: Lazy<HashMap<char, u32>> =
    Lazy::new(|| KEY_STR_BASE64.chars().zip(0..).collect());

const LITERAL_8: u32 = 0;
const LITERAL_16: u32 = 1;
const END_OF_STREAM: u32 = 2;

// Widest code we accept before declaring the input garbage
const MAX_CODE_BITS: u32 = 30;

/// Returns `None` when the input is not a valid lz64 stream: a symbol outside the
/// alphabet, a truncated stream or a reference to an undefined dictionary entry.
/// An empty input decodes to an empty string.
pub fn decompress_from_base64(input: &str) -> Option<String> {
    if input.is_empty() {
        return Some(String::new());
    }

    let values = input
        .chars()
        .map(|c| BASE64_REVERSE.get(&c).copied())
        .collect::<Option<Vec<u32>>>()?;

    // lz-string works on UTF-16 code units, lone surrogates are replaced
    decompress(&values, 32).map(|units| String::from_utf16_lossy(&units))
}

struct BitReader<'a> {
    values: &'a [u32],
    reset: u32,
    val: u32,
    position: u32,
    index: usize,
}

impl<'a> BitReader<'a> {
    fn new(values: &'a [u32], reset: u32) -> Self {
        Self {
            values,
            reset,
            val: values.first().copied().unwrap_or(0),
            position: reset,
            index: 1,
        }
    }

    fn exhausted(&self) -> bool {
        self.index > self.values.len()
    }

    /// Reads `width` bits, least significant first. Reading past the end yields zeros.
    fn read(&mut self, width: u32) -> u32 {
        let mut bits = 0;
        for shift in 0..width {
            let set = (self.val & self.position) != 0;
            self.position >>= 1;
            if self.position == 0 {
                self.position = self.reset;
                self.val = self.values.get(self.index).copied().unwrap_or(0);
                self.index += 1;
            }
            if set {
                bits |= 1 << shift;
            }
        }
        bits
    }
}

struct CodeWidth {
    bits: u32,
    enlarge_in: u32,
}

impl CodeWidth {
    /// Widens the code once every value of the current width has been handed out.
    fn widen_if_due(&mut self) -> Option<()> {
        if self.enlarge_in == 0 {
            if self.bits >= MAX_CODE_BITS {
                return None;
            }
            self.enlarge_in = 1 << self.bits;
            self.bits += 1;
        }
        Some(())
    }
}

fn decompress(values: &[u32], reset: u32) -> Option<Vec<u16>> {
    let mut reader = BitReader::new(values, reset);
    // Entries 0..=2 are reserved for the control codes
    let mut dictionary: Vec<Vec<u16>> = vec![Vec::new(); 3];
    let mut width = CodeWidth {
        bits: 3,
        enlarge_in: 4,
    };

    let first = match reader.read(2) {
        LITERAL_8 => reader.read(8),
        LITERAL_16 => reader.read(16),
        END_OF_STREAM => return Some(Vec::new()),
        _ => return None,
    };
    let mut w = vec![u16::try_from(first).ok()?];
    dictionary.push(w.clone());
    let mut result = w.clone();

    loop {
        if reader.exhausted() {
            return None;
        }

        let code = match reader.read(width.bits) {
            literal @ (LITERAL_8 | LITERAL_16) => {
                let bits = if literal == LITERAL_8 { 8 } else { 16 };
                dictionary.push(vec![u16::try_from(reader.read(bits)).ok()?]);
                width.enlarge_in -= 1;
                dictionary.len() - 1
            }
            END_OF_STREAM => return Some(result),
            code => usize::try_from(code).ok()?,
        };

        width.widen_if_due()?;

        let entry = match dictionary.get(code) {
            Some(entry) => entry.clone(),
            None if code == dictionary.len() => {
                let mut entry = w.clone();
                entry.push(*w.first()?);
                entry
            }
            None => return None,
        };
        result.extend_from_slice(&entry);

        w.push(*entry.first()?);
        dictionary.push(w);
        width.enlarge_in -= 1;
        width.widen_if_due()?;

        w = entry;
    }
}
