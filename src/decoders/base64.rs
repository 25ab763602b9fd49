/*
 * Copyright Stalwart Labs Ltd. See the COPYING
 * file at the top-level directory of this distribution.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine;

const LINE_WIDTH: usize = 76;

/// Encodes to base64 broken into 76-column lines, each ending in `eol`.
pub fn encode_wrapped(data: &[u8], eol: &str) -> Vec<String> {
    let encoded = STANDARD.encode(data);
    let mut lines = Vec::with_capacity(encoded.len() / LINE_WIDTH + 1);
    let bytes = encoded.as_bytes();
    for chunk in bytes.chunks(LINE_WIDTH) {
        let mut line = String::with_capacity(LINE_WIDTH + eol.len());
        line.push_str(std::str::from_utf8(chunk).unwrap_or_default());
        line.push_str(eol);
        lines.push(line);
    }
    lines
}

/// Decodes base64 content, ignoring whitespace and tolerating missing
/// padding.
pub fn decode(data: &str) -> Option<Vec<u8>> {
    let compact: String = data.chars().filter(|ch| !ch.is_whitespace()).collect();
    let trimmed = compact.trim_end_matches('=');
    STANDARD
        .decode(compact.as_bytes())
        .or_else(|_| STANDARD_NO_PAD.decode(trimmed.as_bytes()))
        .ok()
}
