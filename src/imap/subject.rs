// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use regex::Regex;

lazy_static::lazy_static! {
    static ref ENCODED_WORD_RE: Regex =
        Regex::new(r"=\?([^?]+)\?([BbQq])\?([^?]*)\?=").expect("encoded-word pattern is valid");
}

/// Turns a raw ENVELOPE subject into display text.
///
/// Decodes RFC 2047 encoded words (B and Q). Whitespace between two adjacent
/// encoded words is dropped, as the RFC requires.
pub fn decode_subject(raw: Option<&[u8]>) -> String {
    let Some(raw) = raw else {
        return String::new();
    };
    let input = String::from_utf8_lossy(raw);

    let mut out = String::with_capacity(input.len());
    let mut last_end = 0;
    let mut prev_was_encoded = false;

    for cap in ENCODED_WORD_RE.captures_iter(&input) {
        let Some(whole) = cap.get(0) else { continue };
        let between = &input[last_end..whole.start()];
        if !(prev_was_encoded && between.trim().is_empty()) {
            out.push_str(between);
        }

        let encoding = &cap[2];
        let text = &cap[3];
        let decoded = if encoding.eq_ignore_ascii_case("b") {
            decode_b(text)
        } else {
            decode_q(text)
        };
        match decoded {
            Some(s) => out.push_str(&s),
            None => out.push_str(whole.as_str()),
        }

        last_end = whole.end();
        prev_was_encoded = true;
    }
    out.push_str(&input[last_end..]);
    out.trim().to_string()
}

fn decode_b(text: &str) -> Option<String> {
    let bytes = BASE64.decode(text).ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

fn decode_q(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => {
                out.push(b' ');
                i += 1;
            }
            b'=' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok()?;
                out.push(u8::from_str_radix(hex, 16).ok()?);
                i += 3;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    Some(String::from_utf8_lossy(&out).into_owned())
}
