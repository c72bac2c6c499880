//! Text sanitizer (spec §4.1): produces a same-length view of source text
//! with comments and string literals blanked out, preserving newlines so
//! line numbers computed from the sanitized text match the original.
//!
//! Implemented as a single-pass left-to-right byte-index state machine (the
//! redesign flag in spec §9 calls for exactly this instead of a
//! generator-style recursive scanner). No nesting of comments.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentStyle {
    /// `//` line comments plus `/* */` block comments (C-family, JS, TS, Rust, Java, Kotlin, C#, Go, Dart).
    CLike,
    /// `#` line comments only (Python).
    Hash,
}

/// Which string-literal sigils a language allows immediately before a quote
/// (Python: `r/u/b/f`; L-self/Dart: `r`).
#[derive(Debug, Clone, Copy)]
pub struct SanitizeOptions {
    pub comments: CommentStyle,
    pub triple_quoted_strings: bool,
    pub sigils: &'static [u8],
}

impl SanitizeOptions {
    pub fn c_like() -> Self {
        SanitizeOptions { comments: CommentStyle::CLike, triple_quoted_strings: false, sigils: b"" }
    }

    pub fn python() -> Self {
        SanitizeOptions {
            comments: CommentStyle::Hash,
            triple_quoted_strings: true,
            sigils: b"rubf",
        }
    }

    pub fn dart() -> Self {
        SanitizeOptions {
            comments: CommentStyle::CLike,
            triple_quoted_strings: false,
            sigils: b"r",
        }
    }
}

/// Sanitize `text` per `opts`. The result has the exact same length and the
/// exact same byte positions for every `\n`/`\r` as `text` (testable
/// property spec §8 invariant 6).
pub fn sanitize(text: &str, opts: SanitizeOptions) -> String {
    let bytes = text.as_bytes();
    let mut out = vec![b' '; bytes.len()];
    let n = bytes.len();
    let mut i = 0usize;

    while i < n {
        let b = bytes[i];

        if b == b'\n' || b == b'\r' {
            out[i] = b;
            i += 1;
            continue;
        }

        // Line comments.
        if opts.comments == CommentStyle::Hash && b == b'#' {
            i = find_eol(bytes, i);
            continue;
        }
        if opts.comments == CommentStyle::CLike && b == b'/' && peek(bytes, i + 1) == Some(b'/') {
            i = find_eol(bytes, i);
            continue;
        }

        // Block comments `/* ... */` — unterminated blanks to end-of-input.
        if opts.comments == CommentStyle::CLike && b == b'/' && peek(bytes, i + 1) == Some(b'*') {
            let mut j = i + 2;
            while j + 1 < n && !(bytes[j] == b'*' && bytes[j + 1] == b'/') {
                j += 1;
            }
            let end = if j + 1 < n { j + 2 } else { n };
            copy_preserving_newlines(&mut out, bytes, i, end);
            i = end;
            continue;
        }

        // Optional sigil immediately before a quote (Python r/u/b/f, Dart r).
        let mut sigil_len = 0usize;
        if !opts.sigils.is_empty() && b.is_ascii_alphabetic() {
            let lower = b.to_ascii_lowercase();
            if opts.sigils.contains(&lower) {
                // A sigil only counts if followed by a quote character.
                if matches!(peek(bytes, i + 1), Some(b'"') | Some(b'\'')) {
                    sigil_len = 1;
                }
            }
        }

        let quote_pos = i + sigil_len;
        if let Some(quote) = peek(bytes, quote_pos) {
            if quote == b'"' || quote == b'\'' {
                let triple = opts.triple_quoted_strings
                    && peek(bytes, quote_pos + 1) == Some(quote)
                    && peek(bytes, quote_pos + 2) == Some(quote);

                if sigil_len > 0 {
                    out[i] = bytes[i]; // sigil letter is code, not blanked
                }

                let (end, _unterminated) = if triple {
                    blank_triple_quoted(&mut out, bytes, quote_pos, quote)
                } else {
                    blank_single_line_string(&mut out, bytes, quote_pos, quote)
                };
                i = end;
                continue;
            }
        }

        out[i] = b;
        i += 1;
    }

    // SAFETY-free: we only ever write ASCII/UTF-8-preserving bytes at
    // positions that were already valid UTF-8 boundaries in `text`, because
    // we copy `text`'s own bytes verbatim everywhere except blanking with a
    // single-byte space, which is always a valid UTF-8 continuation-free
    // replacement for a single source byte. Multi-byte UTF-8 sequences are
    // either copied whole (code) or blanked byte-for-byte (inside a
    // comment/string) — blanking still preserves length.
    String::from_utf8(out).unwrap_or_else(|_| " ".repeat(n))
}

fn peek(bytes: &[u8], idx: usize) -> Option<u8> {
    bytes.get(idx).copied()
}

/// Index of the first `\n`/`\r` at or after `start` (or end-of-input). The
/// span `[start, result)` needs no explicit blanking: `out` starts fully
/// space-filled, so a comment span left untouched is already blank.
fn find_eol(bytes: &[u8], start: usize) -> usize {
    let n = bytes.len();
    let mut j = start;
    while j < n && bytes[j] != b'\n' && bytes[j] != b'\r' {
        j += 1;
    }
    j
}

fn copy_preserving_newlines(out: &mut [u8], bytes: &[u8], start: usize, end: usize) {
    for k in start..end {
        out[k] = if bytes[k] == b'\n' || bytes[k] == b'\r' { bytes[k] } else { b' ' };
    }
}

/// Blanks a single-line string literal starting at `bytes[quote_pos]`
/// (the opening quote). Backslash escapes blank two bytes at a time.
/// Unterminated strings blank to end-of-input (or end-of-line: a raw
/// newline inside a non-triple string ends the string early, matching how
/// every in-scope language actually lexes single-line strings).
fn blank_single_line_string(out: &mut [u8], bytes: &[u8], quote_pos: usize, quote: u8) -> (usize, bool) {
    let n = bytes.len();
    out[quote_pos] = b' ';
    let mut j = quote_pos + 1;
    while j < n {
        let b = bytes[j];
        if b == b'\n' || b == b'\r' {
            return (j, true); // unterminated on this line
        }
        if b == b'\\' && j + 1 < n && bytes[j + 1] != b'\n' && bytes[j + 1] != b'\r' {
            out[j] = b' ';
            out[j + 1] = b' ';
            j += 2;
            continue;
        }
        if b == quote {
            out[j] = b' ';
            return (j + 1, false);
        }
        out[j] = b' ';
        j += 1;
    }
    (n, true)
}

/// Blanks a triple-quoted string (`"""..."""` / `'''...'''`). Embedded
/// single quotes of the other kind (or a lone matching quote not forming a
/// full triple) are simply part of the blanked span.
fn blank_triple_quoted(out: &mut [u8], bytes: &[u8], quote_pos: usize, quote: u8) -> (usize, bool) {
    let n = bytes.len();
    copy_preserving_newlines(out, bytes, quote_pos, (quote_pos + 3).min(n));
    let mut j = quote_pos + 3;
    while j < n {
        if bytes[j] == quote && peek(bytes, j + 1) == Some(quote) && peek(bytes, j + 2) == Some(quote)
        {
            copy_preserving_newlines(out, bytes, j, j + 3);
            return (j + 3, false);
        }
        if bytes[j] != b'\n' && bytes[j] != b'\r' {
            out[j] = b' ';
        } else {
            out[j] = bytes[j];
        }
        j += 1;
    }
    (n, true)
}

/// Precomputed line-start byte offsets for O(log n) offset -> (line, column)
/// lookup, used by the security rule engine (spec §4.4).
pub struct LineIndex {
    /// Byte offset of the start of each line (line 0 starts at offset 0).
    starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut starts = vec![0usize];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                starts.push(i + 1);
            }
        }
        LineIndex { starts }
    }

    /// 1-based line number containing byte offset `pos`.
    pub fn line_at(&self, pos: usize) -> usize {
        match self.starts.binary_search(&pos) {
            Ok(idx) => idx + 1,
            Err(idx) => idx, // idx-1 is the containing line (0-based) -> +1 for 1-based, -1 for containing
        }
    }

    /// 1-based column (byte offset within line) at `pos`.
    pub fn column_at(&self, pos: usize) -> usize {
        let line_idx = self.line_at(pos) - 1;
        pos - self.starts[line_idx] + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_length_and_newlines() {
        let samples = [
            "let x = 1; // comment\nlet y = \"str\\\"ing\";\n",
            "/* block\n comment */ code();\n",
            "x = 'it\\'s' + \"done\"\n",
        ];
        for s in samples {
            let out = sanitize(s, SanitizeOptions::c_like());
            assert_eq!(out.len(), s.len());
            for (a, b) in s.bytes().zip(out.bytes()) {
                if a == b'\n' || a == b'\r' {
                    assert_eq!(a, b);
                }
            }
        }
    }

    #[test]
    fn blanks_line_comment_but_keeps_code() {
        let s = "eval(x); // eval(userInput)\n";
        let out = sanitize(s, SanitizeOptions::c_like());
        assert!(out.starts_with("eval(x); "));
        assert!(!out.contains("userInput"));
    }

    #[test]
    fn blanks_block_comment_across_lines() {
        let s = "a();\n/* dead\ncode() */\nb();\n";
        let out = sanitize(s, SanitizeOptions::c_like());
        assert!(!out.contains("dead"));
        assert!(!out.contains("code()"));
        assert!(out.contains("a();"));
        assert!(out.contains("b();"));
        assert_eq!(out.matches('\n').count(), s.matches('\n').count());
    }

    #[test]
    fn blanks_string_contents_both_quote_kinds() {
        let s = r#"x = "eval('hidden')";"#;
        let out = sanitize(s, SanitizeOptions::c_like());
        assert!(!out.contains("hidden"));
        assert!(out.contains("x ="));
    }

    #[test]
    fn python_triple_quoted_and_hash_comments() {
        let s = "x = 1  # secret_token = 'abc'\ny = \"\"\"doc\nstring\"\"\"\n";
        let out = sanitize(s, SanitizeOptions::python());
        assert!(!out.contains("secret_token"));
        assert!(!out.contains("doc"));
        assert_eq!(out.len(), s.len());
    }

    #[test]
    fn unterminated_string_blanks_to_end_of_line() {
        let s = "x = \"never closes\nreal_code();\n";
        let out = sanitize(s, SanitizeOptions::c_like());
        assert!(!out.contains("never closes"));
        assert!(out.contains("real_code();"));
    }

    #[test]
    fn line_index_matches_source_lines() {
        let s = "one\ntwo\nthree";
        let idx = LineIndex::new(s);
        assert_eq!(idx.line_at(0), 1);
        assert_eq!(idx.line_at(4), 2);
        assert_eq!(idx.line_at(9), 3);
    }
}
