//! Best-effort completion of a JSON document that is still being written.
//!
//! The generation service streams a single JSON object as plain text. Each
//! prefix is repaired into a parseable document by cutting it back to the last
//! point where closing the open containers yields valid JSON:
//!
//! - an open string value is closed (`{"a":"Thin` -> `{"a":"Thin"}`)
//! - open arrays and objects are closed in nesting order
//! - a dangling key, a trailing comma, an unfinished number or literal, and a
//!   half-written escape sequence are dropped

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ObjectPhase {
    /// Just after `{`: a key or `}`.
    KeyOrEnd,
    /// After `,`: a key is required.
    Key,
    Colon,
    Value,
    CommaOrEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArrayPhase {
    /// Just after `[`: a value or `]`.
    ValueOrEnd,
    /// After `,`: a value is required.
    Value,
    CommaOrEnd,
}

#[derive(Debug, Clone, Copy)]
enum Frame {
    Object(ObjectPhase),
    Array(ArrayPhase),
}

impl Frame {
    fn closer(self) -> char {
        match self {
            Frame::Object(_) => '}',
            Frame::Array(_) => ']',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Escape {
    None,
    Backslash,
    Unicode(u8),
}

#[derive(Debug, Clone, Copy)]
enum Scalar {
    None,
    Str { is_key: bool, escape: Escape },
    Number,
    Literal { expected: &'static [u8], matched: usize },
}

/// A prefix length that becomes valid JSON once the first `depth` frames are
/// closed (and the open string, if `close_string`).
#[derive(Debug, Clone, Copy)]
struct SafePoint {
    len: usize,
    depth: usize,
    close_string: bool,
}

struct Scanner<'a> {
    input: &'a str,
    stack: Vec<Frame>,
    scalar: Scalar,
    root_done: bool,
    safe: Option<SafePoint>,
}

impl<'a> Scanner<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            stack: Vec::new(),
            scalar: Scalar::None,
            root_done: false,
            safe: None,
        }
    }

    fn mark_safe(&mut self, len: usize, close_string: bool) {
        self.safe = Some(SafePoint {
            len,
            depth: self.stack.len(),
            close_string,
        });
    }

    fn value_done(&mut self) {
        match self.stack.last_mut() {
            Some(Frame::Object(phase)) => *phase = ObjectPhase::CommaOrEnd,
            Some(Frame::Array(phase)) => *phase = ArrayPhase::CommaOrEnd,
            None => self.root_done = true,
        }
    }

    /// Returns false when the input stops being JSON.
    fn begin_value(&mut self, b: u8, i: usize) -> bool {
        match b {
            b'{' => {
                self.stack.push(Frame::Object(ObjectPhase::KeyOrEnd));
                self.mark_safe(i + 1, false);
            }
            b'[' => {
                self.stack.push(Frame::Array(ArrayPhase::ValueOrEnd));
                self.mark_safe(i + 1, false);
            }
            b'"' => {
                self.scalar = Scalar::Str {
                    is_key: false,
                    escape: Escape::None,
                };
                self.mark_safe(i + 1, true);
            }
            b'-' | b'0'..=b'9' => self.scalar = Scalar::Number,
            b't' => self.begin_literal(b"true"),
            b'f' => self.begin_literal(b"false"),
            b'n' => self.begin_literal(b"null"),
            _ => return false,
        }
        true
    }

    fn begin_literal(&mut self, expected: &'static [u8]) {
        self.scalar = Scalar::Literal {
            expected,
            matched: 1,
        };
    }

    fn close_container(&mut self, i: usize) {
        self.stack.pop();
        self.value_done();
        self.mark_safe(i + 1, false);
    }

    /// Consume one byte inside a string. Returns false on a malformed escape.
    fn string_byte(&mut self, b: u8, i: usize, is_key: bool, escape: Escape) -> bool {
        let next = match escape {
            Escape::Backslash if b == b'u' => Escape::Unicode(4),
            Escape::Backslash => Escape::None,
            Escape::Unicode(_) if !b.is_ascii_hexdigit() => return false,
            Escape::Unicode(1) => Escape::None,
            Escape::Unicode(n) => Escape::Unicode(n - 1),
            Escape::None if b == b'\\' => Escape::Backslash,
            Escape::None if b == b'"' => {
                self.scalar = Scalar::None;
                if is_key {
                    if let Some(Frame::Object(phase)) = self.stack.last_mut() {
                        *phase = ObjectPhase::Colon;
                    }
                } else {
                    self.value_done();
                    self.mark_safe(i + 1, false);
                }
                return true;
            }
            Escape::None => Escape::None,
        };
        self.scalar = Scalar::Str {
            is_key,
            escape: next,
        };
        if !is_key && next == Escape::None && self.input.is_char_boundary(i + 1) {
            self.mark_safe(i + 1, true);
        }
        true
    }

    /// Consume one structural byte (outside any scalar).
    fn structural_byte(&mut self, b: u8, i: usize) -> bool {
        let Some(top) = self.stack.last().copied() else {
            return !self.root_done && self.begin_value(b, i);
        };
        match top {
            Frame::Object(ObjectPhase::KeyOrEnd) if b == b'}' => self.close_container(i),
            Frame::Object(ObjectPhase::KeyOrEnd | ObjectPhase::Key) if b == b'"' => {
                self.scalar = Scalar::Str {
                    is_key: true,
                    escape: Escape::None,
                };
            }
            Frame::Object(ObjectPhase::Colon) if b == b':' => {
                self.set_top(Frame::Object(ObjectPhase::Value));
            }
            Frame::Object(ObjectPhase::Value) | Frame::Array(ArrayPhase::Value) => {
                return self.begin_value(b, i);
            }
            Frame::Object(ObjectPhase::CommaOrEnd) if b == b',' => {
                self.set_top(Frame::Object(ObjectPhase::Key));
            }
            Frame::Object(ObjectPhase::CommaOrEnd) if b == b'}' => self.close_container(i),
            Frame::Array(ArrayPhase::ValueOrEnd | ArrayPhase::CommaOrEnd) if b == b']' => {
                self.close_container(i);
            }
            Frame::Array(ArrayPhase::ValueOrEnd) => return self.begin_value(b, i),
            Frame::Array(ArrayPhase::CommaOrEnd) if b == b',' => {
                self.set_top(Frame::Array(ArrayPhase::Value));
            }
            _ => return false,
        }
        true
    }

    fn set_top(&mut self, frame: Frame) {
        if let Some(top) = self.stack.last_mut() {
            *top = frame;
        }
    }

    fn run(&mut self) {
        let bytes = self.input.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            let b = bytes[i];
            match self.scalar {
                Scalar::Str { is_key, escape } => {
                    if !self.string_byte(b, i, is_key, escape) {
                        return;
                    }
                    i += 1;
                    continue;
                }
                Scalar::Number => {
                    if b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.' | b'e' | b'E') {
                        i += 1;
                        continue;
                    }
                    self.scalar = Scalar::None;
                    self.value_done();
                    self.mark_safe(i, false);
                    // `b` terminates the number and is handled as structure below.
                }
                Scalar::Literal { expected, matched } => {
                    if expected.get(matched) != Some(&b) {
                        return;
                    }
                    let matched = matched + 1;
                    if matched == expected.len() {
                        self.scalar = Scalar::None;
                        self.value_done();
                        self.mark_safe(i + 1, false);
                    } else {
                        self.scalar = Scalar::Literal { expected, matched };
                    }
                    i += 1;
                    continue;
                }
                Scalar::None => {}
            }

            if !b.is_ascii_whitespace() && !self.structural_byte(b, i) {
                return;
            }
            i += 1;
        }
    }

    fn finish(self) -> Option<String> {
        let safe = self.safe?;
        let mut out = String::with_capacity(safe.len + safe.depth + 1);
        out.push_str(&self.input[..safe.len]);
        if safe.close_string {
            out.push('"');
        }
        for frame in self.stack[..safe.depth].iter().rev() {
            out.push(frame.closer());
        }
        Some(out)
    }
}

/// Complete `input` into a JSON document, or `None` if no value has started.
///
/// A complete document is returned unchanged (minus trailing whitespace).
#[must_use]
pub fn repair(input: &str) -> Option<String> {
    let mut scanner = Scanner::new(input);
    scanner.run();
    scanner.finish()
}

/// Parse the best-effort completion of `input`.
#[must_use]
pub fn parse_partial(input: &str) -> Option<Value> {
    let repaired = repair(input)?;
    serde_json::from_str(&repaired).ok()
}
