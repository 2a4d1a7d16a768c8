//! Recursive-descent parser for PDF-like contract documents
//!
//! Parsing is offset based: [`Parser::parse_object`] can start at any byte
//! of the buffer, which is what indirect-reference lookups rely on. All
//! failures are reported as [`ObjectKind::Strange`] objects.

use std::ops::Range;

use super::object::{ObjectKind, PdfObject};

const WHITESPACE: &[u8] = &[0x20, 0x0a, 0x0c, 0x00, 0x09, 0x0d];
const DELIMITERS: &[u8] = b"()<>[]{}/%";

const STREAM: &[u8] = b"stream";
const ENDSTREAM: &[u8] = b"endstream";

/// Reference targets are searched from this far before the reference
const DEREFERENCE_WINDOW: usize = 1000;

/// Deeper nesting (including reference chains) is reported as strange
pub const MAX_DEPTH: usize = 256;

fn is_whitespace(b: u8) -> bool {
    WHITESPACE.contains(&b)
}

fn is_delimiter(b: u8) -> bool {
    DELIMITERS.contains(&b)
}

fn is_boundary(b: u8) -> bool {
    is_whitespace(b) || is_delimiter(b)
}

fn is_numeric(b: u8) -> bool {
    b.is_ascii_digit() || b == b'+' || b == b'-' || b == b'.'
}

fn is_hex_or_space(b: u8) -> bool {
    b.is_ascii_hexdigit() || (is_whitespace(b) && b != 0x00)
}

/// Scalar token recognised while peeking ahead of a number
enum Scalar {
    Number,
    Keyword(Range<usize>),
}

/// Byte cursor with save/restore for speculative parsing
struct Cursor<'a> {
    raw: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(raw: &'a [u8], pos: usize) -> Self {
        Self { raw, pos }
    }

    fn save(&self) -> usize {
        self.pos
    }

    fn restore(&mut self, mark: usize) {
        self.pos = mark;
    }

    fn peek(&self) -> Option<u8> {
        self.raw.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<u8> {
        self.raw.get(self.pos + ahead).copied()
    }

    fn advance(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.raw.len());
    }

    fn take_while(&mut self, pred: impl Fn(u8) -> bool) {
        while self.peek().map_or(false, &pred) {
            self.pos += 1;
        }
    }

    fn skip_whitespace(&mut self) {
        self.take_while(is_whitespace);
    }

    /// Skip whitespace and `%` comments
    fn skip_blank(&mut self) {
        loop {
            self.skip_whitespace();
            if self.peek() != Some(b'%') {
                break;
            }
            self.take_while(|b| b != 0x0a && b != 0x0d);
        }
    }

    fn starts_with(&self, text: &[u8]) -> bool {
        self.raw[self.pos.min(self.raw.len())..].starts_with(text)
    }

    /// Consume LF or CRLF; a lone CR is not accepted
    fn end_of_line(&mut self) -> bool {
        match (self.peek(), self.peek_at(1)) {
            (Some(0x0a), _) => {
                self.advance(1);
                true
            }
            (Some(0x0d), Some(0x0a)) => {
                self.advance(2);
                true
            }
            _ => false,
        }
    }

    /// Next number or clean keyword, without building objects
    fn scalar(&mut self) -> Option<Scalar> {
        self.skip_blank();
        let first = self.peek()?;
        if is_numeric(first) {
            self.take_while(is_numeric);
            return Some(Scalar::Number);
        }
        if is_delimiter(first) {
            return None;
        }
        let start = self.pos;
        let mut clean = true;
        while let Some(b) = self.peek() {
            if is_boundary(b) {
                break;
            }
            if b <= 0x20 || b > 0x7e {
                clean = false;
            }
            self.pos += 1;
        }
        clean.then(|| Scalar::Keyword(start..self.pos))
    }
}

/// Parser over a complete document buffer
pub struct Parser<'a> {
    raw: &'a [u8],
}

impl<'a> Parser<'a> {
    pub fn new(raw: &'a [u8]) -> Self {
        Self { raw }
    }

    pub fn buffer(&self) -> &'a [u8] {
        self.raw
    }

    /// Parse the object starting at (or after whitespace and comments
    /// following) `offset`; `None` at end of input
    pub fn parse_object(&self, offset: usize) -> Option<PdfObject> {
        self.object_at(offset, 0)
    }

    /// Top-level objects from the start of the buffer, stopping after the
    /// first strange one
    pub fn objects(&self) -> impl Iterator<Item = PdfObject> + '_ {
        let mut next = 0;
        std::iter::from_fn(move || {
            if next >= self.raw.len() {
                return None;
            }
            let obj = self.parse_object(next)?;
            next = if obj.is_strange() {
                self.raw.len()
            } else {
                obj.offset_next
            };
            Some(obj)
        })
    }

    /// Object that an `<n> <gen> R` reference points to
    pub fn dereference(&self, reference: &PdfObject) -> Option<PdfObject> {
        self.dereference_at(reference, 0)
    }

    fn object_at(&self, start: usize, depth: usize) -> Option<PdfObject> {
        let mut cur = Cursor::new(self.raw, start);
        cur.skip_blank();
        let first = cur.peek()?;

        if depth > MAX_DEPTH {
            log::debug!("Contract nesting too deep at offset {}", cur.pos);
            return Some(PdfObject::strange(cur.pos));
        }

        let mut obj = PdfObject::new(ObjectKind::Strange, cur.pos);
        match first {
            b'/' => {
                cur.advance(1);
                cur.take_while(|b| !is_boundary(b));
                obj.kind = ObjectKind::Name;
                obj.offset_next = cur.pos;
            }
            b'(' => {
                cur.advance(1);
                let mut nesting = 1;
                while nesting > 0 {
                    let Some(b) = cur.peek() else { break };
                    match b {
                        b'\\' => cur.advance(1),
                        b'(' => nesting += 1,
                        b')' => nesting -= 1,
                        _ => {}
                    }
                    cur.advance(1);
                }
                if nesting == 0 {
                    obj.kind = ObjectKind::String;
                    obj.offset_next = cur.pos;
                }
            }
            b'[' => {
                cur.advance(1);
                if self.children_until(&mut cur, b']', depth, &mut obj.children) {
                    obj.kind = ObjectKind::Array;
                    obj.offset_next = cur.pos;
                }
            }
            b'<' if cur.peek_at(1) == Some(b'<') => {
                cur.advance(2);
                self.dictionary(&mut cur, &mut obj, depth);
            }
            b'<' => {
                cur.advance(1);
                cur.take_while(is_hex_or_space);
                if cur.peek() == Some(b'>') {
                    cur.advance(1);
                    obj.kind = ObjectKind::HexString;
                    obj.offset_next = cur.pos;
                }
            }
            b']' | b'>' => {
                cur.advance(1);
                obj.kind = ObjectKind::Delimiter;
                obj.offset_next = cur.pos;
            }
            b if is_numeric(b) => {
                cur.take_while(is_numeric);
                obj.kind = ObjectKind::Number;
                obj.offset_next = cur.pos;

                let mark = cur.save();
                match self.object_suffix(&mut cur) {
                    Some(kind) => {
                        obj.kind = kind;
                        obj.offset_next = cur.pos;
                    }
                    None => cur.restore(mark),
                }
            }
            b if is_delimiter(b) => {
                cur.advance(1);
                obj.kind = ObjectKind::Delimiter;
                obj.offset_next = cur.pos;
            }
            _ => {
                obj.kind = ObjectKind::Keyword;
                while let Some(b) = cur.peek() {
                    if is_boundary(b) {
                        break;
                    }
                    if b <= 0x20 || b > 0x7e {
                        obj.kind = ObjectKind::Strange;
                    }
                    cur.advance(1);
                }
                obj.offset_next = cur.pos;
            }
        }

        if obj.offset_next <= obj.offset {
            obj.kind = ObjectKind::Strange;
        }
        Some(obj)
    }

    /// Recognise the `<gen> obj` / `<gen> R` tail following a number
    fn object_suffix(&self, cur: &mut Cursor<'_>) -> Option<ObjectKind> {
        let Some(Scalar::Number) = cur.scalar() else {
            return None;
        };
        let Some(Scalar::Keyword(keyword)) = cur.scalar() else {
            return None;
        };
        match &self.raw[keyword] {
            b"obj" => Some(ObjectKind::Object),
            b"R" => Some(ObjectKind::Reference),
            _ => None,
        }
    }

    /// Collect children until the `close` delimiter; `false` when a child
    /// is strange or input ends first
    fn children_until(
        &self,
        cur: &mut Cursor<'_>,
        close: u8,
        depth: usize,
        children: &mut Vec<PdfObject>,
    ) -> bool {
        loop {
            let Some(child) = self.object_at(cur.pos, depth + 1) else {
                return false;
            };
            if child.kind == ObjectKind::Delimiter && self.raw[child.offset] == close {
                cur.restore(child.offset_next);
                return true;
            }
            let strange = child.is_strange();
            let next = child.offset_next;
            children.push(child);
            if strange {
                return false;
            }
            cur.restore(next);
        }
    }

    fn dictionary(&self, cur: &mut Cursor<'_>, obj: &mut PdfObject, depth: usize) {
        if !self.children_until(cur, b'>', depth, &mut obj.children) || cur.peek() != Some(b'>')
        {
            return;
        }
        cur.advance(1);
        obj.kind = ObjectKind::Dictionary;
        obj.offset_next = cur.pos;

        cur.skip_whitespace();
        if !cur.starts_with(STREAM) {
            return;
        }
        cur.advance(STREAM.len());
        match self.stream_tail(cur, &obj.children, depth) {
            Some(payload) => {
                obj.kind = ObjectKind::Stream;
                obj.stream = Some(payload);
                obj.offset_next = cur.pos;
            }
            None => obj.kind = ObjectKind::Strange,
        }
    }

    /// Payload and `endstream endobj` framing after the `stream` keyword
    fn stream_tail(
        &self,
        cur: &mut Cursor<'_>,
        entries: &[PdfObject],
        depth: usize,
    ) -> Option<Range<usize>> {
        let length = usize::try_from(self.stream_length(entries, depth)?).ok()?;
        if cur.pos + length + 2 + ENDSTREAM.len() > self.raw.len() {
            return None;
        }
        if !cur.end_of_line() {
            return None;
        }
        let payload = cur.pos..cur.pos + length;
        cur.advance(length);

        // The EOL before endstream is sometimes counted in the length
        cur.skip_whitespace();
        if !cur.starts_with(ENDSTREAM) {
            return None;
        }
        cur.advance(ENDSTREAM.len());
        match self.object_at(cur.pos, depth + 1) {
            Some(end) if end.kind == ObjectKind::Keyword && end.raw_is(self.raw, "endobj") => {
                Some(payload)
            }
            _ => None,
        }
    }

    /// Value of the single `/Length` entry, following one reference hop
    fn stream_length(&self, entries: &[PdfObject], depth: usize) -> Option<i32> {
        let mut length = None;
        for pair in entries.chunks(2) {
            let key = &pair[0];
            if key.kind != ObjectKind::Name || !key.raw_is(self.raw, "Length") {
                continue;
            }
            if length.is_some() {
                return None;
            }
            let value = pair.get(1)?;
            length = Some(match value.kind {
                ObjectKind::Number => value.as_int(self.raw),
                ObjectKind::Reference => self
                    .dereference_at(value, depth + 1)
                    .and_then(|target| target.as_int(self.raw)),
                _ => None,
            });
        }
        length.flatten().filter(|l| *l >= 0)
    }

    fn dereference_at(&self, reference: &PdfObject, depth: usize) -> Option<PdfObject> {
        if reference.kind != ObjectKind::Reference {
            return None;
        }
        let text = reference.raw(self.raw)?;
        let mut pattern = text[..text.len() - 1].to_vec();
        pattern.extend_from_slice(b"obj");

        let window = reference.offset.saturating_sub(DEREFERENCE_WINDOW);
        let pos = self
            .find_token(&pattern, window, self.raw.len())
            .or_else(|| self.find_token(&pattern, 0, window))?;
        self.object_at(pos + pattern.len(), depth + 1)
    }

    /// Position of `pattern` in `[start, end)`, bounded by delimiters or
    /// whitespace on both sides
    fn find_token(&self, pattern: &[u8], start: usize, end: usize) -> Option<usize> {
        let end = end.min(self.raw.len()).saturating_sub(pattern.len());
        (start..end).find(|&i| {
            self.raw[i..i + pattern.len()] == *pattern
                && (i == 0 || is_boundary(self.raw[i - 1]))
                && self
                    .raw
                    .get(i + pattern.len())
                    .map_or(true, |&b| is_boundary(b))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(doc: &[u8]) -> Vec<ObjectKind> {
        Parser::new(doc).objects().map(|o| o.kind).collect()
    }

    #[test]
    fn test_scalars() {
        assert_eq!(
            kinds(b"/Name (str (nested) \\) ok) <4142 43> 12 true ]"),
            vec![
                ObjectKind::Name,
                ObjectKind::String,
                ObjectKind::HexString,
                ObjectKind::Number,
                ObjectKind::Keyword,
                ObjectKind::Delimiter,
            ]
        );
    }

    #[test]
    fn test_object_header_and_reference() {
        let doc = b"1 0 obj\n[3 0 R 4 5]\n";
        let parser = Parser::new(doc);
        let header = parser.parse_object(0).unwrap();
        assert_eq!(header.kind, ObjectKind::Object);
        assert_eq!(header.range(), 0..7);

        let array = parser.parse_object(header.offset_next).unwrap();
        assert_eq!(array.kind, ObjectKind::Array);
        let children: Vec<ObjectKind> = array.children.iter().map(|c| c.kind).collect();
        assert_eq!(
            children,
            vec![ObjectKind::Reference, ObjectKind::Number, ObjectKind::Number]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        let doc = b"%PDF-1.4\n%comment\n/A";
        let obj = Parser::new(doc).parse_object(0).unwrap();
        assert_eq!(obj.kind, ObjectKind::Name);
        assert!(obj.raw_is(doc, "A"));
    }

    #[test]
    fn test_unbalanced_string_is_strange() {
        assert_eq!(kinds(b"(never closed"), vec![ObjectKind::Strange]);
        assert_eq!(kinds(b"(escaped \\)"), vec![ObjectKind::Strange]);
    }

    #[test]
    fn test_unterminated_containers_are_strange() {
        assert_eq!(kinds(b"[1 2"), vec![ObjectKind::Strange]);
        assert_eq!(kinds(b"<</A 1"), vec![ObjectKind::Strange]);
        assert_eq!(kinds(b"<</A 1>"), vec![ObjectKind::Strange]);
        assert_eq!(kinds(b"<12 zz>"), vec![ObjectKind::Strange]);
    }

    #[test]
    fn test_binary_keyword_is_strange() {
        assert_eq!(kinds(b"ab\x7fcd"), vec![ObjectKind::Strange]);
    }

    #[test]
    fn test_stream_with_direct_length() {
        let doc = b"<</Length 5>>stream\nhello\nendstream\nendobj";
        let parser = Parser::new(doc);
        let obj = parser.parse_object(0).unwrap();
        assert_eq!(obj.kind, ObjectKind::Stream);
        let payload = obj.stream.clone().unwrap();
        assert_eq!(&doc[payload.clone()], b"hello");
        assert_eq!(payload.end - payload.start, 5);
        assert_eq!(&doc[obj.offset_next - 9..obj.offset_next], b"endstream");

        let tail = parser.parse_object(obj.offset_next).unwrap();
        assert!(tail.raw_is(doc, "endobj"));
    }

    #[test]
    fn test_stream_with_referenced_length() {
        let doc = b"7 0 obj\n4\nendobj\n<</Length 7 0 R>>stream\r\nabcd\r\nendstream endobj";
        let parser = Parser::new(doc);
        let start = doc.windows(2).position(|w| w == b"<<").unwrap();
        let obj = parser.parse_object(start).unwrap();
        assert_eq!(obj.kind, ObjectKind::Stream);
        assert_eq!(&doc[obj.stream.clone().unwrap()], b"abcd");
    }

    #[test]
    fn test_stream_framing_errors() {
        // lone CR after the stream keyword
        assert_eq!(
            kinds(b"<</Length 2>>stream\rab\nendstream\nendobj"),
            vec![ObjectKind::Strange]
        );
        // missing length
        assert_eq!(
            kinds(b"<</Filter /X>>stream\nab\nendstream\nendobj"),
            vec![ObjectKind::Strange]
        );
        // duplicate length
        assert_eq!(
            kinds(b"<</Length 2 /Length 2>>stream\nab\nendstream\nendobj"),
            vec![ObjectKind::Strange]
        );
        // payload runs past the buffer
        assert_eq!(
            kinds(b"<</Length 99>>stream\nab\nendstream\nendobj"),
            vec![ObjectKind::Strange]
        );
        // endobj missing
        assert_eq!(
            kinds(b"<</Length 2>>stream\nab\nendstream\nfoo"),
            vec![ObjectKind::Strange]
        );
    }

    #[test]
    fn test_dereference_searches_backwards_first() {
        let doc = b"3 0 obj\n(first)\nendobj\n[3 0 R]";
        let parser = Parser::new(doc);
        let array = parser.parse_object(23).unwrap();
        let target = parser.dereference(&array.children[0]).unwrap();
        assert_eq!(target.kind, ObjectKind::String);
        assert!(target.raw_is(doc, "first"));
    }

    #[test]
    fn test_dereference_requires_token_boundary() {
        let doc = b"13 0 obj\n(no)\nendobj\n[3 0 R]";
        let parser = Parser::new(doc);
        let array = parser.parse_object(21).unwrap();
        assert!(parser.dereference(&array.children[0]).is_none());
    }

    #[test]
    fn test_self_referencing_length_terminates() {
        let doc = b"1 0 obj <</Length 1 0 R>>stream\nxx\nendstream\nendobj";
        let parser = Parser::new(doc);
        let objects: Vec<PdfObject> = parser.objects().collect();
        assert_eq!(objects[0].kind, ObjectKind::Object);
        assert_eq!(objects[1].kind, ObjectKind::Strange);
    }

    #[test]
    fn test_deep_nesting_is_strange() {
        let mut doc = vec![b'['; MAX_DEPTH + 10];
        doc.extend(vec![b']'; MAX_DEPTH + 10]);
        assert_eq!(kinds(&doc), vec![ObjectKind::Strange]);
    }

    #[test]
    fn test_top_level_walk_covers_buffer() {
        let doc: &[u8] = b"%PDF-1.4\n1 0 obj\n<</Type /Catalog /Pages 2 0 R>>\nendobj\n\
2 0 obj\n<</Length 3>>stream\nabc\nendstream\nendobj\ntrailer\n<</Root 1 0 R>>\n%%EOF\n";
        let parser = Parser::new(doc);
        let objects: Vec<PdfObject> = parser.objects().collect();
        assert!(objects.iter().all(|o| !o.is_strange()));

        let mut previous_end = 0;
        for obj in &objects {
            assert!(obj.offset >= previous_end);
            let gap = &doc[previous_end..obj.offset];
            let mut cur = Cursor::new(gap, 0);
            cur.skip_blank();
            assert_eq!(cur.pos, gap.len(), "unexpected bytes before {}", obj.offset);
            previous_end = obj.offset_next;
        }
        let mut cur = Cursor::new(&doc[previous_end..], 0);
        cur.skip_blank();
        assert!(cur.peek().is_none());
    }
}
