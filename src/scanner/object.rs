use std::ops::Range;

/// Kind of a parsed document object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    /// Malformed input; poisons every ancestor
    Strange,
    Name,
    String,
    Array,
    Delimiter,
    Dictionary,
    Stream,
    Number,
    HexString,
    Keyword,
    /// `<n> <gen> obj` header
    Object,
    /// `<n> <gen> R` indirect reference
    Reference,
}

/// One object of a contract document, addressed by byte range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfObject {
    pub kind: ObjectKind,
    /// First byte of the object
    pub offset: usize,
    /// First byte after the object
    pub offset_next: usize,
    /// Payload range of a [`ObjectKind::Stream`]
    pub stream: Option<Range<usize>>,
    /// Array elements, or alternating keys and values of a dictionary
    pub children: Vec<PdfObject>,
}

impl PdfObject {
    pub(crate) fn new(kind: ObjectKind, offset: usize) -> Self {
        Self {
            kind,
            offset,
            offset_next: offset,
            stream: None,
            children: Vec::new(),
        }
    }

    pub(crate) fn strange(offset: usize) -> Self {
        Self::new(ObjectKind::Strange, offset)
    }

    pub fn is_strange(&self) -> bool {
        self.kind == ObjectKind::Strange
    }

    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset_next
    }

    /// Textual content without framing: strings lose their brackets, names
    /// their slash; keywords, delimiters, object headers and references
    /// are returned as-is
    pub fn raw<'a>(&self, buffer: &'a [u8]) -> Option<&'a [u8]> {
        let (start, end) = match self.kind {
            ObjectKind::String | ObjectKind::HexString => {
                (self.offset + 1, self.offset_next.checked_sub(1)?)
            }
            ObjectKind::Name => (self.offset + 1, self.offset_next),
            ObjectKind::Keyword
            | ObjectKind::Delimiter
            | ObjectKind::Object
            | ObjectKind::Reference => (self.offset, self.offset_next),
            _ => return None,
        };
        buffer.get(start..end)
    }

    /// Whether the raw content equals `text`
    pub fn raw_is(&self, buffer: &[u8], text: &str) -> bool {
        self.raw(buffer) == Some(text.as_bytes())
    }

    /// Integer value of a [`ObjectKind::Number`]
    pub fn as_int(&self, buffer: &[u8]) -> Option<i32> {
        if self.kind != ObjectKind::Number {
            return None;
        }
        let text = std::str::from_utf8(buffer.get(self.range())?).ok()?;
        text.parse().ok()
    }
}
