use super::object::{ObjectKind, PdfObject};
use super::parser::Parser;

/// Embedded-content finding for one object, in increasing severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Embedded {
    None,
    /// Dictionary keys that are not names
    Strange,
    /// An `/EF` embedded-file entry
    File,
    /// A file specification that cannot be classified
    Unclear,
    /// A file specification of type `/URL`
    Url,
}

impl<'a> Parser<'a> {
    /// Look for embedded files or URLs inside a dictionary or stream
    ///
    /// A URL, a strange key or an unclear file specification ends the walk
    /// at once; an embedded file is remembered while the rest of the
    /// dictionary is still checked for something worse.
    pub fn embedded_content(&self, obj: &PdfObject) -> Embedded {
        if !matches!(obj.kind, ObjectKind::Dictionary | ObjectKind::Stream) {
            return Embedded::None;
        }
        let raw = self.buffer();
        let mut result = Embedded::None;
        for pair in obj.children.chunks(2) {
            let key = &pair[0];
            if key.kind != ObjectKind::Name {
                return Embedded::Strange;
            }
            if key.raw_is(raw, "EF") {
                result = Embedded::File;
            }
            let Some(value) = pair.get(1) else { break };

            if key.raw_is(raw, "FS") {
                if value.kind != ObjectKind::Name {
                    return Embedded::Unclear;
                }
                if value.raw_is(raw, "URL") {
                    return Embedded::Url;
                }
                continue;
            }

            match self.embedded_content(value) {
                Embedded::None => {}
                Embedded::File => result = Embedded::File,
                found => return found,
            }
        }
        result
    }
}
