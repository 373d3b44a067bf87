use quick_xml::{
    events::{BytesStart, Event},
    Reader,
};

use super::{
    position::LineIndex,
    schema::{self, FieldKind, COLLECTION, RECORD, RECORD_FIELDS},
    Severity, StructuralError,
};

/// A well-formedness failure. Scanning stops at the first one.
struct ParseFailure {
    message: String,
    offset: usize,
}

impl ParseFailure {
    fn new(message: impl Into<String>, offset: usize) -> Self {
        Self { message: message.into(), offset }
    }
}

enum Frame {
    Collection { offset: usize },
    Record { number: usize, offset: usize, seen: [bool; RECORD_FIELDS.len()] },
    Field { kind: FieldKind, name: &'static str, offset: usize, text: String, has_children: bool },
    /// Undeclared element. Reported once when opened; its subtree is ignored.
    Skipped,
}

#[derive(PartialEq)]
enum Root {
    NotSeen,
    Open,
    Closed,
}

/// Walks one document's events, accumulating schema violations.
pub(super) struct Walker<'a> {
    text: &'a str,
    lines: LineIndex<'a>,
    stack: Vec<Frame>,
    root: Root,
    records: usize,
    errors: Vec<StructuralError>,
}

impl<'a> Walker<'a> {
    pub(super) fn new(text: &'a str) -> Self {
        Self {
            text,
            lines: LineIndex::new(text),
            stack: Vec::new(),
            root: Root::NotSeen,
            records: 0,
            errors: Vec::new(),
        }
    }

    pub(super) fn run(mut self) -> Vec<StructuralError> {
        if let Err(failure) = self.walk() {
            let at = self.lines.locate(failure.offset);
            self.errors.push(StructuralError::parse(failure.message, at));
        }
        self.errors
    }

    fn walk(&mut self) -> Result<(), ParseFailure> {
        let mut reader = Reader::from_str(self.text);

        loop {
            let offset = reader.buffer_position() as usize;
            let event = reader
                .read_event()
                .map_err(|e| ParseFailure::new(e.to_string(), reader.error_position() as usize))?;

            match event {
                Event::Start(e) => self.open(&e, offset)?,
                Event::Empty(e) => {
                    self.open(&e, offset)?;
                    self.close();
                }
                Event::End(_) => self.close(),
                Event::Text(t) => {
                    let text = t
                        .unescape()
                        .map_err(|e| ParseFailure::new(e.to_string(), offset))?;
                    let lead = t
                        .iter()
                        .position(|b| !b.is_ascii_whitespace())
                        .unwrap_or(0);
                    self.characters(&text, offset + lead)?;
                }
                Event::CData(c) => {
                    let text = String::from_utf8_lossy(&c).into_owned();
                    self.characters(&text, offset)?;
                }
                Event::DocType(_) => {
                    return Err(ParseFailure::new(
                        "DTD is prohibited in this document",
                        offset,
                    ));
                }
                Event::Eof => return self.finish(),
                // declaration, comments, processing instructions
                _ => {}
            }
        }
    }

    fn finish(&self) -> Result<(), ParseFailure> {
        let end = self.text.len();
        match self.root {
            Root::NotSeen => Err(ParseFailure::new("Root element is missing", end)),
            Root::Open => {
                let open: Vec<&str> = self.stack.iter().rev().filter_map(frame_name).collect();
                Err(ParseFailure::new(
                    format!(
                        "Unexpected end of file has occurred. The following elements are not closed: {}",
                        open.join(", ")
                    ),
                    end,
                ))
            }
            Root::Closed => Ok(()),
        }
    }

    fn open(&mut self, e: &BytesStart<'_>, offset: usize) -> Result<(), ParseFailure> {
        let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();

        let frame = match self.stack.last_mut() {
            None => {
                if self.root == Root::Closed {
                    return Err(ParseFailure::new("There are multiple root elements", offset));
                }
                self.root = Root::Open;
                if name == COLLECTION {
                    Frame::Collection { offset }
                } else {
                    self.error(format!("The '{name}' element is not declared"), offset);
                    Frame::Skipped
                }
            }
            Some(Frame::Collection { .. }) => {
                if name == RECORD {
                    self.records += 1;
                    Frame::Record { number: self.records, offset, seen: [false; RECORD_FIELDS.len()] }
                } else {
                    self.error(
                        format!(
                            "The element '{COLLECTION}' has invalid child element '{name}'. \
                             List of possible elements expected: '{RECORD}'"
                        ),
                        offset,
                    );
                    Frame::Skipped
                }
            }
            Some(Frame::Record { number, seen, .. }) => match schema::field_index(&name) {
                Some(i) if seen[i] => {
                    let number = *number;
                    self.error(
                        format!(
                            "Record {number}: the element '{RECORD}' has invalid child element \
                             '{name}'. '{name}' may occur only once"
                        ),
                        offset,
                    );
                    Frame::Skipped
                }
                Some(i) => {
                    seen[i] = true;
                    let rule = RECORD_FIELDS[i];
                    Frame::Field {
                        kind: rule.kind,
                        name: rule.name,
                        offset,
                        text: String::new(),
                        has_children: false,
                    }
                }
                None => {
                    let number = *number;
                    self.error(
                        format!(
                            "Record {number}: the element '{RECORD}' has invalid child element \
                             '{name}'. List of possible elements expected: '{}'",
                            field_list(&[true; RECORD_FIELDS.len()])
                        ),
                        offset,
                    );
                    Frame::Skipped
                }
            },
            Some(Frame::Field { name: parent, has_children, .. }) => {
                *has_children = true;
                let parent = *parent;
                self.error(
                    format!(
                        "The element '{parent}' cannot contain child element '{name}' \
                         because its content model is text only"
                    ),
                    offset,
                );
                Frame::Skipped
            }
            Some(Frame::Skipped) => Frame::Skipped,
        };

        if !matches!(frame, Frame::Skipped) {
            self.check_attributes(e, &name, offset)?;
        }
        self.stack.push(frame);
        Ok(())
    }

    fn check_attributes(
        &mut self,
        e: &BytesStart<'_>,
        element: &str,
        offset: usize,
    ) -> Result<(), ParseFailure> {
        for attr in e.attributes() {
            let attr = attr.map_err(|err| ParseFailure::new(err.to_string(), offset))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();

            if key == "xmlns" || key.starts_with("xmlns:") {
                continue;
            }
            if key == "xsi:schemaLocation" || key == "xsi:noNamespaceSchemaLocation" {
                self.warning(
                    format!(
                        "The '{key}' hint on '{element}' is ignored; the document is checked \
                         against the built-in schema"
                    ),
                    offset,
                );
                continue;
            }
            self.error(
                format!("The '{key}' attribute is not declared on element '{element}'"),
                offset,
            );
        }
        Ok(())
    }

    fn close(&mut self) {
        let Some(frame) = self.stack.pop() else {
            return;
        };

        match frame {
            Frame::Collection { offset } => {
                if self.records == 0 {
                    self.warning(
                        format!("The element '{COLLECTION}' contains no '{RECORD}' records"),
                        offset,
                    );
                }
            }
            Frame::Record { number, offset, seen } => {
                if seen.iter().any(|s| !s) {
                    let missing = seen.map(|s| !s);
                    self.error(
                        format!(
                            "Record {number}: the element '{RECORD}' has incomplete content. \
                             List of possible elements expected: '{}'",
                            field_list(&missing)
                        ),
                        offset,
                    );
                }
            }
            Frame::Field { kind, name, offset, text, has_children } => {
                if !has_children && !kind.accepts(&text) {
                    let value = text.trim_matches(schema::is_xml_whitespace);
                    self.error(
                        format!(
                            "The '{name}' element is invalid - The value '{value}' is invalid \
                             according to its datatype '{}'",
                            kind.type_name()
                        ),
                        offset,
                    );
                }
            }
            Frame::Skipped => {}
        }

        if self.stack.is_empty() {
            self.root = Root::Closed;
        }
    }

    fn characters(&mut self, text: &str, offset: usize) -> Result<(), ParseFailure> {
        let blank = text.chars().all(schema::is_xml_whitespace);

        match self.stack.last_mut() {
            None if blank => {}
            None => {
                return Err(ParseFailure::new("Data at the root level is invalid", offset));
            }
            Some(Frame::Field { text: buf, .. }) => buf.push_str(text),
            Some(Frame::Skipped) => {}
            Some(_) if blank => {}
            Some(Frame::Collection { .. }) => {
                self.error(format!("The element '{COLLECTION}' cannot contain text"), offset);
            }
            Some(Frame::Record { number, .. }) => {
                let number = *number;
                self.error(
                    format!("Record {number}: the element '{RECORD}' cannot contain text"),
                    offset,
                );
            }
        }
        Ok(())
    }

    fn error(&mut self, message: String, offset: usize) {
        let at = self.lines.locate(offset);
        self.errors
            .push(StructuralError::schema(Severity::Error, message, at));
    }

    fn warning(&mut self, message: String, offset: usize) {
        let at = self.lines.locate(offset);
        self.errors
            .push(StructuralError::schema(Severity::Warning, message, at));
    }
}

fn frame_name(frame: &Frame) -> Option<&'static str> {
    match frame {
        Frame::Collection { .. } => Some(COLLECTION),
        Frame::Record { .. } => Some(RECORD),
        Frame::Field { name, .. } => Some(*name),
        Frame::Skipped => None,
    }
}

/// Comma separated names of the record fields selected by `mask`.
fn field_list(mask: &[bool; RECORD_FIELDS.len()]) -> String {
    RECORD_FIELDS
        .iter()
        .zip(mask)
        .filter(|(_, selected)| **selected)
        .map(|(f, _)| f.name)
        .collect::<Vec<_>>()
        .join(", ")
}
