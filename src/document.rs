//! Span-indexed XML documents
//!
//! Project files and runtime configuration files are edited by splicing text at
//! element boundaries found with a streaming parser. Everything outside the
//! splice point is written back byte for byte, so comments, attribute quoting,
//! blank lines and the BOM of hand-maintained files survive an edit.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

const BOM: char = '\u{feff}';

#[derive(Error, Debug)]
#[error("{0}")]
pub struct DocumentError(String);

impl From<io::Error> for DocumentError {
    fn from(e: io::Error) -> Self {
        DocumentError(format!("not valid UTF-8 text: {}", e))
    }
}

#[derive(Debug, Clone)]
pub struct Element {
    /// Name without namespace prefix
    pub name: String,
    /// Name as written in the document
    pub qualified_name: String,
    pub parent: Option<usize>,
    pub attributes: Vec<(String, String)>,
    pub self_closing: bool,
    start: usize,
    open_end: usize,
    close_start: usize,
    end: usize,
    text: String,
}

impl Element {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Concatenated direct text content, trimmed
    pub fn text(&self) -> &str {
        self.text.trim()
    }

    fn is_unprefixed(&self) -> bool {
        self.name == self.qualified_name
    }
}

#[derive(Debug, Clone)]
pub struct XmlDocument {
    bom: bool,
    source: String,
    elements: Vec<Element>,
}

impl XmlDocument {
    /// Read and parse a file; content that is not UTF-8 is a parse error
    pub fn load(path: &Path) -> io::Result<Result<Self, DocumentError>> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(Self::parse(&content)),
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                Ok(Err(DocumentError::from(e)))
            }
            Err(e) => Err(e),
        }
    }

    pub fn parse(content: &str) -> Result<Self, DocumentError> {
        let (bom, source) = match content.strip_prefix(BOM) {
            Some(rest) => (true, rest.to_string()),
            None => (false, content.to_string()),
        };
        let elements = index_elements(&source)?;
        if elements.is_empty() {
            return Err(DocumentError("document has no root element".to_string()));
        }

        Ok(Self {
            bom,
            source,
            elements,
        })
    }

    pub fn root(&self) -> usize {
        0
    }

    pub fn element(&self, idx: usize) -> &Element {
        &self.elements[idx]
    }

    /// Default namespace declared on the root element
    pub fn namespace(&self) -> Option<&str> {
        self.elements[0].attribute("xmlns")
    }

    pub fn children(&self, idx: usize) -> impl Iterator<Item = usize> + '_ {
        self.elements
            .iter()
            .enumerate()
            .filter(move |(_, el)| el.parent == Some(idx))
            .map(|(i, _)| i)
    }

    /// Unprefixed children of `idx` with the given local name, in document order
    pub fn children_named<'a>(
        &'a self,
        idx: usize,
        name: &'a str,
    ) -> impl Iterator<Item = usize> + 'a {
        self.children(idx).filter(move |&i| {
            let el = &self.elements[i];
            el.name == name && el.is_unprefixed()
        })
    }

    /// Unprefixed elements anywhere in the document with the given local name
    pub fn descendants_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = usize> + 'a {
        self.elements
            .iter()
            .enumerate()
            .filter(move |(_, el)| el.name == name && el.is_unprefixed())
            .map(|(i, _)| i)
    }

    /// Text of the first element with this local name that has non-blank text
    pub fn first_text(&self, name: &str) -> Option<&str> {
        self.descendants_named(name)
            .map(|i| self.elements[i].text())
            .find(|text| !text.is_empty())
    }

    /// Insert `fragment` as a sibling directly after element `idx`
    pub fn insert_after(&self, idx: usize, fragment: &str) -> String {
        let el = &self.elements[idx];
        let newline = self.newline();
        let block = indent_block(fragment, &self.indent_of(idx), newline);

        let mut body = String::with_capacity(self.source.len() + block.len() + 2);
        body.push_str(&self.source[..el.end]);
        body.push_str(newline);
        body.push_str(&block);
        body.push_str(&self.source[el.end..]);
        self.with_bom(body)
    }

    /// Insert `fragment` as the last child of element `idx`
    pub fn append_child(&self, idx: usize, fragment: &str) -> String {
        if let Some(last) = self.children(idx).last() {
            return self.insert_after(last, fragment);
        }

        let el = &self.elements[idx];
        let newline = self.newline();
        let parent_indent = self.indent_of(idx);
        let child_indent = format!("{}{}", parent_indent, self.indent_unit());
        let block = indent_block(fragment, &child_indent, newline);

        let mut body = String::with_capacity(self.source.len() + block.len() + 16);
        if el.self_closing {
            let open = self.source[el.start..el.end]
                .trim_end_matches('>')
                .trim_end_matches('/')
                .trim_end();
            body.push_str(&self.source[..el.start]);
            body.push_str(open);
            body.push('>');
        } else {
            let inner = &self.source[el.open_end..el.close_start];
            if !inner.trim().is_empty() {
                // mixed content: keep the text, add the child before the close tag
                body.push_str(&self.source[..el.close_start]);
                body.push_str(newline);
                body.push_str(&block);
                body.push_str(newline);
                body.push_str(&parent_indent);
                body.push_str(&self.source[el.close_start..]);
                return self.with_bom(body);
            }
            body.push_str(&self.source[..el.open_end]);
        }
        body.push_str(newline);
        body.push_str(&block);
        body.push_str(newline);
        body.push_str(&parent_indent);
        if el.self_closing {
            body.push_str("</");
            body.push_str(&el.qualified_name);
            body.push('>');
            body.push_str(&self.source[el.end..]);
        } else {
            body.push_str(&self.source[el.close_start..]);
        }
        self.with_bom(body)
    }

    /// The document as it was read, BOM included
    pub fn contents(&self) -> String {
        self.with_bom(self.source.clone())
    }

    fn with_bom(&self, body: String) -> String {
        if self.bom {
            let mut out = String::with_capacity(body.len() + 3);
            out.push(BOM);
            out.push_str(&body);
            out
        } else {
            body
        }
    }

    fn newline(&self) -> &'static str {
        if self.source.contains("\r\n") {
            "\r\n"
        } else {
            "\n"
        }
    }

    fn indent_of(&self, idx: usize) -> String {
        let start = self.elements[idx].start;
        let line_start = self.source[..start].rfind('\n').map(|p| p + 1).unwrap_or(0);
        let prefix = &self.source[line_start..start];
        if prefix.chars().all(char::is_whitespace) {
            prefix.to_string()
        } else {
            String::new()
        }
    }

    /// One level of indentation as used by the document, two spaces by default
    pub fn indent_unit(&self) -> String {
        let root_indent = self.indent_of(0);
        self.children(0)
            .next()
            .map(|first| self.indent_of(first))
            .and_then(|indent| indent.strip_prefix(&root_indent).map(str::to_string))
            .filter(|unit| !unit.is_empty())
            .unwrap_or_else(|| "  ".to_string())
    }
}

fn index_elements(source: &str) -> Result<Vec<Element>, DocumentError> {
    let mut reader = Reader::from_str(source);
    let mut elements: Vec<Element> = Vec::new();
    let mut stack: Vec<usize> = Vec::new();

    loop {
        let before = reader.buffer_position() as usize;
        let event = reader.read_event().map_err(|e| {
            DocumentError(format!("{} (at byte {})", e, reader.error_position()))
        })?;
        let after = reader.buffer_position() as usize;

        match event {
            Event::Start(start) => {
                let el = new_element(&start, stack.last().copied(), before, after, false)?;
                elements.push(el);
                stack.push(elements.len() - 1);
            }
            Event::Empty(start) => {
                let el = new_element(&start, stack.last().copied(), before, after, true)?;
                elements.push(el);
            }
            Event::End(_) => {
                let idx = stack
                    .pop()
                    .ok_or_else(|| DocumentError(format!("unexpected end tag at byte {}", before)))?;
                elements[idx].close_start = before;
                elements[idx].end = after;
            }
            Event::Text(text) => {
                if let Some(&top) = stack.last() {
                    let value = text.unescape().map_err(|e| DocumentError(e.to_string()))?;
                    elements[top].text.push_str(&value);
                }
            }
            Event::CData(data) => {
                if let Some(&top) = stack.last() {
                    elements[top]
                        .text
                        .push_str(&String::from_utf8_lossy(data.as_ref()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(&open) = stack.last() {
        return Err(DocumentError(format!(
            "element <{}> is never closed",
            elements[open].qualified_name
        )));
    }

    Ok(elements)
}

fn new_element(
    start: &BytesStart,
    parent: Option<usize>,
    before: usize,
    after: usize,
    self_closing: bool,
) -> Result<Element, DocumentError> {
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| DocumentError(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| DocumentError(e.to_string()))?
            .into_owned();
        attributes.push((key, value));
    }

    Ok(Element {
        name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
        qualified_name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
        parent,
        attributes,
        self_closing,
        start: before,
        open_end: after,
        close_start: after,
        end: after,
        text: String::new(),
    })
}

fn indent_block(fragment: &str, indent: &str, newline: &str) -> String {
    fragment
        .lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{}{}", indent, line)
            }
        })
        .collect::<Vec<_>>()
        .join(newline)
}

/// Escape text for use inside element content or a double-quoted attribute
pub fn escape(value: &str) -> String {
    quick_xml::escape::escape(value).into_owned()
}
