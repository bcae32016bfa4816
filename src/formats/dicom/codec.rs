//! DICOM Part 10 reading and writing
//!
//! Little endian transfer syntaxes only. The tree remembers whether each
//! sequence and item used undefined length so it is written back the same
//! way, and encapsulated pixel data is carried as opaque bytes.

use std::fmt;
use std::str::FromStr;

use super::dictionary;
use crate::domain::{ParseError, Result, ScrubError};

pub const PREAMBLE_LEN: usize = 128;
pub const MAGIC: &[u8; 4] = b"DICM";

/// Deepest sequence nesting accepted
pub const MAX_DEPTH: usize = 64;

const UNDEFINED: u32 = 0xFFFF_FFFF;

pub const IMPLICIT_VR_LE: &str = "1.2.840.10008.1.2";
pub const EXPLICIT_VR_LE: &str = "1.2.840.10008.1.2.1";
const EXPLICIT_VR_BE: &str = "1.2.840.10008.1.2.2";
const DEFLATED_LE: &str = "1.2.840.10008.1.2.1.99";

/// Group and element number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(pub u16, pub u16);

impl Tag {
    pub const ITEM: Tag = Tag(0xFFFE, 0xE000);
    pub const ITEM_DELIMITATION: Tag = Tag(0xFFFE, 0xE00D);
    pub const SEQUENCE_DELIMITATION: Tag = Tag(0xFFFE, 0xE0DD);

    /// Odd groups hold private attributes
    pub fn is_private(&self) -> bool {
        self.0 % 2 == 1
    }

    pub fn is_meta(&self) -> bool {
        self.0 == 0x0002
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:04X},{:04X})", self.0, self.1)
    }
}

impl FromStr for Tag {
    type Err = ScrubError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || ScrubError::Redaction(format!("invalid element tag {s}"));
        let inner = s
            .strip_prefix('(')
            .and_then(|s| s.strip_suffix(')'))
            .ok_or_else(invalid)?;
        let (group, element) = inner.split_once(',').ok_or_else(invalid)?;
        let group = u16::from_str_radix(group, 16).map_err(|_| invalid())?;
        let element = u16::from_str_radix(element, 16).map_err(|_| invalid())?;
        Ok(Tag(group, element))
    }
}

/// Value representation
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Vr(pub [u8; 2]);

impl Vr {
    pub const AE: Vr = Vr(*b"AE");
    pub const AS: Vr = Vr(*b"AS");
    pub const CS: Vr = Vr(*b"CS");
    pub const DA: Vr = Vr(*b"DA");
    pub const DS: Vr = Vr(*b"DS");
    pub const DT: Vr = Vr(*b"DT");
    pub const IS: Vr = Vr(*b"IS");
    pub const LO: Vr = Vr(*b"LO");
    pub const LT: Vr = Vr(*b"LT");
    pub const OB: Vr = Vr(*b"OB");
    pub const OW: Vr = Vr(*b"OW");
    pub const PN: Vr = Vr(*b"PN");
    pub const SH: Vr = Vr(*b"SH");
    pub const SQ: Vr = Vr(*b"SQ");
    pub const ST: Vr = Vr(*b"ST");
    pub const TM: Vr = Vr(*b"TM");
    pub const UI: Vr = Vr(*b"UI");
    pub const UL: Vr = Vr(*b"UL");
    pub const UN: Vr = Vr(*b"UN");
    pub const US: Vr = Vr(*b"US");

    /// VRs whose explicit header has a 32-bit length
    pub fn has_long_length(&self) -> bool {
        matches!(
            &self.0,
            b"OB" | b"OD" | b"OF" | b"OL" | b"OV" | b"OW" | b"SQ" | b"SV" | b"UC" | b"UN"
                | b"UR" | b"UT" | b"UV"
        )
    }

    /// Character string VRs
    pub fn is_text(&self) -> bool {
        matches!(
            &self.0,
            b"AE" | b"AS" | b"CS" | b"DA" | b"DS" | b"DT" | b"IS" | b"LO" | b"LT" | b"PN"
                | b"SH" | b"ST" | b"TM" | b"UC" | b"UI" | b"UR" | b"UT"
        )
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("??")
    }
}

impl fmt::Debug for Vr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Vr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bytes(Vec<u8>),
    Sequence(Sequence),
    /// Fragments of encapsulated pixel data, item headers and the closing
    /// delimiter included
    Encapsulated(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sequence {
    pub items: Vec<Item>,
    pub undefined_length: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Item {
    pub elements: Vec<Element>,
    pub undefined_length: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: Tag,
    pub vr: Vr,
    pub value: Value,
    /// File offset of the element header, 0 for inserted elements
    pub offset: u64,
}

impl Element {
    pub fn text(tag: Tag, vr: Vr, text: &str) -> Self {
        let mut element = Self {
            tag,
            vr,
            value: Value::Bytes(Vec::new()),
            offset: 0,
        };
        element.set_text(text);
        element
    }

    /// Value as trimmed text; `None` for sequences and pixel data
    pub fn as_text(&self) -> Option<String> {
        match &self.value {
            Value::Bytes(bytes) => Some(
                String::from_utf8_lossy(bytes)
                    .trim_end_matches(['\0', ' '])
                    .trim_start()
                    .to_string(),
            ),
            _ => None,
        }
    }

    /// Replace the value with text padded to even length
    pub fn set_text(&mut self, text: &str) {
        let mut bytes = text.as_bytes().to_vec();
        if bytes.len() % 2 == 1 {
            bytes.push(if self.vr == Vr::UI { 0 } else { b' ' });
        }
        self.value = Value::Bytes(bytes);
    }

    /// No bytes, no items
    pub fn is_empty(&self) -> bool {
        match &self.value {
            Value::Bytes(_) => self.as_text().map_or(true, |t| t.is_empty()),
            Value::Sequence(seq) => seq.items.is_empty(),
            Value::Encapsulated(raw) => raw.is_empty(),
        }
    }

    pub fn value_len(&self) -> usize {
        match &self.value {
            Value::Bytes(b) | Value::Encapsulated(b) => b.len(),
            Value::Sequence(seq) => seq.items.len(),
        }
    }
}

/// Location of an element in the tree, e.g. `(0040,0275)[0]/(0010,0010)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementPath {
    /// Sequence tags and item indexes leading to the element
    pub parents: Vec<(Tag, usize)>,
    pub tag: Tag,
}

impl FromStr for ElementPath {
    type Err = ScrubError;

    fn from_str(s: &str) -> Result<Self> {
        let mut segments: Vec<&str> = s.split('/').collect();
        let last = segments
            .pop()
            .ok_or_else(|| ScrubError::Redaction(format!("empty element path {s}")))?;
        let mut parents = Vec::with_capacity(segments.len());
        for segment in segments {
            let (tag, index) = segment
                .strip_suffix(']')
                .and_then(|s| s.split_once('['))
                .ok_or_else(|| ScrubError::Redaction(format!("invalid path segment {segment}")))?;
            let index = index
                .parse()
                .map_err(|_| ScrubError::Redaction(format!("invalid item index in {segment}")))?;
            parents.push((tag.parse()?, index));
        }
        Ok(Self {
            parents,
            tag: last.parse()?,
        })
    }
}

impl fmt::Display for ElementPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (tag, index) in &self.parents {
            write!(f, "{tag}[{index}]/")?;
        }
        write!(f, "{}", self.tag)
    }
}

/// A parsed Part 10 file
#[derive(Debug, Clone)]
pub struct DicomFile {
    pub preamble: Vec<u8>,
    /// File meta group, always explicit VR little endian
    pub meta: Vec<Element>,
    pub dataset: Vec<Element>,
    pub transfer_syntax: String,
    pub explicit_vr: bool,
}

impl DicomFile {
    /// Whether bytes start with a preamble and the `DICM` magic
    pub fn sniff(head: &[u8]) -> bool {
        head.len() >= PREAMBLE_LEN + 4 && &head[PREAMBLE_LEN..PREAMBLE_LEN + 4] == MAGIC
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        if !Self::sniff(data) {
            return Err(ParseError::MalformedHeader("missing DICM magic at offset 128".to_string()).into());
        }
        let mut reader = Reader::new(data, PREAMBLE_LEN + 4);
        let mut meta = Vec::new();
        while reader.remaining() >= 4 && reader.peek_u16()? == 0x0002 {
            let header = reader.header(true)?;
            let bytes = reader.take(header.length as usize)?.to_vec();
            meta.push(Element {
                tag: header.tag,
                vr: header.vr,
                value: Value::Bytes(bytes),
                offset: header.offset,
            });
        }

        let transfer_syntax = meta
            .iter()
            .find(|e| e.tag == dictionary::TRANSFER_SYNTAX_UID)
            .and_then(Element::as_text)
            .ok_or_else(|| ParseError::MalformedHeader("no transfer syntax in file meta".to_string()))?;
        let explicit_vr = match transfer_syntax.as_str() {
            IMPLICIT_VR_LE => false,
            EXPLICIT_VR_BE | DEFLATED_LE => {
                return Err(ScrubError::UnsupportedFormat(format!(
                    "transfer syntax {transfer_syntax}"
                )))
            }
            _ => true,
        };

        let dataset = reader.dataset(explicit_vr)?;
        Ok(Self {
            preamble: data[..PREAMBLE_LEN].to_vec(),
            meta,
            dataset,
            transfer_syntax,
            explicit_vr,
        })
    }

    /// Serialize; the meta group length is recomputed
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut meta_body = Vec::new();
        for element in self.meta.iter().filter(|e| e.tag != Tag(0x0002, 0x0000)) {
            write_element(&mut meta_body, element, true)?;
        }
        let mut out = Vec::with_capacity(meta_body.len() + 1024);
        out.extend_from_slice(&self.preamble);
        out.extend_from_slice(MAGIC);
        if self.meta.iter().any(|e| e.tag == Tag(0x0002, 0x0000)) {
            let length = Element {
                tag: Tag(0x0002, 0x0000),
                vr: Vr::UL,
                value: Value::Bytes((meta_body.len() as u32).to_le_bytes().to_vec()),
                offset: 0,
            };
            write_element(&mut out, &length, true)?;
        }
        out.extend_from_slice(&meta_body);
        for element in &self.dataset {
            write_element(&mut out, element, self.explicit_vr)?;
        }
        Ok(out)
    }

    /// Top-level dataset element
    pub fn element(&self, tag: Tag) -> Option<&Element> {
        let list = if tag.is_meta() { &self.meta } else { &self.dataset };
        list.iter().find(|e| e.tag == tag)
    }

    pub fn text(&self, tag: Tag) -> Option<String> {
        self.element(tag).and_then(Element::as_text)
    }

    /// Insert or replace a top-level element, keeping tag order
    pub fn put(&mut self, element: Element) {
        let list = if element.tag.is_meta() {
            &mut self.meta
        } else {
            &mut self.dataset
        };
        match list.binary_search_by_key(&element.tag, |e| e.tag) {
            Ok(at) => list[at] = element,
            Err(at) => list.insert(at, element),
        }
    }

    /// Element list holding the element a path points at
    fn parent_mut(&mut self, path: &ElementPath) -> Option<&mut Vec<Element>> {
        let root = path.parents.first().map_or(path.tag, |(tag, _)| *tag);
        let mut elements = if root.is_meta() {
            &mut self.meta
        } else {
            &mut self.dataset
        };
        for (tag, index) in &path.parents {
            let element = elements.iter_mut().find(|e| e.tag == *tag)?;
            let Value::Sequence(sequence) = &mut element.value else {
                return None;
            };
            elements = &mut sequence.items.get_mut(*index)?.elements;
        }
        Some(elements)
    }

    pub fn find_mut(&mut self, path: &ElementPath) -> Option<&mut Element> {
        self.parent_mut(path)?
            .iter_mut()
            .find(|e| e.tag == path.tag)
    }

    /// Remove the element a path points at; false when absent
    pub fn remove(&mut self, path: &ElementPath) -> bool {
        let Some(elements) = self.parent_mut(path) else {
            return false;
        };
        let before = elements.len();
        elements.retain(|e| e.tag != path.tag);
        elements.len() != before
    }
}

struct Header {
    tag: Tag,
    vr: Vr,
    length: u32,
    offset: u64,
}

/// Partially built container while parsing
enum Open {
    /// The dataset or an item: elements until `end` or an item delimiter
    Elements {
        elements: Vec<Element>,
        end: Option<usize>,
        undefined_length: bool,
        explicit: bool,
    },
    /// A sequence: items until `end` or a sequence delimiter
    Items {
        tag: Tag,
        vr: Vr,
        offset: u64,
        items: Vec<Item>,
        end: Option<usize>,
        undefined_length: bool,
        explicit: bool,
    },
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).filter(|end| *end <= self.data.len());
        let Some(end) = end else {
            return Err(ParseError::Truncated {
                offset: self.pos as u64,
                wanted: n as u64,
            }
            .into());
        };
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn peek_u16(&self) -> Result<u16> {
        let b = self
            .data
            .get(self.pos..self.pos + 2)
            .ok_or(ParseError::Truncated {
                offset: self.pos as u64,
                wanted: 2,
            })?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn tag(&mut self) -> Result<Tag> {
        Ok(Tag(self.u16()?, self.u16()?))
    }

    /// Element header; item and delimiter tags never come through here
    fn header(&mut self, explicit: bool) -> Result<Header> {
        let offset = self.pos as u64;
        let tag = self.tag()?;
        if !explicit {
            let length = self.u32()?;
            return Ok(Header {
                tag,
                vr: dictionary::implicit_vr(tag),
                length,
                offset,
            });
        }
        let raw = self.take(2)?;
        let vr = Vr([raw[0], raw[1]]);
        if !vr.0.iter().all(u8::is_ascii_uppercase) {
            return Err(ParseError::MalformedElement(format!(
                "{tag} at offset {offset} has invalid VR {:?}",
                String::from_utf8_lossy(&vr.0)
            ))
            .into());
        }
        let length = if vr.has_long_length() {
            self.take(2)?;
            self.u32()?
        } else {
            u32::from(self.u16()?)
        };
        Ok(Header {
            tag,
            vr,
            length,
            offset,
        })
    }

    /// Whether a value is a sequence even though no VR says so
    ///
    /// An explicit `UN` of undefined length is a sequence whose items are
    /// encoded implicit VR little endian (PS3.5 6.2.2).
    fn looks_like_sequence(&self, header: &Header, explicit: bool) -> bool {
        if header.vr == Vr::SQ {
            return true;
        }
        if explicit {
            return header.vr == Vr::UN && header.length == UNDEFINED;
        }
        if header.tag == dictionary::PIXEL_DATA {
            return false;
        }
        if header.length == UNDEFINED {
            return true;
        }
        header.vr == Vr::UN
            && header.length >= 8
            && self.data.get(self.pos..self.pos + 4) == Some(&[0xFE, 0xFF, 0x00, 0xE0][..])
    }

    /// Raw fragments of encapsulated pixel data up to and including the
    /// sequence delimiter
    fn fragments(&mut self) -> Result<Vec<u8>> {
        let start = self.pos;
        loop {
            let tag = self.tag()?;
            let length = self.u32()?;
            match tag {
                Tag::ITEM => {
                    self.take(length as usize)?;
                }
                Tag::SEQUENCE_DELIMITATION => break,
                other => {
                    return Err(ParseError::MalformedElement(format!(
                        "unexpected {other} inside encapsulated pixel data at offset {}",
                        self.pos - 8
                    ))
                    .into())
                }
            }
        }
        Ok(self.data[start..self.pos].to_vec())
    }

    fn end_of(&self, length: u32) -> Result<Option<usize>> {
        if length == UNDEFINED {
            return Ok(None);
        }
        let end = self.pos + length as usize;
        if end > self.data.len() {
            return Err(ParseError::Truncated {
                offset: self.pos as u64,
                wanted: u64::from(length),
            }
            .into());
        }
        Ok(Some(end))
    }

    /// Parse the dataset with an explicit stack of open containers
    fn dataset(&mut self, explicit: bool) -> Result<Vec<Element>> {
        let mut stack = vec![Open::Elements {
            elements: Vec::new(),
            end: Some(self.data.len()),
            undefined_length: false,
            explicit,
        }];

        loop {
            let depth = stack.len();
            let Some(top) = stack.last_mut() else {
                return Err(ScrubError::Other("parser stack underflow".to_string()));
            };
            match top {
                Open::Elements {
                    end,
                    elements,
                    explicit,
                    ..
                } => {
                    let explicit = *explicit;
                    if let Some(end) = *end {
                        if self.pos >= end {
                            if self.pos > end {
                                return Err(ParseError::MalformedElement(format!(
                                    "element runs past its item end at offset {end}"
                                ))
                                .into());
                            }
                            if depth == 1 {
                                return Ok(std::mem::take(elements));
                            }
                            close(&mut stack)?;
                            continue;
                        }
                    }
                    if self.peek_u16()? == 0xFFFE {
                        let offset = self.pos;
                        let tag = self.tag()?;
                        self.u32()?;
                        if tag != Tag::ITEM_DELIMITATION || end.is_some() {
                            return Err(ParseError::MalformedElement(format!(
                                "unexpected {tag} at offset {offset}"
                            ))
                            .into());
                        }
                        close(&mut stack)?;
                        continue;
                    }

                    let header = self.header(explicit)?;
                    if self.looks_like_sequence(&header, explicit) {
                        if depth / 2 >= MAX_DEPTH {
                            return Err(ParseError::MalformedElement(format!(
                                "sequences nested deeper than {MAX_DEPTH} at offset {}",
                                header.offset
                            ))
                            .into());
                        }
                        let end = self.end_of(header.length)?;
                        let unknown = explicit && header.vr == Vr::UN;
                        stack.push(Open::Items {
                            tag: header.tag,
                            vr: if unknown { Vr::UN } else { Vr::SQ },
                            offset: header.offset,
                            items: Vec::new(),
                            end,
                            undefined_length: end.is_none(),
                            explicit: explicit && !unknown,
                        });
                        continue;
                    }
                    let value = if header.length == UNDEFINED {
                        Value::Encapsulated(self.fragments()?)
                    } else {
                        Value::Bytes(self.take(header.length as usize)?.to_vec())
                    };
                    elements.push(Element {
                        tag: header.tag,
                        vr: header.vr,
                        value,
                        offset: header.offset,
                    });
                }
                Open::Items { end, explicit, .. } => {
                    let explicit = *explicit;
                    if let Some(end) = *end {
                        if self.pos >= end {
                            if self.pos > end {
                                return Err(ParseError::MalformedElement(format!(
                                    "item runs past its sequence end at offset {end}"
                                ))
                                .into());
                            }
                            close(&mut stack)?;
                            continue;
                        }
                    }
                    let offset = self.pos;
                    let tag = self.tag()?;
                    let length = self.u32()?;
                    match tag {
                        Tag::ITEM => {
                            let item_end = self.end_of(length)?;
                            stack.push(Open::Elements {
                                elements: Vec::new(),
                                end: item_end,
                                undefined_length: item_end.is_none(),
                                explicit,
                            });
                        }
                        Tag::SEQUENCE_DELIMITATION if end.is_none() => close(&mut stack)?,
                        other => {
                            return Err(ParseError::MalformedElement(format!(
                                "unexpected {other} in sequence at offset {offset}"
                            ))
                            .into())
                        }
                    }
                }
            }
        }
    }
}

/// Pop the innermost container and attach it to its parent
fn close(stack: &mut Vec<Open>) -> Result<()> {
    let finished = stack.pop();
    let parent = stack.last_mut();
    match (finished, parent) {
        (
            Some(Open::Elements {
                elements,
                undefined_length,
                ..
            }),
            Some(Open::Items { items, .. }),
        ) => {
            items.push(Item {
                elements,
                undefined_length,
            });
            Ok(())
        }
        (
            Some(Open::Items {
                tag,
                vr,
                offset,
                items,
                undefined_length,
                ..
            }),
            Some(Open::Elements { elements, .. }),
        ) => {
            elements.push(Element {
                tag,
                vr,
                value: Value::Sequence(Sequence {
                    items,
                    undefined_length,
                }),
                offset,
            });
            Ok(())
        }
        _ => Err(ParseError::MalformedElement("unbalanced sequence or item".to_string()).into()),
    }
}

fn write_header(out: &mut Vec<u8>, tag: Tag, vr: Vr, length: u32, explicit: bool) -> Result<()> {
    out.extend_from_slice(&tag.0.to_le_bytes());
    out.extend_from_slice(&tag.1.to_le_bytes());
    if !explicit {
        out.extend_from_slice(&length.to_le_bytes());
        return Ok(());
    }
    out.extend_from_slice(&vr.0);
    if vr.has_long_length() {
        out.extend_from_slice(&[0, 0]);
        out.extend_from_slice(&length.to_le_bytes());
    } else {
        let short = u16::try_from(length).map_err(|_| {
            ScrubError::Redaction(format!("{tag} value of {length} bytes does not fit a {vr} header"))
        })?;
        out.extend_from_slice(&short.to_le_bytes());
    }
    Ok(())
}

fn write_element(out: &mut Vec<u8>, element: &Element, explicit: bool) -> Result<()> {
    match &element.value {
        Value::Bytes(bytes) => {
            let length = u32::try_from(bytes.len())
                .map_err(|_| ScrubError::Redaction(format!("{} is too long", element.tag)))?;
            write_header(out, element.tag, element.vr, length, explicit)?;
            out.extend_from_slice(bytes);
        }
        Value::Encapsulated(raw) => {
            write_header(out, element.tag, element.vr, UNDEFINED, explicit)?;
            out.extend_from_slice(raw);
        }
        Value::Sequence(sequence) => {
            // items of an unknown-VR sequence stay implicit VR
            let (vr, children_explicit) = if element.vr == Vr::UN {
                (Vr::UN, false)
            } else {
                (Vr::SQ, explicit)
            };
            let mut body = Vec::new();
            for item in &sequence.items {
                let mut item_body = Vec::new();
                for child in &item.elements {
                    write_element(&mut item_body, child, children_explicit)?;
                }
                push_tag(&mut body, Tag::ITEM);
                if item.undefined_length {
                    body.extend_from_slice(&UNDEFINED.to_le_bytes());
                    body.extend_from_slice(&item_body);
                    push_tag(&mut body, Tag::ITEM_DELIMITATION);
                    body.extend_from_slice(&0u32.to_le_bytes());
                } else {
                    body.extend_from_slice(&(item_body.len() as u32).to_le_bytes());
                    body.extend_from_slice(&item_body);
                }
            }
            if sequence.undefined_length {
                write_header(out, element.tag, vr, UNDEFINED, explicit)?;
                out.extend_from_slice(&body);
                push_tag(out, Tag::SEQUENCE_DELIMITATION);
                out.extend_from_slice(&0u32.to_le_bytes());
            } else {
                write_header(out, element.tag, vr, body.len() as u32, explicit)?;
                out.extend_from_slice(&body);
            }
        }
    }
    Ok(())
}

fn push_tag(out: &mut Vec<u8>, tag: Tag) {
    out.extend_from_slice(&tag.0.to_le_bytes());
    out.extend_from_slice(&tag.1.to_le_bytes());
}


#[cfg(test)]
mod tests {
    use super::testutil::*;
    use super::*;

    fn body() -> Vec<u8> {
        let mut body = Vec::new();
        body.extend(explicit(Tag(0x0008, 0x0018), Vr::UI, b"1.2.3.4\0"));
        body.extend(explicit(Tag(0x0010, 0x0010), Vr::PN, b"Doe^Jane"));
        let item = explicit(Tag(0x0010, 0x0020), Vr::LO, b"MRN-77");
        body.extend(sequence(Tag(0x0040, 0x0275), &[item], true));
        body.extend(encapsulated(&[b"\xFF\xD8jpeg\xFF\xD9"]));
        body
    }

    #[test]
    fn test_parse_explicit_tree() {
        let data = part10(EXPLICIT_VR_LE, "1.2.3.4", &body());
        let file = DicomFile::parse(&data).unwrap();
        assert!(file.explicit_vr);
        assert_eq!(file.dataset.len(), 4);
        assert_eq!(file.text(Tag(0x0010, 0x0010)).as_deref(), Some("Doe^Jane"));
        assert_eq!(file.text(dictionary::MEDIA_STORAGE_SOP_INSTANCE_UID).as_deref(), Some("1.2.3.4"));

        let Value::Sequence(seq) = &file.dataset[2].value else {
            panic!("expected a sequence");
        };
        assert!(seq.undefined_length);
        assert_eq!(seq.items.len(), 1);
        assert_eq!(seq.items[0].elements[0].as_text().as_deref(), Some("MRN-77"));
    }

    #[test]
    fn test_unchanged_tree_writes_identical_bytes() {
        let data = part10(EXPLICIT_VR_LE, "1.2.3.4", &body());
        let file = DicomFile::parse(&data).unwrap();
        assert_eq!(file.to_bytes().unwrap(), data);
    }

    #[test]
    fn test_implicit_vr_sequences() {
        let item = implicit(Tag(0x0010, 0x0010), b"Roe^Rick");
        let mut body = implicit(Tag(0x0008, 0x0018), b"1.2.3.4\0");
        body.extend(sequence(Tag(0x0040, 0x0275), &[item], false));
        let data = part10(IMPLICIT_VR_LE, "1.2.3.4", &body);

        let file = DicomFile::parse(&data).unwrap();
        assert!(!file.explicit_vr);
        let path: ElementPath = "(0040,0275)[0]/(0010,0010)".parse().unwrap();
        let mut file = file;
        let element = file.find_mut(&path).unwrap();
        assert_eq!(element.vr, Vr::PN);
        assert_eq!(element.as_text().as_deref(), Some("Roe^Rick"));
        assert_eq!(file.to_bytes().unwrap(), data);
    }

    #[test]
    fn test_undefined_length_un_is_an_implicit_sequence() {
        let item = implicit(Tag(0x0010, 0x0010), b"Roe^Rick");
        let mut body = explicit(Tag(0x0008, 0x0018), Vr::UI, b"1.2.3.4\0");
        body.extend(explicit(Tag(0x0009, 0x0010), Vr::LO, b"ACME"));
        body.extend(sequence_as(Tag(0x0009, 0x1010), Vr::UN, &[item], true));
        body.extend(explicit(Tag(0x0010, 0x0020), Vr::LO, b"MRN-77"));
        let data = part10(EXPLICIT_VR_LE, "1.2.3.4", &body);

        let mut file = DicomFile::parse(&data).unwrap();
        assert_eq!(file.dataset.len(), 4);
        assert_eq!(file.text(Tag(0x0010, 0x0020)).as_deref(), Some("MRN-77"));
        let sequence = file.element(Tag(0x0009, 0x1010)).unwrap();
        assert_eq!(sequence.vr, Vr::UN);
        assert!(matches!(sequence.value, Value::Sequence(_)));

        let path: ElementPath = "(0009,1010)[0]/(0010,0010)".parse().unwrap();
        let name = file.find_mut(&path).unwrap();
        assert_eq!(name.vr, Vr::PN);
        assert_eq!(name.as_text().as_deref(), Some("Roe^Rick"));
        assert_eq!(file.to_bytes().unwrap(), data);
    }

    #[test]
    fn test_path_round_trip_and_remove() {
        let text = "(0040,0275)[0]/(0010,0020)";
        let path: ElementPath = text.parse().unwrap();
        assert_eq!(path.to_string(), text);

        let data = part10(EXPLICIT_VR_LE, "1.2.3.4", &body());
        let mut file = DicomFile::parse(&data).unwrap();
        assert!(file.remove(&path));
        assert!(!file.remove(&path));
        assert!("(0040,0275)/(0010,0020)".parse::<ElementPath>().is_err());
    }

    #[test]
    fn test_truncated_value_is_an_error() {
        let data = part10(EXPLICIT_VR_LE, "1.2.3.4", &body());
        let cut = &data[..data.len() - 20];
        assert!(matches!(
            DicomFile::parse(cut),
            Err(ScrubError::Parse(ParseError::Truncated { .. }))
        ));
    }

    #[test]
    fn test_big_endian_is_unsupported() {
        let data = part10("1.2.840.10008.1.2.2", "1.2.3.4", &[]);
        assert!(matches!(
            DicomFile::parse(&data),
            Err(ScrubError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_set_text_pads_to_even_length() {
        let mut uid = Element::text(Tag(0x0008, 0x0018), Vr::UI, "1.2.3");
        assert_eq!(uid.value, Value::Bytes(b"1.2.3\0".to_vec()));
        uid.set_text("");
        assert!(uid.is_empty());
        let name = Element::text(Tag(0x0010, 0x0010), Vr::PN, "Doe");
        assert_eq!(name.value, Value::Bytes(b"Doe ".to_vec()));
    }
}
