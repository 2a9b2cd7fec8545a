// pulse-core: XML property marshalling
// Emits and accepts the property-file vocabulary:
//   <bool|char|int|uint|double|string id=".." description="..">value</..>
//   <bag type=".." name=".."> ... </bag>

use std::io::{BufRead, Write};

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use thiserror::Error;

use crate::property::{Property, PropertyBag, PropertyVisitor};

/// Errors produced while reading or writing property files.
#[derive(Error, Debug)]
pub enum MarshalError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("xml error: {0}")]
    Xml(String),

    #[error("unexpected element <{0}>")]
    UnexpectedElement(String),

    #[error("invalid {tag} value '{value}'")]
    InvalidValue { tag: String, value: String },

    #[error("missing '{0}' attribute")]
    MissingAttribute(&'static str),

    #[error("unexpected end of document")]
    UnexpectedEof,
}

pub type MarshalResult<T> = Result<T, MarshalError>;

/// Serializes property bags to the XML vocabulary.
pub struct XmlMarshaller<W: Write> {
    writer: Writer<W>,
    error: Option<MarshalError>,
}

impl<W: Write> XmlMarshaller<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: Writer::new(sink),
            error: None,
        }
    }

    /// Serialize `bag` as a root `<bag>` element.
    pub fn marshal(&mut self, bag: &PropertyBag) -> MarshalResult<()> {
        self.open_bag(bag.bag_type(), None);
        bag.accept(self);
        self.close_bag();
        match self.error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    fn record<E: std::fmt::Display>(&mut self, result: Result<(), E>) {
        if self.error.is_none() {
            if let Err(err) = result {
                self.error = Some(MarshalError::Xml(err.to_string()));
            }
        }
    }

    fn simple(&mut self, tag: &str, name: &str, description: &str, value: &str) {
        let mut start = BytesStart::new(tag);
        start.push_attribute(("id", name));
        start.push_attribute(("description", description));
        let result = self
            .writer
            .write_event(Event::Start(start))
            .and_then(|_| self.writer.write_event(Event::Text(BytesText::new(value))))
            .and_then(|_| self.writer.write_event(Event::End(BytesEnd::new(tag))));
        self.record(result);
    }

    fn open_bag(&mut self, bag_type: &str, name: Option<&str>) {
        let mut start = BytesStart::new("bag");
        start.push_attribute(("type", bag_type));
        if let Some(name) = name {
            start.push_attribute(("name", name));
        }
        let result = self.writer.write_event(Event::Start(start));
        self.record(result);
    }

    fn close_bag(&mut self) {
        let result = self.writer.write_event(Event::End(BytesEnd::new("bag")));
        self.record(result);
    }
}

impl<W: Write> PropertyVisitor for XmlMarshaller<W> {
    fn visit_bool(&mut self, p: &Property<bool>) {
        let value = if *p.value() { "1" } else { "0" };
        self.simple("bool", p.name(), p.description(), value);
    }

    fn visit_char(&mut self, p: &Property<char>) {
        self.simple("char", p.name(), p.description(), &p.value().to_string());
    }

    fn visit_int(&mut self, p: &Property<i32>) {
        self.simple("int", p.name(), p.description(), &p.value().to_string());
    }

    fn visit_uint(&mut self, p: &Property<u32>) {
        self.simple("uint", p.name(), p.description(), &p.value().to_string());
    }

    fn visit_double(&mut self, p: &Property<f64>) {
        self.simple("double", p.name(), p.description(), &p.value().to_string());
    }

    fn visit_string(&mut self, p: &Property<String>) {
        self.simple("string", p.name(), p.description(), p.value());
    }

    fn visit_bag(&mut self, name: &str, _description: &str, bag: &PropertyBag) {
        self.open_bag(bag.bag_type(), Some(name));
        bag.accept(self);
        self.close_bag();
    }
}

/// Parses the XML vocabulary back into a [`PropertyBag`].
pub struct XmlDemarshaller<R: BufRead> {
    reader: Reader<R>,
}

struct OpenBag {
    name: Option<String>,
    bag: PropertyBag,
}

impl<R: BufRead> XmlDemarshaller<R> {
    pub fn new(source: R) -> Self {
        Self {
            reader: Reader::from_reader(source),
        }
    }

    /// Parse one root `<bag>` document.
    pub fn demarshal(&mut self) -> MarshalResult<PropertyBag> {
        let mut buf = Vec::new();
        let mut stack: Vec<OpenBag> = Vec::new();
        let mut pending: Option<(String, String, String, String)> = None;

        loop {
            let event = self
                .reader
                .read_event_into(&mut buf)
                .map_err(|e| MarshalError::Xml(e.to_string()))?;
            match event {
                Event::Start(start) => {
                    let tag = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                    if tag == "bag" {
                        let (bag_type, name) = bag_attributes(&start)?;
                        let mut bag = PropertyBag::new();
                        bag.set_bag_type(bag_type);
                        stack.push(OpenBag { name, bag });
                    } else {
                        if stack.is_empty() {
                            return Err(MarshalError::UnexpectedElement(tag));
                        }
                        let (id, description) = property_attributes(&start)?;
                        pending = Some((tag, id, description, String::new()));
                    }
                }
                Event::Empty(start) => {
                    let tag = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                    if tag == "bag" {
                        let (bag_type, name) = bag_attributes(&start)?;
                        let mut bag = PropertyBag::new();
                        bag.set_bag_type(bag_type);
                        match stack.last_mut() {
                            Some(parent) => {
                                parent.bag.add_bag(name.as_deref().unwrap_or(""), "", bag)
                            }
                            None => return Ok(bag),
                        }
                    } else {
                        if stack.is_empty() {
                            return Err(MarshalError::UnexpectedElement(tag));
                        }
                        let (id, description) = property_attributes(&start)?;
                        let parent = stack.last_mut().expect("checked non-empty");
                        add_primitive(&mut parent.bag, &tag, &id, &description, "")?;
                    }
                }
                Event::Text(text) => {
                    if let Some((_, _, _, value)) = pending.as_mut() {
                        value.push_str(
                            &text
                                .unescape()
                                .map_err(|e| MarshalError::Xml(e.to_string()))?,
                        );
                    }
                }
                Event::End(end) => {
                    let tag = String::from_utf8_lossy(end.name().as_ref()).into_owned();
                    if tag == "bag" {
                        let closed = stack.pop().ok_or(MarshalError::UnexpectedEof)?;
                        match stack.last_mut() {
                            Some(parent) => parent.bag.add_bag(
                                closed.name.as_deref().unwrap_or(""),
                                "",
                                closed.bag,
                            ),
                            None => return Ok(closed.bag),
                        }
                    } else {
                        let (tag, id, description, value) =
                            pending.take().ok_or_else(|| {
                                MarshalError::UnexpectedElement(tag.clone())
                            })?;
                        let parent = stack.last_mut().ok_or(MarshalError::UnexpectedEof)?;
                        add_primitive(&mut parent.bag, &tag, &id, &description, &value)?;
                    }
                }
                Event::Eof => {
                    return Err(MarshalError::UnexpectedEof);
                }
                _ => {}
            }
            buf.clear();
        }
    }
}

fn bag_attributes(start: &BytesStart<'_>) -> MarshalResult<(String, Option<String>)> {
    let mut bag_type = None;
    let mut name = None;
    for attr in start.attributes() {
        let attr = attr.map_err(|e| MarshalError::Xml(e.to_string()))?;
        let value = attr
            .unescape_value()
            .map_err(|e| MarshalError::Xml(e.to_string()))?
            .into_owned();
        match attr.key.as_ref() {
            b"type" => bag_type = Some(value),
            b"name" => name = Some(value),
            _ => {}
        }
    }
    Ok((
        bag_type.ok_or(MarshalError::MissingAttribute("type"))?,
        name,
    ))
}

fn property_attributes(start: &BytesStart<'_>) -> MarshalResult<(String, String)> {
    let mut id = None;
    let mut description = String::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| MarshalError::Xml(e.to_string()))?;
        let value = attr
            .unescape_value()
            .map_err(|e| MarshalError::Xml(e.to_string()))?
            .into_owned();
        match attr.key.as_ref() {
            b"id" => id = Some(value),
            b"description" => description = value,
            _ => {}
        }
    }
    Ok((id.ok_or(MarshalError::MissingAttribute("id"))?, description))
}

fn add_primitive(
    bag: &mut PropertyBag,
    tag: &str,
    id: &str,
    description: &str,
    value: &str,
) -> MarshalResult<()> {
    let invalid = || MarshalError::InvalidValue {
        tag: tag.to_string(),
        value: value.to_string(),
    };
    match tag {
        "bool" => {
            let parsed = match value.trim() {
                "1" | "true" => true,
                "0" | "false" => false,
                _ => return Err(invalid()),
            };
            bag.add_bool(id, description, parsed);
        }
        "char" => {
            let mut chars = value.chars();
            let c = chars.next().ok_or_else(invalid)?;
            if chars.next().is_some() {
                return Err(invalid());
            }
            bag.add_char(id, description, c);
        }
        "int" => bag.add_int(id, description, value.trim().parse().map_err(|_| invalid())?),
        "uint" => bag.add_uint(id, description, value.trim().parse().map_err(|_| invalid())?),
        "double" => bag.add_double(id, description, value.trim().parse().map_err(|_| invalid())?),
        "string" => bag.add_string(id, description, value),
        other => return Err(MarshalError::UnexpectedElement(other.to_string())),
    }
    Ok(())
}

/// Serialize `bag` to an XML string.
pub fn marshal_to_string(bag: &PropertyBag) -> MarshalResult<String> {
    let mut marshaller = XmlMarshaller::new(Vec::new());
    marshaller.marshal(bag)?;
    String::from_utf8(marshaller.into_inner())
        .map_err(|e| MarshalError::Xml(e.to_string()))
}

/// Parse an XML string into a bag.
pub fn demarshal_str(xml: &str) -> MarshalResult<PropertyBag> {
    XmlDemarshaller::new(xml.as_bytes()).demarshal()
}
