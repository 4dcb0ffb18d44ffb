//! Minimal XML-RPC value codec.
//!
//! Only the subset the PyPI index actually speaks: scalar values, arrays,
//! structs, `<nil/>` and faults. Requests are small enough to format by
//! hand; responses are parsed with `quick-xml`.

use crate::error::{PypiError, Result};
use chrono::NaiveDateTime;
use quick_xml::Reader;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use std::collections::BTreeMap;

/// An XML-RPC value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Bool(bool),
    Str(String),
    Double(f64),
    DateTime(NaiveDateTime),
    Array(Vec<Value>),
    Struct(BTreeMap<String, Value>),
    Nil,
}

impl Value {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Struct(members) => Some(members),
            _ => None,
        }
    }

    fn write_xml(&self, out: &mut String) {
        out.push_str("<value>");
        match self {
            Self::Int(value) => {
                out.push_str("<int>");
                out.push_str(&value.to_string());
                out.push_str("</int>");
            }
            Self::Bool(value) => {
                out.push_str("<boolean>");
                out.push(if *value { '1' } else { '0' });
                out.push_str("</boolean>");
            }
            Self::Str(value) => {
                out.push_str("<string>");
                out.push_str(&escape(value.as_str()));
                out.push_str("</string>");
            }
            Self::Double(value) => {
                out.push_str("<double>");
                out.push_str(&value.to_string());
                out.push_str("</double>");
            }
            Self::DateTime(value) => {
                out.push_str("<dateTime.iso8601>");
                out.push_str(&value.format("%Y%m%dT%H:%M:%S").to_string());
                out.push_str("</dateTime.iso8601>");
            }
            Self::Array(values) => {
                out.push_str("<array><data>");
                for value in values {
                    value.write_xml(out);
                }
                out.push_str("</data></array>");
            }
            Self::Struct(members) => {
                out.push_str("<struct>");
                for (name, value) in members {
                    out.push_str("<member><name>");
                    out.push_str(&escape(name.as_str()));
                    out.push_str("</name>");
                    value.write_xml(out);
                    out.push_str("</member>");
                }
                out.push_str("</struct>");
            }
            Self::Nil => out.push_str("<nil/>"),
        }
        out.push_str("</value>");
    }
}

/// Format a `<methodCall>` document.
pub fn format_method_call(method: &str, params: &[Value]) -> String {
    let mut out = String::from("<?xml version=\"1.0\"?><methodCall><methodName>");
    out.push_str(&escape(method));
    out.push_str("</methodName><params>");
    for param in params {
        out.push_str("<param>");
        param.write_xml(&mut out);
        out.push_str("</param>");
    }
    out.push_str("</params></methodCall>");
    out
}

/// Parse a `<methodResponse>` document into its single return value.
///
/// Faults become [`PypiError::Fault`].
pub fn parse_method_response(body: &str) -> Result<Value> {
    let mut parser = Parser::new(body);
    parser.expect_start("methodResponse")?;
    match parser.next_start()? {
        Tag::Start(name) if name == "params" => {
            parser.expect_start("param")?;
            let value = parser.parse_value_element()?;
            Ok(value)
        }
        Tag::Start(name) if name == "fault" => {
            let fault = parser.parse_value_element()?;
            let members = fault
                .as_struct()
                .ok_or_else(|| PypiError::UnexpectedResponse("fault is not a struct".into()))?;
            let code = members.get("faultCode").and_then(Value::as_i64).unwrap_or(0);
            let message = members
                .get("faultString")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_owned();
            Err(PypiError::Fault { code, message })
        }
        tag => Err(PypiError::UnexpectedResponse(format!(
            "expected params or fault, got {tag:?}"
        ))),
    }
}

#[derive(Debug)]
enum Tag {
    Start(String),
    Empty(String),
    End(String),
    Text(String),
    Eof,
}

struct Parser<'a> {
    reader: Reader<&'a [u8]>,
}

impl<'a> Parser<'a> {
    fn new(body: &'a str) -> Self {
        let mut reader = Reader::from_str(body);
        reader.config_mut().trim_text(true);
        Self { reader }
    }

    fn error(&self, message: impl Into<String>) -> PypiError {
        PypiError::UnexpectedResponse(message.into())
    }

    fn next(&mut self) -> Result<Tag> {
        loop {
            let event = self
                .reader
                .read_event()
                .map_err(|e| self.error(format!("malformed XML: {e}")))?;
            return Ok(match event {
                Event::Start(start) => {
                    Tag::Start(String::from_utf8_lossy(start.name().as_ref()).into_owned())
                }
                Event::Empty(start) => {
                    Tag::Empty(String::from_utf8_lossy(start.name().as_ref()).into_owned())
                }
                Event::End(end) => {
                    Tag::End(String::from_utf8_lossy(end.name().as_ref()).into_owned())
                }
                Event::Text(text) => Tag::Text(
                    text.unescape()
                        .map_err(|e| self.error(format!("bad text: {e}")))?
                        .into_owned(),
                ),
                Event::Eof => Tag::Eof,
                Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_) => continue,
                Event::CData(data) => Tag::Text(
                    String::from_utf8_lossy(data.into_inner().as_ref()).into_owned(),
                ),
            });
        }
    }

    /// Advance to the next start tag, skipping text.
    fn next_start(&mut self) -> Result<Tag> {
        loop {
            match self.next()? {
                Tag::Text(_) => continue,
                tag => return Ok(tag),
            }
        }
    }

    fn expect_start(&mut self, expected: &str) -> Result<()> {
        match self.next_start()? {
            Tag::Start(name) if name == expected => Ok(()),
            tag => Err(self.error(format!("expected <{expected}>, got {tag:?}"))),
        }
    }

    /// Parse `<value>...</value>`, assuming the start tag has not been read.
    fn parse_value_element(&mut self) -> Result<Value> {
        self.expect_start("value")?;
        self.parse_value_body()
    }

    /// Parse the inside of `<value>` up to and including `</value>`.
    fn parse_value_body(&mut self) -> Result<Value> {
        match self.next()? {
            // <value>text</value>: an untyped value is a string.
            Tag::Text(text) => {
                self.expect_end("value")?;
                Ok(Value::Str(text))
            }
            // <value></value>
            Tag::End(name) if name == "value" => Ok(Value::Str(String::new())),
            Tag::Empty(name) => {
                let value = match name.as_str() {
                    "nil" => Value::Nil,
                    "string" => Value::Str(String::new()),
                    "array" => Value::Array(Vec::new()),
                    "struct" => Value::Struct(BTreeMap::new()),
                    other => return Err(self.error(format!("unexpected empty <{other}>"))),
                };
                self.expect_end("value")?;
                Ok(value)
            }
            Tag::Start(name) => {
                let value = self.parse_typed(&name)?;
                self.expect_end("value")?;
                Ok(value)
            }
            tag => Err(self.error(format!("unexpected {tag:?} inside <value>"))),
        }
    }

    /// Parse a typed value; the start tag `name` has been consumed.
    fn parse_typed(&mut self, name: &str) -> Result<Value> {
        match name {
            "array" => {
                self.expect_start("data")?;
                let mut values = Vec::new();
                loop {
                    match self.next_start()? {
                        Tag::Start(tag) if tag == "value" => values.push(self.parse_value_body()?),
                        Tag::End(tag) if tag == "data" => break,
                        tag => return Err(self.error(format!("unexpected {tag:?} in array"))),
                    }
                }
                self.expect_end("array")?;
                Ok(Value::Array(values))
            }
            "struct" => {
                let mut members = BTreeMap::new();
                loop {
                    match self.next_start()? {
                        Tag::Start(tag) if tag == "member" => {
                            let name = self.parse_text_element("name")?;
                            let value = self.parse_value_element()?;
                            self.expect_end("member")?;
                            members.insert(name, value);
                        }
                        Tag::End(tag) if tag == "struct" => break,
                        tag => return Err(self.error(format!("unexpected {tag:?} in struct"))),
                    }
                }
                Ok(Value::Struct(members))
            }
            scalar => {
                let text = self.read_text_until_end(scalar)?;
                self.scalar_value(scalar, &text)
            }
        }
    }

    fn scalar_value(&self, name: &str, text: &str) -> Result<Value> {
        match name {
            "int" | "i4" | "i8" => text
                .parse()
                .map(Value::Int)
                .map_err(|_| self.error(format!("invalid integer {text:?}"))),
            "boolean" => match text {
                "0" => Ok(Value::Bool(false)),
                "1" => Ok(Value::Bool(true)),
                other => Err(self.error(format!("invalid boolean {other:?}"))),
            },
            "string" => Ok(Value::Str(text.to_owned())),
            "double" => text
                .parse()
                .map(Value::Double)
                .map_err(|_| self.error(format!("invalid double {text:?}"))),
            "dateTime.iso8601" => NaiveDateTime::parse_from_str(text, "%Y%m%dT%H:%M:%S")
                .map(Value::DateTime)
                .map_err(|_| self.error(format!("invalid dateTime {text:?}"))),
            "nil" => Ok(Value::Nil),
            other => Err(self.error(format!("unknown value type <{other}>"))),
        }
    }

    /// Parse `<name>text</name>`; the start tag has not been read.
    fn parse_text_element(&mut self, name: &str) -> Result<String> {
        self.expect_start(name)?;
        self.read_text_until_end(name)
    }

    /// Read the text content up to `</name>`.
    fn read_text_until_end(&mut self, name: &str) -> Result<String> {
        let mut text = String::new();
        loop {
            match self.next()? {
                Tag::Text(piece) => text.push_str(&piece),
                Tag::End(tag) if tag == name => return Ok(text),
                tag => return Err(self.error(format!("unexpected {tag:?} in <{name}>"))),
            }
        }
    }

    fn expect_end(&mut self, expected: &str) -> Result<()> {
        loop {
            match self.next()? {
                Tag::Text(_) => continue,
                Tag::End(name) if name == expected => return Ok(()),
                tag => return Err(self.error(format!("expected </{expected}>, got {tag:?}"))),
            }
        }
    }
}
