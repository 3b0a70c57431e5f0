// SPDX-License-Identifier: MIT OR Apache-2.0

//! Minimal [XML-RPC] codec: encodes method calls and decodes method responses.
//!
//! [XML-RPC]: http://xmlrpc.com/spec.md
use std::collections::BTreeMap;

use quick_xml::Reader;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use serde_json::{Map, Number};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Int(i64),
    Bool(bool),
    Double(f64),
    String(String),
    DateTime(String),
    Base64(String),
    Struct(BTreeMap<String, Value>),
    Array(Vec<Value>),
    Nil,
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(values) => Some(values),
            _ => None,
        }
    }

    /// Member of a struct.
    pub fn get(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Struct(members) => members.get(name),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Int(value) => serde_json::Value::from(*value),
            Value::Bool(value) => serde_json::Value::Bool(*value),
            Value::Double(value) => Number::from_f64(*value)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(value) | Value::DateTime(value) | Value::Base64(value) => {
                serde_json::Value::String(value.clone())
            }
            Value::Struct(members) => serde_json::Value::Object(
                members
                    .iter()
                    .map(|(name, value)| (name.clone(), value.to_json()))
                    .collect::<Map<_, _>>(),
            ),
            Value::Array(values) => {
                serde_json::Value::Array(values.iter().map(Value::to_json).collect())
            }
            Value::Nil => serde_json::Value::Null,
        }
    }

    fn encode(&self, out: &mut String) {
        out.push_str("<value>");
        match self {
            Value::Int(value) => out.push_str(&format!("<int>{value}</int>")),
            Value::Bool(value) => {
                out.push_str(&format!("<boolean>{}</boolean>", u8::from(*value)))
            }
            Value::Double(value) => out.push_str(&format!("<double>{value}</double>")),
            Value::String(value) => out.push_str(&format!("<string>{}</string>", escape(value))),
            Value::DateTime(value) => out.push_str(&format!(
                "<dateTime.iso8601>{}</dateTime.iso8601>",
                escape(value)
            )),
            Value::Base64(value) => out.push_str(&format!("<base64>{}</base64>", escape(value))),
            Value::Struct(members) => {
                out.push_str("<struct>");
                for (name, value) in members {
                    out.push_str(&format!("<member><name>{}</name>", escape(name)));
                    value.encode(out);
                    out.push_str("</member>");
                }
                out.push_str("</struct>");
            }
            Value::Array(values) => {
                out.push_str("<array><data>");
                for value in values {
                    value.encode(out);
                }
                out.push_str("</data></array>");
            }
            Value::Nil => out.push_str("<nil/>"),
        }
        out.push_str("</value>");
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

/// Serializes a `methodCall` document.
pub fn encode_call(method: &str, params: &[Value]) -> String {
    let mut out = String::from(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    out.push_str(&format!(
        "<methodCall><methodName>{}</methodName><params>",
        escape(method)
    ));
    for param in params {
        out.push_str("<param>");
        param.encode(&mut out);
        out.push_str("</param>");
    }
    out.push_str("</params></methodCall>");
    out
}

/// Parses a `methodResponse` document into its single return value.
pub fn decode_response(xml: &str) -> Result<Value, XmlRpcError> {
    let mut parser = Parser::new(xml)?;
    parser.expect_start("methodResponse")?;

    let value = match parser.next_tag()? {
        Token::Start(tag) if tag == "params" => {
            parser.expect_start("param")?;
            parser.expect_start("value")?;
            let value = parser.value()?;
            parser.expect_end("param")?;
            parser.expect_end("params")?;
            value
        }
        Token::Start(tag) if tag == "fault" => {
            parser.expect_start("value")?;
            let fault = parser.value()?;
            let code = match fault.get("faultCode") {
                Some(Value::Int(code)) => *code,
                _ => 0,
            };
            let message = fault
                .get("faultString")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned();
            return Err(XmlRpcError::Fault { code, message });
        }
        token => return Err(XmlRpcError::unexpected("params or fault", &token)),
    };

    parser.expect_end("methodResponse")?;
    Ok(value)
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Start(String),
    End(String),
    Empty(String),
    Text(String),
    Eof,
}

impl Token {
    fn is_blank(&self) -> bool {
        matches!(self, Token::Text(text) if text.trim().is_empty())
    }
}

/// Cursor over the tokens of a whole document.
struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    fn new(xml: &str) -> Result<Self, XmlRpcError> {
        let mut reader = Reader::from_str(xml);
        let mut tokens = Vec::new();
        loop {
            let token = match reader.read_event()? {
                Event::Start(tag) => {
                    Token::Start(String::from_utf8_lossy(tag.name().as_ref()).into_owned())
                }
                Event::End(tag) => {
                    Token::End(String::from_utf8_lossy(tag.name().as_ref()).into_owned())
                }
                Event::Empty(tag) => {
                    Token::Empty(String::from_utf8_lossy(tag.name().as_ref()).into_owned())
                }
                Event::Text(text) => Token::Text(text.unescape()?.into_owned()),
                Event::CData(data) => {
                    Token::Text(String::from_utf8_lossy(&data.into_inner()).into_owned())
                }
                Event::Eof => {
                    tokens.push(Token::Eof);
                    break;
                }
                _ => continue,
            };

            // Adjacent text and CDATA sections form one text node.
            if let (Token::Text(text), Some(Token::Text(previous))) = (&token, tokens.last_mut()) {
                previous.push_str(text);
                continue;
            }
            tokens.push(token);
        }

        Ok(Self {
            tokens,
            position: 0,
        })
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.position).unwrap_or(&Token::Eof)
    }

    fn next(&mut self) -> Token {
        let token = self.peek().clone();
        self.position += 1;
        token
    }

    /// Next token which is not whitespace between tags.
    fn next_tag(&mut self) -> Result<Token, XmlRpcError> {
        while self.peek().is_blank() {
            self.position += 1;
        }
        Ok(self.next())
    }

    fn expect_start(&mut self, name: &str) -> Result<(), XmlRpcError> {
        match self.next_tag()? {
            Token::Start(tag) if tag == name => Ok(()),
            token => Err(XmlRpcError::unexpected(&format!("<{name}>"), &token)),
        }
    }

    fn expect_end(&mut self, name: &str) -> Result<(), XmlRpcError> {
        match self.next_tag()? {
            Token::End(tag) if tag == name => Ok(()),
            token => Err(XmlRpcError::unexpected(&format!("</{name}>"), &token)),
        }
    }

    /// Text content up to the end tag `name`.
    fn text(&mut self, name: &str) -> Result<String, XmlRpcError> {
        let text = match self.peek() {
            Token::Text(text) => {
                let text = text.clone();
                self.position += 1;
                text
            }
            _ => String::new(),
        };
        self.expect_end(name)?;
        Ok(text)
    }

    /// Parses the content of a `<value>` element whose start tag was consumed, including its
    /// end tag.
    fn value(&mut self) -> Result<Value, XmlRpcError> {
        // Untyped values are strings.
        if let Token::Text(text) = self.peek() {
            let text = text.clone();
            if matches!(self.tokens.get(self.position + 1), Some(Token::End(tag)) if tag == "value")
            {
                self.position += 2;
                return Ok(Value::String(text));
            }
        }

        let value = match self.next_tag()? {
            Token::End(tag) if tag == "value" => return Ok(Value::String(String::new())),
            Token::Empty(tag) => match tag.as_str() {
                "string" => Value::String(String::new()),
                "nil" => Value::Nil,
                "struct" => Value::Struct(BTreeMap::new()),
                "array" => Value::Array(Vec::new()),
                _ => return Err(XmlRpcError::Malformed(format!("empty <{tag}> value"))),
            },
            Token::Start(tag) => match tag.as_str() {
                "string" => Value::String(self.text("string")?),
                "int" | "i4" | "i8" => {
                    let text = self.text(&tag)?;
                    let number = text.trim().parse().map_err(|_| {
                        XmlRpcError::Malformed(format!("invalid integer {text:?}"))
                    })?;
                    Value::Int(number)
                }
                "boolean" => match self.text("boolean")?.trim() {
                    "1" => Value::Bool(true),
                    "0" => Value::Bool(false),
                    other => {
                        return Err(XmlRpcError::Malformed(format!("invalid boolean {other:?}")));
                    }
                },
                "double" => {
                    let text = self.text("double")?;
                    let number = text.trim().parse().map_err(|_| {
                        XmlRpcError::Malformed(format!("invalid double {text:?}"))
                    })?;
                    Value::Double(number)
                }
                "dateTime.iso8601" => Value::DateTime(self.text("dateTime.iso8601")?),
                "base64" => Value::Base64(self.text("base64")?.trim().to_owned()),
                "nil" => {
                    self.expect_end("nil")?;
                    Value::Nil
                }
                "struct" => self.members()?,
                "array" => self.array()?,
                _ => return Err(XmlRpcError::Malformed(format!("unknown value type <{tag}>"))),
            },
            token => return Err(XmlRpcError::unexpected("a value", &token)),
        };

        self.expect_end("value")?;
        Ok(value)
    }

    fn members(&mut self) -> Result<Value, XmlRpcError> {
        let mut members = BTreeMap::new();
        loop {
            match self.next_tag()? {
                Token::End(tag) if tag == "struct" => break,
                Token::Start(tag) if tag == "member" => {
                    self.expect_start("name")?;
                    let name = self.text("name")?;
                    let value = match self.next_tag()? {
                        Token::Start(tag) if tag == "value" => self.value()?,
                        Token::Empty(tag) if tag == "value" => Value::String(String::new()),
                        token => return Err(XmlRpcError::unexpected("<value>", &token)),
                    };
                    self.expect_end("member")?;
                    members.insert(name, value);
                }
                token => return Err(XmlRpcError::unexpected("<member>", &token)),
            }
        }
        Ok(Value::Struct(members))
    }

    fn array(&mut self) -> Result<Value, XmlRpcError> {
        let mut values = Vec::new();
        match self.next_tag()? {
            Token::Empty(tag) if tag == "data" => {}
            Token::Start(tag) if tag == "data" => loop {
                match self.next_tag()? {
                    Token::End(tag) if tag == "data" => break,
                    Token::Start(tag) if tag == "value" => values.push(self.value()?),
                    Token::Empty(tag) if tag == "value" => {
                        values.push(Value::String(String::new()))
                    }
                    token => return Err(XmlRpcError::unexpected("<value>", &token)),
                }
            },
            token => return Err(XmlRpcError::unexpected("<data>", &token)),
        }
        self.expect_end("array")?;
        Ok(Value::Array(values))
    }
}

#[derive(Debug, Error)]
pub enum XmlRpcError {
    #[error("malformed xml: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("malformed xml-rpc response: {0}")]
    Malformed(String),

    #[error("xml-rpc fault {code}: {message}")]
    Fault { code: i64, message: String },
}

impl XmlRpcError {
    fn unexpected(expected: &str, found: &Token) -> Self {
        XmlRpcError::Malformed(format!("expected {expected}, found {found:?}"))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{Value, XmlRpcError, decode_response, encode_call};

    #[test]
    fn encode_method_call() {
        let xml = encode_call("confluence2.login", &["admin".into(), "s3cr<t".into()]);
        assert_eq!(
            xml,
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8"?>"#,
                "<methodCall><methodName>confluence2.login</methodName><params>",
                "<param><value><string>admin</string></value></param>",
                "<param><value><string>s3cr&lt;t</string></value></param>",
                "</params></methodCall>"
            )
        );
    }

    #[test]
    fn decode_nested_values() {
        let xml = r#"<?xml version="1.0"?>
            <methodResponse>
              <params>
                <param>
                  <value>
                    <array><data>
                      <value><struct>
                        <member><name>key</name><value>DEMO</value></member>
                        <member><name>name</name><value><string>Demo &amp; Test</string></value></member>
                        <member><name>id</name><value><i4>42</i4></value></member>
                        <member><name>archived</name><value><boolean>0</boolean></value></member>
                        <member><name>description</name><value><string/></value></member>
                      </struct></value>
                    </data></array>
                  </value>
                </param>
              </params>
            </methodResponse>"#;

        let value = decode_response(xml).unwrap();
        let spaces = value.as_array().unwrap();
        assert_eq!(spaces.len(), 1);

        let expected = Value::Struct(BTreeMap::from([
            ("key".to_string(), Value::String("DEMO".into())),
            ("name".to_string(), Value::String("Demo & Test".into())),
            ("id".to_string(), Value::Int(42)),
            ("archived".to_string(), Value::Bool(false)),
            ("description".to_string(), Value::String(String::new())),
        ]));
        assert_eq!(spaces[0], expected);
        assert_eq!(spaces[0].to_json()["id"], 42);
    }

    #[test]
    fn decode_fault() {
        let xml = r#"<methodResponse><fault><value><struct>
            <member><name>faultCode</name><value><int>0</int></value></member>
            <member><name>faultString</name><value><string>Invalid login</string></value></member>
            </struct></value></fault></methodResponse>"#;

        assert!(matches!(
            decode_response(xml),
            Err(XmlRpcError::Fault { code: 0, message }) if message == "Invalid login"
        ));
    }

    #[test]
    fn reject_garbage() {
        assert!(decode_response("<html><body>Maintenance</body></html>").is_err());
        assert!(decode_response("").is_err());
    }
}
