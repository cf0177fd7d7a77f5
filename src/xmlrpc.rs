//! Minimal XML-RPC client: value model, `methodCall` encoder, `methodResponse`
//! decoder, and a single POST helper.
//!
//! Only what the WordPress endpoint needs; no introspection or multicall.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::io::Write;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, instrument, warn};

#[derive(Debug, Error)]
pub enum XmlRpcError {
    #[error("failed to encode request: {0}")]
    Encode(String),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("fault {code}: {message}")]
    Fault { code: i64, message: String },
    #[error("HTTP status {0}")]
    Status(u16),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Bool(bool),
    String(String),
    Double(f64),
    DateTime(String),
    Base64(Vec<u8>),
    Array(Vec<Value>),
    Struct(BTreeMap<String, Value>),
    Nil,
}

impl Value {
    /// Build a struct from `(key, value)` pairs.
    pub fn structure<K, I>(members: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Struct(members.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer, or a string holding one (WordPress returns ids as strings).
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Struct(members) => members.get(key),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

fn encode_err<E: Display>(e: E) -> XmlRpcError {
    XmlRpcError::Encode(e.to_string())
}

fn write_text_element<W: Write>(w: &mut Writer<W>, name: &str, text: &str) -> Result<(), XmlRpcError> {
    w.write_event(Event::Start(BytesStart::new(name))).map_err(encode_err)?;
    w.write_event(Event::Text(BytesText::new(text))).map_err(encode_err)?;
    w.write_event(Event::End(BytesEnd::new(name))).map_err(encode_err)?;
    Ok(())
}

fn open<W: Write>(w: &mut Writer<W>, name: &str) -> Result<(), XmlRpcError> {
    w.write_event(Event::Start(BytesStart::new(name))).map_err(encode_err)
}

fn close<W: Write>(w: &mut Writer<W>, name: &str) -> Result<(), XmlRpcError> {
    w.write_event(Event::End(BytesEnd::new(name))).map_err(encode_err)
}

fn write_value<W: Write>(w: &mut Writer<W>, value: &Value) -> Result<(), XmlRpcError> {
    open(w, "value")?;
    match value {
        Value::Int(i) => write_text_element(w, "int", &i.to_string())?,
        Value::Bool(b) => write_text_element(w, "boolean", if *b { "1" } else { "0" })?,
        Value::String(s) => write_text_element(w, "string", s)?,
        Value::Double(d) => write_text_element(w, "double", &d.to_string())?,
        Value::DateTime(s) => write_text_element(w, "dateTime.iso8601", s)?,
        Value::Base64(bytes) => write_text_element(w, "base64", &BASE64.encode(bytes))?,
        Value::Array(items) => {
            open(w, "array")?;
            open(w, "data")?;
            for item in items {
                write_value(w, item)?;
            }
            close(w, "data")?;
            close(w, "array")?;
        }
        Value::Struct(members) => {
            open(w, "struct")?;
            for (name, member) in members {
                open(w, "member")?;
                write_text_element(w, "name", name)?;
                write_value(w, member)?;
                close(w, "member")?;
            }
            close(w, "struct")?;
        }
        Value::Nil => w
            .write_event(Event::Empty(BytesStart::new("nil")))
            .map_err(encode_err)?,
    }
    close(w, "value")
}

/// Serialize a `methodCall` document.
pub fn encode_call(method: &str, params: &[Value]) -> Result<String, XmlRpcError> {
    let mut writer = Writer::new(Vec::new());
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(encode_err)?;
    open(&mut writer, "methodCall")?;
    write_text_element(&mut writer, "methodName", method)?;
    open(&mut writer, "params")?;
    for param in params {
        open(&mut writer, "param")?;
        write_value(&mut writer, param)?;
        close(&mut writer, "param")?;
    }
    close(&mut writer, "params")?;
    close(&mut writer, "methodCall")?;
    String::from_utf8(writer.into_inner()).map_err(encode_err)
}

/// Element tree built from the reader's event stream.
#[derive(Debug, Default)]
struct Node {
    name: String,
    text: String,
    children: Vec<Node>,
}

impl Node {
    fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.name == name)
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }
}

fn malformed<E: Display>(e: E) -> XmlRpcError {
    XmlRpcError::Malformed(e.to_string())
}

fn unescape_bytes(raw: &[u8]) -> Result<String, XmlRpcError> {
    let s = std::str::from_utf8(raw).map_err(malformed)?;
    Ok(quick_xml::escape::unescape(s).map_err(malformed)?.into_owned())
}

fn local_name(raw: &[u8]) -> String {
    let name = String::from_utf8_lossy(raw);
    match name.rsplit_once(':') {
        Some((_, local)) => local.to_string(),
        None => name.into_owned(),
    }
}

fn parse_tree(xml: &str) -> Result<Node, XmlRpcError> {
    let mut reader = Reader::from_str(xml);
    let mut stack = vec![Node::default()];

    loop {
        match reader.read_event().map_err(malformed)? {
            Event::Start(e) => stack.push(Node {
                name: local_name(e.name().as_ref()),
                ..Node::default()
            }),
            Event::Empty(e) => {
                let node = Node {
                    name: local_name(e.name().as_ref()),
                    ..Node::default()
                };
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(node);
                }
            }
            Event::End(_) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| malformed("unbalanced end tag"))?;
                let parent = stack
                    .last_mut()
                    .ok_or_else(|| malformed("unbalanced end tag"))?;
                parent.children.push(node);
            }
            Event::Text(t) => {
                let text = unescape_bytes(&t)?;
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text);
                }
            }
            Event::GeneralRef(r) => {
                let name = std::str::from_utf8(&r).map_err(malformed)?;
                let text = unescape_bytes(format!("&{name};").as_bytes())?;
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text);
                }
            }
            Event::CData(c) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&c));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    match stack.pop() {
        Some(root) if stack.is_empty() => Ok(root),
        _ => Err(malformed("unclosed element")),
    }
}

fn parse_value(node: &Node) -> Result<Value, XmlRpcError> {
    let Some(typed) = node.children.first() else {
        // untyped <value> is a string
        return Ok(Value::String(node.text.clone()));
    };
    let text = typed.text.trim();
    let value = match typed.name.as_str() {
        "i4" | "i8" | "int" => Value::Int(text.parse().map_err(malformed)?),
        "boolean" => Value::Bool(match text {
            "1" | "true" => true,
            "0" | "false" => false,
            other => return Err(malformed(format!("bad boolean {other:?}"))),
        }),
        "string" => Value::String(typed.text.clone()),
        "double" => Value::Double(text.parse().map_err(malformed)?),
        "dateTime.iso8601" => Value::DateTime(text.to_string()),
        "base64" => {
            let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
            Value::Base64(BASE64.decode(compact).map_err(malformed)?)
        }
        "array" => {
            let data = typed
                .child("data")
                .ok_or_else(|| malformed("array without data"))?;
            Value::Array(
                data.children_named("value")
                    .map(parse_value)
                    .collect::<Result<_, _>>()?,
            )
        }
        "struct" => {
            let mut members = BTreeMap::new();
            for member in typed.children_named("member") {
                let name = member
                    .child("name")
                    .ok_or_else(|| malformed("member without name"))?;
                let value = member
                    .child("value")
                    .ok_or_else(|| malformed("member without value"))?;
                members.insert(name.text.trim().to_string(), parse_value(value)?);
            }
            Value::Struct(members)
        }
        "nil" => Value::Nil,
        other => return Err(malformed(format!("unknown type <{other}>"))),
    };
    Ok(value)
}

/// Decode a `methodResponse`; a `<fault>` becomes [`XmlRpcError::Fault`].
pub fn parse_response(xml: &str) -> Result<Value, XmlRpcError> {
    let root = parse_tree(xml)?;
    let response = root
        .child("methodResponse")
        .ok_or_else(|| malformed("missing methodResponse"))?;

    if let Some(fault) = response.child("fault") {
        let value = fault
            .child("value")
            .map(parse_value)
            .transpose()?
            .unwrap_or(Value::Nil);
        return Err(XmlRpcError::Fault {
            code: value.get("faultCode").and_then(Value::as_i64).unwrap_or(0),
            message: value
                .get("faultString")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        });
    }

    let value = response
        .child("params")
        .and_then(|p| p.child("param"))
        .and_then(|p| p.child("value"))
        .ok_or_else(|| malformed("missing params"))?;
    parse_value(value)
}

/// POST one call to `endpoint` and decode the result.
#[instrument(level = "debug", skip_all, fields(%method))]
pub async fn call(
    client: &Client,
    endpoint: &str,
    method: &str,
    params: &[Value],
) -> Result<Value, XmlRpcError> {
    let t0 = Instant::now();
    let body = encode_call(method, params)?;
    let response = client
        .post(endpoint)
        .header(CONTENT_TYPE, "text/xml; charset=UTF-8")
        .body(body)
        .send()
        .await?;
    let status = response.status();
    let text = response.text().await?;
    if !status.is_success() {
        warn!(status = status.as_u16(), "XML-RPC endpoint returned an error status");
        return Err(XmlRpcError::Status(status.as_u16()));
    }
    debug!(elapsed_ms = t0.elapsed().as_millis() as u64, bytes = text.len(), "XML-RPC call finished");
    parse_response(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_call() {
        let params = vec![
            Value::Int(0),
            Value::from("user"),
            Value::structure([("post_status", Value::from("publish")), ("s", Value::from("A & B"))]),
        ];
        let xml = encode_call("wp.getPosts", &params).unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("<methodName>wp.getPosts</methodName>"));
        assert!(xml.contains("<value><int>0</int></value>"));
        assert!(xml.contains("<name>s</name><value><string>A &amp; B</string></value>"));
    }

    #[test]
    fn test_encode_base64_and_array() {
        let xml = encode_call(
            "x",
            &[Value::Base64(b"hi".to_vec()), Value::Array(vec![Value::Bool(true)])],
        )
        .unwrap();
        assert!(xml.contains("<base64>aGk=</base64>"));
        assert!(xml.contains("<array><data><value><boolean>1</boolean></value></data></array>"));
    }

    #[test]
    fn test_parse_struct_array_response() {
        let xml = r#"<?xml version="1.0"?>
<methodResponse>
  <params>
    <param>
      <value><array><data>
        <value><struct>
          <member><name>post_id</name><value><string>42</string></value></member>
          <member><name>post_title</name><value><string>Tom &amp; Jerry &#12354;</string></value></member>
          <member><name>sticky</name><value><boolean>0</boolean></value></member>
        </struct></value>
      </data></array></value>
    </param>
  </params>
</methodResponse>"#;
        let value = parse_response(xml).unwrap();
        let posts = value.as_array().unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].get("post_id").and_then(Value::as_i64), Some(42));
        assert_eq!(
            posts[0].get("post_title").and_then(Value::as_str),
            Some("Tom & Jerry あ")
        );
        assert_eq!(posts[0].get("sticky"), Some(&Value::Bool(false)));
    }

    #[test]
    fn test_parse_untyped_value_is_string() {
        let xml = "<methodResponse><params><param><value>123</value></param></params></methodResponse>";
        assert_eq!(parse_response(xml).unwrap(), Value::String("123".into()));
    }

    #[test]
    fn test_parse_fault() {
        let xml = r#"<methodResponse><fault><value><struct>
            <member><name>faultCode</name><value><int>403</int></value></member>
            <member><name>faultString</name><value><string>Incorrect username or password.</string></value></member>
        </struct></value></fault></methodResponse>"#;
        match parse_response(xml) {
            Err(XmlRpcError::Fault { code, message }) => {
                assert_eq!(code, 403);
                assert_eq!(message, "Incorrect username or password.");
            }
            other => panic!("expected fault, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            parse_response("<html><body>Not XML-RPC</body></html>"),
            Err(XmlRpcError::Malformed(_))
        ));
        assert!(parse_response("<methodResponse><params>").is_err());
    }

    #[test]
    fn test_encoded_call_parses_as_tree() {
        let xml = encode_call("wp.newPost", &[Value::structure([("a", Value::Nil)])]).unwrap();
        let root = parse_tree(&xml).unwrap();
        assert!(root.child("methodCall").is_some());
    }
}
