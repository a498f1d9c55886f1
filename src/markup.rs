//! Single-line snapshot markup
//!
//! `<QUOTE symbol="HOZ9" basecode="C"><SESSION id="combined" last="21371"/></QUOTE>`
//!
//! Only what the feed sends is supported: elements with quoted attributes,
//! self-closing or paired, nested. Text between elements is ignored.

use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarkupError {
    #[error("unexpected end of markup at offset {0}")]
    UnexpectedEnd(usize),

    #[error("expected {expected} at offset {offset}, found {found:?}")]
    Unexpected {
        expected: &'static str,
        found: char,
        offset: usize,
    },

    #[error("closing tag </{found}> does not match <{open}>")]
    MismatchedTag { open: String, found: String },

    #[error("trailing content after root element at offset {0}")]
    TrailingContent(usize),

    #[error("<{element}> is missing attribute {attribute}")]
    MissingAttribute {
        element: String,
        attribute: &'static str,
    },

    #[error("<{element}> attribute {attribute}={value:?} is invalid")]
    InvalidAttribute {
        element: String,
        attribute: &'static str,
        value: String,
    },

    #[error("expected <{expected}> element, found <{found}>")]
    WrongElement {
        expected: &'static str,
        found: String,
    },
}

pub type MarkupResult<T> = Result<T, MarkupError>;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Element {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn require(&self, name: &'static str) -> MarkupResult<&str> {
        self.attr(name).ok_or_else(|| MarkupError::MissingAttribute {
            element: self.name.clone(),
            attribute: name,
        })
    }

    /// Error for an attribute whose text could not be interpreted.
    pub fn invalid(&self, name: &'static str) -> MarkupError {
        MarkupError::InvalidAttribute {
            element: self.name.clone(),
            attribute: name,
            value: self.attr(name).unwrap_or_default().to_string(),
        }
    }

    pub fn expect_name(&self, expected: &'static str) -> MarkupResult<()> {
        if self.name == expected {
            Ok(())
        } else {
            Err(MarkupError::WrongElement {
                expected,
                found: self.name.clone(),
            })
        }
    }

    pub fn set(&mut self, name: &str, value: impl ToString) {
        let value = value.to_string();
        match self.attributes.iter_mut().find(|(k, _)| k == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name.to_string(), value)),
        }
    }

    /// Set the attribute only when a value is present.
    pub fn set_opt<T: ToString>(&mut self, name: &str, value: Option<T>) {
        if let Some(v) = value {
            self.set(name, v);
        }
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}", self.name)?;
        for (k, v) in &self.attributes {
            write!(f, " {}=\"{}\"", k, escape(v))?;
        }
        if self.children.is_empty() {
            return write!(f, "/>");
        }
        write!(f, ">")?;
        for child in &self.children {
            write!(f, "{}", child)?;
        }
        write!(f, "</{}>", self.name)
    }
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

fn unescape(value: &str) -> String {
    if !value.contains('&') {
        return value.to_string();
    }
    value
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Parse a document with exactly one root element.
pub fn parse(input: &str) -> MarkupResult<Element> {
    let mut parser = Parser { input, pos: 0 };
    parser.skip_prolog();
    let root = parser.element()?;
    parser.skip_whitespace();
    if parser.pos < input.len() {
        return Err(MarkupError::TrailingContent(parser.pos));
    }
    Ok(root)
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn bump(&mut self) -> MarkupResult<char> {
        let c = self.peek().ok_or(MarkupError::UnexpectedEnd(self.pos))?;
        self.pos += c.len_utf8();
        Ok(c)
    }

    fn expect(&mut self, want: char, expected: &'static str) -> MarkupResult<()> {
        let offset = self.pos;
        let found = self.bump()?;
        if found != want {
            return Err(MarkupError::Unexpected {
                expected,
                found,
                offset,
            });
        }
        Ok(())
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek().filter(|c| c.is_whitespace()) {
            self.pos += c.len_utf8();
        }
    }

    fn skip_prolog(&mut self) {
        self.skip_whitespace();
        if self.input[self.pos..].starts_with("<?") {
            if let Some(end) = self.input[self.pos..].find("?>") {
                self.pos += end + 2;
            }
        }
        self.skip_whitespace();
    }

    fn name(&mut self) -> MarkupResult<&'a str> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == ':')
        {
            self.pos += 1;
        }
        if self.pos == start {
            let found = self.peek().ok_or(MarkupError::UnexpectedEnd(start))?;
            return Err(MarkupError::Unexpected {
                expected: "a name",
                found,
                offset: start,
            });
        }
        Ok(&self.input[start..self.pos])
    }

    fn element(&mut self) -> MarkupResult<Element> {
        self.expect('<', "'<'")?;
        let mut element = Element::new(self.name()?);

        loop {
            self.skip_whitespace();
            match self.peek() {
                Some('/') => {
                    self.bump()?;
                    self.expect('>', "'>'")?;
                    return Ok(element);
                }
                Some('>') => {
                    self.bump()?;
                    break;
                }
                Some(_) => {
                    let key = self.name()?;
                    self.skip_whitespace();
                    self.expect('=', "'='")?;
                    self.skip_whitespace();
                    let quote = self.bump()?;
                    if quote != '"' && quote != '\'' {
                        return Err(MarkupError::Unexpected {
                            expected: "a quoted value",
                            found: quote,
                            offset: self.pos - 1,
                        });
                    }
                    let start = self.pos;
                    let len = self.input[start..]
                        .find(quote)
                        .ok_or(MarkupError::UnexpectedEnd(self.input.len()))?;
                    self.pos = start + len + 1;
                    element
                        .attributes
                        .push((key.to_string(), unescape(&self.input[start..start + len])));
                }
                None => return Err(MarkupError::UnexpectedEnd(self.pos)),
            }
        }

        loop {
            // text content carries nothing for the feed's documents
            let next = self.input[self.pos..]
                .find('<')
                .ok_or(MarkupError::UnexpectedEnd(self.input.len()))?;
            self.pos += next;
            if self.input[self.pos..].starts_with("</") {
                self.pos += 2;
                let closing = self.name()?;
                self.skip_whitespace();
                self.expect('>', "'>'")?;
                if closing != element.name {
                    return Err(MarkupError::MismatchedTag {
                        open: element.name,
                        found: closing.to_string(),
                    });
                }
                return Ok(element);
            }
            element.children.push(self.element()?);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_self_closing() {
        let root = parse(r#"<CV symbol="ESZ9" basecode="A" data="1,2:3,4"/>"#).unwrap();
        assert_eq!(root.name, "CV");
        assert_eq!(root.attr("symbol"), Some("ESZ9"));
        assert_eq!(root.attr("data"), Some("1,2:3,4"));
        assert!(root.children.is_empty());
    }

    #[test]
    fn test_parse_nested() {
        let text = r#"<?xml version="1.0"?><QUOTE symbol="HOZ9"> <SESSION id="combined" last="21371"/><SESSION id='previous'></SESSION></QUOTE>"#;
        let root = parse(text).unwrap();
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.children[0].attr("last"), Some("21371"));
        assert_eq!(root.children[1].attr("id"), Some("previous"));
        assert_eq!(root.children_named("SESSION").count(), 2);
    }

    #[test]
    fn test_escaping_round_trip() {
        let mut el = Element::new("QUOTE");
        el.set("name", "Heating Oil \"NY\" <Harbor> & Co");
        let text = el.to_string();
        assert!(!text.contains("\"NY\""));
        assert_eq!(parse(&text).unwrap(), el);
    }

    #[test]
    fn test_display_paired() {
        let mut root = Element::new("QUOTE");
        root.set("symbol", "A");
        root.children.push(Element::new("SESSION"));
        assert_eq!(root.to_string(), r#"<QUOTE symbol="A"><SESSION/></QUOTE>"#);
    }

    #[test]
    fn test_errors() {
        assert!(matches!(parse("<QUOTE"), Err(MarkupError::UnexpectedEnd(_))));
        assert!(matches!(parse("<A></B>"), Err(MarkupError::MismatchedTag { .. })));
        assert!(matches!(parse("<A x=1/>"), Err(MarkupError::Unexpected { .. })));
        assert!(matches!(parse("<A/><B/>"), Err(MarkupError::TrailingContent(_))));

        let el = parse("<A/>").unwrap();
        assert!(matches!(el.require("symbol"), Err(MarkupError::MissingAttribute { .. })));
    }
}
