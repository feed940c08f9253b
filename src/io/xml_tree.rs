use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Elements whose text flows into the surrounding sentence
const INLINE_ELEMENTS: &[&str] = &["a", "span", "b", "i", "em", "strong", "sup", "sub", "inline"];

/// A node of the generic markup tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// Markup element with its attributes and children in document order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    fn from_start(start: &BytesStart<'_>) -> Result<Self, String> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut attrs = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| format!("bad attribute on <{}>: {}", name, e))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = match attr.unescape_value() {
                Ok(v) => v.into_owned(),
                Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
            };
            attrs.push((key, value));
        }
        Ok(Self {
            name,
            attrs,
            children: Vec::new(),
        })
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Direct child elements
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// Direct child elements with the given name
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.elements().filter(move |e| e.name == name)
    }

    /// First direct child with the given name
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.elements().find(|e| e.name == name)
    }

    /// First descendant with the given name, depth-first in document order
    pub fn find(&self, name: &str) -> Option<&Element> {
        self.elements()
            .find_map(|e| if e.name == name { Some(e) } else { e.find(name) })
    }

    /// Every descendant matching the predicate, in document order
    pub fn find_all_by<'a>(&'a self, pred: &dyn Fn(&Element) -> bool) -> Vec<&'a Element> {
        let mut found = Vec::new();
        self.collect_into(pred, &mut found);
        found
    }

    pub fn find_all(&self, name: &str) -> Vec<&Element> {
        self.find_all_by(&|e| e.name == name)
    }

    fn collect_into<'a>(&'a self, pred: &dyn Fn(&Element) -> bool, found: &mut Vec<&'a Element>) {
        for child in self.elements() {
            if pred(child) {
                found.push(child);
            }
            child.collect_into(pred, found);
        }
    }

    /// True when any descendant matches
    pub fn contains(&self, pred: &dyn Fn(&Element) -> bool) -> bool {
        self.elements().any(|e| pred(e) || e.contains(pred))
    }

    /// Descendant text with whitespace collapsed
    pub fn text(&self) -> String {
        let mut raw = String::new();
        self.raw_text_into(&mut raw);
        raw.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn raw_text_into(&self, out: &mut String) {
        for child in &self.children {
            match child {
                Node::Text(t) => out.push_str(t),
                Node::Element(e) => {
                    e.raw_text_into(out);
                    // Block-level siblings must not run words together
                    if !INLINE_ELEMENTS.contains(&e.name.as_str()) {
                        out.push(' ');
                    }
                }
            }
        }
    }

    /// Text of the first direct child with the given name, if non-empty
    pub fn child_text(&self, name: &str) -> Option<String> {
        self.child(name)
            .map(Element::text)
            .filter(|t| !t.is_empty())
    }
}

/// Parse markup into a tree rooted at the document element.
///
/// Mismatched or missing closing tags are errors: a truncated document never
/// yields a partial tree.
pub fn parse_tree(bytes: &[u8]) -> Result<Element, String> {
    let mut reader = Reader::from_reader(bytes);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| format!("markup error at byte {}: {}", reader.buffer_position(), e))?;

        match event {
            Event::Start(start) => {
                if root.is_some() {
                    return Err("content after the document element".to_string());
                }
                stack.push(Element::from_start(&start)?);
            }
            Event::Empty(start) => {
                let element = Element::from_start(&start)?;
                attach(&mut stack, &mut root, Node::Element(element))?;
            }
            Event::End(_) => {
                // quick-xml has already checked the end name against the open tag
                let element = stack
                    .pop()
                    .ok_or_else(|| "closing tag without an open element".to_string())?;
                attach(&mut stack, &mut root, Node::Element(element))?;
            }
            Event::Text(text) => {
                if stack.is_empty() {
                    continue;
                }
                let value = match text.unescape() {
                    Ok(v) => v.into_owned(),
                    Err(_) => String::from_utf8_lossy(&text).into_owned(),
                };
                attach(&mut stack, &mut root, Node::Text(value))?;
            }
            Event::CData(data) => {
                if stack.is_empty() {
                    continue;
                }
                let value = String::from_utf8_lossy(&data).into_owned();
                attach(&mut stack, &mut root, Node::Text(value))?;
            }
            Event::Eof => break,
            // Declarations, comments, processing instructions, doctype
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(format!(
            "document ends inside <{}> ({} element(s) left open)",
            open.name,
            stack.len()
        ));
    }

    root.ok_or_else(|| "document has no root element".to_string())
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, node: Node) -> Result<(), String> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(node);
            Ok(())
        }
        None => match node {
            Node::Element(element) => {
                if root.is_some() {
                    return Err("more than one document element".to_string());
                }
                *root = Some(element);
                Ok(())
            }
            Node::Text(_) => Ok(()),
        },
    }
}
