use std::sync::OnceLock;

use regex::Regex;

use crate::properties::{PropertyMap, extract_properties};
use crate::Result;

/// A leading `---` delimited header block, split into its lines and the untouched body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HeaderBlock<'a> {
    /// Block lines without line terminators (a trailing `\r` is dropped too).
    pub lines: Vec<&'a str>,
    /// Everything after the closing delimiter line, byte-for-byte.
    pub body: &'a str,
}

/// One classified line of a header block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlockLine<'a> {
    /// `<indent><name>:` optionally followed by whitespace and an inline value.
    Key {
        indent: &'a str,
        name: &'a str,
        rest: &'a str,
    },
    /// `<indent>- <value>`; `prefix` holds everything up to the value.
    ListItem { prefix: &'a str, value: &'a str },
    Blank,
    Other,
}

pub(crate) fn split_header_block(content: &str) -> Option<HeaderBlock<'_>> {
    let mut lines = Lines::new(content);
    let (first, _) = lines.next()?;
    if first.trim() != "---" {
        return None;
    }

    let mut block = Vec::new();
    for (line, next) in lines {
        if line.trim() == "---" {
            return Some(HeaderBlock {
                lines: block,
                body: &content[next..],
            });
        }
        block.push(line);
    }

    // Fence not closed: not a header block.
    None
}

pub(crate) fn classify_line(line: &str) -> BlockLine<'_> {
    if line.trim().is_empty() {
        return BlockLine::Blank;
    }

    if let Some(caps) = key_re().captures(line) {
        let group = |i: usize| caps.get(i).map(|m| m.as_str()).unwrap_or("");
        return BlockLine::Key {
            indent: group(1),
            name: group(2),
            rest: group(3),
        };
    }

    if let Some(caps) = list_item_re().captures(line) {
        let group = |i: usize| caps.get(i).map(|m| m.as_str()).unwrap_or("");
        return BlockLine::ListItem {
            prefix: group(1),
            value: group(2),
        };
    }

    BlockLine::Other
}

/// Parse the header block into a property map.
///
/// `Ok(None)` means the note has no (closed) header block. Invalid YAML inside
/// a header block is an error so callers can tell it apart from "no properties".
pub fn parse_properties(content: &str) -> Result<Option<PropertyMap>> {
    let Some(block) = split_header_block(content) else {
        return Ok(None);
    };
    let yaml = block.lines.join("\n");
    let value: serde_yaml::Value = serde_yaml::from_str(&yaml)?;
    Ok(Some(extract_properties(&value)))
}

fn key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^(\s*)([^\s#:\-'"][^:]*?):(?:\s+(.*?))?\s*$"#).expect("key regex")
    })
}

fn list_item_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\s*-\s+)(.*)$").expect("list item regex"))
}

/// Iterates lines as `(line_without_terminator, offset_after_terminator)`.
struct Lines<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Lines<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }
}

impl<'a> Iterator for Lines<'a> {
    type Item = (&'a str, usize);

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.text.len() {
            return None;
        }
        let rest = &self.text[self.pos..];
        let (line, consumed) = match rest.find('\n') {
            Some(off) => (&rest[..off], off + 1),
            None => (rest, rest.len()),
        };
        self.pos += consumed;
        Some((line.strip_suffix('\r').unwrap_or(line), self.pos))
    }
}
