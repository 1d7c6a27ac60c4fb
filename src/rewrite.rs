//! In-place rewriting of one property's value inside a note's header block.
//!
//! Only the lines belonging to the target property change; the rest of the block and the
//! body are carried over as they are (the block is re-emitted with LF line endings).

use tracing::debug;

use crate::PropertyValue;
use crate::parse::{BlockLine, classify_line, split_header_block};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    pub text: String,
    pub changed: bool,
}

impl Rewrite {
    fn unchanged(text: &str) -> Self {
        Self {
            text: text.to_string(),
            changed: false,
        }
    }
}

#[derive(Clone, Copy)]
enum Mode<'a> {
    Outside,
    /// Inside a multi-line list belonging to the target property.
    List { indent: &'a str },
    /// The property was re-emitted as a list; drop whatever list lines follow it.
    Discard { indent: &'a str },
}

/// Replace `old` with `new` in `property`'s header-block entry.
///
/// `current` is the property's parsed value; it decides whether an inline value is a
/// scalar or an inline array. Only top-level keys are matched. Block scalars (`|`, `>`)
/// are left alone.
pub fn replace_value(
    text: &str,
    property: &str,
    current: &PropertyValue,
    old: &str,
    new: &str,
) -> Rewrite {
    let Some(block) = split_header_block(text) else {
        return Rewrite::unchanged(text);
    };

    let mut out: Vec<String> = Vec::with_capacity(block.lines.len());
    let mut mode = Mode::Outside;
    let mut changed = false;

    for &line in &block.lines {
        let class = classify_line(line);

        match mode {
            Mode::List { indent } => match class {
                BlockLine::ListItem { prefix, value } => {
                    if clean_item(value) == old {
                        out.push(format!("{prefix}{}", format_value(new)));
                        changed = true;
                    } else {
                        out.push(line.to_string());
                    }
                    continue;
                }
                BlockLine::Blank => {
                    out.push(line.to_string());
                    continue;
                }
                _ if is_nested_under(line, indent) => {
                    out.push(line.to_string());
                    continue;
                }
                _ => mode = Mode::Outside,
            },
            Mode::Discard { indent } => match class {
                BlockLine::ListItem { .. } => continue,
                _ if is_nested_under(line, indent) => continue,
                _ => mode = Mode::Outside,
            },
            Mode::Outside => {}
        }

        let BlockLine::Key { indent, name, rest } = class else {
            out.push(line.to_string());
            continue;
        };
        if name != property || !indent.is_empty() {
            out.push(line.to_string());
            continue;
        }

        let rest = rest.trim();
        if rest.is_empty() || rest == "[]" {
            out.push(line.to_string());
            mode = Mode::List { indent };
        } else if rest.starts_with('|') || rest.starts_with('>') {
            debug!(property, "block scalar values are not rewritten");
            out.push(line.to_string());
        } else if let PropertyValue::List(items) = current {
            if !items.iter().any(|i| i.stringify().as_deref() == Some(old)) {
                out.push(line.to_string());
                continue;
            }
            out.push(format!("{indent}{name}:"));
            for item in items {
                out.push(list_item_line(indent, item, old, new));
            }
            changed = true;
            mode = Mode::Discard { indent };
        } else if current.stringify().as_deref() == Some(old) {
            out.push(format!("{indent}{name}: {}", format_value(new)));
            changed = true;
        } else {
            out.push(line.to_string());
        }
    }

    if !changed {
        return Rewrite::unchanged(text);
    }

    Rewrite {
        text: format!("---\n{}\n---\n{}", out.join("\n"), block.body),
        changed: true,
    }
}

/// Double-quote a value when it holds characters that YAML would otherwise interpret.
///
/// Besides the structural characters anywhere, a leading indicator (`*ref`, `&x`, `!tag`,
/// `@x`, a quote or backtick) or a lone `-` also forces quotes.
pub fn format_value(value: &str) -> String {
    let needs_quotes = value == "-"
        || value.starts_with(['!', '&', '*', '@', '`', '%', '?', '\'', '"', ','])
        || value.chars().any(|c| {
            c.is_whitespace() || matches!(c, ':' | '#' | '[' | ']' | '{' | '}' | '|' | '>')
        });
    if needs_quotes {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

fn list_item_line(indent: &str, item: &PropertyValue, old: &str, new: &str) -> String {
    match item.stringify() {
        Some(s) if s == old => format!("{indent}  - {}", format_value(new)),
        Some(s) => format!("{indent}  - {}", format_value(&s)),
        None => format!("{indent}  -"),
    }
}

fn clean_item(value: &str) -> &str {
    let v = value.trim();
    let v = v.strip_prefix(['"', '\'']).unwrap_or(v);
    v.strip_suffix(['"', '\'']).unwrap_or(v)
}

fn is_nested_under(line: &str, indent: &str) -> bool {
    line.strip_prefix(indent)
        .and_then(|rest| rest.chars().next())
        .is_some_and(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar(s: &str) -> PropertyValue {
        PropertyValue::scalar(s)
    }

    #[test]
    fn scalar_value_is_replaced_and_everything_else_kept() {
        let text = "---\nproject: SO1\nstatus: open\n---\n# Body\nproject: SO1\n";
        let out = replace_value(text, "project", &scalar("SO1"), "SO1", "SO2");
        assert!(out.changed);
        assert_eq!(
            out.text,
            "---\nproject: SO2\nstatus: open\n---\n# Body\nproject: SO1\n"
        );
    }

    #[test]
    fn scalar_mismatch_is_a_no_op() {
        let text = "---\nproject: SO3\n---\n";
        let out = replace_value(text, "project", &scalar("SO3"), "SO1", "SO2");
        assert_eq!(out, Rewrite::unchanged(text));
    }

    #[test]
    fn multi_line_list_items_are_rewritten_in_place() {
        let text = "---\ntags:\n  - a\n  - b\n---\n";
        let out = replace_value(text, "tags", &PropertyValue::list(["a", "b"]), "a", "c");
        assert!(out.changed);
        assert_eq!(out.text, "---\ntags:\n  - c\n  - b\n---\n");
    }

    #[test]
    fn compact_lists_blank_lines_and_following_keys() {
        let text = "---\ntags:\n- a\n\n- 'b'\nstatus: a\n---\nbody";
        let out = replace_value(text, "tags", &PropertyValue::list(["a", "b"]), "b", "new tag");
        assert_eq!(
            out.text,
            "---\ntags:\n- a\n\n- \"new tag\"\nstatus: a\n---\nbody"
        );
    }

    #[test]
    fn quoted_items_match_on_their_unquoted_value() {
        let text = "---\ntags:\n  - \"a\"\n---\n";
        let out = replace_value(text, "tags", &PropertyValue::list(["a"]), "a", "x:y");
        assert_eq!(out.text, "---\ntags:\n  - \"x:y\"\n---\n");
    }

    #[test]
    fn inline_arrays_are_expanded_to_a_multi_line_list() {
        let text = "---\ntags: [a, b]\nstatus: open\n---\nx";
        let out = replace_value(text, "tags", &PropertyValue::list(["a", "b"]), "a", "c");
        assert!(out.changed);
        assert_eq!(out.text, "---\ntags:\n  - c\n  - b\nstatus: open\n---\nx");
    }

    #[test]
    fn inline_array_without_the_old_value_is_untouched() {
        let text = "---\ntags: [a, b]\n---\n";
        let out = replace_value(text, "tags", &PropertyValue::list(["a", "b"]), "z", "c");
        assert!(!out.changed);
        assert_eq!(out.text, text);
    }

    #[test]
    fn keys_sharing_a_prefix_or_nested_keys_are_not_matched() {
        let text = "---\nproject_id: SO1\nmeta:\n  project: SO1\nproject: SO1\n---\n";
        let out = replace_value(text, "project", &scalar("SO1"), "SO1", "SO2");
        assert_eq!(
            out.text,
            "---\nproject_id: SO1\nmeta:\n  project: SO1\nproject: SO2\n---\n"
        );
    }

    #[test]
    fn block_scalars_are_skipped() {
        let text = "---\nproject: |\n  SO1\n---\n";
        let out = replace_value(text, "project", &scalar("SO1\n"), "SO1\n", "SO2");
        assert!(!out.changed);
    }

    #[test]
    fn crlf_block_is_emitted_with_lf_and_body_is_verbatim() {
        let text = "---\r\nproject: SO1\r\n---\r\nbody\r\n";
        let out = replace_value(text, "project", &scalar("SO1"), "SO1", "SO2");
        assert_eq!(out.text, "---\nproject: SO2\n---\nbody\r\n");
    }

    #[test]
    fn notes_without_header_block_are_skipped() {
        let text = "project: SO1\n";
        let out = replace_value(text, "project", &scalar("SO1"), "SO1", "SO2");
        assert!(!out.changed);
        assert_eq!(out.text, text);
    }

    #[test]
    fn values_with_special_characters_are_quoted() {
        assert_eq!(format_value("plain"), "plain");
        assert_eq!(format_value("two words"), "\"two words\"");
        assert_eq!(format_value("say \"hi\""), "\"say \\\"hi\\\"\"");
        assert_eq!(format_value("#tag"), "\"#tag\"");
        assert_eq!(format_value("a>b"), "\"a>b\"");
        assert_eq!(format_value("a\\b c"), "\"a\\\\b c\"");
        assert_eq!(format_value("x-y"), "x-y");
    }

    #[test]
    fn values_starting_with_yaml_indicators_stay_parseable() {
        for new in ["*ref", "&x", "!tag", "@x", "`x", "%x", "-", "'a"] {
            let out = replace_value("---\nproject: SO1\n---\n", "project", &scalar("SO1"), "SO1", new);
            assert!(out.changed);
            let props = crate::parse::parse_properties(&out.text).unwrap().unwrap();
            assert_eq!(props["project"], scalar(new), "value {new:?}");

            let listed = replace_value(
                "---\ntags:\n  - SO1\n---\n",
                "tags",
                &PropertyValue::list(["SO1"]),
                "SO1",
                new,
            );
            let props = crate::parse::parse_properties(&listed.text).unwrap().unwrap();
            assert_eq!(props["tags"], PropertyValue::list([new]), "item {new:?}");
        }
    }
}
