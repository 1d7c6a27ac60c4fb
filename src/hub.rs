//! Text surgery for hub pages: a heading followed by a flat list of `- [[link]]` lines.
//!
//! Everything here is pure; reading and writing notes happens in `linker`.

use std::sync::OnceLock;

use regex::Regex;

/// Canonical list line for a link target (a note path without its extension).
pub fn link_line(link_target: &str) -> String {
    format!("- [[{link_target}]]")
}

/// Initial text of a hub page created on demand: a title, the heading, and a blank line.
pub fn new_hub_page(target_page: &str, heading: &str) -> String {
    format!("# {target_page}\n\n{}\n\n", written_heading(heading))
}

/// Whether `line` is a markdown heading: one or more `#`, whitespace, then text.
pub fn is_heading(line: &str) -> bool {
    is_any_heading(line) && !heading_text(line).is_empty()
}

/// The heading text with its leading `#`s and surrounding whitespace removed.
pub fn heading_text(heading: &str) -> &str {
    heading.trim().trim_start_matches('#').trim()
}

/// Insert `- [[link_target]]` under `heading`, appending the heading when missing.
///
/// Headings are matched by text only, so `## Pages` satisfies a configured `# Pages`.
/// Returns `None` when the section already references the target.
pub fn insert_link(text: &str, heading: &str, link_target: &str) -> Option<String> {
    let written = written_heading(heading);
    let mut lines: Vec<&str> = text.split('\n').collect();
    let anchor = match find_heading(&lines, heading) {
        Some(i) => i,
        None => {
            lines.extend(["", written.as_str(), ""]);
            lines.len() - 2
        }
    };

    let start = anchor + 1;
    let end = lines[start..]
        .iter()
        .position(|l| is_any_heading(l))
        .map_or(lines.len(), |off| start + off);

    let needle = format!("[[{link_target}]]");
    if lines[start..end].iter().any(|l| l.contains(&needle)) {
        return None;
    }

    let insert_at = lines[start..end]
        .iter()
        .position(|l| !l.trim().is_empty())
        .map_or(start, |off| start + off);

    let line = link_line(link_target);
    lines.insert(insert_at, &line);
    Some(lines.join("\n"))
}

/// Delete every line of the document that is exactly the canonical link line (after trimming).
///
/// Removal is document-wide, not limited to one section. Returns `None` when nothing matched.
pub fn remove_link(text: &str, link_target: &str) -> Option<String> {
    let line = link_line(link_target);
    let mut lines: Vec<&str> = text.split('\n').collect();
    let mut removed = false;
    for i in (0..lines.len()).rev() {
        if lines[i].trim() == line {
            lines.remove(i);
            removed = true;
        }
    }
    removed.then(|| lines.join("\n"))
}

/// The heading line as written into a page; always findable again by [`find_heading`].
fn written_heading(heading: &str) -> String {
    let heading = heading.trim();
    if is_heading(heading) {
        heading.to_string()
    } else {
        format!("# {}", heading_text(heading))
    }
}

fn find_heading(lines: &[&str], heading: &str) -> Option<usize> {
    let pattern = format!(r"^#+\s+{}\s*$", regex::escape(heading_text(heading)));
    let re = Regex::new(&pattern).ok()?;
    lines.iter().position(|l| re.is_match(l))
}

fn is_any_heading(line: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^#+\s").expect("heading regex"))
        .is_match(line)
}
