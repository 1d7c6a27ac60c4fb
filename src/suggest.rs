use nucleo::{
    Matcher, Utf32Str,
    pattern::{CaseMatching, Normalization, Pattern},
};

pub const DEFAULT_SUGGESTION_LIMIT: usize = 10;

/// Rank candidates for an autocomplete field.
///
/// An empty query returns the first `limit` candidates. Otherwise case-insensitive
/// substring matches come first, in candidate order, followed by fuzzy matches by
/// descending score.
pub fn rank<S: AsRef<str>>(query: &str, candidates: &[S], limit: usize) -> Vec<String> {
    if limit == 0 {
        return Vec::new();
    }
    let q = query.trim();
    if q.is_empty() {
        return candidates
            .iter()
            .take(limit)
            .map(|c| c.as_ref().to_string())
            .collect();
    }

    let needle = q.to_lowercase();
    let mut out: Vec<String> = Vec::new();
    let mut rest: Vec<&str> = Vec::new();
    for c in candidates {
        let c = c.as_ref();
        if c.to_lowercase().contains(&needle) {
            out.push(c.to_string());
        } else {
            rest.push(c);
        }
    }
    if out.len() >= limit {
        out.truncate(limit);
        return out;
    }

    let pattern = Pattern::parse(q, CaseMatching::Ignore, Normalization::Smart);
    let mut matcher = Matcher::new(nucleo::Config::DEFAULT);
    let mut utf32_buf = Vec::new();
    let mut fuzzy: Vec<(u32, &str)> = Vec::new();
    for c in rest {
        if let Some(score) = pattern.score(Utf32Str::new(c, &mut utf32_buf), &mut matcher) {
            fuzzy.push((score, c));
        }
    }
    fuzzy.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));

    out.extend(
        fuzzy
            .into_iter()
            .take(limit - out.len())
            .map(|(_, c)| c.to_string()),
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_query_returns_leading_candidates() {
        let c = ["a", "b", "c"];
        assert_eq!(rank("  ", &c, 2), vec!["a", "b"]);
        assert!(rank("a", &c, 0).is_empty());
    }

    #[test]
    fn substring_matches_come_first_in_candidate_order() {
        let c = ["# Related Files", "# Associated Pages", "## Associated Pages"];
        assert_eq!(
            rank("associated", &c, 10),
            vec!["# Associated Pages", "## Associated Pages"]
        );
    }

    #[test]
    fn fuzzy_matches_fill_remaining_slots() {
        let c = ["project", "priority", "status"];
        let out = rank("prj", &c, 10);
        assert_eq!(out.first().map(String::as_str), Some("project"));
        assert!(!out.iter().any(|s| s == "status"));
    }
}
