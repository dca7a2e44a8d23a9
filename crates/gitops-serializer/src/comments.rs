//! Best-effort YAML comment preservation (§4.3 Encode contract).
//!
//! `serde_yaml` discards comments on parse, and no crate in reach preserves
//! a YAML comment CST, so this walks the raw source text line-by-line
//! instead of an AST: each line is attributed to a dotted field path (map
//! keys joined by `.`, list items as `key[idx]`) by tracking the leftmost
//! key in scope at each indentation level. Head/foot/inline comments are
//! indexed by that path on the original text and spliced back onto the
//! same paths in the freshly serialized text. A field whose path never
//! reappears surfaces its comments as an orphan instead of being dropped.

use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref KEY_LINE: Regex = Regex::new(r"^(\s*)([A-Za-z0-9_.\-]+)\s*:(.*)$").unwrap();
    static ref LIST_ITEM_LINE: Regex = Regex::new(r"^(\s*)-\s?(.*)$").unwrap();
}

#[derive(Debug, Default, Clone)]
pub struct CommentIndex {
    pub inline: BTreeMap<String, String>,
    pub head: BTreeMap<String, Vec<String>>,
    pub foot: BTreeMap<String, Vec<String>>,
    pub orphans: Vec<String>,
}

impl CommentIndex {
    pub fn is_empty(&self) -> bool {
        self.inline.is_empty() && self.head.is_empty() && self.foot.is_empty() && self.orphans.is_empty()
    }
}

struct Walker {
    stack: Vec<(usize, String)>,
    last_at_indent: BTreeMap<usize, String>,
    list_counters: BTreeMap<String, usize>,
}

impl Walker {
    fn new() -> Self {
        Self {
            stack: Vec::new(),
            last_at_indent: BTreeMap::new(),
            list_counters: BTreeMap::new(),
        }
    }

    fn parent_path(&self, indent: usize) -> Option<&str> {
        self.stack
            .iter()
            .rev()
            .find(|(i, _)| *i < indent)
            .map(|(_, p)| p.as_str())
    }

    /// Advance past a mapping-key line, returning its field path.
    fn enter_key(&mut self, indent: usize, key: &str) -> String {
        self.stack.retain(|(i, _)| *i < indent);
        let path = match self.parent_path(indent) {
            Some(parent) => format!("{parent}.{key}"),
            None => key.to_string(),
        };
        self.stack.push((indent, path.clone()));
        self.last_at_indent.insert(indent, path.clone());
        path
    }

    /// Advance past a `- ` list-item line, returning a synthetic path.
    fn enter_list_item(&mut self, indent: usize) -> String {
        self.stack.retain(|(i, _)| *i < indent);
        let parent = self.parent_path(indent).unwrap_or("$").to_string();
        let idx = self.list_counters.entry(parent.clone()).or_insert(0);
        let path = format!("{parent}[{idx}]");
        *idx += 1;
        self.stack.push((indent, path.clone()));
        self.last_at_indent.insert(indent, path.clone());
        path
    }

    /// The deepest currently-open path shallower than `indent`, used to
    /// anchor comments that precede a dedent (treated as "foot" comments
    /// of whatever block they trail).
    fn deepest_open_below(&self, indent: usize) -> Option<String> {
        self.last_at_indent
            .iter()
            .rev()
            .find(|(&i, _)| i >= indent)
            .map(|(_, p)| p.clone())
    }

    fn deepest_open(&self) -> Option<String> {
        self.last_at_indent.values().last().cloned()
    }
}

fn indent_of(line: &str) -> usize {
    line.chars().take_while(|c| *c == ' ').count()
}

fn split_inline_comment(rest: &str) -> (&str, Option<&str>) {
    match rest.find('#') {
        Some(idx) => (&rest[..idx], Some(rest[idx + 1..].trim())),
        None => (rest, None),
    }
}

/// Build a `CommentIndex` from the raw bytes of a decoded YAML frame.
pub fn extract(original: &str) -> CommentIndex {
    let mut index = CommentIndex::default();
    let mut walker = Walker::new();
    let mut pending_head: Vec<String> = Vec::new();

    for line in original.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with('#') {
            pending_head.push(trimmed[1..].trim().to_string());
            continue;
        }
        if trimmed.is_empty() {
            continue;
        }

        let indent = indent_of(line);
        attach_pending_head(&mut index, &mut walker, &mut pending_head, indent);

        if let Some(caps) = KEY_LINE.captures(line) {
            let key = caps.get(2).unwrap().as_str();
            let rest = caps.get(3).unwrap().as_str();
            let path = walker.enter_key(indent, key);
            if let (_, Some(comment)) = split_inline_comment(rest) {
                index.inline.insert(path.clone(), comment.to_string());
            }
            if !pending_head.is_empty() {
                index.head.entry(path).or_default().extend(pending_head.drain(..));
            }
        } else if let Some(caps) = LIST_ITEM_LINE.captures(line) {
            let rest = caps.get(2).unwrap().as_str();
            let path = walker.enter_list_item(indent);
            if let (_, Some(comment)) = split_inline_comment(rest) {
                index.inline.insert(path.clone(), comment.to_string());
            }
            if !pending_head.is_empty() {
                index.head.entry(path).or_default().extend(pending_head.drain(..));
            }
        }
    }

    if !pending_head.is_empty() {
        match walker.deepest_open() {
            Some(path) => index.foot.entry(path).or_default().extend(pending_head),
            None => index.orphans.extend(pending_head),
        }
    }

    index
}

fn attach_pending_head(index: &mut CommentIndex, walker: &Walker, pending_head: &mut Vec<String>, indent: usize) {
    if pending_head.is_empty() {
        return;
    }
    if let Some(path) = walker.deepest_open_below(indent) {
        index.foot.entry(path).or_default().extend(pending_head.drain(..));
    }
}

/// Splice a previously-extracted `CommentIndex` back onto freshly
/// serialized YAML text, aggregating comments whose field never
/// reappeared under a stable heading at the top of the output.
pub fn merge(serialized: &str, index: &CommentIndex) -> String {
    if index.is_empty() {
        return serialized.to_string();
    }

    let mut walker = Walker::new();
    let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();
    let mut out = String::new();

    for line in serialized.lines() {
        let trimmed = line.trim_start();
        if trimmed.is_empty() {
            out.push_str(line);
            out.push('\n');
            continue;
        }
        let indent = indent_of(line);
        let pad = " ".repeat(indent);

        let path = if let Some(caps) = KEY_LINE.captures(line) {
            let key = caps.get(2).unwrap().as_str();
            Some(walker.enter_key(indent, key))
        } else if LIST_ITEM_LINE.captures(line).is_some() {
            Some(walker.enter_list_item(indent))
        } else {
            None
        };

        if let Some(path) = &path {
            seen.insert(path.clone());
            if let Some(heads) = index.head.get(path) {
                for comment in heads {
                    out.push_str(&pad);
                    out.push_str("# ");
                    out.push_str(comment);
                    out.push('\n');
                }
            }
        }

        out.push_str(line);
        if let Some(path) = &path {
            if let Some(comment) = index.inline.get(path) {
                out.push_str(" # ");
                out.push_str(comment);
            }
        }
        out.push('\n');

        if let Some(path) = &path {
            if let Some(feet) = index.foot.get(path) {
                for comment in feet {
                    out.push_str(&pad);
                    out.push_str("# ");
                    out.push_str(comment);
                    out.push('\n');
                }
            }
        }
    }

    let mut orphans: Vec<&String> = index.orphans.iter().collect();
    for (path, comments) in index.head.iter().chain(index.foot.iter()) {
        if !seen.contains(path) {
            orphans.extend(comments.iter());
        }
    }
    for (path, comment) in &index.inline {
        if !seen.contains(path) {
            orphans.push(comment);
        }
    }

    if orphans.is_empty() {
        return out;
    }

    let mut result = String::from("# Preserved comments for removed fields:\n");
    for comment in orphans {
        result.push_str("# ");
        result.push_str(comment);
        result.push('\n');
    }
    result.push_str(&out);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_inline_and_head_comments() {
        let original = "# a head comment\nfoo: 1 # inline on foo\nbar: 2\n";
        let index = extract(original);
        assert_eq!(index.inline.get("foo").unwrap(), "inline on foo");
        assert_eq!(index.head.get("foo").unwrap(), &vec!["a head comment".to_string()]);

        let reserialized = "foo: 1\nbar: 2\n";
        let merged = merge(reserialized, &index);
        assert!(merged.contains("# a head comment"));
        assert!(merged.contains("foo: 1 # inline on foo"));
    }

    #[test]
    fn orphans_removed_fields_comments() {
        let original = "foo: 1 # keep me\nbaz: 2 # i will vanish\n";
        let index = extract(original);
        let reserialized = "foo: 1\n";
        let merged = merge(reserialized, &index);
        assert!(merged.starts_with("# Preserved comments for removed fields:"));
        assert!(merged.contains("i will vanish"));
    }
}
