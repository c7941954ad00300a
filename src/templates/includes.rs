//! Include resolution and source preparation for page templates

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::collections::{HashMap, HashSet};

use crate::error::{Error, Result};
use crate::storage::{Storage, INCLUDES_DIR};

/// Context roots whose own name is matched case-insensitively
const CONTEXT_ROOTS: [&str; 3] = ["page", "site", "layout"];

/// Replacement for a `{#` that does not open a comment
const LITERAL_COMMENT_OPEN: &str = "{% raw %}{#{% endraw %}";

lazy_static! {
    /// `{% raw %} ... {% endraw %}` blocks
    static ref RAW: Regex =
        Regex::new(r"(?s)\{%-?\s*raw\s*-?%\}.*?\{%-?\s*endraw\s*-?%\}").unwrap();
    /// Raw blocks (group 1, kept verbatim), `{{ ... }}` and `{% ... %}` regions
    static ref TAG: Regex = Regex::new(
        r"(?s)(\{%-?\s*raw\s*-?%\}.*?\{%-?\s*endraw\s*-?%\})|\{\{.*?\}\}|\{%.*?%\}"
    )
    .unwrap();
    /// String literals (group 1, kept verbatim), a dotted variable path
    /// (root in group 2, members in group 3), or members following `]`/`)`
    /// (groups 4 and 5)
    static ref VARIABLE_PATH: Regex = Regex::new(
        r#"("(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*'|`[^`]*`)|\b([A-Za-z_][A-Za-z0-9_]*)((?:\.[A-Za-z_][A-Za-z0-9_]*)*)|([\])])((?:\.[A-Za-z_][A-Za-z0-9_]*)+)"#
    )
    .unwrap();
    static ref INCLUDE: Regex =
        Regex::new(r#"\{%-?\s*include\s+["']([^"']+)["']"#).unwrap();
}

/// Turn author-written template text into what Tera compiles: stray `{#`
/// escaped, member access lowercased
pub fn prepare_source(source: &str) -> String {
    normalize_member_access(&escape_stray_comments(source))
}

/// Lowercase member access inside template tags. Context maps carry
/// lowercase keys, so this makes member access case-insensitive for every
/// variable, loop and `set` bindings included. The `page`, `site` and
/// `layout` roots are lowercased too; other variable names are kept. String
/// literals and raw blocks are left alone.
pub fn normalize_member_access(source: &str) -> String {
    TAG.replace_all(source, |tag: &Captures| {
        if tag.get(1).is_some() {
            return tag[0].to_string();
        }
        VARIABLE_PATH
            .replace_all(&tag[0], lowercase_members)
            .into_owned()
    })
    .into_owned()
}

fn lowercase_members(caps: &Captures) -> String {
    let group = |i: usize| caps.get(i).map_or("", |m| m.as_str());
    if caps.get(1).is_some() {
        return group(0).to_string();
    }
    if caps.get(2).is_some() {
        let root = group(2);
        let root = if CONTEXT_ROOTS.iter().any(|r| root.eq_ignore_ascii_case(r)) {
            root.to_ascii_lowercase()
        } else {
            root.to_string()
        };
        return format!("{}{}", root, group(3).to_lowercase());
    }
    format!("{}{}", group(4), group(5).to_lowercase())
}

/// Escape every `{#` that no `#}` closes before the next `{#`. Markdown
/// heading attributes (`# Install {#install}`) would otherwise open a Tera
/// comment. Raw blocks are left alone.
pub fn escape_stray_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut last = 0;
    for raw in RAW.find_iter(source) {
        escape_segment(&source[last..raw.start()], &mut out);
        out.push_str(raw.as_str());
        last = raw.end();
    }
    escape_segment(&source[last..], &mut out);
    out
}

fn escape_segment(segment: &str, out: &mut String) {
    let mut rest = segment;
    while let Some(pos) = rest.find("{#") {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 2..];
        match after.find("#}") {
            Some(close) if after.find("{#").map_or(true, |open| close < open) => {
                out.push_str("{#");
                out.push_str(&after[..close + 2]);
                rest = &after[close + 2..];
            }
            _ => {
                out.push_str(LITERAL_COMMENT_OPEN);
                rest = after;
            }
        }
    }
    out.push_str(rest);
}

/// Names referenced by `{% include "name" %}` tags outside raw blocks
pub fn include_names(source: &str) -> Vec<String> {
    let source = RAW.replace_all(source, "");
    INCLUDE
        .captures_iter(&source)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Load every include reachable from `source`, transitively, from the
/// includes folder. Returns (name, prepared source) pairs.
///
/// An include that reaches itself again is rejected here; Tera would
/// otherwise recurse without bound while rendering.
pub async fn load_includes(storage: &Storage, source: &str) -> Result<Vec<(String, String)>> {
    let roots = include_names(source);
    let mut loaded = Vec::new();
    let mut edges: HashMap<String, Vec<String>> = HashMap::new();
    let mut pending = roots.clone();

    while let Some(name) = pending.pop() {
        if edges.contains_key(&name) {
            continue;
        }

        let missing = || Error::IncludeNotFound {
            name: name.clone(),
            path: storage.root().join(INCLUDES_DIR).join(&name),
        };
        let item = storage
            .get_item(&format!("{}/{}", INCLUDES_DIR, name))
            .ok_or_else(missing)?;
        if !storage.file_exists(&item).await {
            return Err(missing());
        }

        tracing::debug!("Loading include {}", item);
        let text = prepare_source(&storage.read_text(&item).await?);
        let children = include_names(&text);
        pending.extend(children.iter().cloned());
        edges.insert(name.clone(), children);
        loaded.push((name, text));
    }

    let mut finished = HashSet::new();
    for root in &roots {
        check_cycle(root, &edges, &mut Vec::new(), &mut finished)?;
    }
    Ok(loaded)
}

/// Depth-first walk of the include graph; `chain` holds the includes
/// currently being expanded
fn check_cycle(
    name: &str,
    edges: &HashMap<String, Vec<String>>,
    chain: &mut Vec<String>,
    finished: &mut HashSet<String>,
) -> Result<()> {
    if finished.contains(name) {
        return Ok(());
    }
    if let Some(start) = chain.iter().position(|n| n == name) {
        let mut cycle = chain[start..].to_vec();
        cycle.push(name.to_string());
        return Err(Error::TemplateSyntax {
            name: format!("{}/{}", INCLUDES_DIR, name),
            message: format!("include cycle: {}", cycle.join(" -> ")),
        });
    }

    chain.push(name.to_string());
    for child in edges.get(name).into_iter().flatten() {
        check_cycle(child, edges, chain, finished)?;
    }
    chain.pop();
    finished.insert(name.to_string());
    Ok(())
}
