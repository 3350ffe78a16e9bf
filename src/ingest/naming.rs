//! Chapter and page naming rules
//!
//! Natural ordering, chapter numbers inferred from directory names, bulk naming
//! templates and page ordinal assignment.

use crate::catalog::ChapterKey;
use regex::Regex;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::LazyLock;

static FIRST_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)(?:\.(\d+))?").expect("chapter number regex"));

#[derive(Debug, PartialEq, Eq)]
enum Chunk<'a> {
    Text(&'a str),
    Number(&'a str),
}

fn chunks(s: &str) -> Vec<Chunk<'_>> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut in_digits = None;

    for (i, c) in s.char_indices() {
        let is_digit = c.is_ascii_digit();
        match in_digits {
            Some(prev) if prev != is_digit => {
                let part = &s[start..i];
                out.push(if prev { Chunk::Number(part) } else { Chunk::Text(part) });
                start = i;
            }
            _ => {}
        }
        in_digits = Some(is_digit);
    }
    if let Some(digits) = in_digits {
        let part = &s[start..];
        out.push(if digits { Chunk::Number(part) } else { Chunk::Text(part) });
    }
    out
}

fn cmp_numeric(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Numeric-aware, case-insensitive ordering: `2.jpg < 10.jpg`, `page9 < Page10`.
/// Names that differ only in leading zeros compare equal.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let left = chunks(a);
    let right = chunks(b);

    for (l, r) in left.iter().zip(right.iter()) {
        let ord = match (l, r) {
            (Chunk::Number(x), Chunk::Number(y)) => cmp_numeric(x, y),
            (Chunk::Text(x), Chunk::Text(y)) => x.to_lowercase().cmp(&y.to_lowercase()),
            (Chunk::Number(_), Chunk::Text(_)) => Ordering::Less,
            (Chunk::Text(_), Chunk::Number(_)) => Ordering::Greater,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    left.len().cmp(&right.len())
}

/// First number in a group name: `"Chapter 12.5 - Finale"` -> 12.5.
/// `None` when the name carries no numeral or the main number is zero.
pub fn parse_chapter_number(name: &str) -> Option<ChapterKey> {
    let caps = FIRST_NUMBER.captures(name)?;
    let main: u32 = caps.get(1)?.as_str().parse().ok()?;
    let sub: u32 = match caps.get(2) {
        Some(m) => m.as_str().parse().ok()?,
        None => 0,
    };
    if main == 0 {
        return None;
    }
    Some(ChapterKey::new(main, sub))
}

/// Lowercase, ASCII alphanumerics separated by single hyphens
pub fn slugify(s: &str) -> String {
    let mut slug = String::with_capacity(s.len());
    let mut pending_dash = false;

    for c in s.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// File name without directory and extension
pub fn file_stem(name: &str) -> &str {
    let base = name.rsplit('/').next().unwrap_or(name);
    match base.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => base,
    }
}

/// Bulk naming template such as `"Chapter {main}"` or `"{main}.{sub} - {label}"`
#[derive(Debug, Clone)]
pub struct NamingPattern {
    template: String,
    regex: Regex,
}

impl NamingPattern {
    pub fn parse(template: &str) -> Result<Self, String> {
        let mut pattern = String::from("(?i)^");
        let mut rest = template.trim();
        let mut seen = HashSet::new();

        while let Some(open) = rest.find('{') {
            pattern.push_str(&regex::escape(&rest[..open]));
            let close = rest[open..]
                .find('}')
                .map(|i| open + i)
                .ok_or_else(|| format!("unterminated placeholder in naming pattern '{template}'"))?;
            let name = &rest[open + 1..close];
            if !seen.insert(name.to_string()) {
                return Err(format!("placeholder {{{name}}} used twice in '{template}'"));
            }
            let group = match name {
                "main" => r"(?P<main>\d+)",
                "sub" => r"(?P<sub>\d+)",
                "label" => r"(?P<label>.+?)",
                other => {
                    return Err(format!(
                        "unknown placeholder {{{other}}} in naming pattern '{template}'"
                    ));
                }
            };
            pattern.push_str(group);
            rest = &rest[close + 1..];
        }
        pattern.push_str(&regex::escape(rest));
        pattern.push('$');

        if !seen.contains("main") {
            return Err(format!("naming pattern '{template}' has no {{main}} placeholder"));
        }

        let regex = Regex::new(&pattern)
            .map_err(|e| format!("naming pattern '{template}' is not usable: {e}"))?;
        Ok(Self {
            template: template.to_string(),
            regex,
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Chapter key and optional label for a group name matching the template
    pub fn match_name(&self, name: &str) -> Option<(ChapterKey, Option<String>)> {
        let caps = self.regex.captures(name.trim())?;
        let main: u32 = caps.name("main")?.as_str().parse().ok()?;
        if main == 0 {
            return None;
        }
        let sub: u32 = match caps.name("sub") {
            Some(m) => m.as_str().parse().ok()?,
            None => 0,
        };
        let label = caps
            .name("label")
            .map(|m| m.as_str().trim().to_string())
            .filter(|l| !l.is_empty());
        Some((ChapterKey::new(main, sub), label))
    }
}

/// Assign 1-based page ordinals to the file names of one chapter.
///
/// When every stem is a plain number, that number is the ordinal (0-based
/// numbering is shifted up by one) and the numbers must form 1..N. Otherwise
/// files are numbered in natural order. The returned vector is parallel to
/// `names`.
pub fn assign_ordinals(names: &[&str]) -> Result<Vec<u32>, String> {
    if names.is_empty() {
        return Ok(Vec::new());
    }

    let numeric: Option<Vec<u64>> = names
        .iter()
        .map(|name| {
            let stem = file_stem(name);
            if !stem.is_empty() && stem.chars().all(|c| c.is_ascii_digit()) {
                stem.parse::<u64>().ok()
            } else {
                None
            }
        })
        .collect();

    if let Some(numbers) = numeric {
        let shift = u64::from(numbers.iter().any(|n| *n == 0));
        let ordinals: Vec<u64> = numbers.iter().map(|n| n + shift).collect();

        let mut seen = HashSet::new();
        for (name, ordinal) in names.iter().zip(&ordinals) {
            if !seen.insert(*ordinal) {
                return Err(format!("two pages would receive ordinal {ordinal} ('{name}')"));
            }
        }

        let n = names.len() as u64;
        let mut missing: Vec<u64> = (1..=n).filter(|o| !seen.contains(o)).collect();
        if !missing.is_empty() {
            missing.truncate(5);
            return Err(format!(
                "page ordinals are not contiguous 1..{n}: missing {}",
                missing
                    .iter()
                    .map(u64::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }

        return Ok(ordinals.into_iter().map(|o| o as u32).collect());
    }

    let mut order: Vec<usize> = (0..names.len()).collect();
    order.sort_by(|&a, &b| natural_cmp(names[a], names[b]));

    for pair in order.windows(2) {
        let (a, b) = (names[pair[0]], names[pair[1]]);
        if natural_cmp(a, b) == Ordering::Equal {
            return Err(format!("pages '{a}' and '{b}' would receive the same ordinal"));
        }
    }

    let mut ordinals = vec![0u32; names.len()];
    for (position, &index) in order.iter().enumerate() {
        ordinals[index] = position as u32 + 1;
    }
    Ok(ordinals)
}
