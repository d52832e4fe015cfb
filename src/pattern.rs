//! Selecting catalog entries by name.

use crate::zip::{Catalog, CatalogEntry};

/// Entries picked by [`select`], plus the include patterns that matched nothing.
#[derive(Debug, Default)]
pub struct Selection<'a> {
    pub entries: Vec<&'a CatalogEntry>,
    pub unmatched: Vec<String>,
}

/// Check if a pattern contains glob wildcard characters.
pub fn has_glob_chars(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

/// Exact comparison for plain names, glob matching otherwise.
pub fn matches(pattern: &str, name: &str) -> bool {
    if has_glob_chars(pattern) {
        glob_match(pattern, name)
    } else {
        pattern == name
    }
}

/// Pick the file entries (directories are skipped) matching any of
/// `includes` (all files when empty) and none of `excludes`, in catalog
/// order.
pub fn select<'a>(catalog: &'a Catalog, includes: &[String], excludes: &[String]) -> Selection<'a> {
    let mut hit = vec![false; includes.len()];

    let entries = catalog
        .iter()
        .filter(|e| !e.is_directory())
        .filter(|e| {
            if includes.is_empty() {
                return true;
            }
            let mut any = false;
            for (i, p) in includes.iter().enumerate() {
                if matches(p, &e.name) {
                    hit[i] = true;
                    any = true;
                }
            }
            any
        })
        .filter(|e| !excludes.iter().any(|x| matches(x, &e.name)))
        .collect();

    let unmatched = includes
        .iter()
        .zip(hit)
        .filter(|(_, hit)| !hit)
        .map(|(p, _)| p.clone())
        .collect();

    Selection { entries, unmatched }
}

/// Glob pattern matching, case-sensitive, in the manner of `fnmatch`:
///
/// - `*` matches zero or more characters, `/` included
/// - `?` matches exactly one character
/// - `[abc]`, `[a-z]` match one character from the set; `[!a]` or `[^a]`
///   negate it; a `[` without a closing `]` is a literal
///
/// ```
/// use s3unzip::pattern::glob_match;
/// assert!(glob_match("*.txt", "dir/readme.txt"));
/// assert!(glob_match("file[0-9].dat", "file1.dat"));
/// assert!(!glob_match("file[!0-9].dat", "file1.dat"));
/// ```
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern_chars: Vec<char> = pattern.chars().collect();
    let text_chars: Vec<char> = text.chars().collect();

    fn do_match(pattern: &[char], text: &[char]) -> bool {
        match pattern.first() {
            None => text.is_empty(),
            Some('*') => {
                // Consecutive stars behave as one.
                let rest = &pattern[1..];
                if rest.first() == Some(&'*') {
                    return do_match(rest, text);
                }
                do_match(rest, text) || (!text.is_empty() && do_match(pattern, &text[1..]))
            }
            Some('?') => !text.is_empty() && do_match(&pattern[1..], &text[1..]),
            Some('[') => match CharClass::parse(&pattern[1..]) {
                Some((class, rest)) => match text.first() {
                    Some(c) if class.contains(*c) => do_match(rest, &text[1..]),
                    _ => false,
                },
                None => text.first() == Some(&'[') && do_match(&pattern[1..], &text[1..]),
            },
            Some(p) => text.first() == Some(p) && do_match(&pattern[1..], &text[1..]),
        }
    }

    do_match(&pattern_chars, &text_chars)
}

struct CharClass {
    negated: bool,
    ranges: Vec<(char, char)>,
}

impl CharClass {
    /// Parse the body after `[`; returns the class and the pattern after `]`.
    fn parse(body: &[char]) -> Option<(Self, &[char])> {
        let mut i = 0;
        let negated = matches!(body.first(), Some('!' | '^'));
        if negated {
            i += 1;
        }

        let mut ranges = Vec::new();
        let first = i;
        loop {
            let c = *body.get(i)?;
            if c == ']' && i > first {
                return Some((Self { negated, ranges }, &body[i + 1..]));
            }
            match (body.get(i + 1), body.get(i + 2)) {
                (Some('-'), Some(&end)) if end != ']' => {
                    ranges.push((c, end));
                    i += 3;
                }
                _ => {
                    ranges.push((c, c));
                    i += 1;
                }
            }
        }
    }

    fn contains(&self, c: char) -> bool {
        self.ranges.iter().any(|&(lo, hi)| lo <= c && c <= hi) != self.negated
    }
}
