/// Match-pattern to regex translation and URL matching
///
/// The translation is deliberately coarse: dots are escaped, `*` becomes `.*`,
/// and nothing else is touched. There is no scheme/host/path awareness, so
/// `*://*.example.com/*` does not match the bare `https://example.com/`.
///
/// Patterns are compiled with the `regex` crate. A brace that does not form a
/// `{n}`, `{n,}` or `{n,m}` quantifier is taken literally, as browsers do for
/// the same text. Look-around and backreferences have no equivalent and make
/// the pattern invalid.
use regex::{Regex, RegexBuilder};

/// Translate a user match pattern into regex source (unanchored).
pub fn to_regex_source(pattern: &str) -> String {
    pattern.replace('.', r"\.").replace('*', ".*")
}

/// Length of the quantifier body at the start of `rest` (after a `{`),
/// including the closing brace, if it is one.
fn quantifier_len(rest: &str) -> Option<usize> {
    let close = rest.find('}')?;
    let body = &rest[..close];
    let (min, max) = body.split_once(',').unwrap_or((body, ""));
    let digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());

    if !min.is_empty() && digits(min) && digits(max) {
        Some(close + 1)
    } else {
        None
    }
}

/// Escape braces that are not part of a quantifier
fn escape_literal_braces(source: &str) -> String {
    let mut escaped = String::with_capacity(source.len());
    let mut chars = source.char_indices();

    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                escaped.push(c);
                if let Some((_, next)) = chars.next() {
                    escaped.push(next);
                }
            }
            '{' => match quantifier_len(&source[i + 1..]) {
                Some(len) => {
                    escaped.push_str(&source[i..i + 1 + len]);
                    // Skip the body and closing brace (all ASCII)
                    for _ in 0..len {
                        chars.next();
                    }
                }
                None => escaped.push_str(r"\{"),
            },
            '}' => escaped.push_str(r"\}"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Compile one regex-ready pattern, anchored at both ends and case-insensitive.
/// Returns None when the pattern is not a valid expression.
fn compile_anchored(source: &str) -> Option<Regex> {
    match RegexBuilder::new(&format!("^{}$", escape_literal_braces(source)))
        .case_insensitive(true)
        .build()
    {
        Ok(regex) => Some(regex),
        Err(e) => {
            log::debug!("Ignoring invalid match pattern {:?}: {}", source, e);
            None
        }
    }
}

/// A script's compiled match patterns
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    regexes: Vec<Regex>,
}

impl PatternSet {
    /// Compile regex-ready patterns (as stored in `ScriptRecord::matches`).
    /// Invalid ones are dropped, which makes them non-matches.
    pub fn compile<S: AsRef<str>>(patterns: &[S]) -> PatternSet {
        PatternSet {
            regexes: patterns
                .iter()
                .filter_map(|p| compile_anchored(p.as_ref()))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.regexes.is_empty()
    }

    /// True if any pattern matches the whole URL
    pub fn matches(&self, url: &str) -> bool {
        self.regexes.iter().any(|regex| regex.is_match(url))
    }
}

/// Check a URL against stored patterns. An empty set never matches.
pub fn matches_url<S: AsRef<str>>(url: &str, patterns: &[S]) -> bool {
    if patterns.is_empty() {
        return false;
    }
    PatternSet::compile(patterns).matches(url)
}
