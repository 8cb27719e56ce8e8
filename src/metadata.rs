/// Userscript metadata header parsing
use crate::pattern::to_regex_source;
use crate::script_data::{DEFAULT_SCRIPT_NAME, MetaValue};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// The header block, delimiters included. Lazy match so only the first block counts.
static META_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)// ==UserScript==(.+?)// ==/UserScript==").expect("valid block regex")
});

/// A single `// @directive value` line
static META_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"// @(\S+)\s+(.+)").expect("valid line regex"));

/// Directives that would shadow record fields
const RESERVED_KEYS: [&str; 6] = ["id", "name", "code", "source", "enabled", "matches"];

/// Result of parsing a script's source text
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedScript {
    pub name: String,
    pub matches: Vec<String>,
    /// Source with the metadata block cut out
    pub code: String,
    /// Every directive, lowercased, including `name` and `match`
    pub directives: BTreeMap<String, MetaValue>,
}

impl ParsedScript {
    /// Directives that are not already represented by a record field
    pub fn extra_meta(&self) -> BTreeMap<String, MetaValue> {
        self.directives
            .iter()
            .filter(|(key, _)| !RESERVED_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

/// Parse the metadata header out of a script.
///
/// Never fails: a missing block gives the default name, no matches and the
/// source unchanged as code. Lines inside the block that don't look like
/// `// @directive value` are skipped.
///
/// Example:
/// ```text
/// // ==UserScript==
/// // @name   Hello
/// // @match  *://*.example.com/*
/// // ==/UserScript==
/// alert('hi');
/// ```
/// gives name "Hello", matches [".*://.*\.example\.com/.*"] and the code
/// "\nalert('hi');".
pub fn parse_script(source: &str) -> ParsedScript {
    let mut directives: BTreeMap<String, MetaValue> = BTreeMap::new();

    let code = match META_BLOCK.captures(source) {
        Some(caps) => {
            let body = caps.get(1).map_or("", |m| m.as_str());
            for line in body.split('\n') {
                if let Some(line_caps) = META_LINE.captures(line) {
                    let key = line_caps[1].to_lowercase();
                    let value = line_caps[2].trim().to_string();

                    match directives.get_mut(&key) {
                        Some(existing) => existing.push(value),
                        None => {
                            directives.insert(key, MetaValue::Single(value));
                        }
                    }
                }
            }

            let whole = caps.get(0).map_or(0..0, |m| m.range());
            format!("{}{}", &source[..whole.start], &source[whole.end..])
        }
        None => source.to_string(),
    };

    let name = directives
        .get("name")
        .and_then(MetaValue::first)
        .filter(|name| !name.is_empty())
        .unwrap_or(DEFAULT_SCRIPT_NAME)
        .to_string();

    let matches = directives
        .get("match")
        .map(|value| value.values().into_iter().map(to_regex_source).collect())
        .unwrap_or_default();

    ParsedScript {
        name,
        matches,
        code,
        directives,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = "// ==UserScript==\n\
// @name        Hello World\n\
// @namespace   http://example.com\n\
// @version     1.0\n\
// @match       *://*.example.com/*\n\
// ==/UserScript==\n\
\n\
console.log('hi');\n";

    #[test]
    fn test_parse_full_header() {
        let parsed = parse_script(SCRIPT);

        assert_eq!(parsed.name, "Hello World");
        assert_eq!(parsed.matches, vec![r".*://.*\.example\.com/.*".to_string()]);
        assert_eq!(parsed.code, "\n\nconsole.log('hi');\n");
        assert_eq!(
            parsed.directives.get("version"),
            Some(&MetaValue::Single("1.0".to_string()))
        );
    }

    #[test]
    fn test_code_has_no_block_lines() {
        let parsed = parse_script(SCRIPT);

        assert!(!parsed.code.contains("==UserScript=="));
        assert!(!parsed.code.contains("==/UserScript=="));
        assert!(!parsed.code.contains("@name"));
        assert!(!parsed.code.contains("@match"));
    }

    #[test]
    fn test_no_block_keeps_source() {
        let source = "// @name Not a header\nalert(1);";
        let parsed = parse_script(source);

        assert_eq!(parsed.code, source);
        assert_eq!(parsed.name, "Unnamed Script");
        assert!(parsed.matches.is_empty());
        assert!(parsed.directives.is_empty());
    }

    #[test]
    fn test_repeated_match_keeps_order() {
        let source = "// ==UserScript==\n// @match A.com/*\n// @match B.org\n// ==/UserScript==\n";
        let parsed = parse_script(source);

        assert_eq!(
            parsed.matches,
            vec![r"A\.com/.*".to_string(), r"B\.org".to_string()]
        );
        assert_eq!(
            parsed.directives.get("match"),
            Some(&MetaValue::Many(vec!["A.com/*".to_string(), "B.org".to_string()]))
        );
    }

    #[test]
    fn test_keys_lowercased_and_values_trimmed() {
        let source = "// ==UserScript==\n// @Name    Spaced Out   \r\n// @RUN-AT document-end\n// ==/UserScript==";
        let parsed = parse_script(source);

        assert_eq!(parsed.name, "Spaced Out");
        assert_eq!(
            parsed.directives.get("run-at"),
            Some(&MetaValue::Single("document-end".to_string()))
        );
    }

    #[test]
    fn test_malformed_lines_skipped() {
        let source = "// ==UserScript==\n// just a comment\n//@name nospace\n// @lonely\n// @name Real\n// ==/UserScript==\ncode();";
        let parsed = parse_script(source);

        assert_eq!(parsed.name, "Real");
        assert_eq!(parsed.directives.len(), 1);
        assert_eq!(parsed.code, "\ncode();");
    }

    #[test]
    fn test_only_first_block_honored() {
        let source = "// ==UserScript==\n// @name First\n// ==/UserScript==\nmid();\n// ==UserScript==\n// @name Second\n// ==/UserScript==\n";
        let parsed = parse_script(source);

        assert_eq!(parsed.name, "First");
        assert!(parsed.code.contains("@name Second"));
        assert!(parsed.code.starts_with("\nmid();"));
    }

    #[test]
    fn test_repeated_name_uses_first() {
        let source = "// ==UserScript==\n// @name One\n// @name Two\n// ==/UserScript==";
        let parsed = parse_script(source);

        assert_eq!(parsed.name, "One");
    }

    #[test]
    fn test_extra_meta_excludes_reserved() {
        let source = "// ==UserScript==\n// @name N\n// @id fake\n// @enabled false\n// @match x\n// @grant none\n// ==/UserScript==";
        let extra = parse_script(source).extra_meta();

        assert!(extra.contains_key("match"));
        assert!(extra.contains_key("grant"));
        assert!(!extra.contains_key("name"));
        assert!(!extra.contains_key("id"));
        assert!(!extra.contains_key("enabled"));
    }

    #[test]
    fn test_block_without_directives() {
        let source = "before// ==UserScript==\n\n// ==/UserScript==after";
        let parsed = parse_script(source);

        assert_eq!(parsed.code, "beforeafter");
        assert_eq!(parsed.name, "Unnamed Script");
    }
}
