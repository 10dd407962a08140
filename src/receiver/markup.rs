use std::{collections::HashSet, sync::OnceLock};

use regex::{Captures, Regex};

/// Tags kept in record bodies when nothing else is configured.
pub const DEFAULT_ALLOWED_TAGS: &[&str] = &[
    "a",
    "abbr",
    "b",
    "blockquote",
    "br",
    "code",
    "del",
    "em",
    "i",
    "li",
    "ol",
    "p",
    "pre",
    "q",
    "s",
    "strike",
    "strong",
    "ul",
];

const ALLOWED_SCHEMES: &[&str] = &["http://", "https://", "mailto:"];

/// Removes anything that looks like a tag, including an unterminated one at the
/// end of the input.
pub fn strip_tags(text: &str) -> String {
    static TAG: OnceLock<Regex> = OnceLock::new();
    let tag = TAG.get_or_init(|| Regex::new(r"<[^>]*(>|$)").expect("tag regex is valid"));
    tag.replace_all(text, "").into_owned()
}

/// Reduces markup to an allowed subset of tags.
///
/// Allowed tags lose all their attributes, except for a safe `href` on links.
/// Other tags are dropped but their text is kept, and angle brackets that
/// aren't part of a tag are escaped.
#[derive(Debug, Clone)]
pub struct Sanitizer {
    allowed: HashSet<String>,
    tag: Regex,
    href: Regex,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOWED_TAGS.iter().copied())
    }
}

impl Sanitizer {
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed: allowed
                .into_iter()
                .map(|tag| tag.as_ref().to_ascii_lowercase())
                .collect(),
            tag: Regex::new(r"<(/?)([A-Za-z][A-Za-z0-9]*)([^<>]*)>").expect("tag regex is valid"),
            href: Regex::new(r#"(?i)\bhref\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
                .expect("href regex is valid"),
        }
    }

    pub fn sanitize(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;

        for caps in self.tag.captures_iter(text) {
            let whole = caps.get(0).expect("group 0 always matches");
            escape_brackets(&text[last..whole.start()], &mut out);
            self.rewrite_tag(&caps, &mut out);
            last = whole.end();
        }
        escape_brackets(&text[last..], &mut out);

        out
    }

    fn rewrite_tag(&self, caps: &Captures<'_>, out: &mut String) {
        let name = caps[2].to_ascii_lowercase();
        if !self.allowed.contains(&name) {
            return;
        }

        if !caps[1].is_empty() {
            out.push_str(&format!("</{}>", name));
            return;
        }

        let href = (name == "a")
            .then(|| self.href.captures(&caps[3]))
            .flatten()
            .and_then(|href| href.get(1).or_else(|| href.get(2)))
            .map(|href| href.as_str().trim())
            .filter(|href| {
                let lower = href.to_ascii_lowercase();
                !href.contains('"') && ALLOWED_SCHEMES.iter().any(|scheme| lower.starts_with(scheme))
            });

        match href {
            Some(href) => out.push_str(&format!(r#"<a href="{}">"#, href)),
            None => out.push_str(&format!("<{}>", name)),
        }
    }
}

fn escape_brackets(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}
