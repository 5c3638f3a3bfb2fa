//! Strips inline caption markup (`<c.color>`, `<v Speaker>`, karaoke
//! timestamps like `<00:00:01.000>`) and resolves the handful of entities
//! WebVTT escapes.

use std::sync::LazyLock;

use regex::Regex;

static TAG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^<>]*>").expect("tag pattern compiles"));

const ENTITIES: [(&str, &str); 4] = [
    ("&nbsp;", " "),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&amp;", "&"),
];

/// Produces plain caption text.
///
/// A single pass can expose new markup (`&lt;b&gt;` decodes to `<b>`), so the
/// pass repeats until the text stops changing. Every pass that changes the
/// text makes it strictly shorter, which bounds the loop and makes the
/// result a fixed point: `sanitize(sanitize(x)) == sanitize(x)`.
pub fn sanitize(raw: &str) -> String {
    let mut current = raw.to_owned();
    loop {
        let next = sanitize_once(&current);
        if next == current {
            return next;
        }
        current = next;
    }
}

fn sanitize_once(raw: &str) -> String {
    let stripped = TAG_PATTERN.replace_all(raw, "");
    let mut text = stripped.into_owned();
    for (entity, literal) in ENTITIES {
        if text.contains(entity) {
            text = text.replace(entity, literal);
        }
    }
    text.trim().to_owned()
}
