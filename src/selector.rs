use indexmap::IndexMap;
use regex::Regex;
use std::sync::LazyLock;

use crate::value::Value;

pub const DEFAULT_TAG: &str = "div";

// `tag`, `#id`, `.class` or `[name]`, `[name=value]`, `[name="value"]`, `[name='value']`
static SELECTOR_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?:(^|#|\.)([^#.\[\]]+))|(\[(.+?)(?:\s*=\s*(?:"((?:\\["'\]]|.)*?)"|'((?:\\["'\]]|.)*?)'|((?:\\["'\]]|.)*?)))?\])"#,
    )
    .expect("selector regex")
});

/// Parsed form of a selector string. Lives only until it is merged into the
/// attrs of one vnode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    pub tag: String,
    pub id: Option<String>,
    pub classes: Vec<String>,
    /// Bracket attributes in encounter order. `None` is a bare `[name]`.
    pub attrs: IndexMap<String, Option<String>>,
}

impl Default for Selector {
    fn default() -> Self {
        Self {
            tag: DEFAULT_TAG.to_string(),
            id: None,
            classes: vec![],
            attrs: IndexMap::new(),
        }
    }
}

impl Selector {
    pub fn class_string(&self) -> Option<String> {
        if self.classes.is_empty() {
            None
        } else {
            Some(self.classes.join(" "))
        }
    }

    /// Attribute mapping derived from the selector: id, bracket attributes,
    /// then the joined class string under `class_key`.
    pub fn to_attrs(&self, class_key: &str) -> IndexMap<String, Value> {
        let mut out = IndexMap::new();
        if let Some(id) = &self.id {
            out.insert("id".to_string(), Value::str(id.clone()));
        }
        for (k, v) in &self.attrs {
            let value = match v {
                Some(v) => Value::str(v.clone()),
                None => Value::Bool(true),
            };
            out.insert(k.clone(), value);
        }
        if let Some(classes) = self.class_string() {
            out.insert(class_key.to_string(), Value::Str(classes));
        }
        out
    }
}

pub fn parse(selector: &str) -> Selector {
    let mut out = Selector::default();

    for caps in SELECTOR_TOKEN.captures_iter(selector) {
        if let Some(value) = caps.get(2) {
            let value = value.as_str();
            match caps.get(1).map(|m| m.as_str()).unwrap_or("") {
                "#" => out.id = Some(value.to_string()),
                "." => out.classes.push(value.to_string()),
                _ => out.tag = value.to_string(),
            }
            continue;
        }

        let Some(name) = caps.get(4).map(|m| m.as_str().trim()) else {
            continue;
        };
        let value = caps
            .get(5)
            .or_else(|| caps.get(6))
            .or_else(|| caps.get(7))
            .map(|m| unescape(m.as_str()));

        if name == "class" || name == "className" {
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                out.classes.push(value);
            }
        } else {
            out.attrs.insert(name.to_string(), value);
        }
    }

    out
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.peek() {
                Some('"') | Some('\'') | Some('\\') => {
                    if let Some(next) = chars.next() {
                        out.push(next);
                    }
                    continue;
                }
                _ => {}
            }
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_selector_defaults_to_div() {
        let s = parse("");
        assert_eq!(s.tag, "div");
        assert_eq!(s.id, None);
        assert!(s.classes.is_empty());
        assert!(s.attrs.is_empty());
    }

    #[test]
    fn id_only() {
        let s = parse("#fooga");
        assert_eq!(s.tag, "div");
        assert_eq!(s.id.as_deref(), Some("fooga"));
    }

    #[test]
    fn last_id_wins() {
        assert_eq!(parse("#a#b").id.as_deref(), Some("b"));
    }

    #[test]
    fn tag_classes_in_order() {
        let s = parse("input.pure-u.pure-u-1-2");
        assert_eq!(s.tag, "input");
        assert_eq!(s.class_string().as_deref(), Some("pure-u pure-u-1-2"));
    }

    #[test]
    fn bracket_attributes() {
        let s = parse(r#"a.link[href="/x"][target='_blank'][wooga-booga=1][disabled]"#);
        assert_eq!(s.tag, "a");
        assert_eq!(s.attrs["href"].as_deref(), Some("/x"));
        assert_eq!(s.attrs["target"].as_deref(), Some("_blank"));
        assert_eq!(s.attrs["wooga-booga"].as_deref(), Some("1"));
        assert_eq!(s.attrs["disabled"], None);
        assert_eq!(parse("[value=]").attrs["value"].as_deref(), Some(""));
        assert!(parse("[disabled]").to_attrs("className")["disabled"].deep_eq(&Value::Bool(true)));
        let keys: Vec<_> = s.attrs.keys().cloned().collect();
        assert_eq!(keys, vec!["href", "target", "wooga-booga", "disabled"]);
    }

    #[test]
    fn escaped_quotes_are_unescaped() {
        let s = parse(r#"[title="say \"hi\""]"#);
        assert_eq!(s.attrs["title"].as_deref(), Some(r#"say "hi""#));
    }

    #[test]
    fn class_bracket_joins_class_list() {
        let s = parse(".a[class=b]");
        assert_eq!(s.class_string().as_deref(), Some("a b"));
        assert!(s.attrs.is_empty());
    }

    #[test]
    fn to_attrs_puts_classes_under_the_reserved_key() {
        let attrs = parse("#x.a.b[y=z]").to_attrs("className");
        let keys: Vec<_> = attrs.keys().cloned().collect();
        assert_eq!(keys, vec!["id", "y", "className"]);
        assert!(attrs["className"].deep_eq(&Value::str("a b")));
    }
}
