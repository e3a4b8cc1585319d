use indexmap::IndexMap;

use crate::error::{EvalError, EvalResult};
use crate::literal::{concat_expr, str_expr};
use crate::selector::Selector;
use crate::value::{Opaque, OpaqueKind, Value};

/// The reserved class key for one call: `class` when the explicit attrs spell
/// it that way, the configured key otherwise.
pub fn class_key_for(explicit: Option<&IndexMap<String, Value>>, default: &str) -> String {
    match explicit {
        Some(attrs) if attrs.contains_key("class") => "class".to_string(),
        _ => default.to_string(),
    }
}

/// Merge selector-derived attributes with the explicit attrs object.
///
/// Selector attributes come first, explicit ones override. The class entry
/// is concatenated instead: selector classes, one space, explicit value.
pub fn merge(
    selector: &Selector,
    explicit: &IndexMap<String, Value>,
    class_key: &str,
) -> EvalResult<IndexMap<String, Value>> {
    let mut out = selector.to_attrs(class_key);
    let existing = selector.class_string();

    for (key, value) in explicit {
        let Some(existing) = existing.as_deref().filter(|_| key == class_key) else {
            out.insert(key.clone(), value.clone());
            continue;
        };

        match value {
            Value::Str(s) if s.is_empty() => {}
            Value::Undefined | Value::Null => {}
            Value::Str(_) | Value::Num(_) | Value::Bool(_) => {
                let merged = format!("{existing} {}", value.to_js_string()?);
                out.insert(key.clone(), Value::Str(merged));
            }
            Value::Opaque(o) if o.kind != OpaqueKind::Attrs => {
                // joined at runtime: "<selector classes> " + <expr>
                let expr = concat_expr(str_expr(&format!("{existing} ")), o.expr.clone());
                out.insert(
                    key.clone(),
                    Value::Opaque(Opaque {
                        kind: OpaqueKind::Str,
                        token: o.token.clone(),
                        expr,
                    }),
                );
            }
            other => {
                return Err(EvalError::Unsupported(format!(
                    "merging a {} class value",
                    other.type_of().unwrap_or("dynamic")
                )))
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::literal::ident_expr;
    use crate::selector::parse;

    fn explicit(pairs: Vec<(&str, Value)>) -> IndexMap<String, Value> {
        pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    #[test]
    fn selector_first_then_explicit() {
        let out = merge(
            &parse("div[a=b]"),
            &explicit(vec![("fooga", Value::Num(1.0)), ("a", Value::str("c"))]),
            "className",
        )
        .unwrap();
        let keys: Vec<_> = out.keys().cloned().collect();
        assert_eq!(keys, vec!["a", "fooga"]);
        assert!(out["a"].deep_eq(&Value::str("c")));
    }

    #[test]
    fn literal_classes_concatenate() {
        let out = merge(
            &parse(".a.b"),
            &explicit(vec![("className", Value::str("c"))]),
            "className",
        )
        .unwrap();
        assert!(out["className"].deep_eq(&Value::str("a b c")));
    }

    #[test]
    fn empty_explicit_class_is_skipped() {
        let out = merge(
            &parse(".a"),
            &explicit(vec![("className", Value::str(""))]),
            "className",
        )
        .unwrap();
        assert!(out["className"].deep_eq(&Value::str("a")));
    }

    #[test]
    fn explicit_class_without_selector_classes_is_verbatim() {
        let out = merge(
            &parse("div"),
            &explicit(vec![("class", Value::str("x"))]),
            "class",
        )
        .unwrap();
        assert!(out["class"].deep_eq(&Value::str("x")));
    }

    #[test]
    fn dynamic_class_builds_a_concatenation() {
        let dynamic = Value::Opaque(Opaque {
            kind: OpaqueKind::Any,
            token: "t".into(),
            expr: ident_expr("t"),
        });
        let attrs = explicit(vec![("className", dynamic)]);
        let out = merge(&parse(".a"), &attrs, "className").unwrap();
        match &out["className"] {
            Value::Opaque(o) => assert_eq!(o.kind, OpaqueKind::Str),
            other => panic!("expected opaque, got {other:?}"),
        }
    }

    #[test]
    fn class_key_follows_explicit_spelling() {
        let attrs = explicit(vec![("class", Value::str("x"))]);
        assert_eq!(class_key_for(Some(&attrs), "className"), "class");
        assert_eq!(class_key_for(None, "className"), "className");
    }
}
