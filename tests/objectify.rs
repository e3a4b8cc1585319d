use std::collections::HashMap;

use mithril_objectify_swc_plugin::{
    interp::Interpreter,
    source::{parse_expr, parse_program, print_program},
    transform_source,
    value::Value,
    Config,
};

fn transform(src: &str) -> String {
    transform_with(src, Config::default())
}

fn transform_with(src: &str, config: Config) -> String {
    transform_source(src, config).unwrap()
}

fn normalized(src: &str) -> String {
    print_program(&parse_program(src).unwrap())
}

/// Objectify a single expression statement and hand back the printed result
/// without its trailing semicolon.
fn objectify_expr(src: &str) -> String {
    objectify_expr_with(src, Config::default())
}

fn objectify_expr_with(src: &str, config: Config) -> String {
    let out = transform_with(&format!("({src});"), config);
    out.trim().trim_end_matches(';').to_string()
}

fn eval(src: &str, globals: &[(&str, Value)]) -> Value {
    let config = Config::default();
    let globals: HashMap<String, Value> = globals
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    let expr = parse_expr(src).unwrap();
    Interpreter::new(&config)
        .with_globals(globals)
        .eval(&expr)
        .unwrap()
}

/// The literal and the call it replaced build the same vnode.
fn assert_equivalent(src: &str, globals: &[(&str, Value)]) {
    let out = objectify_expr(src);
    assert!(!out.contains("m("), "not objectified: {out}");
    let expected = eval(src, globals);
    let actual = eval(&out, globals);
    assert!(
        actual.deep_eq(&expected),
        "{src} => {out}\nexpected {expected:?}\nactual {actual:?}"
    );
}

fn object(pairs: &[(&str, Value)]) -> Value {
    Value::Object(pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect())
}

// ---------- concrete scenarios ----------

#[test]
fn id_only_selector() {
    let out = objectify_expr("m('#fooga')");
    assert_eq!(
        out,
        r#"({tag:"div",key:undefined,attrs:{id:"fooga"},children:[],text:undefined,dom:undefined,domSize:undefined,state:{},events:undefined,instance:undefined,skip:false})"#
    );
}

#[test]
fn concatenated_literal_selector() {
    assert_eq!(
        objectify_expr("m('input' + '.pure-u')"),
        objectify_expr("m('input.pure-u')")
    );
    let out = objectify_expr("m('input' + '.pure-u')");
    assert!(out.contains(r#"tag:"input""#), "{out}");
    assert!(out.contains(r#"className:"pure-u""#), "{out}");
}

#[test]
fn dynamic_attribute_value_is_kept() {
    let out = objectify_expr("m('div', {fooga: unknownIdentifier})");
    assert!(out.starts_with(r#"({tag:"div""#), "{out}");
    assert!(out.contains("attrs:{fooga:unknownIdentifier}"), "{out}");
    assert_equivalent(
        "m('div', {fooga: unknownIdentifier})",
        &[("unknownIdentifier", Value::str("value"))],
    );
}

#[test]
fn selector_concatenated_with_identifier_is_untouched() {
    let src = "m('.fooga' + identifier);";
    assert_eq!(transform(src), normalized(src));
}

#[test]
fn json_stringify_child_is_kept() {
    let out = objectify_expr("m('div', JSON.stringify(unknownIdentifier))");
    assert!(out.starts_with(r#"({tag:"div""#), "{out}");
    assert!(out.contains("JSON.stringify(unknownIdentifier)"), "{out}");
    assert_equivalent(
        "m('div', JSON.stringify(unknownIdentifier))",
        &[("unknownIdentifier", object(&[("a", Value::Num(1.0))]))],
    );
}

#[test]
fn uppercase_component_tag() {
    let out = objectify_expr("m(Component, {x: 1})");
    assert!(out.starts_with("({tag:Component,"), "{out}");
    assert!(out.contains("attrs:{x:1}"), "{out}");
}

#[test]
fn bare_component() {
    let out = objectify_expr("m(Component)");
    assert!(out.starts_with("({tag:Component,"), "{out}");
    assert!(out.contains("attrs:{},children:[]"), "{out}");
}

#[test]
fn empty_selector() {
    let out = objectify_expr("m('')");
    assert_eq!(
        out,
        r#"({tag:"div",key:undefined,attrs:undefined,children:[],text:undefined,dom:undefined,domSize:undefined,state:{},events:undefined,instance:undefined,skip:false})"#
    );
}

#[test]
fn conditional_text_child() {
    let src = "m('div', foo ? 'bar' : 'baz')";
    let out = objectify_expr(src);
    assert!(out.contains(r#"text:foo?"bar":"baz""#), "{out}");
    assert_equivalent(src, &[("foo", Value::Bool(true))]);
    assert_equivalent(src, &[("foo", Value::Bool(false))]);
}

#[test]
fn json_stringify_next_to_unknown_child_is_untouched() {
    let src = "m('div', JSON.stringify(u), x);";
    assert_eq!(transform(src), normalized(src));
}

#[test]
fn json_stringify_in_nested_call() {
    let src = "m('pre', m('code', JSON.stringify(u)))";
    let out = objectify_expr(src);
    assert!(out.contains(r#"tag:"pre""#), "{out}");
    assert!(out.contains(r#"tag:"code""#), "{out}");
    assert!(out.contains("text:JSON.stringify(u)"), "{out}");
    assert_equivalent(src, &[("u", object(&[("a", Value::Num(1.0))]))]);
}

#[test]
fn string_builtins_follow_their_arguments() {
    let cases = [
        ("m('div', 'a,b,c'.split(',', 1))", r#"text:"a""#),
        ("m('div', 'aba'.indexOf('a', 1))", "text:2"),
        ("m('div', [1, 2, 1].indexOf(1, 1))", "text:2"),
        ("m('div', 'abc'.startsWith('b', 1))", "text:true"),
        ("m('div', 'x-y'.replace('-', '[$&]'))", r#"text:"x[-]y""#),
    ];
    for (src, text) in cases {
        let out = objectify_expr(src);
        assert!(out.contains(text), "{src} => {out}");
        assert_equivalent(src, &[]);
    }
}

#[test]
fn computed_method_calls() {
    let out = objectify_expr("m('div', 'fooga'['replace']('f', 'g'))");
    assert!(out.contains(r#"text:"googa""#), "{out}");
    let out = objectify_expr("m('div', [1, 2]['join'](''))");
    assert!(out.contains(r#"text:"12""#), "{out}");

    let src = "m('div', [x, 2]['join'](''));";
    assert_eq!(transform(src), normalized(src));
}

#[test]
fn oversized_strings_are_left_alone() {
    let src = "var a = m('div', 'x'.repeat(1e6).repeat(1e6));";
    assert_eq!(transform(src), normalized(src));
}

// ---------- properties ----------

#[test]
fn idempotent() {
    let src = "var a = m('div', {fooga: x}), b = m('.fooga' + y), c = m('p', 'hi');";
    let once = transform(src);
    assert_eq!(transform(&once), once);
}

#[test]
fn deterministic() {
    let src = "m('a.b', {href: url, class: c ? 'on' : 'off'}, JSON.stringify(d));";
    assert_eq!(transform(src), transform(src));
}

#[test]
fn selector_equivalence() {
    let cases: &[(&str, &str, Value)] = &[
        ("span", "span", Value::Undefined),
        ("#a", "div", object(&[("id", Value::str("a"))])),
        (
            "a#b.c.d[href=/x]",
            "a",
            object(&[
                ("id", Value::str("b")),
                ("href", Value::str("/x")),
                ("className", Value::str("c d")),
            ]),
        ),
        (
            "input[type=checkbox][checked]",
            "input",
            object(&[("type", Value::str("checkbox")), ("checked", Value::Bool(true))]),
        ),
    ];
    for (selector, tag, attrs) in cases {
        let out = objectify_expr(&format!("m({selector:?})"));
        let node = eval(&out, &[]);
        assert!(
            node.get("tag").unwrap().deep_eq(&Value::str(*tag)),
            "{selector}: {out}"
        );
        assert!(node.get("attrs").unwrap().deep_eq(attrs), "{selector}: {out}");
    }
}

#[test]
fn selector_classes_come_first() {
    let out = objectify_expr("m('.a', {className: 'b'})");
    assert!(out.contains(r#"className:"a b""#), "{out}");
    let out = objectify_expr("m('.a', {class: 'b'})");
    assert!(out.contains(r#"class:"a b""#), "{out}");
}

#[test]
fn static_nested_calls() {
    let src = "m('ul', [m('li', 'a'), m('li.last', 'b')])";
    let out = objectify_expr(src);
    assert!(out.contains(r#"tag:"ul""#), "{out}");
    assert!(out.contains(r#"tag:"li""#), "{out}");
    assert_equivalent(src, &[]);
}

#[test]
fn dynamic_attrs_in_nested_call() {
    assert_equivalent("m('div', m('a', {href: url}))", &[("url", Value::str("/x"))]);
}

#[test]
fn only_static_children_are_converted() {
    let out = transform("var row = m('tr', m('th', 'Name'), m('td', obj.name));");
    assert!(out.contains(r#"row=m("tr",{tag:"th""#), "{out}");
    assert!(out.contains(r#"m("td",obj.name))"#), "{out}");
}

#[test]
fn unrelated_code_is_untouched() {
    for src in [
        "var a = [1, x].sort();",
        "var b = foo ? bar : 'baz';",
        "m('.fooga', identifier);",
        "var c = h('div');",
    ] {
        assert_eq!(transform(src), normalized(src), "{src}");
    }
}

#[test]
fn array_callbacks_are_evaluated() {
    let src = "m('ul', ['a', 'b'].map(function (s) { return m('li', s); }))";
    let out = objectify_expr(src);
    assert!(!out.contains("map"), "{out}");
    assert_equivalent(src, &[]);
}

#[test]
fn trusted_html_and_fragments() {
    assert_equivalent("m.trust('<b>x</b>')", &[]);
    assert_equivalent("m.fragment({key: 1}, [m('i'), 'text'])", &[]);
}

// ---------- configuration ----------

#[test]
fn object_assign_attrs() {
    let src = "m('span.a', Object.assign({title: 't'}, extra))";
    let stmt = format!("{src};");
    assert_eq!(transform(&stmt), normalized(&stmt));

    let config = Config {
        assign_never_component: true,
        ..Config::default()
    };
    let out = objectify_expr_with(src, config);
    assert!(out.contains("function(__mobj_attrs__)"), "{out}");
    assert!(out.contains(r#"tag:"span""#), "{out}");
    assert!(out.contains("attrs:__mobj_attrs__"), "{out}");
    assert!(
        out.contains(r#"Object.assign({title:"t"},extra,{className:"a"})"#),
        "{out}"
    );

    let globals = [("extra", object(&[("id", Value::str("q"))]))];
    let expected = eval(src, &globals);
    let actual = eval(&out, &globals);
    assert!(actual.deep_eq(&expected), "{out}");
}

#[test]
fn object_assign_onto_unknown_target_is_untouched() {
    let config = Config {
        assign_never_component: true,
        ..Config::default()
    };
    let src = "m('span', Object.assign(x, y));";
    assert_eq!(transform_with(src, config), normalized(src));
}

#[test]
fn nested_placeholders_splice_at_default_repeat_limit() {
    let src = "var a = m('div', {title: 'x' + JSON.stringify(y)});";
    let out = transform(src);
    assert!(out.contains(r#"title:"x"+JSON.stringify(y)"#), "{out}");
    assert!(!out.contains("m("), "{out}");
    assert!(!out.contains("__mobj_"), "{out}");

    let config = Config {
        repeat_limit: 3,
        ..Config::default()
    };
    assert_eq!(transform_with(src, config), out);
}

#[test]
fn config_from_plugin_json() {
    let config = Config::from_json(r#"{"repeatLimit": 3, "assignNeverComponent": true}"#);
    assert_eq!(config.repeat_limit, 3);
    assert!(config.assign_never_component);
}
