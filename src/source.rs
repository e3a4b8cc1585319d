use anyhow::{anyhow, Result};
use swc_core::{
    common::{sync::Lrc, FileName, SourceMap},
    ecma::{
        ast::{EsVersion, Expr, Program},
        codegen::{text_writer::JsWriter, Emitter, Node},
        parser::{lexer::Lexer, EsSyntax, PResult, Parser, StringInput, Syntax},
        visit::VisitMutWith,
    },
};

use crate::{config::Config, ObjectifyTransform};

fn syntax() -> Syntax {
    Syntax::Es(EsSyntax {
        jsx: true,
        ..Default::default()
    })
}

fn parse_with<T>(
    name: &str,
    src: &str,
    f: impl FnOnce(&mut Parser<Lexer<'_>>) -> PResult<T>,
) -> Result<T> {
    let cm: Lrc<SourceMap> = Default::default();
    let fm = cm.new_source_file(FileName::Custom(name.into()).into(), src.to_string());
    let lexer = Lexer::new(syntax(), EsVersion::latest(), StringInput::from(&*fm), None);
    let mut parser = Parser::new_from(lexer);
    let out = f(&mut parser).map_err(|e| anyhow!("{name}: parse error: {:?}", e.kind()))?;
    if let Some(e) = parser.take_errors().into_iter().next() {
        return Err(anyhow!("{name}: parse error: {:?}", e.kind()));
    }
    Ok(out)
}

pub fn parse_program(src: &str) -> Result<Program> {
    parse_with("input.js", src, |p| p.parse_program())
}

pub fn parse_expr(src: &str) -> Result<Box<Expr>> {
    parse_with("expr.js", src, |p| p.parse_expr())
}

fn print<N: Node>(node: &N) -> String {
    let cm: Lrc<SourceMap> = Default::default();
    let mut buf = vec![];
    {
        let mut emitter = Emitter {
            cfg: swc_core::ecma::codegen::Config::default().with_minify(true),
            cm: cm.clone(),
            comments: None,
            wr: JsWriter::new(cm.clone(), "\n", &mut buf, None),
        };
        // writing into a Vec cannot fail
        let _ = node.emit_with(&mut emitter);
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Compact, deterministic rendering of a program.
pub fn print_program(program: &Program) -> String {
    print(program)
}

pub fn print_expr(expr: &Expr) -> String {
    print(expr)
}

/// Parse, objectify and print one source text.
pub fn transform_source(src: &str, config: Config) -> Result<String> {
    let mut program = parse_program(src)?;
    program.visit_mut_with(&mut ObjectifyTransform::new(config));
    Ok(print_program(&program))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_compactly() {
        let printed = print_program(&parse_program("var a = { b: [1, 2] };\n").unwrap());
        assert!(printed.contains("{b:[1,2]}"), "{printed}");
        assert_eq!(print_program(&parse_program(&printed).unwrap()), printed);
    }

    #[test]
    fn parses_jsx() {
        assert!(parse_program("const x = <div />;").is_ok());
    }

    #[test]
    fn parse_errors_are_reported() {
        assert!(parse_program("var = ;").is_err());
        assert!(parse_expr("m(").is_err());
    }
}
