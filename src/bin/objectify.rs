use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use mithril_objectify_swc_plugin::{transform_source, Config};

/// Rewrite hyperscript calls in a JavaScript file into vnode literals.
#[derive(Parser, Debug)]
#[command(author, version)]
struct Args {
    input: PathBuf,
    output: Option<PathBuf>,
    /// Splice passes allowed per call site
    #[arg(long)]
    repeat_limit: Option<u64>,
    /// Treat `Object.assign(...)` as attributes, never as a component
    #[arg(long)]
    assign_never_component: bool,
    /// Name of the hyperscript function
    #[arg(long)]
    pragma: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = Config::default();
    if let Some(limit) = args.repeat_limit {
        config.repeat_limit = limit.max(1);
    }
    config.assign_never_component = args.assign_never_component;
    if let Some(pragma) = args.pragma {
        config.pragma = pragma;
    }

    let src = fs::read_to_string(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let out = transform_source(&src, config)
        .with_context(|| format!("transforming {}", args.input.display()))?;

    match args.output {
        Some(path) => {
            fs::write(&path, out).with_context(|| format!("writing {}", path.display()))?;
            println!("Wrote {}", path.display());
        }
        None => println!("{out}"),
    }
    Ok(())
}
