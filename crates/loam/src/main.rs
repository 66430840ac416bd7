use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand};
use loam_errors::{Diagnostic, Renderer};
use loam_parse::calc::{self, CalcGrammar};
use loam_parse::{
    BuildError, Builder, BuilderConfig, DEFAULT_DEPTH_LIMIT, Grammar as _, NodeId, ParseOutcome,
    SyntaxTree, expand_chameleon,
};
use loam_syntax::TreeEdit;
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "loam", about = "Builds and diffs syntax trees of calc files")]
struct Options {
    /// Log builder decisions. Overrides `LOAM_LOG`.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Prints the syntax tree of a file.
    Dump {
        path: Utf8PathBuf,
        /// Parse every lazy block and list.
        #[arg(long)]
        expand: bool,
        #[command(flatten)]
        build: BuildOptions,
    },
    /// Reparses `new` against the tree of `old` and prints the edits.
    Reparse {
        old: Utf8PathBuf,
        new: Utf8PathBuf,
        #[command(flatten)]
        build: BuildOptions,
    },
    /// Reports syntax errors.
    Check {
        path: Utf8PathBuf,
        #[command(flatten)]
        build: BuildOptions,
    },
}

#[derive(Args)]
struct BuildOptions {
    /// Record marker allocation sites and run the expensive protocol checks.
    #[arg(long)]
    debug_markers: bool,
    #[arg(long, default_value_t = DEFAULT_DEPTH_LIMIT)]
    depth_limit: usize,
}

impl BuildOptions {
    fn config(&self) -> BuilderConfig {
        BuilderConfig {
            debug_markers: self.debug_markers,
            depth_limit: self.depth_limit,
            ..BuilderConfig::default()
        }
    }
}

fn main() -> anyhow::Result<()> {
    let options = Options::parse();
    init_logging(options.verbose);

    match options.command {
        Command::Dump { path, expand, build } => {
            let config = build.config();
            let text = read(&path)?;
            let mut tree = parse(&path, &text, config.clone())?;
            if expand {
                expand_all(&mut tree, &config)?;
            }
            print!("{}", tree.debug_dump(|kind| CalcGrammar.kind_name(kind)));
            Ok(())
        }
        Command::Reparse { old, new, build } => {
            let config = build.config();
            let old_text = read(&old)?;
            let new_text = read(&new)?;
            let mut tree = parse(&old, &old_text, config.clone())?;

            let outcome = {
                let builder = Builder::with_config(&new_text, &CalcGrammar, config)
                    .map_err(|error| report(&new, &new_text, error))
                    .with_context(|| format!("failed to lex `{new}`"))?;
                let mut builder = builder.with_reparse(&tree, &old_text);
                calc::parse(&mut builder);
                builder
                    .tree_built()
                    .map_err(|error| report(&new, &new_text, error))
                    .with_context(|| format!("failed to reparse `{new}`"))?
            };
            match outcome {
                ParseOutcome::Built(fresh) => {
                    println!("full rebuild");
                    tree = fresh;
                }
                ParseOutcome::Reparsed(log) => {
                    println!("{} edits", log.len());
                    for edit in log.edits() {
                        println!("  {}", describe_edit(&tree, edit));
                    }
                    log.apply(&mut tree);
                }
            }
            print!("{}", tree.debug_dump(|kind| CalcGrammar.kind_name(kind)));
            Ok(())
        }
        Command::Check { path, build } => {
            let config = build.config();
            let text = read(&path)?;
            let mut tree = parse(&path, &text, config.clone())?;
            expand_all(&mut tree, &config)?;

            let renderer = Renderer::styled();
            let diagnostics = tree.errors();
            for diagnostic in &diagnostics {
                eprintln!("{}", diagnostic.render(&renderer, path.as_str(), &text));
            }
            if !diagnostics.is_empty() {
                anyhow::bail!("`{path}`: {} syntax error(s)", diagnostics.len());
            }
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("LOAM_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn read(path: &Utf8Path) -> anyhow::Result<String> {
    tracing::debug!(%path, "reading");
    std::fs::read_to_string(path).with_context(|| format!("failed to read `{path}`"))
}

fn parse(path: &Utf8Path, text: &str, config: BuilderConfig) -> anyhow::Result<SyntaxTree> {
    let mut builder = Builder::with_config(text, &CalcGrammar, config)
        .map_err(|error| report(path, text, error))
        .with_context(|| format!("failed to lex `{path}`"))?;
    calc::parse(&mut builder);
    builder
        .build_tree()
        .map_err(|error| report(path, text, error))
        .with_context(|| format!("failed to parse `{path}`"))
}

/// Shows where a fatal error happened when it is tied to a token.
fn report(path: &Utf8Path, text: &str, error: BuildError) -> BuildError {
    if let Some(diagnostic) = Diagnostic::fatal(&error) {
        eprintln!("{}", diagnostic.render(&Renderer::styled(), path.as_str(), text));
    }
    error
}

/// Expands lazy chameleons until none is left, nested ones included.
fn expand_all(tree: &mut SyntaxTree, config: &BuilderConfig) -> anyhow::Result<()> {
    loop {
        let mut pending = Vec::new();
        tree.preorder(tree.root(), |tree, node, _| {
            if tree.is_collapsed_chameleon(node) {
                pending.push(node);
            }
            true
        });

        let mut expanded = false;
        for node in pending {
            expanded |= expand_chameleon(tree, node, &CalcGrammar, config)
                .with_context(|| format!("failed to expand chameleon at {:?}", tree.range(node)))?;
        }
        if !expanded {
            return Ok(());
        }
    }
}

fn describe(tree: &SyntaxTree, node: NodeId) -> String {
    format!("{}@{:?}", CalcGrammar.kind_name(tree.kind(node)), tree.range(node))
}

fn describe_edit(tree: &SyntaxTree, edit: &TreeEdit) -> String {
    match edit {
        TreeEdit::Insert { parent, index, node } => {
            let kind = CalcGrammar.kind_name(node.kind(node.root()));
            let len = u32::from(node.text_len());
            format!("insert {kind} ({len} bytes) at {index} of {}", describe(tree, *parent))
        }
        TreeEdit::Delete { node, .. } => format!("delete {}", describe(tree, *node)),
        TreeEdit::Replace { old, new } => {
            let kind = CalcGrammar.kind_name(new.kind(new.root()));
            let len = u32::from(new.text_len());
            format!("replace {} with {kind} ({len} bytes)", describe(tree, *old))
        }
    }
}
