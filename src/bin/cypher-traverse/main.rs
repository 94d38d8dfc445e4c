//! Command-line front end for the Cypher to Gremlin translator.
#![forbid(unsafe_code)]

mod ui;

use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use cypher_traverse::{
    ast::Query,
    flavor::Pass,
    ErrorWithCode, FlavorName, Registry, TargetFormat, Translator, TranslatorConfig,
    TranslatorFlavor,
};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use ui::{ColorChoice, Ui};

#[derive(Parser, Debug)]
#[command(
    name = "cypher-traverse",
    version,
    about = "Translate Cypher query ASTs into Gremlin traversals",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        value_name = "FILE",
        env = "CYPHER_TRAVERSE_CONFIG",
        help = "Config file (defaults to <config dir>/cypher-traverse/config.toml)"
    )]
    config: Option<PathBuf>,

    #[arg(long, global = true, value_enum, default_value_t = ColorChoice::Auto, help = "Colorize output")]
    color: ColorChoice,

    #[arg(short, long, global = true, help = "Log debug output to stderr")]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Translate a JSON-encoded query AST.
    Translate {
        #[arg(value_name = "AST", default_value = "-", help = "AST file, or - for stdin")]
        input: String,

        #[arg(long, value_enum, help = "Target flavor (overrides config)")]
        flavor: Option<FlavorName>,

        #[arg(long, value_enum, help = "Output format (overrides config)")]
        format: Option<TargetFormat>,

        #[arg(long, help = "Print the program fingerprint after the program")]
        fingerprint: bool,

        #[arg(long, help = "Print the output columns after the program")]
        columns: bool,
    },
    /// List built-in flavors and their passes.
    Flavors,
    /// List registered custom predicates and functions.
    Functions,
    /// Print a shell completion script.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error("failed to read {path}: {source}")]
    Read { path: String, source: io::Error },
    #[error("invalid query AST: {0}")]
    Ast(#[from] serde_json::Error),
    #[error("{}", ErrorWithCode(.0))]
    Translate(#[from] cypher_traverse::Error),
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let ui = Ui::new(cli.color);
    if let Err(err) = run(cli, &ui) {
        ui.error(&err.to_string());
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli, ui: &Ui) -> Result<(), CliError> {
    match cli.command {
        Command::Translate {
            input,
            flavor,
            format,
            fingerprint,
            columns,
        } => {
            let mut config = TranslatorConfig::load(cli.config)
                .map_err(|err| CliError::Translate(err.into()))?;
            if let Some(flavor) = flavor {
                config.flavor = flavor;
            }
            if let Some(format) = format {
                config.format = format;
            }
            let query: Query = serde_json::from_str(&read_input(&input)?)?;
            let translation = Translator::from_config(&config)
                .translate(&query)
                .map_err(CliError::Translate)?;
            let rendered = translation
                .program
                .render()
                .map_err(|err| CliError::Translate(err.into()))?;
            println!("{rendered}");
            if fingerprint {
                println!("fingerprint: {:016x}", translation.program.fingerprint());
            }
            if columns {
                let names: Vec<String> = translation
                    .columns
                    .iter()
                    .map(|c| format!("{} ({:?})", c.name, c.kind))
                    .collect();
                println!("columns: {}", names.join(", "));
            }
        }
        Command::Flavors => {
            for name in FlavorName::ALL {
                let flavor = TranslatorFlavor::named(name);
                ui.section(
                    name.as_str(),
                    [
                        ("description", name.describe().to_owned()),
                        ("statement passes", pass_names(&flavor.statement_passes)),
                        ("traversal passes", pass_names(&flavor.traversal_passes)),
                    ],
                );
            }
        }
        Command::Functions => {
            let registry = Registry::standard();
            ui.list(
                "predicates",
                registry
                    .predicates()
                    .iter()
                    .map(|p| format!("{} -> {} (arity {})", p.name, p.symbol, p.arity)),
            );
            ui.list(
                "functions",
                registry
                    .functions()
                    .iter()
                    .map(|f| format!("{} -> {} ({:?})", f.name, f.symbol, f.output)),
            );
        }
        Command::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "cypher-traverse", &mut io::stdout());
        }
    }
    Ok(())
}

fn read_input(input: &str) -> Result<String, CliError> {
    if input == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .map_err(|source| CliError::Read {
                path: "stdin".into(),
                source,
            })?;
        return Ok(buf);
    }
    fs::read_to_string(input).map_err(|source| CliError::Read {
        path: input.to_owned(),
        source,
    })
}

fn pass_names(passes: &[Pass]) -> String {
    if passes.is_empty() {
        return "(none)".to_owned();
    }
    passes.iter().map(Pass::name).collect::<Vec<_>>().join(", ")
}
