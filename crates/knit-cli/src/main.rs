//! Knit command-line bundler
//!
//! Bundles an entry module and everything it imports into one
//! self-executing script.

mod commands;
mod output;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use knit_bundler::{CachePolicy, Dialect};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use commands::ProjectArgs;
use output::{resolve_color_choice, StyledOutput};

#[derive(Parser)]
#[command(name = "knit")]
#[command(about = "Bundle script modules into a single self-executing file", long_about = None)]
#[command(version)]
struct Cli {
    /// Log resolution and transformation details
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Color output: auto, always, never
    #[arg(long, global = true)]
    color: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a bundle and write it to disk
    Bundle {
        #[command(flatten)]
        project: ProjectFlags,

        /// Output file (default: from knit.toml, else dist/bundle.js)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Module caching in the emitted runtime: per-import, shared
        #[arg(long)]
        cache: Option<CachePolicy>,
    },

    /// Print the module table as JSON
    Graph {
        #[command(flatten)]
        project: ProjectFlags,
    },
}

#[derive(Args)]
struct ProjectFlags {
    /// Entry module (default: bundle.entry from knit.toml)
    entry: Option<String>,

    /// Source dialect: default, typed-superset
    #[arg(long)]
    dialect: Option<Dialect>,

    /// Project root that module ids are relative to
    #[arg(long)]
    root: Option<PathBuf>,

    /// Path to knit.toml (default: searched upward from the current directory)
    #[arg(long)]
    config: Option<PathBuf>,
}

impl ProjectFlags {
    fn into_args(self) -> ProjectArgs {
        ProjectArgs {
            entry: self.entry,
            root: self.root,
            config: self.config,
            dialect: self.dialect,
            ..ProjectArgs::default()
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "knit=debug,knit_bundler=debug"
    } else {
        "knit=info,knit_bundler=info"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let mut out = StyledOutput::new(resolve_color_choice(cli.color.as_deref()));

    let result = match cli.command {
        Commands::Bundle {
            project,
            out: out_path,
            cache,
        } => {
            let args = ProjectArgs {
                out: out_path,
                cache,
                ..project.into_args()
            };
            commands::bundle::execute(args, &mut out)
        }
        Commands::Graph { project } => commands::graph::execute(project.into_args()),
    };

    if let Err(err) = result {
        out.stderr_error(&format!("{:#}", err));
        std::process::exit(1);
    }
}
