mod output;
mod query;
mod store;
mod utils;

use anyhow::Result;
use clap::{Parser, Subcommand};
use output::SearchOptions;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "qgd")]
#[command(about = "Source-code grep accelerator backed by a chunked, compressed store")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack a project tree into <project>.qgd
    Build {
        /// Project directory to pack
        project: PathBuf,
    },
    /// Search a packed project
    Search {
        /// Project directory (reads <project>.qgd)
        project: PathBuf,

        /// Regular expression to search for
        pattern: String,

        /// Case insensitive search
        #[arg(short = 'i', long)]
        ignore_case: bool,

        /// Treat the pattern as a literal string
        #[arg(short = 'l', long)]
        literal: bool,

        /// Visual Studio output format: path(line): match
        #[arg(long)]
        visual_studio: bool,

        /// Report 1-based column numbers
        #[arg(long)]
        column: bool,

        /// Color the matched span of each line
        #[arg(long)]
        highlight: bool,
    },
    /// Show statistics for a packed project
    Stats {
        /// Project directory (reads <project>.qgd)
        project: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { project } => {
            let stats = store::build_project(&project)?;
            println!(
                "{} chunks, {} files, {} -> {} bytes",
                stats.chunks, stats.files, stats.bytes_in, stats.bytes_out
            );
        }
        Commands::Search {
            project,
            pattern,
            ignore_case,
            literal,
            visual_studio,
            column,
            highlight,
        } => {
            let mut options = SearchOptions::new();
            if ignore_case {
                options = options.with(SearchOptions::IGNORE_CASE);
            }
            if literal {
                options = options.with(SearchOptions::LITERAL);
            }
            if visual_studio {
                options = options.with(SearchOptions::VISUAL_STUDIO);
            }
            if column {
                options = options.with(SearchOptions::COLUMN_NUMBER);
            }
            if highlight {
                options = options.with(SearchOptions::HIGHLIGHT);
            }

            query::search_project(&project, &pattern, options, std::io::stdout())?;
        }
        Commands::Stats { project } => {
            store::stats::show_stats(&project)?;
        }
    }

    Ok(())
}
