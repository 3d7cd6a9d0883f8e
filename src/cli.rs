use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "reibun")]
#[command(about = "Example-sentence corpus with ranked retrieval and source ingestion", long_about = None)]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file (JSON). Defaults apply when absent.
    #[arg(long, global = true)]
    pub(crate) config: Option<PathBuf>,

    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Create an empty corpus database (and its source ledger).
    Init { db: PathBuf },

    /// Retrieve ranked example sentences for one or more words.
    Get {
        db: PathBuf,
        /// Words to retrieve sentences for (space-separated).
        words: Vec<String>,
        /// Sentences per word.
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Pull new sentences from registered sources to cover shortfalls.
        #[arg(long)]
        produce: bool,
        /// Output JSON (full sentence rows).
        #[arg(long)]
        json: bool,
    },

    /// Count stored sentences containing each word.
    Count {
        db: PathBuf,
        words: Vec<String>,
        /// Only count sentences at or above this known-word ratio (0.0..=1.0).
        #[arg(long)]
        min_comprehension: Option<f64>,
    },

    /// Seed an empty corpus from a tab-separated sentence-pair file.
    Bootstrap {
        db: PathBuf,
        /// TSV file of `text<TAB>translation[<TAB>credit]` pairs.
        #[arg(short, long)]
        pairs: PathBuf,
        /// Source name recorded in the ledger.
        #[arg(long, default_value = "pairs-file")]
        source: String,
        /// License recorded in the ledger.
        #[arg(long, default_value = "unknown")]
        license: String,
    },

    /// Mark words as known and refresh per-sentence comprehension counts.
    Known {
        db: PathBuf,
        words: Vec<String>,
    },

    /// Print corpus statistics.
    Stats { db: PathBuf },

    /// List registered sources from the ledger.
    Sources { db: PathBuf },
}
