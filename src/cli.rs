use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(
    name = "bibdex",
    version,
    about = "Personal bibliographic document index"
)]
pub struct Cli {
    /// Database root directory (default: BIBDEX_ROOT or the XDG data dir)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log warnings and errors only
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create a new database under the root directory
    Init {
        /// Initialize even if the root directory is not empty
        #[arg(long)]
        force: bool,
    },
    /// Add a document from a file, a source id, or a record file
    Add {
        /// Document file to attach
        #[arg(long)]
        file: Option<PathBuf>,
        /// Source URL or name:id string
        #[arg(long)]
        source: Option<String>,
        /// JSON bibliographic record file
        #[arg(long)]
        bib: Option<PathBuf>,
        /// Tag to apply (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Search the database
    Search(SearchArgs),
    /// Count documents matching a query
    Count {
        /// Query string (defaults to all documents)
        query: Vec<String>,
    },
    /// List all tags in the database
    Tags,
    /// List available source plugins
    Sources,
    /// Import a JSON array of bibliographic records
    Import {
        /// Path to the record file
        file: PathBuf,
        /// Tag to apply to every imported document (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Rebuild the index from the document directories
    Restore,
    /// Permanently delete a document and its files
    Purge { docid: u64 },
}

#[derive(Debug, clap::Args)]
pub struct SearchArgs {
    /// Query string ('*' matches everything)
    pub query: Vec<String>,

    /// Result ordering: relevance or year
    #[arg(long, default_value = "relevance")]
    pub sort: String,

    /// Maximum number of results
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,

    /// What to print per match
    #[arg(long, value_enum, default_value_t = OutputFormat::Summary)]
    pub output: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One summary line per document
    Summary,
    /// Full paths of document files
    Files,
    /// Bibliographic keys
    Keys,
    /// Distinct tags across the matched documents
    Tags,
    /// Distinct source ids across the matched documents
    Sources,
}
