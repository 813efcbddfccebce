use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use bibdex::{
    AddOptions, BibRecord, Database, Mode, PlainText, Sid, Sort, SourceRegistry,
    cli::{Cli, Command, OutputFormat, SearchArgs},
    error::{Error, Result},
};

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("BIBDEX_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

/// Resolve the database root from, in order of priority:
/// 1. An explicit path (from --root)
/// 2. The BIBDEX_ROOT environment variable
/// 3. The XDG data directory (~/.local/share/bibdex/)
fn resolve_root(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path);
    }
    if let Ok(val) = std::env::var("BIBDEX_ROOT") {
        return Ok(PathBuf::from(val));
    }
    xdg::BaseDirectories::with_prefix("bibdex")
        .get_data_home()
        .ok_or_else(|| std::io::Error::other("could not determine XDG data home directory").into())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let root = resolve_root(cli.root)?;
    let registry = SourceRegistry::builtin();

    match cli.command {
        Command::Init { force } => cmd_init(&root, &registry, force),
        Command::Add {
            file,
            source,
            bib,
            tags,
        } => cmd_add(&root, &registry, file, source, bib, tags),
        Command::Search(args) => cmd_search(&root, &registry, &args),
        Command::Count { query } => cmd_count(&root, &registry, &query),
        Command::Tags => cmd_tags(&root, &registry),
        Command::Sources => cmd_sources(&registry),
        Command::Import { file, tags } => cmd_import(&root, &registry, &file, &tags),
        Command::Restore => cmd_restore(&root, &registry),
        Command::Purge { docid } => cmd_purge(&root, &registry, docid),
    }
}

fn open(root: &Path, mode: Mode, registry: &SourceRegistry) -> Result<Database> {
    Database::open(root, mode, &registry.names())
}

fn cmd_init(root: &Path, registry: &SourceRegistry, force: bool) -> Result<()> {
    std::fs::create_dir_all(root)?;
    Database::create(root, force, &registry.names())?;
    println!("Initialized database at {}", root.display());
    Ok(())
}

fn cmd_add(
    root: &Path,
    registry: &SourceRegistry,
    file: Option<PathBuf>,
    source: Option<String>,
    bib: Option<PathBuf>,
    tags: Vec<String>,
) -> Result<()> {
    let record = bib.map(|path| BibRecord::from_file(&path)).transpose()?;

    let mut db = open(root, Mode::ReadWrite, registry)?;
    let docid = bibdex::add_item(
        &mut db,
        registry,
        &PlainText,
        AddOptions {
            file,
            source,
            record,
            tags,
        },
    )?;

    println!("id:{docid}");
    Ok(())
}

fn cmd_search(root: &Path, registry: &SourceRegistry, args: &SearchArgs) -> Result<()> {
    let query = join_query(&args.query);
    let sort: Sort = args.sort.parse()?;
    let db = open(root, Mode::ReadOnly, registry)?;

    // Whole-database term listings come straight from the term
    // dictionary, without materializing any documents.
    if query == "*" {
        match args.output {
            OutputFormat::Tags => {
                return print_lines(db.get_tags()?);
            }
            OutputFormat::Sources => {
                return print_lines(db.get_sids()?.iter().map(Sid::to_string));
            }
            OutputFormat::Keys => {
                return print_lines(db.term_iter("key")?);
            }
            _ => {}
        }
    }

    let docs = db.search(&query, sort, args.limit)?;

    let mut tags = BTreeSet::new();
    let mut sids = BTreeSet::new();
    for doc in docs {
        let doc = doc?;
        match args.output {
            OutputFormat::Summary => println!("{}", doc.summary_line()),
            OutputFormat::Files => {
                for path in doc.get_fullpaths() {
                    println!("{}", path.display());
                }
            }
            OutputFormat::Keys => {
                if let Some(key) = doc.get_bibkey() {
                    println!("{key}");
                }
            }
            OutputFormat::Tags => tags.extend(doc.get_tags()),
            OutputFormat::Sources => sids.extend(doc.get_sids()),
        }
    }

    match args.output {
        OutputFormat::Tags => print_lines(tags)?,
        OutputFormat::Sources => print_lines(sids.iter().map(Sid::to_string))?,
        _ => {}
    }
    Ok(())
}

fn cmd_count(root: &Path, registry: &SourceRegistry, query: &[String]) -> Result<()> {
    let db = open(root, Mode::ReadOnly, registry)?;
    println!("{}", db.count(&join_query(query))?);
    Ok(())
}

fn cmd_tags(root: &Path, registry: &SourceRegistry) -> Result<()> {
    let db = open(root, Mode::ReadOnly, registry)?;
    print_lines(db.get_tags()?)
}

fn cmd_sources(registry: &SourceRegistry) -> Result<()> {
    for source in registry.iter() {
        println!("{}: {}", source.name(), source.description());
    }
    Ok(())
}

fn cmd_import(root: &Path, registry: &SourceRegistry, file: &Path, tags: &[String]) -> Result<()> {
    let data = std::fs::read(file)?;
    let records = BibRecord::list_from_json(&data)?;

    let mut db = open(root, Mode::ReadWrite, registry)?;
    let report = bibdex::import_records(&mut db, registry, &PlainText, records, tags)?;

    println!("imported {} records", report.imported);
    for conflict in &report.conflicts {
        eprintln!(
            "conflict: '{}' also matches documents {:?}; applied to {}",
            conflict.key, conflict.others, conflict.kept
        );
    }
    for (key, error) in &report.failures {
        eprintln!("failed: '{key}': {error}");
    }

    if !report.is_clean() {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_restore(root: &Path, registry: &SourceRegistry) -> Result<()> {
    // The root holds document directories, so creation must not treat it
    // as a foreign non-empty directory.
    let mut db = Database::create(root, true, &registry.names())?;
    let report = bibdex::restore(&mut db, registry, &PlainText)?;
    println!(
        "restored {} documents ({} entries skipped)",
        report.restored, report.skipped
    );
    Ok(())
}

fn cmd_purge(root: &Path, registry: &SourceRegistry, docid: u64) -> Result<()> {
    let mut db = open(root, Mode::ReadWrite, registry)?;
    let mut doc = db.get_document(docid)?.ok_or(Error::DocNotFound(docid))?;
    doc.purge(&mut db)?;
    println!("purged id:{docid}");
    Ok(())
}

fn join_query(parts: &[String]) -> String {
    if parts.is_empty() {
        "*".to_string()
    } else {
        parts.join(" ")
    }
}

fn print_lines<I>(lines: I) -> Result<()>
where
    I: IntoIterator,
    I::Item: std::fmt::Display,
{
    for line in lines {
        println!("{line}");
    }
    Ok(())
}
