//! folio - collect linked HTML files into an e-book

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use serde::Serialize;
use simplelog::{ColorChoice, ConfigBuilder, LevelFilter, TermLogger, TerminalMode};

use folio::{Book, ConvertOptions, Metadata, SpineItem, TocEntry, convert};

#[derive(Parser)]
#[command(name = "folio")]
#[command(version, about = "Collect linked HTML files into an e-book", long_about = None)]
#[command(after_help = "EXAMPLES:
    folio site/index.html               Follow links up to 5 levels deep
    folio --max-levels 0 page.html      Convert a single page
    folio --json book/content.opf       Print the package as JSON")]
struct Cli {
    /// Input file (HTML or OPF)
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Order linked files breadth first instead of depth first
    #[arg(long)]
    breadth_first: bool,

    /// Maximum number of links to follow from the input file
    #[arg(long, value_name = "N", default_value_t = 5)]
    max_levels: usize,

    /// Do not package the input (OPF input only)
    #[arg(long)]
    dont_package: bool,

    /// Character encoding of the input files
    #[arg(long, value_name = "ENCODING")]
    input_encoding: Option<String>,

    /// Language to use when the input does not declare one
    #[arg(long)]
    language: Option<String>,

    /// Authors to use when the input names none, separated by '&'
    #[arg(long)]
    authors: Option<String>,

    /// Print the resulting book as JSON
    #[arg(long)]
    json: bool,

    /// Log more (repeat for debug output)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Serialize)]
struct ItemSummary<'a> {
    id: &'a str,
    href: &'a str,
    media_type: &'a str,
}

#[derive(Serialize)]
struct BookSummary<'a> {
    uid: Option<&'a str>,
    metadata: &'a Metadata,
    manifest: Vec<ItemSummary<'a>>,
    spine: &'a [SpineItem],
    toc: &'a [TocEntry],
}

impl<'a> BookSummary<'a> {
    fn new(book: &'a Book) -> Self {
        Self {
            uid: book.uid.as_deref(),
            metadata: &book.metadata,
            manifest: book
                .manifest
                .iter()
                .map(|item| ItemSummary {
                    id: &item.id,
                    href: &item.href,
                    media_type: &item.media_type,
                })
                .collect(),
            spine: &book.spine,
            toc: &book.toc,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    let options = ConvertOptions {
        breadth_first: cli.breadth_first,
        max_levels: cli.max_levels,
        dont_package: cli.dont_package,
        input_encoding: cli.input_encoding.clone(),
        language: cli.language.clone(),
        authors: cli.authors.clone(),
    };

    let book = match convert(&cli.input, &options) {
        Ok(book) => book,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    if cli.json {
        match serde_json::to_string_pretty(&BookSummary::new(&book)) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("error: {e}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        show_summary(&book);
    }
    ExitCode::SUCCESS
}

fn init_logging(cli: &Cli) {
    let level = if cli.quiet {
        LevelFilter::Error
    } else {
        match cli.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            _ => LevelFilter::Debug,
        }
    };
    let config = ConfigBuilder::new().set_time_level(LevelFilter::Off).build();
    // Fails only if a logger is already installed.
    let _ = TermLogger::init(level, config, TerminalMode::Stderr, ColorChoice::Auto);
}

fn show_summary(book: &Book) {
    let meta = &book.metadata;
    println!("Title: {}", meta.title);
    if !meta.authors.is_empty() {
        println!("Authors: {}", meta.authors.join(", "));
    }
    println!("Language: {}", meta.language);
    if let Some(id) = book.unique_identifier() {
        println!("Identifier: {}", id.value);
    }

    println!("\nManifest ({} items):", book.manifest.len());
    for item in book.manifest.iter() {
        println!("  {:<12} {:<30} {}", item.id, item.href, item.media_type);
    }

    println!("\nSpine:");
    for (entry, item) in book.spine_items() {
        let linear = if entry.linear { "" } else { " (non-linear)" };
        println!("  {}{linear}", item.href);
    }

    println!("\nTable of contents:");
    print_toc(&book.toc, 1);
}

fn print_toc(entries: &[TocEntry], depth: usize) {
    for entry in entries {
        println!("{}{} -> {}", "  ".repeat(depth), entry.title, entry.href);
        print_toc(&entry.children, depth + 1);
    }
}
