//! Command line interface: argument types and command implementations.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};

use crate::api::{self, IndexOptions, DEFAULT_MARKUP_PAGES};
use crate::driver::DriverConfig;
use crate::error::PinpointError;
use crate::pdf::{extractor_factory, PdfiumComposer, PdfiumExtractor};
use crate::pipeline::{self, Granularity};
use crate::util;

/// pinpoint - positional PDF full-text search
#[derive(Parser, Debug, Clone)]
#[command(name = "pinpoint")]
#[command(about = "Index PDF files and search them with page-geometry results")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct PinpointArgs {
    /// Print debugging information.
    #[arg(short = 'd', global = true)]
    pub debug: bool,

    /// Print detailed debugging information (implies -d).
    #[arg(short = 'e', global = true)]
    pub trace: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Index PDF files into a store
    Index(IndexArgs),

    /// Search an existing store
    Search(SearchArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct IndexArgs {
    /// Store directory.
    #[arg(long, default_value = "store.pinpoint")]
    pub store: PathBuf,

    /// Force creation of a new store, removing any existing one.
    #[arg(long)]
    pub force: bool,

    /// Append to an existing index.
    #[arg(long)]
    pub append: bool,

    /// Number of worker threads; 0 means one per spare CPU.
    #[arg(long, short = 'w', default_value_t = 0)]
    pub workers: usize,

    /// Dispatch granularity of the worker pool.
    #[arg(long, value_enum, default_value = "doc")]
    pub granularity: GranularityArg,

    /// Recover from extractor crashes instead of aborting.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub recover: bool,

    /// Write the human-readable positions dump next to each document.
    #[arg(long)]
    pub dump_positions: bool,

    /// PDF files or glob patterns.
    #[arg(required = true)]
    pub patterns: Vec<String>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct SearchArgs {
    /// Store directory.
    #[arg(long, default_value = "store.pinpoint")]
    pub store: PathBuf,

    /// Maximum number of results.
    #[arg(long, default_value_t = 10)]
    pub max: usize,

    /// Print only the names of matching files.
    #[arg(long)]
    pub names_only: bool,

    /// Write a PDF with the matches marked up.
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Search term.
    #[arg(required = true)]
    pub term: Vec<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum GranularityArg {
    Doc,
    Page,
}

impl From<GranularityArg> for Granularity {
    fn from(arg: GranularityArg) -> Self {
        match arg {
            GranularityArg::Doc => Granularity::Doc,
            GranularityArg::Page => Granularity::Page,
        }
    }
}

/// Exit code for "nothing to do": no input files matched.
pub const EXIT_NO_FILES: i32 = 2;
/// Exit code for fatal I/O or parse errors while indexing.
pub const EXIT_FATAL: i32 = 3;
/// Exit code for an unusable query.
pub const EXIT_BAD_QUERY: i32 = 2;

/// Execute the parsed command, terminating the process with the
/// documented exit codes on failure.
pub fn execute_command(args: PinpointArgs) {
    let code = match &args.command {
        Command::Index(index_args) => run_index(index_args),
        Command::Search(search_args) => run_search(search_args),
    };
    if code != 0 {
        process::exit(code);
    }
}

fn run_index(args: &IndexArgs) -> i32 {
    // Smallest files first, so long runs show progress early.
    let paths = match util::patterns_to_paths(&args.patterns, true) {
        Ok(paths) => paths,
        Err(err) => {
            eprintln!("could not expand patterns: {err}");
            return EXIT_FATAL;
        }
    };
    if paths.is_empty() {
        eprintln!("no files match {:?}", args.patterns);
        return EXIT_NO_FILES;
    }

    let options = IndexOptions {
        store_dir: Some(args.store.clone()),
        force_create: args.force,
        allow_append: args.append,
        driver: DriverConfig {
            expose_errors: !args.recover,
            dump_positions: args.dump_positions,
        },
    };
    let report = |line: &str| println!("{line}");

    let result = if args.workers == 1 {
        PdfiumExtractor::new().and_then(|extractor| {
            api::index_files(&paths, &options, &extractor, Some(&report))
        })
    } else {
        let workers = if args.workers == 0 {
            pipeline::default_workers()
        } else {
            args.workers
        };
        api::index_files_concurrent(
            &paths,
            &options,
            workers,
            args.granularity.into(),
            extractor_factory(),
            Some(&report),
        )
    };

    match result {
        Ok((store, _index, total_pages)) => {
            println!(
                "indexed {} files, {total_pages} pages into {}",
                store.len(),
                args.store.display()
            );
            0
        }
        Err(err) => {
            eprintln!("indexing failed: {err}");
            EXIT_FATAL
        }
    }
}

fn run_search(args: &SearchArgs) -> i32 {
    let term = args.term.join(" ");
    let results = match api::search_pdf_index(&args.store, &term, args.max) {
        Ok(results) => results,
        Err(PinpointError::Index(err)) => {
            eprintln!("bad query {term:?}: {err}");
            return EXIT_BAD_QUERY;
        }
        Err(err) => {
            eprintln!("search failed: {err}");
            return EXIT_BAD_QUERY;
        }
    };

    if args.names_only {
        for file in results.files() {
            println!("{file}");
        }
    } else {
        // No matches is still a successful search.
        println!("{results}");
    }

    if let Some(out) = &args.out {
        let composer = match PdfiumComposer::new() {
            Ok(composer) => composer,
            Err(err) => {
                eprintln!("could not set up PDF output: {err}");
                return EXIT_BAD_QUERY;
            }
        };
        if let Err(err) =
            api::markup_results(&results, &composer, out, DEFAULT_MARKUP_PAGES)
        {
            eprintln!("could not write {}: {err}", out.display());
            return EXIT_BAD_QUERY;
        }
        println!("marked-up matches written to {}", out.display());
    }
    0
}
