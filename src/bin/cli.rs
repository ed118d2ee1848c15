use bitsliced_bloom::{
    HashKind, MatrixConfig, MatrixConfigBuilder, ProbabilisticIndex,
    RedbRowStore, RedbRowStoreConfigBuilder, common::bytes2hr,
    common::matrix_bytes, parse_colour,
};
use clap::{Parser, Subcommand};
use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter},
    path::{Path, PathBuf},
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new index database
    Create {
        /// Path to the database file
        #[arg(short, long)]
        db_path: PathBuf,

        /// Rows per colour filter; derived from capacity when omitted
        #[arg(short, long)]
        size: Option<usize>,

        /// Hash functions; derived from capacity when omitted
        #[arg(short = 'k', long)]
        hashes: Option<usize>,

        /// Expected elements per colour
        #[arg(short, long, default_value = "1000000")]
        capacity: usize,

        /// False positive rate (between 0 and 1)
        #[arg(short, long, default_value = "0.01")]
        fpr: f64,

        /// Hash strategy (murmur3 or fnv1a)
        #[arg(long, default_value = "murmur3")]
        hash: String,
    },

    /// Open an index database and perform operations
    Load {
        /// Path to the database file
        #[arg(short, long)]
        db_path: PathBuf,

        #[command(subcommand)]
        operation: LoadCommands,
    },
}

#[derive(Subcommand)]
enum LoadCommands {
    /// Insert a file of elements, one per line, as a named colour
    Insert {
        /// Colour name, e.g. a sample id
        #[arg(short, long)]
        name: String,

        /// File with one element per line
        #[arg(short, long)]
        input: PathBuf,
    },

    /// List colours containing an element
    Query {
        #[arg(short, long)]
        element: String,
    },

    /// Score colours against a file of elements, one per line
    Search {
        #[arg(short, long)]
        input: PathBuf,

        /// Minimum fraction of elements a colour must contain
        #[arg(short, long, default_value = "1.0")]
        threshold: f64,
    },

    /// Clear a colour's bits and forget its name
    Remove {
        /// Colour id
        #[arg(short, long, allow_hyphen_values = true)]
        colour: String,
    },

    /// Write raw fixed-width row records
    Dump {
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Read raw fixed-width row records
    Restore {
        #[arg(short, long)]
        input: PathBuf,

        /// Colour count the records were dumped with
        #[arg(short, long)]
        num_colours: usize,
    },

    /// Write a self-describing snapshot
    Export {
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Read a snapshot written by export
    Import {
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Display information about the index
    Info,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Create {
            db_path,
            size,
            hashes,
            capacity,
            fpr,
            hash,
        } => {
            if db_path.exists() {
                println!(
                    "Error: Database already exists at {}",
                    db_path.display()
                );
                println!(
                    "Use the 'load' command to operate on existing databases."
                );
                return Ok(());
            }

            let config = build_config(*size, *hashes, *capacity, *fpr, hash)?;
            let mut index = open_index(db_path, Some(config.clone()))?;
            index.close()?;

            println!("Created new index database at {}", db_path.display());
            println!("Configuration:");
            println!("  Size: {}", config.size);
            println!("  Hash functions: {}", config.num_hashes);
            println!("  Hash strategy: {}", config.hash_kind);
        }
        Commands::Load { db_path, operation } => {
            handle_load_command(db_path, operation)?;
        }
    }

    Ok(())
}

fn build_config(
    size: Option<usize>,
    hashes: Option<usize>,
    capacity: usize,
    fpr: f64,
    hash: &str,
) -> Result<MatrixConfig, Box<dyn std::error::Error>> {
    let derived = MatrixConfig::from_capacity(capacity, fpr)?;
    let hash_kind: HashKind = hash.parse()?;

    let config = MatrixConfigBuilder::default()
        .size(size.unwrap_or(derived.size))
        .num_hashes(hashes.unwrap_or(derived.num_hashes))
        .hash_kind(hash_kind)
        .build()?;
    config.validate()?;
    Ok(config)
}

fn open_index(
    db_path: &Path,
    config: Option<MatrixConfig>,
) -> Result<ProbabilisticIndex<RedbRowStore>, Box<dyn std::error::Error>> {
    let store_config = RedbRowStoreConfigBuilder::default()
        .db_path(db_path.to_path_buf())
        .build()?;
    let store = RedbRowStore::open(store_config)?;
    Ok(ProbabilisticIndex::open(store, config)?)
}

fn read_elements(
    path: &Path,
) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let reader = BufReader::new(File::open(path)?);
    let mut elements = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let element = line.trim();
        if !element.is_empty() {
            elements.push(element.to_string());
        }
    }
    Ok(elements)
}

fn handle_load_command(
    db_path: &Path,
    operation: &LoadCommands,
) -> Result<(), Box<dyn std::error::Error>> {
    if !db_path.exists() {
        println!("Error: No database at {}", db_path.display());
        return Ok(());
    }
    let mut index = open_index(db_path, None)?;

    match operation {
        LoadCommands::Insert { name, input } => {
            let elements = read_elements(input)?;
            let bloom = index.create_bloom_filter(&elements)?;
            let colour = index.insert_named(name, &bloom)?;
            println!(
                "Inserted {} elements as colour {colour} ('{name}')",
                elements.len()
            );
        }
        LoadCommands::Query { element } => {
            let colours = index.lookup(element.as_bytes())?;
            if colours.is_empty() {
                println!("Element '{element}' is not present in any colour");
            } else {
                println!("Element '{element}' is present in:");
                for (colour, name) in index.names_for(&colours) {
                    println!("  {colour}\t{}", name.unwrap_or("-"));
                }
            }
        }
        LoadCommands::Search { input, threshold } => {
            let elements = read_elements(input)?;
            let hits = index.search(&elements, *threshold)?;
            println!("{} colours at threshold {threshold}:", hits.len());
            for hit in hits {
                println!(
                    "  {}\t{}\t{:.4}",
                    hit.colour,
                    hit.name.as_deref().unwrap_or("-"),
                    hit.fraction
                );
            }
        }
        LoadCommands::Remove { colour } => {
            let colour = parse_colour(colour)?;
            let cleared = index.remove_colour(colour)?;
            println!("Removed colour {colour}, cleared {cleared} bits");
        }
        LoadCommands::Dump { output } => {
            let rows = index.dump(BufWriter::new(File::create(output)?))?;
            println!("Dumped {rows} rows to {}", output.display());
        }
        LoadCommands::Restore { input, num_colours } => {
            let rows =
                index.load(BufReader::new(File::open(input)?), *num_colours)?;
            println!("Loaded {rows} rows from {}", input.display());
        }
        LoadCommands::Export { output } => {
            let rows = index.export(BufWriter::new(File::create(output)?))?;
            println!("Exported {rows} rows to {}", output.display());
        }
        LoadCommands::Import { input } => {
            let rows = index.import(BufReader::new(File::open(input)?))?;
            println!("Imported {rows} rows from {}", input.display());
        }
        LoadCommands::Info => {
            let stats = index.stats()?;
            println!("Index Configuration:");
            println!("  Database path: {}", db_path.display());
            println!("  Size: {}", stats.size);
            println!("  Hash functions: {}", stats.num_hashes);
            println!("  Hash strategy: {}", stats.hasher);
            println!("\nCurrent State:");
            println!("  Colours: {}", stats.num_colours);
            println!("  Named colours: {}", stats.named_colours);
            println!("  Row width: {} bytes", stats.row_width);
            println!(
                "  Full matrix size: {}",
                bytes2hr(matrix_bytes(stats.size, stats.num_colours))
            );
        }
    }

    index.close()?;
    Ok(())
}
