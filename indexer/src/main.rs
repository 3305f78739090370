use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use index_core::index::Orientation;
use index_core::{
    make_forward_index, make_inverted_index, DiskIndex, DocId, ForwardIndex, IndexConfig,
    InvertedIndex, TermId,
};
use serde_json::json;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build and inspect forward and inverted indexes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Forward,
    Inverted,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index described by a config file, or reuse it when it is current
    Build {
        /// TOML config file
        #[arg(long)]
        config: String,
        #[arg(long, value_enum, default_value_t = Kind::Forward)]
        kind: Kind,
        /// Derive the forward index from the inverted index
        #[arg(long, default_value_t = false)]
        uninvert: bool,
        /// Rows kept in the splay cache
        #[arg(long)]
        cache_capacity: Option<usize>,
    },
    /// Print counts of a finished index
    Stats {
        #[arg(long)]
        config: String,
        #[arg(long, value_enum, default_value_t = Kind::Forward)]
        kind: Kind,
    },
    /// Print one document row of the forward index
    Doc {
        #[arg(long)]
        config: String,
        #[arg(long)]
        id: u64,
    },
    /// Print one term row of the inverted index
    Term {
        #[arg(long)]
        config: String,
        #[arg(long)]
        id: u64,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { config, kind, uninvert, cache_capacity } => {
            let mut config = load_config(&config)?;
            if uninvert {
                config = config.with_uninvert(true);
            }
            if let Some(capacity) = cache_capacity {
                config = config.with_cache_capacity(capacity);
            }
            let stats = match kind {
                Kind::Forward => stats_json(&make_forward_index(&config)?),
                Kind::Inverted => stats_json(&make_inverted_index(&config)?),
            };
            print_json(&stats)
        }
        Commands::Stats { config, kind } => {
            let config = load_config(&config)?;
            let stats = match kind {
                Kind::Forward => stats_json(&ForwardIndex::open(&config.forward_index, 0)?),
                Kind::Inverted => stats_json(&InvertedIndex::open(&config.inverted_index, 0)?),
            };
            print_json(&stats)
        }
        Commands::Doc { config, id } => {
            let config = load_config(&config)?;
            let dir = &config.forward_index;
            let index = ForwardIndex::open(dir, 0)
                .with_context(|| format!("opening forward index {}", dir.display()))?;
            let doc = DocId::new(id);
            let row = index.search_primary(doc)?;
            let mut postings = Vec::with_capacity(row.len());
            for &(term, weight) in row.counts() {
                let text = index.term_text(term)?;
                postings.push(json!({ "term_id": term, "term": text, "weight": weight }));
            }
            print_json(&json!({
                "doc_id": doc,
                "size": index.doc_size(doc)?,
                "label": index.doc_label(doc)?,
                "name": index.doc_name(doc)?,
                "postings": postings,
            }))
        }
        Commands::Term { config, id } => {
            let config = load_config(&config)?;
            let dir = &config.inverted_index;
            let index = InvertedIndex::open(dir, 0)
                .with_context(|| format!("opening inverted index {}", dir.display()))?;
            let term = TermId::new(id);
            let row = index.search_primary(term)?;
            let postings: Vec<_> = row
                .counts()
                .iter()
                .map(|&(doc, weight)| json!({ "doc_id": doc, "weight": weight }))
                .collect();
            print_json(&json!({
                "term_id": term,
                "term": index.term_text(term)?,
                "postings": postings,
            }))
        }
    }
}

fn load_config(path: &str) -> Result<IndexConfig> {
    IndexConfig::from_file(path).with_context(|| format!("reading config {path}"))
}

fn stats_json<O: Orientation>(index: &DiskIndex<O>) -> serde_json::Value {
    let meta = index.meta();
    json!({
        "path": index.index_dir().display().to_string(),
        "kind": index.kind().to_string(),
        "num_docs": index.num_docs(),
        "unique_terms": index.unique_terms(),
        "total_postings": index.total_postings(),
        "uninverted": meta.uninverted,
        "created_at": meta.created_at,
    })
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
