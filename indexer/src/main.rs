use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use komodo_core::parser::{parse_json, parse_text};
use komodo_core::{Index, IndexConfig, ParsedDocument, SearchQuery};
use serde::Serialize;
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build, maintain and query a Komodo postings index", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index JSON/JSONL/TXT files from a file or directory
    Build {
        /// Input path (file or directory)
        #[arg(long)]
        input: String,
        /// Index directory
        #[arg(long)]
        index: String,
        /// Index name recorded on creation
        #[arg(long, default_value = "default")]
        name: String,
        /// Keep term case instead of folding to lowercase
        #[arg(long, default_value_t = false)]
        case_sensitive: bool,
        /// Apply English stemming to terms
        #[arg(long, default_value_t = false)]
        stem: bool,
        /// Drop English stop words
        #[arg(long, default_value_t = false)]
        remove_stopwords: bool,
    },
    /// Remove a document and its postings
    Delete {
        #[arg(long)]
        index: String,
        #[arg(long)]
        id: String,
    },
    /// Run a search and print the result as JSON
    Search {
        #[arg(long)]
        index: String,
        #[arg(long = "required", required = true)]
        required: Vec<String>,
        #[arg(long = "optional")]
        optional: Vec<String>,
        #[arg(long = "exclude")]
        exclude: Vec<String>,
        #[arg(long, default_value_t = 10)]
        max_results: usize,
        #[arg(long, default_value_t = 0)]
        start: usize,
    },
    /// Print document and term counts
    Stats {
        #[arg(long)]
        index: String,
    },
}

#[derive(Debug, Default, Serialize)]
struct BuildSummary {
    files: usize,
    documents: usize,
    replaced: usize,
    terms: usize,
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, index, name, case_sensitive, stem, remove_stopwords } => {
            let config = IndexConfig { case_insensitive: !case_sensitive, stem, remove_stopwords, ..IndexConfig::default() };
            let index = Index::open_or_create(&name, &index, config)?;
            let summary = build_index(&index, Path::new(&input))?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Delete { index, id } => {
            let index = Index::open(&index)?;
            let removed = index.delete_document(&id)?;
            index.flush()?;
            println!("{}", serde_json::json!({ "document_id": id, "removed": removed }));
        }
        Commands::Search { index, required, optional, exclude, max_results, start } => {
            let index = Index::open(&index)?;
            let query = SearchQuery::new(required)
                .with_optional_terms(optional)
                .with_exclude_terms(exclude)
                .with_page(start, max_results);
            let result = index.search(&query)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Stats { index } => {
            let index = Index::open(&index)?;
            println!("{}", serde_json::to_string_pretty(&index.stats()?)?);
        }
    }
    Ok(())
}

fn collect_files(input: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input.is_dir() {
        for entry in WalkDir::new(input).into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() {
                if let Some(ext) = p.extension().and_then(|s| s.to_str()) {
                    if matches!(ext, "json" | "jsonl" | "txt") {
                        files.push(p.to_path_buf());
                    }
                }
            }
        }
        files.sort();
    } else if input.is_file() {
        files.push(input.to_path_buf());
    }
    files
}

fn build_index(index: &Index, input: &Path) -> Result<BuildSummary> {
    let mut summary = BuildSummary::default();
    for file in collect_files(input) {
        let docs = match file.extension().and_then(|s| s.to_str()) {
            Some("jsonl") => read_jsonl(&file, index.config())?,
            Some("txt") => vec![read_text(&file, index.config())?],
            _ => read_json(&file, index.config())?,
        };
        summary.files += 1;
        for doc in docs {
            let result = index.add_document(doc)?;
            summary.documents += 1;
            if result.replaced {
                summary.replaced += 1;
            }
        }
    }
    index.flush()?;
    summary.terms = index.dictionary().count();
    tracing::info!(files = summary.files, documents = summary.documents, terms = summary.terms, "index build complete");
    Ok(summary)
}

fn file_stem(file: &Path) -> String {
    file.file_stem().and_then(|s| s.to_str()).unwrap_or("doc").to_string()
}

/// `id` field if present (string or number), otherwise `<file stem>-<ordinal>`.
fn document_id(value: &serde_json::Value, file: &Path, ordinal: usize) -> String {
    match value.get("id") {
        Some(serde_json::Value::String(s)) if !s.is_empty() => s.clone(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => format!("{}-{ordinal}", file_stem(file)),
    }
}

fn read_jsonl(file: &Path, config: &IndexConfig) -> Result<Vec<ParsedDocument>> {
    let reader = BufReader::new(File::open(file)?);
    let mut docs = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() { continue; }
        let value: serde_json::Value = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}", file.display(), n + 1))?;
        docs.push(parse_json(&document_id(&value, file, n), &value, config));
    }
    Ok(docs)
}

fn read_json(file: &Path, config: &IndexConfig) -> Result<Vec<ParsedDocument>> {
    let reader = BufReader::new(File::open(file)?);
    let json: serde_json::Value = serde_json::from_reader(reader).with_context(|| file.display().to_string())?;
    let docs = match &json {
        serde_json::Value::Array(arr) => arr
            .iter()
            .enumerate()
            .map(|(n, v)| parse_json(&document_id(v, file, n), v, config))
            .collect(),
        serde_json::Value::Object(_) => vec![parse_json(&document_id(&json, file, 0), &json, config)],
        _ => {
            tracing::warn!(file = %file.display(), "skipping JSON file without objects");
            Vec::new()
        }
    };
    Ok(docs)
}

fn read_text(file: &Path, config: &IndexConfig) -> Result<ParsedDocument> {
    let text = fs::read_to_string(file)?;
    let mut doc = parse_text(&file_stem(file), &text, config);
    doc.source_url = Some(file.display().to_string());
    Ok(doc)
}
