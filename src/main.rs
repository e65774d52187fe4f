//! # DocVault CLI (`dv`)
//!
//! The `dv` binary is the primary interface for DocVault. It provides
//! commands for database initialization, document upload, listing, search,
//! Q&A, and starting the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! dv --config ./config/dv.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `dv init` | Create the SQLite database and run schema migrations |
//! | `dv serve` | Start the HTTP API server |
//! | `dv upload <file>` | Upload a PDF or image and extract its text |
//! | `dv list` | List documents with filters and pagination |
//! | `dv search "<query>"` | Substring search over titles and extracted text |
//! | `dv get <id>` | Print a document's metadata and extracted text |
//! | `dv update <id>` | Change a document's title or replace its tags |
//! | `dv delete <id>` | Soft-delete a document |
//! | `dv ask <id> "<question>"` | Ask a question about one document |
//! | `dv stats` | Print store counters |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use docvault::answer::{AnswerEngine, OpenAiEngine};
use docvault::models::{Document, DocumentPage, FileKind};
use docvault::qa::QaService;
use docvault::store::DocumentStore;
use docvault::{config, db, ingest, migrate, server};

/// DocVault CLI — a self-hosted document archive with text extraction
/// and Q&A.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/dv.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "dv",
    about = "DocVault — a self-hosted document archive with text extraction and Q&A",
    version,
    long_about = "DocVault ingests PDFs and images into a local SQLite-backed store, extracts \
    their text in the background (native PDF text with an OCR fallback for scans), and exposes \
    tag-aware listing, substring search, and per-document question answering via a CLI and an \
    HTTP API."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/dv.toml`. Database, storage, extraction,
    /// Q&A, and server settings are read from this file.
    #[arg(long, global = true, default_value = "./config/dv.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables
    /// (documents, tags, document_tags, qa_sessions, qa_messages).
    /// This command is idempotent — running it multiple times is safe.
    Init,

    /// Start the HTTP API server.
    ///
    /// Binds to the configured address and serves the JSON API
    /// (upload, listing, search, Q&A, admin stats).
    Serve,

    /// Upload a document and extract its text.
    ///
    /// Accepts PDF, JPG, JPEG, and PNG files. The stored copy gets a
    /// UUID filename; the original name is kept as the default title.
    /// Unlike the HTTP API, this command waits for extraction to finish
    /// before exiting.
    Upload {
        /// Path to the file to upload.
        file: PathBuf,

        /// Document title. Defaults to the original filename.
        #[arg(long)]
        title: Option<String>,

        /// Comma-separated tags (e.g. `finance,q3`).
        #[arg(long)]
        tags: Option<String>,

        /// Owner user id.
        #[arg(long, default_value = "local")]
        user: String,
    },

    /// List documents with filters and pagination.
    List {
        /// Page number (1-based).
        #[arg(long, default_value_t = 1)]
        page: i64,

        /// Page size (1-100).
        #[arg(long, default_value_t = 20)]
        size: i64,

        /// Filter by file kind: `pdf`, `jpg`, or `png`.
        #[arg(long)]
        kind: Option<String>,

        /// Filter by tag name (case-insensitive).
        #[arg(long)]
        tag: Option<String>,

        /// Filter by title substring.
        #[arg(long)]
        title: Option<String>,

        /// Filter by owner user id.
        #[arg(long)]
        owner: Option<String>,
    },

    /// Search titles and extracted text for a substring.
    Search {
        /// The search query string.
        query: String,

        /// Page number (1-based).
        #[arg(long, default_value_t = 1)]
        page: i64,

        /// Page size (1-100).
        #[arg(long, default_value_t = 20)]
        size: i64,
    },

    /// Print a document's metadata and extracted text.
    Get {
        /// Document UUID.
        id: String,
    },

    /// Change a document's title or replace its tags.
    ///
    /// Only the owner (or an admin) may update a document. Passing
    /// `--tags` replaces the full tag set; `--tags ""` clears it.
    Update {
        /// Document UUID.
        id: String,

        /// New title.
        #[arg(long)]
        title: Option<String>,

        /// Comma-separated replacement tags.
        #[arg(long)]
        tags: Option<String>,

        /// Acting user id.
        #[arg(long, default_value = "local")]
        user: String,

        /// Acting role (`user` or `admin`).
        #[arg(long, default_value = "user")]
        role: String,
    },

    /// Soft-delete a document.
    ///
    /// The record and stored file are retained; the document disappears
    /// from listing, search, and Q&A. Only the owner (or an admin) may
    /// delete a document.
    Delete {
        /// Document UUID.
        id: String,

        /// Acting user id.
        #[arg(long, default_value = "local")]
        user: String,

        /// Acting role (`user` or `admin`).
        #[arg(long, default_value = "user")]
        role: String,
    },

    /// Ask a question about one document.
    ///
    /// Uses the configured answer engine when `OPENAI_API_KEY` is set,
    /// or a keyword-excerpt fallback otherwise. Follow-up questions from
    /// the same user reuse the existing session.
    Ask {
        /// Document UUID.
        id: String,

        /// The question to ask.
        question: String,

        /// Asking user id.
        #[arg(long, default_value = "local")]
        user: String,
    },

    /// Print store counters (documents, deletions, uploads today).
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Upload {
            file,
            title,
            tags,
            user,
        } => {
            let bytes = std::fs::read(&file)?;
            let filename = file
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| anyhow::anyhow!("invalid file name: {}", file.display()))?;

            let pool = db::connect(&cfg).await?;
            let outcome = ingest::upload(
                &cfg,
                &pool,
                &user,
                filename,
                title.as_deref(),
                &parse_tags(tags),
                bytes,
            )
            .await?;

            println!("Uploaded {} ({} bytes)", outcome.document.id, outcome.document.file_size);
            println!("Extracting text...");
            // The runtime exits with main, so wait for the background task
            outcome.extraction.await?;

            let store = DocumentStore::new(pool);
            let doc = store.get(&outcome.document.id).await?;
            match doc.extracted_text.as_deref() {
                Some(text) if !text.trim().is_empty() => {
                    println!("Extracted {} characters.", text.chars().count());
                }
                _ => println!("No text extracted."),
            }
        }
        Commands::List {
            page,
            size,
            kind,
            tag,
            title,
            owner,
        } => {
            let file_kind = match kind.as_deref() {
                Some(k) => Some(
                    FileKind::from_str_stored(k)
                        .ok_or_else(|| anyhow::anyhow!("unknown file kind: {k}"))?,
                ),
                None => None,
            };
            let filters = docvault::models::DocumentFilters {
                owner_id: owner,
                file_kind,
                tag,
                title,
            };
            let pool = db::connect(&cfg).await?;
            let result = DocumentStore::new(pool).list(&filters, page, size).await?;
            print_page(&result);
        }
        Commands::Search { query, page, size } => {
            let pool = db::connect(&cfg).await?;
            let result = DocumentStore::new(pool).search(&query, page, size).await?;
            print_page(&result);
        }
        Commands::Get { id } => {
            let pool = db::connect(&cfg).await?;
            let doc = DocumentStore::new(pool).get(&id).await?;
            print_document(&doc);
        }
        Commands::Update {
            id,
            title,
            tags,
            user,
            role,
        } => {
            let pool = db::connect(&cfg).await?;
            let doc = DocumentStore::new(pool)
                .update(&id, &user, &role, title, tags.map(|t| parse_tags(Some(t))))
                .await?;
            println!("Updated {}: {} [{}]", doc.id, doc.title, tag_list(&doc));
        }
        Commands::Delete { id, user, role } => {
            let pool = db::connect(&cfg).await?;
            DocumentStore::new(pool).soft_delete(&id, &user, &role).await?;
            println!("Deleted {id}.");
        }
        Commands::Ask { id, question, user } => {
            let pool = db::connect(&cfg).await?;
            let engine = OpenAiEngine::from_env(&cfg.qa)?;
            if engine.is_none() {
                eprintln!("Note: OPENAI_API_KEY not set, answering from keyword excerpts.");
            }
            let qa = QaService::new(
                pool,
                &cfg.qa,
                engine.map(|e| Box::new(e) as Box<dyn AnswerEngine>),
            );
            let response = qa.ask(&id, &user, &question).await?;
            println!("{}", response.answer);
            println!();
            println!("(session {})", response.session_id);
        }
        Commands::Stats => {
            let pool = db::connect(&cfg).await?;
            let stats = DocumentStore::new(pool).stats().await?;
            println!("Documents:      {}", stats.documents);
            println!("Deleted:        {}", stats.deleted_documents);
            println!("Uploads today:  {}", stats.uploads_today);
        }
    }

    Ok(())
}

/// Split a comma-separated `--tags` value into trimmed, non-empty names.
fn parse_tags(raw: Option<String>) -> Vec<String> {
    raw.map(|r| {
        r.split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

fn tag_list(doc: &Document) -> String {
    doc.tags
        .iter()
        .map(|t| t.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn print_page(page: &DocumentPage) {
    if page.items.is_empty() {
        println!("No documents found.");
        return;
    }
    for doc in &page.items {
        let tags = tag_list(doc);
        if tags.is_empty() {
            println!("{}  {:>4}  {:>9}  {}", doc.id, doc.file_kind.as_str(), doc.file_size, doc.title);
        } else {
            println!(
                "{}  {:>4}  {:>9}  {} [{}]",
                doc.id,
                doc.file_kind.as_str(),
                doc.file_size,
                doc.title,
                tags
            );
        }
    }
    println!();
    println!(
        "Page {} of {} ({} documents)",
        page.page, page.pages, page.total
    );
}

fn print_document(doc: &Document) {
    println!("ID:       {}", doc.id);
    println!("Title:    {}", doc.title);
    println!("Kind:     {}", doc.file_kind.as_str());
    println!("Size:     {} bytes", doc.file_size);
    println!("Owner:    {}", doc.owner_id);
    println!("Tags:     {}", tag_list(doc));
    println!("Path:     {}", doc.file_path);
    println!("Created:  {}", doc.created_at);
    println!("Updated:  {}", doc.updated_at);
    println!();
    match doc.extracted_text.as_deref() {
        Some(text) if !text.trim().is_empty() => println!("{text}"),
        Some(_) | None => println!("(no extracted text)"),
    }
}
