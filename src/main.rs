//! # Ragbase CLI (`rag`)
//!
//! The `rag` binary is the operational interface for Ragbase: database
//! initialization, collection and sharing management, document ingestion,
//! retrieval, and the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! rag --config ./config/ragbase.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rag init` | Create the SQLite database and run schema migrations |
//! | `rag kb create <name>` | Create a collection for a caller |
//! | `rag kb list` | List a caller's own and shared collections |
//! | `rag kb delete <id>` | Delete a collection and everything under it |
//! | `rag kb share <id>` | Grant `read` or `none` access to other callers |
//! | `rag kb unshare <id>` | Remove grants |
//! | `rag kb shares <id>` | List a collection's grants |
//! | `rag add <kb-id> <file>` | Ingest a document into a collection |
//! | `rag docs <kb-id>` | List a collection's documents |
//! | `rag rm-doc <doc-id>` | Delete a document |
//! | `rag search "<query>"` | Hybrid search over collections |
//! | `rag prompt "<query>"` | Print the augmented prompt for the LLM |
//! | `rag serve` | Start the HTTP JSON server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use ragbase::models::SharePermission;
use ragbase::{collections, config, context, db, ingest, migrate, retrieve, server};

/// Ragbase CLI — a knowledge-base engine for retrieval-augmented generation.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/ragbase.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "rag",
    about = "Ragbase — a knowledge-base engine for retrieval-augmented generation",
    version,
    long_about = "Ragbase ingests documents into owned, shareable collections, chunks and embeds \
    them, and answers queries through hybrid vector+keyword retrieval with per-caller \
    authorization, exposed via a CLI and an HTTP JSON server."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ragbase.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables. Idempotent.
    Init,

    /// Manage collections (knowledge bases).
    Kb {
        #[command(subcommand)]
        action: KbAction,
    },

    /// Ingest a document into a collection.
    ///
    /// Extracts text, chunks it, embeds the chunks in batches, and stores
    /// everything. A failed pipeline leaves the document in `failed` state
    /// with the error recorded; embedding hiccups degrade to zero vectors
    /// instead of failing the document.
    Add {
        /// Collection id.
        collection: String,

        /// Path to the document file (txt or md).
        file: PathBuf,

        /// Acting caller id; must own the collection.
        #[arg(long)]
        caller: String,
    },

    /// List a collection's documents with status and chunk counts.
    Docs {
        /// Collection id.
        collection: String,

        /// Acting caller id; needs readable access.
        #[arg(long)]
        caller: String,
    },

    /// Delete a document and its chunks.
    RmDoc {
        /// Document id.
        document: String,

        /// Acting caller id; must own the parent collection.
        #[arg(long)]
        caller: String,
    },

    /// Search collections with hybrid vector+keyword retrieval.
    ///
    /// Collections the caller cannot read are silently dropped; an empty
    /// result can mean either no matches or no readable collections.
    Search {
        /// The query text.
        query: String,

        /// Collection ids to search (repeatable).
        #[arg(long = "kb", required = true)]
        collections: Vec<String>,

        /// Acting caller id.
        #[arg(long)]
        caller: String,

        /// Maximum number of results.
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Retrieve context and print the augmented prompt for the LLM.
    ///
    /// With no retrievable context the query is printed unchanged.
    Prompt {
        /// The query text.
        query: String,

        /// Collection ids to search (repeatable).
        #[arg(long = "kb", required = true)]
        collections: Vec<String>,

        /// Acting caller id.
        #[arg(long)]
        caller: String,

        /// Maximum number of results.
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Start the HTTP JSON server.
    Serve,
}

/// Collection management subcommands.
#[derive(Subcommand)]
enum KbAction {
    /// Create a collection. Names are unique per owner.
    Create {
        /// Collection name.
        name: String,

        /// Owning caller id.
        #[arg(long)]
        owner: String,

        /// Optional description.
        #[arg(long, default_value = "")]
        description: String,
    },

    /// List the caller's own collections and those shared to them.
    List {
        /// Acting caller id.
        #[arg(long)]
        caller: String,
    },

    /// Delete a collection, cascading to documents, chunks, and grants.
    Delete {
        /// Collection id.
        id: String,

        /// Acting caller id; must own the collection.
        #[arg(long)]
        caller: String,
    },

    /// Grant collection access to other callers.
    ///
    /// Re-granting an existing grantee overwrites the permission. The owner
    /// is skipped automatically.
    Share {
        /// Collection id.
        id: String,

        /// Grantee caller ids (repeatable).
        #[arg(long = "to", required = true)]
        grantees: Vec<String>,

        /// Permission: `read` or `none`.
        #[arg(long, default_value = "read")]
        permission: String,

        /// Acting caller id.
        #[arg(long)]
        caller: String,
    },

    /// Remove grants from a collection.
    Unshare {
        /// Collection id.
        id: String,

        /// Grantee caller ids (repeatable).
        #[arg(long = "to", required = true)]
        grantees: Vec<String>,
    },

    /// List a collection's share grants.
    Shares {
        /// Collection id.
        id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Kb { action } => run_kb(&cfg, action).await?,
        Commands::Add {
            collection,
            file,
            caller,
        } => {
            let pool = db::connect(&cfg).await?;
            let doc = ingest::add_document(&pool, &cfg, &collection, &caller, &file).await?;
            println!("add {}", doc.filename);
            println!("  document: {}", doc.id);
            println!("  status: {}", doc.status.as_str());
            if let Some(msg) = &doc.error_message {
                println!("  error: {}", msg);
            }
            pool.close().await;
        }
        Commands::Docs { collection, caller } => {
            let pool = db::connect(&cfg).await?;
            let docs = collections::list_documents(&pool, &collection, &caller).await?;
            if docs.is_empty() {
                println!("No documents.");
            }
            for doc in docs {
                println!(
                    "{}  [{}] {} ({} bytes, {} chunks)",
                    doc.id,
                    doc.status.as_str(),
                    doc.filename,
                    doc.file_size,
                    doc.chunk_count
                );
                if let Some(msg) = &doc.error_message {
                    println!("    error: {}", msg);
                }
            }
            pool.close().await;
        }
        Commands::RmDoc { document, caller } => {
            let pool = db::connect(&cfg).await?;
            if collections::delete_document(&pool, &document, &caller).await? {
                println!("Deleted document {}", document);
            } else {
                println!("Document not found or not owned by caller.");
            }
            pool.close().await;
        }
        Commands::Search {
            query,
            collections: kb_ids,
            caller,
            top_k,
        } => {
            let pool = db::connect(&cfg).await?;
            let results =
                retrieve::retrieve(&pool, &cfg, &query, &kb_ids, &caller, top_k).await?;

            if results.is_empty() {
                println!("No results.");
            } else {
                for (i, r) in results.iter().enumerate() {
                    println!(
                        "{}. [{:.3}] {} / {} (chunk {})",
                        i + 1,
                        r.hybrid_score,
                        r.collection_name,
                        r.document_name,
                        r.chunk_index
                    );
                    println!(
                        "    vector: {:.3}  keyword: {:.3}",
                        r.similarity, r.keyword_score
                    );
                    let excerpt: String = r.content.chars().take(160).collect();
                    println!("    excerpt: \"{}\"", excerpt.replace('\n', " "));
                    println!();
                }
                if let Some(citation) = context::select_citation(&results) {
                    println!(
                        "citation: {} - {} (similarity: {:.2})",
                        citation.collection_name, citation.document_name, citation.similarity
                    );
                }
            }
            pool.close().await;
        }
        Commands::Prompt {
            query,
            collections: kb_ids,
            caller,
            top_k,
        } => {
            let pool = db::connect(&cfg).await?;
            let (reference_block, _results) =
                retrieve::retrieve_and_format(&pool, &cfg, &query, &kb_ids, &caller, top_k)
                    .await?;
            println!("{}", context::build_prompt(&reference_block, &query));
            pool.close().await;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

async fn run_kb(cfg: &config::Config, action: KbAction) -> anyhow::Result<()> {
    let pool = db::connect(cfg).await?;

    match action {
        KbAction::Create {
            name,
            owner,
            description,
        } => {
            let collection =
                collections::create_collection(&pool, &owner, &name, &description).await?;
            println!("Created collection '{}'", collection.name);
            println!("  id: {}", collection.id);
        }
        KbAction::List { caller } => {
            let own = collections::list_own_collections(&pool, &caller).await?;
            let shared = collections::list_shared_collections(&pool, &caller).await?;

            println!("own:");
            if own.is_empty() {
                println!("  (none)");
            }
            for kb in own {
                let processing = if kb.has_processing_docs {
                    ", processing"
                } else {
                    ""
                };
                println!(
                    "  {}  {} ({} documents{})",
                    kb.id, kb.name, kb.document_count, processing
                );
            }

            println!("shared:");
            if shared.is_empty() {
                println!("  (none)");
            }
            for kb in shared {
                println!(
                    "  {}  {} (owner {}, permission {}, {} documents)",
                    kb.id,
                    kb.name,
                    kb.owner_id,
                    kb.permission.as_str(),
                    kb.document_count
                );
            }
        }
        KbAction::Delete { id, caller } => {
            if collections::delete_collection(&pool, &id, &caller).await? {
                println!("Deleted collection {}", id);
            } else {
                println!("Collection not found or not owned by caller.");
            }
        }
        KbAction::Share {
            id,
            grantees,
            permission,
            caller,
        } => {
            let permission = SharePermission::parse(&permission)
                .ok_or_else(|| anyhow::anyhow!("permission must be 'read' or 'none'"))?;
            let outcome =
                collections::share_collection(&pool, &id, &caller, &grantees, permission).await?;
            println!(
                "Granted {} new, updated {} existing",
                outcome.granted, outcome.updated
            );
            if outcome.skipped_owner {
                println!("  (owner skipped — owner access is implicit)");
            }
        }
        KbAction::Unshare { id, grantees } => {
            let removed = collections::unshare_collection(&pool, &id, &grantees).await?;
            println!("Removed {} grants", removed);
        }
        KbAction::Shares { id } => {
            let grants = collections::list_share_grants(&pool, &id).await?;
            if grants.is_empty() {
                println!("No grants.");
            }
            for grant in grants {
                println!(
                    "{}  {} (granted by {})",
                    grant.grantee_id,
                    grant.permission.as_str(),
                    grant.granted_by
                );
            }
        }
    }

    pool.close().await;
    Ok(())
}
