//! # docqa CLI
//!
//! Answer questions about a single document from the terminal.
//!
//! ## Usage
//!
//! ```bash
//! docqa [--config ./docqa.toml] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docqa ask <FILE> <QUESTION>...` | Load a document and answer one question |
//! | `docqa repl [FILE]` | Interactive session: load documents, ask questions |
//!
//! ## Examples
//!
//! ```bash
//! # One-shot question against a PDF
//! docqa ask report.pdf "What were the Q3 revenue numbers?"
//!
//! # Interactive session, document loaded up front
//! docqa repl handbook.docx
//!
//! # Interactive session, load from inside the loop
//! docqa repl
//! > :open slides.pptx
//! > What is the project timeline?
//! ```
//!
//! The LLM credential comes from `GEMINI_API_KEY` (or
//! `~/.config/docqa/api_key`); a missing credential halts startup.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use docqa::answer::GeminiModel;
use docqa::config::{self, Config};
use docqa::embedding;
use docqa::session::{AskOutcome, LoadOutcome, Session};

/// Default configuration path probed when `--config` is not given.
const DEFAULT_CONFIG_PATH: &str = "./docqa.toml";

/// docqa — single-session document question answering.
///
/// Loads one document, indexes it in memory, and answers questions about
/// it through a hosted LLM constrained to the retrieved context.
#[derive(Parser)]
#[command(
    name = "docqa",
    about = "Ask questions about a document (PDF, Word, Excel, text, or slides)",
    version,
    long_about = "docqa extracts and chunks a document, embeds the chunks into an \
    in-memory vector index, and answers natural-language questions by sending the \
    top-matching chunks with the question to a hosted LLM as an \
    \"answer only from context\" request. Nothing is persisted between runs."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// When omitted, `./docqa.toml` is used if present, otherwise the
    /// built-in defaults apply.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a document and answer a single question.
    Ask {
        /// The document to load (pdf, txt, docx, xls, xlsx, pptx).
        file: PathBuf,

        /// The question; multiple words are joined with spaces.
        #[arg(required = true)]
        question: Vec<String>,
    },

    /// Start an interactive question-answering session.
    ///
    /// Lines starting with `:` are commands (`:open <path>`, `:status`,
    /// `:quit`); any other line is asked as a question against the
    /// loaded document.
    Repl {
        /// Document to load before the first prompt.
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let cfg = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_PATH);
            if default_path.exists() {
                config::load_config(default_path)?
            } else {
                Config::default()
            }
        }
    };

    // The credential is fatal at startup: no session runs without it.
    let api_key = config::resolve_api_key()?;

    let embedder = embedding::create_embedder(&cfg.embedding)?;
    let model = Box::new(GeminiModel::new(&cfg.llm, api_key));
    let backoff = Duration::from_secs(cfg.llm.rate_limit_backoff_secs);
    let mut session = Session::new(cfg, embedder, model);

    match cli.command {
        Commands::Ask { file, question } => {
            run_ask(&mut session, &file, &question.join(" ")).await
        }
        Commands::Repl { file } => run_repl(&mut session, file.as_deref(), backoff).await,
    }
}

async fn run_ask(session: &mut Session, file: &Path, question: &str) -> Result<()> {
    match load_file(session, file).await? {
        LoadOutcome::Indexed { chunks } => {
            println!("Document processed ({} chunks).", chunks);
        }
        LoadOutcome::Unchanged => {}
        LoadOutcome::Rejected { reason } => bail!("{}", reason),
    }

    match session.ask(question).await {
        AskOutcome::Answered { text, .. } => {
            println!("{}", text);
            Ok(())
        }
        AskOutcome::NotReady => bail!("no answerable document loaded"),
        AskOutcome::RateLimited => {
            bail!("LLM API quota exceeded — wait a minute and resubmit the question")
        }
        AskOutcome::Failed { message } => bail!("{}", message),
    }
}

async fn run_repl(session: &mut Session, file: Option<&Path>, backoff: Duration) -> Result<()> {
    println!("docqa interactive session");
    println!("  :open <path>   load a document");
    println!("  :status        show session state");
    println!("  :quit          exit");
    println!();

    if let Some(path) = file {
        if let Err(e) = open_document(session, path).await {
            eprintln!("Error: {:#}", e);
        }
    }

    let interactive = atty::is(atty::Stream::Stdin);
    let stdin = std::io::stdin();

    loop {
        if interactive {
            print!("> ");
            std::io::stdout().flush().ok();
        }

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(path) = line.strip_prefix(":open ") {
            if let Err(e) = open_document(session, Path::new(path.trim())).await {
                eprintln!("Error: {:#}", e);
            }
            continue;
        }

        match line {
            ":quit" | ":exit" => break,
            ":status" => print_status(session),
            _ if line.starts_with(':') => {
                println!("Unknown command: {}", line);
            }
            question => ask_question(session, question, backoff).await,
        }
    }

    Ok(())
}

fn print_status(session: &Session) {
    println!("state: {}", session.state());
    match session.document_name() {
        Some(name) => println!("document: {}", name),
        None => println!("document: (none)"),
    }
    if let Some(chunks) = session.index_chunks() {
        println!("indexed chunks: {}", chunks);
    }
    println!("cached answers: {}", session.cached_answers());
}

async fn load_file(session: &mut Session, path: &Path) -> Result<LoadOutcome> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("invalid file name: {}", path.display()))?
        .to_string();
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    session.load_document(&name, &bytes).await
}

async fn open_document(session: &mut Session, path: &Path) -> Result<()> {
    match load_file(session, path).await? {
        LoadOutcome::Indexed { chunks } => {
            println!("Document processed successfully ({} chunks).", chunks);
        }
        LoadOutcome::Unchanged => {
            println!("Document already loaded; index and answer cache kept.");
        }
        LoadOutcome::Rejected { reason } => {
            eprintln!("Error: {}", reason);
        }
    }
    Ok(())
}

async fn ask_question(session: &mut Session, question: &str, backoff: Duration) {
    match session.ask(question).await {
        AskOutcome::Answered { text, cached } => {
            if cached {
                println!("(cached)");
            }
            println!("{}", text);
        }
        AskOutcome::NotReady => {
            println!("No document loaded. Use :open <path> first.");
        }
        AskOutcome::RateLimited => {
            eprintln!(
                "LLM API quota exceeded; waiting {}s. Please resubmit your question.",
                backoff.as_secs()
            );
            tokio::time::sleep(backoff).await;
        }
        AskOutcome::Failed { message } => {
            eprintln!("LLM error: {}", message);
        }
    }
}
