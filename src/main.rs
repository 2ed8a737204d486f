use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use reply_drafter::config::{
    AppConfig, ConfigKey, ConfigSnapshot, ConfigSource, DEFAULT_MAX_BATCH, EnvConfigSource,
    SheetConfigSource,
};
use reply_drafter::llm::{LlmConfig, OpenAiClient};
use reply_drafter::mailbox::{ImapConfig, ImapMailbox};
use reply_drafter::pipeline::{
    BatchReport, Collaborators, PipelineSettings, ReplyOutcome, ReplyPipeline, reply_to_selection,
};
use reply_drafter::sheet::{
    CONFIG_SHEET, CellReader, CellRef, LibSqlWorkbook, REPLIES_SHEET, TableWriter,
};

#[derive(Parser)]
#[command(name = "reply-drafter", version, about = "Draft LLM replies to Gmail conversations")]
struct Cli {
    /// Workbook database file
    #[arg(long, global = true, value_name = "FILE")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the CONFIG and REPLIES sheets
    Init,
    /// Read or change run configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Process a batch of conversations
    Run {
        /// Maximum number of conversations
        #[arg(long, default_value_t = DEFAULT_MAX_BATCH)]
        max_threads: usize,
        /// Skip conversations already carrying an outcome label
        #[arg(long)]
        skip_labeled: bool,
        /// Read run configuration from REPLY_DRAFTER_* variables
        #[arg(long)]
        env_config: bool,
        /// Print the batch report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Reply to the text of one cell, writing the result one column right
    ReplyCell {
        sheet: String,
        /// Cell in A1 notation
        cell: String,
        #[arg(long)]
        env_config: bool,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Set a configuration value
    Set { key: String, value: String },
    /// Show all configuration values
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    let cli = Cli::parse();
    let mut app = AppConfig::from_env();
    if let Some(db) = cli.db {
        app.db_path = db;
    }
    let _guard = init_tracing(app.log_dir.as_deref());

    let workbook = Arc::new(
        LibSqlWorkbook::new_local(&app.db_path)
            .await
            .with_context(|| format!("Failed to open workbook at {}", app.db_path.display()))?,
    );

    match cli.command {
        Commands::Init => init_workbook(&workbook).await,
        Commands::Config { action } => match action {
            ConfigAction::Set { key, value } => {
                let key: ConfigKey = key.parse()?;
                workbook
                    .write_cell(CONFIG_SHEET, key.cell(), &value)
                    .await
                    .context("Run `reply-drafter init` first")?;
                println!("{key} = {}", if key.is_secret() { "****" } else { value.as_str() });
                Ok(())
            }
            ConfigAction::Show => {
                let source = SheetConfigSource::new(workbook.clone());
                let snapshot = ConfigSnapshot::load(&source).await?;
                for key in ConfigKey::ALL {
                    println!("{:<15} {:<4} {}", key.as_str(), key.cell(), snapshot.masked(key));
                }
                Ok(())
            }
        },
        Commands::Run {
            max_threads,
            skip_labeled,
            env_config,
            json,
        } => {
            let source = config_source(env_config, &workbook);
            let snapshot = ConfigSnapshot::load(source.as_ref()).await?;
            let settings = PipelineSettings::from_snapshot(&snapshot)?
                .with_max_batch(max_threads)?
                .with_skip_labeled(skip_labeled);
            let api_key = snapshot.api_key()?;

            let imap = ImapConfig::from_env()
                .context("EMAIL_IMAP_HOST, EMAIL_USERNAME and EMAIL_PASSWORD must be set")?;
            let mailbox = Arc::new(ImapMailbox::new(imap));
            let generator = Arc::new(OpenAiClient::new(LlmConfig::from_env(api_key))?);

            let pipeline = ReplyPipeline::new(
                Collaborators {
                    conversations: mailbox.clone(),
                    drafts: mailbox.clone(),
                    labels: mailbox,
                    generator,
                    table: workbook,
                },
                settings,
            );
            let report = pipeline.run().await.context("Batch run aborted")?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
            Ok(())
        }
        Commands::ReplyCell {
            sheet,
            cell,
            env_config,
        } => {
            let cell: CellRef = cell.parse()?;
            let source = config_source(env_config, &workbook);
            let snapshot = ConfigSnapshot::load(source.as_ref()).await?;
            let template = snapshot.require(ConfigKey::PromptTemplate)?;
            let api_key = snapshot.api_key()?;

            let text = workbook.read_cell(&sheet, cell).await?.unwrap_or_default();
            let generator = OpenAiClient::new(LlmConfig::from_env(api_key))?;
            let reply =
                reply_to_selection(&generator, template, &text, &sheet, cell, workbook.as_ref())
                    .await?;

            println!("{}!{}:\n{reply}", sheet, cell.right());
            Ok(())
        }
    }
}

fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = fmt::layer().with_target(false).with_writer(std::io::stderr);

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "reply-drafter.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .with(
                    fmt::layer()
                        .with_target(false)
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .init();
            None
        }
    }
}

fn config_source(env_config: bool, workbook: &Arc<LibSqlWorkbook>) -> Box<dyn ConfigSource> {
    if env_config {
        Box::new(EnvConfigSource)
    } else {
        Box::new(SheetConfigSource::new(workbook.clone()))
    }
}

async fn init_workbook(workbook: &LibSqlWorkbook) -> anyhow::Result<()> {
    workbook.create_sheet(CONFIG_SHEET).await?;
    workbook.create_sheet(REPLIES_SHEET).await?;

    workbook.write_cell(CONFIG_SHEET, CellRef::new(1, 1), "key").await?;
    workbook.write_cell(CONFIG_SHEET, CellRef::new(1, 2), "value").await?;
    for key in ConfigKey::ALL {
        let label_cell = CellRef::new(key.cell().row, 1);
        workbook
            .write_cell(CONFIG_SHEET, label_cell, key.as_str())
            .await?;
    }
    workbook.write_cell(REPLIES_SHEET, CellRef::new(1, 1), "prompt").await?;
    workbook.write_cell(REPLIES_SHEET, CellRef::new(1, 2), "reply").await?;

    let sheets = workbook.sheet_names().await?;
    println!("Workbook ready: sheets {}", sheets.join(", "));
    println!("Next: reply-drafter config set <key> <value>");
    Ok(())
}

fn print_report(report: &BatchReport) {
    println!("Run {}", report.run_id);
    for outcome in &report.outcomes {
        let label = outcome.outcome.label();
        match &outcome.outcome {
            ReplyOutcome::Drafted { draft_id } => println!(
                "  {label:<16} {} ({}) draft {draft_id}",
                outcome.thread_id, outcome.subject
            ),
            ReplyOutcome::NoReplyNeeded => {
                println!("  {label:<16} {} ({})", outcome.thread_id, outcome.subject)
            }
        }
    }
    println!(
        "{} conversations: {} drafted, {} no reply needed",
        report.total(),
        report.drafted(),
        report.no_reply()
    );
}
