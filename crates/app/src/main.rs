use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use pdf_table_reconcile_core::{
    collect_inputs, run_batch, ChatCompletionClient, DocumentIntelligenceClient, Document,
    DocumentReport, ExtendedTableGroupDetector, GroupOutcome, LayoutExtractor, LayoutMarkdownPreprocessor,
    LopdfExtractor, PageTextExtractor, PipelineOptions, ReconcilePipeline, SidecarLayout,
    SidecarPageText, TableFormat, TableToTextConverter,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pdf-table-reconcile", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Document Intelligence endpoint
    #[arg(long, env = "DI_ENDPOINT")]
    di_endpoint: Option<String>,

    /// Document Intelligence key
    #[arg(long, env = "DI_API_KEY", hide_env_values = true)]
    di_api_key: Option<String>,

    /// Chat completions URL used to turn tables into sentences
    #[arg(long, env = "OPENAI_ENDPOINT")]
    llm_endpoint: Option<String>,

    /// Chat completions key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    llm_api_key: Option<String>,

    /// Completion budget for one table description
    #[arg(long, env = "LLM_MAX_TOKENS", default_value_t = 1_600)]
    llm_max_tokens: u32,

    /// Seconds between layout operation status checks
    #[arg(long, default_value_t = 2)]
    di_poll_interval_secs: u64,

    /// Status checks before a layout operation is given up
    #[arg(long, default_value_t = 90)]
    di_max_polls: u32,
}

#[derive(Subcommand)]
enum Command {
    /// Reconcile split tables in one PDF or a folder of PDFs.
    Reconcile {
        /// PDF file or folder searched recursively.
        #[arg(long)]
        input: PathBuf,
        /// Folder that receives `<stem>.md` and `<stem>.txt`.
        #[arg(long, default_value = "output")]
        output: PathBuf,
        /// Read precomputed layout markdown (`<stem>.md`) instead of calling the layout service.
        #[arg(long)]
        layout_dir: Option<PathBuf>,
        /// Read raw page text from `<stem>.pages.md` sidecars instead of the PDF.
        #[arg(long)]
        page_text_dir: Option<PathBuf>,
        /// Splice tables as HTML instead of pipe markdown.
        #[arg(long, default_value_t = false)]
        html_tables: bool,
        /// Do not write the table-to-text artifact.
        #[arg(long, default_value_t = false)]
        skip_text: bool,
        /// Print per-document reports as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Print the split-table groups found in a layout markdown file.
    Detect {
        #[arg(long)]
        markdown: PathBuf,
    },
    /// Turn the tables of an already reconciled markdown file into sentences.
    Text {
        #[arg(long)]
        document: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        "pdf-table-reconcile boot"
    );

    match cli.command {
        Command::Reconcile {
            ref input,
            ref output,
            ref layout_dir,
            ref page_text_dir,
            html_tables,
            skip_text,
            json,
        } => {
            let options = PipelineOptions {
                table_format: if html_tables {
                    TableFormat::Html
                } else {
                    TableFormat::Markdown
                },
                ..PipelineOptions::default()
            };

            let layout = layout_extractor(&cli, layout_dir.clone())?;
            let pages: Box<dyn PageTextExtractor> = match page_text_dir {
                Some(directory) => Box::new(SidecarPageText::new(Some(directory.clone()))),
                None => Box::new(LopdfExtractor),
            };

            let pipeline = ReconcilePipeline::new(layout, pages, options)?;
            let converter = if skip_text {
                None
            } else {
                summarizer(&cli)
                    .map(|client| TableToTextConverter::new(client, pipeline.options()))
                    .transpose()?
            };

            let inputs = collect_inputs(input)?;
            info!(documents = inputs.len(), output = %output.display(), "reconciling");

            let report = run_batch(&pipeline, converter.as_ref(), &inputs, output).await?;

            for document in &report.documents {
                if json {
                    println!("{}", serde_json::to_string(document)?);
                } else {
                    print_report(document);
                }
            }

            for skipped in &report.skipped_files {
                warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped pdf");
                println!("skipped {}: {}", skipped.path.display(), skipped.reason);
            }

            println!(
                "{} document(s) reconciled, {} skipped at {}",
                report.documents.len(),
                report.skipped_files.len(),
                Utc::now().to_rfc3339()
            );
        }
        Command::Detect { ref markdown } => {
            let raw = std::fs::read_to_string(markdown)
                .with_context(|| format!("cannot read {}", markdown.display()))?;
            let layout = LayoutMarkdownPreprocessor::new()?.preprocess(&raw);
            let groups = ExtendedTableGroupDetector::new(&PipelineOptions::default())?.detect(&layout.markdown);

            if groups.is_empty() {
                println!("no split tables in {} page(s)", layout.pages.len());
            }
            for group in groups {
                println!(
                    "pages={}-{} {:?} bytes={}..{}",
                    group.first_page(),
                    group.last_page(),
                    group.pages,
                    group.span.start,
                    group.span.end
                );
            }
        }
        Command::Text {
            ref document,
            ref output,
        } => {
            let client = summarizer(&cli).context("--llm-endpoint and --llm-api-key are required")?;
            let converter = TableToTextConverter::new(client, &PipelineOptions::default())?;

            let markdown = tokio::fs::read_to_string(document)
                .await
                .with_context(|| format!("cannot read {}", document.display()))?;
            let artifact = converter.document_to_text(&Document { markdown }).await?;

            let target = output.clone().unwrap_or_else(|| document.with_extension("txt"));
            tokio::fs::write(&target, &artifact.text).await?;
            println!(
                "{} table(s) converted, {} kept as markdown -> {}",
                artifact.outcomes.len() - artifact.fallback_count(),
                artifact.fallback_count(),
                target.display()
            );
        }
    }

    Ok(())
}

fn layout_extractor(cli: &Cli, layout_dir: Option<PathBuf>) -> anyhow::Result<Box<dyn LayoutExtractor>> {
    if let Some(directory) = layout_dir {
        return Ok(Box::new(SidecarLayout::new(directory)));
    }

    match (&cli.di_endpoint, &cli.di_api_key) {
        (Some(endpoint), Some(key)) => Ok(Box::new(
            DocumentIntelligenceClient::new(endpoint, key)
                .with_polling(Duration::from_secs(cli.di_poll_interval_secs), cli.di_max_polls),
        )),
        _ => anyhow::bail!("set --layout-dir or both --di-endpoint and --di-api-key"),
    }
}

fn summarizer(cli: &Cli) -> Option<ChatCompletionClient> {
    match (&cli.llm_endpoint, &cli.llm_api_key) {
        (Some(endpoint), Some(key)) => Some(ChatCompletionClient::new(endpoint, key).with_max_tokens(cli.llm_max_tokens)),
        _ => None,
    }
}

fn print_report(report: &DocumentReport) {
    println!(
        "{} pages={} reconciled_groups={} failed_groups={} tables_summarized={} tables_fallback={}",
        report.source_path,
        report.page_count,
        report.reconciled_groups(),
        report.failed_groups(),
        report.tables_summarized,
        report.tables_fallback
    );

    for group in &report.groups {
        if let GroupOutcome::Failed { pages, reason } = group {
            println!("  failed group pages={pages:?}: {reason}");
        }
    }
}
