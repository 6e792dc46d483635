use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use colored::*;
use reqwest::Client;
use tracing::info;

use codeblue::completion::OpenAiChat;
use codeblue::config::{self, Settings};
use codeblue::dataset::analyzer::{DataAnalyzer, Trend};
use codeblue::dataset::chart::ChartKind;
use codeblue::dataset::{DataLoader, DatasetSummary};
use codeblue::embedding::OpenAiEmbeddings;
use codeblue::index::pinecone::PineconeService;
use codeblue::index::{StoreOptions, VectorStore};
use codeblue::ingest::{IngestOptions, IngestionDriver};
use codeblue::qa::HealthcareAnalyst;
use codeblue::session::Session;

#[derive(Parser)]
#[command(name = "codeblue")]
#[command(about = "CodeBlue - ICU dataset analysis\nAsk questions about hospital ICU exports, answered with retrieved records")]
#[command(version)]
struct Cli {
  /// Directory holding the ICU CSV exports (defaults to ~/Desktop/med/data)
  #[arg(long, global = true, env = "CODEBLUE_DATA_DIR")]
  data_dir: Option<PathBuf>,

  /// Enable verbose logging
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Load, summarize, index the data and start the interactive session
  Run {
    /// Use the records already in the index
    #[arg(long)]
    skip_ingest: bool,
  },
  /// Embed the ICU exports into the vector index
  Ingest,
  /// Ask a single question and print the answer
  Ask {
    /// Question text (space-separated)
    #[arg(required = true)]
    question: Vec<String>,
  },
  /// Print summary statistics for every column
  Summary,
  /// Show value distributions for the given columns
  Trends {
    #[arg(required = true)]
    columns: Vec<String>,
  },
  /// Draw a text chart of one column
  Chart {
    column: String,
    #[arg(short, long, value_enum, default_value = "histogram")]
    kind: ChartKind,
  },
}

fn http_client(settings: &Settings) -> Result<Client> {
  Client::builder()
    .timeout(settings.timeout)
    .build()
    .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))
}

async fn connect_store(settings: &Settings, client: &Client) -> Result<VectorStore> {
  info!("Initializing vector store...");
  let embedder = Arc::new(OpenAiEmbeddings::new(client.clone(), &settings.openai));
  let service = PineconeService::new(client.clone(), &settings.pinecone);

  let store = VectorStore::connect(
    &service,
    embedder,
    &settings.pinecone.index_name,
    settings.pinecone.host.as_str(),
    StoreOptions::default(),
  )
  .await?;
  Ok(store)
}

async fn run(loader: DataLoader, skip_ingest: bool) -> Result<()> {
  info!("Starting application...");
  let settings = Settings::from_env()?;
  let client = http_client(&settings)?;

  loader.load()?;
  info!("Processing data...");
  let summary = DatasetSummary::compute(&loader)?;

  let store = Arc::new(connect_store(&settings, &client).await?);

  if !skip_ingest {
    info!("Loading data into vector store...");
    IngestionDriver::new(&loader, &store, IngestOptions::default()).run().await;
  }

  info!("Initializing analyzer and chatbot...");
  let analyzer = DataAnalyzer::new(loader);
  let analyst = HealthcareAnalyst::new(
    Arc::new(OpenAiChat::new(client, &settings.openai)),
    summary,
    settings.openai.chat_model.clone(),
  )
  .with_retriever(store);

  info!("Setup complete! Ready for questions.");
  let stdin = std::io::stdin();
  Session::new(&analyst, &analyzer).run(&mut stdin.lock(), &mut std::io::stdout()).await?;
  Ok(())
}

async fn ingest(loader: DataLoader) -> Result<()> {
  let settings = Settings::from_env()?;
  let client = http_client(&settings)?;
  let store = connect_store(&settings, &client).await?;

  let report = IngestionDriver::new(&loader, &store, IngestOptions::default()).run().await;
  for (file, count) in &report.ingested {
    println!("{} {} records from {}", "✓".green(), count, file.cyan());
  }
  for (file, reason) in &report.skipped {
    println!("{} skipped {}: {}", "✗".red(), file.cyan(), reason);
  }
  Ok(())
}

async fn ask(loader: DataLoader, question: &str) -> Result<()> {
  let settings = Settings::from_env()?;
  let client = http_client(&settings)?;
  let schema = loader.load()?;
  let store = Arc::new(connect_store(&settings, &client).await?);

  let analyst = HealthcareAnalyst::new(
    Arc::new(OpenAiChat::new(client, &settings.openai)),
    DatasetSummary::from_columns(schema.names()),
    settings.openai.chat_model.clone(),
  )
  .with_retriever(store);

  println!("{} {}", "AI Analysis:".green().bold(), analyst.answer(question).await);
  Ok(())
}

fn trends(loader: DataLoader, columns: &[String]) {
  let analyzer = DataAnalyzer::new(loader);
  for (column, trend) in analyzer.analyze_trends(columns) {
    println!("{}", column.blue().bold());
    match trend {
      Trend::Analyzed { distribution, summary } => {
        println!("  {summary}");
        for (value, count) in distribution.iter().take(10) {
          println!("  {value:<24} {count}");
        }
        if distribution.len() > 10 {
          println!("  {}", format!("... {} more values", distribution.len() - 10).dimmed());
        }
      }
      Trend::Failed(message) => println!("  {}", message.red()),
    }
    println!();
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();
  codeblue::logging::init(cli.verbose);

  let loader = DataLoader::new(cli.data_dir.unwrap_or_else(config::default_data_dir));

  match cli.command {
    Command::Run { skip_ingest } => run(loader, skip_ingest).await,
    Command::Ingest => ingest(loader).await,
    Command::Ask { question } => ask(loader, &question.join(" ")).await,
    Command::Summary => {
      let summary = DatasetSummary::compute(&loader)?;
      print!("{summary}");
      Ok(())
    }
    Command::Trends { columns } => {
      trends(loader, &columns);
      Ok(())
    }
    Command::Chart { column, kind } => {
      let chart = DataAnalyzer::new(loader).generate_visualization(&column, kind)?;
      print!("{chart}");
      Ok(())
    }
  }
}
