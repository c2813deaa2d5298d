//! The `deckgen` binary generates flashcard decks from the command line.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use deckgen_cli::config::{api_key, ClientConfig, API_KEY_ENV_VAR};
use deckgen_cli::{CliError, DeckRecord, JsonFileStore, RigBackend};
use deckgen_pipeline::generation::{GenerationConfig, GenerationError, GenerationOrchestrator};
use deckgen_pipeline::schema::{output_schema, DifficultyLevel, GenerationRequest};
use rig::client::{CompletionClient, ProviderClient};
use rig::providers::openai;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a deck for a topic
    Generate {
        /// Topic the deck should cover
        #[arg(long)]
        topic: String,
        /// beginner, intermediate or advanced
        #[arg(long, default_value = "beginner")]
        difficulty: String,
        /// Number of concepts to request (3-7)
        #[arg(long, default_value_t = 5)]
        max_concepts: u32,
        /// Optional restriction on what the deck covers
        #[arg(long)]
        scope: Option<String>,
        /// Model identifier
        #[arg(long, env = "OPENAI_MODEL")]
        model: Option<String>,
        /// Overall deadline for the run, in seconds
        #[arg(long)]
        deadline_secs: Option<u64>,
        /// Send the schema only in the prompt, not as `response_format`
        #[arg(long)]
        no_native_schema: bool,
        /// Directory where decks are stored
        #[arg(long, default_value = "decks")]
        store_dir: PathBuf,
        /// Also write the result to this file
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print the JSON schema the model output must satisfy
    Schema,
    /// Print a previously generated deck
    Show {
        /// Deck identifier
        deck_id: Uuid,
        /// Directory where decks are stored
        #[arg(long, default_value = "decks")]
        store_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match run(cli.command).await {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!(error = %err, "Command failed");
            println!("{}", serde_json::json!({ "error": err.to_payload() }));
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.with_target(false).init();
    }
}

async fn run(command: Commands) -> Result<String, CliError> {
    match command {
        Commands::Generate {
            topic,
            difficulty,
            max_concepts,
            scope,
            model,
            deadline_secs,
            no_native_schema,
            store_dir,
            output,
        } => {
            let difficulty: DifficultyLevel = difficulty.parse().map_err(GenerationError::from)?;
            let request = GenerationRequest::new(topic, difficulty, max_concepts, scope)
                .map_err(GenerationError::from)?;

            let mut client_config =
                ClientConfig::from_env().with_native_structured_output(!no_native_schema);
            if let Some(model) = model {
                client_config = client_config.with_model(model);
            }
            let mut generation_config = GenerationConfig::default();
            if let Some(secs) = deadline_secs {
                generation_config = generation_config.with_deadline(Duration::from_secs(secs));
            }

            let record = generate(&request, client_config, generation_config).await?;
            let store = JsonFileStore::open(store_dir)?;
            let path = store.save(&record)?;
            tracing::info!(deck_id = %record.deck_id, path = %path.display(), "Deck stored");

            let rendered = serde_json::to_string_pretty(&record.payload)?;
            if let Some(output) = output {
                std::fs::write(&output, &rendered)?;
            }
            Ok(rendered)
        }
        Commands::Schema => Ok(serde_json::to_string_pretty(output_schema())?),
        Commands::Show { deck_id, store_dir } => {
            let record = JsonFileStore::open(store_dir)?.load(deck_id)?;
            Ok(serde_json::to_string_pretty(&record.result()?)?)
        }
    }
}

async fn generate(
    request: &GenerationRequest,
    client_config: ClientConfig,
    generation_config: GenerationConfig,
) -> Result<DeckRecord, CliError> {
    if api_key(|key| std::env::var(key).ok()).is_none() {
        return Err(CliError::Config(format!("{API_KEY_ENV_VAR} is not set")));
    }

    let client: openai::Client = openai::Client::from_env();
    let model = client.completion_model(client_config.model.as_str());
    let backend = RigBackend::new(model, client_config);
    let orchestrator = GenerationOrchestrator::with_config(backend, generation_config);

    let start = Instant::now();
    let result = orchestrator.generate(request, Uuid::new_v4()).await?;
    let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

    DeckRecord::from_result(&result, elapsed_ms)
}
