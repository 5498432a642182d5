mod daemon;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use cortexd::config::Config;
use cortexd::processing::{HttpModelClient, ModelClient, SyntheticModelClient};
use cortexd::storage::{Inbox, Outbox, PerceptStore, ThreadStore, TraceStore};

#[derive(Parser)]
#[command(name = "cortexd", version, about = "cortexd — cognitive agent daemon")]
struct App {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon in the foreground
    Run,
    /// Show store and budget status from on-disk state
    Status,
    /// Seed core identity traces from a markdown file
    Seed {
        /// Seed file: entries separated by `---` lines
        file: PathBuf,
    },
}

fn main() {
    let app = App::parse();
    let result = match app.command.unwrap_or(Commands::Run) {
        Commands::Run => daemon::run(),
        Commands::Status => status(),
        Commands::Seed { file } => seed(&file),
    };
    if let Err(e) = result {
        eprintln!("cortexd: {:#}", e);
        std::process::exit(1);
    }
}

/// The model backend the configuration asks for.
pub fn build_model(config: &Config) -> Arc<dyn ModelClient> {
    if config.synthetic {
        Arc::new(SyntheticModelClient::new())
    } else {
        Arc::new(HttpModelClient::new(
            &config.model_base_url,
            config.model_api_key.clone(),
            &config.model,
            &config.embed_model,
        ))
    }
}

fn status() -> anyhow::Result<()> {
    let config = Config::load()?;
    cortexd::tracing_init::init_stderr_tracing();

    let inbox = Inbox::new(&config.state_path);
    let outbox = Outbox::new(&config.state_path);
    let percepts = PerceptStore::new(&config.state_path);
    let threads = ThreadStore::new(&config.state_path);
    let traces = TraceStore::new(&config.state_path);
    inbox.load()?;
    outbox.load()?;
    percepts.load()?;
    threads.load()?;
    traces.load()?;

    println!("state path:      {}", config.state_path.display());
    println!("threads:         {}", threads.count());
    println!("traces:          {} ({} core)", traces.len(), traces.count_core());
    println!("percepts:        {}", percepts.len());
    println!("inbox pending:   {}", inbox.pending_count());
    println!("outbox pending:  {}", outbox.pending_count());
    Ok(())
}

fn seed(file: &PathBuf) -> anyhow::Result<()> {
    let config = Config::load()?;
    cortexd::tracing_init::init_stderr_tracing();
    cortexd::storage::path_utils::ensure_state_dir(&config.state_path)?;

    let model = build_model(&config);
    let traces = TraceStore::new(&config.state_path);
    traces.load()?;
    let created = traces.bootstrap_from_seed(file, model.as_ref())?;
    traces.save()?;
    println!("seeded {} core traces ({} total)", created, traces.len());
    Ok(())
}
