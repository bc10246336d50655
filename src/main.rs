//! analyst-engine — a headless driver for the staged analytical pipeline.

mod cli;
mod logging;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use analyst_engine::config::EngineConfig;
use analyst_engine::db::{DatabaseClient, PostgresClient};
use analyst_engine::error::Result;
use analyst_engine::llm::{cache, LlmClient, OllamaClient};
use analyst_engine::pipeline::{
    registry, Descriptor, FetchData, GenerateSql, Orchestrator, PipelineState, ReportGenerator,
    SplitQuery, Subgraph, SubgraphKind,
};
use cli::{Cli, Command, SubgraphCommand};
use futures::stream::StreamExt;

#[tokio::main]
async fn main() {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: failed to load .env file: {e}");
        }
    }

    logging::init_logging();

    let cli = Cli::parse_args();
    if let Err(e) = run(cli).await {
        error!(category = e.category(), "{e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config_path();
    info!(path = %config_path.display(), "loading config");
    let mut config = EngineConfig::load_from_file(&config_path)?;
    apply_overrides(&mut config, &cli);

    let db = build_db_client(&config).await?;
    let llm = build_llm_client(&config)?;

    match cli.command {
        Command::Run { query } => {
            let orchestrator = build_orchestrator(&config, Arc::clone(&llm), Arc::clone(&db))?;
            let state = orchestrator.invoke(query, CancellationToken::new()).await;
            print_state(&state);
        }
        Command::Stream { query } => {
            let orchestrator = Arc::new(build_orchestrator(&config, Arc::clone(&llm), Arc::clone(&db))?);
            let mut snapshots = orchestrator.stream(query, CancellationToken::new());
            while let Some(state) = snapshots.next().await {
                print_state(&state);
                println!("---");
            }
        }
        Command::Subgraph(sub) => run_subgraph_command(sub, &config, llm, db).await?,
    }

    Ok(())
}

fn apply_overrides(config: &mut EngineConfig, cli: &Cli) {
    if let Some(url) = &cli.db_url {
        config.db.url = Some(url.clone());
    }
    if let Some(base_url) = &cli.llm_base_url {
        config.llm.base_url = base_url.clone();
    }
    if let Some(model) = &cli.llm_model {
        config.llm.model_name = model.clone();
    }
    if cli.parallel {
        config.pipeline.parallel_plan_steps = true;
    }
}

async fn build_db_client(config: &EngineConfig) -> Result<Arc<dyn DatabaseClient>> {
    let client = PostgresClient::connect(&config.db).await?;
    Ok(Arc::new(client))
}

fn build_llm_client(config: &EngineConfig) -> Result<Arc<dyn LlmClient>> {
    let llm_config = config.llm.clone();
    cache::get_or_create(None, move || {
        let client = OllamaClient::new(llm_config)?;
        Ok(Arc::new(client) as Arc<dyn LlmClient>)
    })
}

fn build_orchestrator(
    config: &EngineConfig,
    llm: Arc<dyn LlmClient>,
    db: Arc<dyn DatabaseClient>,
) -> Result<Orchestrator> {
    let report_llm: Arc<dyn LlmClient> =
        Arc::new(OllamaClient::new(config.llm.for_long_output())?);
    Ok(Orchestrator::new(
        SplitQuery::new(Arc::clone(&llm), config.pipeline.retry_budget_split),
        GenerateSql::new(Arc::clone(&llm), Arc::clone(&db), config.pipeline.retry_budget_sql),
        FetchData::new(Arc::clone(&db)),
        ReportGenerator::new(report_llm),
        config.pipeline.parallel_plan_steps,
    ))
}

async fn run_subgraph_command(
    command: SubgraphCommand,
    config: &EngineConfig,
    llm: Arc<dyn LlmClient>,
    db: Arc<dyn DatabaseClient>,
) -> Result<()> {
    match command {
        SubgraphCommand::List => {
            for name in registry::list() {
                println!("{name}");
            }
        }
        SubgraphCommand::Get { name } => match registry::get(&name) {
            Some(descriptor) => println!("{}: {} {}", descriptor.name, descriptor.kind, descriptor.config),
            None => {
                eprintln!("no subgraph registered under '{name}'");
                std::process::exit(1);
            }
        },
        SubgraphCommand::Remove { name } => {
            if !registry::remove(&name) {
                eprintln!("no subgraph registered under '{name}'");
                std::process::exit(1);
            }
        }
        SubgraphCommand::RegisterDefaults => {
            register_defaults(config, Arc::clone(&llm), Arc::clone(&db));
            for name in registry::list() {
                println!("registered {name}");
            }
        }
        SubgraphCommand::Run { name, query } => {
            let state = registry::invoke(&name, PipelineState::new(query)).await?;
            print_state(&state);
        }
    }
    Ok(())
}

fn register_defaults(config: &EngineConfig, llm: Arc<dyn LlmClient>, db: Arc<dyn DatabaseClient>) {
    let split: Arc<dyn Subgraph> = Arc::new(SplitQuery::new(
        Arc::clone(&llm),
        config.pipeline.retry_budget_split,
    ));
    registry::register(Descriptor::new(
        "split_query",
        SubgraphKind::SplitQuery,
        serde_json::json!({"retry_budget": config.pipeline.retry_budget_split}),
        split,
    ));

    let generate: Arc<dyn Subgraph> = Arc::new(GenerateSql::new(
        Arc::clone(&llm),
        Arc::clone(&db),
        config.pipeline.retry_budget_sql,
    ));
    registry::register(Descriptor::new(
        "generate_sql",
        SubgraphKind::GenerateSql,
        serde_json::json!({"retry_budget": config.pipeline.retry_budget_sql}),
        generate,
    ));

    let fetch: Arc<dyn Subgraph> = Arc::new(FetchData::new(Arc::clone(&db)));
    registry::register(Descriptor::new(
        "fetch_data",
        SubgraphKind::FetchData,
        serde_json::json!({}),
        fetch,
    ));
}

fn print_state(state: &PipelineState) {
    match &state.report {
        Some(report) => println!("{report}"),
        None => {
            println!("(no report yet — plan: {:?}, stage: {})", state.plan, state
                .history
                .last()
                .map(|h| h.stage)
                .unwrap_or("none"));
        }
    }
}
