use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgMatches, Command};
use msense_core::{load_dotenv, FeatureVector, PredictionCache, Scorer, ServiceConfig};
use msense_scoring::{ArtifactPaths, ScorerHandle};
use msense_service::{init_logging, serve, LogFormat, Refresher};
use msense_telemetry::{CredentialChain, DynamoClient, DynamoSource};
use std::path::PathBuf;
use tokio::sync::watch;

fn cli() -> Command {
    Command::new("msense")
        .version(msense_service::VERSION)
        .about("Live fatigue prediction service")
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML file with defaults under the environment"),
        )
        .arg(
            Arg::new("env-file")
                .long("env-file")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Dotenv file to load first [default: .env if present]"),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .global(true)
                .default_value("text")
                .value_parser(["text", "json"])
                .help("Log line format"),
        )
        .subcommand(Command::new("serve").about("Run the refresher and the HTTP server (default)"))
        .subcommand(
            Command::new("verify-store")
                .about("Check store credentials by listing the visible tables"),
        )
        .subcommand(
            Command::new("score")
                .about("Score one feature vector against the model artifacts")
                .arg(
                    Arg::new("features")
                        .required(true)
                        .num_args(5)
                        .allow_negative_numbers(true)
                        .value_parser(value_parser!(f64))
                        .help("heart_rate rmssd temperature steps sleep_duration"),
                )
                .arg(
                    Arg::new("model-dir")
                        .long("model-dir")
                        .default_value("models")
                        .value_parser(value_parser!(PathBuf))
                        .help("Directory holding the scoring artifacts"),
                ),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    let dotenv = load_dotenv(matches.get_one::<PathBuf>("env-file").map(PathBuf::as_path));

    let format: LogFormat = matches
        .get_one::<String>("log-format")
        .map_or(Ok(LogFormat::Text), |s| s.parse())
        .map_err(anyhow::Error::msg)?;
    init_logging(format).map_err(|e| anyhow::anyhow!("cannot initialise logging: {e}"))?;
    if let Some(path) = dotenv.context("invalid env file")? {
        tracing::info!("Loaded environment from {}", path.display());
    }

    let config_file = matches.get_one::<PathBuf>("config").cloned();

    match matches.subcommand() {
        Some(("verify-store", _)) => verify_store(config_file).await,
        Some(("score", args)) => score(args),
        _ => run_service(config_file).await,
    }
}

fn load_config(file: Option<PathBuf>) -> Result<ServiceConfig> {
    ServiceConfig::load(file.as_deref()).context("invalid configuration")
}

async fn run_service(config_file: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_file)?;
    tracing::info!(
        "Starting prediction service: region {}, table {}, bind {}",
        config.store.region,
        config.store.table,
        config.bind
    );

    let paths = ArtifactPaths::in_dir(&config.model_dir);
    let scorer = if config.require_artifacts {
        ScorerHandle::load(&paths).context("scoring artifacts required but unusable")?
    } else {
        ScorerHandle::load_or_unavailable(&paths)
    };
    let source = DynamoSource::from_config(&config.store).context("cannot build store client")?;

    let (cache, publisher) = PredictionCache::with_publisher();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let refresher = Refresher::new(publisher, source, scorer)
        .with_intervals(config.refresh_interval(), config.retry_interval());
    let refresh_task = tokio::spawn(refresher.run(shutdown_rx));

    let signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Cannot listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutdown requested");
        let _ = shutdown_tx.send(true);
    };

    serve(config.bind, cache, signal).await?;

    let summary = refresh_task.await.context("refresher task panicked")?;
    tracing::info!(
        "Service stopped: {} cycles, last success {:?}",
        summary.cycles,
        summary.last_success
    );
    Ok(())
}

async fn verify_store(config_file: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_file)?;
    let chain = CredentialChain::from_env();

    println!("Checking store access...");
    println!("Region: {}", config.store.region);
    println!("Credential sources: {}", chain.describe());

    let client = DynamoClient::new(&config.store, chain)?;
    println!("Endpoint: {}", client.endpoint());

    let credentials = match client.resolve_credentials().await {
        Ok(credentials) => credentials,
        Err(e) => {
            println!("Error: {e}");
            print_hints();
            bail!("no usable store credentials");
        }
    };
    println!("Access key: {}", credentials.access_key_id);

    match client.list_tables().await {
        Ok(tables) => {
            println!("Credentials are valid. Tables:");
            for table in &tables {
                println!("  - {table}");
            }
            if !tables.iter().any(|t| t == &config.store.table) {
                println!("Warning: configured table {} is not listed", config.store.table);
            }
            Ok(())
        }
        Err(e) => {
            println!("Error: {e}");
            if e.is_auth_failure() {
                println!("The store rejected the credentials.");
            }
            print_hints();
            Err(e.into())
        }
    }
}

fn print_hints() {
    println!();
    println!("Troubleshooting:");
    println!("  1. Check the AWS_* entries in your .env file or environment");
    println!("  2. Check the AWS_PROFILE section of ~/.aws/credentials, if you use one");
    println!("  3. Check that the key is active and not expired");
    println!("  4. Ensure the IAM user or role has DynamoDB permissions");
    println!("  5. Verify AWS_REGION matches the region of the table");
}

fn score(args: &ArgMatches) -> Result<()> {
    let values: Vec<f64> = args
        .get_many::<f64>("features")
        .context("features are required")?
        .copied()
        .collect();
    let features: [f64; 5] = values
        .try_into()
        .map_err(|_| anyhow::anyhow!("expected exactly five feature values"))?;

    let dir = args
        .get_one::<PathBuf>("model-dir")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("models"));
    let handle = ScorerHandle::load(&ArtifactPaths::in_dir(dir))?;
    let scores = handle.score(&FeatureVector::from_array(features))?;

    println!("{}", serde_json::to_string(&scores.values())?);
    Ok(())
}
