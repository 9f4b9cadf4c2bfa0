use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod human;

use commands::{CliError, RunArgs, run, sample_injector, validate};

#[derive(Parser, Debug)]
#[command(name = "lifeline", version)]
#[command(about = "Lifeline CLI - resilient step execution for reasoning agents")]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a task through a fixed plan
    Run {
        /// Engine configuration (YAML)
        #[arg(long)]
        config: Option<PathBuf>,
        /// The user query the plan answers
        #[arg(long)]
        query: String,
        /// A step as CAPABILITY=JSON_ARGS, e.g. add=[5,3]; repeatable
        #[arg(long = "step", required = true)]
        steps: Vec<String>,
        /// Persist session summaries under this directory
        #[arg(long)]
        memory_dir: Option<PathBuf>,
    },
    /// Check a configuration file and print a summary
    ValidateConfig {
        /// Engine configuration (YAML)
        path: PathBuf,
    },
    /// Draw samples from the failure injector and print the distribution
    SampleInjector {
        /// Number of samples
        #[arg(default_value_t = 1000)]
        samples: usize,
        /// Engine configuration (YAML)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Override the configured failure rate
        #[arg(long)]
        rate: Option<f64>,
        /// Seed for reproducible sampling
        #[arg(long)]
        seed: Option<u64>,
    },
}

fn init_tracing(json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

fn print_json(value: &impl serde::Serialize) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.json);

    let outcome = match cli.command {
        Commands::Run {
            config,
            query,
            steps,
            memory_dir,
        } => {
            let args = RunArgs {
                config,
                query,
                steps,
                memory_dir,
            };
            match run(args).await {
                Ok(result) => {
                    let failed = result.outcome.error().is_some();
                    print_json(&result).map(|()| failed)
                }
                Err(e) => Err(e),
            }
        }
        Commands::ValidateConfig { path } => validate(&path).and_then(|summary| print_json(&summary)).map(|()| false),
        Commands::SampleInjector {
            samples,
            config,
            rate,
            seed,
        } => sample_injector(config.as_deref(), samples, rate, seed)
            .and_then(|summary| print_json(&summary))
            .map(|()| false),
    };

    match outcome {
        Ok(false) => {}
        Ok(true) => std::process::exit(1),
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("error: {e}");
            std::process::exit(2);
        }
    }
}
