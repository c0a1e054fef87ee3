use clap::{Parser, Subcommand};
use harness::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use synthesis::{GrSpec, Section, SynthesisError};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "harness")]
#[command(about = "Lunar Lander controllers, GR(1) synthesis and trace monitoring")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a controller over several episodes
    Run {
        /// Controller name (see `controllers`)
        #[arg(short, long)]
        controller: Option<String>,
        #[arg(short, long)]
        episodes: Option<usize>,
        /// Seed of the first episode
        #[arg(short, long)]
        seed: Option<u64>,
        #[arg(long)]
        max_steps: Option<usize>,
        /// TOML configuration file; flags override its values
        #[arg(long)]
        config: Option<PathBuf>,
        /// Write every step to this JSON-lines file
        #[arg(long)]
        record: Option<PathBuf>,
        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// List available controllers
    Controllers,
    /// Synthesize a transducer from a GR(1) specification
    Synthesize {
        spec: PathBuf,
        /// Write the transducer as Graphviz
        #[arg(long)]
        dot: Option<PathBuf>,
        /// Write the transducer as JSON
        #[arg(long)]
        json: Option<PathBuf>,
    },
    /// Validate a specification and print its variables
    Check { spec: PathBuf },
    /// Check LTL properties on controller trajectories
    Monitor {
        #[arg(short, long, default_value = "phase-fsm-v3")]
        controller: String,
        /// Property as `name=formula`, may be repeated
        #[arg(short, long = "property", required = true)]
        properties: Vec<String>,
        #[arg(short, long, default_value = "10")]
        episodes: usize,
        #[arg(short, long, default_value = "0")]
        seed: u64,
        /// Evaluate propositions with the relaxed thresholds
        #[arg(long)]
        relaxed: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            controller,
            episodes,
            seed,
            max_steps,
            config,
            record,
            json,
        } => {
            let mut harness_config = match config {
                Some(path) => HarnessConfig::load(&path)?,
                None => HarnessConfig::default(),
            };
            if let Some(controller) = controller {
                harness_config.controller = controller;
            }
            if let Some(episodes) = episodes {
                harness_config.episodes = episodes;
            }
            if let Some(seed) = seed {
                harness_config.seed = seed;
            }
            if let Some(max_steps) = max_steps {
                harness_config.max_steps = max_steps;
            }
            if record.is_some() {
                harness_config.record = record;
            }
            run(harness_config, json).await?;
        }
        Commands::Controllers => {
            list_controllers();
        }
        Commands::Synthesize { spec, dot, json } => {
            synthesize(&spec, dot, json)?;
        }
        Commands::Check { spec } => {
            check(&spec)?;
        }
        Commands::Monitor {
            controller,
            properties,
            episodes,
            seed,
            relaxed,
        } => {
            let thresholds = if relaxed {
                Thresholds::RELAXED
            } else {
                Thresholds::TIGHT
            };
            let mut config = HarnessConfig::new()
                .with_controller(controller)
                .with_episodes(episodes)
                .with_seed(seed)
                .with_monitor_thresholds(thresholds);
            config.properties = properties;
            monitor(config).await?;
        }
    }

    Ok(())
}

async fn run(config: HarnessConfig, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let runner = EpisodeRunner::new(config, Arc::new(ControllerRegistry::with_defaults()))?;
    let summary = runner.run().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Run {} ({})", summary.run_id, summary.controller);
    for episode in &summary.episodes {
        println!(
            "  episode {:>3}  seed {:>5}  steps {:>4}  return {:>8.2}  {:?}{}",
            episode.episode,
            episode.seed,
            episode.steps,
            episode.total_reward,
            episode.end,
            if episode.success { "  success" } else { "" }
        );
    }
    println!(
        "Success rate: {:.2}% ({}/{}), mean return {:.2}",
        summary.success_rate,
        summary.successes,
        summary.episodes.len(),
        summary.mean_reward
    );
    Ok(())
}

fn list_controllers() {
    let registry = ControllerRegistry::with_defaults();
    println!("Available controllers:");
    for (name, description) in registry.describe() {
        println!("  {} - {}", name, description);
    }
}

fn synthesize(
    path: &Path,
    dot: Option<PathBuf>,
    json: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let spec = GrSpec::load(path)?;
    info!("Synthesizing '{}'", spec.name);

    let transducer = match synthesis::synthesize(&spec) {
        Ok(transducer) => transducer,
        Err(SynthesisError::Unrealizable) => {
            error!("Specification '{}' is unrealizable", spec.name);
            println!("{}: unrealizable", spec.name);
            return Err(SynthesisError::Unrealizable.into());
        }
        Err(e) => return Err(e.into()),
    };

    println!(
        "{}: realizable, {} states, {} initial",
        spec.name,
        transducer.len(),
        transducer.initial_states().len()
    );

    if let Some(dot) = dot {
        std::fs::write(&dot, transducer.to_dot())?;
        println!("Wrote {}", dot.display());
    }
    if let Some(json) = json {
        transducer.save(&json)?;
        println!("Wrote {}", json.display());
    }
    Ok(())
}

fn check(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let spec = GrSpec::load(path)?;
    println!("Specification: {}", spec.name);
    println!(
        "  {} semantics, initial condition {}",
        if spec.moore { "Moore" } else { "Mealy" },
        spec.qinit
    );

    println!("Environment variables:");
    for (name, domain) in spec.env_vars.iter() {
        println!("  {}: {}", name, domain);
    }
    println!("System variables:");
    for (name, domain) in spec.sys_vars.iter() {
        println!("  {}: {}", name, domain);
    }

    println!("Formulas:");
    for section in Section::ALL {
        let formulas = spec.section(section);
        if !formulas.is_empty() {
            println!("  {} ({})", section, formulas.len());
        }
    }
    Ok(())
}

async fn monitor(config: HarnessConfig) -> Result<(), Box<dyn std::error::Error>> {
    let runner = EpisodeRunner::new(config, Arc::new(ControllerRegistry::with_defaults()))?;
    let summary = runner.run().await?;

    for episode in &summary.episodes {
        let Some(report) = &episode.monitor else {
            continue;
        };
        println!("Episode {} (seed {}):", episode.episode, episode.seed);
        for result in &report.results {
            println!("  {}: {}", result.name, result.verdict);
        }
    }
    println!(
        "{} of {} episodes violated a property",
        summary.monitor_violations(),
        summary.episodes.len()
    );
    Ok(())
}
