use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use rl_sandbox::config::SandboxConfig;
use rl_sandbox::env::EnvKind;
use rl_sandbox::modes::{
    NullObserver, PlaybackSession, SessionControl, TrainingSession, VisualizationSpeed,
};
use rl_sandbox::rl::{AgentKind, FileModelStore, TrainingBackend, default_device, model_name};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rl_sandbox")]
#[command(version, about = "Reinforcement-learning sandbox with balance and grid environments")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train an agent and save it to the model directory
    Train(SessionArgs),
    /// Play back a saved agent without learning
    Play(SessionArgs),
}

#[derive(Args)]
struct SessionArgs {
    /// JSON configuration file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum)]
    env: Option<EnvKind>,

    /// Defaults to ppo for balance and tabular for grid
    #[arg(long, value_enum)]
    agent: Option<AgentKind>,

    /// Number of episodes
    #[arg(long)]
    episodes: Option<usize>,

    /// Maximum steps per episode
    #[arg(long)]
    steps: Option<usize>,

    /// Pace training steps for watching
    #[arg(long)]
    visualize: bool,

    #[arg(long, value_enum)]
    speed: Option<VisualizationSpeed>,

    /// Continue from the saved model instead of starting fresh
    #[arg(long)]
    resume: bool,

    #[arg(long, default_value = "models")]
    model_dir: PathBuf,

    #[arg(long)]
    seed: Option<u64>,
}

impl SessionArgs {
    fn sandbox_config(&self) -> Result<SandboxConfig> {
        let mut config = match &self.config {
            Some(path) => SandboxConfig::from_file(path)?,
            None => SandboxConfig::default(),
        };

        if let Some(env) = self.env {
            if config.env != env {
                config.env = env;
                config.session = None;
            }
        }
        if self.agent.is_some() {
            config.agent = self.agent;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }

        let session = config.session_mut();
        if let Some(episodes) = self.episodes {
            session.episodes = episodes;
        }
        if let Some(steps) = self.steps {
            session.step_budget = steps;
        }
        if let Some(speed) = self.speed {
            session.speed = speed;
        }
        session.visualize |= self.visualize;
        session.resume |= self.resume;

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

/// Interrupt `control` on Ctrl-C
fn interrupt_on_ctrl_c(control: SessionControl) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt requested");
            control.interrupt();
        }
    });
}

async fn train(args: SessionArgs) -> Result<()> {
    let config = args.sandbox_config()?;
    let env = config.build_environment()?;
    let agent = config.build_agent::<TrainingBackend>(&env, default_device());
    let mut session = TrainingSession::new(env, agent, config.session())?;
    interrupt_on_ctrl_c(session.control());

    let mut store = FileModelStore::new(&args.model_dir);
    let report = session.train(&mut store, &mut NullObserver).await?;

    println!(
        "Episodes completed: {} ({:?})",
        report.episodes_completed, report.state
    );
    println!("{}", report.stats.format_summary());
    Ok(())
}

async fn play(args: SessionArgs) -> Result<()> {
    let config = args.sandbox_config()?;
    let env = config.build_environment()?;
    let mut agent = config.build_agent::<TrainingBackend>(&env, default_device());

    let store = FileModelStore::new(&args.model_dir);
    let name = model_name(config.env, config.agent_kind());
    if !agent.load_model(&store, &name, config.env) {
        bail!("No saved model '{}' in {:?}", name, args.model_dir);
    }

    let session_config = config.session();
    let mut session = PlaybackSession::new(env, agent, session_config.step_budget)?;
    interrupt_on_ctrl_c(session.control());

    for episode in 0..session_config.episodes.max(1) {
        let summary = session.play(&mut NullObserver).await;
        println!(
            "Episode {}: reward {:.2}, {} steps{}",
            episode + 1,
            summary.reward,
            summary.steps,
            if summary.terminated { ", terminated" } else { "" }
        );
        if summary.interrupted {
            info!("playback interrupted");
            break;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Train(args) => train(args).await,
        Command::Play(args) => play(args).await,
    }
}
