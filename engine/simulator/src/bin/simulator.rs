//! Market simulator binary: one thread per agent, each embedding its own
//! I/O loop. Agent `i` is seeded with `seed_base + i` on stream `i`.

use anyhow::{Context, Result};
use clap::Parser;
use simulator::{MarketSimulator, PcgSource, SimulatorConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "simulator", about = "Agent-based market simulator for the exchange")]
struct Args {
    /// Exchange host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Exchange port
    #[arg(long, default_value_t = 16000)]
    port: u16,

    /// Number of concurrent agents
    #[arg(long, default_value_t = 1)]
    agents: usize,

    /// Base RNG seed; agent i uses seed_base + i
    #[arg(long, default_value_t = 0)]
    seed_base: u64,
}

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let agents = args.agents.max(1);
    info!(host = %args.host, port = args.port, agents, "starting agents");

    let mut handles = Vec::with_capacity(agents);
    for index in 0..agents {
        let config = SimulatorConfig {
            host: args.host.clone(),
            port: args.port,
            seed: args.seed_base + index as u64,
            stream: index as u64,
        };
        let handle = std::thread::Builder::new()
            .name(format!("agent-{index}"))
            .spawn(move || run_agent(config))
            .context("failed to spawn agent thread")?;
        handles.push(handle);
    }

    for handle in handles {
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "agent exited with error"),
            Err(_) => error!("agent thread panicked"),
        }
    }
    Ok(())
}

fn run_agent(config: SimulatorConfig) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build agent runtime")?;

    runtime.block_on(async move {
        let rng = Box::new(PcgSource::new(config.seed, config.stream));
        let agent = MarketSimulator::<3>::connect(&config, rng, [1, 5, 10])
            .await
            .context("failed to connect to exchange")?;
        agent.run().await.context("agent stopped")
    })
}
