use anyhow::{bail, Context, Result};
use apple_ring::{
    input::{InputProvider, RandomInput, StdinInput},
    log,
    observer::{ConsoleObserver, JsonObserver, Observer},
    Coordinator, RingConfig, RingReport,
};
use clap::Parser;
use color_print::cformat;
use std::{
    io::{self, BufRead, Write},
    process::ExitCode,
    sync::Arc,
    time::Duration,
};
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(name = "apple-ring", version, about = "Pass one mailbox around a ring of peers")]
struct Args {
    /// Number of nodes in the ring (prompted for when omitted).
    #[arg(short = 'k', long, value_name = "K", allow_negative_numbers = true)]
    nodes: Option<i64>,

    /// Let node 0 send random messages instead of prompting.
    #[arg(long)]
    auto: bool,

    /// Mean number of autopilot messages per visit of node 0.
    #[arg(long, default_value_t = 0.3, requires = "auto")]
    rate: f64,

    /// Seed for the autopilot.
    #[arg(long, requires = "auto")]
    seed: Option<u64>,

    /// Pause of the autopilot at each prompt, in milliseconds.
    #[arg(long, value_name = "MS", default_value_t = 250, requires = "auto")]
    think_ms: u64,

    /// Print events as JSON lines.
    #[arg(long)]
    json: bool,

    /// Also log every apple hand-off.
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors.
    #[arg(short, long)]
    quiet: bool,
}

fn prompt_ring_size() -> Result<i64> {
    print!("Enter number of nodes k (>=1): ");
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    match line.trim().parse::<i64>() {
        Ok(nodes) => Ok(nodes),
        Err(_) => bail!("invalid ring size {:?}", line.trim()),
    }
}

fn forward_interrupts(tx: mpsc::UnboundedSender<()>) {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if tx.send(()).is_err() {
                break;
            }
        }
    });
}

async fn run(args: Args) -> Result<RingReport> {
    let nodes = match args.nodes {
        Some(nodes) => nodes,
        None => tokio::task::spawn_blocking(prompt_ring_size)
            .await
            .context("ring size prompt died")??,
    };
    let config = RingConfig::new(nodes).context("refusing to start the ring")?;
    if args.auto && !(args.rate.is_finite() && args.rate > 0.0) {
        bail!("autopilot rate must be a positive number, got {}", args.rate);
    }

    let observer: Arc<dyn Observer> = if args.json {
        Arc::new(JsonObserver)
    } else {
        Arc::new(ConsoleObserver)
    };

    let input: Box<dyn InputProvider> = if args.auto {
        let seed = args.seed.unwrap_or_else(rand::random);
        log::info(&cformat!(
            "Autopilot on (rate <bold>{}</bold>, seed <bold>{seed}</bold>).",
            args.rate
        ));
        Box::new(
            RandomInput::new(args.rate, seed)
                .with_think_time(Duration::from_millis(args.think_ms)),
        )
    } else {
        Box::new(StdinInput::new())
    };

    let (tx, interrupts) = mpsc::unbounded_channel();
    forward_interrupts(tx);

    let coordinator = Coordinator::start(&config, observer, input)
        .await
        .context("couldn't start the ring")?;

    Ok(coordinator.run(interrupts).await)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    log::set_level(if args.quiet {
        log::Level::Warn
    } else if args.verbose {
        log::Level::Debug
    } else {
        log::Level::Info
    });

    match run(args).await {
        Ok(report) if report.failures() == 0 => {
            log::info("Ring stopped. Exiting.");
            ExitCode::SUCCESS
        }
        Ok(report) => {
            log::error(&cformat!(
                "Ring stopped with <bold>{}</bold> failed peer(s).",
                report.failures()
            ));
            ExitCode::FAILURE
        }
        Err(e) => {
            log::error(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}
