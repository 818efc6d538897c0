use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{json, Value};

use status_patterns::errors::{ComposeError, Result};
use status_patterns::patterns::Registry;
use status_patterns::{annotate_pool, run_cycle, Channel};

/// Compose one status message from a pool of report records.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Candidate pool as a JSON object mapping record id to record data.
    pool: String,
    /// Recently posted messages as a JSON array of strings.
    #[arg(long, default_value = "[]")]
    recent: String,
    /// Service url substituted for {service_url} and used to annotate records.
    #[arg(long, default_value = "reports.example.org")]
    service_url: String,
    /// Seed for reproducible selection (optional).
    #[arg(long)]
    seed: Option<u64>,
}

/// A channel that "posts" to stdout; the recent timeline comes from the CLI.
struct StdoutChannel {
    recent: Vec<String>,
}

impl Channel for StdoutChannel {
    fn recent(&mut self) -> Result<Vec<String>> {
        Ok(self.recent.clone())
    }

    fn post(&mut self, message: &str) -> Result<()> {
        println!("{message}");
        Ok(())
    }
}

fn main() {
    tracing_subscriber::fmt().with_target(false).init();

    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let pool: Value = serde_json::from_str(&args.pool)
        .map_err(|e| ComposeError::Channel(format!("invalid pool JSON: {e}")))?;
    let Value::Object(mut pool) = pool else {
        return Err(ComposeError::Channel(
            "pool must be a JSON object of id -> record".into(),
        ));
    };

    let recent: Vec<String> = serde_json::from_str(&args.recent)
        .map_err(|e| ComposeError::Channel(format!("invalid recent-messages JSON: {e}")))?;

    annotate_pool(&mut pool, &args.service_url);

    let registry = Registry::with_builtins()?;
    let extra = json!({"service_url": args.service_url});
    let mut channel = StdoutChannel { recent };
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let posted = run_cycle(&mut channel, &mut pool, &registry, &extra, &mut rng)?;
    if posted.is_none() {
        eprintln!("Nothing to post");
    }
    Ok(())
}
