#![forbid(unsafe_code)]

use std::time::{Duration, Instant};

use clap::Parser;
use reqwest::StatusCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Paced request generator for exercising the rate limiter"
)]
struct Cli {
    /// Target URL
    #[arg(long, default_value = "http://127.0.0.1:5000/")]
    url: String,

    /// Requests fired per one-second window
    #[arg(long, default_value_t = 10)]
    rps: u32,

    /// Number of one-second windows to run
    #[arg(long, default_value_t = 10)]
    duration: u64,
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    success: u64,
    denied: u64,
    other: u64,
    errors: u64,
}

impl Tally {
    fn absorb(&mut self, round: Tally) {
        self.success += round.success;
        self.denied += round.denied;
        self.other += round.other;
        self.errors += round.errors;
    }

    fn sent(&self) -> u64 {
        self.success + self.denied + self.other + self.errors
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    info!(url = %cli.url, rps = cli.rps, duration_s = cli.duration, "starting load run");
    match run(&cli).await {
        Ok(totals) => {
            info!(
                sent = totals.sent(),
                success = totals.success,
                denied = totals.denied,
                other = totals.other,
                errors = totals.errors,
                "load run complete"
            );
        }
        Err(err) => {
            error!(%err, "failed to build HTTP client");
            std::process::exit(1);
        }
    }
}

/// Fire `rps` concurrent requests each second and classify the outcomes.
/// A window lasts at least one second even when every response is fast.
async fn run(cli: &Cli) -> Result<Tally, reqwest::Error> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?;

    let started = Instant::now();
    let mut totals = Tally::default();
    for _ in 0..cli.duration {
        let window_deadline = tokio::time::Instant::now() + Duration::from_secs(1);

        let mut handles = Vec::with_capacity(cli.rps as usize);
        for _ in 0..cli.rps {
            let client = client.clone();
            let url = cli.url.clone();
            handles.push(tokio::spawn(async move { fetch(&client, &url).await }));
        }

        let mut round = Tally::default();
        for handle in handles {
            match handle.await {
                Ok(Some(status)) if status.is_success() => round.success += 1,
                Ok(Some(status)) if status == StatusCode::TOO_MANY_REQUESTS => round.denied += 1,
                Ok(Some(_)) => round.other += 1,
                _ => round.errors += 1,
            }
        }
        totals.absorb(round);
        info!(
            elapsed_s = started.elapsed().as_secs(),
            sent = round.sent(),
            success = round.success,
            denied = round.denied,
            other = round.other,
            errors = round.errors,
            "window complete"
        );

        tokio::time::sleep_until(window_deadline).await;
    }
    Ok(totals)
}

async fn fetch(client: &reqwest::Client, url: &str) -> Option<StatusCode> {
    let resp = client.get(url).send().await.ok()?;
    let status = resp.status();
    resp.bytes().await.ok()?;
    Some(status)
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}
