use chrono::{Duration, NaiveDate, Utc};
use clap::Parser;
use tracing::{info, instrument};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use calista_client::{CalistaClient, Config, Device};

#[derive(Parser)]
#[command(name = "calista-history")]
#[command(about = "Download meter reading histories from the ista Calista portal", long_about = None)]
struct Cli {
    /// First day of the range (YYYY-MM-DD), defaults to 30 days before --end
    #[arg(long)]
    start: Option<NaiveDate>,

    /// Last day of the range (YYYY-MM-DD), defaults to today
    #[arg(long)]
    end: Option<NaiveDate>,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing with environment filter support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,calista_client=debug")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true),
        )
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Cli::parse();
    let config = Config::from_env()?;
    info!("Starting calista-history with config: {:?}", config);

    let end = args.end.unwrap_or_else(|| Utc::now().date_naive());
    let start = args.start.unwrap_or(end - Duration::days(30));

    let client = CalistaClient::new(config);
    let history = client.get_devices_history(start, end).await?;

    let mut devices: Vec<&Device> = history.values().collect();
    devices.sort_by(|a, b| a.serial_number().cmp(b.serial_number()));
    info!("Retrieved {} devices for {}", devices.len(), client.account());

    let json = if args.pretty {
        serde_json::to_string_pretty(&devices)?
    } else {
        serde_json::to_string(&devices)?
    };
    println!("{json}");

    Ok(())
}
