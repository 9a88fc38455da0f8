//! Run the IPO pipeline once and print the JSON response to stdout.
//! Exit code 1 when the pipeline fails.

use anyhow::Context;
use ipo_gmp_tracker::{init_tracing, RequestHandler, TrackerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = TrackerConfig::load_default().context("loading tracker config")?;
    let handler = RequestHandler::from_config(&cfg)?;

    match handler.handle().await {
        Ok(out) => {
            println!("{}", serde_json::to_string_pretty(&out.payload)?);
            eprintln!("model: {}", out.model);
            Ok(())
        }
        Err(e) => {
            println!("{}", serde_json::to_string_pretty(&e.body())?);
            std::process::exit(1);
        }
    }
}
