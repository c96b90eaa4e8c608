use anyhow::Result;
use weblog_agent::{cli, instrumentation};

#[tokio::main]
async fn main() -> Result<()> {
    instrumentation::tracing::init_panic_handler();

    // Tracing is installed by the CLI layer once the config (and its log
    // directory) is known.
    cli::cli::run().await
}
