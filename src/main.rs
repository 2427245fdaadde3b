use clap::Parser;
use tracing_subscriber::EnvFilter;

use retiresim::api::{ServerConfig, run_http_server};

#[derive(Parser, Debug)]
#[command(
    name = "retiresim",
    about = "Monte Carlo household retirement simulation service"
)]
struct Cli {
    /// Port to bind the HTTP server on.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    port: u16,
    /// Bearer token required on simulation requests.
    #[arg(long, env = "AUTH_TOKEN")]
    auth_token: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = ServerConfig {
        port: cli.port,
        auth_token: cli.auth_token,
    };

    if let Err(e) = run_http_server(config).await {
        eprintln!("Server error: {e}");
        std::process::exit(1);
    }
}
