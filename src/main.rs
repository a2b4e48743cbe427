use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use workbench::service::server::{start_server, ServerConfig};
use workbench::workspace::executor::ExecutorConfig;

#[derive(Parser)]
#[command(name = "workbench")]
#[command(version, about = "Workspace command-execution service")]
struct Cli {
    /// Port to listen on
    #[arg(short, long, default_value_t = 3000)]
    port: u16,

    /// Directory holding the per-repository checkouts
    #[arg(long, default_value = "workspaces")]
    workspaces_dir: PathBuf,

    /// Seconds to wait for a dev server ready signal
    #[arg(long, default_value_t = 3)]
    dev_server_wait: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let executor = ExecutorConfig {
        git_author_name: std::env::var("WORKBENCH_GIT_AUTHOR_NAME")
            .unwrap_or_else(|_| "workbench".to_string()),
        git_author_email: std::env::var("WORKBENCH_GIT_AUTHOR_EMAIL")
            .unwrap_or_else(|_| "workbench@localhost".to_string()),
        default_branch: std::env::var("WORKBENCH_DEFAULT_BRANCH")
            .unwrap_or_else(|_| "main".to_string()),
        dev_server_wait: Duration::from_secs(cli.dev_server_wait),
        ..Default::default()
    };

    start_server(ServerConfig {
        port: cli.port,
        workspaces_root: cli.workspaces_dir,
        executor,
    })
    .await
}
