use clap::Parser;
use tracing_subscriber::EnvFilter;
use was_client::ClientConfig;

mod client;
mod term;

#[derive(Parser)]
#[command(name = "was")]
#[command(about = "Log in and start a two-player game on a was server", long_about = None)]
struct Cli {
    /// Server origin [default: $WAS_ORIGIN or http://localhost:8080]
    #[arg(short, long)]
    server: Option<String>,

    /// Application directory under /data/ [default: $WAS_APP or Golf_distance]
    #[arg(short, long)]
    app: Option<String>,

    /// User name to resume, as if it came from a shared link
    #[arg(short, long)]
    user: Option<String>,

    /// Poll interval in milliseconds [default: $WAS_POLL_MS or 1000]
    #[arg(long)]
    poll_ms: Option<u64>,

    /// The app has no games: stop after logging in
    #[arg(long)]
    user_only: bool,

    /// Print the apps hosted by the server and exit
    #[arg(long)]
    list_apps: bool,
}

impl Cli {
    /// Command-line flags override the environment.
    fn config(&self) -> ClientConfig {
        let mut config = ClientConfig::from_env();
        if let Some(server) = &self.server {
            config.origin = server.trim_end_matches('/').to_string();
        }
        if let Some(app) = &self.app {
            config.app = app.clone();
        }
        if let Some(ms) = self.poll_ms.filter(|&ms| ms > 0) {
            config.poll_interval = std::time::Duration::from_millis(ms);
        }
        config
    }
}

#[tokio::main]
async fn main() {
    // Logs go to stderr so they don't interleave with the pages on stdout.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.config();

    if cli.list_apps {
        match was_client::list_apps(&config.origin).await {
            Ok(apps) => term::print_apps(&apps),
            Err(e) => eprintln!("Error: {}", e),
        }
        return;
    }

    println!("Connecting to {}...", config.data_url());
    if let Err(e) = client::start_client(&config, cli.user.as_deref(), cli.user_only).await {
        eprintln!("Error: {}", e);
    }
}
