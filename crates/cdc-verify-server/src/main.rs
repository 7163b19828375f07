//! cdc-verify server: entry point.

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use cdc_verify::{parse_details_page, parse_results_table, VerificationFlow};
use cdc_verify_server::config::{resolve_bind_addr, resolve_site_config, ConfigOverrides};
use cdc_verify_server::{ActionRegistry, HttpTransport};

#[derive(Parser)]
#[command(
    name = "cdc-verify-server",
    about = "CDC verification server: captcha-guarded record lookup with vessel enrichment",
    version
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP action server (default).
    Serve {
        /// Listen address (host:port). Also reads CDC_BIND_ADDR.
        #[arg(long)]
        addr: Option<String>,

        /// Records site root. Also reads CDC_SITE_URL.
        #[arg(long)]
        site_url: Option<String>,

        /// Vessel directory root. Also reads VESSEL_DIRECTORY_URL.
        #[arg(long)]
        vessel_directory_url: Option<String>,

        /// Per-request HTTP timeout in milliseconds. Also reads CDC_HTTP_TIMEOUT_MS.
        #[arg(long)]
        http_timeout_ms: Option<u64>,

        /// Captcha session lifetime in seconds. Also reads CDC_SESSION_TTL_SECS.
        #[arg(long)]
        session_ttl_secs: Option<u64>,

        /// Per-vessel lookup timeout in seconds. Also reads CDC_LOOKUP_TIMEOUT_SECS.
        #[arg(long)]
        lookup_timeout_secs: Option<u64>,
    },

    /// Print the supported actions as JSON.
    Actions,

    /// Parse a saved CDC page and print the extracted data as JSON.
    Parse {
        /// Path to an HTML file.
        file: String,

        /// Site root used to resolve relative photo URLs.
        #[arg(long)]
        site_url: Option<String>,
    },

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   cdc-verify-server completions bash > ~/.local/share/bash-completion/completions/cdc-verify-server
    ///   cdc-verify-server completions zsh > ~/.zfunc/_cdc-verify-server
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command.unwrap_or(Commands::Serve {
        addr: None,
        site_url: None,
        vessel_directory_url: None,
        http_timeout_ms: None,
        session_ttl_secs: None,
        lookup_timeout_secs: None,
    }) {
        Commands::Serve {
            addr,
            site_url,
            vessel_directory_url,
            http_timeout_ms,
            session_ttl_secs,
            lookup_timeout_secs,
        } => {
            let site = resolve_site_config(&ConfigOverrides {
                site_url,
                vessel_directory_url,
                http_timeout_ms,
                session_ttl_secs,
                lookup_timeout_secs,
            });
            let addr = resolve_bind_addr(addr.as_deref());

            tracing::info!("cdc-verify server");
            tracing::info!("Records site: {}", site.base_url);
            tracing::info!("Vessel directory: {}", site.vessel_directory_url);

            let flow = VerificationFlow::new(site)?;
            let transport = HttpTransport::new(flow);
            transport.run(&addr).await?;
        }

        Commands::Actions => {
            let actions = ActionRegistry::list_actions();
            let info = serde_json::json!({
                "endpoint": "POST /api/cdc",
                "actions": actions,
                "action_count": actions.len(),
            });
            println!("{}", serde_json::to_string_pretty(&info)?);
        }

        Commands::Parse { file, site_url } => {
            let site = resolve_site_config(&ConfigOverrides {
                site_url,
                ..ConfigOverrides::default()
            });
            let html = std::fs::read_to_string(&file)?;
            let mut info = parse_details_page(&html, Vec::new(), &site.base_url);
            if info.details.is_empty() {
                info.search_results = parse_results_table(&html);
            }
            println!("{}", serde_json::to_string_pretty(&info)?);
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(
                shell,
                &mut cmd,
                "cdc-verify-server",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}
