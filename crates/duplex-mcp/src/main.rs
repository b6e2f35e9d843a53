//! duplex-mcp entry point.

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use duplex_mcp::config::{ConfigOverrides, ServerConfig};
use duplex_mcp::server::{describe, session_builder};
use duplex_mcp::transport::StdioTransport;

#[derive(Parser)]
#[command(
    name = "duplex-mcp",
    about = "Bidirectional MCP server with tools, resources, prompts and sampling over stdio or SSE",
    version
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Timeout for server-to-client requests, in milliseconds.
    /// Also reads DUPLEX_REQUEST_TIMEOUT_MS.
    #[arg(long, global = true)]
    request_timeout_ms: Option<u64>,

    /// How long shutdown waits for running calls, in milliseconds.
    /// Also reads DUPLEX_DRAIN_TIMEOUT_MS.
    #[arg(long, global = true)]
    drain_timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start MCP server over stdio (default).
    Serve,

    /// Start MCP server over HTTP with server-sent events.
    #[cfg(feature = "sse")]
    ServeHttp {
        /// Listen address (host:port). Also reads DUPLEX_ADDR.
        #[arg(long)]
        addr: Option<String>,
    },

    /// Print server capabilities and operations as JSON.
    Info,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   duplex-mcp completions bash > ~/.local/share/bash-completion/completions/duplex-mcp
    ///   duplex-mcp completions zsh > ~/.zfunc/_duplex-mcp
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },

    /// Launch interactive REPL mode.
    Repl,
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

    let overrides = ConfigOverrides {
        request_timeout_ms: cli.request_timeout_ms,
        drain_timeout_ms: cli.drain_timeout_ms,
        addr: None,
    };

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let config = ServerConfig::resolve(&overrides)?;
            let transport = StdioTransport::new(session_builder(&config));
            transport.run().await?;
        }

        #[cfg(feature = "sse")]
        Commands::ServeHttp { addr } => {
            use duplex_mcp::transport::SseTransport;

            let config = ServerConfig::resolve(&ConfigOverrides { addr, ..overrides })?;
            tracing::info!("duplex-mcp SSE server");
            tracing::info!("Request timeout: {:?}", config.request_timeout);
            let transport = SseTransport::new(session_builder(&config));
            transport.run(&config.addr).await?;
        }

        Commands::Info => {
            let config = ServerConfig::resolve(&overrides)?;
            let info = describe(&session_builder(&config))?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "duplex-mcp", &mut std::io::stdout());
        }

        Commands::Repl => {
            let config = ServerConfig::resolve(&overrides)?;
            duplex_mcp::repl::run(session_builder(&config)).await?;
        }
    }

    Ok(())
}
