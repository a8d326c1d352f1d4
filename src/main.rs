use std::{net::IpAddr, path::PathBuf, process::Command, sync::Arc};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use mockario::{
    config::{default_data_dir, ServerConfig, DATA_DIR_ENV, DEFAULT_PORT},
    import, routes,
    state::Database,
    store::{JsonFileStore, Store},
};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mockario")]
#[command(about = "Mock APIs locally - server and UI for creating mock endpoints")]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error); RUST_LOG wins when set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the mock server with the web interface and open a browser
    Start {
        #[command(flatten)]
        server: ServerArgs,

        /// Do not open the browser
        #[arg(long)]
        no_open: bool,
    },
    /// Start only the mock server
    Server {
        #[command(flatten)]
        server: ServerArgs,
    },
    /// Serve the web interface on its own, pointed at a running server
    Web {
        /// Web UI port
        #[arg(short, long, default_value = "5173")]
        port: u16,

        /// Bind address
        #[arg(long, env = "MOCKARIO_HOST", default_value = "127.0.0.1")]
        host: IpAddr,

        /// Mock server URL the UI talks to
        #[arg(short, long, default_value = "http://localhost:3001")]
        server: String,

        /// Directory with the built web UI
        #[arg(long, env = "MOCKARIO_WEB_DIR")]
        web_dir: PathBuf,
    },
    /// Import endpoints from a JSON file into the data directory
    Import {
        /// File with an `endpoints` array
        file: PathBuf,

        /// Drop existing endpoints first
        #[arg(long)]
        replace: bool,

        /// Persistence directory
        #[arg(long, env = DATA_DIR_ENV)]
        data_dir: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct ServerArgs {
    /// Server port
    #[arg(short, long, env = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Bind address
    #[arg(long, env = "MOCKARIO_HOST", default_value = "127.0.0.1")]
    host: IpAddr,

    /// Persistence directory
    #[arg(long, env = DATA_DIR_ENV)]
    data_dir: Option<PathBuf>,

    /// Directory with the built web UI, served under /ui
    #[arg(long, env = "MOCKARIO_WEB_DIR")]
    web_dir: Option<PathBuf>,

    /// Keep at most this many request log entries
    #[arg(long, env = "MOCKARIO_MAX_LOGS")]
    max_logs: Option<usize>,
}

impl From<ServerArgs> for ServerConfig {
    fn from(args: ServerArgs) -> Self {
        ServerConfig {
            host: args.host,
            port: args.port,
            data_dir: args.data_dir.unwrap_or_else(default_data_dir),
            web_dir: args.web_dir,
            max_logs: args.max_logs,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("mockario={0},tower_http={0}", cli.log_level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Start { server, no_open } => {
            let config = ServerConfig::from(server);
            run_server(config, !no_open).await
        }
        Commands::Server { server } => run_server(ServerConfig::from(server), false).await,
        Commands::Web {
            port,
            host,
            server,
            web_dir,
        } => run_web(host, port, server, web_dir).await,
        Commands::Import {
            file,
            replace,
            data_dir,
        } => run_import(file, replace, data_dir.unwrap_or_else(default_data_dir)),
    }
}

async fn run_server(config: ServerConfig, open: bool) -> Result<()> {
    let (_state, app) = mockario::app(&config).context("failed to open data store")?;

    let listener = TcpListener::bind(config.addr())
        .await
        .with_context(|| format!("failed to bind {}", config.addr()))?;

    let url = config.public_url();
    info!("Mockario v{}", env!("CARGO_PKG_VERSION"));
    info!("Mock server: {url}");
    info!("Management API: {url}/api");
    info!("Data dir: {}", config.data_dir.display());
    if config.web_dir.is_some() {
        info!("Web UI: {url}{}/", routes::UI_PREFIX);
    }
    if open {
        let target = match config.web_dir {
            Some(_) => format!("{url}{}/", routes::UI_PREFIX),
            None => format!("{url}/api/endpoints"),
        };
        open_browser(&target);
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    info!("Mockario stopped");
    Ok(())
}

async fn run_web(host: IpAddr, port: u16, server: String, web_dir: PathBuf) -> Result<()> {
    if !web_dir.join("index.html").exists() {
        anyhow::bail!("no index.html in {}", web_dir.display());
    }
    let app = routes::standalone_ui(&web_dir, server.clone());
    let listener = TcpListener::bind((host, port))
        .await
        .with_context(|| format!("failed to bind {host}:{port}"))?;

    info!("Web interface: http://{host}:{port}");
    info!("Connected to server: {server}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("web server error")?;
    Ok(())
}

fn run_import(file: PathBuf, replace: bool, data_dir: PathBuf) -> Result<()> {
    let store = JsonFileStore::new(data_dir);
    let mut db = Database::from_document(store.load()?);
    let summary = import::import_file(&mut db, &file, replace)?;
    store.save(&db.snapshot())?;
    info!(
        imported = summary.imported,
        replaced = summary.replaced,
        skipped = summary.skipped,
        store = %store.location(),
        "import finished"
    );
    Ok(())
}

fn open_browser(url: &str) {
    let mut command = if cfg!(target_os = "macos") {
        Command::new("open")
    } else if cfg!(target_os = "windows") {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", "start", ""]);
        cmd
    } else {
        Command::new("xdg-open")
    };
    match command.arg(url).spawn() {
        Ok(_) => info!("Opening browser at {url}"),
        Err(err) => warn!(error = %err, "could not open browser, visit {url}"),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("Shutting down Mockario...");
}
