//! sealdrop CLI
//!
//! Sealed single-file transfer: the receiver runs `sealdrop serve` with its
//! private key, the sender runs `sealdrop send` with the receiver's public key.

mod config;
mod progress;

use anyhow::Context;
use clap::{Parser, Subcommand};
use console::style;
use sealdrop_core::{
    MessageChannel, ReceiveOutcome, ReceiverConfig, SenderSession, Server, ServerConfig,
};
use sealdrop_crypto::{FileKeyProvider, KeyProvider};
use sealdrop_files::{MAX_CHUNK_SIZE, chunk_count};
use sealdrop_transport::TcpConnection;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use config::Config;
use progress::{TransferBar, format_bytes};

/// sealdrop - sealed single-file transfer
#[derive(Parser)]
#[command(name = "sealdrop")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug output (implies --verbose)
    #[arg(short, long)]
    debug: bool,

    /// Configuration file path [default: ~/.config/sealdrop/config.toml]
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a key pair for receiving files
    Keygen {
        /// Public key output file
        #[arg(long)]
        public: Option<PathBuf>,

        /// Private key output file
        #[arg(long)]
        private: Option<PathBuf>,

        /// Overwrite existing key files
        #[arg(long)]
        force: bool,
    },

    /// Receive files
    Serve {
        /// Private key file
        #[arg(short, long)]
        key: Option<PathBuf>,

        /// Listen address
        #[arg(short, long)]
        bind: Option<String>,

        /// Output directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Exit after the first connection
        #[arg(long)]
        once: bool,

        /// Drop connections idle for this many seconds (0 = never)
        #[arg(long)]
        idle_timeout: Option<u64>,
    },

    /// Send a file
    Send {
        /// File to send
        #[arg(required = true)]
        file: PathBuf,

        /// Receiver's public key file
        #[arg(short, long)]
        key: Option<PathBuf>,

        /// Receiver address
        #[arg(short, long)]
        to: Option<String>,

        /// Plaintext bytes per chunk
        #[arg(long)]
        chunk_size: Option<u32>,

        /// Seconds to wait for each acknowledgment (0 = forever)
        #[arg(long)]
        timeout: Option<u64>,

        /// Do not show a progress bar
        #[arg(short, long)]
        quiet: bool,
    },

    /// View or modify configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show {
        /// Show specific configuration key
        key: Option<String>,
    },

    /// Set a configuration value
    Set {
        /// Configuration key to set
        key: String,

        /// Value to set
        value: String,
    },
}

/// Expand a leading `~/` to the home directory.
fn expand_path(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(stripped) => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(stripped),
        None => PathBuf::from(path),
    }
}

/// Load the configuration named on the command line, or the default one.
///
/// An explicitly named file must exist; the default file is optional.
fn load_config(path: Option<&str>) -> anyhow::Result<(Config, PathBuf)> {
    match path {
        Some(path) => {
            let path = expand_path(path);
            Ok((Config::load(&path)?, path))
        }
        None => Ok((Config::load_or_default()?, Config::default_path())),
    }
}

fn seconds(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let (config, config_path) = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Keygen {
            public,
            private,
            force,
        } => {
            generate_keypair(&key_provider(&config, public, private), force)?;
        }
        Commands::Serve {
            key,
            bind,
            output,
            once,
            idle_timeout,
        } => {
            config.validate()?;
            let keys = key_provider(&config, None, key);
            let bind = bind.unwrap_or_else(|| config.network.listen_addr.clone());
            let output = output.unwrap_or_else(|| config.transfer.output_dir.clone());
            let idle_timeout = idle_timeout.map_or_else(|| config.transfer.ack_timeout(), seconds);
            serve(&keys, &bind, output, once, idle_timeout).await?;
        }
        Commands::Send {
            file,
            key,
            to,
            chunk_size,
            timeout,
            quiet,
        } => {
            config.validate()?;
            let keys = key_provider(&config, key, None);
            let to = to.unwrap_or_else(|| config.network.connect_addr.clone());
            let chunk_size = chunk_size.unwrap_or(config.transfer.chunk_size);
            let timeout = timeout.map_or_else(|| config.transfer.ack_timeout(), seconds);
            send_file(&file, &keys, &to, chunk_size, timeout, quiet).await?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show { key } => config_show(key.as_deref(), &config)?,
            ConfigAction::Set { key, value } => config_set(&key, &value, &config_path)?,
        },
    }

    Ok(())
}

/// Key files named in the configuration, either half overridden from the
/// command line.
fn key_provider(config: &Config, public: Option<PathBuf>, private: Option<PathBuf>) -> FileKeyProvider {
    FileKeyProvider::new(
        public.unwrap_or_else(|| config.keys.public_key.clone()),
        private.unwrap_or_else(|| config.keys.private_key.clone()),
    )
}

/// Generate a key pair and write it to the provider's key files.
fn generate_keypair(keys: &FileKeyProvider, force: bool) -> anyhow::Result<()> {
    let (public, private) = (keys.public_path(), keys.private_path());
    if !force {
        for path in [public, private] {
            if path.exists() {
                anyhow::bail!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                );
            }
        }
    }

    let pair = keys
        .generate_key_pair()
        .context("Failed to generate key pair")?;

    println!("Public key: {}", pair.public.to_hex());
    println!();
    println!("Public key saved to:  {}", public.display());
    println!("Private key saved to: {}", private.display());
    println!();
    println!("Give the public key file to senders. Keep the private key file secret.");

    Ok(())
}

/// Run the receiver until interrupted, or for one connection with `once`.
async fn serve(
    keys: &FileKeyProvider,
    bind: &str,
    output: PathBuf,
    once: bool,
    idle_timeout: Option<Duration>,
) -> anyhow::Result<()> {
    std::fs::create_dir_all(&output)
        .with_context(|| format!("Failed to create output directory {}", output.display()))?;

    let private_key = keys
        .load_private_key()
        .with_context(|| format!("Failed to load private key {}", keys.private_path().display()))?;

    let server_config = ServerConfig {
        receiver: ReceiverConfig {
            output_dir: output.clone(),
            max_chunk_size: MAX_CHUNK_SIZE,
        },
        idle_timeout,
    };
    let server = Server::bind(bind, Arc::new(private_key), server_config)
        .await
        .with_context(|| format!("Failed to listen on {bind}"))?;

    println!("Listening on: {}", server.local_addr());
    println!("Output directory: {}", output.display());
    println!();

    if once {
        let outcome = server.serve_one().await?;
        print_outcome(&outcome);
        return Ok(());
    }

    tokio::select! {
        () = server.run() => {}
        signal = tokio::signal::ctrl_c() => {
            signal?;
            println!("Shutting down");
        }
    }
    Ok(())
}

fn print_outcome(outcome: &ReceiveOutcome) {
    match outcome {
        ReceiveOutcome::Completed(file) => {
            println!(
                "{} {} ({}, {} chunks)",
                style("Received").green().bold(),
                file.path.display(),
                format_bytes(file.file_size),
                file.chunk_count
            );
            println!("Digest: {}", file.digest);
        }
        ReceiveOutcome::Stopped => println!("{}", style("Transfer stopped by sender").yellow()),
        ReceiveOutcome::Disconnected => {
            println!("{}", style("Sender disconnected before completing").yellow());
        }
    }
}

/// Send `file` to the receiver at `to`.
async fn send_file(
    file: &Path,
    keys: &FileKeyProvider,
    to: &str,
    chunk_size: u32,
    timeout: Option<Duration>,
    quiet: bool,
) -> anyhow::Result<()> {
    if !file.is_file() {
        anyhow::bail!("File not found: {}", file.display());
    }
    if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
        anyhow::bail!("Chunk size must be between 1 and {MAX_CHUNK_SIZE}");
    }

    let public_key = keys
        .load_public_key()
        .with_context(|| format!("Failed to load public key {}", keys.public_path().display()))?;

    let file_size = std::fs::metadata(file)?.len();
    let file_name = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string();

    println!("File: {}", file.display());
    println!("Size: {}", format_bytes(file_size));
    println!(
        "Chunks: {} x {}",
        chunk_count(file_size, chunk_size),
        format_bytes(u64::from(chunk_size))
    );
    println!("Receiver: {to}");
    println!();

    let conn = TcpConnection::connect(to)
        .await
        .with_context(|| format!("Failed to connect to {to}"))?;
    let channel = MessageChannel::new(conn).with_recv_timeout(timeout);

    let bar = if quiet {
        TransferBar::hidden()
    } else {
        TransferBar::new(file_size, &file_name)
    };
    let handle = bar.handle();
    let mut session = SenderSession::new(channel, public_key)
        .with_progress(move |p| handle.set_position(p.bytes_acked));

    match session.send_file(file, chunk_size).await {
        Ok(report) => {
            bar.finish_with_message(format!("{} sent", report.file_name));
            println!(
                "{} {} ({}, {} chunks)",
                style("Sent").green().bold(),
                report.file_name,
                format_bytes(report.file_size),
                report.chunk_count
            );
            println!("Digest: {}", report.digest);
            Ok(())
        }
        Err(e) => {
            bar.abandon();
            Err(e).context("Transfer failed")
        }
    }
}

/// Show the whole configuration or a single key.
fn config_show(key: Option<&str>, config: &Config) -> anyhow::Result<()> {
    if let Some(key) = key {
        println!("{}", config.get(key)?);
        return Ok(());
    }

    println!("sealdrop Configuration");
    println!();

    println!("[network]");
    println!("  listen_addr = \"{}\"", config.network.listen_addr);
    println!("  connect_addr = \"{}\"", config.network.connect_addr);
    println!();

    println!("[transfer]");
    println!("  chunk_size = {}", config.transfer.chunk_size);
    println!("  output_dir = {:?}", config.transfer.output_dir);
    println!("  ack_timeout_secs = {}", config.transfer.ack_timeout_secs);
    println!();

    println!("[keys]");
    println!("  public_key = {:?}", config.keys.public_key);
    println!("  private_key = {:?}", config.keys.private_key);

    Ok(())
}

/// Set one key in the configuration file at `config_path`.
fn config_set(key: &str, value: &str, config_path: &Path) -> anyhow::Result<()> {
    let mut config = if config_path.exists() {
        Config::load(config_path)?
    } else {
        Config::default()
    };

    config.set(key, value)?;
    config.validate()?;
    config.save(config_path)?;

    println!("Configuration updated: {key} = {value}");
    println!("Saved to: {}", config_path.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cli_parse_send() {
        let cli = Cli::parse_from(["sealdrop", "send", "report.pdf"]);
        assert!(!cli.verbose);
        assert!(!cli.debug);
        assert!(cli.config.is_none());
        match cli.command {
            Commands::Send {
                file,
                key,
                to,
                chunk_size,
                timeout,
                quiet,
            } => {
                assert_eq!(file, PathBuf::from("report.pdf"));
                assert!(key.is_none());
                assert!(to.is_none());
                assert!(chunk_size.is_none());
                assert!(timeout.is_none());
                assert!(!quiet);
            }
            _ => panic!("Expected Send command"),
        }
    }

    #[test]
    fn test_cli_parse_send_all_options() {
        let cli = Cli::parse_from([
            "sealdrop",
            "-v",
            "send",
            "data.bin",
            "--key",
            "peer.key",
            "--to",
            "10.0.0.5:7878",
            "--chunk-size",
            "4096",
            "--timeout",
            "10",
            "--quiet",
        ]);
        assert!(cli.verbose);
        match cli.command {
            Commands::Send {
                key,
                to,
                chunk_size,
                timeout,
                quiet,
                ..
            } => {
                assert_eq!(key, Some(PathBuf::from("peer.key")));
                assert_eq!(to.as_deref(), Some("10.0.0.5:7878"));
                assert_eq!(chunk_size, Some(4096));
                assert_eq!(timeout, Some(10));
                assert!(quiet);
            }
            _ => panic!("Expected Send command"),
        }
    }

    #[test]
    fn test_cli_send_requires_file() {
        assert!(Cli::try_parse_from(["sealdrop", "send"]).is_err());
    }

    #[test]
    fn test_cli_parse_serve() {
        let cli = Cli::parse_from([
            "sealdrop", "serve", "--bind", "127.0.0.1:9000", "--output", "/tmp/in", "--once",
        ]);
        match cli.command {
            Commands::Serve {
                bind, output, once, ..
            } => {
                assert_eq!(bind.as_deref(), Some("127.0.0.1:9000"));
                assert_eq!(output, Some(PathBuf::from("/tmp/in")));
                assert!(once);
            }
            _ => panic!("Expected Serve command"),
        }
    }

    #[test]
    fn test_cli_parse_config_set() {
        let cli = Cli::parse_from(["sealdrop", "config", "set", "chunk_size", "2048"]);
        match cli.command {
            Commands::Config {
                action: ConfigAction::Set { key, value },
            } => {
                assert_eq!(key, "chunk_size");
                assert_eq!(value, "2048");
            }
            _ => panic!("Expected Config Set command"),
        }
    }

    #[test]
    fn test_expand_path() {
        assert_eq!(expand_path("/etc/sealdrop.toml"), PathBuf::from("/etc/sealdrop.toml"));
        assert_eq!(expand_path("relative.toml"), PathBuf::from("relative.toml"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_path("~/x.toml"), home.join("x.toml"));
        }
    }

    #[test]
    fn test_load_config_explicit_missing_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.toml");
        assert!(load_config(path.to_str()).is_err());
    }

    #[test]
    fn test_seconds() {
        assert_eq!(seconds(0), None);
        assert_eq!(seconds(5), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_key_provider_overrides_one_half() {
        let config = Config::default();

        let keys = key_provider(&config, None, None);
        assert_eq!(keys.public_path(), config.keys.public_key.as_path());
        assert_eq!(keys.private_path(), config.keys.private_key.as_path());

        let keys = key_provider(&config, None, Some(PathBuf::from("/tmp/recv.key")));
        assert_eq!(keys.public_path(), config.keys.public_key.as_path());
        assert_eq!(keys.private_path(), Path::new("/tmp/recv.key"));

        let keys = key_provider(&config, Some(PathBuf::from("peer.pub")), None);
        assert_eq!(keys.public_path(), Path::new("peer.pub"));
        assert_eq!(keys.private_path(), config.keys.private_key.as_path());
    }

    #[test]
    fn test_generate_keypair_writes_files() {
        let dir = TempDir::new().unwrap();
        let public = dir.path().join("keys").join("public.key");
        let private = dir.path().join("keys").join("private.key");

        let provider = FileKeyProvider::new(&public, &private);
        generate_keypair(&provider, false).unwrap();

        let loaded_private = provider.load_private_key().unwrap();
        let loaded_public = provider.load_public_key().unwrap();
        assert_eq!(loaded_private.public_key(), loaded_public);
    }

    #[test]
    fn test_generate_keypair_refuses_overwrite() {
        let dir = TempDir::new().unwrap();
        let public = dir.path().join("public.key");
        let private = dir.path().join("private.key");
        let keys = FileKeyProvider::new(&public, &private);

        generate_keypair(&keys, false).unwrap();
        let first = std::fs::read_to_string(&public).unwrap();

        assert!(generate_keypair(&keys, false).is_err());
        generate_keypair(&keys, true).unwrap();
        assert_ne!(std::fs::read_to_string(&public).unwrap(), first);
    }

    #[test]
    fn test_config_show() {
        let config = Config::default();
        assert!(config_show(None, &config).is_ok());
        assert!(config_show(Some("chunk_size"), &config).is_ok());
        assert!(config_show(Some("invalid_key"), &config).is_err());
    }

    #[test]
    fn test_config_set_saves() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        config_set("chunk_size", "2048", &path).unwrap();
        assert_eq!(Config::load(&path).unwrap().transfer.chunk_size, 2048);

        // Invalid values are not saved
        assert!(config_set("chunk_size", "0", &path).is_err());
        assert_eq!(Config::load(&path).unwrap().transfer.chunk_size, 2048);
    }

    #[tokio::test]
    async fn test_send_missing_file() {
        let result = send_file(
            Path::new("/nonexistent/sealdrop.bin"),
            &FileKeyProvider::new("public.key", "private.key"),
            "127.0.0.1:1",
            1024,
            None,
            true,
        )
        .await;
        assert!(result.unwrap_err().to_string().contains("File not found"));
    }
}
