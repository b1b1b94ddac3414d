//! CLI argument parsing and config file support.
//!
//! The node can be configured via CLI flags, a JSON config file,
//! or a combination of both (CLI overrides config file).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// CLI arguments (manual parsing, no clap dependency)
// ---------------------------------------------------------------------------

/// Parsed command-line arguments.
pub struct CliArgs {
    pub data_dir: Option<PathBuf>,
    pub p2p_port: Option<u16>,
    pub bootstrap_nodes: Vec<String>,
    pub write_bootstrap: Option<PathBuf>,
    pub enable_mdns: Option<bool>,
    pub config_path: Option<PathBuf>,
}

impl CliArgs {
    /// Parses CLI arguments from `std::env::args`.
    pub fn parse_from_env() -> Self {
        Self::parse(std::env::args().skip(1).collect())
    }

    /// Parses CLI arguments from an explicit list.
    pub fn parse(args: Vec<String>) -> Self {
        let mut cli = Self {
            data_dir: None,
            p2p_port: None,
            bootstrap_nodes: Vec::new(),
            write_bootstrap: None,
            enable_mdns: None,
            config_path: None,
        };

        let mut i = 0;
        while i < args.len() {
            match args[i].as_str() {
                "--data-dir" => {
                    i += 1;
                    cli.data_dir = args.get(i).map(PathBuf::from);
                }
                "--p2p-port" => {
                    i += 1;
                    cli.p2p_port = args.get(i).and_then(|s| s.parse().ok());
                }
                "--bootstrap" => {
                    i += 1;
                    if let Some(addr) = args.get(i) {
                        cli.bootstrap_nodes.push(addr.clone());
                    }
                }
                "--write-bootstrap" => {
                    i += 1;
                    cli.write_bootstrap = args.get(i).map(PathBuf::from);
                }
                "--no-mdns" => {
                    cli.enable_mdns = Some(false);
                }
                "--config" => {
                    i += 1;
                    cli.config_path = args.get(i).map(PathBuf::from);
                }
                "-h" | "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                other => {
                    eprintln!("unknown argument: {other}");
                    print_help();
                    std::process::exit(2);
                }
            }
            i += 1;
        }

        cli
    }
}

// ---------------------------------------------------------------------------
// Config file (JSON)
// ---------------------------------------------------------------------------

/// JSON config file format.
///
/// Example `node.json`:
/// ```json
/// {
///   "data_dir": "/opt/veilchat/data",
///   "p2p_port": 4001,
///   "enable_mdns": false,
///   "bootstrap_nodes": [
///     "/ip4/203.0.113.1/tcp/4001/p2p/12D3KooW..."
///   ]
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NodeConfigFile {
    pub data_dir: Option<String>,
    pub p2p_port: Option<u16>,
    pub enable_mdns: Option<bool>,
    pub bootstrap_nodes: Option<Vec<String>>,
    pub write_bootstrap: Option<String>,
}

// ---------------------------------------------------------------------------
// Resolved config (all defaults applied)
// ---------------------------------------------------------------------------

/// Fully resolved node configuration with all defaults applied.
pub struct NodeConfig {
    pub data_dir: PathBuf,
    pub p2p_port: u16,
    pub bootstrap_nodes: Vec<String>,
    pub write_bootstrap: Option<PathBuf>,
    pub enable_mdns: bool,
}

impl NodeConfig {
    /// Build config purely from CLI args with defaults.
    pub fn from_cli(cli: &CliArgs) -> Self {
        Self {
            data_dir: cli.data_dir.clone().unwrap_or_else(default_data_dir),
            p2p_port: cli.p2p_port.unwrap_or(4001),
            bootstrap_nodes: cli.bootstrap_nodes.clone(),
            write_bootstrap: cli.write_bootstrap.clone(),
            enable_mdns: cli.enable_mdns.unwrap_or(true),
        }
    }

    /// Load config from a JSON file.
    pub fn load(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read config file: {e}"))?;

        let file: NodeConfigFile =
            serde_json::from_str(&text).map_err(|e| format!("invalid config JSON: {e}"))?;

        Ok(Self {
            data_dir: file
                .data_dir
                .map(PathBuf::from)
                .unwrap_or_else(default_data_dir),
            p2p_port: file.p2p_port.unwrap_or(4001),
            bootstrap_nodes: file.bootstrap_nodes.unwrap_or_default(),
            write_bootstrap: file.write_bootstrap.map(PathBuf::from),
            enable_mdns: file.enable_mdns.unwrap_or(true),
        })
    }

    /// Merge CLI overrides onto a config-file base.
    pub fn merge_cli(mut self, cli: &CliArgs) -> Self {
        if let Some(ref dir) = cli.data_dir {
            self.data_dir = dir.clone();
        }
        if let Some(port) = cli.p2p_port {
            self.p2p_port = port;
        }
        if !cli.bootstrap_nodes.is_empty() {
            self.bootstrap_nodes.extend(cli.bootstrap_nodes.clone());
        }
        if let Some(ref path) = cli.write_bootstrap {
            self.write_bootstrap = Some(path.clone());
        }
        if let Some(mdns) = cli.enable_mdns {
            self.enable_mdns = mdns;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Platform-specific default data directory.
fn default_data_dir() -> PathBuf {
    if cfg!(target_os = "linux") {
        if let Some(home) = dirs::home_dir() {
            return home.join(".veilchat");
        }
    }
    if let Some(data) = dirs::data_dir() {
        return data.join("Veilchat");
    }
    PathBuf::from("veilchat-data")
}

fn print_help() {
    println!(
        r#"Veilchat Node - secure messaging peer

USAGE:
    veilchat-node [OPTIONS]

OPTIONS:
    --data-dir <PATH>         Data directory (default: platform-specific)
    --p2p-port <PORT>         P2P listen port for TCP and QUIC (default: 4001)
    --bootstrap <MULTIADDR>   Add a bootstrap peer (repeatable)
    --write-bootstrap <PATH>  Write this node's dialable address to a file
    --no-mdns                 Disable mDNS local discovery
    --config <PATH>           Load settings from JSON config file
    -h, --help                Show this help

EXAMPLES:
    # First node on a LAN, sharing its address
    veilchat-node --write-bootstrap /tmp/veilchat-bootstrap.txt

    # Second node joining via the shared address
    veilchat-node --bootstrap "$(cat /tmp/veilchat-bootstrap.txt)"

    # Headless server node
    veilchat-node --no-mdns --p2p-port 4001 --data-dir /var/lib/veilchat

ENVIRONMENT:
    RUST_LOG                  Log level filter (default: info)
"#
    );
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
