use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures_util::{SinkExt, StreamExt};
use lib::auth::{self, AuthEntry, PermissionLevel};
use std::path::{Path, PathBuf};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

#[derive(Parser)]
#[command(name = "gateview")]
#[command(about = "Gateview CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Run the gateway (HTTP + WebSocket on one port, serial link to the gate controller).
    Gateway {
        /// Config file path (default: GATEVIEW_CONFIG_PATH or ~/.gateview/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// WebSocket and HTTP port (default from config or 8080)
        #[arg(long, short)]
        port: Option<u16>,

        /// Serial device, e.g. /dev/ttyUSB0 (overrides config)
        #[arg(long, short, value_name = "DEVICE")]
        device: Option<String>,

        /// Auth table file (overrides config)
        #[arg(long, value_name = "PATH")]
        auth_file: Option<PathBuf>,
    },

    /// Connect to a running gateway, request a state snapshot, and print every frame.
    Watch {
        /// Config file path (default: GATEVIEW_CONFIG_PATH or ~/.gateview/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Login to authenticate with
        #[arg(long, short)]
        username: String,

        /// Password for the login
        #[arg(long, short)]
        password: String,
    },

    /// Manage the auth table.
    User {
        #[command(subcommand)]
        action: UserAction,
    },

    /// Print the SHA-256 hex digest of a password.
    Hash { password: String },
}

#[derive(Subcommand)]
enum UserAction {
    /// Add or replace a login.
    Add {
        /// Auth table file
        #[arg(long, value_name = "PATH")]
        auth_file: PathBuf,

        login: String,

        /// Permission digit: 0 blocked, 1 view, 2 control
        permissions: u32,

        password: String,

        /// Semicolon-separated group ids
        #[arg(long, default_value = "")]
        groups: String,
    },
    /// Remove a login.
    Remove {
        /// Auth table file
        #[arg(long, value_name = "PATH")]
        auth_file: PathBuf,

        login: String,
    },
    /// List logins and their permission levels.
    List {
        /// Auth table file
        #[arg(long, value_name = "PATH")]
        auth_file: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("gateview {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Gateway {
            config,
            port,
            device,
            auth_file,
        }) => {
            if let Err(e) = run_gateway(config, port, device, auth_file).await {
                log::error!("gateway failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Watch {
            config,
            username,
            password,
        }) => {
            if let Err(e) = run_watch(config, &username, &password).await {
                log::error!("watch failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::User { action }) => {
            if let Err(e) = run_user(action) {
                log::error!("user command failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Hash { password }) => {
            println!("{}", auth::sha256_hex(&password));
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

async fn run_gateway(
    config_path: Option<PathBuf>,
    port: Option<u16>,
    device: Option<String>,
    auth_file: Option<PathBuf>,
) -> Result<()> {
    let mut config = lib::config::load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    if let Some(d) = device {
        config.serial.device = Some(d);
    }
    if let Some(a) = auth_file {
        config.auth.table_path = Some(a);
    }
    log::info!(
        "starting gateway on {}:{}",
        config.gateway.bind,
        config.gateway.port
    );
    lib::gateway::run_gateway(config).await
}

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Pull one quoted field out of a `WWW-Authenticate: Digest ...` value.
fn challenge_field(header: &str, key: &str) -> Option<String> {
    let pattern = format!("{}=\"", key);
    let start = header.find(&pattern)? + pattern.len();
    let end = header[start..].find('"')?;
    Some(header[start..start + end].to_string())
}

/// Answer a digest challenge and retry the upgrade with credentials.
async fn connect_with_digest(
    url: &str,
    challenge: &str,
    username: &str,
    password: &str,
) -> Result<WsClient> {
    let nonce = challenge_field(challenge, "nonce").context("challenge is missing a nonce")?;
    let opaque = challenge_field(challenge, "opaque").context("challenge is missing an opaque")?;
    let cnonce = auth::generate_token(8);
    let nc = "00000001";
    let response = auth::compute_response(
        username,
        auth::REALM,
        password,
        "GET",
        "/ws",
        &nonce,
        nc,
        &cnonce,
        "auth",
    );
    let authorization = format!(
        "Digest username=\"{}\", realm=\"{}\", uri=\"/ws\", nonce=\"{}\", \
         nc={}, cnonce=\"{}\", qop=auth, opaque=\"{}\", response=\"{}\"",
        username,
        auth::REALM,
        nonce,
        nc,
        cnonce,
        opaque,
        response
    );

    let mut request = url.into_client_request()?;
    request.headers_mut().insert(
        "Authorization",
        authorization
            .parse()
            .context("building Authorization header")?,
    );
    let (ws, _) = tokio_tungstenite::connect_async(request)
        .await
        .context("authenticated connect was rejected (wrong credentials?)")?;
    Ok(ws)
}

async fn run_watch(config_path: Option<PathBuf>, username: &str, password: &str) -> Result<()> {
    let config = lib::config::load_config(config_path)?;
    let host = match config.gateway.bind.as_str() {
        "0.0.0.0" => "127.0.0.1",
        other => other,
    };
    let url = format!("ws://{}:{}/ws", host, config.gateway.port);

    // the first attempt carries no credentials; the gateway answers with a
    // digest challenge we compute a response for
    let mut ws = match tokio_tungstenite::connect_async(&url).await {
        Ok((ws, _)) => ws,
        Err(WsError::Http(response)) if response.status().as_u16() == 401 => {
            let challenge = response
                .headers()
                .get("www-authenticate")
                .and_then(|v| v.to_str().ok())
                .context("401 without a WWW-Authenticate challenge")?
                .to_string();
            connect_with_digest(&url, &challenge, username, password).await?
        }
        Err(e) => return Err(e).with_context(|| format!("connecting to {}", url)),
    };

    ws.send(Message::Text(lib::message::Message::query_state().encode()))
        .await
        .context("requesting a state snapshot")?;
    println!("connected to {}; printing state frames (Ctrl+C to stop)", url);

    while let Some(frame) = ws.next().await {
        match frame.context("reading from gateway")? {
            Message::Text(text) => println!("{}", text),
            Message::Close(_) => break,
            _ => {}
        }
    }
    Ok(())
}

fn load_or_empty(path: &Path) -> Result<auth::AuthTable> {
    if path.exists() {
        auth::load_auth_table(path)
    } else {
        Ok(auth::AuthTable::new())
    }
}

fn run_user(action: UserAction) -> Result<()> {
    match action {
        UserAction::Add {
            auth_file,
            login,
            permissions,
            password,
            groups,
        } => {
            let permissions = PermissionLevel::from_digit(permissions)
                .context("permissions must be 0 (blocked), 1 (view) or 2 (control)")?;
            let map_groups: Vec<String> = if groups.is_empty() {
                Vec::new()
            } else {
                groups.split(';').map(str::to_string).collect()
            };
            let mut table = load_or_empty(&auth_file)?;
            table.insert(
                login.clone(),
                AuthEntry {
                    permissions,
                    map_groups,
                    password,
                },
            );
            auth::save_auth_table(&auth_file, &table)?;
            println!("saved {}", login);
        }
        UserAction::Remove { auth_file, login } => {
            let mut table = auth::load_auth_table(&auth_file)?;
            if table.remove(&login).is_none() {
                anyhow::bail!("no such login: {}", login);
            }
            auth::save_auth_table(&auth_file, &table)?;
            println!("removed {}", login);
        }
        UserAction::List { auth_file } => {
            let table = auth::load_auth_table(&auth_file)?;
            let mut logins: Vec<&String> = table.keys().collect();
            logins.sort();
            for login in logins {
                let entry = &table[login];
                if entry.map_groups.is_empty() {
                    println!("{}: {}", login, entry.permissions.as_str());
                } else {
                    println!(
                        "{}: {} [{}]",
                        login,
                        entry.permissions.as_str(),
                        entry.map_groups.join(";")
                    );
                }
            }
        }
    }
    Ok(())
}
