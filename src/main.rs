use anyhow::{Context, Result};
use chatrelay::cli::{BackendAction, Cli, Commands, ConfigAction};
use chatrelay::config::{Config, SharedConfig};
use chatrelay::daemon::run_daemon;
use chatrelay::ipc::client::send_command;
use chatrelay::ipc::protocol::{Command, Response};
use chatrelay::ipc::server::IpcServer;
use chatrelay::output::{Painter, format_login, format_status};
use chatrelay::session::SessionStatus;
use chatrelay::session::poller::PollState;
use clap::{CommandFactory, Parser};
use owo_colors::OwoColorize;
use std::io::IsTerminal;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// How often `login` re-reads the daemon status while following a login.
const LOGIN_FOLLOW_INTERVAL: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose);

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let socket_path = cli
        .socket
        .clone()
        .unwrap_or_else(IpcServer::default_socket_path);

    match cli.command {
        Commands::Daemon => {
            let config = SharedConfig::open(&config_path)
                .with_context(|| format!("loading {}", config_path.display()))?;
            tracing::info!(
                version = %chatrelay::version_string(),
                config = %config_path.display(),
                "starting chatrelay daemon"
            );
            run_daemon(Arc::new(config), Some(socket_path)).await?;
        }
        Commands::Login { no_wait } => {
            expect_ok(&socket_path, Command::Login).await?;
            if !no_wait {
                follow_login(&socket_path).await?;
            }
        }
        Commands::Logout => report(&socket_path, Command::Logout, "Logged out").await?,
        Commands::Connect => report(&socket_path, Command::Connect, "Connected").await?,
        Commands::Disconnect => report(&socket_path, Command::Disconnect, "Disconnected").await?,
        Commands::Status { json } => show_status(&socket_path, json).await?,
        Commands::Say { text } => {
            let text = text.join(" ");
            report(&socket_path, Command::Say { text }, "Sent").await?;
        }
        Commands::Feed { path } => {
            // The daemon resolves the path, so hand it an absolute one
            let path = std::path::absolute(&path)
                .with_context(|| format!("resolving {}", path.display()))?;
            match request(&socket_path, Command::Feed { path }).await? {
                Response::Fed { clips } => println!("{}", format!("Fed {clips} clip(s)").green()),
                other => fail(other),
            }
        }
        Commands::ClearQueue => report(&socket_path, Command::ClearQueue, "Queue cleared").await?,
        Commands::Backend { action } => match action {
            BackendAction::Start { backend } => {
                report(&socket_path, Command::StartBackend { backend }, "Started").await?
            }
            BackendAction::Stop { backend } => {
                report(&socket_path, Command::StopBackend { backend }, "Stopped").await?
            }
        },
        Commands::Reload => report(&socket_path, Command::Reload, "Configuration reloaded").await?,
        Commands::Shutdown => report(&socket_path, Command::Shutdown, "Daemon stopping").await?,
        Commands::Config { action } => handle_config_command(action, &config_path)?,
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "chatrelay",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

/// Log to stderr. `RUST_LOG` wins over `-q`/`-v`.
fn init_tracing(quiet: bool, verbose: u8) {
    let default_filter = match (quiet, verbose) {
        (true, _) => "chatrelay=error",
        (false, 0) => "chatrelay=info",
        (false, 1) => "chatrelay=debug",
        (false, _) => "chatrelay=trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Send a command, exiting with a hint when the daemon is unreachable.
async fn request(socket_path: &Path, command: Command) -> Result<Response> {
    match send_command(socket_path, command).await {
        Ok(response) => Ok(response),
        Err(e) => {
            eprintln!(
                "{}",
                format!("Failed to communicate with daemon: {}", e).red()
            );
            eprintln!("Is the daemon running? Start it with: chatrelay daemon");
            std::process::exit(1);
        }
    }
}

fn fail(response: Response) -> ! {
    match response {
        Response::Error { message } => eprintln!("{}", format!("Error: {}", message).red()),
        other => eprintln!("{}", format!("Unexpected response: {:?}", other).red()),
    }
    std::process::exit(1);
}

async fn expect_ok(socket_path: &Path, command: Command) -> Result<()> {
    match request(socket_path, command).await? {
        Response::Ok => Ok(()),
        other => fail(other),
    }
}

async fn report(socket_path: &Path, command: Command, done: &str) -> Result<()> {
    expect_ok(socket_path, command).await?;
    println!("{}", done.green());
    Ok(())
}

async fn show_status(socket_path: &Path, json: bool) -> Result<()> {
    let response = request(socket_path, Command::Status).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }
    match response {
        Response::Status {
            session,
            queue,
            translation,
            recognition,
        } => {
            let painter = Painter::new(std::io::stdout().is_terminal());
            print!(
                "{}",
                format_status(painter, &session, &queue, &translation, &recognition)
            );
            println!("  {}     {}", "Client:".dimmed(), chatrelay::version_string());
            Ok(())
        }
        other => fail(other),
    }
}

/// Print the verification URL and status changes until the login settles.
async fn follow_login(socket_path: &Path) -> Result<()> {
    let painter = Painter::new(std::io::stdout().is_terminal());
    let mut shown_url: Option<String> = None;
    let mut last_line = String::new();

    loop {
        let session = match request(socket_path, Command::Status).await? {
            Response::Status { session, .. } => session,
            other => fail(other),
        };

        if session.status == SessionStatus::Connected {
            let name = session
                .identity
                .map(|identity| identity.name)
                .unwrap_or_default();
            println!("{}", format!("Logged in as {}", name).green());
            return Ok(());
        }

        let Some(login) = session.login else {
            // The attempt ended without connecting; the daemon log has the reason
            eprintln!("{}", "Login ended without connecting".yellow());
            std::process::exit(1);
        };

        if shown_url.as_deref() != Some(login.verification_url.as_str()) {
            println!("Open this URL with the mobile app to log in:");
            println!("  {}", login.verification_url.bold());
            shown_url = Some(login.verification_url.clone());
        }
        let line = format_login(painter, &login);
        if line != last_line {
            println!("{}", line);
            last_line = line;
        }
        if login.poll_state == PollState::Expired {
            std::process::exit(1);
        }

        tokio::time::sleep(LOGIN_FOLLOW_INTERVAL).await;
    }
}

fn handle_config_command(action: ConfigAction, config_path: &Path) -> Result<()> {
    match action {
        ConfigAction::Path => println!("{}", config_path.display()),
        ConfigAction::Show => {
            let mut config = Config::load_or_default(config_path)?.with_env_overrides();
            if let Some(credential) = config.credential.as_mut() {
                credential.csrf = redact(&credential.csrf);
                credential.cookie = redact(&credential.cookie);
            }
            config.translation.openai.api_key = redact(&config.translation.openai.api_key);
            config.translation.azure.key = redact(&config.translation.azure.key);
            config.recognition.openai.api_key = redact(&config.recognition.openai.api_key);
            print!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Init => {
            if config_path.exists() {
                println!("{} already exists", config_path.display());
            } else {
                Config::default().save(config_path)?;
                println!("{}", format!("Wrote {}", config_path.display()).green());
            }
        }
    }
    Ok(())
}

fn redact(secret: &str) -> String {
    if secret.is_empty() {
        String::new()
    } else {
        "********".to_string()
    }
}
