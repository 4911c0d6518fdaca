//! PGO console - command-line shell for the admin console session.
//!
//! Logs in against the PGO admin API, keeps the session on disk between
//! invocations, and lets you make authenticated calls and check where a
//! navigation would end up.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{bail, Result};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pgo_console_core::{ApiClient, Config, Navigator, RouteGuard, SessionError, SessionStatus};

/// Log file name prefix inside the cache directory
const LOG_FILE_PREFIX: &str = "pgo-console.log";

const USAGE: &str = "Usage: pgo-console <command>

Commands:
  login [username]     Log in (password from PGO_PASSWORD or prompt)
  logout               Forget the stored session
  status               Show the current session
  refresh              Exchange the refresh token for a new session
  get <path>           Authenticated GET against the API
  navigate <route>     Show where a navigation to <route> ends up
  change-password      Change the password of the logged-in account";

/// Prints redirects decided by the session layer.
struct TerminalNavigator;

impl Navigator for TerminalNavigator {
    fn navigate(&self, route: &str) {
        info!(route, "Navigating");
        eprintln!("-> {}", route);
    }
}

/// Initialize the tracing subscriber for logging.
/// Logs go to stderr and to a daily file in the cache directory.
fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match config.cache_dir() {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let mut config = Config::load()?;
    let _log_guard = init_tracing(&config);

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        eprintln!("{}", USAGE);
        return Ok(());
    };

    let client = config.connect(Arc::new(TerminalNavigator))?;

    let result = match command {
        "login" => login(&client, &mut config, args.get(1).cloned()).await,
        "logout" => {
            client.session().logout();
            println!("Logged out.");
            Ok(())
        }
        "status" => {
            status(&client);
            Ok(())
        }
        "refresh" => refresh(&client).await,
        "get" => match args.get(1) {
            Some(path) => get(&client, path).await,
            None => bail!("get needs a path, e.g. /admin/v1/merchants"),
        },
        "navigate" => match args.get(1) {
            Some(route) => {
                let guard = RouteGuard::standard(client.session().clone());
                guard.navigate(route, &TerminalNavigator);
                Ok(())
            }
            None => bail!("navigate needs a route, e.g. /dashboard"),
        },
        "change-password" => change_password(&client).await,
        "-h" | "--help" | "help" => {
            println!("{}", USAGE);
            Ok(())
        }
        other => bail!("Unknown command '{}'\n\n{}", other, USAGE),
    };

    if let Err(ref e) = result {
        if let Some(session_error) = e.downcast_ref::<SessionError>() {
            if session_error.ends_session() {
                eprintln!("Your session has ended. Run `pgo-console login` to sign in again.");
            }
        }
    }
    result
}

async fn login(client: &ApiClient, config: &mut Config, username: Option<String>) -> Result<()> {
    let username = match username.or_else(|| std::env::var("PGO_USERNAME").ok()) {
        Some(username) => username,
        None => prompt_username(config.last_username.as_deref())?,
    };
    let password = match std::env::var("PGO_PASSWORD") {
        Ok(password) => password,
        Err(_) => rpassword::prompt_password("Password: ")?,
    };

    println!("Authenticating...");
    let profile = client.session().login(&username, &password).await?;

    config.last_username = Some(username);
    config.save()?;

    println!("Logged in as {} ({})", profile.name, profile.email);
    if profile.require_password_change {
        println!("A password change is required before continuing.");
        println!("Run `pgo-console change-password`.");
    }
    Ok(())
}

fn prompt_username(last_username: Option<&str>) -> Result<String> {
    match last_username {
        Some(last) => print!("Username [{}]: ", last),
        None => print!("Username: "),
    }
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim();

    match (input.is_empty(), last_username) {
        (true, Some(last)) => Ok(last.to_string()),
        (true, None) => bail!("Username is required"),
        (false, _) => Ok(input.to_string()),
    }
}

fn status(client: &ApiClient) {
    let session = client.session();
    let state = match session.state() {
        SessionStatus::Anonymous => "anonymous",
        SessionStatus::Authenticated => "authenticated",
        SessionStatus::Refreshing => "refreshing",
    };
    println!("Session:  {}", state);

    match session.current_profile() {
        Some(profile) => {
            println!("User:     {} <{}>", profile.username, profile.email);
            println!("Name:     {}", profile.name);
            println!("UID:      {}", profile.uid);
            println!("Roles:    {}", profile.roles.join(", "));
            if profile.require_password_change {
                println!("Password change required");
            }
        }
        None => println!("Not logged in."),
    }
}

async fn refresh(client: &ApiClient) -> Result<()> {
    let profile = client.session().refresh().await?;
    println!("Session refreshed for {}", profile.username);
    Ok(())
}

async fn get(client: &ApiClient, path: &str) -> Result<()> {
    let body = client.get_raw(path).await?;
    match serde_json::from_str::<serde_json::Value>(&body) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", body),
    }
    Ok(())
}

async fn change_password(client: &ApiClient) -> Result<()> {
    if !client.session().is_authenticated() {
        bail!("Not logged in");
    }
    let current = rpassword::prompt_password("Current password: ")?;
    let new = rpassword::prompt_password("New password: ")?;
    let confirmation = rpassword::prompt_password("Confirm new password: ")?;

    client.change_password(&current, &new, &confirmation).await?;
    println!("Password changed.");
    Ok(())
}
