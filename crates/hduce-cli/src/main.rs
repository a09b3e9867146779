//! HDUCE CLI - a command-line client for the HDUCE healthcare portal.
//!
//! Logs in against the portal API, keeps the session in the configured
//! token store, and lists doctors, appointments and notifications.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{Local, Utc};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use hduce_core::api::{HttpGateway, Navigator};
use hduce_core::auth::token;
use hduce_core::config::Config;
use hduce_core::models::Notification;
use hduce_core::session::{SessionController, SessionError, SessionOptions, SessionPhase};

/// Log file name in the cache directory when `HDUCE_LOG_FILE` is set.
const LOG_FILE: &str = "hduce.log";

const USAGE: &str = "\
Usage: hduce <command>

Commands:
  login [email]    Log in (prompts for the password)
  logout           End the session and forget the stored token
  status [--json]  Show the current session
  doctors          List doctors
  appointments     List your appointments
  notifications    List your notifications
  dashboard        Summary of appointments and notifications
  help             Show this message";

/// Tells the user to log in again when the gateway ends the session.
struct CliNavigator;

impl Navigator for CliNavigator {
    fn navigate(&self, path: &str) {
        info!(path, "Session ended by gateway");
        eprintln!("Your session has ended. Run `hduce login` to sign in again.");
    }
}

/// Initialize the tracing subscriber for logging.
/// Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug).
fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let file_layer_and_guard = std::env::var("HDUCE_LOG_FILE")
        .ok()
        .filter(|v| v == "1")
        .and_then(|_| config.cache_dir().ok())
        .map(|dir| {
            let appender = tracing_appender::rolling::never(dir, LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (fmt::layer().with_ansi(false).with_writer(writer), guard)
        });

    let (file_layer, guard) = match file_layer_and_guard {
        Some((layer, guard)) => (Some(layer), Some(guard)),
        None => (None, None),
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
    let _guard = init_tracing(&config);

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = args.first().map(String::as_str).unwrap_or("status");
    if matches!(command, "help" | "--help" | "-h") {
        println!("{}", USAGE);
        return Ok(());
    }

    let store = config.open_token_store()?;
    let gateway = HttpGateway::new(config.api_url(), store, Arc::new(CliNavigator))
        .context("Failed to create HTTP client")?;
    let session = SessionController::from_gateway(gateway.clone(), SessionOptions::default());
    info!(command, api_url = gateway.base_url(), "HDUCE CLI starting");

    match command {
        "login" => login(&session, &mut config, args.get(1).cloned()).await,
        "logout" => {
            session.logout();
            println!("Logged out.");
            Ok(())
        }
        "status" => status(&session, args.iter().any(|a| a == "--json")).await,
        "doctors" => {
            require_session(&session).await?;
            list_doctors(&gateway).await
        }
        "appointments" => {
            require_session(&session).await?;
            list_appointments(&gateway).await
        }
        "notifications" => {
            require_session(&session).await?;
            let notifications = gateway.notifications().await?;
            print_notifications(&notifications);
            Ok(())
        }
        "dashboard" => {
            require_session(&session).await?;
            dashboard(&session, &gateway).await
        }
        other => {
            eprintln!("{}", USAGE);
            bail!("Unknown command: {}", other)
        }
    }
}

fn prompt_line(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

async fn login(session: &SessionController, config: &mut Config, email: Option<String>) -> Result<()> {
    let email = match email.or_else(|| config.last_email.clone()) {
        Some(email) => email,
        None => prompt_line("Email: ")?,
    };
    if email.is_empty() {
        bail!("Email is required");
    }

    let password = rpassword::prompt_password(format!("Password for {}: ", email))
        .context("Failed to read password")?;

    match session.login(&email, &password).await {
        Ok(()) => {}
        Err(SessionError::MissingToken) => {
            bail!("The server accepted the login but returned no token; please report this")
        }
        Err(e) => return Err(e.into()),
    }

    config.last_email = Some(email);
    if let Err(e) = config.save() {
        tracing::warn!(error = %e, "Could not save config");
    }

    let snapshot = session.snapshot();
    match snapshot.user {
        Some(user) => println!("Logged in as {} ({}).", user.display_name(), user.role),
        None => println!("Logged in."),
    }
    Ok(())
}

async fn require_session(session: &SessionController) -> Result<()> {
    if session.initialize().await != SessionPhase::Authenticated {
        bail!("Not logged in. Run `hduce login` first.");
    }
    Ok(())
}

async fn status(session: &SessionController, json: bool) -> Result<()> {
    session.initialize().await;
    let snapshot = session.snapshot();

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    match snapshot.phase {
        SessionPhase::Authenticated => {
            match &snapshot.user {
                Some(user) => println!(
                    "Logged in as {} <{}> ({})",
                    user.display_name(),
                    user.email,
                    user.role
                ),
                None => println!("Logged in (profile unavailable)"),
            }
            if let Some(claims) = snapshot.token.as_deref().and_then(|t| token::decode(t).ok()) {
                let minutes = claims.seconds_remaining(Utc::now()).max(0) / 60;
                if let Some(expires) = claims.expires_at() {
                    println!(
                        "Token expires {} ({} min left)",
                        expires.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
                        minutes
                    );
                }
            }
        }
        _ => println!("Not logged in."),
    }
    Ok(())
}

async fn list_doctors(gateway: &HttpGateway) -> Result<()> {
    let doctors = gateway.doctors().await?;
    if doctors.is_empty() {
        println!("No doctors found.");
    }
    for doctor in doctors.iter().filter(|d| d.is_active) {
        let hours = doctor.available_hours.as_deref().unwrap_or("-");
        println!(
            "{:>4}  {:<30} {:<20} {}",
            doctor.id,
            doctor.name,
            doctor.specialty.name(),
            hours
        );
    }
    Ok(())
}

async fn list_appointments(gateway: &HttpGateway) -> Result<()> {
    let appointments = gateway.appointments().await?;
    if appointments.is_empty() {
        println!("No appointments.");
    }
    for appt in &appointments {
        let with = appt
            .doctor
            .as_ref()
            .map(|d| d.name.clone())
            .unwrap_or_else(|| format!("doctor #{}", appt.doctor_id));
        println!(
            "{} {}  {:<10} {}  {}",
            appt.date,
            appt.time,
            appt.status.to_string(),
            with,
            appt.reason.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

fn print_notifications(notifications: &[Notification]) {
    if notifications.is_empty() {
        println!("No notifications.");
    }
    for n in notifications {
        let marker = if n.read { " " } else { "*" };
        println!("{} {}  {}: {}", marker, n.created_at, n.title, n.message);
    }
}

async fn dashboard(session: &SessionController, gateway: &HttpGateway) -> Result<()> {
    if let Some(user) = session.snapshot().user {
        println!("Welcome, {}.", user.display_name());
    }

    let (doctors, appointments, notifications) = futures::join!(
        gateway.doctors(),
        gateway.appointments(),
        gateway.notifications()
    );

    match doctors {
        Ok(d) => println!("Doctors:        {}", d.len()),
        Err(e) => eprintln!("Doctors:        unavailable ({})", e),
    }
    match appointments {
        Ok(a) => println!(
            "Appointments:   {} ({} upcoming)",
            a.len(),
            a.iter().filter(|a| a.is_upcoming()).count()
        ),
        Err(e) => eprintln!("Appointments:   unavailable ({})", e),
    }
    match notifications {
        Ok(n) => println!(
            "Notifications:  {} ({} unread)",
            n.len(),
            n.iter().filter(|n| !n.read).count()
        ),
        Err(e) => eprintln!("Notifications:  unavailable ({})", e),
    }
    Ok(())
}
