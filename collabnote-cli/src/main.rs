use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use collabnote_core::config::Config;
use collabnote_core::credential::CredentialStore;
use collabnote_core::engine::LocalEngine;
use collabnote_core::logging::{init_logging_with_config, LogConfig, LogLevel};
use collabnote_core::permission::{HttpPermissionApi, PermissionApi, PermissionError, Role};
use collabnote_core::session::{SessionController, SessionState};
use collabnote_core::shutdown::{install_signal_handlers, ShutdownCoordinator};
use collabnote_core::token::{HttpTokenApi, IssuedToken, TokenApi, TokenIssueError};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "collabnote")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Set the log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON formatted logging
    #[arg(long)]
    json_logs: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Parser, Debug)]
enum Command {
    /// Run the full session lifecycle against a process-local engine
    Demo {
        /// Note identifier to open
        #[arg(default_value = "demo")]
        note_id: String,

        /// Text to write once the session is synced
        #[arg(default_value = "Hello from CollabNote!")]
        text: String,

        /// Role to resolve for the demo user (OWNER, WRITER, READER)
        #[arg(long, default_value = "WRITER")]
        role: String,
    },

    /// Open a note session against a running issuer service and hold it
    /// until Ctrl+C
    Session {
        /// Note identifier to open
        note_id: String,

        /// Bearer credential presented to the issuer service
        #[arg(long)]
        credential: Option<String>,
    },
}

/// Grants every caller the same fixed role.
struct DemoPermission(Role);

#[async_trait]
impl PermissionApi for DemoPermission {
    async fn resolve(
        &self,
        _document_id: &str,
        _credential: Option<&str>,
    ) -> Result<Role, PermissionError> {
        Ok(self.0)
    }
}

/// Issues a fixed collaboration token with a short TTL.
struct DemoTokens;

#[async_trait]
impl TokenApi for DemoTokens {
    async fn issue(
        &self,
        document_id: &str,
        _credential: Option<&str>,
    ) -> Result<IssuedToken, TokenIssueError> {
        Ok(IssuedToken {
            token: format!("demo-token-{document_id}"),
            expires_in: Duration::from_secs(120),
            attribute_key: Some(document_id.to_string()),
            attribute_verb: Some("rw".to_string()),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = LogLevel::from_str(&args.log_level).unwrap_or_else(|| {
        eprintln!("Invalid log level '{}', using 'info'", args.log_level);
        LogLevel::Info
    });
    let log_config = LogConfig::new(log_level).json_format(args.json_logs);
    init_logging_with_config(log_config)?;
    collabnote_core::metrics::init_metrics();

    info!("CollabNote CLI started");

    match args.command {
        Some(Command::Demo {
            note_id,
            text,
            role,
        }) => {
            let role = Role::parse(&role)
                .with_context(|| format!("unknown role '{role}'"))?;
            run_demo(&note_id, &text, role).await?;
        }
        Some(Command::Session {
            note_id,
            credential,
        }) => {
            run_session(&note_id, credential).await?;
        }
        None => {
            info!("No command specified. Use --help for usage information.");
        }
    }

    info!("CollabNote CLI finished");

    Ok(())
}

async fn run_demo(note_id: &str, text: &str, role: Role) -> Result<()> {
    let config = Config::from_env()?;
    let engine = LocalEngine::new();
    let shutdown = Arc::new(ShutdownCoordinator::new(Duration::from_secs(5)));
    install_signal_handlers(shutdown.clone());

    let controller = SessionController::spawn(
        &config,
        Arc::new(engine.clone()),
        Arc::new(DemoPermission(role)),
        Arc::new(DemoTokens),
        CredentialStore::with_credential("demo-credential"),
        shutdown.subscribe(),
    );

    let mut status_rx = controller.status();
    controller.set_document(note_id).await?;
    let status = status_rx
        .wait_for(|s| matches!(s.state, SessionState::Synced | SessionState::Error))
        .await
        .context("session controller stopped before startup finished")?
        .clone();
    if status.state == SessionState::Error {
        anyhow::bail!(
            "session startup failed: {}",
            status.error.unwrap_or_else(|| "unknown error".to_string())
        );
    }
    info!(role = %role, "session synced");

    if role.can_edit() {
        controller.edit(text).await?;
        let mut text_rx = controller.local_text();
        text_rx
            .wait_for(|t| t == text)
            .await
            .context("edit was not applied")?;
    }

    // simulate a collaborator while we are attached
    let key = collabnote_core::session::document_key(note_id);
    engine
        .remote_edit(&key, &format!("{text} (seen by a collaborator)"))
        .await;
    engine.emit_sync(&key, "document synced").await;
    status_rx
        .wait_for(|s| s.sync_label.is_some())
        .await
        .context("sync report never arrived")?;

    controller.teardown().await?;

    let final_status = status_rx.borrow().clone();
    println!("{}", serde_json::to_string_pretty(&final_status)?);
    for entry in controller.debug_log().entries().await.iter().rev() {
        println!("  {}", entry.message);
    }

    Ok(())
}

/// Hold a live session: permission and tokens come from the configured
/// issuer service, the document itself lives in the process-local engine.
async fn run_session(note_id: &str, credential: Option<String>) -> Result<()> {
    let config = Config::from_env()?;
    let permission = HttpPermissionApi::new(&config.issuer.base_url, config.issuer.request_timeout)
        .context("building permission client")?;
    let tokens = HttpTokenApi::new(&config.issuer.base_url, config.issuer.request_timeout)
        .context("building token client")?;
    let credentials = match credential {
        Some(credential) => CredentialStore::with_credential(credential),
        None => CredentialStore::new(),
    };

    let shutdown = Arc::new(ShutdownCoordinator::new(Duration::from_secs(5)));
    install_signal_handlers(shutdown.clone());

    let controller = SessionController::spawn(
        &config,
        Arc::new(LocalEngine::new()),
        Arc::new(permission),
        Arc::new(tokens),
        credentials,
        shutdown.subscribe(),
    );

    // stream visible state changes until the host shuts down
    let mut status_rx = controller.status();
    let mut countdown_rx = controller.countdown();
    let mut shutdown_rx = shutdown.subscribe();
    controller.set_document(note_id).await?;

    loop {
        tokio::select! {
            changed = status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = status_rx.borrow_and_update().clone();
                info!(state = %status.state, attached = status.attached, "session status");
                if let Some(error) = status.error.as_deref() {
                    warn!(error, "session error");
                }
            }
            changed = countdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let left = *countdown_rx.borrow_and_update();
                info!(seconds_left = left, "token countdown");
            }
            _ = shutdown_rx.recv() => {
                break;
            }
        }
    }

    controller.teardown().await.ok();
    for entry in controller.debug_log().entries().await.iter().rev() {
        println!("  {}", entry.message);
    }

    Ok(())
}
