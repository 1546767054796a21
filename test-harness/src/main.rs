//! Session lifecycle test harness
//!
//! Drives a full scripted session lifecycle against the process-local
//! engine and prints every observable state change: startup, edits in both
//! directions, an injected auth error, a document switch, a scripted attach
//! failure with retry, and ordered teardown.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use collabnote_core::config::Config;
use collabnote_core::credential::CredentialStore;
use collabnote_core::engine::LocalEngine;
use collabnote_core::logging::{init_logging_with_config, LogConfig, LogLevel};
use collabnote_core::permission::{PermissionApi, PermissionError, Role};
use collabnote_core::session::{document_key, SessionController, SessionState, SessionStatus};
use collabnote_core::shutdown::ShutdownCoordinator;
use collabnote_core::token::{IssuedToken, TokenApi, TokenIssueError};
use tokio::sync::watch;
use tokio::time::timeout;

#[derive(Parser, Debug)]
#[command(name = "test-harness")]
#[command(about = "CollabNote session lifecycle harness", long_about = None)]
struct Args {
    /// Set the log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    /// Role the scripted user resolves to (OWNER, WRITER, READER)
    #[arg(long, default_value = "WRITER")]
    role: String,
}

struct HarnessPermission(Role);

#[async_trait]
impl PermissionApi for HarnessPermission {
    async fn resolve(
        &self,
        _document_id: &str,
        _credential: Option<&str>,
    ) -> Result<Role, PermissionError> {
        Ok(self.0)
    }
}

struct HarnessTokens;

#[async_trait]
impl TokenApi for HarnessTokens {
    async fn issue(
        &self,
        document_id: &str,
        _credential: Option<&str>,
    ) -> Result<IssuedToken, TokenIssueError> {
        Ok(IssuedToken {
            token: format!("harness-token-{document_id}"),
            expires_in: Duration::from_secs(60),
            attribute_key: Some(document_id.to_string()),
            attribute_verb: Some("rw".to_string()),
        })
    }
}

async fn wait_until(
    rx: &mut watch::Receiver<SessionStatus>,
    what: &str,
    predicate: impl FnMut(&SessionStatus) -> bool,
) -> Result<SessionStatus> {
    let status = timeout(Duration::from_secs(5), rx.wait_for(predicate))
        .await
        .with_context(|| format!("timed out waiting for {what}"))?
        .context("session controller stopped")?
        .clone();
    Ok(status)
}

fn print_status(step: &str, status: &SessionStatus) {
    println!(
        "[{step}] state={} key={} role={} attached={} sync={} error={}",
        status.state,
        status.document_key.as_deref().unwrap_or("-"),
        status
            .role
            .map(|r| r.as_str())
            .unwrap_or("-"),
        status.attached,
        status.sync_label.as_deref().unwrap_or("-"),
        status.error.as_deref().unwrap_or("-"),
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = LogLevel::from_str(&args.log_level).unwrap_or(LogLevel::Warn);
    init_logging_with_config(LogConfig::new(log_level))?;
    let role = Role::parse(&args.role).with_context(|| format!("unknown role '{}'", args.role))?;

    let config = Config::from_env()?;
    let engine = LocalEngine::new();
    let shutdown = ShutdownCoordinator::new(Duration::from_secs(5));
    let controller = SessionController::spawn(
        &config,
        Arc::new(engine.clone()),
        Arc::new(HarnessPermission(role)),
        Arc::new(HarnessTokens),
        CredentialStore::with_credential("harness-credential"),
        shutdown.subscribe(),
    );
    let mut status_rx = controller.status();
    let mut text_rx = controller.local_text();

    // 1. startup on the first note
    controller.set_document("1").await?;
    let status = wait_until(&mut status_rx, "first sync", |s| {
        s.state == SessionState::Synced
    })
    .await?;
    print_status("startup", &status);

    // 2. local edit, then a simulated collaborator edit
    if role.can_edit() {
        controller.edit("harness line one").await?;
        timeout(
            Duration::from_secs(5),
            text_rx.wait_for(|t| t == "harness line one"),
        )
        .await
        .context("local edit was not applied")??;
        println!("[edit] local text accepted");
    }
    let key = document_key("1");
    engine.remote_edit(&key, "harness line one + remote").await;
    timeout(
        Duration::from_secs(5),
        text_rx.wait_for(|t| t.ends_with("+ remote")),
    )
    .await
    .context("remote edit never arrived")??;
    println!("[remote] buffer follows collaborator");

    // 3. auth error must surface without detaching
    engine
        .emit_auth_error(&key, "PushPull", "token rejected")
        .await;
    let status = wait_until(&mut status_rx, "auth error", |s| s.last_auth_error.is_some()).await?;
    print_status("auth-error", &status);
    anyhow::ensure!(status.attached, "auth error must not drop the attachment");

    // 4. switch documents; old session is torn down in order
    controller.set_document("2").await?;
    let status = wait_until(&mut status_rx, "second sync", |s| {
        s.state == SessionState::Synced && s.document_key.as_deref() == Some("note-2")
    })
    .await?;
    print_status("switch", &status);

    // 5. scripted attach failure, then recovery via retry
    engine.set_fail_attach(true);
    controller.set_document("3").await?;
    let status = wait_until(&mut status_rx, "attach failure", |s| {
        s.state == SessionState::Error
    })
    .await?;
    print_status("failure", &status);
    engine.set_fail_attach(false);
    controller.retry().await?;
    let status = wait_until(&mut status_rx, "retry sync", |s| {
        s.state == SessionState::Synced && s.document_key.as_deref() == Some("note-3")
    })
    .await?;
    print_status("retry", &status);

    // 6. teardown
    controller.teardown().await?;
    let status = status_rx.borrow().clone();
    print_status("teardown", &status);
    anyhow::ensure!(!status.attached, "teardown must clear the attachment");

    println!();
    println!("engine operations, in call order:");
    for op in engine.ops() {
        println!("  {op:?}");
    }

    Ok(())
}
