//! Core application

use std::sync::Arc;
use std::time::Duration;

use agentmark::{BackendError, HttpBackend, StepChunk};
use anyhow::{Context, Result};
use tokio::time::MissedTickBehavior;

use crate::core::banner;
use crate::core::cli::{self, CliConfig, Commands, HistoryCommands};
use crate::core::config::AppConfig;
use crate::core::constants::{APP_NAME_LOWER, AUTOSAVE_FLUSH_TIMEOUT_SECS, ENV_LOG};
use crate::domain::Simulation;
use crate::domain::scenarios::is_pinned;
use crate::domain::session::{Advance, PendingAdvance, SessionError};

pub struct CoreApp {
    pub config: AppConfig,
    pub simulation: Simulation,
}

impl CoreApp {
    /// Run the application with CLI argument parsing
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();
        Self::init_logging();

        tracing::debug!("Application starting");

        let (cli_config, command) = cli::parse();
        tracing::trace!(command = ?command, "Parsed command");

        let Some(command) = command else {
            cli::print_help();
            return Ok(());
        };

        let mut app = Self::init(&cli_config).await?;
        match command {
            Commands::Run { query, .. } => app.run_live(&query).await,
            Commands::Resume {
                trajectory_id,
                prompt,
                ..
            } => app.resume(&trajectory_id, &prompt).await,
            Commands::Evaluate {
                session_id,
                language,
            } => app.evaluate(&session_id, language.as_deref()).await,
            Commands::History { command } => app.handle_history_command(command).await,
        }
    }

    async fn init(cli: &CliConfig) -> Result<Self> {
        let config = AppConfig::load(cli)?;
        let backend = HttpBackend::with_timeout(&config.backend.url, config.backend.timeout)
            .with_context(|| format!("Invalid backend URL: {}", config.backend.url))?;
        tracing::debug!(url = %backend.base_url(), "Backend client ready");

        let mut simulation = Simulation::new(Arc::new(backend), &config);
        simulation.load().await;
        tracing::debug!(saved = simulation.store().list().len(), "History loaded");

        Ok(Self { config, simulation })
    }

    fn init_logging() {
        let default_filter = format!("info,{}=info", APP_NAME_LOWER);

        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or(default_filter);

        tracing_subscriber::fmt()
            .with_target(false)
            .with_thread_ids(false)
            .with_level(true)
            .with_ansi(true)
            .compact()
            .with_env_filter(filter)
            .init();
    }

    fn print_banner(&self) {
        banner::print_banner(
            &self.config.backend.url,
            self.simulation.store().scope(),
            self.simulation.erasure_rate(),
            self.config.playback.autoplay_interval.as_millis() as u64,
        );
    }

    // =========================================================================
    // Live playback
    // =========================================================================

    async fn run_live(&mut self, query: &str) -> Result<()> {
        self.print_banner();
        self.simulation.start(query, None).await?;
        tracing::info!(
            session_id = self.simulation.session().session_id().unwrap_or_default(),
            "Session started"
        );
        self.drive().await
    }

    async fn resume(&mut self, trajectory_id: &str, prompt: &str) -> Result<()> {
        if self.simulation.store().get(trajectory_id).is_none() {
            anyhow::bail!("Saved trajectory not found: {}", trajectory_id);
        }
        self.print_banner();
        self.simulation.select(trajectory_id);

        let path = self.simulation.continue_with(prompt).await?;
        tracing::debug!(?path, "Conversation continued");
        self.drive().await
    }

    /// Auto-play until both agents finish, playback stops or Ctrl+C
    async fn drive(&mut self) -> Result<()> {
        let mut ticker = tokio::time::interval(self.simulation.session().autoplay_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut printed = 0;
        self.print_revealed(&mut printed);
        let mut pending: Option<PendingAdvance> = None;
        let mut failure: Option<anyhow::Error> = None;

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Interrupted, stopping playback");
                    self.simulation.pause();
                    break;
                }
                chunk = next_chunk(&mut pending), if pending.is_some() => {
                    let Some(mut advance) = pending.take() else {
                        continue;
                    };
                    match chunk {
                        Some(Ok(chunk)) => {
                            self.simulation.ingest(&mut advance, chunk);
                            pending = Some(advance);
                        }
                        Some(Err(e)) => {
                            if let Err(e) = self.simulation.complete_advance(advance, Some(e)) {
                                failure = stop_reason(e);
                                break;
                            }
                        }
                        None => {
                            let report = self.simulation.complete_advance(advance, None)?;
                            if report.rolled_back {
                                tracing::warn!(step = report.step_index, "Backend returned no result, step dropped");
                            }
                            self.print_revealed(&mut printed);
                        }
                    }
                }
                _ = ticker.tick(), if pending.is_none() => {
                    match self.simulation.tick().await {
                        Ok(Some(Advance::Started(advance))) => pending = Some(advance),
                        Ok(Some(Advance::Terminal)) => {
                            tracing::info!("Both agents finished");
                            break;
                        }
                        Ok(None) if !self.simulation.session().is_playing() => break,
                        Ok(None) => {}
                        Err(e) => {
                            failure = stop_reason(e);
                            break;
                        }
                    }
                }
            }
        }

        if let Some(advance) = pending.take() {
            self.simulation.complete_advance(advance, None)?;
            self.print_revealed(&mut printed);
        }

        banner::print_erasure(&self.simulation.erasure());
        self.simulation
            .flush(Duration::from_secs(AUTOSAVE_FLUSH_TIMEOUT_SECS))
            .await;

        if let Some(id) = self.simulation.session().trajectory().map(|t| t.id.clone()) {
            println!("\n  Saved as {}\n", id);
        }
        failure.map_or(Ok(()), Err)
    }

    /// Print steps revealed since the last call
    fn print_revealed(&self, printed: &mut usize) {
        let erasure = self.simulation.erasure();
        let steps = self.simulation.visible_steps();
        let from = (*printed).min(steps.len());
        for step in &steps[from..] {
            banner::print_step(step, &erasure);
        }
        *printed = steps.len();
    }

    // =========================================================================
    // Evaluation
    // =========================================================================

    async fn evaluate(&mut self, session_id: &str, language: Option<&str>) -> Result<()> {
        self.simulation.select(session_id);
        if let Some(language) = language {
            self.simulation.set_language(language);
        }
        let result = self.simulation.evaluate(true).await?;
        banner::print_evaluation(&result);
        Ok(())
    }

    // =========================================================================
    // History
    // =========================================================================

    async fn handle_history_command(&mut self, command: HistoryCommands) -> Result<()> {
        match command {
            HistoryCommands::List => {
                banner::print_history(self.simulation.store().list());
            }
            HistoryCommands::Delete { ids } => {
                if let [id] = ids.as_slice() {
                    self.simulation.delete(id).await?;
                    println!("Deleted {}", id);
                } else {
                    let deleted = self.simulation.batch_delete(&ids).await?;
                    println!("Deleted {} trajectories", deleted);
                }
            }
            HistoryCommands::Clear { yes } => {
                let count = self.simulation.store().list().len();
                println!(
                    "This will delete {} saved trajectories in scope '{}'.",
                    count,
                    self.simulation.store().scope()
                );
                if !yes && !confirm()? {
                    println!("Aborted.");
                    return Ok(());
                }
                let deleted = self.simulation.clear_all().await?;
                println!("Deleted {} trajectories", deleted);
            }
            HistoryCommands::Pin { id } => {
                self.simulation.toggle_pin(&id).await?;
                let pinned = self.simulation.store().get(&id).is_some_and(is_pinned);
                println!("{} {}", if pinned { "Pinned" } else { "Unpinned" }, id);
            }
        }
        Ok(())
    }
}

/// Poll the open stream; never resolves when nothing is open
async fn next_chunk(pending: &mut Option<PendingAdvance>) -> Option<Result<StepChunk, BackendError>> {
    match pending {
        Some(advance) => advance.next_chunk().await,
        None => std::future::pending().await,
    }
}

/// Transient failures stop playback but keep the partial trajectory, so they
/// are reported without failing the command.
fn stop_reason(error: SessionError) -> Option<anyhow::Error> {
    if error.is_transient() {
        tracing::warn!(error = %error, "Playback stopped");
        None
    } else {
        Some(error.into())
    }
}

fn confirm() -> Result<bool> {
    print!("\nContinue? [y/N] ");
    std::io::Write::flush(&mut std::io::stdout())?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(matches!(input.trim().to_lowercase().as_str(), "y" | "yes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_failure_does_not_fail_the_run() {
        let error = SessionError::Stream(BackendError::Stream("connection reset".to_string()));
        assert!(stop_reason(error).is_none());
    }

    #[test]
    fn test_missing_session_fails_the_run() {
        assert!(stop_reason(SessionError::NoSession).is_some());
    }
}
