//! Command handlers

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tracing::{debug, info};

use kickscope_core::core::analysis::validate_base_url;
use kickscope_core::core::settings::api_url_from_env;
use kickscope_core::{
    AnalysisBackend, AnalysisController, AnalysisStage, ClientSettings, CoreError,
    HttpAnalysisBackend, SessionUpdate, SettingsManager, SettingsOverrides,
};

use crate::output::Output;

/// Everything a command needs, resolved from flags, environment and the
/// settings file
pub struct CommandContext {
    pub manager: SettingsManager,
    pub overrides: SettingsOverrides,
    pub output: Output,
}

impl CommandContext {
    fn settings(&self) -> Result<ClientSettings> {
        let settings = self
            .manager
            .load()
            .resolve(&self.overrides, api_url_from_env().as_deref())?;
        debug!("Using analysis service at {}", settings.api_url);
        Ok(settings)
    }

    fn backend(&self, settings: &ClientSettings) -> Result<HttpAnalysisBackend> {
        HttpAnalysisBackend::new(&settings.api_url, settings.request_timeout())
            .context("Failed to create analysis client")
    }

    fn controller(&self) -> Result<AnalysisController> {
        let settings = self.settings()?;
        let backend = self.backend(&settings)?;
        Ok(AnalysisController::new(
            Arc::new(backend),
            settings.poller_config(),
        ))
    }
}

// =============================================================================
// Analysis Commands
// =============================================================================

pub async fn upload(ctx: &mut CommandContext, file: PathBuf) -> Result<()> {
    let mut controller = ctx.controller()?;
    controller.session_mut().select_file(file);

    match controller.submit_file().await {
        Ok(ticket) => ctx.output.ticket(&ticket),
        Err(e) => return Err(alert_error(&mut controller, e)),
    }
    follow(ctx, &mut controller).await
}

pub async fn youtube(ctx: &mut CommandContext, url: String) -> Result<()> {
    let mut controller = ctx.controller()?;
    controller.session_mut().set_youtube_url(url);

    match controller.submit_youtube().await {
        Ok(ticket) => ctx.output.ticket(&ticket),
        Err(e) => return Err(alert_error(&mut controller, e)),
    }
    follow(ctx, &mut controller).await
}

pub async fn watch(ctx: &mut CommandContext, analysis_id: String) -> Result<()> {
    let mut controller = ctx.controller()?;
    if let Err(e) = controller.watch(analysis_id) {
        return Err(alert_error(&mut controller, e));
    }
    follow(ctx, &mut controller).await
}

pub async fn status(ctx: &mut CommandContext, analysis_id: String) -> Result<()> {
    let settings = ctx.settings()?;
    let backend = ctx.backend(&settings)?;

    let status = backend
        .fetch_status(&analysis_id)
        .await
        .with_context(|| format!("Failed to get the status of {}", analysis_id))?;
    ctx.output.status(&status);

    if status.stage == AnalysisStage::Error {
        return Err(CoreError::AnalysisFailed(status.error_message()).into());
    }
    Ok(())
}

pub async fn results(ctx: &mut CommandContext, analysis_id: String) -> Result<()> {
    let settings = ctx.settings()?;
    let backend = ctx.backend(&settings)?;

    let results = backend
        .fetch_results(&analysis_id)
        .await
        .with_context(|| format!("Failed to get the results of {}", analysis_id))?;
    ctx.output.results(&results);
    Ok(())
}

/// Prints updates until polling ends. Ctrl-C cancels the analysis.
async fn follow(ctx: &mut CommandContext, controller: &mut AnalysisController) -> Result<()> {
    loop {
        let update = tokio::select! {
            update = controller.next_update() => Some(update),
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(update) = update else {
            info!("Interrupted, cancelling analysis");
            controller.cancel();
            return Err(CoreError::Cancelled.into());
        };

        match update {
            Some(SessionUpdate::Event(event)) => ctx.output.event(&event),
            Some(SessionUpdate::Finished(outcome)) => {
                return match outcome.into_result() {
                    Ok(results) => {
                        ctx.output.results(&results);
                        Ok(())
                    }
                    Err(e) => Err(alert_error(controller, e)),
                };
            }
            None => return Err(anyhow!("No analysis in progress")),
        }
    }
}

/// Prefers the session's alert, which carries the user-facing wording
fn alert_error(controller: &mut AnalysisController, error: CoreError) -> anyhow::Error {
    match controller.session_mut().take_alert() {
        Some(alert) => anyhow!(alert),
        None => error.into(),
    }
}

// =============================================================================
// Config Commands
// =============================================================================

pub fn config_show(ctx: &CommandContext) -> Result<()> {
    let settings = ctx.settings()?;
    ctx.output.settings(&settings, ctx.manager.settings_path());
    Ok(())
}

pub fn config_set_api_url(ctx: &CommandContext, url: String) -> Result<()> {
    let url = validate_base_url(&url)?;
    let saved = ctx
        .manager
        .update(|settings| settings.api_url = url)
        .context("Failed to save settings")?;
    ctx.output.message(&format!("API URL set to {}", saved.api_url));
    Ok(())
}

pub fn config_reset(ctx: &CommandContext) -> Result<()> {
    ctx.manager.reset().context("Failed to reset settings")?;
    ctx.output.message("Settings reset to defaults");
    Ok(())
}
