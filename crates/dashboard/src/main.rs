mod cli;
mod config;
mod slices;

use std::sync::Arc;

use anyhow::Context;
use optiboard_client::ServerApi;
use optiboard_core::slice::{
    SLICE_CHANGE_MODIFIER_SETTINGS, SLICE_CREATE_OPTIM, SLICE_CREATE_PERF_PROFILE,
    SLICE_DELETE_PROJECT, SLICE_PROJECTS, SLICE_SELECTED_OPTIMS, SLICE_SELECTED_PROFILES_PERF,
    SLICE_SYSTEM_INFO, SLICE_UPDATE_PROJECT,
};
use optiboard_core::{RequestStatus, SliceState};
use optiboard_events::StoreEventKind;
use optiboard_store::{Action, Store};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::Command;
use crate::config::DashboardConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "optiboard_dashboard=debug,optiboard_store=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let command = Command::parse(std::env::args().skip(1))?;
    let config = DashboardConfig::from_env()?;
    tracing::info!(
        api_root = %config.api_root,
        timeout_secs = config.request_timeout.as_secs(),
        poll_interval_ms = config.poll.interval.as_millis() as u64,
        "Dashboard starting",
    );

    let api = ServerApi::new(config.api_root.clone(), config.request_timeout)
        .context("failed to build HTTP client")?;
    let store = slices::build_store(Arc::new(api), config.poll)?;

    let result = match &command {
        Command::Overview => overview(&store).await,
        Command::Profile { .. } => {
            run_job(&store, SLICE_CREATE_PERF_PROFILE, SLICE_SELECTED_PROFILES_PERF, &command)
                .await
        }
        Command::Optim { .. } => optim(&store, &command).await,
        Command::Modifier { .. } => {
            request(&store, SLICE_CHANGE_MODIFIER_SETTINGS, command.params())
                .await
                .map(drop)
        }
        Command::Delete { .. } => delete_project(&store, &command).await,
    };

    store.shutdown();
    tracing::info!("Dashboard stopped");
    result
}

fn settled(state: &SliceState) -> bool {
    matches!(
        state.status(),
        RequestStatus::Succeeded | RequestStatus::Failed
    )
}

/// Load and print the project list and server info.
async fn overview(store: &Store) -> anyhow::Result<()> {
    store.dispatch(Action::start(SLICE_PROJECTS, serde_json::Value::Null));
    store.dispatch(Action::start(SLICE_SYSTEM_INFO, serde_json::Value::Null));

    for key in [SLICE_PROJECTS, SLICE_SYSTEM_INFO] {
        let state = store
            .wait_for(key, settled)
            .await
            .with_context(|| format!("store stopped before {key} loaded"))?;
        print_slice(key, &state)?;
    }
    Ok(())
}

/// Run one request slice to completion and print it.
///
/// Returns the settled snapshot, or an error if the request failed.
async fn request(
    store: &Store,
    key: &str,
    params: serde_json::Value,
) -> anyhow::Result<Arc<SliceState>> {
    let before = store.select(key).map(|s| s.request().generation);
    store.dispatch(Action::start(key, params));
    let state = store
        .wait_for(key, |s| Some(s.request().generation) > before && settled(s))
        .await
        .with_context(|| format!("store stopped before {key} settled"))?;
    print_slice(key, &state)?;
    if state.status() == RequestStatus::Failed {
        anyhow::bail!("{key} failed");
    }
    Ok(state)
}

/// Save the project's training settings when given, then create the
/// optimization.
async fn optim(store: &Store, command: &Command) -> anyhow::Result<()> {
    if let Some(update) = command.project_update() {
        request(store, SLICE_UPDATE_PROJECT, update).await?;
    }
    run_job(store, SLICE_CREATE_OPTIM, SLICE_SELECTED_OPTIMS, command).await
}

/// Delete a project and print the remaining list.
async fn delete_project(store: &Store, command: &Command) -> anyhow::Result<()> {
    request(store, SLICE_DELETE_PROJECT, command.params()).await?;
    request(store, SLICE_PROJECTS, serde_json::Value::Null).await?;
    Ok(())
}

/// Start a job slice, follow it to completion, then close it.
///
/// Ctrl-C closes the slice early, which cancels the server-side job first.
/// Closing after success refreshes `list_key`, which is printed.
async fn run_job(
    store: &Store,
    job_key: &str,
    list_key: &str,
    command: &Command,
) -> anyhow::Result<()> {
    let mut events = store.events();
    store.dispatch(Action::start(job_key, command.params()));

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut closing = false;
    let mut succeeded = false;

    loop {
        tokio::select! {
            _ = &mut ctrl_c, if !closing => {
                tracing::warn!(slice = job_key, "Interrupted; closing");
                store.dispatch(Action::close(job_key));
                closing = true;
            }
            event = events.recv() => {
                let event = match event {
                    Ok(event) if event.key.as_str() == job_key => event,
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Event stream lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };

                if event.kind == StoreEventKind::Closed {
                    tracing::info!(slice = job_key, "Closed");
                    break;
                }
                if closing && event.canceling_status == RequestStatus::Failed {
                    let error = store
                        .select(job_key)
                        .and_then(|s| s.canceling_error().cloned());
                    tracing::error!(slice = job_key, job_id = ?event.job_id, ?error, "Cancel failed");
                    anyhow::bail!("could not cancel the running job");
                }
                match event.status {
                    RequestStatus::Loading => {
                        if let Some(progress) = event.progress {
                            tracing::info!(
                                slice = job_key,
                                job_id = ?event.job_id,
                                percent = (progress * 100.0).round() as u32,
                                "Progress",
                            );
                        }
                    }
                    RequestStatus::Succeeded | RequestStatus::Failed if !closing => {
                        if let Some(state) = store.select(job_key) {
                            print_slice(job_key, &state)?;
                        }
                        succeeded = event.status == RequestStatus::Succeeded;
                        store.dispatch(Action::close(job_key));
                        closing = true;
                    }
                    _ => {}
                }
            }
        }
    }

    if succeeded {
        let list = store
            .wait_for(list_key, settled)
            .await
            .with_context(|| format!("store stopped before {list_key} refreshed"))?;
        print_slice(list_key, &list)?;
    }
    Ok(())
}

fn print_slice(key: &str, state: &SliceState) -> anyhow::Result<()> {
    match (state.value(), state.error()) {
        (_, Some(error)) if state.status() == RequestStatus::Failed => {
            tracing::error!(slice = key, error = %error, "Request failed");
        }
        (Some(value), _) => {
            println!("{key}:\n{}", serde_json::to_string_pretty(value)?);
        }
        _ => tracing::warn!(slice = key, status = %state.status(), "No value"),
    }
    Ok(())
}
