//! Family Planner Client - headless sync agent
//!
//! Keeps the dashboard, weather and calendar channels of one household open
//! and logs every state change until interrupted.

use std::rc::Rc;

use anyhow::Context;
use familyplanner_client::{
    logging,
    ws::{Scheduler, TokioScheduler, WsTransportFactory},
    ClientConfig, HouseholdSession,
};
use familyplanner_shared::HouseholdId;
use tokio::task::LocalSet;

fn main() -> anyhow::Result<()> {
    logging::init();

    let config = ClientConfig::from_env()?;
    let household: HouseholdId = std::env::var("FAMILYPLANNER_HOUSEHOLD_ID")
        .context("FAMILYPLANNER_HOUSEHOLD_ID is not set")?
        .parse()
        .context("FAMILYPLANNER_HOUSEHOLD_ID must be a number")?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    LocalSet::new().block_on(&runtime, run(config, household))
}

async fn run(config: ClientConfig, household: HouseholdId) -> anyhow::Result<()> {
    tracing::info!(ws_base = %config.ws_base_url, %household, "starting sync");

    let scheduler: Rc<dyn Scheduler> = Rc::new(TokioScheduler::new());
    let mut session = HouseholdSession::new(&config, scheduler, Rc::new(WsTransportFactory));
    session.switch_household(household);

    let mut revisions = session.store().watch();
    loop {
        tokio::select! {
            changed = revisions.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = session.store().snapshot();
                tracing::info!(
                    connected = session.is_connected(),
                    widgets = state.dashboard.as_ref().map(|d| d.widgets.len()).unwrap_or(0),
                    events = state.events.len(),
                    weather = ?state.weather.as_ref().map(|w| (w.temperature, w.condition.as_str())),
                    "household state updated"
                );
                if let Some(err) = &state.last_error {
                    tracing::warn!("last server error: {err}");
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for ctrl-c")?;
                tracing::info!("shutting down");
                break;
            }
        }
    }

    session.end();
    Ok(())
}
