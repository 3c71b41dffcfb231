use std::env;

use anyhow::Context;
use eyegaze::{
    config::SessionConfig,
    orchestrator::Phase,
    replay::Recording,
    session::{Session, SessionStatus},
};
use log::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args: Vec<_> = env::args().collect();
    if args.len() != 3 {
        anyhow::bail!("usage: {} <config.json> <recording.json>", args[0]);
    }

    let config = SessionConfig::from_file(&args[1])
        .with_context(|| format!("loading the configuration from {}", args[1]))?;
    let recording = Recording::from_file(&args[2])
        .with_context(|| format!("loading the recording from {}", args[2]))?;

    let session = Session::start(config, recording.into_sources()?)?;
    let mut phases = session.phases();
    let mut predictions = session.predictions();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
            _ = session.source_finished() => break,
            changed = phases.changed() => {
                if changed.is_err() {
                    break;
                }

                let phase = *phases.borrow_and_update();
                if phase == Phase::Aborted {
                    error!("training aborted, rerun the session to collect again");
                    break;
                }
            }
            changed = predictions.changed() => {
                if changed.is_err() {
                    break;
                }

                if let Some(prediction) = *predictions.borrow_and_update() {
                    info!(
                        "gaze at ({:.1}, {:.1})",
                        prediction.point.x, prediction.point.y
                    );
                }
            }
        }
    }

    let SessionStatus {
        phase,
        elapsed_ms,
        round,
        ..
    } = session.status();
    info!("stopping after {elapsed_ms}ms in round {round}, phase {phase}");

    session.stop().await;
    Ok(())
}
