//! Animate statistics over consecutive date windows.

use std::sync::Arc;
use std::time::Duration;

use agrowatch::animation::PlaybackState;
use agrowatch::query::{BoundingBox, DateRange, Product, StatsQuery};
use agrowatch::QueryError;
use chrono::Duration as ChronoDuration;
use tokio::sync::mpsc;
use tracing::warn;

use super::common::{product, AreaArgs, BioparArg};
use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the animate command.
pub struct AnimateArgs {
    pub area: AreaArgs,
    pub biopar: Option<BioparArg>,
    pub step_days: u32,
    pub ticks: Option<usize>,
    pub interval_ms: Option<u64>,
}

/// Split `range` into consecutive windows of `step_days`.
pub fn windows(range: DateRange, step_days: u32) -> Result<Vec<DateRange>, CliError> {
    if step_days == 0 {
        return Err(CliError::InvalidArgument(
            "--step-days must be greater than 0".to_string(),
        ));
    }
    let step = ChronoDuration::days(i64::from(step_days));
    let mut frames = Vec::new();
    let mut start = range.start;
    while start <= range.end {
        let end = (start + step - ChronoDuration::days(1)).min(range.end);
        frames.push(DateRange::new(start, end)?);
        start += step;
    }
    Ok(frames)
}

/// Play the timeline, printing the mean for each frame.
///
/// Stops after `ticks` frames (one pass by default), or early when the
/// server fails.
pub fn run(runner: &CliRunner, args: AnimateArgs) -> Result<(), CliError> {
    let (bbox, range) = args.area.parse()?;
    let timeline = windows(range, args.step_days)?;
    let ticks = args.ticks.unwrap_or(timeline.len());
    let interval = args
        .interval_ms
        .map(Duration::from_millis)
        .unwrap_or(runner.session().config().animation_interval);
    let product = product(args.biopar);

    println!(
        "Animating {} frames of {} days every {}ms",
        timeline.len(),
        args.step_days,
        interval.as_millis()
    );

    runner.block_on(async {
        let session = runner.session();
        let controller = session.animation::<DateRange>();
        let (tx, mut rx) = mpsc::unbounded_channel::<usize>();
        let client = Arc::clone(session.client());

        controller.start(
            timeline,
            move |index, frame| {
                let client = Arc::clone(&client);
                let tx = tx.clone();
                async move {
                    let result = frame_mean(&client, product, bbox, frame).await;
                    let _ = tx.send(index);
                    result
                }
            },
            interval,
        );

        let mut shown = 0;
        while shown < ticks {
            tokio::select! {
                Some(_) = rx.recv() => shown += 1,
                _ = tokio::time::sleep(interval * 2) => {
                    if controller.state() == PlaybackState::Stopped {
                        break;
                    }
                }
            }
        }
        controller.stop();

        match controller.last_error() {
            Some(e) => Err(CliError::from(e)),
            None => Ok(()),
        }
    })
}

async fn frame_mean(
    client: &agrowatch::query::QueryClient,
    product: Product,
    bbox: BoundingBox,
    frame: DateRange,
) -> Result<(), QueryError> {
    match client.statistics(&StatsQuery::new(product, bbox, frame)).await {
        Ok(stats) => {
            println!("{}  mean {:.3}", frame, stats.statistics.mean);
            Ok(())
        }
        Err(QueryError::NoData { .. }) => {
            println!("{}  no data", frame);
            Ok(())
        }
        Err(e) => {
            warn!(frame = %frame, error = %e, "Frame failed");
            println!("{}  failed", frame);
            Err(e)
        }
    }
}
