//! `excs watch`: stream connection events and push lines.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;

use excs_core::{Station, StationEvent};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

#[derive(Serialize)]
struct EventRecord {
    at: DateTime<Utc>,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl From<StationEvent> for EventRecord {
    fn from(event: StationEvent) -> Self {
        let (kind, detail) = match event {
            StationEvent::Connected => ("connected", None),
            StationEvent::Disconnected { reason } => ("disconnected", Some(reason)),
            StationEvent::DataPushed(line) => ("push", Some(line)),
        };
        Self {
            at: Utc::now(),
            kind,
            detail,
        }
    }
}

fn render(record: &EventRecord, format: OutputFormat) -> Result<String, CliError> {
    match format {
        // One record per line: YAML falls back to compact JSON.
        OutputFormat::Json | OutputFormat::JsonCompact | OutputFormat::Yaml => output::render_json(record, true),
        OutputFormat::Plain => Ok(record.detail.clone().unwrap_or_else(|| record.kind.to_owned())),
        OutputFormat::Table => Ok(format!(
            "{}  {:<12} {}",
            record.at.format("%H:%M:%S%.3f"),
            record.kind,
            record.detail.as_deref().unwrap_or("")
        )),
    }
}

pub async fn handle(station: &Station, args: WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    // Subscribe before setup so its pushes are shown too.
    let mut events = station.events();
    station.setup().await?;
    output::notice(
        &format!(
            "Watching {} locomotives, {} routes, {} turnouts and {} tracks (Ctrl-C to stop)",
            station.roster().len(),
            station.routes().len(),
            station.turnouts().len(),
            station.tracks().snapshot().len()
        ),
        global.quiet,
    );

    let deadline = args.duration.map(Duration::from_secs);
    let stop = async {
        match deadline {
            Some(limit) => tokio::time::sleep(limit).await,
            None => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    };
    tokio::pin!(stop);

    loop {
        tokio::select! {
            biased;
            () = &mut stop => break,
            event = events.recv() => match event {
                Ok(event) => {
                    let line = render(&EventRecord::from(event), global.output)?;
                    output::print_output(&line, global.quiet);
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event stream lagged");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
    Ok(())
}
