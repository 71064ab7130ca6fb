//! `excs info`: identify the command station.

use serde::Serialize;

use excs_core::{MIN_SUPPORTED_VERSION, Station, SystemInfo, Version};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

#[derive(Serialize)]
struct InfoView<'a> {
    #[serde(flatten)]
    info: &'a SystemInfo,
    supported: bool,
}

fn detail(view: &InfoView<'_>) -> String {
    let info = view.info;
    let support = if view.supported {
        "yes".to_owned()
    } else {
        format!("no (needs {})", Version::from(MIN_SUPPORTED_VERSION))
    };
    [
        format!("Firmware:         {}", info.version),
        format!("Processor:        {}", info.processor),
        format!("Motor controller: {}", info.motor_controller),
        format!("Build:            {}", info.build),
        format!("Supported:        {support}"),
    ]
    .join("\n")
}

pub async fn handle(station: &Station, global: &GlobalOpts) -> Result<(), CliError> {
    station.connect().await?;
    let info = station.fetch_system_info().await?;

    let view = InfoView {
        info: &info,
        supported: info.version.is_supported(),
    };
    let out = output::render_single(global.output, &view, detail, |v| v.info.version.to_string())?;
    output::print_output(&out, global.quiet);

    if !view.supported {
        output::notice(
            "warning: this firmware is older than the bridge supports; other commands will refuse it",
            global.quiet,
        );
    }
    Ok(())
}
