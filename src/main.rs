use flexi_logger::{FileSpec, Logger};
use log::{error, info};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use spectral_cohorts::{param, run};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let param_file = std::env::args().nth(1).unwrap_or_else(|| "param.yaml".to_string());
    let param = param::get(param_file)?;

    let logger = Logger::try_with_str(&param.general.log_level)?;
    let _logger_handle = if param.general.log_base.is_empty() {
        logger.format_for_stderr(flexi_logger::colored_default_format).start()?
    } else {
        logger
            .log_to_file(FileSpec::default().basename(&param.general.log_base).suffix(&param.general.log_suffix))
            .format_for_files(flexi_logger::detailed_format)
            .start()?
    };

    info!("spectral-cohorts {}", spectral_cohorts::sweep::version());

    let running = Arc::new(AtomicBool::new(true));
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    let flag = Arc::clone(&running);
    thread::spawn(move || {
        if let Some(signal) = signals.forever().next() {
            info!("Received signal {}, finishing the current K...", signal);
            flag.store(false, Ordering::Relaxed);
        }
    });

    let report = match run(&param, running) {
        Ok(report) => report,
        Err(e) => {
            error!("{}", e);
            return Err(e.into());
        }
    };
    report.write(param.sweep.output, &param.sweep.output_path, param.general.display_colorful)?;

    Ok(())
}
