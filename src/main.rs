use cpdp::experiment::engine_version;
use cpdp::param::{self, Param};
use cpdp::run_all;
use flexi_logger::{Duplicate, FileSpec, Logger};
use log::{error, info};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Config files given on the command line; a directory stands for every YAML file it holds
fn config_files(args: &[String]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for arg in args {
        let path = Path::new(arg);
        if path.is_dir() {
            let mut entries: Vec<PathBuf> = std::fs::read_dir(path)
                .map(|rd| rd.filter_map(|e| e.ok().map(|e| e.path())).collect())
                .unwrap_or_default();
            entries.retain(|p| matches!(p.extension().and_then(|e| e.to_str()), Some("yaml") | Some("yml")));
            entries.sort();
            files.extend(entries);
        } else {
            files.push(path.to_path_buf());
        }
    }
    files
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let args = if args.is_empty() { vec!["param.yaml".to_string()] } else { args };

    let mut params: Vec<Param> = Vec::new();
    let mut config_failed = false;
    for file in config_files(&args) {
        match param::get(&file.to_string_lossy()) {
            Ok(p) => params.push(p),
            Err(e) => {
                eprintln!("Cannot load {}: {}", file.display(), e);
                config_failed = true;
            }
        }
    }

    // Logging follows the first configuration
    let general = params.first().map(|p| p.general.clone()).unwrap_or_default();
    let logger = Logger::try_with_env_or_str(&general.log_level);
    let logger = match logger {
        Ok(logger) if !general.log_base.is_empty() => logger
            .log_to_file(FileSpec::default().basename(&general.log_base).suffix(&general.log_suffix))
            .duplicate_to_stderr(Duplicate::All)
            .start(),
        Ok(logger) => logger.start(),
        Err(e) => Err(e),
    };
    let _logger = match logger {
        Ok(handle) => Some(handle),
        Err(e) => {
            eprintln!("Cannot initialize the logger: {}", e);
            None
        }
    };

    info!("cpdp {}", engine_version());

    let stop = Arc::new(AtomicBool::new(false));
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        if let Err(e) = signal_hook::flag::register(signal, Arc::clone(&stop)) {
            error!("Cannot register signal handler: {}", e);
        }
    }

    let thread_number = params.iter().map(|p| p.general.thread_number).max().unwrap_or(1);
    let results = run_all(&params, thread_number, stop);

    let failed = results.iter().filter(|r| r.is_err()).count();
    for summary in results.iter().flatten() {
        info!("[{}] {} evaluations, {} rows written, {} failures",
            summary.name, summary.evaluations, summary.rows_written, summary.failures.len());
    }

    if config_failed || failed > 0 {
        error!("{} experiment(s) failed", failed);
        process::exit(1);
    }
}
