use simplelog::{ColorChoice, CombinedLogger, Config, LevelFilter, TermLogger, TerminalMode};
use std::sync::atomic::{AtomicBool, Ordering};

pub mod chunks;
pub mod classify;
pub mod config;
pub mod error;
pub mod io;
pub mod mate;
pub mod segments;
pub mod store;
pub mod transitive;
pub mod unitigger;

/// Initialises the terminal logger. Later calls only log a warning.
pub fn initialise_logging(log_level: LevelFilter) {
    if let Err(error) = CombinedLogger::init(vec![TermLogger::new(
        log_level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )]) {
        warn!("Logging was already initialised: {error}");
        return;
    }

    info!("Logging initialised successfully");
}

/// Logs the resident memory of the process after the given phase, if the platform reports it.
pub fn log_memory_usage(phase: &str) {
    if let Some(usage) = memory_stats::memory_stats() {
        let physical_mib = usage.physical_mem / (1024 * 1024);
        let virtual_mib = usage.virtual_mem / (1024 * 1024);
        info!("Memory after {phase}: {physical_mib}MiB physical, {virtual_mib}MiB virtual");
    }
}

/// A vector of flags that worker threads set concurrently without synchronisation.
pub struct RelaxedAtomicBoolVec {
    map: Vec<AtomicBool>,
}

impl RelaxedAtomicBoolVec {
    pub fn new(len: usize) -> Self {
        Self {
            map: std::iter::repeat(false).map(Into::into).take(len).collect(),
        }
    }

    pub fn set(&self, index: usize, value: bool) {
        self.map[index].store(value, Ordering::Relaxed);
    }

    pub fn reinitialise(&mut self, len: usize) {
        self.map.clear();
        self.map
            .extend(std::iter::repeat(false).map(Into::into).take(len));
    }

    pub fn iter(&self) -> impl '_ + Iterator<Item = bool> {
        self.map.iter().map(|b| b.load(Ordering::Relaxed))
    }
}
