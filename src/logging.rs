//! Log format and initialization, ported from the teacher's
//! `test.rs::configure_log`: `tracing` macros throughout the crate, emitted
//! through `env_logger`'s `log`-compatibility backend (no `tracing-subscriber`
//! in the dependency tree), colorized by level via `colored`, with a
//! module-path-aware format string. Initialized at most once per process via
//! `std::sync::Once`, since both the synchronous `setup()` entry point and
//! any test binary that also calls it directly must not panic on a double
//! `env_logger::init`.
use std::io::Write;
use std::sync::Once;

use colored::Colorize;
use log::Level;

static INIT: Once = Once::new();

pub fn configure() {
    INIT.call_once(|| {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .format(|buf, record| {
                let level = match record.level() {
                    Level::Error => record.level().to_string().red(),
                    Level::Warn => record.level().to_string().yellow(),
                    Level::Info => record.level().to_string().green(),
                    Level::Debug => record.level().to_string().blue(),
                    Level::Trace => record.level().to_string().purple(),
                };
                writeln!(
                    buf,
                    "[{} {level} {}] {}",
                    chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                    record.target(),
                    record.args()
                )
            })
            .filter_module("sea_orm", log::LevelFilter::Warn)
            .filter_module("sqlx", log::LevelFilter::Warn)
            .filter_module("testcontainers", log::LevelFilter::Info)
            .filter_module("reqwest", log::LevelFilter::Warn)
            .init();
    });
}
