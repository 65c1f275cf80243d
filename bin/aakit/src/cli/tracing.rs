// This file is part of Aakit.
//
// Aakit is free software: you can redistribute it and/or modify it under the
// terms of the GNU Lesser General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version.
//
// Aakit is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with Aakit.
// If not, see https://www.gnu.org/licenses/.

use std::io;

pub use tracing::*;
use tracing::{level_filters::LevelFilter, subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_log::LogTracer;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use super::LogsArgs;

// config logs every key lookup at debug level
const QUIET_TARGETS: &[&str] = &["config=warn"];

/// Install the global subscriber.
///
/// `RUST_LOG` directives win over `default_level`, which each command picks
/// for itself.
pub fn configure_logging(
    config: &LogsArgs,
    default_level: LevelFilter,
) -> anyhow::Result<WorkerGuard> {
    let (appender, guard) = if let Some(log_file) = &config.file {
        tracing_appender::non_blocking(tracing_appender::rolling::never(".", log_file))
    } else {
        tracing_appender::non_blocking(io::stderr())
    };

    let directives = std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_default();
    let subscriber_builder = FmtSubscriber::builder()
        .with_env_filter(env_filter(default_level, &directives)?)
        .with_writer(appender);
    if config.json {
        subscriber::set_global_default(subscriber_builder.json().finish())?;
    } else {
        subscriber::set_global_default(subscriber_builder.compact().finish())?;
    }

    LogTracer::init()?;

    Ok(guard)
}

fn env_filter(default_level: LevelFilter, directives: &str) -> anyhow::Result<EnvFilter> {
    let mut filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .parse(directives)?;
    for target in QUIET_TARGETS {
        filter = filter.add_directive(target.parse()?);
    }
    Ok(filter)
}
