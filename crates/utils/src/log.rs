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

//! Log-then-wrap helpers for results and options

use std::fmt::{Debug, Display};

use anyhow::Context;
use tracing::Level;

/// Log a failure and convert it into an [`anyhow::Error`] carrying `context`
pub trait LogWithContext<T> {
    /// Log the failure with `context` and wrap it
    fn log_context<C>(self, context: C) -> anyhow::Result<T>
    where
        C: Display + Send + Sync + 'static;

    /// Same as [`LogWithContext::log_context`] but only builds the context on failure
    fn log_with_context<C, F>(self, context: F) -> anyhow::Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

/// Log a failure while keeping the original error type
pub trait LogOnError {
    /// Log at error level
    fn log_on_error<C: Display>(self, context: C) -> Self;

    /// Log at `level`
    fn log_on_error_level<C: Display>(self, level: Level, context: C) -> Self;
}

impl<T, E> LogWithContext<T> for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn log_context<C>(self, context: C) -> anyhow::Result<T>
    where
        C: Display + Send + Sync + 'static,
    {
        self.log_with_context(|| context)
    }

    fn log_with_context<C, F>(self, context: F) -> anyhow::Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.or_else(|error| {
            let context = context();
            tracing::error!("{context}: {error}");
            Err(error).context(context)
        })
    }
}

impl<T> LogWithContext<T> for Option<T> {
    fn log_context<C>(self, context: C) -> anyhow::Result<T>
    where
        C: Display + Send + Sync + 'static,
    {
        self.log_with_context(|| context)
    }

    fn log_with_context<C, F>(self, context: F) -> anyhow::Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        match self {
            Some(value) => Ok(value),
            None => {
                let context = context();
                tracing::error!("{context}");
                Err(anyhow::anyhow!("{context}"))
            }
        }
    }
}

impl<T, E: Debug> LogOnError for Result<T, E> {
    fn log_on_error<C: Display>(self, context: C) -> Self {
        self.log_on_error_level(Level::ERROR, context)
    }

    fn log_on_error_level<C: Display>(self, level: Level, context: C) -> Self {
        if let Err(error) = &self {
            log_at_level(level, format_args!("{context}: {error:?}"));
        }
        self
    }
}

fn log_at_level(level: Level, message: std::fmt::Arguments<'_>) {
    match level {
        Level::ERROR => tracing::error!("{message}"),
        Level::WARN => tracing::warn!("{message}"),
        Level::INFO => tracing::info!("{message}"),
        Level::DEBUG => tracing::debug!("{message}"),
        Level::TRACE => tracing::trace!("{message}"),
    }
}
