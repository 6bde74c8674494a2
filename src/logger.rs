/*
 * This file is part of displaytopo.
 *
 * Copyright (C) 2025 displaytopo contributors
 *
 * displaytopo is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * displaytopo is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with displaytopo. If not, see <https://www.gnu.org/licenses/>.
 */

//! Diagnostics output
//!
//! Two sinks: `tracing` for human-readable diagnostics (installed by the host
//! through `init_logging`), and an optional JSON-lines audit journal with one
//! record per topology apply.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use lazy_static::lazy_static;
use serde_json::{json, Value};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::error::Result;

lazy_static! {
    static ref JOURNAL: Mutex<Option<File>> = Mutex::new(None);
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

/// Install a fmt subscriber honoring `RUST_LOG`, else `default_filter`
///
/// Returns false when a global subscriber was already installed.
pub fn init_logging(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(filter)
        .try_init()
        .is_ok()
}

/// Start appending audit records to `path`
pub fn open_journal(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    if let Ok(mut guard) = JOURNAL.lock() {
        *guard = Some(file);
    }
    Ok(())
}

/// Stop writing audit records
pub fn close_journal() {
    if let Ok(mut guard) = JOURNAL.lock() {
        *guard = None;
    }
}

pub fn journal_is_open() -> bool {
    JOURNAL.lock().map(|g| g.is_some()).unwrap_or(false)
}

/// Append one audit record; without an open journal the record goes to tracing only
pub fn log_event(event: &str, data: Value) {
    let line = json!({
        "ts_ms": now_millis(),
        "event": event,
        "data": data,
    })
    .to_string();

    if let Ok(mut guard) = JOURNAL.lock() {
        if let Some(f) = guard.as_mut() {
            let _ = writeln!(f, "{}", line);
            return;
        }
    }
    debug!(event, record = %line, "Audit journal not open");
}
