// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Diagnostic output of the package readers.

The header and spec readers report low-level oddities (unknown tags, skipped
constructs, unverified digests) to a process-wide sink rather than through the
`log` facade. This mirrors how RPM libraries expose a log file handle that
callers can point elsewhere. By default the sink is stderr.

[SinkGuard] temporarily replaces the sink. The previous sink is restored when
the guard is dropped, which happens on every exit path of the scope holding it.
*/

use {
    once_cell::sync::Lazy,
    std::{
        fmt::{Display, Formatter},
        io::Write,
        sync::{Mutex, MutexGuard},
    },
};

type Sink = Box<dyn Write + Send>;

static SINK: Lazy<Mutex<Sink>> = Lazy::new(|| Mutex::new(Box::new(std::io::stderr())));

fn lock_sink() -> MutexGuard<'static, Sink> {
    // A panic while holding the lock leaves a perfectly usable writer behind.
    SINK.lock().unwrap_or_else(|e| e.into_inner())
}

/// Severity of a diagnostic message.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Level {
    Debug,
    Warning,
    Error,
}

impl Display for Level {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Debug => "debug",
            Self::Warning => "warning",
            Self::Error => "error",
        })
    }
}

/// Write a diagnostic message to the current sink.
///
/// Failures writing to the sink are ignored.
pub fn emit(level: Level, message: impl Display) {
    let mut sink = lock_sink();
    let _ = writeln!(sink, "{}: {}", level, message);
}

/// Scoped replacement of the diagnostic sink.
#[must_use = "the previous sink is restored as soon as the guard is dropped"]
pub struct SinkGuard {
    previous: Option<Sink>,
}

impl SinkGuard {
    /// Send diagnostics to `writer` until the returned guard is dropped.
    pub fn redirect(writer: Sink) -> Self {
        let previous = std::mem::replace(&mut *lock_sink(), writer);

        Self {
            previous: Some(previous),
        }
    }

    /// Discard diagnostics until the returned guard is dropped.
    pub fn null() -> Self {
        Self::redirect(Box::new(std::io::sink()))
    }
}

impl Drop for SinkGuard {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            let mut sink = lock_sink();
            let _ = sink.flush();
            *sink = previous;
        }
    }
}
