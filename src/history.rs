use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use nix::unistd::Pid;
use tracing::warn;

const SEPARATOR: &str = "----------------------------";

/// One submitted top-level command.
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub command: String,
    /// Primary process; absent when no process was started.
    pub pid: Option<Pid>,
    pub started: SystemTime,
    /// Seconds; set once every stage has terminated.
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryHandle(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recorded {
    Entry(EntryHandle),
    /// Capacity reached; `first_time` is true only for the first refusal.
    Full { first_time: bool },
}

/// Append-only, capacity-capped record of submitted commands.
#[derive(Debug)]
pub struct Ledger {
    entries: Vec<LedgerEntry>,
    capacity: usize,
    overflow_reported: bool,
}

pub type SharedLedger = Arc<Mutex<Ledger>>;

/// Lock the shared ledger. Every operation leaves the ledger consistent,
/// so a poisoned lock is still usable.
pub fn lock(ledger: &SharedLedger) -> MutexGuard<'_, Ledger> {
    ledger.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Ledger {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
            overflow_reported: false,
        }
    }

    pub fn shared(capacity: usize) -> SharedLedger {
        Arc::new(Mutex::new(Self::new(capacity)))
    }

    pub fn record(&mut self, command: &str, started: SystemTime) -> Recorded {
        if self.is_full() {
            let first_time = !self.overflow_reported;
            self.overflow_reported = true;
            if first_time {
                warn!(capacity = self.capacity, "history is full, no longer recording commands");
            }
            return Recorded::Full { first_time };
        }

        self.entries.push(LedgerEntry {
            command: command.to_string(),
            pid: None,
            started,
            duration: None,
        });
        Recorded::Entry(EntryHandle(self.entries.len() - 1))
    }

    pub fn set_pid(&mut self, handle: EntryHandle, pid: Pid) {
        if let Some(entry) = self.entries.get_mut(handle.0) {
            entry.pid = Some(pid);
        }
    }

    /// Close an entry. A clock that stepped backwards yields zero.
    pub fn complete(&mut self, handle: EntryHandle, finished: SystemTime) {
        if let Some(entry) = self.entries.get_mut(handle.0) {
            let elapsed = finished.duration_since(entry.started).unwrap_or_default();
            entry.duration = Some(elapsed.as_secs_f64());
        }
    }

    pub fn get(&self, handle: EntryHandle) -> Option<&LedgerEntry> {
        self.entries.get(handle.0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// 1-based index and command text, in submission order.
    pub fn list_summary(&self) -> Vec<(usize, &str)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i + 1, e.command.as_str()))
            .collect()
    }

    /// 1-based index and the full entry, in submission order.
    pub fn list_full(&self) -> Vec<(usize, &LedgerEntry)> {
        self.entries.iter().enumerate().map(|(i, e)| (i + 1, e)).collect()
    }

    pub fn write_summary<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "Command history:")?;
        for (index, command) in self.list_summary() {
            writeln!(out, "{index}: {command}")?;
        }
        Ok(())
    }

    pub fn write_full<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "Full command history:")?;
        for (_, entry) in self.list_full() {
            let pid = entry
                .pid
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".to_string());
            let started = format_timestamp(entry.started).unwrap_or_else(|| "unknown".to_string());

            writeln!(out, "Command: {}", entry.command)?;
            writeln!(out, "PID: {pid}")?;
            writeln!(out, "Start time: {started}")?;
            match entry.duration {
                Some(secs) => writeln!(out, "Execution time: {secs:.6} seconds")?,
                None => writeln!(out, "Execution time: still running")?,
            }
            writeln!(out, "{SEPARATOR}")?;
        }
        Ok(())
    }
}

/// `YYYY-MM-DD HH:MM:SS` in local time.
pub fn format_timestamp(time: SystemTime) -> Option<String> {
    let secs = time.duration_since(UNIX_EPOCH).ok()?.as_secs();
    let secs = libc::time_t::try_from(secs).ok()?;

    // SAFETY: `tm` is plain data and localtime_r only writes into it.
    let tm = unsafe {
        let mut tm: libc::tm = std::mem::zeroed();
        if libc::localtime_r(&secs, &mut tm).is_null() {
            return None;
        }
        tm
    };

    Some(format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        tm.tm_year + 1900,
        tm.tm_mon + 1,
        tm.tm_mday,
        tm.tm_hour,
        tm.tm_min,
        tm.tm_sec
    ))
}
