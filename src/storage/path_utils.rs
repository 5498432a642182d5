//! State-directory layout. Everything the daemon persists lives under a
//! single root so the whole state can be copied or wiped as one unit.

use std::io;
use std::path::{Path, PathBuf};

pub fn ensure_state_dir(state_path: &Path) -> io::Result<()> {
    std::fs::create_dir_all(state_path)
}

pub fn inbox_journal(state_path: &Path) -> PathBuf {
    state_path.join("inbox.ndjson")
}

pub fn inbox_snapshot(state_path: &Path) -> PathBuf {
    state_path.join("inbox_index.json")
}

pub fn outbox_journal(state_path: &Path) -> PathBuf {
    state_path.join("outbox.ndjson")
}

pub fn outbox_snapshot(state_path: &Path) -> PathBuf {
    state_path.join("outbox_index.json")
}

pub fn percepts_snapshot(state_path: &Path) -> PathBuf {
    state_path.join("percepts.json")
}

pub fn threads_snapshot(state_path: &Path) -> PathBuf {
    state_path.join("threads.json")
}

pub fn traces_snapshot(state_path: &Path) -> PathBuf {
    state_path.join("traces.json")
}

pub fn budget_file(state_path: &Path) -> PathBuf {
    state_path.join("budget.json")
}

pub fn seed_file(state_path: &Path) -> PathBuf {
    state_path.join("core_seed.md")
}
