use std::fs;

use crate::{PlatformError, ProcessInfo};

/// Scans `/proc` for live processes. Per-process read failures (the process
/// exited mid-scan, or we lack permission to read its status) are skipped
/// rather than failing the whole enumeration -- the same tolerance the
/// teacher's zombie reaper applies to individual `waitpid` results.
pub fn enumerate_processes() -> Result<Vec<ProcessInfo>, PlatformError> {
    let entries = fs::read_dir("/proc").map_err(PlatformError::Enumerate)?;

    let mut processes = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        let file_name = entry.file_name();
        let pid: u32 = match file_name.to_str().and_then(|s| s.parse().ok()) {
            Some(pid) => pid,
            None => continue,
        };
        if let Some(info) = read_process(pid) {
            processes.push(info);
        }
    }
    Ok(processes)
}

fn read_process(pid: u32) -> Option<ProcessInfo> {
    let status = fs::read_to_string(format!("/proc/{pid}/status")).ok()?;

    let mut ppid = None;
    let mut uid = None;
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("PPid:") {
            ppid = rest.trim().parse().ok();
        } else if let Some(rest) = line.strip_prefix("Uid:") {
            uid = rest.split_whitespace().next().and_then(|s| s.parse().ok());
        }
    }

    let exe_name = process_name(pid, &status)?;

    Some(ProcessInfo {
        pid,
        ppid: ppid?,
        uid: uid?,
        exe_name,
    })
}

fn process_name(pid: u32, status: &str) -> Option<String> {
    // Prefer the full executable path from /proc/<pid>/exe (matches what a
    // user would launch the backend as); fall back to the short comm name
    // from /proc/<pid>/status for kernel threads and races where the link
    // has already gone stale.
    if let Ok(target) = std::fs::read_link(format!("/proc/{pid}/exe")) {
        if let Some(name) = target.file_name().and_then(|n| n.to_str()) {
            return Some(name.to_string());
        }
    }

    status
        .lines()
        .find_map(|line| line.strip_prefix("Name:"))
        .map(|s| s.trim().to_string())
}
