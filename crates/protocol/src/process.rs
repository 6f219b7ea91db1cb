//! Process liveness probing.

use sysinfo::{Pid, ProcessesToUpdate, System};

/// Whether a process with `pid` currently exists.
///
/// Uses `kill -0` where available and falls back to a process-table query.
pub fn is_process_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        match std::process::Command::new("kill")
            .args(["-0", &pid.to_string()])
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
        {
            Ok(status) => return status.success(),
            Err(e) => tracing::debug!(error = %e, "kill unavailable, querying process table"),
        }
    }
    process_table_has(pid)
}

fn process_table_has(pid: u32) -> bool {
    let pid = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    system.process(pid).is_some()
}
