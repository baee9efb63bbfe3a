use std::process::{Child, Command as ProcessCommand, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use url::Url;

#[cfg(unix)]
use std::os::unix::process::CommandExt;

/// Where an embed URL gets mounted. The session only talks to players through this.
pub(crate) trait PlayerHost {
    type Handle;

    fn mount(&mut self, url: &Url) -> Result<Self::Handle>;

    /// Releases the player and everything it started. Must not fail.
    fn unmount(&mut self, handle: Self::Handle);

    /// Current location of the mounted player, `None` when the host cannot see it.
    fn location(&mut self, handle: &mut Self::Handle) -> Option<String>;

    /// Whether the mounted player is still running.
    fn is_active(&mut self, _handle: &mut Self::Handle) -> bool {
        true
    }
}

#[derive(Debug)]
pub(crate) struct PlayerProcess {
    child: Child,
    #[cfg(unix)]
    pgid: libc::pid_t,
}

/// Launches an external player command (browser, kiosk window, ...) with the
/// embed URL as its last argument, in a process group of its own.
#[derive(Debug, Clone)]
pub(crate) struct ProcessHost {
    program: String,
    args: Vec<String>,
    grace: Duration,
}

impl ProcessHost {
    pub(crate) fn from_command_line(command_line: &str) -> Result<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| anyhow!("player command is empty"))?;
        Ok(Self {
            program,
            args: parts.collect(),
            grace: Duration::from_millis(1500),
        })
    }

    fn command(&self, url: &Url) -> ProcessCommand {
        let mut cmd = ProcessCommand::new(&self.program);
        cmd.args(&self.args)
            .arg(url.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(|| {
                if libc::setpgid(0, 0) != 0 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
        cmd
    }
}

impl PlayerHost for ProcessHost {
    type Handle = PlayerProcess;

    fn mount(&mut self, url: &Url) -> Result<PlayerProcess> {
        let child = self
            .command(url)
            .spawn()
            .with_context(|| format!("failed to launch player '{}'", self.program))?;
        tracing::debug!(pid = child.id(), program = %self.program, "player mounted");
        Ok(PlayerProcess {
            #[cfg(unix)]
            pgid: child.id() as libc::pid_t,
            child,
        })
    }

    fn unmount(&mut self, mut handle: PlayerProcess) {
        if matches!(handle.child.try_wait(), Ok(Some(_))) {
            #[cfg(unix)]
            signal_group(handle.pgid, libc::SIGTERM);
            return;
        }

        #[cfg(unix)]
        signal_group(handle.pgid, libc::SIGTERM);
        #[cfg(not(unix))]
        let _ = handle.child.kill();

        let deadline = Instant::now() + self.grace;
        while Instant::now() < deadline {
            if matches!(handle.child.try_wait(), Ok(Some(_))) {
                tracing::debug!("player unmounted");
                return;
            }
            thread::sleep(Duration::from_millis(50));
        }

        #[cfg(unix)]
        signal_group(handle.pgid, libc::SIGKILL);
        let _ = handle.child.kill();
        let _ = handle.child.wait();
        tracing::debug!("player killed after grace period");
    }

    fn location(&mut self, _handle: &mut PlayerProcess) -> Option<String> {
        // A separate process never exposes its navigation state.
        None
    }

    fn is_active(&mut self, handle: &mut PlayerProcess) -> bool {
        matches!(handle.child.try_wait(), Ok(None))
    }
}

#[cfg(unix)]
fn signal_group(pgid: libc::pid_t, signal: libc::c_int) {
    // The launcher (e.g. xdg-open) may already be gone while its browser lives on
    // in the same group, so the group is signalled regardless.
    unsafe {
        let _ = libc::killpg(pgid, signal);
    }
}

pub(crate) fn default_player_command() -> &'static str {
    if cfg!(target_os = "macos") {
        "open"
    } else if cfg!(windows) {
        "explorer"
    } else {
        "xdg-open"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_splits_program_and_args() {
        let host = ProcessHost::from_command_line("firefox --new-window").expect("parse");
        assert_eq!(host.program, "firefox");
        assert_eq!(host.args, vec!["--new-window".to_string()]);
    }

    #[test]
    fn empty_command_line_is_rejected() {
        assert!(ProcessHost::from_command_line("   ").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn unmount_terminates_running_player() {
        let mut host = ProcessHost::from_command_line("sleep").expect("parse");
        let mut cmd = ProcessCommand::new("sleep");
        cmd.arg("30");
        unsafe {
            cmd.pre_exec(|| {
                libc::setpgid(0, 0);
                Ok(())
            });
        }
        let child = cmd.spawn().expect("spawn sleep");
        let mut handle = PlayerProcess {
            pgid: child.id() as libc::pid_t,
            child,
        };
        assert!(host.is_active(&mut handle));
        let started = Instant::now();
        host.unmount(handle);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
