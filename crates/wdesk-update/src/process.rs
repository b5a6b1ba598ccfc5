use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use log::info;

/// Locates the executable of the running process.
pub trait ExecutableResolver: Send + Sync {
    /// Canonical path of the running executable with symlinks resolved.
    fn current_executable(&self) -> io::Result<PathBuf>;
}

/// Replaces the running process with a fresh one.
pub trait ProcessSpawner: Send + Sync {
    /// Start `executable` with this process's arguments, environment, working
    /// directory and standard streams.
    fn spawn(&self, executable: &Path) -> io::Result<()>;

    /// End the current process after a successful hand-off.
    fn exit(&self);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct OsExecutable;

impl ExecutableResolver for OsExecutable {
    fn current_executable(&self) -> io::Result<PathBuf> {
        let exe = std::env::current_exe()?;

        // /proc/self/exe keeps pointing at the replaced inode once the file
        // has been swapped out.
        #[cfg(target_os = "linux")]
        let exe = {
            let path_str = exe.to_string_lossy();
            match path_str.strip_suffix(" (deleted)") {
                Some(live) => PathBuf::from(live),
                None => exe,
            }
        };

        std::fs::canonicalize(exe)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct OsProcess;

impl ProcessSpawner for OsProcess {
    fn spawn(&self, executable: &Path) -> io::Result<()> {
        let mut args = std::env::args_os();
        let argv0 = args.next();

        let mut command = Command::new(executable);
        command
            .args(args)
            .envs(std::env::vars_os())
            .current_dir(std::env::current_dir()?)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        #[cfg(unix)]
        if let Some(argv0) = argv0 {
            use std::os::unix::process::CommandExt;
            command.arg0(argv0);
        }
        #[cfg(not(unix))]
        let _ = argv0;

        info!("Restarting from: {}", executable.display());
        command.spawn()?;
        Ok(())
    }

    fn exit(&self) {
        std::process::exit(0);
    }
}

#[cfg(test)]
mod tests {
    use super::{ExecutableResolver, OsExecutable};

    #[test]
    fn resolves_running_test_binary() {
        let exe = OsExecutable
            .current_executable()
            .expect("test binary path should resolve");

        assert!(exe.is_absolute());
        assert!(exe.is_file());
        assert_eq!(
            std::fs::canonicalize(&exe).expect("path should canonicalize"),
            exe
        );
    }
}
