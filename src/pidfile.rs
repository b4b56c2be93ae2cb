use std::fs::OpenOptions;
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::process;

/// Records the calling process's pid at `path` as one decimal line.
///
/// The file is created or truncated with mode 0644. Nothing removes it on
/// shutdown; instance exclusion rests on the advisory lock, not on recorded
/// pids, so a stale file is harmless.
pub fn write_pid_file(path: &Path) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o644)
        .open(path)?;
    file.write_all(format!("{}\n", process::id()).as_bytes())
}

/// Parses a pid file written by [`write_pid_file`].
pub fn read_pid_file(path: &Path) -> io::Result<u32> {
    let text = std::fs::read_to_string(path)?;
    text.trim_end().parse().map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("malformed pid file {}", path.display()),
        )
    })
}
