//! Named FIFO pair flavor.
//!
//! The library writes log traffic into the daemon's FIFO at
//! `${pipe_dir}/mct` and creates its own FIFO at
//! `${pipe_dir}/mctpipes/mct<pid>` for daemon-to-library control frames.
//! The library-side FIFO is opened read-write so the open never blocks on
//! a missing writer and reads report `EAGAIN` instead of end-of-file.

use std::ffi::CString;
use std::fs::{self, File, OpenOptions, Permissions};
use std::io::{self, Read, Write};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::PathBuf;

use crate::config::Config;

#[derive(Debug)]
pub(super) struct Endpoint {
    daemon: File,
    user: File,
    user_path: PathBuf,
}

fn mkfifo(path: &PathBuf, mode: libc::mode_t) -> io::Result<()> {
    let raw = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;
    // SAFETY: `raw` is a valid NUL-terminated path for the duration of the
    // call.
    if unsafe { libc::mkfifo(raw.as_ptr(), mode) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

impl Endpoint {
    pub(super) fn connect(config: &Config) -> io::Result<Endpoint> {
        let user_dir = config.pipe_dir.join("mctpipes");
        fs::create_dir_all(&user_dir)?;
        // group-writable with the sticky bit, shared by all logging
        // processes
        let _ = fs::set_permissions(&user_dir, Permissions::from_mode(0o3777));

        let user_path = user_dir.join(format!("mct{}", std::process::id()));
        let _ = fs::remove_file(&user_path);
        mkfifo(&user_path, 0o620)?;
        let _ = fs::set_permissions(&user_path, Permissions::from_mode(0o620));

        let user = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK | libc::O_CLOEXEC)
            .open(&user_path)
            .map_err(|error| {
                let _ = fs::remove_file(&user_path);
                error
            })?;

        // fails with ENXIO while the daemon end has no reader yet; the
        // housekeeper retries on its next tick
        let daemon = OpenOptions::new()
            .write(true)
            .custom_flags(libc::O_NONBLOCK | libc::O_CLOEXEC)
            .open(config.pipe_dir.join("mct"))
            .map_err(|error| {
                let _ = fs::remove_file(&user_path);
                error
            })?;

        Ok(Endpoint {
            daemon,
            user,
            user_path,
        })
    }

    pub(super) fn send_vectored(&mut self, slices: &[io::IoSlice<'_>]) -> io::Result<usize> {
        self.daemon.write_vectored(slices)
    }

    pub(super) fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.user.read(buf)
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.user_path);
    }
}
