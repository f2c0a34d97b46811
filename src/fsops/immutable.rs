//! Platform-specific immutable-inode-bit primitives.
//!
//! Three variants, selected at compile time: Linux (`FS_IMMUTABLE_FL` via the
//! inode-flags ioctl, through the `e2p-fileflags` crate), BSD/macOS
//! (`SF_IMMUTABLE` via `chflags`), and everything else (`Unsupported`).

use std::path::Path;

use crate::error::{GuardError, Result};
use crate::fsops::ImmutableOutcome;

fn platform_name() -> &'static str {
    std::env::consts::OS
}

pub fn set_immutable(path: &Path, is_root: bool) -> Result<ImmutableOutcome> {
    if !platform_supported() {
        return Err(GuardError::Unsupported {
            feature: "immutable flag".into(),
            platform: platform_name().into(),
        });
    }
    if !is_root {
        return Ok(ImmutableOutcome::SkippedNotRoot);
    }
    imp::set_immutable(path)?;
    Ok(ImmutableOutcome::Applied)
}

pub fn clear_immutable(path: &Path, is_root: bool) -> Result<ImmutableOutcome> {
    if !platform_supported() {
        return Err(GuardError::Unsupported {
            feature: "immutable flag".into(),
            platform: platform_name().into(),
        });
    }
    if !is_root {
        return Ok(ImmutableOutcome::SkippedNotRoot);
    }
    imp::clear_immutable(path)?;
    Ok(ImmutableOutcome::Applied)
}

pub fn is_immutable(path: &Path) -> Result<bool> {
    if !platform_supported() {
        return Err(GuardError::Unsupported {
            feature: "immutable flag".into(),
            platform: platform_name().into(),
        });
    }
    imp::is_immutable(path)
}

#[cfg(target_os = "linux")]
fn platform_supported() -> bool {
    true
}

#[cfg(any(target_os = "macos", target_os = "freebsd", target_os = "openbsd", target_os = "netbsd", target_os = "dragonfly"))]
fn platform_supported() -> bool {
    true
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "macos",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd",
    target_os = "dragonfly"
)))]
fn platform_supported() -> bool {
    false
}

#[cfg(target_os = "linux")]
mod imp {
    use std::fs::OpenOptions;
    use std::os::unix::fs::OpenOptionsExt;
    use std::path::Path;

    use e2p_fileflags::{FileFlags, Flags};

    use crate::error::{GuardError, Result};

    fn open_ro(path: &Path, op: &str) -> Result<std::fs::File> {
        OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)
            .map_err(|e| GuardError::io(op, "open", "", path.display().to_string(), e))
    }

    pub fn set_immutable(path: &Path) -> Result<()> {
        let file = open_ro(path, "set immutable")?;
        let mut flags = file
            .flags()
            .map_err(|e| GuardError::io("set immutable", "get flags", "", path.display().to_string(), e))?;
        flags.insert(Flags::IMMUTABLE_FL);
        file.set_flags(flags)
            .map_err(|e| GuardError::io("set immutable", "set flags", "FS_IMMUTABLE_FL", path.display().to_string(), e))
    }

    pub fn clear_immutable(path: &Path) -> Result<()> {
        let file = open_ro(path, "clear immutable")?;
        let mut flags = file
            .flags()
            .map_err(|e| GuardError::io("clear immutable", "get flags", "", path.display().to_string(), e))?;
        flags.remove(Flags::IMMUTABLE_FL);
        file.set_flags(flags)
            .map_err(|e| GuardError::io("clear immutable", "set flags", "FS_IMMUTABLE_FL", path.display().to_string(), e))
    }

    pub fn is_immutable(path: &Path) -> Result<bool> {
        let file = open_ro(path, "read immutable flag")?;
        let flags = file
            .flags()
            .map_err(|e| GuardError::io("read immutable flag", "get flags", "", path.display().to_string(), e))?;
        Ok(flags.contains(Flags::IMMUTABLE_FL))
    }
}

#[cfg(any(
    target_os = "macos",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd",
    target_os = "dragonfly"
))]
mod imp {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;
    use std::path::Path;

    use crate::error::{GuardError, Result};

    fn cpath(path: &Path) -> Result<CString> {
        CString::new(path.as_os_str().as_bytes())
            .map_err(|e| GuardError::io("immutable flag", "build path", "", path.display().to_string(), e))
    }

    fn current_flags(path: &Path) -> Result<libc::c_uint> {
        unsafe {
            let c = cpath(path)?;
            let mut st: libc::stat = std::mem::zeroed();
            if libc::stat(c.as_ptr(), &mut st) != 0 {
                return Err(GuardError::io(
                    "immutable flag",
                    "stat",
                    "",
                    path.display().to_string(),
                    std::io::Error::last_os_error(),
                ));
            }
            Ok(st.st_flags as libc::c_uint)
        }
    }

    pub fn set_immutable(path: &Path) -> Result<()> {
        let current = current_flags(path)?;
        let c = cpath(path)?;
        let new_flags = current | libc::SF_IMMUTABLE as libc::c_uint;
        let rc = unsafe { libc::chflags(c.as_ptr(), new_flags) };
        if rc != 0 {
            return Err(GuardError::io(
                "set immutable",
                "chflags",
                "SF_IMMUTABLE",
                path.display().to_string(),
                std::io::Error::last_os_error(),
            ));
        }
        Ok(())
    }

    pub fn clear_immutable(path: &Path) -> Result<()> {
        let current = current_flags(path)?;
        let c = cpath(path)?;
        let new_flags = current & !(libc::SF_IMMUTABLE as libc::c_uint);
        let rc = unsafe { libc::chflags(c.as_ptr(), new_flags) };
        if rc != 0 {
            return Err(GuardError::io(
                "clear immutable",
                "chflags",
                "SF_IMMUTABLE",
                path.display().to_string(),
                std::io::Error::last_os_error(),
            ));
        }
        Ok(())
    }

    pub fn is_immutable(path: &Path) -> Result<bool> {
        let current = current_flags(path)?;
        Ok(current & (libc::SF_IMMUTABLE as libc::c_uint) != 0)
    }
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "macos",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd",
    target_os = "dragonfly"
)))]
mod imp {
    use std::path::Path;

    use crate::error::Result;

    pub fn set_immutable(_path: &Path) -> Result<()> {
        unreachable!("gated by platform_supported")
    }

    pub fn clear_immutable(_path: &Path) -> Result<()> {
        unreachable!("gated by platform_supported")
    }

    pub fn is_immutable(_path: &Path) -> Result<bool> {
        unreachable!("gated by platform_supported")
    }
}
