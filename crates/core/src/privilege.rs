use crate::error::{ReclaimError, Result};

/// Effective user id of the current process, where the platform has one.
#[cfg(unix)]
pub fn effective_uid() -> Option<u32> {
    // SAFETY: geteuid has no preconditions and cannot fail.
    Some(unsafe { libc::geteuid() })
}

#[cfg(not(unix))]
pub fn effective_uid() -> Option<u32> {
    None
}

/// Clearing other accounts' caches needs root. Platforms without uids pass.
pub fn ensure_privileged() -> Result<()> {
    match effective_uid() {
        Some(0) | None => Ok(()),
        Some(euid) => Err(ReclaimError::InsufficientPrivilege { euid }),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::{effective_uid, ensure_privileged};

    #[test]
    fn privilege_check_agrees_with_uid() {
        let euid = effective_uid().expect("unix has uids");
        assert_eq!(ensure_privileged().is_ok(), euid == 0);
    }
}
