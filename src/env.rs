use std::env;
use std::ffi::OsString;

/// Minimum search path installed when no explicit `PATH` is configured.
pub const DEFAULT_PATH: &str = "/usr/bin:/bin:/usr/sbin:/sbin";

/// Replaces the inherited environment with `allowed`, in order.
///
/// Every inherited variable is removed first, then the allowed pairs are
/// installed one by one. Callers must not have spawned threads yet; the
/// daemonization entry point documents the same requirement.
pub fn sanitize_environment(allowed: &[(String, String)]) {
    let inherited: Vec<OsString> = env::vars_os().map(|(key, _)| key).collect();
    for key in inherited {
        // SAFETY: single-threaded at this point, nothing else reads environ.
        unsafe { env::remove_var(&key) };
    }
    for (key, value) in allowed {
        // SAFETY: as above.
        unsafe { env::set_var(key, value) };
    }
}

// Replacement semantics are covered in tests/environment.rs: mutating the
// process-global environment cannot run inside the threaded unit harness.
