//! `mlock` status reporting and core dump disabling.

use keyward_crypto_core::memory::{disable_core_dumps, SecretBuffer};

#[cfg(unix)]
#[test]
fn secret_buffer_reports_mlock_status() {
    let buf = SecretBuffer::new(b"mlock test data").expect("allocation should succeed");
    // mlock can legitimately fail under a low RLIMIT_MEMLOCK; only the
    // reported status and the data are checked.
    let _ = buf.is_mlocked();
    assert_eq!(buf.expose(), b"mlock test data");
}

#[cfg(unix)]
#[test]
fn disable_core_dumps_sets_rlimit_zero() {
    disable_core_dumps().expect("disable_core_dumps should succeed");

    let mut limit = libc::rlimit {
        rlim_cur: 1,
        rlim_max: 1,
    };
    // SAFETY: valid out-pointer.
    let ret = unsafe { libc::getrlimit(libc::RLIMIT_CORE, &raw mut limit) };
    assert_eq!(ret, 0, "getrlimit failed");
    assert_eq!(limit.rlim_cur, 0, "RLIMIT_CORE soft limit should be 0");
    assert_eq!(limit.rlim_max, 0, "RLIMIT_CORE hard limit should be 0");
}

#[cfg(not(unix))]
#[test]
fn disable_core_dumps_is_noop_elsewhere() {
    assert!(disable_core_dumps().is_ok());
}
