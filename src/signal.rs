use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

static CANCEL_REQUESTED: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_sigint(_: libc::c_int) {
    CANCEL_REQUESTED.store(true, Ordering::Relaxed);
}

/// Install a SIGINT handler that requests cancellation instead of killing the
/// process. A rule run checks the flag between emails.
pub fn install_interrupt_handler() -> io::Result<()> {
    let rc = unsafe {
        let mut sa: libc::sigaction = std::mem::zeroed();
        sa.sa_sigaction = handle_sigint as libc::sighandler_t;
        libc::sigemptyset(&mut sa.sa_mask);
        sa.sa_flags = 0;
        libc::sigaction(libc::SIGINT, &sa, std::ptr::null_mut())
    };
    if rc == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

pub fn cancel_flag() -> &'static AtomicBool {
    &CANCEL_REQUESTED
}
