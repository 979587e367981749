use std::sync::atomic::{AtomicBool, Ordering};

static EXIT_INSTEAD_OF_KILL: AtomicBool = AtomicBool::new(false);

/// Selects the clean-exit termination mode (`--exit-instead-of-kill`).
pub fn set_exit_instead_of_kill(enabled: bool) {
    EXIT_INSTEAD_OF_KILL.store(enabled, Ordering::SeqCst);
}

pub fn exit_instead_of_kill() -> bool {
    EXIT_INSTEAD_OF_KILL.load(Ordering::SeqCst)
}

/// Terminates the process per the configured mode.
///
/// The default sends the process its own SIGTERM; some host runtimes only
/// release FIFO peers reliably on signal death, so both modes exist. The
/// plain exit after the signal covers a blocked or ignored SIGTERM.
pub fn terminate(code: i32) -> ! {
    if !exit_instead_of_kill() {
        unsafe {
            libc::kill(libc::getpid(), libc::SIGTERM);
        }
    }
    std::process::exit(code)
}
