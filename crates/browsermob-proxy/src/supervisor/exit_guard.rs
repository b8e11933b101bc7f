//! Process-exit safety net for spawned engines.
//!
//! Each running engine gets an entry in an [`ExitGuardRegistry`], tagged with
//! the [`OwnerToken`] of the process that spawned it. When the owning process
//! exits, entries carrying its token are terminated. A forked child inherits the
//! registry but has a different token, so it never stops its parent's engines.
//!
//! The global registry is run on normal exit (an `atexit` hook) and when the
//! process receives SIGINT, SIGTERM or SIGHUP. In the signal case the owned
//! engines are stopped and the signal is then re-raised with its default
//! disposition, so the process still dies of it. An application that handles
//! those signals itself holds a [`SignalDeferral`] for as long as it does.
//!
//! An entry is removed exactly once: by `Supervisor::stop` or a failed start
//! (disarm), by dropping the supervisor (fire), or by the exit and signal
//! hooks (trigger).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

/// Grace period between SIGTERM and SIGKILL during exit-time cleanup
pub const EXIT_GRACE: Duration = Duration::from_secs(3);

const LOCK_WAIT: Duration = Duration::from_millis(500);

static GLOBAL: Lazy<Arc<ExitGuardRegistry>> = Lazy::new(|| {
    install_exit_hook();
    install_signal_watcher();
    Arc::new(ExitGuardRegistry::default())
});

static DEFERRALS: AtomicUsize = AtomicUsize::new(0);

/// While any deferral is alive, SIGINT, SIGTERM and SIGHUP are left to the
/// application, which is then expected to stop its engines and exit.
#[derive(Debug)]
#[must_use = "signals are only deferred while the handle is held"]
pub struct SignalDeferral(());

impl SignalDeferral {
    pub fn new() -> Self {
        DEFERRALS.fetch_add(1, Ordering::SeqCst);
        SignalDeferral(())
    }

    pub fn is_active() -> bool {
        DEFERRALS.load(Ordering::SeqCst) > 0
    }
}

impl Default for SignalDeferral {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SignalDeferral {
    fn drop(&mut self) {
        DEFERRALS.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Identity of the OS process that registered a guard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerToken(u32);

impl OwnerToken {
    pub fn current() -> Self {
        OwnerToken(std::process::id())
    }

    pub fn from_pid(pid: u32) -> Self {
        OwnerToken(pid)
    }
}

#[derive(Debug, Clone, Copy)]
struct GuardEntry {
    owner: OwnerToken,
    pid: u32,
}

#[derive(Debug, Default)]
pub struct ExitGuardRegistry {
    entries: Mutex<HashMap<u64, GuardEntry>>,
    next_id: AtomicU64,
}

impl ExitGuardRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The registry run by the process exit hook
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL)
    }

    /// Guard the engine `pid` on behalf of the current process
    pub fn register(self: &Arc<Self>, pid: u32) -> ExitGuard {
        self.register_as(OwnerToken::current(), pid)
    }

    pub fn register_as(self: &Arc<Self>, owner: OwnerToken, pid: u32) -> ExitGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().insert(id, GuardEntry { owner, pid });
        ExitGuard {
            id,
            pid,
            registry: Arc::clone(self),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&self, id: u64) -> Option<GuardEntry> {
        self.entries.lock().remove(&id)
    }

    /// Send SIGTERM to every engine registered by `owner` and forget them.
    /// Entries of other owners are left untouched. Returns the signalled pids.
    pub fn trigger(&self, owner: OwnerToken) -> Vec<u32> {
        let Some(mut entries) = self.entries.try_lock_for(LOCK_WAIT) else {
            return Vec::new();
        };
        let ids: Vec<u64> = entries
            .iter()
            .filter(|(_, e)| e.owner == owner)
            .map(|(id, _)| *id)
            .collect();
        let pids: Vec<u32> = ids
            .into_iter()
            .filter_map(|id| entries.remove(&id))
            .map(|e| e.pid)
            .collect();
        drop(entries);

        for pid in &pids {
            signal_terminate(*pid);
        }
        pids
    }
}

/// Registration handle held by a running supervisor
#[derive(Debug)]
pub struct ExitGuard {
    id: u64,
    pid: u32,
    registry: Arc<ExitGuardRegistry>,
}

impl ExitGuard {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn is_armed(&self) -> bool {
        self.registry.entries.lock().contains_key(&self.id)
    }

    /// Forget the engine without signalling it (it was stopped normally)
    pub fn disarm(self) {
        self.registry.remove(self.id);
    }

    /// Signal the engine now, if the entry was still registered
    pub fn fire(self) -> bool {
        match self.registry.remove(self.id) {
            Some(entry) => {
                signal_terminate(entry.pid);
                true
            }
            None => false,
        }
    }
}

#[cfg(unix)]
fn install_exit_hook() {
    extern "C" fn run_exit_guards() {
        let pids = GLOBAL.trigger(OwnerToken::current());
        reap(&pids, EXIT_GRACE);
    }

    // SAFETY: registers a plain `extern "C"` function with no captured state.
    unsafe {
        libc::atexit(run_exit_guards);
    }
}

#[cfg(not(unix))]
fn install_exit_hook() {}

/// Watch for terminating signals on a dedicated thread with its own runtime
#[cfg(unix)]
fn install_signal_watcher() {
    let spawned = std::thread::Builder::new()
        .name("browsermob-exit-signals".to_string())
        .spawn(|| {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    warn!("Exit guards will not run on signals: {}", e);
                    return;
                }
            };
            if let Err(e) = runtime.block_on(watch_signals()) {
                warn!("Exit guards will not run on signals: {}", e);
            }
        });
    if let Err(e) = spawned {
        warn!("Exit guards will not run on signals: {}", e);
    }
}

#[cfg(not(unix))]
fn install_signal_watcher() {}

#[cfg(unix)]
async fn watch_signals() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;

    loop {
        let signo = tokio::select! {
            _ = interrupt.recv() => libc::SIGINT,
            _ = terminate.recv() => libc::SIGTERM,
            _ = hangup.recv() => libc::SIGHUP,
        };
        if SignalDeferral::is_active() {
            debug!("Signal {} left to the application", signo);
            continue;
        }

        let pids = GLOBAL.trigger(OwnerToken::current());
        if !pids.is_empty() {
            info!("Stopping {} engine(s) on signal {}", pids.len(), signo);
            reap(&pids, EXIT_GRACE);
        }
        reraise(signo);
    }
}

/// Restore the default disposition of `signo` and deliver it again
#[cfg(unix)]
fn reraise(signo: libc::c_int) -> ! {
    // SAFETY: signal(2) and raise(3) are called with a valid signal number and
    // the default handler; no Rust state is touched.
    unsafe {
        libc::signal(signo, libc::SIG_DFL);
        libc::raise(signo);
    }
    std::process::exit(128 + signo)
}

/// SIGTERM to the engine's process group (the engine is spawned as its leader)
#[cfg(unix)]
pub(crate) fn signal_terminate(pid: u32) {
    signal(pid, libc::SIGTERM);
}

#[cfg(unix)]
pub(crate) fn signal_kill(pid: u32) {
    signal(pid, libc::SIGKILL);
}

#[cfg(unix)]
fn signal(pid: u32, sig: libc::c_int) {
    let pid = pid as libc::pid_t;
    // SAFETY: kill(2) has no memory-safety preconditions.
    unsafe {
        if libc::kill(-pid, sig) != 0 {
            libc::kill(pid, sig);
        }
    }
}

#[cfg(not(unix))]
pub(crate) fn signal_terminate(_pid: u32) {}

#[cfg(not(unix))]
pub(crate) fn signal_kill(_pid: u32) {}

/// Wait up to `grace` for `pids` to exit, then SIGKILL the rest
#[cfg(unix)]
fn reap(pids: &[u32], grace: Duration) {
    let deadline = std::time::Instant::now() + grace;
    let mut pending: Vec<u32> = pids.to_vec();

    while !pending.is_empty() && std::time::Instant::now() < deadline {
        pending.retain(|pid| {
            let mut status: libc::c_int = 0;
            // SAFETY: status is a valid out-pointer for the duration of the call.
            let ret = unsafe { libc::waitpid(*pid as libc::pid_t, &mut status, libc::WNOHANG) };
            ret == 0
        });
        if !pending.is_empty() {
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    for pid in pending {
        signal_kill(pid);
    }
}
