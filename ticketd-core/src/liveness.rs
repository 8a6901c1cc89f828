//! Liveness probes used by the reclaimer to find tickets held by dead clients.

use crate::types::HolderId;

/// Answers whether the process behind a holder id still exists.
pub trait LivenessProbe: Send + Sync {
    fn is_alive(&self, holder: HolderId) -> bool;
}

impl<F> LivenessProbe for F
where
    F: Fn(HolderId) -> bool + Send + Sync,
{
    fn is_alive(&self, holder: HolderId) -> bool {
        self(holder)
    }
}

/// Treats every holder as alive, which disables reclamation.
///
/// This is what hosts without process signals get.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysAlive;

impl LivenessProbe for AlwaysAlive {
    fn is_alive(&self, _holder: HolderId) -> bool {
        true
    }
}

/// Probes the holder id as a local process id with signal 0.
///
/// A holder is dead only when the kernel answers `ESRCH`. `EPERM` means the
/// process exists but belongs to someone else, so it counts as alive. On
/// non-unix targets this behaves like [`AlwaysAlive`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessProbe;

impl ProcessProbe {
    /// Whether this target can actually detect dead processes.
    pub const fn is_supported() -> bool {
        cfg!(unix)
    }
}

impl LivenessProbe for ProcessProbe {
    #[cfg(unix)]
    fn is_alive(&self, holder: HolderId) -> bool {
        use nix::errno::Errno;
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        // Ids above i32::MAX would become negative pids, which address
        // process groups. No real process has one.
        let Ok(raw) = i32::try_from(holder.get()) else {
            return false;
        };

        match kill(Pid::from_raw(raw), None) {
            Ok(()) => true,
            Err(Errno::ESRCH) => false,
            Err(_) => true,
        }
    }

    #[cfg(not(unix))]
    fn is_alive(&self, _holder: HolderId) -> bool {
        true
    }
}

/// Selects a probe by name, as given on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessMode {
    Process,
    None,
}

impl LivenessMode {
    pub fn probe(self) -> Box<dyn LivenessProbe> {
        match self {
            LivenessMode::Process => Box::new(ProcessProbe),
            LivenessMode::None => Box::new(AlwaysAlive),
        }
    }
}
