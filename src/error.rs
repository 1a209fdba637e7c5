//! Two distinct error domains: guest-visible faults and host-level setup failures.
//!
//! `Fault` models everything the architecture turns into an interrupt — it is never
//! surfaced to a caller as a `Result` past the instruction boundary; the CPU catches
//! it and drives interrupt entry. `HostError` covers CLI/config/boot failures before
//! the machine is even running.

use thiserror::Error;

/// A guest-visible fault, turned into an interrupt at the current instruction
/// boundary. The CPU never formats this for a human; it only reads `interrupt_number`
/// and, for page faults, the associated status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Privileged instruction in user mode, unmapped opcode, wrong-direction region
    /// access, mismatched register-width operands, invalid register reference.
    IllegalOperation,
    /// Integer division or remainder with a zero divisor.
    DivideByZero,
    /// MMU translation failed; carries the PFSR code (0-3).
    PageFault(PageFaultCode),
    /// Keyboard key event latched.
    Keyboard,
    /// Disk A status change or command completion.
    DiskA,
    /// Disk B status change or command completion.
    DiskB,
    /// Timer period elapsed.
    Timer,
    /// SYSCALL instruction executed.
    Syscall,
}

impl Fault {
    /// The canonical 2.0.0 interrupt number for this fault (ascending priority,
    /// 0 = highest). See DESIGN.md for the Open Question resolution.
    pub fn interrupt_number(self) -> u8 {
        match self {
            Fault::IllegalOperation => 0,
            Fault::DivideByZero => 1,
            Fault::PageFault(_) => 2,
            Fault::Keyboard => 3,
            Fault::DiskA => 4,
            Fault::DiskB => 5,
            Fault::Timer => 6,
            Fault::Syscall => 7,
        }
    }
}

/// Page-fault status codes written to PFSR, per spec §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageFaultCode {
    /// V=0 in directory or table entry.
    InvalidPage = 0,
    /// Access-intent bit (R/W/E) denied.
    IllegalAccess = 1,
    /// V=1, P=0.
    NotPresent = 2,
    /// W=1, C=1 on a write (copy-on-write).
    CopyOnWrite = 3,
}

pub type Result<T> = core::result::Result<T, Fault>;

/// Host-level failures: bad configuration, missing files, malformed images. These
/// unwind through `main` via `anyhow`, never reach the guest.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("ROM image {path} is {actual} bytes, expected exactly 512")]
    BadRomSize { path: String, actual: u64 },

    #[error("disk directory {path} does not exist")]
    MissingDiskDirectory { path: String },

    #[error("disk directory {path} contains more than one file")]
    AmbiguousDiskDirectory { path: String },

    #[error("disk image {path} is {actual} bytes, not a non-zero multiple of 4096")]
    BadDiskImageSize { path: String, actual: u64 },

    #[error("I/O error accessing {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
