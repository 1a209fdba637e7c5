//! simulatron — emulator for a bespoke 32-bit big-endian virtual machine (§1).
//!
//! Organized the way the teacher organizes its own CPU core:
//! - **Decoder** (`decoder.rs`) — fixed-opcode, variable-literal instruction decoding
//! - **Executor** (`executor/`) — instruction execution grouped by category
//! - **Memory** (`memory/`) — RAM backing stores and the two-level MMU
//! - **Devices** (`devices/`) — ROM, display, keyboard, disks, timer
//! - **CPU** (`cpu.rs`) — fetch/decode/execute loop and interrupt entry/return
//!
//! Unlike the teacher, this crate is a hosted `std` library plus a CLI binary
//! (`main.rs`): the Simulatron has no OS-kernel embedding to support, so there is no
//! C ABI surface here, only a [`Machine`] a host program drives directly.

pub mod bus;
pub mod config;
pub mod cpu;
pub mod decoder;
pub mod devices;
pub mod error;
pub mod executor;
pub mod flags;
pub mod instruction;
pub mod interrupts;
pub mod memory;
pub mod registers;

use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing::info;

use crate::bus::MemoryBus;
use crate::config::Config;
use crate::cpu::{Cpu, ExitReason};
use crate::devices::disk::{Disk, DiskId};
use crate::devices::keyboard::{KeyEvent, Keyboard};
use crate::devices::timer::Timer;
use crate::devices::{display::Display, rom::Rom};
use crate::error::HostError;
use crate::interrupts::InterruptController;
use crate::memory::{Sparse, RAM_SIZE};

/// The instruction-set revision this crate implements (§9: "expose a version
/// constant a host can log or assert on"). 2.0.0 is the final revision; see
/// DESIGN.md for the Open Questions this resolved against the alpha revision.
pub const INSTRUCTION_SET_VERSION: &str = "2.0.0";

/// The assembled machine: CPU, bus, and the shared handles a host needs to pump
/// devices from outside the fetch/decode/execute loop (keyboard input, disk
/// attachment). Construction is infallible once a [`Config`] has already validated
/// its inputs; `Machine::new` takes the already-loaded ROM image and disk paths.
pub struct Machine {
    cpu: Cpu,
    bus: MemoryBus,
    interrupts: Arc<Mutex<InterruptController>>,
    keyboard: Arc<Mutex<Keyboard>>,
    disk_a: Arc<Mutex<Disk>>,
    disk_b: Arc<Mutex<Disk>>,
}

impl Machine {
    /// Build a machine from a validated [`Config`]. Spawns the disk directory
    /// watcher threads and the timer thread; does not start the fetch/decode/execute
    /// loop itself (see [`Machine::run`]).
    pub fn new(config: &Config) -> Result<Self, HostError> {
        let rom_image = std::fs::read(&config.rom_path).map_err(|source| HostError::Io {
            path: config.rom_path.display().to_string(),
            source,
        })?;
        let rom = Rom::new(rom_image.try_into().map_err(|v: Vec<u8>| HostError::BadRomSize {
            path: config.rom_path.display().to_string(),
            actual: v.len() as u64,
        })?);

        let interrupts = Arc::new(Mutex::new(InterruptController::new()));
        let keyboard = Arc::new(Mutex::new(Keyboard::new(interrupts.clone())));
        let display = Display::new();

        let disk_a = Arc::new(Mutex::new(Disk::new(DiskId::A, interrupts.clone())));
        let disk_b = Arc::new(Mutex::new(Disk::new(DiskId::B, interrupts.clone())));
        attach_initial_image(&disk_a, &config.disk_a_dir)?;
        attach_initial_image(&disk_b, &config.disk_b_dir)?;
        crate::devices::disk::watch_directory(
            config.disk_a_dir.clone(),
            disk_a.clone(),
            config.disk_poll_interval,
        );
        crate::devices::disk::watch_directory(
            config.disk_b_dir.clone(),
            disk_b.clone(),
            config.disk_poll_interval,
        );

        let bus = MemoryBus::new(
            rom,
            display,
            keyboard.clone(),
            disk_a.clone(),
            disk_b.clone(),
            Box::new(Sparse::new(RAM_SIZE)),
        );

        let mut cpu = Cpu::new();
        let timer = Arc::new(Timer::new(interrupts.clone()));
        cpu.attach_timer(timer);

        Ok(Machine {
            cpu,
            bus,
            interrupts,
            keyboard,
            disk_a,
            disk_b,
        })
    }

    /// Run the fetch/decode/execute loop until HALT or `request_stop`.
    pub fn run(&mut self) -> ExitReason {
        info!(version = INSTRUCTION_SET_VERSION, "machine running");
        self.cpu.run(&mut self.bus, &self.interrupts)
    }

    pub fn request_stop(&mut self) {
        self.cpu.request_stop();
    }

    /// Deliver a key event from the (out-of-scope, §1) display front-end.
    pub fn press_key(&self, event: KeyEvent) {
        self.keyboard.lock().unwrap().push_event(event);
    }

    pub fn attach_disk_a(&self, path: Option<std::path::PathBuf>) {
        self.disk_a.lock().unwrap().attach(path);
    }

    pub fn attach_disk_b(&self, path: Option<std::path::PathBuf>) {
        self.disk_b.lock().unwrap().attach(path);
    }
}

/// If `dir` already contains a single file at startup, attach it before the watcher
/// thread takes over (§6: "the host directory contains either zero or exactly one
/// file"; more than one is a startup error, not silently picked).
fn attach_initial_image(disk: &Arc<Mutex<Disk>>, dir: &Path) -> Result<(), HostError> {
    if !dir.is_dir() {
        return Err(HostError::MissingDiskDirectory {
            path: dir.display().to_string(),
        });
    }
    let mut files = std::fs::read_dir(dir)
        .map_err(|source| HostError::Io {
            path: dir.display().to_string(),
            source,
        })?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false));

    let first = files.next();
    if files.next().is_some() {
        return Err(HostError::AmbiguousDiskDirectory {
            path: dir.display().to_string(),
        });
    }
    if let Some(entry) = first {
        let path = entry.path();
        let len = std::fs::metadata(&path)
            .map_err(|source| HostError::Io {
                path: path.display().to_string(),
                source,
            })?
            .len();
        if len == 0 || len % crate::devices::disk::BLOCK_SIZE as u64 != 0 {
            return Err(HostError::BadDiskImageSize {
                path: path.display().to_string(),
                actual: len,
            });
        }
        disk.lock().unwrap().attach(Some(path));
    }
    Ok(())
}
