//! Disk controller (§6): status / blocks-available / block-address / command
//! registers plus a 4 KiB data buffer, backed by a host file. Instantiated twice, for
//! disk A and disk B. Grounded on the teacher's `devices/ide.rs` (status bits,
//! command dispatch, sector-buffer transfer), generalized from ATA task-file
//! registers to this architecture's simpler register set; host directory watching
//! has no teacher counterpart and is new code (a polling thread — no
//! notification-style crate appears anywhere in the retrieval pack).

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::Device;
use crate::error::Fault;
use crate::interrupts::InterruptController;

pub const BLOCK_SIZE: u32 = 4096;
pub const REGISTER_WINDOW: u32 = 10;

/// Status byte bits (§6).
pub const STATUS_CONNECTED: u8 = 1 << 0;
pub const STATUS_FINISH_TOGGLE: u8 = 1 << 1;
pub const STATUS_SUCCESS: u8 = 1 << 2;
pub const STATUS_BAD_COMMAND: u8 = 1 << 3;

const CMD_READ: u8 = 0x01;
const CMD_WRITE: u8 = 0x02;
const CMD_CONTIGUOUS_READ: u8 = 0x03;
const CMD_CONTIGUOUS_WRITE: u8 = 0x04;

/// Which of the two controllers this is, for selecting the interrupt to raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskId {
    A,
    B,
}

impl DiskId {
    fn fault(self) -> Fault {
        match self {
            DiskId::A => Fault::DiskA,
            DiskId::B => Fault::DiskB,
        }
    }
}

#[derive(Debug)]
pub struct Disk {
    id: DiskId,
    status: u8,
    blocks_available: u32,
    block_address: u32,
    buffer: [u8; BLOCK_SIZE as usize],
    backing: Option<PathBuf>,
    interrupts: Arc<Mutex<InterruptController>>,
}

impl Disk {
    pub fn new(id: DiskId, interrupts: Arc<Mutex<InterruptController>>) -> Self {
        Disk {
            id,
            status: 0,
            blocks_available: 0,
            block_address: 0,
            buffer: [0u8; BLOCK_SIZE as usize],
            backing: None,
            interrupts,
        }
    }

    fn raise(&self) {
        self.interrupts.lock().unwrap().raise(self.id.fault().interrupt_number());
    }

    /// Attach (or detach, with `None`) a host backing file, recomputing
    /// `blocks_available` and raising the disk interrupt for the connection change
    /// (§6: "a change (remove/add/replace) raises the disk interrupt with status
    /// updated").
    pub fn attach(&mut self, path: Option<PathBuf>) {
        match &path {
            Some(p) => {
                let len = std::fs::metadata(p).map(|m| m.len()).unwrap_or(0);
                self.blocks_available = (len / BLOCK_SIZE as u64) as u32;
                self.status |= STATUS_CONNECTED;
            }
            None => {
                self.blocks_available = 0;
                self.status &= !STATUS_CONNECTED;
            }
        }
        self.backing = path;
        self.raise();
    }

    fn fail(&mut self) {
        self.status = (self.status & STATUS_CONNECTED) | STATUS_BAD_COMMAND;
        self.status ^= STATUS_FINISH_TOGGLE;
        self.raise();
    }

    fn succeed(&mut self) {
        self.status = (self.status & STATUS_CONNECTED) | STATUS_SUCCESS;
        self.status ^= STATUS_FINISH_TOGGLE;
        self.raise();
    }

    fn open_for_io(&self, write: bool) -> std::io::Result<File> {
        let path = self.backing.as_ref().expect("checked by caller");
        if write {
            OpenOptions::new().write(true).open(path)
        } else {
            File::open(path)
        }
    }

    fn do_read(&mut self, block: u32) {
        if block >= self.blocks_available || self.backing.is_none() {
            self.fail();
            return;
        }
        match self.open_for_io(false) {
            Ok(mut f) => {
                if f.seek(SeekFrom::Start(block as u64 * BLOCK_SIZE as u64)).is_ok()
                    && f.read_exact(&mut self.buffer).is_ok()
                {
                    self.succeed();
                } else {
                    self.fail();
                }
            }
            Err(_) => self.fail(),
        }
    }

    fn do_write(&mut self, block: u32) {
        if block >= self.blocks_available || self.backing.is_none() {
            self.fail();
            return;
        }
        match self.open_for_io(true) {
            Ok(mut f) => {
                if f.seek(SeekFrom::Start(block as u64 * BLOCK_SIZE as u64)).is_ok()
                    && f.write_all(&self.buffer).is_ok()
                {
                    self.succeed();
                } else {
                    self.fail();
                }
            }
            Err(_) => self.fail(),
        }
    }

    fn execute_command(&mut self, cmd: u8) {
        match cmd {
            CMD_READ => self.do_read(self.block_address),
            CMD_WRITE => self.do_write(self.block_address),
            CMD_CONTIGUOUS_READ => {
                self.do_read(self.block_address);
                self.block_address = self.block_address.wrapping_add(1);
            }
            CMD_CONTIGUOUS_WRITE => {
                self.do_write(self.block_address);
                self.block_address = self.block_address.wrapping_add(1);
            }
            _ => self.fail(),
        }
    }
}

/// Adapter exposing `Disk`'s status/blocks-available/block-address/command registers
/// (10 bytes) as a `Device`. The bus holds a separate adapter for the data buffer —
/// both wrap the same shared `Disk`.
#[derive(Debug, Clone)]
pub struct DiskRegisters(pub Arc<Mutex<Disk>>);

impl Device for DiskRegisters {
    fn len(&self) -> u32 {
        REGISTER_WINDOW
    }

    fn read(&mut self, offset: u32) -> u8 {
        let disk = self.0.lock().unwrap();
        match offset {
            0 => disk.status,
            1..=4 => disk.blocks_available.to_be_bytes()[(offset - 1) as usize],
            _ => unreachable!("bus must reject out-of-window or wrong-direction reads"),
        }
    }

    fn write(&mut self, offset: u32, value: u8) {
        let mut disk = self.0.lock().unwrap();
        match offset {
            5..=8 => {
                let mut bytes = disk.block_address.to_be_bytes();
                bytes[(offset - 5) as usize] = value;
                disk.block_address = u32::from_be_bytes(bytes);
            }
            9 => disk.execute_command(value),
            _ => unreachable!("bus must reject out-of-window or wrong-direction writes"),
        }
    }
}

/// Adapter exposing `Disk`'s 4 KiB data buffer as a `Device`.
#[derive(Debug, Clone)]
pub struct DiskBuffer(pub Arc<Mutex<Disk>>);

impl Device for DiskBuffer {
    fn len(&self) -> u32 {
        BLOCK_SIZE
    }

    fn read(&mut self, offset: u32) -> u8 {
        self.0.lock().unwrap().buffer[offset as usize]
    }

    fn write(&mut self, offset: u32, value: u8) {
        self.0.lock().unwrap().buffer[offset as usize] = value;
    }

    fn swap_block(&mut self, offset: u32, new_bytes: &[u8], old_bytes: &mut [u8]) {
        let mut disk = self.0.lock().unwrap();
        let start = offset as usize;
        let end = start + new_bytes.len();
        old_bytes.copy_from_slice(&disk.buffer[start..end]);
        disk.buffer[start..end].copy_from_slice(new_bytes);
    }
}

/// Poll `dir` for its single backing file (§6: "the host directory contains either
/// zero or exactly one file"), calling `attach` whenever the set of files changes.
/// Runs on its own thread for the lifetime of the machine.
pub fn watch_directory(dir: PathBuf, disk: Arc<Mutex<Disk>>, poll_interval: std::time::Duration) {
    std::thread::spawn(move || {
        let mut current: Option<PathBuf> = None;
        loop {
            if let Some(found) = single_file_in(&dir) {
                if current.as_ref() != Some(&found) {
                    current = Some(found.clone());
                    disk.lock().unwrap().attach(Some(found));
                }
            } else if current.take().is_some() {
                disk.lock().unwrap().attach(None);
            }
            std::thread::sleep(poll_interval);
        }
    });
}

fn single_file_in(dir: &Path) -> Option<PathBuf> {
    std::fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .find(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|e| e.path())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn new_disk() -> Arc<Mutex<Disk>> {
        let ic = Arc::new(Mutex::new(InterruptController::new()));
        Arc::new(Mutex::new(Disk::new(DiskId::A, ic)))
    }

    #[test]
    fn unattached_disk_reports_not_connected() {
        let disk = new_disk();
        let mut regs = DiskRegisters(disk);
        assert_eq!(regs.read(0) & STATUS_CONNECTED, 0);
    }

    #[test]
    fn command_on_out_of_range_block_sets_bad_command() {
        let disk = new_disk();
        let mut regs = DiskRegisters(disk.clone());
        regs.write(9, CMD_READ);
        assert_ne!(regs.read(0) & STATUS_BAD_COMMAND, 0);
        assert!(disk.lock().unwrap().interrupts.lock().unwrap().has_pending());
    }

    #[test]
    fn read_command_copies_block_into_buffer() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let mut f = tmp.reopen().unwrap();
        let mut block0 = vec![0u8; BLOCK_SIZE as usize];
        block0[0] = 0xAB;
        f.write_all(&block0).unwrap();
        f.flush().unwrap();

        let disk = new_disk();
        disk.lock().unwrap().attach(Some(tmp.path().to_path_buf()));

        let mut regs = DiskRegisters(disk.clone());
        regs.write(5, 0);
        regs.write(6, 0);
        regs.write(7, 0);
        regs.write(8, 0);
        regs.write(9, CMD_READ);

        assert_ne!(regs.read(0) & STATUS_SUCCESS, 0);
        let mut buf = DiskBuffer(disk);
        assert_eq!(buf.read(0), 0xAB);
    }
}
