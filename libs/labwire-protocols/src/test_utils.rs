//! In-process fakes for the hardware backends
//!
//! - [`FakeSysfsTree`]: temp directory laid out like `/sys/class/gpio`
//! - [`FakeLineHandle`]: character-device line handle backed by memory
//! - [`FakeCoilServer`]: Modbus-TCP server with a coil table that records
//!   every function code it receives and can answer with exceptions

#![allow(clippy::disallowed_methods)]

use crate::gpio::LineHandle;
use crate::modbus::constants::{
    FC_READ_COILS, FC_WRITE_MULTIPLE_COILS, FC_WRITE_SINGLE_COIL, MBAP_HEADER_LEN,
};
use parking_lot::Mutex;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::debug;

/// Simulated sysfs GPIO tree in a temp directory
pub struct FakeSysfsTree {
    dir: TempDir,
}

impl FakeSysfsTree {
    pub fn new() -> io::Result<Self> {
        let dir = TempDir::new()?;
        std::fs::write(dir.path().join("export"), "")?;
        std::fs::write(dir.path().join("unexport"), "")?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Create an already exported `gpio{index}` with the given direction and value
    pub fn add_line(&self, index: u32, direction: &str, value: &str) -> io::Result<PathBuf> {
        let gpio_dir = self.dir.path().join(format!("gpio{}", index));
        std::fs::create_dir_all(&gpio_dir)?;
        std::fs::write(gpio_dir.join("direction"), direction)?;
        std::fs::write(gpio_dir.join("value"), value)?;
        Ok(gpio_dir)
    }

    pub fn value(&self, index: u32) -> io::Result<String> {
        self.read_trimmed(&format!("gpio{}/value", index))
    }

    pub fn direction(&self, index: u32) -> io::Result<String> {
        self.read_trimmed(&format!("gpio{}/direction", index))
    }

    /// Whatever was last written to `export`
    pub fn exported(&self) -> io::Result<String> {
        self.read_trimmed("export")
    }

    fn read_trimmed(&self, relative: &str) -> io::Result<String> {
        Ok(std::fs::read_to_string(self.dir.path().join(relative))?
            .trim()
            .to_string())
    }
}

/// Memory-backed line handle.
///
/// Plain clones share the level and are used to inspect the line. Handles
/// given out with [`FakeLineHandle::checkout`] count as requests on the line
/// until they are dropped.
#[derive(Default)]
pub struct FakeLineHandle {
    level: Arc<Mutex<u8>>,
    checkouts: Arc<AtomicUsize>,
    checked_out: bool,
}

impl FakeLineHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for a backend to own; counted by [`FakeLineHandle::is_held`]
    pub fn checkout(&self) -> Self {
        self.checkouts.fetch_add(1, Ordering::SeqCst);
        Self {
            level: Arc::clone(&self.level),
            checkouts: Arc::clone(&self.checkouts),
            checked_out: true,
        }
    }

    pub fn level(&self) -> u8 {
        *self.level.lock()
    }

    /// Make the next reads return `raw`
    pub fn force_level(&self, raw: u8) {
        *self.level.lock() = raw;
    }

    /// Number of checked-out handles still alive
    pub fn holders(&self) -> usize {
        self.checkouts.load(Ordering::SeqCst)
    }

    pub fn is_held(&self) -> bool {
        self.holders() > 0
    }
}

impl Clone for FakeLineHandle {
    fn clone(&self) -> Self {
        Self {
            level: Arc::clone(&self.level),
            checkouts: Arc::clone(&self.checkouts),
            checked_out: false,
        }
    }
}

impl Drop for FakeLineHandle {
    fn drop(&mut self) {
        if self.checked_out {
            self.checkouts.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl LineHandle for FakeLineHandle {
    fn read(&mut self) -> io::Result<u8> {
        Ok(*self.level.lock())
    }

    fn write(&mut self, value: u8) -> io::Result<()> {
        *self.level.lock() = value;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct CoilServerState {
    coils: Vec<bool>,
    function_codes: Vec<u8>,
    exception: Option<u8>,
    drop_requests: bool,
    connections: usize,
}

/// Modbus-TCP coil server for tests
pub struct FakeCoilServer {
    addr: SocketAddr,
    state: Arc<Mutex<CoilServerState>>,
    task: JoinHandle<()>,
}

impl FakeCoilServer {
    /// Listen on an ephemeral localhost port with the given coil table
    pub async fn start(coils: Vec<bool>) -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let state = Arc::new(Mutex::new(CoilServerState {
            coils,
            ..Default::default()
        }));

        let accept_state = Arc::clone(&state);
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                accept_state.lock().connections += 1;
                let state = Arc::clone(&accept_state);
                tokio::spawn(async move {
                    if let Err(e) = serve_connection(stream, state).await {
                        debug!("Fake coil server connection ended: {}", e);
                    }
                });
            }
        });

        Ok(Self { addr, state, task })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn coils(&self) -> Vec<bool> {
        self.state.lock().coils.clone()
    }

    pub fn set_coil(&self, index: usize, value: bool) {
        if let Some(coil) = self.state.lock().coils.get_mut(index) {
            *coil = value;
        }
    }

    /// Function codes received so far, in order
    pub fn function_codes(&self) -> Vec<u8> {
        self.state.lock().function_codes.clone()
    }

    pub fn connections(&self) -> usize {
        self.state.lock().connections
    }

    /// Answer every following request with this exception code (None = normal)
    pub fn respond_with_exception(&self, code: Option<u8>) {
        self.state.lock().exception = code;
    }

    /// Close the connection instead of answering
    pub fn drop_requests(&self, enabled: bool) {
        self.state.lock().drop_requests = enabled;
    }
}

impl Drop for FakeCoilServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve_connection(mut stream: TcpStream, state: Arc<Mutex<CoilServerState>>) -> io::Result<()> {
    loop {
        let mut header = [0u8; MBAP_HEADER_LEN];
        match stream.read_exact(&mut header).await {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e),
        }

        let length = u16::from_be_bytes([header[4], header[5]]) as usize;
        let mut pdu = vec![0u8; length.saturating_sub(1)];
        stream.read_exact(&mut pdu).await?;

        let reply = {
            let mut state = state.lock();
            state.function_codes.push(pdu.first().copied().unwrap_or(0));
            if state.drop_requests {
                None
            } else {
                Some(handle_pdu(&mut state, &pdu))
            }
        };

        let Some(reply) = reply else {
            return Ok(());
        };

        let mut frame = Vec::with_capacity(MBAP_HEADER_LEN + reply.len());
        frame.extend_from_slice(&header[..4]);
        frame.extend_from_slice(&((reply.len() + 1) as u16).to_be_bytes());
        frame.push(header[6]);
        frame.extend_from_slice(&reply);
        stream.write_all(&frame).await?;
    }
}

fn handle_pdu(state: &mut CoilServerState, pdu: &[u8]) -> Vec<u8> {
    let fc = pdu.first().copied().unwrap_or(0);
    if let Some(code) = state.exception {
        return vec![fc | 0x80, code];
    }
    if pdu.len() < 5 {
        return vec![fc | 0x80, 0x03];
    }

    let address = u16::from_be_bytes([pdu[1], pdu[2]]) as usize;
    let field = u16::from_be_bytes([pdu[3], pdu[4]]);

    match fc {
        FC_READ_COILS => {
            let count = field as usize;
            if address + count > state.coils.len() {
                return vec![fc | 0x80, 0x02];
            }
            let mut bytes = vec![0u8; count.div_ceil(8)];
            for (i, bit) in state.coils[address..address + count].iter().enumerate() {
                if *bit {
                    bytes[i / 8] |= 1 << (i % 8);
                }
            }
            let mut reply = vec![fc, bytes.len() as u8];
            reply.extend_from_slice(&bytes);
            reply
        }
        FC_WRITE_SINGLE_COIL => {
            let value = match field {
                0xFF00 => true,
                0x0000 => false,
                _ => return vec![fc | 0x80, 0x03],
            };
            match state.coils.get_mut(address) {
                Some(coil) => *coil = value,
                None => return vec![fc | 0x80, 0x02],
            }
            pdu[..5].to_vec()
        }
        FC_WRITE_MULTIPLE_COILS => {
            let count = field as usize;
            if address + count > state.coils.len() || pdu.len() < 6 + count.div_ceil(8) {
                return vec![fc | 0x80, 0x02];
            }
            for i in 0..count {
                state.coils[address + i] = pdu[6 + i / 8] & (1 << (i % 8)) != 0;
            }
            pdu[..5].to_vec()
        }
        _ => vec![fc | 0x80, 0x01],
    }
}
