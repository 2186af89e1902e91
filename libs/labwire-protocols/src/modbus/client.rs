//! Modbus-TCP client with per-request connections

use super::constants::{
    DEFAULT_UNIT_ID, EXCEPTION_FLAG, FC_WRITE_MULTIPLE_COILS, FC_WRITE_SINGLE_COIL,
    MBAP_HEADER_LEN,
};
use super::error::{ExceptionCode, ModbusError, Result, TransportErrorCode};
use super::frame::{build_tcp_frame, MbapHeader};
use super::pdu::{ModbusPdu, PduBuilder};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

/// Bound for one whole request: resolve, connect, send and receive
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Modbus-TCP client.
///
/// Each request opens a connection, exchanges one frame and closes it again.
/// The outcome of the most recent request is kept in [`last_error`] and
/// [`last_exception`].
///
/// [`last_error`]: ModbusTcpClient::last_error
/// [`last_exception`]: ModbusTcpClient::last_exception
#[derive(Debug)]
pub struct ModbusTcpClient {
    host: String,
    port: u16,
    unit_id: u8,
    timeout: Duration,
    next_transaction_id: u16,
    last_error: TransportErrorCode,
    last_exception: ExceptionCode,
}

impl ModbusTcpClient {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            unit_id: DEFAULT_UNIT_ID,
            timeout: DEFAULT_TIMEOUT,
            next_transaction_id: 1,
            last_error: TransportErrorCode::None,
            last_exception: ExceptionCode::None,
        }
    }

    pub fn with_unit_id(mut self, unit_id: u8) -> Self {
        self.unit_id = unit_id;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Transport error code of the last request
    pub fn last_error(&self) -> TransportErrorCode {
        self.last_error
    }

    /// Exception code of the last request (`None` unless it was an exception response)
    pub fn last_exception(&self) -> ExceptionCode {
        self.last_exception
    }

    /// FC01: read `count` coils starting at `start`
    pub async fn read_coils(&mut self, start: u16, count: u16) -> Result<Vec<bool>> {
        let request = self.track(PduBuilder::read_coils(start, count))?;
        let response = self.transact(&request).await?;
        self.track(response.coil_bits(count))
    }

    /// FC05: write one coil
    pub async fn write_single_coil(&mut self, address: u16, value: bool) -> Result<()> {
        let request = self.track(PduBuilder::write_single_coil(address, value))?;
        let response = self.transact(&request).await?;
        self.track(expect_echo(&request, &response, FC_WRITE_SINGLE_COIL))
    }

    /// FC15: write consecutive coils starting at `start`
    pub async fn write_multiple_coils(&mut self, start: u16, values: &[bool]) -> Result<()> {
        let request = self.track(PduBuilder::write_multiple_coils(start, values))?;
        let response = self.transact(&request).await?;
        self.track(expect_echo(&request, &response, FC_WRITE_MULTIPLE_COILS))
    }

    fn next_transaction_id(&mut self) -> u16 {
        let id = self.next_transaction_id;
        self.next_transaction_id = self.next_transaction_id.wrapping_add(1);
        id
    }

    /// Record the outcome of a request step in `last_error`/`last_exception`.
    fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        match &result {
            Ok(_) => {
                self.last_error = TransportErrorCode::None;
                self.last_exception = ExceptionCode::None;
            }
            Err(e) => {
                self.last_error = e.code;
                self.last_exception = e.exception;
                warn!(
                    "Modbus request to {}:{} failed: {}",
                    self.host, self.port, e
                );
            }
        }
        result
    }

    async fn transact(&mut self, request: &ModbusPdu) -> Result<ModbusPdu> {
        let transaction_id = self.next_transaction_id();
        let result = self.exchange(transaction_id, request).await;
        self.track(result)
    }

    /// Every step shares one deadline, so a request never outlives `timeout`.
    async fn exchange(&self, transaction_id: u16, request: &ModbusPdu) -> Result<ModbusPdu> {
        let deadline = Instant::now() + self.timeout;
        let addr = self.resolve(deadline).await?;

        let mut stream = match timeout_at(deadline, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(ModbusError::new(
                    TransportErrorCode::Connect,
                    format!("connect to {} failed: {}", addr, e),
                ))
            }
            Err(_) => {
                return Err(ModbusError::new(
                    TransportErrorCode::Connect,
                    format!("connect to {} timed out", addr),
                ))
            }
        };
        let _ = stream.set_nodelay(true);

        let frame = build_tcp_frame(transaction_id, self.unit_id, request);
        match timeout_at(deadline, stream.write_all(&frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(ModbusError::from_io(TransportErrorCode::Send, &e)),
            Err(_) => return Err(ModbusError::timeout("send timed out")),
        }

        let mut raw_header = [0u8; MBAP_HEADER_LEN];
        match timeout_at(deadline, stream.read_exact(&mut raw_header)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(ModbusError::from_io(TransportErrorCode::Recv, &e)),
            Err(_) => return Err(ModbusError::timeout("MBAP header read timed out")),
        }
        let header = MbapHeader::decode(&raw_header)?;

        let mut body = vec![0u8; header.pdu_len()];
        match timeout_at(deadline, stream.read_exact(&mut body)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(ModbusError::from_io(TransportErrorCode::Recv, &e)),
            Err(_) => return Err(ModbusError::timeout("PDU read timed out")),
        }

        // auto close
        drop(stream);

        if header.transaction_id != transaction_id || header.unit_id != self.unit_id {
            return Err(ModbusError::frame(format!(
                "response trans_id={:04X}/unit={} does not match request trans_id={:04X}/unit={}",
                header.transaction_id, header.unit_id, transaction_id, self.unit_id
            )));
        }

        let response = ModbusPdu::from_slice(&body)?;
        let request_fc = request.function_code().unwrap_or(0);
        match response.function_code() {
            Some(fc) if fc == request_fc | EXCEPTION_FLAG => Err(ModbusError::exception(
                request_fc,
                ExceptionCode::from(response.exception_code().unwrap_or(0)),
            )),
            Some(fc) if fc == request_fc => Ok(response),
            other => Err(ModbusError::frame(format!(
                "unexpected function code {:02X?} for request FC{:02X}",
                other, request_fc
            ))),
        }
    }

    async fn resolve(&self, deadline: Instant) -> Result<SocketAddr> {
        let lookup = timeout_at(
            deadline,
            tokio::net::lookup_host((self.host.as_str(), self.port)),
        )
        .await;

        let mut addrs = match lookup {
            Ok(Ok(addrs)) => addrs,
            Ok(Err(e)) => {
                return Err(ModbusError::new(
                    TransportErrorCode::Resolve,
                    format!("cannot resolve {}: {}", self.host, e),
                ))
            }
            Err(_) => {
                return Err(ModbusError::new(
                    TransportErrorCode::Resolve,
                    format!("resolving {} timed out", self.host),
                ))
            }
        };

        let addr = addrs.next().ok_or_else(|| {
            ModbusError::new(
                TransportErrorCode::Resolve,
                format!("{} resolved to no address", self.host),
            )
        })?;
        debug!("Modbus endpoint {}:{} -> {}", self.host, self.port, addr);
        Ok(addr)
    }
}

/// Write responses echo address and quantity/value of the request.
fn expect_echo(request: &ModbusPdu, response: &ModbusPdu, fc: u8) -> Result<()> {
    let echoed = response.len() == 5 && response.as_slice()[1..5] == request.as_slice()[1..5];
    if echoed {
        Ok(())
    } else {
        Err(ModbusError::frame(format!(
            "FC{:02X} response does not echo the request: {:02X?}",
            fc,
            response.as_slice()
        )))
    }
}
