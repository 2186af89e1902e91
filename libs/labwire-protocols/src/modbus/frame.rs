//! Modbus-TCP framing (MBAP header + PDU)

use super::constants::{MAX_PDU_SIZE, MBAP_HEADER_LEN};
use super::error::{ModbusError, Result};
use super::pdu::ModbusPdu;
use tracing::debug;

/// Modbus TCP MBAP header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbapHeader {
    /// Transaction identifier
    pub transaction_id: u16,
    /// Protocol identifier (fixed to 0)
    pub protocol_id: u16,
    /// Number of bytes following the length field (unit id + PDU)
    pub length: u16,
    /// Unit identifier
    pub unit_id: u8,
}

impl MbapHeader {
    pub fn for_pdu(transaction_id: u16, unit_id: u8, pdu: &ModbusPdu) -> Self {
        Self {
            transaction_id,
            protocol_id: 0,
            length: (pdu.len() + 1) as u16,
            unit_id,
        }
    }

    pub fn encode(&self) -> [u8; MBAP_HEADER_LEN] {
        let mut raw = [0u8; MBAP_HEADER_LEN];
        raw[0..2].copy_from_slice(&self.transaction_id.to_be_bytes());
        raw[2..4].copy_from_slice(&self.protocol_id.to_be_bytes());
        raw[4..6].copy_from_slice(&self.length.to_be_bytes());
        raw[6] = self.unit_id;
        raw
    }

    /// Parse and validate a received header
    pub fn decode(raw: &[u8; MBAP_HEADER_LEN]) -> Result<Self> {
        let header = Self {
            transaction_id: u16::from_be_bytes([raw[0], raw[1]]),
            protocol_id: u16::from_be_bytes([raw[2], raw[3]]),
            length: u16::from_be_bytes([raw[4], raw[5]]),
            unit_id: raw[6],
        };

        debug!(
            "MBAP header: trans_id={:04X}, protocol_id={:04X}, length={}, unit_id={}",
            header.transaction_id, header.protocol_id, header.length, header.unit_id
        );

        if header.protocol_id != 0 {
            return Err(ModbusError::frame(format!(
                "Invalid protocol ID: expected 0, got {}",
                header.protocol_id
            )));
        }

        // unit id + at least a function code, at most a full PDU
        if header.length < 2 || header.length as usize > MAX_PDU_SIZE + 1 {
            return Err(ModbusError::frame(format!(
                "Invalid MBAP length: {}",
                header.length
            )));
        }

        Ok(header)
    }

    /// Bytes of PDU that follow this header
    pub fn pdu_len(&self) -> usize {
        self.length as usize - 1
    }
}

/// Build a complete TCP frame (MBAP + PDU)
pub fn build_tcp_frame(transaction_id: u16, unit_id: u8, pdu: &ModbusPdu) -> Vec<u8> {
    let header = MbapHeader::for_pdu(transaction_id, unit_id, pdu);
    let mut frame = Vec::with_capacity(MBAP_HEADER_LEN + pdu.len());
    frame.extend_from_slice(&header.encode());
    frame.extend_from_slice(pdu.as_slice());

    debug!(
        "Building TCP frame: trans_id={:04X}, unit_id={}, FC={:02X}, PDU_len={}",
        transaction_id,
        unit_id,
        pdu.function_code().unwrap_or(0),
        pdu.len()
    );

    frame
}
