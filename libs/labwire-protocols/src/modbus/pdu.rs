//! Modbus PDU data structure
//!
//! Fixed-size stack buffer; a PDU never exceeds 253 bytes.

use tracing::debug;

use super::constants::{
    COIL_OFF, COIL_ON, EXCEPTION_FLAG, FC_READ_COILS, FC_WRITE_MULTIPLE_COILS,
    FC_WRITE_SINGLE_COIL, MAX_PDU_SIZE, MAX_READ_COILS, MAX_WRITE_COILS,
};
use super::error::{ModbusError, Result};

/// PDU with stack-allocated fixed array
#[derive(Debug, Clone)]
pub struct ModbusPdu {
    data: [u8; MAX_PDU_SIZE],
    len: usize,
}

impl ModbusPdu {
    /// Create an empty PDU
    #[inline]
    pub fn new() -> Self {
        Self {
            data: [0; MAX_PDU_SIZE],
            len: 0,
        }
    }

    /// Create a PDU from a byte slice
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        if data.len() > MAX_PDU_SIZE {
            return Err(ModbusError::frame(format!(
                "PDU too large: {} bytes (max {})",
                data.len(),
                MAX_PDU_SIZE
            )));
        }

        let mut pdu = Self::new();
        pdu.data[..data.len()].copy_from_slice(data);
        pdu.len = data.len();

        if let Some(fc) = pdu.function_code() {
            if pdu.is_exception() {
                debug!(
                    "PDU parsed: FC={:02X} (Exception: {}), exception_code={:02X}",
                    fc,
                    Self::function_code_description(fc),
                    pdu.exception_code().unwrap_or(0)
                );
            } else {
                debug!(
                    "PDU parsed: FC={:02X} ({}), data_len={}",
                    fc,
                    Self::function_code_description(fc),
                    pdu.len - 1
                );
            }
        }

        Ok(pdu)
    }

    /// Push a single byte
    #[inline]
    pub fn push(&mut self, byte: u8) -> Result<()> {
        if self.len >= MAX_PDU_SIZE {
            return Err(ModbusError::frame("PDU buffer full"));
        }
        self.data[self.len] = byte;
        self.len += 1;
        Ok(())
    }

    /// Push u16 in big-endian
    #[inline]
    pub fn push_u16(&mut self, value: u16) -> Result<()> {
        self.push((value >> 8) as u8)?;
        self.push((value & 0xFF) as u8)
    }

    /// Extend with a byte slice
    pub fn extend(&mut self, data: &[u8]) -> Result<()> {
        if self.len + data.len() > MAX_PDU_SIZE {
            return Err(ModbusError::frame(format!(
                "PDU would exceed max size: {} + {} > {}",
                self.len,
                data.len(),
                MAX_PDU_SIZE
            )));
        }
        self.data[self.len..self.len + data.len()].copy_from_slice(data);
        self.len += data.len();
        Ok(())
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Function code (first byte)
    #[inline]
    pub fn function_code(&self) -> Option<u8> {
        self.as_slice().first().copied()
    }

    #[inline]
    pub fn is_exception(&self) -> bool {
        self.function_code()
            .map(|fc| fc & EXCEPTION_FLAG != 0)
            .unwrap_or(false)
    }

    #[inline]
    pub fn exception_code(&self) -> Option<u8> {
        if self.is_exception() && self.len > 1 {
            Some(self.data[1])
        } else {
            None
        }
    }

    /// Big-endian u16 at `offset`
    pub fn u16_at(&self, offset: usize) -> Option<u16> {
        let bytes = self.as_slice().get(offset..offset + 2)?;
        Some(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// Decode an FC01 response body into `count` coil states
    pub fn coil_bits(&self, count: u16) -> Result<Vec<bool>> {
        let expected_bytes = (count as usize).div_ceil(8);
        let body = self.as_slice();
        let byte_count = body.get(1).copied().unwrap_or(0) as usize;

        if byte_count != expected_bytes || body.len() != 2 + byte_count {
            return Err(ModbusError::frame(format!(
                "Read Coils response carries {} bytes, expected {} for {} coils",
                body.len().saturating_sub(2),
                expected_bytes,
                count
            )));
        }

        let bytes = &body[2..];
        Ok((0..count as usize)
            .map(|i| bytes[i / 8] & (1 << (i % 8)) != 0)
            .collect())
    }

    pub(crate) fn function_code_description(fc: u8) -> &'static str {
        match fc & !EXCEPTION_FLAG {
            FC_READ_COILS => "Read Coils",
            FC_WRITE_SINGLE_COIL => "Write Single Coil",
            FC_WRITE_MULTIPLE_COILS => "Write Multiple Coils",
            _ => "Unknown Function",
        }
    }
}

impl Default for ModbusPdu {
    fn default() -> Self {
        Self::new()
    }
}

/// PDU builder - fluent API
pub struct PduBuilder {
    pdu: ModbusPdu,
}

impl Default for PduBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PduBuilder {
    #[inline]
    pub fn new() -> Self {
        Self {
            pdu: ModbusPdu::new(),
        }
    }

    #[inline]
    pub fn function_code(mut self, fc: u8) -> Result<Self> {
        self.pdu.push(fc)?;
        Ok(self)
    }

    #[inline]
    pub fn address(mut self, addr: u16) -> Result<Self> {
        self.pdu.push_u16(addr)?;
        Ok(self)
    }

    #[inline]
    pub fn quantity(mut self, qty: u16) -> Result<Self> {
        self.pdu.push_u16(qty)?;
        Ok(self)
    }

    #[inline]
    pub fn byte(mut self, b: u8) -> Result<Self> {
        self.pdu.push(b)?;
        Ok(self)
    }

    #[inline]
    pub fn data(mut self, data: &[u8]) -> Result<Self> {
        self.pdu.extend(data)?;
        Ok(self)
    }

    pub fn build(self) -> ModbusPdu {
        if let Some(fc) = self.pdu.function_code() {
            debug!(
                "PDU built: FC={:02X} ({}), total_len={}",
                fc,
                ModbusPdu::function_code_description(fc),
                self.pdu.len()
            );
        }
        self.pdu
    }

    /// FC01 request for `count` coils starting at `start`
    pub fn read_coils(start: u16, count: u16) -> Result<ModbusPdu> {
        if count == 0 || count > MAX_READ_COILS {
            return Err(ModbusError::frame(format!(
                "Read Coils quantity {} outside 1..={}",
                count, MAX_READ_COILS
            )));
        }
        Ok(PduBuilder::new()
            .function_code(FC_READ_COILS)?
            .address(start)?
            .quantity(count)?
            .build())
    }

    /// FC05 request
    pub fn write_single_coil(address: u16, value: bool) -> Result<ModbusPdu> {
        Ok(PduBuilder::new()
            .function_code(FC_WRITE_SINGLE_COIL)?
            .address(address)?
            .quantity(if value { COIL_ON } else { COIL_OFF })?
            .build())
    }

    /// FC15 request, coils packed LSB first
    pub fn write_multiple_coils(start: u16, values: &[bool]) -> Result<ModbusPdu> {
        if values.is_empty() || values.len() > MAX_WRITE_COILS as usize {
            return Err(ModbusError::frame(format!(
                "Write Multiple Coils quantity {} outside 1..={}",
                values.len(),
                MAX_WRITE_COILS
            )));
        }

        let mut packed = vec![0u8; values.len().div_ceil(8)];
        for (i, value) in values.iter().enumerate() {
            if *value {
                packed[i / 8] |= 1 << (i % 8);
            }
        }

        Ok(PduBuilder::new()
            .function_code(FC_WRITE_MULTIPLE_COILS)?
            .address(start)?
            .quantity(values.len() as u16)?
            .byte(packed.len() as u8)?
            .data(&packed)?
            .build())
    }
}
