//! Minimal Modbus/TCP master.
//!
//! Only function 0x03 (read holding registers) and 0x06 (write single
//! register) are implemented. Every transaction is synchronous with the
//! socket read/write timeout set to the configured transport timeout; any
//! failure drops the socket so the caller reconnects on its own schedule.
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use bandsaw_traits::{BoxError, RegisterBus};
use tracing::{debug, trace};

use crate::error::{HwError, Result};

const FC_READ_HOLDING: u8 = 0x03;
const FC_WRITE_SINGLE: u8 = 0x06;
/// Protocol ceiling for one 0x03 request.
pub const MAX_READ_COUNT: u16 = 125;
const MBAP_LEN: usize = 7;

pub struct ModbusTcpBus {
    endpoint: String,
    unit_id: u8,
    timeout: Duration,
    stream: Option<TcpStream>,
    next_tid: u16,
}

impl ModbusTcpBus {
    pub fn new(host: &str, port: u16, unit_id: u8, timeout: Duration) -> Self {
        Self {
            endpoint: format!("{host}:{port}"),
            unit_id,
            timeout,
            stream: None,
            next_tid: 1,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn resolve(&self) -> Result<SocketAddr> {
        self.endpoint
            .to_socket_addrs()
            .map_err(HwError::from_io)?
            .next()
            .ok_or_else(|| HwError::Protocol(format!("cannot resolve {}", self.endpoint)))
    }

    fn open(&mut self) -> Result<()> {
        let addr = self.resolve()?;
        let stream = TcpStream::connect_timeout(&addr, self.timeout).map_err(HwError::from_io)?;
        stream
            .set_read_timeout(Some(self.timeout))
            .map_err(HwError::from_io)?;
        stream
            .set_write_timeout(Some(self.timeout))
            .map_err(HwError::from_io)?;
        stream.set_nodelay(true).map_err(HwError::from_io)?;
        debug!(endpoint = %self.endpoint, "modbus connected");
        self.stream = Some(stream);
        Ok(())
    }

    fn take_tid(&mut self) -> u16 {
        let tid = self.next_tid;
        self.next_tid = self.next_tid.wrapping_add(1);
        tid
    }

    /// Send one PDU and return the response PDU (function code first).
    fn transact(&mut self, pdu: &[u8]) -> Result<Vec<u8>> {
        let tid = self.take_tid();
        let unit_id = self.unit_id;
        let stream = self.stream.as_mut().ok_or(HwError::NotConnected)?;
        let frame = encode_frame(tid, unit_id, pdu);
        trace!(tid, len = frame.len(), "modbus request");
        stream.write_all(&frame).map_err(HwError::from_io)?;

        let mut header = [0u8; MBAP_LEN];
        stream.read_exact(&mut header).map_err(HwError::from_io)?;
        let body_len = check_header(&header, tid, unit_id)?;
        let mut body = vec![0u8; body_len];
        stream.read_exact(&mut body).map_err(HwError::from_io)?;
        check_function(pdu[0], &body)?;
        Ok(body)
    }

    fn with_reset<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let out = f(self);
        if out.is_err() {
            self.stream = None;
        }
        out
    }
}

/// Build an MBAP frame: transaction id, protocol 0, length (unit + pdu), unit id, pdu.
pub fn encode_frame(tid: u16, unit_id: u8, pdu: &[u8]) -> Vec<u8> {
    let len = u16::try_from(pdu.len() + 1).unwrap_or(u16::MAX);
    let mut frame = Vec::with_capacity(MBAP_LEN + pdu.len());
    frame.extend_from_slice(&tid.to_be_bytes());
    frame.extend_from_slice(&0u16.to_be_bytes());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.push(unit_id);
    frame.extend_from_slice(pdu);
    frame
}

/// Validate an MBAP header and return the number of PDU bytes that follow.
fn check_header(header: &[u8; MBAP_LEN], tid: u16, unit_id: u8) -> Result<usize> {
    let rx_tid = u16::from_be_bytes([header[0], header[1]]);
    let proto = u16::from_be_bytes([header[2], header[3]]);
    let len = u16::from_be_bytes([header[4], header[5]]) as usize;
    if rx_tid != tid {
        return Err(HwError::Protocol(format!(
            "transaction id mismatch: sent {tid}, got {rx_tid}"
        )));
    }
    if proto != 0 {
        return Err(HwError::Protocol(format!("unexpected protocol id {proto}")));
    }
    if header[6] != unit_id {
        return Err(HwError::Protocol(format!(
            "unit id mismatch: sent {unit_id}, got {}",
            header[6]
        )));
    }
    if !(2..=254).contains(&len) {
        return Err(HwError::Protocol(format!("bad frame length {len}")));
    }
    Ok(len - 1)
}

fn check_function(sent: u8, body: &[u8]) -> Result<()> {
    match body.first() {
        Some(&fc) if fc == sent => Ok(()),
        Some(&fc) if fc == sent | 0x80 => Err(HwError::Exception {
            function: sent,
            code: body.get(1).copied().unwrap_or(0),
        }),
        Some(&fc) => Err(HwError::Protocol(format!(
            "function mismatch: sent 0x{sent:02x}, got 0x{fc:02x}"
        ))),
        None => Err(HwError::Protocol("empty response".into())),
    }
}

/// Decode a 0x03 response body into register words.
pub fn decode_read_response(body: &[u8], count: u16) -> Result<Vec<u16>> {
    let byte_count = *body
        .get(1)
        .ok_or_else(|| HwError::Protocol("missing byte count".into()))? as usize;
    let data = &body[2.min(body.len())..];
    if byte_count != data.len() || byte_count != usize::from(count) * 2 {
        return Err(HwError::Protocol(format!(
            "short read: expected {} bytes, header says {byte_count}, got {}",
            usize::from(count) * 2,
            data.len()
        )));
    }
    Ok(data
        .chunks_exact(2)
        .map(|w| u16::from_be_bytes([w[0], w[1]]))
        .collect())
}

impl RegisterBus for ModbusTcpBus {
    fn connect(&mut self) -> std::result::Result<(), BoxError> {
        self.stream = None;
        self.open().map_err(Into::into)
    }

    fn disconnect(&mut self) {
        self.stream = None;
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn read_holding_registers(
        &mut self,
        addr: u16,
        count: u16,
    ) -> std::result::Result<Vec<u16>, BoxError> {
        if count == 0 || count > MAX_READ_COUNT {
            return Err(HwError::Protocol(format!("read count {count} out of range")).into());
        }
        self.with_reset(|bus| {
            let mut pdu = vec![FC_READ_HOLDING];
            pdu.extend_from_slice(&addr.to_be_bytes());
            pdu.extend_from_slice(&count.to_be_bytes());
            let body = bus.transact(&pdu)?;
            decode_read_response(&body, count)
        })
        .map_err(Into::into)
    }

    fn write_single_register(&mut self, addr: u16, value: u16) -> std::result::Result<(), BoxError> {
        self.with_reset(|bus| {
            let mut pdu = vec![FC_WRITE_SINGLE];
            pdu.extend_from_slice(&addr.to_be_bytes());
            pdu.extend_from_slice(&value.to_be_bytes());
            let body = bus.transact(&pdu)?;
            if body != pdu {
                return Err(HwError::Protocol("write echo mismatch".into()));
            }
            Ok(())
        })
        .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_layout_matches_mbap() {
        let frame = encode_frame(0x0102, 7, &[FC_READ_HOLDING, 0x07, 0xD0, 0x00, 0x2A]);
        assert_eq!(
            frame,
            vec![0x01, 0x02, 0x00, 0x00, 0x00, 0x06, 0x07, 0x03, 0x07, 0xD0, 0x00, 0x2A]
        );
    }

    #[test]
    fn exception_response_is_typed() {
        let err = check_function(FC_WRITE_SINGLE, &[0x86, 0x02]).unwrap_err();
        match err {
            HwError::Exception { function, code } => {
                assert_eq!(function, FC_WRITE_SINGLE);
                assert_eq!(code, 2);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn short_read_is_rejected() {
        let err = decode_read_response(&[0x03, 0x04, 0x00, 0x01], 2).unwrap_err();
        assert!(err.to_string().contains("short read"));
    }

    #[test]
    fn header_checks_transaction_id() {
        let header = [0x00, 0x09, 0x00, 0x00, 0x00, 0x05, 0x01];
        assert!(check_header(&header, 9, 1).is_ok());
        assert!(check_header(&header, 10, 1).is_err());
    }
}
