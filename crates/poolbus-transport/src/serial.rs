//! RS-485 serial connection using the `serialport` crate.

use std::io::{Read, Write};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};

use crate::{Connection, ConnectionId, TransportError};

/// Serial line settings. The bus runs 9600 baud, 8N1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Device path, e.g. `/dev/ttyUSB0`.
    pub device: String,
    pub baud_rate: u32,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device: "/dev/ttyS0".to_string(),
            baud_rate: 9600,
            read_timeout: Duration::from_millis(100),
            write_timeout: Duration::from_millis(100),
        }
    }
}

impl SerialConfig {
    pub fn for_device(device: &str) -> Self {
        Self {
            device: device.to_string(),
            ..Default::default()
        }
    }
}

/// The part of a serial port a write needs: the byte sink and its
/// timeout.
trait TimedWriter: Write {
    fn set_timeout(&mut self, timeout: Duration) -> serialport::Result<()>;
}

impl TimedWriter for dyn SerialPort {
    fn set_timeout(&mut self, timeout: Duration) -> serialport::Result<()> {
        SerialPort::set_timeout(self, timeout)
    }
}

/// Writes `data` under `write_timeout`, then puts `read_timeout` back,
/// also when the write failed.
fn send<P: TimedWriter + ?Sized>(
    port: &mut P,
    data: &[u8],
    write_timeout: Duration,
    read_timeout: Duration,
) -> Result<(), TransportError> {
    port.set_timeout(write_timeout)?;
    let sent = port.write_all(data).and_then(|()| port.flush());
    port.set_timeout(read_timeout)?;
    sent.map_err(TransportError::SendFailed)
}

/// A [`Connection`] over a serial port.
pub struct SerialConnection {
    id: ConnectionId,
    config: SerialConfig,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialConnection {
    /// Creates the connection; the port is opened by
    /// [`open`](Connection::open).
    pub fn new(config: SerialConfig) -> Self {
        Self {
            id: ConnectionId::next(),
            config,
            port: None,
        }
    }

    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>, TransportError> {
        self.port
            .as_mut()
            .ok_or_else(|| TransportError::NotOpen(self.config.device.clone()))
    }
}

impl Connection for SerialConnection {
    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn open(&mut self) -> Result<(), TransportError> {
        let port = serialport::new(&self.config.device, self.config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(self.config.read_timeout)
            .open()?;
        tracing::info!(
            id = %self.id,
            device = %self.config.device,
            baud = self.config.baud_rate,
            "serial port opened"
        );
        self.port = Some(port);
        Ok(())
    }

    fn poll_read(&mut self) -> Result<Vec<u8>, TransportError> {
        let port = self.port()?;
        let waiting = port.bytes_to_read()? as usize;
        if waiting == 0 {
            return Ok(Vec::new());
        }

        let mut buf = vec![0u8; waiting];
        let n = port.read(&mut buf).map_err(TransportError::ReceiveFailed)?;
        buf.truncate(n);
        Ok(buf)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let (write_timeout, read_timeout) = (self.config.write_timeout, self.config.read_timeout);
        let port = self.port()?;
        send(&mut **port, data, write_timeout, read_timeout)?;
        Ok(data.len())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    const READ: Duration = Duration::from_millis(100);
    const WRITE: Duration = Duration::from_millis(250);

    #[derive(Default)]
    struct FakePort {
        timeouts: Vec<Duration>,
        written: Vec<u8>,
        fail_writes: bool,
    }

    impl Write for FakePort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.fail_writes {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "write timed out"));
            }
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl TimedWriter for FakePort {
        fn set_timeout(&mut self, timeout: Duration) -> serialport::Result<()> {
            self.timeouts.push(timeout);
            Ok(())
        }
    }

    #[test]
    fn test_send_switches_to_write_timeout_and_back() {
        let mut port = FakePort::default();
        send(&mut port, &[0xA5, 0x24], WRITE, READ).unwrap();
        assert_eq!(port.written, vec![0xA5, 0x24]);
        assert_eq!(port.timeouts, vec![WRITE, READ]);
    }

    #[test]
    fn test_failed_write_still_restores_read_timeout() {
        let mut port = FakePort {
            fail_writes: true,
            ..Default::default()
        };
        let err = send(&mut port, &[0xA5], WRITE, READ).unwrap_err();
        assert!(matches!(err, TransportError::SendFailed(_)));
        assert_eq!(port.timeouts.last(), Some(&READ));
    }

    #[test]
    fn test_write_before_open_is_not_open() {
        let mut conn = SerialConnection::new(SerialConfig::for_device("/dev/null-port"));
        assert!(matches!(conn.write(&[1]), Err(TransportError::NotOpen(_))));
        assert!(!conn.is_open());
    }
}
