use crate::base::{Error, Result};
use crate::cmds::SICK_PLS_BYTE_INTERVAL;
use log::{trace, warn};
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::thread;
use std::time::Duration;

/// Baud rate the device falls back to when power is switched on.
const POWER_ON_BAUD: u32 = 9_600;

/// Read timeout standing in for pure non-blocking reads: long enough that
/// the monitor isn't spinning on an empty descriptor, short enough that a
/// stop request is honored within a poll interval.
const READ_TIMEOUT: Duration = Duration::from_millis(1);

/// Owns the serial connection to the device.
///
/// Configures the line raw 8N1 with no flow control, changes speed for baud
/// negotiation, and paces writes with the inter-byte gap the device's UART
/// requires. The write side stays with this facade; the read side is handed
/// to the buffer monitor through [`SerialConnection::try_clone_reader`].
pub struct SerialConnection {
    port: Option<Box<dyn SerialPort>>,
    path: String,
}

impl SerialConnection {
    /// Opens the serial device raw 8N1 at the power-on default baud.
    pub fn open(path: &str) -> Result<SerialConnection> {
        let port = serialport::new(path, POWER_ON_BAUD)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(READ_TIMEOUT)
            .open()?;

        trace!("opened serial device {} at {} baud", path, POWER_ON_BAUD);
        Ok(SerialConnection {
            port: Some(port),
            path: path.to_owned(),
        })
    }

    fn port(&self) -> Result<&dyn SerialPort> {
        match &self.port {
            Some(port) => Ok(port.as_ref()),
            None => Err(Error::Io(std::io::Error::other("serial device closed"))),
        }
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn SerialPort>> {
        match &mut self.port {
            Some(port) => Ok(port),
            None => Err(Error::Io(std::io::Error::other("serial device closed"))),
        }
    }

    /// Clones a second handle onto the device for the buffer monitor's
    /// read side.
    pub fn try_clone_reader(&self) -> Result<Box<dyn SerialPort>> {
        Ok(self.port()?.try_clone()?)
    }

    /// Sets input and output line speed.
    pub fn set_baud(&mut self, baud: u32) -> Result<()> {
        self.port_mut()?.set_baud_rate(baud)?;
        trace!("serial line re-sped to {} baud", baud);
        Ok(())
    }

    /// Discards bytes pending in the receive buffer.
    pub fn flush_input(&self) -> Result<()> {
        self.port()?.clear(ClearBuffer::Input)?;
        Ok(())
    }

    /// Discards bytes queued in the transmit buffer.
    pub fn flush_output(&self) -> Result<()> {
        self.port()?.clear(ClearBuffer::Output)?;
        Ok(())
    }

    /// Writes `bytes` one at a time with a minimum 55 µs inter-byte gap.
    ///
    /// The gap is required by the device's UART at low baud rates; writing
    /// the buffer in one burst corrupts its receive path on some hardware.
    pub fn write_paced(&mut self, bytes: &[u8]) -> Result<()> {
        let port = self.port_mut()?;
        for byte in bytes {
            port.write_all(std::slice::from_ref(byte))?;
            thread::sleep(SICK_PLS_BYTE_INTERVAL);
        }
        port.flush()?;
        trace!("wrote {} paced bytes", bytes.len());
        Ok(())
    }

    /// Restores the power-on line configuration and releases the device.
    ///
    /// Idempotent: closing an already-closed connection does nothing.
    pub fn close(&mut self) {
        if let Some(mut port) = self.port.take() {
            if let Err(err) = port.set_baud_rate(POWER_ON_BAUD) {
                warn!("could not restore serial line speed on close: {}", err);
            }
            let _ = port.clear(ClearBuffer::All);
            trace!("closed serial device {}", self.path);
        }
    }
}

impl Drop for SerialConnection {
    fn drop(&mut self) {
        self.close();
    }
}
