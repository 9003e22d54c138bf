//! # Sick PLS Driver
//!
//! `sick_pls` is a host-side driver for SICK PLS-family laser range finders
//! attached over an RS-232/RS-422 serial link. It implements the PLS telegram
//! protocol: baud negotiation from an unknown power-on state, operating-mode
//! switches, continuous decoding of streamed scan telegrams into range
//! arrays, and clean teardown that returns the serial line to its power-on
//! configuration.

extern crate byteorder;
extern crate log;

pub mod base;
mod checksum;
mod cmds;
mod serial;
pub mod types;

pub use crate::base::{Error, Frame, Result};
pub use crate::types::{
    Baud, BaudStatus, DeviceError, MeasuringUnits, OperatingMode, OperatingStatus, ScanAngle,
    ScanProfile, ScanResolution, Status, SICK_MAX_NUM_MEASUREMENTS,
};

use crate::base::BufferMonitor;
use crate::cmds::*;
use crate::serial::SerialConnection;
use byteorder::{ByteOrder, LittleEndian};
use log::{error, trace, warn};
use std::thread;
use std::time::{Duration, Instant};

/// Mask selecting the 13-bit range magnitude of a measurement word. The top
/// three bits carry field/status flags.
const MEASUREMENT_RANGE_MASK: u16 = 0x1FFF;

/// Mask selecting the measurement count in the leading word of a scan
/// profile. The top two bits carry the unit and partial-scan flags.
const MEASUREMENT_COUNT_MASK: u16 = 0x3FFF;

/// Partial-scan flag in the leading word of a scan profile.
const COUNT_WORD_PARTIAL_SCAN_FLAG: u16 = 0x8000;

/// Timeout for the best-effort mode switch during teardown. Kept short so
/// `uninitialize` cannot hang for the full retry budget on a dead device.
const TEARDOWN_SWITCH_TIMEOUT: Duration = Duration::from_secs(2);

/// Represents a connection to and control interface for a Sick PLS device.
///
/// The driver owns the serial connection's write side and the background
/// buffer monitor that drains its read side. All public operations other
/// than [`SickPls::new`] and [`SickPls::device_path`] require the driver to
/// be initialized.
///
/// # Example
/// ```ignore
/// let mut sick = SickPls::new("/dev/ttyUSB0");
/// sick.initialize(Baud::B38400)?;
/// let mut values = [0u16; SICK_MAX_NUM_MEASUREMENTS as usize];
/// let count = sick.get_scan(&mut values)?;
/// sick.uninitialize()?;
/// ```
pub struct SickPls {
    device_path: String,
    session_baud: Baud,
    desired_baud: Baud,
    operating_status: OperatingStatus,
    baud_status: BaudStatus,
    device_status: Status,
    connection: Option<SerialConnection>,
    monitor: Option<BufferMonitor>,
    initialized: bool,
}

impl SickPls {
    /// Constructs a driver for the device at `device_path`.
    ///
    /// No I/O happens until [`SickPls::initialize`] is called.
    pub fn new(device_path: impl Into<String>) -> SickPls {
        SickPls {
            device_path: device_path.into(),
            session_baud: Baud::Unknown,
            desired_baud: Baud::Unknown,
            operating_status: OperatingStatus::default(),
            baud_status: BaudStatus::default(),
            device_status: Status::Unknown,
            connection: None,
            monitor: None,
            initialized: false,
        }
    }

    /// Path of the serial device this driver talks to.
    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    /// Brings the device into a streaming session at `desired_baud`.
    ///
    /// Opens the serial device, starts the buffer monitor, discovers the
    /// baud the device currently answers at (desired rate first, then the
    /// known rates in descending order), renegotiates to `desired_baud` if
    /// necessary, verifies the device reports the supported 180°/0.5°/cm
    /// configuration, and switches it into stream-values mode.
    ///
    /// On any failure the session is torn down and the driver stays
    /// uninitialized.
    pub fn initialize(&mut self, desired_baud: Baud) -> Result<()> {
        if self.initialized {
            return Err(Error::Config {
                description: "driver already initialized".to_owned(),
            });
        }
        if desired_baud.rate().is_none() {
            return Err(Error::Config {
                description: "unknown desired baud rate".to_owned(),
            });
        }

        trace!(
            "initializing {} at desired baud {}",
            self.device_path,
            desired_baud
        );
        self.setup_connection()?;

        match self.negotiate_and_configure(desired_baud) {
            Ok(()) => {
                self.initialized = true;
                trace!("initialization complete at {} baud", self.session_baud);
                Ok(())
            }
            Err(err) => {
                error!("initialization failed: {}", err);
                self.teardown_connection();
                Err(err)
            }
        }
    }

    /// Waits for the next streamed scan and copies its range values into
    /// `values`.
    ///
    /// Returns the number of measurements written. The driver must be
    /// initialized and in stream-values mode. Waits up to the message
    /// timeout per try, for the standard number of tries, before failing
    /// with a timeout; the driver stays initialized in that case.
    pub fn get_scan(&mut self, values: &mut [u16]) -> Result<usize> {
        self.ensure_initialized()?;
        if self.operating_status.operating_mode != OperatingMode::MonitorStreamValues {
            return Err(Error::Config {
                description: format!(
                    "device is not streaming (mode: {})",
                    self.operating_status.operating_mode
                ),
            });
        }

        let profile = self.grab_scan_profile()?;
        let count = profile.measurements.len();
        if values.len() < count {
            return Err(Error::Config {
                description: format!(
                    "caller buffer holds {} values, scan has {}",
                    values.len(),
                    count
                ),
            });
        }
        values[..count].copy_from_slice(&profile.measurements);
        Ok(count)
    }

    /// Waits for the next streamed scan and returns the decoded profile,
    /// indexing metadata and raw measurement words included.
    pub fn get_scan_profile(&mut self) -> Result<ScanProfile> {
        self.ensure_initialized()?;
        self.grab_scan_profile()
    }

    /// Queries the device status telegram and returns the decoded status.
    ///
    /// Also refreshes the stored operating and baud parameters.
    pub fn get_status(&mut self) -> Result<Status> {
        self.ensure_initialized()?;
        match self.request_status(SICK_PLS_MESSAGE_TIMEOUT, SICK_PLS_NUM_TRIES) {
            Ok(status) => Ok(status),
            Err(err) => Err(self.fail_if_fatal(err)),
        }
    }

    /// The device status from the most recent status query, as a string.
    pub fn get_status_as_string(&self) -> String {
        self.device_status.to_string()
    }

    /// Requests the device's error list and decodes it into type/number
    /// pairs.
    pub fn get_errors(&mut self) -> Result<Vec<DeviceError>> {
        self.ensure_initialized()?;
        let request = Frame::build(SICK_PLS_SICK_ADDRESS, &[SICK_PLS_CMD_REQUEST_ERRORS])?;
        let reply = match self.send_and_receive(
            &request,
            Some(SICK_PLS_ANS_ERRORS),
            SICK_PLS_MESSAGE_TIMEOUT,
            SICK_PLS_NUM_TRIES,
        ) {
            Ok(reply) => reply,
            Err(err) => return Err(self.fail_if_fatal(err)),
        };
        parse_error_list(reply.payload())
    }

    /// Scan angle currently reported by the device, in degrees.
    pub fn scan_angle(&self) -> f64 {
        ScanAngle::from_int(self.operating_status.scan_angle)
            .degrees()
            .unwrap_or(0.0)
    }

    /// Angular resolution currently reported by the device, in degrees.
    pub fn scan_resolution(&self) -> f64 {
        ScanResolution::from_int(self.operating_status.scan_resolution)
            .degrees()
            .unwrap_or(0.0)
    }

    /// Measuring units currently reported by the device.
    pub fn measuring_units(&self) -> MeasuringUnits {
        self.operating_status.measuring_units
    }

    /// Operating mode the driver last put the device into.
    pub fn operating_mode(&self) -> OperatingMode {
        self.operating_status.operating_mode
    }

    /// Baud configuration last reported by the device.
    pub fn baud_status(&self) -> BaudStatus {
        self.baud_status
    }

    /// Tears the session down and re-runs initialization at the same
    /// desired baud.
    pub fn reset(&mut self) -> Result<()> {
        self.ensure_initialized()?;
        let desired_baud = self.desired_baud;
        trace!("resetting session at {} baud", desired_baud);
        if let Err(err) = self.uninitialize() {
            warn!("teardown during reset failed: {}", err);
        }
        self.initialize(desired_baud)
    }

    /// Shuts the session down.
    ///
    /// Switches the device back to request-values mode (best-effort), stops
    /// the buffer monitor, flushes the serial buffers, restores the power-on
    /// line configuration, and closes the device. Idempotent: calling this
    /// on an uninitialized driver does nothing.
    pub fn uninitialize(&mut self) -> Result<()> {
        if !self.initialized {
            return Ok(());
        }
        trace!("uninitializing {}", self.device_path);

        // Best-effort: the ack needs the monitor, so this runs before the
        // monitor stops. A silent device only costs the short teardown
        // timeout.
        if let Err(err) = self.switch_mode_internal(
            OperatingMode::MonitorRequestValues,
            &[],
            TEARDOWN_SWITCH_TIMEOUT,
            1,
        ) {
            warn!("could not switch device back to request mode: {}", err);
        }

        let mut result = Ok(());
        if let Some(mut monitor) = self.monitor.take() {
            if let Err(err) = monitor.stop() {
                error!("failed to stop buffer monitor: {}", err);
                result = Err(err);
            }
        }
        if let Some(mut connection) = self.connection.take() {
            if let Err(err) = connection.flush_input().and_then(|_| connection.flush_output()) {
                warn!("flush during teardown failed: {}", err);
            }
            connection.close();
        }
        self.initialized = false;
        self.operating_status = OperatingStatus::default();
        self.session_baud = Baud::Unknown;
        result
    }

    /// Switches the operating mode of the device.
    ///
    /// Builds the mode-switch telegram (appending the installation password
    /// when entering installation mode), sends it, and checks the
    /// acknowledgement. On success the stored operating mode is updated.
    pub fn switch_operating_mode(&mut self, mode: OperatingMode, mode_params: &[u8]) -> Result<()> {
        self.ensure_initialized()?;
        match self.switch_mode_internal(mode, mode_params, SICK_PLS_MESSAGE_TIMEOUT, SICK_PLS_NUM_TRIES)
        {
            Ok(()) => Ok(()),
            Err(err) => Err(self.fail_if_fatal(err)),
        }
    }

    /// Opens the serial device and starts the buffer monitor.
    fn setup_connection(&mut self) -> Result<()> {
        let connection = SerialConnection::open(&self.device_path)?;
        let reader = connection.try_clone_reader()?;
        let monitor = BufferMonitor::start(reader)?;
        self.connection = Some(connection);
        self.monitor = Some(monitor);
        Ok(())
    }

    /// Stops the monitor and closes the serial device, ignoring errors.
    fn teardown_connection(&mut self) {
        if let Some(mut monitor) = self.monitor.take() {
            if let Err(err) = monitor.stop() {
                warn!("failed to stop buffer monitor during teardown: {}", err);
            }
        }
        if let Some(mut connection) = self.connection.take() {
            connection.close();
        }
        self.initialized = false;
    }

    /// Fatal I/O faults force the session down so the lifecycle lands in
    /// the uninitialized state at the operation boundary.
    fn fail_if_fatal(&mut self, err: Error) -> Error {
        if matches!(err, Error::Io(_)) {
            error!("fatal i/o fault, tearing session down: {}", err);
            self.teardown_connection();
        }
        err
    }

    /// Steps 2-6 of initialization: baud discovery, renegotiation,
    /// configuration validation, and the switch into streaming mode.
    fn negotiate_and_configure(&mut self, desired_baud: Baud) -> Result<()> {
        self.desired_baud = desired_baud;

        // Try the requested rate first, then fall back through the known
        // rates in descending order.
        let mut discovered = None;
        if self.test_baud(desired_baud)? {
            discovered = Some(desired_baud);
        } else {
            for baud in Baud::fallback_order() {
                if baud == desired_baud {
                    continue;
                }
                if self.test_baud(baud)? {
                    discovered = Some(baud);
                    break;
                }
            }
        }
        let session_baud = match discovered {
            Some(baud) => baud,
            None => {
                error!("could not reach device at any known baud rate");
                return Err(Error::Timeout);
            }
        };
        self.session_baud = session_baud;
        trace!("device answered at {} baud", session_baud);

        if session_baud != desired_baud {
            self.set_session_baud(desired_baud)?;
        }

        // The discovery probe already stored the device's parameters;
        // re-request here so a just-renegotiated session is also verified.
        self.request_status(SICK_PLS_MESSAGE_TIMEOUT, SICK_PLS_NUM_TRIES)?;
        self.validate_operating_status()?;

        self.switch_mode_internal(
            OperatingMode::MonitorStreamValues,
            &[],
            SICK_PLS_MESSAGE_TIMEOUT,
            SICK_PLS_NUM_TRIES,
        )
    }

    /// Tests communication at a particular baud rate.
    ///
    /// Re-speeds the local line, flushes stale input, and probes with a
    /// single status request. A timeout means "not this rate"; transport
    /// errors propagate.
    fn test_baud(&mut self, baud: Baud) -> Result<bool> {
        trace!("testing communication at {} baud", baud);
        self.set_terminal_baud(baud)?;

        match self.request_status(SICK_PLS_MESSAGE_TIMEOUT, 1) {
            Ok(_) => Ok(true),
            Err(Error::Timeout) => {
                trace!("no answer at {} baud", baud);
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// Commands the device onto `baud` and follows it in lock-step.
    ///
    /// The device acknowledges at the old rate; only then is the local line
    /// re-sped, and the new session is verified with a status request.
    fn set_session_baud(&mut self, baud: Baud) -> Result<()> {
        trace!("switching session from {} to {} baud", self.session_baud, baud);
        let request = Frame::build(
            SICK_PLS_SICK_ADDRESS,
            &[SICK_PLS_CMD_SET_BAUD, baud.code()],
        )?;
        let reply = self.send_and_receive(
            &request,
            Some(SICK_PLS_ANS_MODE_ACK),
            SICK_PLS_MESSAGE_TIMEOUT,
            SICK_PLS_NUM_TRIES,
        )?;
        check_mode_ack(&reply, "set baud")?;

        self.set_terminal_baud(baud)?;

        // Verify both sides actually moved.
        if self.request_status(SICK_PLS_MESSAGE_TIMEOUT, SICK_PLS_NUM_TRIES).is_err() {
            return Err(Error::Config {
                description: format!("device unreachable after switching to {} baud", baud),
            });
        }
        Ok(())
    }

    /// Re-speeds the local serial line and records the session baud.
    fn set_terminal_baud(&mut self, baud: Baud) -> Result<()> {
        let rate = baud.rate().ok_or_else(|| Error::Config {
            description: "unknown baud rate".to_owned(),
        })?;
        let connection = self.connection_mut()?;
        connection.set_baud(rate)?;
        connection.flush_input()?;
        self.session_baud = baud;
        Ok(())
    }

    /// Rejects any device configuration other than 180°/0.5°/cm.
    fn validate_operating_status(&self) -> Result<()> {
        let status = &self.operating_status;
        if ScanAngle::from_int(status.scan_angle) != ScanAngle::Angle180 {
            return Err(Error::Config {
                description: format!("unsupported scan angle: {} deg", status.scan_angle),
            });
        }
        if ScanResolution::from_int(status.scan_resolution) != ScanResolution::Res50 {
            return Err(Error::Config {
                description: format!(
                    "unsupported scan resolution: {}/100 deg",
                    status.scan_resolution
                ),
            });
        }
        if status.measuring_units != MeasuringUnits::Cm {
            return Err(Error::Config {
                description: format!("unsupported measuring units: {}", status.measuring_units),
            });
        }
        Ok(())
    }

    /// Issues a status request and stores the decoded reply.
    fn request_status(&mut self, timeout: Duration, num_tries: usize) -> Result<Status> {
        let request = Frame::build(SICK_PLS_SICK_ADDRESS, &[SICK_PLS_CMD_REQUEST_STATUS])?;
        let reply = self.send_and_receive(
            &request,
            Some(SICK_PLS_ANS_STATUS),
            timeout,
            num_tries,
        )?;

        let (operating_status, baud_status, device_status) = parse_status_payload(reply.payload())?;
        self.operating_status = operating_status;
        self.baud_status = baud_status;
        self.device_status = device_status;
        trace!(
            "device status: {} ({} deg / {}/100 deg / {})",
            device_status,
            operating_status.scan_angle,
            operating_status.scan_resolution,
            operating_status.measuring_units
        );
        Ok(device_status)
    }

    /// Sends the mode-switch telegram and checks the acknowledgement.
    fn switch_mode_internal(
        &mut self,
        mode: OperatingMode,
        mode_params: &[u8],
        timeout: Duration,
        num_tries: usize,
    ) -> Result<()> {
        let mut payload = Vec::with_capacity(2 + mode_params.len() + SICK_PLS_PASSWORD.len());
        payload.push(SICK_PLS_CMD_SWITCH_OPERATING_MODE);
        payload.push(mode.to_byte());
        payload.extend_from_slice(mode_params);
        if mode == OperatingMode::Installation {
            payload.extend_from_slice(SICK_PLS_PASSWORD);
        }

        let request = Frame::build(SICK_PLS_SICK_ADDRESS, &payload)?;
        trace!("switching operating mode to {}", mode);
        let reply = self.send_and_receive(
            &request,
            Some(SICK_PLS_ANS_MODE_ACK),
            timeout,
            num_tries,
        )?;
        check_mode_ack(&reply, "switch operating mode")?;

        self.operating_status.operating_mode = mode;
        Ok(())
    }

    /// Sends a request and waits for the matching reply, using the 0x80 rule.
    ///
    /// Per attempt: consume any stale frame from the mailbox, write the
    /// request with paced bytes, then poll the mailbox until `timeout`
    /// elapses. A frame is accepted iff it is addressed to the host (0x80)
    /// and, when `reply_code` is given, carries that command code; anything
    /// else is discarded as unrelated streaming data. Exhausting all tries
    /// fails with a timeout; transport errors fail immediately.
    fn send_and_receive(
        &mut self,
        request: &Frame,
        reply_code: Option<u8>,
        timeout: Duration,
        num_tries: usize,
    ) -> Result<Frame> {
        let raw = request.to_bytes();

        for attempt in 1..=num_tries {
            {
                let monitor = match &self.monitor {
                    Some(monitor) => monitor,
                    None => {
                        return Err(Error::Config {
                            description: "driver not initialized".to_owned(),
                        })
                    }
                };
                monitor.mailbox().flush();
            }

            self.connection_mut()?.write_paced(&raw)?;
            trace!(
                "sent request {:02X} (attempt {}/{})",
                request.command_code(),
                attempt,
                num_tries
            );

            let monitor = match &self.monitor {
                Some(monitor) => monitor,
                None => {
                    return Err(Error::Config {
                        description: "driver not initialized".to_owned(),
                    })
                }
            };
            let deadline = Instant::now() + timeout;
            while Instant::now() < deadline {
                if let Some(reply) = monitor.mailbox().take() {
                    if reply.dest_address() != SICK_PLS_HOST_ADDRESS {
                        trace!(
                            "discarding frame not addressed to host: dest={:02X}",
                            reply.dest_address()
                        );
                        continue;
                    }
                    match reply_code {
                        Some(code) if reply.command_code() != code => {
                            trace!(
                                "discarding unrelated reply {:02X} (waiting for {:02X})",
                                reply.command_code(),
                                code
                            );
                            continue;
                        }
                        _ => {
                            trace!("received reply {:02X}", reply.command_code());
                            return Ok(reply);
                        }
                    }
                }
                thread::sleep(SICK_PLS_POLL_INTERVAL);
            }
            warn!(
                "no reply to request {:02X} within {:?} (attempt {}/{})",
                request.command_code(),
                timeout,
                attempt,
                num_tries
            );
        }

        Err(Error::Timeout)
    }

    /// Waits for the next fresh scan-profile telegram and decodes it.
    fn grab_scan_profile(&mut self) -> Result<ScanProfile> {
        let monitor = match &self.monitor {
            Some(monitor) => monitor,
            None => {
                return Err(Error::Config {
                    description: "driver not initialized".to_owned(),
                })
            }
        };

        for attempt in 1..=SICK_PLS_NUM_TRIES {
            let deadline = Instant::now() + SICK_PLS_MESSAGE_TIMEOUT;
            while Instant::now() < deadline {
                if let Some(frame) = monitor.mailbox().take() {
                    if frame.dest_address() != SICK_PLS_HOST_ADDRESS
                        || frame.command_code() != SICK_PLS_ANS_SCAN_PROFILE
                    {
                        trace!(
                            "discarding non-scan frame: dest={:02X}, code={:02X}",
                            frame.dest_address(),
                            frame.command_code()
                        );
                        continue;
                    }
                    let profile = parse_scan_profile(frame.payload())?;
                    validate_profile_count(
                        &profile,
                        expected_measurement_count(&self.operating_status),
                    )?;
                    return Ok(profile);
                }
                thread::sleep(SICK_PLS_POLL_INTERVAL);
            }
            warn!(
                "no scan telegram within {:?} (attempt {}/{})",
                SICK_PLS_MESSAGE_TIMEOUT, attempt, SICK_PLS_NUM_TRIES
            );
        }

        Err(Error::Timeout)
    }

    fn connection_mut(&mut self) -> Result<&mut SerialConnection> {
        self.connection.as_mut().ok_or_else(|| Error::Config {
            description: "driver not initialized".to_owned(),
        })
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(Error::Config {
                description: "driver not initialized".to_owned(),
            })
        }
    }
}

impl Drop for SickPls {
    fn drop(&mut self) {
        if self.initialized {
            if let Err(err) = self.uninitialize() {
                warn!("error uninitializing driver during drop: {}", err);
            }
        }
    }
}

/// A full scan must carry exactly the measurement count the configuration
/// implies; a profile flagged as a partial scan may carry fewer.
fn validate_profile_count(profile: &ScanProfile, expected: usize) -> Result<()> {
    if profile.partial_scan || profile.measurements.len() == expected {
        Ok(())
    } else {
        Err(Error::Protocol {
            description: format!(
                "scan carries {} measurements, configuration implies {}",
                profile.measurements.len(),
                expected
            ),
        })
    }
}

/// Measurements one scan should carry for the stored configuration.
fn expected_measurement_count(status: &OperatingStatus) -> usize {
    let (Some(angle), Some(resolution)) = (
        ScanAngle::from_int(status.scan_angle).degrees(),
        ScanResolution::from_int(status.scan_resolution).degrees(),
    ) else {
        return 0;
    };
    (angle / resolution) as usize + 1
}

/// Checks the acknowledgement byte of a 0xA0 reply.
fn check_mode_ack(reply: &Frame, operation: &str) -> Result<()> {
    match reply.payload().get(1) {
        Some(&SICK_PLS_MODE_ACK_OK) => Ok(()),
        Some(&ack) => Err(Error::Config {
            description: format!("device refused {}: ack {:02X}", operation, ack),
        }),
        None => Err(Error::Protocol {
            description: format!("truncated acknowledgement to {}", operation),
        }),
    }
}

/// Decodes the payload of a status reply (0x90).
///
/// Layout after the reply code: scan angle (deg, u16), angular resolution
/// (1/100 deg, u16), motor revolutions (u16), operating mode, laser flag,
/// measuring units, device address, reported baud (u16), permanent-baud
/// flag, and the status byte last.
fn parse_status_payload(payload: &[u8]) -> Result<(OperatingStatus, BaudStatus, Status)> {
    const STATUS_PAYLOAD_LEN: usize = 15;
    if payload.len() < STATUS_PAYLOAD_LEN {
        return Err(Error::Protocol {
            description: format!("status reply too short: {} bytes", payload.len()),
        });
    }

    let operating_status = OperatingStatus {
        scan_angle: LittleEndian::read_u16(&payload[1..3]),
        scan_resolution: LittleEndian::read_u16(&payload[3..5]),
        num_motor_revs: LittleEndian::read_u16(&payload[5..7]),
        operating_mode: OperatingMode::from_byte(payload[7]),
        laser_mode: payload[8],
        measuring_units: MeasuringUnits::from_byte(payload[9]),
        address: payload[10],
    };
    let baud_status = BaudStatus {
        baud_rate: LittleEndian::read_u16(&payload[11..13]),
        permanent: payload[13] != 0,
    };
    let device_status = Status::from_byte(payload[payload.len() - 1]);

    Ok((operating_status, baud_status, device_status))
}

/// Decodes the payload of a scan-profile reply (0xB0).
///
/// The word after the reply code carries the measurement count in its low
/// 14 bits (unit and partial-scan flags on top), followed by the 16-bit
/// measurement words and the trailer: telegram index, an optional real-time
/// scan index, and the partial-scan index.
fn parse_scan_profile(payload: &[u8]) -> Result<ScanProfile> {
    if payload.len() < 3 {
        return Err(Error::Protocol {
            description: format!("scan profile too short: {} bytes", payload.len()),
        });
    }

    let count_word = LittleEndian::read_u16(&payload[1..3]);
    let num_measurements = count_word & MEASUREMENT_COUNT_MASK;
    if num_measurements > SICK_MAX_NUM_MEASUREMENTS {
        return Err(Error::Config {
            description: format!("measurement count out of range: {}", num_measurements),
        });
    }

    let values_end = 3 + 2 * usize::from(num_measurements);
    if payload.len() < values_end {
        return Err(Error::Protocol {
            description: format!(
                "scan profile truncated: {} measurements but {} payload bytes",
                num_measurements,
                payload.len()
            ),
        });
    }

    let (measurements, raw_words) =
        extract_measurement_values(&payload[3..values_end], num_measurements);

    let trailer = &payload[values_end..];
    if trailer.len() < 2 {
        return Err(Error::Protocol {
            description: "scan profile trailer truncated".to_owned(),
        });
    }
    let (real_time_scan_index, partial_scan_index) = match trailer.len() {
        2 => (None, trailer[1]),
        _ => (Some(trailer[1]), trailer[2]),
    };

    Ok(ScanProfile {
        partial_scan: count_word & COUNT_WORD_PARTIAL_SCAN_FLAG != 0,
        measurements,
        raw_words,
        telegram_index: trailer[0],
        real_time_scan_index,
        partial_scan_index,
    })
}

/// Extracts measurement words, returning the masked 13-bit ranges alongside
/// the untouched words.
fn extract_measurement_values(bytes: &[u8], num_measurements: u16) -> (Vec<u16>, Vec<u16>) {
    let count = usize::from(num_measurements);
    let mut measurements = Vec::with_capacity(count);
    let mut raw_words = Vec::with_capacity(count);
    for i in 0..count {
        let word = LittleEndian::read_u16(&bytes[2 * i..2 * i + 2]);
        raw_words.push(word);
        measurements.push(word & MEASUREMENT_RANGE_MASK);
    }
    (measurements, raw_words)
}

/// Decodes the payload of an error-list reply (0x9B): (type, number) pairs
/// between the reply code and the trailing status byte.
fn parse_error_list(payload: &[u8]) -> Result<Vec<DeviceError>> {
    if payload.len() < 2 {
        return Err(Error::Protocol {
            description: format!("error list too short: {} bytes", payload.len()),
        });
    }
    let pairs = &payload[1..payload.len() - 1];
    if pairs.len() % 2 != 0 {
        return Err(Error::Protocol {
            description: "ragged error list".to_owned(),
        });
    }

    Ok(pairs
        .chunks_exact(2)
        .map(|pair| DeviceError {
            error_type: pair[0],
            error_num: pair[1],
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_payload(
        angle: u16,
        resolution: u16,
        mode: u8,
        units: u8,
        baud: u16,
        status: u8,
    ) -> Vec<u8> {
        let mut payload = vec![SICK_PLS_ANS_STATUS];
        payload.extend_from_slice(&angle.to_le_bytes());
        payload.extend_from_slice(&resolution.to_le_bytes());
        payload.extend_from_slice(&0u16.to_le_bytes()); // motor revs
        payload.push(mode);
        payload.push(0x01); // laser on
        payload.push(units);
        payload.push(0x00); // device address
        payload.extend_from_slice(&baud.to_le_bytes());
        payload.push(0x00); // not permanent
        payload.push(status);
        payload
    }

    fn scan_payload(values: &[u16], trailer: &[u8]) -> Vec<u8> {
        let mut payload = vec![SICK_PLS_ANS_SCAN_PROFILE];
        payload.extend_from_slice(&(values.len() as u16).to_le_bytes());
        for value in values {
            payload.extend_from_slice(&value.to_le_bytes());
        }
        payload.extend_from_slice(trailer);
        payload
    }

    #[test]
    fn status_payload_decodes() {
        let payload = status_payload(180, 50, 0x25, 0x00, 9600, 0x00);
        let (operating, baud, status) = parse_status_payload(&payload).unwrap();

        assert_eq!(operating.scan_angle, 180);
        assert_eq!(operating.scan_resolution, 50);
        assert_eq!(operating.operating_mode, OperatingMode::MonitorRequestValues);
        assert_eq!(operating.measuring_units, MeasuringUnits::Cm);
        assert_eq!(baud.baud_rate, 9600);
        assert!(!baud.permanent);
        assert_eq!(status, Status::Ok);
    }

    #[test]
    fn short_status_payload_is_a_protocol_error() {
        assert!(matches!(
            parse_status_payload(&[SICK_PLS_ANS_STATUS, 0x00]),
            Err(Error::Protocol { .. })
        ));
    }

    #[test]
    fn scan_profile_decodes_and_masks() {
        // 0xE064: flag bits set on a 100 cm reading.
        let payload = scan_payload(&[100, 0xE064, 0x1FFF], &[7, 3, 1]);
        let profile = parse_scan_profile(&payload).unwrap();

        assert_eq!(profile.measurements, vec![100, 0x0064, 0x1FFF]);
        assert_eq!(profile.raw_words, vec![100, 0xE064, 0x1FFF]);
        assert!(!profile.partial_scan);
        assert_eq!(profile.telegram_index, 7);
        assert_eq!(profile.real_time_scan_index, Some(3));
        assert_eq!(profile.partial_scan_index, 1);
    }

    #[test]
    fn scan_profile_without_real_time_index() {
        let payload = scan_payload(&[100; 361], &[42, 0]);
        let profile = parse_scan_profile(&payload).unwrap();

        assert_eq!(profile.measurements.len(), 361);
        assert!(profile.measurements.iter().all(|&v| v == 100));
        assert_eq!(profile.telegram_index, 42);
        assert_eq!(profile.real_time_scan_index, None);
        assert_eq!(profile.partial_scan_index, 0);
    }

    #[test]
    fn scan_profile_count_bounds() {
        let empty = scan_payload(&[], &[0, 0]);
        assert_eq!(parse_scan_profile(&empty).unwrap().measurements.len(), 0);

        let max = scan_payload(&vec![1u16; 721], &[0, 0]);
        assert_eq!(parse_scan_profile(&max).unwrap().measurements.len(), 721);

        let mut over = vec![SICK_PLS_ANS_SCAN_PROFILE];
        over.extend_from_slice(&722u16.to_le_bytes());
        assert!(matches!(
            parse_scan_profile(&over),
            Err(Error::Config { .. })
        ));
    }

    #[test]
    fn truncated_scan_profile_is_a_protocol_error() {
        // Count word says two measurements, but only one is present.
        let payload = vec![SICK_PLS_ANS_SCAN_PROFILE, 0x02, 0x00, 0x64, 0x00];
        assert!(matches!(
            parse_scan_profile(&payload),
            Err(Error::Protocol { .. })
        ));
    }

    #[test]
    fn count_word_flags_do_not_inflate_the_count() {
        // Top two bits of the count word are unit/partial-scan flags.
        let mut payload = vec![SICK_PLS_ANS_SCAN_PROFILE];
        payload.extend_from_slice(&(0xC001u16).to_le_bytes());
        payload.extend_from_slice(&100u16.to_le_bytes());
        payload.extend_from_slice(&[9, 4]);

        let profile = parse_scan_profile(&payload).unwrap();
        assert_eq!(profile.measurements, vec![100]);
        assert!(profile.partial_scan);
        assert_eq!(profile.telegram_index, 9);
        assert_eq!(profile.partial_scan_index, 4);
    }

    #[test]
    fn full_scan_count_mismatch_is_a_protocol_error() {
        let full = parse_scan_profile(&scan_payload(&[100; 361], &[0, 0])).unwrap();
        assert!(validate_profile_count(&full, 361).is_ok());

        let short = parse_scan_profile(&scan_payload(&[100; 180], &[0, 0])).unwrap();
        assert!(matches!(
            validate_profile_count(&short, 361),
            Err(Error::Protocol { .. })
        ));

        // The partial-scan flag is the one sanctioned way to deliver fewer
        // measurements than the configuration implies.
        let mut payload = vec![SICK_PLS_ANS_SCAN_PROFILE];
        payload.extend_from_slice(&(COUNT_WORD_PARTIAL_SCAN_FLAG | 180).to_le_bytes());
        for _ in 0..180 {
            payload.extend_from_slice(&100u16.to_le_bytes());
        }
        payload.extend_from_slice(&[1, 2]);
        let partial = parse_scan_profile(&payload).unwrap();
        assert!(partial.partial_scan);
        assert!(validate_profile_count(&partial, 361).is_ok());
    }

    #[test]
    fn error_list_decodes() {
        let payload = vec![SICK_PLS_ANS_ERRORS, 0x01, 0x23, 0x04, 0x56, 0x00];
        let errors = parse_error_list(&payload).unwrap();
        assert_eq!(
            errors,
            vec![
                DeviceError {
                    error_type: 0x01,
                    error_num: 0x23
                },
                DeviceError {
                    error_type: 0x04,
                    error_num: 0x56
                },
            ]
        );

        let empty = vec![SICK_PLS_ANS_ERRORS, 0x00];
        assert!(parse_error_list(&empty).unwrap().is_empty());

        let ragged = vec![SICK_PLS_ANS_ERRORS, 0x01, 0x00];
        assert!(matches!(
            parse_error_list(&ragged),
            Err(Error::Protocol { .. })
        ));
    }

    #[test]
    fn mode_ack_checking() {
        let ok = Frame::build(SICK_PLS_HOST_ADDRESS, &[SICK_PLS_ANS_MODE_ACK, 0x00, 0x00]).unwrap();
        assert!(check_mode_ack(&ok, "test").is_ok());

        let refused =
            Frame::build(SICK_PLS_HOST_ADDRESS, &[SICK_PLS_ANS_MODE_ACK, 0x01, 0x00]).unwrap();
        assert!(matches!(
            check_mode_ack(&refused, "test"),
            Err(Error::Config { .. })
        ));

        let truncated = Frame::build(SICK_PLS_HOST_ADDRESS, &[SICK_PLS_ANS_MODE_ACK]).unwrap();
        assert!(matches!(
            check_mode_ack(&truncated, "test"),
            Err(Error::Protocol { .. })
        ));
    }

    #[test]
    fn expected_count_for_supported_configuration() {
        let status = OperatingStatus {
            scan_angle: 180,
            scan_resolution: 50,
            ..OperatingStatus::default()
        };
        assert_eq!(expected_measurement_count(&status), 361);
        assert_eq!(expected_measurement_count(&OperatingStatus::default()), 0);
    }

    #[test]
    fn operations_require_initialization() {
        let mut sick = SickPls::new("/dev/null");
        assert_eq!(sick.device_path(), "/dev/null");

        let mut values = [0u16; 16];
        assert!(matches!(
            sick.get_scan(&mut values),
            Err(Error::Config { .. })
        ));
        assert!(matches!(sick.get_status(), Err(Error::Config { .. })));
        assert!(matches!(sick.get_errors(), Err(Error::Config { .. })));
        assert!(matches!(sick.reset(), Err(Error::Config { .. })));
        assert!(matches!(
            sick.switch_operating_mode(OperatingMode::Diagnostic, &[]),
            Err(Error::Config { .. })
        ));

        // Uninitialize is idempotent even before the first initialize.
        assert!(sick.uninitialize().is_ok());
        assert_eq!(sick.operating_mode(), OperatingMode::Unknown);
        assert_eq!(sick.scan_angle(), 0.0);
        assert_eq!(sick.scan_resolution(), 0.0);
    }

    #[test]
    fn initialize_rejects_unknown_baud() {
        let mut sick = SickPls::new("/dev/null");
        assert!(matches!(
            sick.initialize(Baud::Unknown),
            Err(Error::Config { .. })
        ));
    }
}
