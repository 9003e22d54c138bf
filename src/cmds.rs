// Telegram codes and session constants for the Sick PLS.

/// Start-of-frame byte. Every telegram on the wire begins with it.
pub const SICK_PLS_STX: u8 = 0x02;

/// Serial address the device uses when replying to the host.
pub const SICK_PLS_HOST_ADDRESS: u8 = 0x80;

/// Default serial address of the device itself (destination of host telegrams).
pub const SICK_PLS_SICK_ADDRESS: u8 = 0x00;

/// Password required when switching the device into installation mode.
pub const SICK_PLS_PASSWORD: &[u8] = b"SICK_PLS";

// Requests (host -> device)

/// Command code to switch the operating mode of the device.
pub const SICK_PLS_CMD_SWITCH_OPERATING_MODE: u8 = 0x20;

/// Command code to change the session baud rate (installation command family).
pub const SICK_PLS_CMD_SET_BAUD: u8 = 0x30;

/// Command code to request the device status telegram.
pub const SICK_PLS_CMD_REQUEST_STATUS: u8 = 0x31;

/// Command code to request the device's error list.
pub const SICK_PLS_CMD_REQUEST_ERRORS: u8 = 0x3B;

// Replies (device -> host)

/// Reply code carrying the device status telegram.
pub const SICK_PLS_ANS_STATUS: u8 = 0x90;

/// Reply code carrying the error list.
pub const SICK_PLS_ANS_ERRORS: u8 = 0x9B;

/// Acknowledgement reply to mode-switch and set-baud telegrams.
/// The byte following the reply code is 0x00 on success.
pub const SICK_PLS_ANS_MODE_ACK: u8 = 0xA0;

/// Reply code carrying one scan profile (monitor mode).
pub const SICK_PLS_ANS_SCAN_PROFILE: u8 = 0xB0;

/// Acknowledgement byte indicating the device accepted a mode switch.
pub const SICK_PLS_MODE_ACK_OK: u8 = 0x00;

// Frame geometry

/// Frame header length in bytes: STX, address, 16-bit payload length.
pub const SICK_PLS_MSG_HEADER_LEN: usize = 4;

/// Maximum payload length in bytes.
pub const SICK_PLS_MSG_PAYLOAD_MAX_LEN: usize = 812;

/// Frame trailer length in bytes (CRC-16, little-endian).
pub const SICK_PLS_MSG_TRAILER_LEN: usize = 2;

/// Largest possible wire frame.
pub const SICK_PLS_MSG_MAX_LEN: usize =
    SICK_PLS_MSG_HEADER_LEN + SICK_PLS_MSG_PAYLOAD_MAX_LEN + SICK_PLS_MSG_TRAILER_LEN;

// Session discipline

/// The max time to wait for a reply to any telegram (the device can be slow
/// to answer configuration commands).
pub const SICK_PLS_MESSAGE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(20);

/// The max number of tries before giving up on a request.
pub const SICK_PLS_NUM_TRIES: usize = 3;

/// Minimum time between transmitted bytes. Required by the device's UART at
/// low baud rates.
pub const SICK_PLS_BYTE_INTERVAL: std::time::Duration = std::time::Duration::from_micros(55);

/// Poll granularity while waiting on the mailbox.
pub const SICK_PLS_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(1);
