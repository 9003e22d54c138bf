use std::fmt;

/// Maximum number of measurements one scan profile can carry.
pub const SICK_MAX_NUM_MEASUREMENTS: u16 = 721;

/// Baud rates the device supports, by their wire codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Baud {
    /// 9600 baud (the power-on default).
    B9600,
    /// 19200 baud.
    B19200,
    /// 38400 baud.
    B38400,
    /// 500000 baud (RS-422 only).
    B500K,
    /// Unknown baud rate.
    Unknown,
}

impl Baud {
    /// The code carried in the set-baud telegram.
    pub fn code(self) -> u8 {
        match self {
            Baud::B9600 => 0x42,
            Baud::B19200 => 0x41,
            Baud::B38400 => 0x40,
            Baud::B500K => 0x48,
            Baud::Unknown => 0xFF,
        }
    }

    /// The line speed in bits per second, or `None` for the unknown sentinel.
    pub fn rate(self) -> Option<u32> {
        match self {
            Baud::B9600 => Some(9_600),
            Baud::B19200 => Some(19_200),
            Baud::B38400 => Some(38_400),
            Baud::B500K => Some(500_000),
            Baud::Unknown => None,
        }
    }

    /// Converts an integer baud rate to its enum value.
    pub fn from_rate(rate: u32) -> Baud {
        match rate {
            9_600 => Baud::B9600,
            19_200 => Baud::B19200,
            38_400 => Baud::B38400,
            500_000 => Baud::B500K,
            _ => Baud::Unknown,
        }
    }

    /// Converts a wire code to its enum value.
    pub fn from_code(code: u8) -> Baud {
        match code {
            0x42 => Baud::B9600,
            0x41 => Baud::B19200,
            0x40 => Baud::B38400,
            0x48 => Baud::B500K,
            _ => Baud::Unknown,
        }
    }

    /// Converts a human baud string (e.g. `"38400"`) to its enum value.
    pub fn from_string(baud: &str) -> Baud {
        match baud {
            "9600" => Baud::B9600,
            "19200" => Baud::B19200,
            "38400" => Baud::B38400,
            "500000" | "500K" => Baud::B500K,
            _ => Baud::Unknown,
        }
    }

    /// The rates tried during baud discovery, fastest first.
    pub fn fallback_order() -> [Baud; 4] {
        [Baud::B500K, Baud::B38400, Baud::B19200, Baud::B9600]
    }
}

impl fmt::Display for Baud {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Baud::B9600 => write!(f, "9600"),
            Baud::B19200 => write!(f, "19200"),
            Baud::B38400 => write!(f, "38400"),
            Baud::B500K => write!(f, "500000"),
            Baud::Unknown => write!(f, "unknown"),
        }
    }
}

/// Scan angle of the device. The PLS only does 180 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanAngle {
    /// Scanning angle of 180 degrees.
    Angle180,
    /// Unknown scanning angle.
    Unknown,
}

impl ScanAngle {
    /// Converts a reported angle in degrees to its enum value.
    pub fn from_int(angle: u16) -> ScanAngle {
        match angle {
            180 => ScanAngle::Angle180,
            _ => ScanAngle::Unknown,
        }
    }

    /// The angle in degrees, or `None` for the unknown sentinel.
    pub fn degrees(self) -> Option<f64> {
        match self {
            ScanAngle::Angle180 => Some(180.0),
            ScanAngle::Unknown => None,
        }
    }
}

/// Angular resolution of the device. The PLS only does 0.5 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanResolution {
    /// 0.50 degree angular resolution.
    Res50,
    /// Unknown angular resolution.
    Unknown,
}

impl ScanResolution {
    /// Converts a reported resolution in 1/100 degrees to its enum value.
    pub fn from_int(hundredths: u16) -> ScanResolution {
        match hundredths {
            50 => ScanResolution::Res50,
            _ => ScanResolution::Unknown,
        }
    }

    /// Converts a resolution in degrees to its enum value.
    pub fn from_degrees(degrees: f64) -> ScanResolution {
        if (degrees - 0.5).abs() < f64::EPSILON {
            ScanResolution::Res50
        } else {
            ScanResolution::Unknown
        }
    }

    /// The resolution in degrees, or `None` for the unknown sentinel.
    pub fn degrees(self) -> Option<f64> {
        match self {
            ScanResolution::Res50 => Some(0.5),
            ScanResolution::Unknown => None,
        }
    }
}

/// Measured-value units of the device. The PLS only reports centimeters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasuringUnits {
    /// Measured values are in centimeters.
    Cm,
    /// Unknown units.
    Unknown,
}

impl MeasuringUnits {
    /// Converts the units byte of a status telegram to its enum value.
    pub fn from_byte(units: u8) -> MeasuringUnits {
        match units {
            0x00 => MeasuringUnits::Cm,
            _ => MeasuringUnits::Unknown,
        }
    }
}

impl fmt::Display for MeasuringUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeasuringUnits::Cm => write!(f, "centimeters"),
            MeasuringUnits::Unknown => write!(f, "unknown"),
        }
    }
}

/// Status reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The device is OK.
    Ok,
    /// The device has encountered an error.
    Error,
    /// Unknown device status.
    Unknown,
}

impl Status {
    /// Converts the status byte of a reply telegram to its enum value.
    pub fn from_byte(status: u8) -> Status {
        match status {
            0x00 => Status::Ok,
            0x01 => Status::Error,
            _ => Status::Unknown,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Ok => write!(f, "OK"),
            Status::Error => write!(f, "ERROR"),
            Status::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Operating modes of the device.
///
/// See the PLS telegram listing for descriptions of the individual monitor
/// modes; the driver session itself only moves between installation,
/// stream-values, and request-values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingMode {
    /// Installation mode for writing persistent parameters (password protected).
    Installation,
    /// Diagnostic mode for testing purposes.
    Diagnostic,
    /// Streams minimum measured values for each segment.
    MonitorStreamMinValueForEachSegment,
    /// Sends the minimum measured values when an object is detected.
    MonitorTriggerMinValueOnObject,
    /// Streams minimum vertical distance to objects.
    MonitorStreamMinVertDistToObject,
    /// Sends minimum vertical distance to object when detected.
    MonitorTriggerMinVertDistToObject,
    /// Streams all measured values in a scan.
    MonitorStreamValues,
    /// Sends measured range values on request.
    MonitorRequestValues,
    /// Streams mean values from a sample of consecutive scans.
    MonitorStreamMeanValues,
    /// Streams data from a given subrange.
    MonitorStreamValuesSubrange,
    /// Streams mean values over a requested subrange.
    MonitorStreamMeanValuesSubrange,
    /// Streams measured values with associated flags.
    MonitorStreamValuesWithFields,
    /// Streams measured values of a partial scan directly after measurement.
    MonitorStreamValuesFromPartialScan,
    /// Streams range and intensity from partial scans.
    MonitorStreamRangeAndReflectFromPartialScan,
    /// Streams minimum measured values for each segment in a subrange.
    MonitorStreamMinValuesForEachSegmentSubrange,
    /// Outputs navigation data records.
    MonitorNavigation,
    /// Streams measured range and a subrange of reflectivity values.
    MonitorStreamRangeAndReflect,
    /// Unknown operating mode.
    Unknown,
}

impl OperatingMode {
    /// The mode byte carried in the switch-operating-mode telegram.
    pub fn to_byte(self) -> u8 {
        match self {
            OperatingMode::Installation => 0x00,
            OperatingMode::Diagnostic => 0x10,
            OperatingMode::MonitorStreamMinValueForEachSegment => 0x20,
            OperatingMode::MonitorTriggerMinValueOnObject => 0x21,
            OperatingMode::MonitorStreamMinVertDistToObject => 0x22,
            OperatingMode::MonitorTriggerMinVertDistToObject => 0x23,
            OperatingMode::MonitorStreamValues => 0x24,
            OperatingMode::MonitorRequestValues => 0x25,
            OperatingMode::MonitorStreamMeanValues => 0x26,
            OperatingMode::MonitorStreamValuesSubrange => 0x27,
            OperatingMode::MonitorStreamMeanValuesSubrange => 0x28,
            OperatingMode::MonitorStreamValuesWithFields => 0x29,
            OperatingMode::MonitorStreamValuesFromPartialScan => 0x2A,
            OperatingMode::MonitorStreamRangeAndReflectFromPartialScan => 0x2B,
            OperatingMode::MonitorStreamMinValuesForEachSegmentSubrange => 0x2C,
            OperatingMode::MonitorNavigation => 0x2E,
            OperatingMode::MonitorStreamRangeAndReflect => 0x50,
            OperatingMode::Unknown => 0xFF,
        }
    }

    /// Converts a mode byte to its enum value.
    pub fn from_byte(mode: u8) -> OperatingMode {
        match mode {
            0x00 => OperatingMode::Installation,
            0x10 => OperatingMode::Diagnostic,
            0x20 => OperatingMode::MonitorStreamMinValueForEachSegment,
            0x21 => OperatingMode::MonitorTriggerMinValueOnObject,
            0x22 => OperatingMode::MonitorStreamMinVertDistToObject,
            0x23 => OperatingMode::MonitorTriggerMinVertDistToObject,
            0x24 => OperatingMode::MonitorStreamValues,
            0x25 => OperatingMode::MonitorRequestValues,
            0x26 => OperatingMode::MonitorStreamMeanValues,
            0x27 => OperatingMode::MonitorStreamValuesSubrange,
            0x28 => OperatingMode::MonitorStreamMeanValuesSubrange,
            0x29 => OperatingMode::MonitorStreamValuesWithFields,
            0x2A => OperatingMode::MonitorStreamValuesFromPartialScan,
            0x2B => OperatingMode::MonitorStreamRangeAndReflectFromPartialScan,
            0x2C => OperatingMode::MonitorStreamMinValuesForEachSegmentSubrange,
            0x2E => OperatingMode::MonitorNavigation,
            0x50 => OperatingMode::MonitorStreamRangeAndReflect,
            _ => OperatingMode::Unknown,
        }
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperatingMode::Installation => "installation",
            OperatingMode::Diagnostic => "diagnostic",
            OperatingMode::MonitorStreamMinValueForEachSegment => {
                "monitor: stream min value for each segment"
            }
            OperatingMode::MonitorTriggerMinValueOnObject => {
                "monitor: trigger min value on object"
            }
            OperatingMode::MonitorStreamMinVertDistToObject => {
                "monitor: stream min vertical distance to object"
            }
            OperatingMode::MonitorTriggerMinVertDistToObject => {
                "monitor: trigger min vertical distance to object"
            }
            OperatingMode::MonitorStreamValues => "monitor: stream values",
            OperatingMode::MonitorRequestValues => "monitor: request values",
            OperatingMode::MonitorStreamMeanValues => "monitor: stream mean values",
            OperatingMode::MonitorStreamValuesSubrange => "monitor: stream values subrange",
            OperatingMode::MonitorStreamMeanValuesSubrange => {
                "monitor: stream mean values subrange"
            }
            OperatingMode::MonitorStreamValuesWithFields => "monitor: stream values with fields",
            OperatingMode::MonitorStreamValuesFromPartialScan => {
                "monitor: stream values from partial scan"
            }
            OperatingMode::MonitorStreamRangeAndReflectFromPartialScan => {
                "monitor: stream range and reflectivity from partial scan"
            }
            OperatingMode::MonitorStreamMinValuesForEachSegmentSubrange => {
                "monitor: stream min values for each segment subrange"
            }
            OperatingMode::MonitorNavigation => "monitor: navigation",
            OperatingMode::MonitorStreamRangeAndReflect => {
                "monitor: stream range and reflectivity"
            }
            OperatingMode::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

/// Operating parameters reported by the device's status telegram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatingStatus {
    /// Scanning angle in degrees.
    pub scan_angle: u16,
    /// Angular resolution in 1/100 degrees.
    pub scan_resolution: u16,
    /// Number of motor revolutions.
    pub num_motor_revs: u16,
    /// Current operating mode.
    pub operating_mode: OperatingMode,
    /// Laser on/off flag.
    pub laser_mode: u8,
    /// Measuring units of reported values.
    pub measuring_units: MeasuringUnits,
    /// Serial address of the device.
    pub address: u8,
}

impl Default for OperatingStatus {
    fn default() -> OperatingStatus {
        OperatingStatus {
            scan_angle: 0,
            scan_resolution: 0,
            num_motor_revs: 0,
            operating_mode: OperatingMode::Unknown,
            laser_mode: 0,
            measuring_units: MeasuringUnits::Unknown,
            address: 0,
        }
    }
}

/// Baud configuration reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BaudStatus {
    /// Baud rate as reported by the device.
    pub baud_rate: u16,
    /// Whether the configured rate persists through power cycles (otherwise
    /// the device comes up at 9600).
    pub permanent: bool,
}

/// One entry of the device's error list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceError {
    /// Error class reported by the device.
    pub error_type: u8,
    /// Error number within the class.
    pub error_num: u8,
}

/// One decoded scan profile (reply 0xB0).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScanProfile {
    /// Set when the count word's partial-scan flag is set; such a profile
    /// covers only a segment of the full sweep.
    pub partial_scan: bool,
    /// Range measurements with the field/status flag bits masked off.
    pub measurements: Vec<u16>,
    /// The untouched 16-bit measurement words, for callers that need the
    /// flag bits in the top three bits.
    pub raw_words: Vec<u16>,
    /// Telegram index modulo 256.
    pub telegram_index: u8,
    /// Real-time scan index modulo 256, if the device is configured to
    /// report one.
    pub real_time_scan_index: Option<u8>,
    /// Indicates the start angle of a partial scan.
    pub partial_scan_index: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baud_roundtrip() {
        for baud in [Baud::B9600, Baud::B19200, Baud::B38400, Baud::B500K] {
            assert_eq!(Baud::from_rate(baud.rate().unwrap()), baud);
            assert_eq!(Baud::from_code(baud.code()), baud);
            assert_eq!(Baud::from_string(&baud.to_string()), baud);
        }
    }

    #[test]
    fn unknown_inputs_map_to_sentinels() {
        assert_eq!(Baud::from_rate(115_200), Baud::Unknown);
        assert_eq!(Baud::from_string("fast"), Baud::Unknown);
        assert_eq!(ScanAngle::from_int(100), ScanAngle::Unknown);
        assert_eq!(ScanResolution::from_int(100), ScanResolution::Unknown);
        assert_eq!(ScanResolution::from_degrees(1.0), ScanResolution::Unknown);
        assert_eq!(MeasuringUnits::from_byte(0x01), MeasuringUnits::Unknown);
        assert_eq!(Status::from_byte(0x7F), Status::Unknown);
        assert_eq!(OperatingMode::from_byte(0x2D), OperatingMode::Unknown);
    }

    #[test]
    fn operating_mode_byte_roundtrip() {
        for byte in [
            0x00, 0x10, 0x20, 0x21, 0x22, 0x23, 0x24, 0x25, 0x26, 0x27, 0x28, 0x29, 0x2A, 0x2B,
            0x2C, 0x2E, 0x50,
        ] {
            assert_eq!(OperatingMode::from_byte(byte).to_byte(), byte);
        }
    }

    #[test]
    fn supported_configuration_values() {
        assert_eq!(ScanAngle::from_int(180).degrees(), Some(180.0));
        assert_eq!(ScanResolution::from_int(50).degrees(), Some(0.5));
        assert_eq!(ScanResolution::from_degrees(0.5), ScanResolution::Res50);
        assert_eq!(MeasuringUnits::from_byte(0x00), MeasuringUnits::Cm);
    }
}
