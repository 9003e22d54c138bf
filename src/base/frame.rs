use crate::base::error::{Error, Result};
use crate::checksum::crc16;
use crate::cmds::{
    SICK_PLS_MSG_HEADER_LEN, SICK_PLS_MSG_PAYLOAD_MAX_LEN, SICK_PLS_MSG_TRAILER_LEN, SICK_PLS_STX,
};
use byteorder::{ByteOrder, LittleEndian};

/// One telegram on the serial wire.
///
/// Wire layout: `[STX][addr][length:2 LE][payload][crc:2 LE]`, where `length`
/// counts payload bytes only and the CRC covers everything before the
/// trailer. Frames are value objects: cheap to copy, no I/O.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame {
    dest_address: u8,
    payload: Vec<u8>,
    checksum: u16,
}

impl Frame {
    /// Builds a well-formed frame addressed to `dest_address`.
    ///
    /// The payload must carry at least the command code and at most
    /// 812 bytes; anything else fails with a config error.
    pub fn build(dest_address: u8, payload: &[u8]) -> Result<Frame> {
        if payload.is_empty() {
            return Err(Error::Config {
                description: "payload empty".to_owned(),
            });
        }
        if payload.len() > SICK_PLS_MSG_PAYLOAD_MAX_LEN {
            return Err(Error::Config {
                description: format!("payload too large: {} bytes", payload.len()),
            });
        }

        let mut frame = Frame {
            dest_address,
            payload: payload.to_vec(),
            checksum: 0,
        };
        frame.checksum = crc16(&frame.checksummed_bytes());
        Ok(frame)
    }

    /// Populates a frame from a raw wire image, verifying STX, length, and
    /// CRC.
    pub fn parse(raw: &[u8]) -> Result<Frame> {
        if raw.len() < SICK_PLS_MSG_HEADER_LEN + 1 + SICK_PLS_MSG_TRAILER_LEN {
            return Err(Error::Protocol {
                description: format!("frame too short: {} bytes", raw.len()),
            });
        }
        if raw[0] != SICK_PLS_STX {
            return Err(Error::Protocol {
                description: format!("bad STX: {:02X}", raw[0]),
            });
        }

        let payload_length = LittleEndian::read_u16(&raw[2..4]) as usize;
        if payload_length == 0 || payload_length > SICK_PLS_MSG_PAYLOAD_MAX_LEN {
            return Err(Error::Protocol {
                description: format!("implausible payload length: {}", payload_length),
            });
        }

        let frame_length = SICK_PLS_MSG_HEADER_LEN + payload_length + SICK_PLS_MSG_TRAILER_LEN;
        if raw.len() < frame_length {
            return Err(Error::Protocol {
                description: format!(
                    "truncated frame: need {} bytes, have {}",
                    frame_length,
                    raw.len()
                ),
            });
        }

        let body_end = SICK_PLS_MSG_HEADER_LEN + payload_length;
        let expected = crc16(&raw[..body_end]);
        let received = LittleEndian::read_u16(&raw[body_end..body_end + 2]);
        if expected != received {
            return Err(Error::Checksum {
                description: format!("expected {:04X}, received {:04X}", expected, received),
            });
        }

        Ok(Frame {
            dest_address: raw[1],
            payload: raw[SICK_PLS_MSG_HEADER_LEN..body_end].to_vec(),
            checksum: received,
        })
    }

    /// Serializes the frame into its wire image.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut raw = self.checksummed_bytes();
        let mut trailer = [0u8; SICK_PLS_MSG_TRAILER_LEN];
        LittleEndian::write_u16(&mut trailer, self.checksum);
        raw.extend_from_slice(&trailer);
        raw
    }

    /// Header + payload, the region the CRC covers.
    fn checksummed_bytes(&self) -> Vec<u8> {
        let mut raw = Vec::with_capacity(SICK_PLS_MSG_HEADER_LEN + self.payload.len());
        raw.push(SICK_PLS_STX);
        raw.push(self.dest_address);
        let mut length = [0u8; 2];
        LittleEndian::write_u16(&mut length, self.payload.len() as u16);
        raw.extend_from_slice(&length);
        raw.extend_from_slice(&self.payload);
        raw
    }

    /// Destination address of the frame.
    pub fn dest_address(&self) -> u8 {
        self.dest_address
    }

    /// Command code of the telegram (first payload byte).
    pub fn command_code(&self) -> u8 {
        self.payload.first().copied().unwrap_or(0)
    }

    /// Status byte of a device reply (last payload byte).
    ///
    /// Only meaningful for device response telegrams.
    pub fn status_byte(&self) -> u8 {
        self.payload.last().copied().unwrap_or(0)
    }

    /// The payload bytes, command code included.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// The CRC-16 stored in the trailer.
    pub fn checksum(&self) -> u16 {
        self.checksum
    }

    /// Total wire length of the frame.
    pub fn frame_len(&self) -> usize {
        SICK_PLS_MSG_HEADER_LEN + self.payload.len() + SICK_PLS_MSG_TRAILER_LEN
    }

    /// Returns the frame to the empty, not-well-formed state.
    pub fn clear(&mut self) {
        self.dest_address = 0;
        self.payload.clear();
        self.checksum = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmds::{SICK_PLS_HOST_ADDRESS, SICK_PLS_SICK_ADDRESS};

    #[test]
    fn build_and_serialize_mode_switch() {
        let frame = Frame::build(SICK_PLS_SICK_ADDRESS, &[0x20, 0x24]).unwrap();
        assert_eq!(
            frame.to_bytes(),
            [0x02, 0x00, 0x02, 0x00, 0x20, 0x24, 0x34, 0x08]
        );
        assert_eq!(frame.command_code(), 0x20);
        assert_eq!(frame.checksum(), 0x0834);
        assert_eq!(frame.frame_len(), 8);
    }

    #[test]
    fn roundtrip_preserves_fields() {
        for payload in [
            vec![0x31],
            vec![0xB0, 0x00, 0x00],
            (0..=255u8).collect::<Vec<u8>>(),
            vec![0xAA; SICK_PLS_MSG_PAYLOAD_MAX_LEN],
        ] {
            let built = Frame::build(SICK_PLS_HOST_ADDRESS, &payload).unwrap();
            let raw = built.to_bytes();
            let parsed = Frame::parse(&raw).unwrap();
            assert_eq!(parsed, built);
            assert_eq!(parsed.dest_address(), SICK_PLS_HOST_ADDRESS);
            assert_eq!(parsed.payload(), payload.as_slice());
            assert_eq!(
                parsed.checksum(),
                u16::from_le_bytes([raw[raw.len() - 2], raw[raw.len() - 1]])
            );
        }
    }

    #[test]
    fn payload_bounds() {
        assert!(matches!(
            Frame::build(SICK_PLS_SICK_ADDRESS, &[]),
            Err(Error::Config { .. })
        ));
        assert!(Frame::build(SICK_PLS_SICK_ADDRESS, &[0u8; 812]).is_ok());
        assert!(matches!(
            Frame::build(SICK_PLS_SICK_ADDRESS, &[0u8; 813]),
            Err(Error::Config { .. })
        ));
    }

    #[test]
    fn corrupted_frame_fails_checksum() {
        let raw = Frame::build(SICK_PLS_HOST_ADDRESS, &[0x90, 0x01, 0x02, 0x00])
            .unwrap()
            .to_bytes();

        // Flip one bit in every position that keeps the header parseable.
        for i in 0..raw.len() {
            let mut corrupted = raw.clone();
            corrupted[i] ^= 0x01;
            let result = Frame::parse(&corrupted);
            assert!(
                matches!(
                    result,
                    Err(Error::Checksum { .. }) | Err(Error::Protocol { .. })
                ),
                "bit flip at {} was accepted",
                i
            );
        }
    }

    #[test]
    fn parse_rejects_bad_stx_and_short_input() {
        assert!(matches!(
            Frame::parse(&[0x03, 0x80, 0x01, 0x00, 0x31, 0x00, 0x00]),
            Err(Error::Protocol { .. })
        ));
        assert!(matches!(
            Frame::parse(&[0x02, 0x80, 0x01]),
            Err(Error::Protocol { .. })
        ));
    }

    #[test]
    fn clear_resets_to_empty() {
        let mut frame = Frame::build(SICK_PLS_SICK_ADDRESS, &[0x31]).unwrap();
        frame.clear();
        assert_eq!(frame, Frame::default());
        assert_eq!(frame.command_code(), 0);
    }
}
