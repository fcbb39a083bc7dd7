use nom::bytes::streaming::tag;
use nom::number::streaming::be_u8;
use nom::IResult;

use super::types::{Address, DOMAIN, POLL_MARKER};

/// Every telegram on the bus is exactly this long.
pub const FRAME_LENGTH: usize = 6;

const DOMAIN_PREFIX: [u8; 1] = [DOMAIN];

/// Byte-wise sum of everything before the checksum byte, truncated to 8 bits.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes
        .iter()
        .take(FRAME_LENGTH - 1)
        .fold(0u8, |acc, byte| acc.wrapping_add(*byte))
}

/// One 6-byte telegram.
///
/// Byte 3 is either a variable ID (write) or the poll marker, in which
/// case byte 4 carries the requested variable instead of a value.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Frame {
    pub source: u8,
    pub destination: u8,
    pub variable: u8,
    pub value: u8,
    checksum: u8,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Byte 0 was not the domain constant; only that byte is consumed.
    Domain(u8),
    /// Source address outside the accepted set.
    Source(u8),
    /// Destination address outside the accepted set.
    Destination(u8),
    Checksum { calculated: u8, received: u8 },
    Incomplete(Option<usize>),
}

impl Frame {
    fn new(source: u8, destination: u8, variable: u8, value: u8) -> Self {
        let mut frame = Frame {
            source,
            destination,
            variable,
            value,
            checksum: 0,
        };
        frame.checksum = checksum(&frame.as_bytes());
        frame
    }

    /// Request a variable from mainboard 1.
    pub fn poll(variable: u8) -> Self {
        Self::new(
            Address::ThisPanel.repr(),
            Address::Mainboard1.repr(),
            POLL_MARKER,
            variable,
        )
    }

    /// Write a variable value with an explicit source/destination pair.
    pub fn write(source: Address, destination: Address, variable: u8, value: u8) -> Self {
        Self::new(source.repr(), destination.repr(), variable, value)
    }

    pub fn is_poll(&self) -> bool {
        self.variable == POLL_MARKER
    }

    pub fn checksum_byte(&self) -> u8 {
        self.checksum
    }

    /// Wire representation, checksum included.
    pub fn as_bytes(&self) -> [u8; FRAME_LENGTH] {
        [
            DOMAIN,
            self.source,
            self.destination,
            self.variable,
            self.value,
            self.checksum,
        ]
    }

    /// Reads one telegram from the front of `data`, returning it with the
    /// unconsumed remainder.
    ///
    /// Structural parsing accepts any 6 bytes led by the domain constant;
    /// the semantic rules (accepted source set, accepted destination set,
    /// checksum) are then applied in that order and the first violation is
    /// reported.
    pub fn parse(data: &[u8]) -> Result<(Frame, &[u8]), FrameError> {
        match telegram(data) {
            Ok((remaining, frame)) => {
                frame.validate()?;
                Ok((frame, remaining))
            }
            Err(nom::Err::Incomplete(needed)) => match needed {
                nom::Needed::Size(size) => Err(FrameError::Incomplete(Some(size))),
                nom::Needed::Unknown => Err(FrameError::Incomplete(None)),
            },
            Err(nom::Err::Error(_)) | Err(nom::Err::Failure(_)) => {
                Err(FrameError::Domain(data.first().copied().unwrap_or(0)))
            }
        }
    }

    fn validate(&self) -> Result<(), FrameError> {
        if !Address::is_accepted_source(self.source) {
            return Err(FrameError::Source(self.source));
        }
        if !Address::is_accepted_destination(self.destination) {
            return Err(FrameError::Destination(self.destination));
        }

        let calculated = checksum(&self.as_bytes());
        if calculated != self.checksum {
            return Err(FrameError::Checksum {
                calculated,
                received: self.checksum,
            });
        }

        Ok(())
    }
}

fn telegram(input: &[u8]) -> IResult<&[u8], Frame> {
    let (input, _) = tag(&DOMAIN_PREFIX[..])(input)?;
    let (input, source) = be_u8(input)?;
    let (input, destination) = be_u8(input)?;
    let (input, variable) = be_u8(input)?;
    let (input, value) = be_u8(input)?;
    let (input, received) = be_u8(input)?;

    Ok((
        input,
        Frame {
            source,
            destination,
            variable,
            value,
            checksum: received,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::Variable;

    const EMPTY: &[u8] = &[];

    #[test]
    fn checksum_sums_first_five_bytes() {
        assert_eq!(0xD8, checksum(&[0x01, 0x11, 0x20, 0xA3, 0x03, 0x00]));
        // Truncation, not saturation.
        assert_eq!(0x9B, checksum(&[0xFF, 0xFF, 0x9D, 0x00, 0x00, 0x00]));
    }

    #[test]
    fn emitted_frames_carry_a_valid_checksum() {
        let poll = Frame::poll(Variable::Status.repr());
        let bytes = poll.as_bytes();
        assert_eq!(bytes, [0x01, 0x22, 0x11, 0x00, 0xA3, 0xD7]);
        assert_eq!(bytes[5], checksum(&bytes));

        let write = Frame::write(
            Address::ThisPanel,
            Address::Mainboards,
            Variable::FanSpeed.repr(),
            0x07,
        );
        let bytes = write.as_bytes();
        assert_eq!(bytes[5], checksum(&bytes));
        assert_eq!(Frame::parse(&bytes), Ok((write, EMPTY)));
    }

    #[test]
    fn parse_status_broadcast() {
        let (frame, remaining) = Frame::parse(&[0x01, 0x11, 0x20, 0xA3, 0x03, 0xD8]).unwrap();
        assert!(remaining.is_empty());
        assert_eq!(frame.source, 0x11);
        assert_eq!(frame.destination, 0x20);
        assert_eq!(frame.variable, 0xA3);
        assert_eq!(frame.value, 0x03);
        assert!(!frame.is_poll());
    }

    #[test]
    fn parse_leaves_trailing_bytes() {
        let bytes = [0x01, 0x11, 0x20, 0xA3, 0x03, 0xD8, 0x01, 0x11];
        let (_, remaining) = Frame::parse(&bytes).unwrap();
        assert_eq!(remaining, &[0x01, 0x11]);
    }

    #[test]
    fn rejects_wrong_domain() {
        assert_eq!(
            Frame::parse(&[0x05, 0x11, 0x20, 0xA3, 0x03, 0xDC]),
            Err(FrameError::Domain(0x05))
        );
    }

    #[test]
    fn rejects_unaccepted_source() {
        // 0x10 (all-mainboards) never originates telegrams we accept.
        let bytes = [0x01, 0x10, 0x20, 0xA3, 0x03, 0xD7];
        assert_eq!(Frame::parse(&bytes), Err(FrameError::Source(0x10)));
    }

    #[test]
    fn rejects_unaccepted_destination() {
        let bytes = [0x01, 0x11, 0x42, 0xA3, 0x03, 0xFA];
        assert_eq!(Frame::parse(&bytes), Err(FrameError::Destination(0x42)));
    }

    #[test]
    fn rejects_checksum_mismatch() {
        assert_eq!(
            Frame::parse(&[0x01, 0x11, 0x20, 0xA3, 0x03, 0xD9]),
            Err(FrameError::Checksum {
                calculated: 0xD8,
                received: 0xD9
            })
        );
    }

    #[test]
    fn reports_incomplete_input() {
        assert!(matches!(
            Frame::parse(&[0x01, 0x11, 0x20]),
            Err(FrameError::Incomplete(_))
        ));
    }

    #[test]
    fn poll_marker_distinguishes_polls() {
        let frame = Frame::poll(Variable::Io08.repr());
        assert!(frame.is_poll());
        assert_eq!(frame.value, Variable::Io08.repr());
    }
}
