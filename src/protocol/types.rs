use enum_repr::EnumRepr;

/// Byte 0 of every telegram.
pub const DOMAIN: u8 = 0x01;

/// Placed in byte 3 to request a variable; the requested ID rides in byte 4.
pub const POLL_MARKER: u8 = 0x00;

/// Line settings are 8N1 at this rate. (The older 1200-baud appliance
/// family uses the same framing; pass the rate to your serial setup.)
pub const BAUD_RATE: u32 = 9600;

pub const MAX_FAN_SPEED: u8 = 8;

/// Participant addresses on the panel bus.
///
/// `0x10`/`0x20` are the broadcast addresses of the two participant
/// classes; the unit addresses follow them.
#[EnumRepr(type = "u8")]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Address {
    Mainboards = 0x10,
    Mainboard1 = 0x11,
    Panels = 0x20,
    Panel1 = 0x21,
    ThisPanel = 0x22,
}

impl Address {
    /// Frames are accepted from mainboard 1, from panel 1, and from our own
    /// address (the unit echoes writes back with the panel as source).
    pub fn is_accepted_source(byte: u8) -> bool {
        byte == Address::Mainboard1.repr()
            || byte == Address::ThisPanel.repr()
            || byte == Address::Panel1.repr()
    }

    /// Frames are accepted when addressed to either broadcast class, to
    /// panel 1, to mainboard 1, or to this panel directly.
    pub fn is_accepted_destination(byte: u8) -> bool {
        byte == Address::Panels.repr()
            || byte == Address::ThisPanel.repr()
            || byte == Address::Panel1.repr()
            || byte == Address::Mainboard1.repr()
            || byte == Address::Mainboards.repr()
    }
}

/// Variable IDs the mainboard understands.
#[EnumRepr(type = "u8")]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Variable {
    Io08 = 0x08,
    FanSpeed = 0x29,
    Co2Hi = 0x2B,
    Co2Lo = 0x2C,
    Rh1 = 0x2F,
    Rh2 = 0x30,
    TOutside = 0x32,
    TExhaust = 0x33,
    TInside = 0x34,
    TIncoming = 0x35,
    Flags06 = 0x71,
    Status = 0xA3,
    HeatingTarget = 0xA4,
    ServicePeriod = 0xA6,
    DefaultFanSpeed = 0xA9,
    Program = 0xAA,
    ServiceCounter = 0xAB,
}

// STATUS word layout. CO2 mode (0x02) is carried in the cached word but
// has no decomposed entry.
pub const STATUS_POWER: u8 = 0x01;
pub const STATUS_CO2_MODE: u8 = 0x02;
pub const STATUS_RH_MODE: u8 = 0x04;
pub const STATUS_HEATING_MODE: u8 = 0x08;
pub const STATUS_FILTER_GUARD: u8 = 0x10;
pub const STATUS_HEATING: u8 = 0x20;
pub const STATUS_FAULT: u8 = 0x40;
pub const STATUS_SERVICE: u8 = 0x80;

// IO_08 word layout.
pub const IO08_SUMMER_MODE: u8 = 0x02;
pub const IO08_ERROR_RELAY: u8 = 0x04;
pub const IO08_MOTOR_IN: u8 = 0x08;
pub const IO08_FRONT_HEATING: u8 = 0x10;
pub const IO08_MOTOR_OUT: u8 = 0x20;
pub const IO08_EXTRA_FUNCTION: u8 = 0x40;

// FLAGS_06: writing the activate bit triggers the fireplace/boost program;
// the active bit reports it running.
pub const FLAGS06_FIREPLACE_ACTIVATE: u8 = 0x20;
pub const FLAGS06_FIREPLACE_ACTIVE: u8 = 0x40;

// PROGRAM word: how the external switch input is interpreted.
pub const PROGRAM_SWITCH_TYPE: u8 = 0x20;

/// Interpretation of the external switch input, from the PROGRAM word.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SwitchType {
    Fireplace,
    Boost,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_round_trip() {
        assert_eq!(Address::from_repr(0x11), Some(Address::Mainboard1));
        assert_eq!(Address::from_repr(0x22), Some(Address::ThisPanel));
        assert_eq!(Address::from_repr(0x42), None);
    }

    #[test]
    fn accepted_sources() {
        assert!(Address::is_accepted_source(0x11));
        assert!(Address::is_accepted_source(0x21));
        assert!(Address::is_accepted_source(0x22));
        assert!(!Address::is_accepted_source(0x10));
        assert!(!Address::is_accepted_source(0x20));
    }

    #[test]
    fn accepted_destinations() {
        for byte in [0x10u8, 0x11, 0x20, 0x21, 0x22] {
            assert!(Address::is_accepted_destination(byte));
        }
        assert!(!Address::is_accepted_destination(0x12));
    }

    #[test]
    fn variable_ids() {
        assert_eq!(Variable::Status.repr(), 0xA3);
        assert_eq!(Variable::from_repr(0x29), Some(Variable::FanSpeed));
        assert_eq!(Variable::from_repr(POLL_MARKER), None);
    }
}
