#![no_std]

//! titon_se
//!
//! Reverse-engineered protocol implementation for the RS-485 panel bus of
//! Titon DIGIT SE heat-recovery ventilation units. The mainboard and its
//! control panels exchange fixed 6-byte telegrams carrying one variable
//! each; this crate impersonates a panel, shadowing the mainboard's
//! variables in a typed cache and writing them on behalf of the host.
//!
//! It is intended for use on embedded hardware and is `no_std`. There is
//! no serial-device code here: the bus runs at 9600 baud, 8 data bits, no
//! parity, one stop bit (9600 8N1) — configure your serial peripheral
//! accordingly and hand it to [`TitonDevice`] through the `embedded-hal`
//! 0.2 serial traits, together with a [`Clock`] for monotonic time.
//!
//! ## Wire format
//!
//! Parse bytes straight off the line:
//!
//! ```
//! use titon_se::protocol::{Frame, Variable};
//!
//! // A status broadcast from the mainboard to all panels.
//! let bytes = [0x01, 0x11, 0x20, 0xA3, 0x03, 0xD8];
//!
//! let (frame, rest) = Frame::parse(&bytes).unwrap();
//! assert!(rest.is_empty());
//! assert_eq!(frame.variable, Variable::Status.repr());
//! assert_eq!(frame.value, 0x03);
//! ```
//!
//! Or build outbound telegrams; the checksum (sum of the first five
//! bytes, modulo 256) is filled in for you:
//!
//! ```
//! use titon_se::protocol::{Address, Frame, Variable};
//!
//! let frame = Frame::write(
//!     Address::ThisPanel,
//!     Address::Mainboards,
//!     Variable::FanSpeed.repr(),
//!     0x07, // fan speed 3
//! );
//! assert_eq!(frame.as_bytes(), [0x01, 0x22, 0x10, 0x29, 0x07, 0x63]);
//! ```
//!
//! ## Shadowing a unit
//!
//! The usual integration owns a `TitonDevice`, calls
//! [`connect`](interface::TitonDevice::connect) once and then
//! [`poll`](interface::TitonDevice::poll) from its main loop. Decoded
//! values are read through [`state`](interface::TitonDevice::state) (every
//! getter is `None` until the variable has actually been seen on the bus)
//! and change notifications arrive through an [`Observer`]
//! implementation. Writes go through the setter methods, which enforce
//! the appliance's ranges and its one-outstanding-status-write rule.

#[cfg(test)]
extern crate std;

pub mod interface;
pub mod protocol;
pub mod state;

#[doc(inline)]
pub use interface::{Clock, Direction, NullObserver, Observer, TitonDevice};
#[doc(inline)]
pub use protocol::{Frame, FrameError};
#[doc(inline)]
pub use state::{DeviceState, Millis};
