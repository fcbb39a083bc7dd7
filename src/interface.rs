//! The bus participant: a `TitonDevice` impersonates a control panel,
//! absorbing broadcasts into the shadow state, polling for variables that
//! stale silently, and writing variables on behalf of the host.

use embedded_hal::serial;
use heapless::Deque;

use crate::protocol::encoding;
use crate::protocol::types::{
    Address, Variable, FLAGS06_FIREPLACE_ACTIVATE, FLAGS06_FIREPLACE_ACTIVE, IO08_ERROR_RELAY,
    IO08_EXTRA_FUNCTION, IO08_FRONT_HEATING, IO08_MOTOR_IN, IO08_MOTOR_OUT, IO08_SUMMER_MODE,
    DOMAIN, MAX_FAN_SPEED, PROGRAM_SWITCH_TYPE, STATUS_FAULT, STATUS_FILTER_GUARD, STATUS_HEATING,
    STATUS_HEATING_MODE, STATUS_POWER, STATUS_RH_MODE, STATUS_SERVICE,
};
use crate::protocol::{Frame, FrameError, FRAME_LENGTH};
use crate::state::{DeviceState, Millis};

/// With init done, variables that change without a broadcast (IO_08 and
/// the service counter) are re-polled this often.
pub const QUERY_INTERVAL_MS: Millis = 30_000;

/// Never-seen variables are re-requested and a stuck status-write gate is
/// released this often.
pub const RETRY_INTERVAL_MS: Millis = 20_000;

/// The CO₂ halves join into one reading only when received within this
/// window of each other.
pub const CO2_LIFETIME_MS: Millis = 2_000;

/// Settle delay after each outbound poll, giving the mainboard time to
/// answer before the next request.
pub const POLL_SETTLE_MS: u32 = 100;

const RX_CAPACITY: usize = 64;

/// Monotonic time and cooperative delay, supplied by the host.
///
/// `embedded-hal` 0.2 has no monotonic-clock trait, so this seam is local.
/// Implementations are one-liners over `std::time::Instant`, an embassy
/// instant, or a `millis()`-style counter.
pub trait Clock {
    fn now_ms(&mut self) -> Millis;
    fn delay_ms(&mut self, ms: u32);
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    Received,
    Sent,
}

/// Hooks the host can implement to observe the bus participant. All
/// methods default to no-ops and are invoked synchronously on the
/// [`poll`](TitonDevice::poll) path; they must not block.
pub trait Observer {
    /// Every validated inbound and every outbound frame, debug mode only.
    fn on_packet(&mut self, _frame: &Frame, _direction: Direction) {}

    /// Some cached status value changed (subject to init gating).
    fn on_status_changed(&mut self) {}

    /// A temperature-class value changed, once all four temperatures have
    /// been received.
    fn on_temperature_changed(&mut self) {}

    /// Diagnostic strings such as checksum failures.
    fn on_debug(&mut self, _message: &str) {}
}

/// Ignores every event.
pub struct NullObserver;

impl Observer for NullObserver {}

/// A panel-bus participant shadowing one ventilation unit.
///
/// Drive it by calling [`connect`](Self::connect) once and then
/// [`poll`](Self::poll) from the host loop. All state mutation happens on
/// that thread; callers on other threads must funnel through it.
pub struct TitonDevice<S, C, O> {
    serial: S,
    clock: C,
    observer: O,
    debug: bool,
    state: DeviceState,
    rx: Deque<u8, RX_CAPACITY>,
    status_write_pending: bool,
    full_init_done: bool,
    last_query: Millis,
    last_retry: Millis,
}

impl<S, C, O, E> TitonDevice<S, C, O>
where
    S: serial::Read<u8, Error = E> + serial::Write<u8, Error = E>,
    C: Clock,
    O: Observer,
{
    pub fn new(serial: S, clock: C, observer: O) -> Self {
        TitonDevice {
            serial,
            clock,
            observer,
            debug: false,
            state: DeviceState::default(),
            rx: Deque::new(),
            status_write_pending: false,
            full_init_done: false,
            last_query: 0,
            last_retry: 0,
        }
    }

    /// Begin shadowing: clears the init latch and polls once for every
    /// status-relevant variable. Temperatures (and RH2) arrive as
    /// unsolicited broadcasts and are not polled.
    pub fn connect(&mut self) -> Result<(), E> {
        self.full_init_done = false;
        self.request_config()
    }

    /// Drains and decodes buffered frames, then runs any timer work that
    /// has come due. Call this from the host loop.
    pub fn poll(&mut self) -> Result<(), E> {
        self.fill_rx_buffer()?;
        while let Some(frame) = self.try_read_frame() {
            self.decode(&frame);
        }

        let now = self.clock.now_ms();
        if now.saturating_sub(self.last_query) > QUERY_INTERVAL_MS {
            self.last_query = now;
            if self.state.is_status_init_done() {
                self.request_variable(Variable::Io08)?;
                self.request_variable(Variable::ServiceCounter)?;
            }
        }

        if now.saturating_sub(self.last_retry) > RETRY_INTERVAL_MS {
            self.last_retry = now;
            self.retry()?;
        }

        Ok(())
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    /// True once every status-relevant variable has been seen at least once.
    pub fn is_init_done(&self) -> bool {
        self.full_init_done
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
        self.observer.on_status_changed();
    }

    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    /// Give back the transport, clock and observer.
    pub fn release(self) -> (S, C, O) {
        (self.serial, self.clock, self.observer)
    }

    // Setters. Each returns whether the request was accepted; transport
    // faults surface as `Err` and are never retried here.

    pub fn set_fan_speed(&mut self, speed: u8) -> Result<bool, E> {
        if !(1..=MAX_FAN_SPEED).contains(&speed) {
            return Ok(false);
        }

        self.write_variable(Variable::FanSpeed, encoding::fan_speed_to_code(speed))?;
        self.state.data.fan_speed.set_local(Some(speed));
        self.observer.on_status_changed();
        Ok(true)
    }

    /// The speed the unit falls back to. Speed 8 is not accepted here even
    /// though `set_fan_speed` takes it; the appliance rejects it as a
    /// default.
    pub fn set_default_fan_speed(&mut self, speed: u8) -> Result<bool, E> {
        if !(1..MAX_FAN_SPEED).contains(&speed) {
            return Ok(false);
        }

        self.write_variable(Variable::DefaultFanSpeed, encoding::fan_speed_to_code(speed))?;
        self.state.data.default_fan_speed.set_local(Some(speed));
        self.observer.on_status_changed();
        Ok(true)
    }

    pub fn set_heating_target_celsius(&mut self, celsius: i8) -> Result<bool, E> {
        if !(10..=27).contains(&celsius) {
            return Ok(false);
        }

        self.write_variable(Variable::HeatingTarget, encoding::celsius_to_ntc(celsius))?;
        self.state.data.heating_target.set_local(celsius);
        self.observer.on_status_changed();
        Ok(true)
    }

    // The u8 argument carries the protocol's 0..256 month range.

    pub fn set_service_period(&mut self, months: u8) -> Result<bool, E> {
        self.write_variable(Variable::ServicePeriod, months)?;
        self.state.data.service_period.set_local(months);
        self.observer.on_status_changed();
        Ok(true)
    }

    pub fn set_service_counter(&mut self, months: u8) -> Result<bool, E> {
        self.write_variable(Variable::ServiceCounter, months)?;
        self.state.data.service_counter.set_local(months);
        self.observer.on_status_changed();
        Ok(true)
    }

    pub fn set_power(&mut self, on: bool) -> Result<bool, E> {
        let word = with_flag(self.state.data.status.raw(), STATUS_POWER, on);
        if !self.write_status_word(word)? {
            return Ok(false);
        }

        self.state.data.is_on.set_local(on);
        self.observer.on_status_changed();
        Ok(true)
    }

    pub fn set_rh_mode(&mut self, on: bool) -> Result<bool, E> {
        let word = with_flag(self.state.data.status.raw(), STATUS_RH_MODE, on);
        if !self.write_status_word(word)? {
            return Ok(false);
        }

        self.state.data.is_rh_mode.set_local(on);
        self.observer.on_status_changed();
        Ok(true)
    }

    pub fn set_heating_mode(&mut self, on: bool) -> Result<bool, E> {
        // Re-asserting the current mode makes the unit fall back to its
        // default fan speed, so a matching request never reaches the wire.
        let current = self.state.data.status.raw() & STATUS_HEATING_MODE != 0;
        if current == on {
            self.observer.on_debug(if on {
                "Heating mode is already on!"
            } else {
                "Heating mode is already off!"
            });
            self.observer.on_status_changed();
            return Ok(true);
        }

        let word = with_flag(self.state.data.status.raw(), STATUS_HEATING_MODE, on);
        if !self.write_status_word(word)? {
            return Ok(false);
        }

        self.state.data.is_heating_mode.set_local(on);
        self.observer.on_status_changed();
        Ok(true)
    }

    /// Trigger the fireplace/boost program by writing the activate bit of
    /// FLAGS_06. The unit reports the program via the active bit later.
    pub fn activate_fireplace_boost(&mut self) -> Result<(), E> {
        let word = self.state.data.flags06.raw() | FLAGS06_FIREPLACE_ACTIVATE;
        self.write_variable(Variable::Flags06, word)
    }

    // Outbound path.

    /// Status-word writes are single-flight: one must be absorbed back (or
    /// given up on by the retry watchdog) before the next is accepted, and
    /// they address mainboard 1 specifically.
    fn write_status_word(&mut self, word: u8) -> Result<bool, E> {
        if self.status_write_pending {
            return Ok(false);
        }

        self.status_write_pending = true;
        self.write_variable_to(Variable::Status, word, Address::Mainboard1)?;
        // Hold the retry timer back so the echo gets a full window.
        self.last_retry = self.clock.now_ms();
        Ok(true)
    }

    fn write_variable(&mut self, variable: Variable, value: u8) -> Result<(), E> {
        self.write_variable_to(variable, value, Address::Mainboards)
    }

    /// Every write goes out twice: once to the target, then repeated to
    /// all panels with mainboard 1 as apparent source so peer panels track
    /// the value. The two sends are distinct protocol traffic, not a
    /// retry; never coalesce them.
    fn write_variable_to(
        &mut self,
        variable: Variable,
        value: u8,
        destination: Address,
    ) -> Result<(), E> {
        let frame = Frame::write(Address::ThisPanel, destination, variable.repr(), value);
        self.send(&frame)?;

        let echo = Frame::write(Address::Mainboard1, Address::Panels, variable.repr(), value);
        self.send(&echo)
    }

    fn request_variable(&mut self, variable: Variable) -> Result<(), E> {
        let frame = Frame::poll(variable.repr());
        self.send(&frame)?;
        self.clock.delay_ms(POLL_SETTLE_MS);
        Ok(())
    }

    fn send(&mut self, frame: &Frame) -> Result<(), E> {
        for byte in frame.as_bytes().iter() {
            nb::block!(self.serial.write(*byte))?;
        }
        nb::block!(self.serial.flush())?;

        if self.debug {
            self.observer.on_packet(frame, Direction::Sent);
        }

        Ok(())
    }

    fn request_config(&mut self) -> Result<(), E> {
        self.request_variable(Variable::Status)?;
        self.request_variable(Variable::Io08)?;
        self.request_variable(Variable::FanSpeed)?;
        self.request_variable(Variable::DefaultFanSpeed)?;
        // RH2 is broadcast-only; RH1 is the one humidity channel polled.
        self.request_variable(Variable::Rh1)?;
        self.request_variable(Variable::ServicePeriod)?;
        self.request_variable(Variable::ServiceCounter)?;
        self.request_variable(Variable::HeatingTarget)?;
        self.request_variable(Variable::Flags06)?;
        self.request_variable(Variable::Program)?;

        let now = self.clock.now_ms();
        self.state.touch(now);
        self.last_query = now;
        self.last_retry = now;
        Ok(())
    }

    fn retry(&mut self) -> Result<(), E> {
        self.send_missing_requests()?;
        // A lost echo must not wedge status writes forever.
        self.status_write_pending = false;
        Ok(())
    }

    fn send_missing_requests(&mut self) -> Result<(), E> {
        let data = &self.state.data;
        let checks = [
            (data.is_on.seen(), Variable::Status),
            (data.io08.seen(), Variable::Io08),
            (data.fan_speed.seen(), Variable::FanSpeed),
            (data.default_fan_speed.seen(), Variable::DefaultFanSpeed),
            (data.service_period.seen(), Variable::ServicePeriod),
            (data.service_counter.seen(), Variable::ServiceCounter),
            (data.heating_target.seen(), Variable::HeatingTarget),
        ];

        for (seen, variable) in checks {
            if !seen {
                self.request_variable(variable)?;
            }
        }

        Ok(())
    }

    // Inbound path.

    fn fill_rx_buffer(&mut self) -> Result<(), E> {
        while !self.rx.is_full() {
            match self.serial.read() {
                Ok(byte) => {
                    let _ = self.rx.push_back(byte);
                }
                Err(nb::Error::WouldBlock) => break,
                Err(nb::Error::Other(error)) => return Err(error),
            }
        }

        Ok(())
    }

    /// Extracts one validated frame from the receive buffer. Any rejected
    /// candidate ends the drain for this call; resync continues on the
    /// next one.
    fn try_read_frame(&mut self) -> Option<Frame> {
        if self.rx.len() < FRAME_LENGTH {
            return None;
        }

        // Anything that is not a domain byte is line noise between frames.
        let first = self.rx.pop_front()?;
        if first != DOMAIN {
            return None;
        }

        let mut raw = [first; FRAME_LENGTH];
        for slot in raw.iter_mut().skip(1) {
            *slot = self.rx.pop_front()?;
        }

        match Frame::parse(&raw) {
            Ok((frame, _)) => {
                if self.debug {
                    self.observer.on_packet(&frame, Direction::Received);
                }
                Some(frame)
            }
            Err(FrameError::Checksum { .. }) => {
                self.observer.on_debug("Checksum comparison failed!");
                None
            }
            Err(_) => None,
        }
    }

    fn decode(&mut self, frame: &Frame) {
        let now = self.clock.now_ms();
        let value = frame.value;

        match Variable::from_repr(frame.variable) {
            Some(Variable::TOutside) => {
                let changed = self
                    .state
                    .data
                    .t_outside
                    .store(encoding::ntc_to_celsius(value), now);
                self.note_value_change(changed, now);
            }
            Some(Variable::TExhaust) => {
                let changed = self
                    .state
                    .data
                    .t_exhaust
                    .store(encoding::ntc_to_celsius(value), now);
                self.note_value_change(changed, now);
            }
            Some(Variable::TInside) => {
                let changed = self
                    .state
                    .data
                    .t_inside
                    .store(encoding::ntc_to_celsius(value), now);
                self.note_value_change(changed, now);
            }
            Some(Variable::TIncoming) => {
                let changed = self
                    .state
                    .data
                    .t_incoming
                    .store(encoding::ntc_to_celsius(value), now);
                self.note_value_change(changed, now);
            }
            Some(Variable::Rh1) => {
                let changed = self
                    .state
                    .data
                    .rh1
                    .store(encoding::humidity_from_byte(value), now);
                self.note_value_change(changed, now);
            }
            Some(Variable::Rh2) => {
                let changed = self
                    .state
                    .data
                    .rh2
                    .store(encoding::humidity_from_byte(value), now);
                self.note_value_change(changed, now);
            }
            Some(Variable::Co2Hi) => {
                self.state.data.co2_hi.store(value, now);
                self.try_join_co2(now);
            }
            Some(Variable::Co2Lo) => {
                self.state.data.co2_lo.store(value, now);
                self.try_join_co2(now);
            }
            Some(Variable::FanSpeed) => {
                let changed = self
                    .state
                    .data
                    .fan_speed
                    .store(encoding::code_to_fan_speed(value), now);
                self.note_status_change(changed, now);
            }
            Some(Variable::DefaultFanSpeed) => {
                let changed = self
                    .state
                    .data
                    .default_fan_speed
                    .store(encoding::code_to_fan_speed(value), now);
                self.note_status_change(changed, now);
            }
            Some(Variable::Status) => self.decode_status(value, now),
            Some(Variable::Io08) => self.decode_io08(value, now),
            Some(Variable::Flags06) => self.decode_flags06(value, now),
            Some(Variable::ServicePeriod) => {
                let changed = self.state.data.service_period.store(value, now);
                self.note_status_change(changed, now);
            }
            Some(Variable::ServiceCounter) => {
                let changed = self.state.data.service_counter.store(value, now);
                self.note_status_change(changed, now);
            }
            Some(Variable::HeatingTarget) => {
                let changed = self
                    .state
                    .data
                    .heating_target
                    .store(encoding::ntc_to_celsius(value), now);
                self.note_status_change(changed, now);
            }
            Some(Variable::Program) => self.decode_program(value, now),
            // Unknown variables (and poll requests between other
            // participants) are not ours to interpret.
            None => {}
        }

        if !self.full_init_done && self.state.is_status_init_done() {
            self.full_init_done = true;
            self.observer.on_status_changed();
        }
    }

    fn decode_status(&mut self, word: u8, now: Millis) {
        let data = &mut self.state.data;
        // The word itself is cached without change tracking; only the
        // decomposed bits notify. Bit 0x02 can flip the word silently.
        data.status.store(word, now);

        let mut changed = data.is_on.store(word & STATUS_POWER != 0, now);
        changed |= data.is_rh_mode.store(word & STATUS_RH_MODE != 0, now);
        changed |= data
            .is_heating_mode
            .store(word & STATUS_HEATING_MODE != 0, now);
        changed |= data
            .is_filter_guard
            .store(word & STATUS_FILTER_GUARD != 0, now);
        changed |= data.is_heating.store(word & STATUS_HEATING != 0, now);
        changed |= data.is_fault.store(word & STATUS_FAULT != 0, now);
        changed |= data.is_service.store(word & STATUS_SERVICE != 0, now);

        // This is the echo a pending status write waits for.
        self.status_write_pending = false;

        self.note_status_change(changed, now);
    }

    fn decode_io08(&mut self, word: u8, now: Millis) {
        let data = &mut self.state.data;
        data.io08.store(word, now);

        let mut changed = data.is_summer_mode.store(word & IO08_SUMMER_MODE != 0, now);
        changed |= data.is_error_relay.store(word & IO08_ERROR_RELAY != 0, now);
        changed |= data.is_motor_in.store(word & IO08_MOTOR_IN != 0, now);
        changed |= data
            .is_front_heating
            .store(word & IO08_FRONT_HEATING != 0, now);
        changed |= data.is_motor_out.store(word & IO08_MOTOR_OUT != 0, now);
        changed |= data
            .is_extra_function
            .store(word & IO08_EXTRA_FUNCTION != 0, now);

        self.note_status_change(changed, now);
    }

    fn decode_flags06(&mut self, word: u8, now: Millis) {
        let data = &mut self.state.data;
        data.flags06.store(word, now);

        let changed = data
            .is_switch_active
            .store(word & FLAGS06_FIREPLACE_ACTIVE != 0, now);

        self.note_status_change(changed, now);
    }

    /// Settings publish their first sighting immediately so the host
    /// learns the unit's configuration without waiting for full init.
    fn decode_program(&mut self, word: u8, now: Millis) {
        let settings = &mut self.state.settings;
        settings.program.store(word, now);

        let changed = settings
            .boost_switch
            .store(word & PROGRAM_SWITCH_TYPE != 0, now);

        if changed {
            self.state.touch(now);
            self.observer.on_status_changed();
        }
    }

    fn try_join_co2(&mut self, now: Millis) {
        let hi = self.state.data.co2_hi;
        let lo = self.state.data.co2_lo;

        if let (Some(hi_at), Some(lo_at)) = (hi.seen_at(), lo.seen_at()) {
            if now.saturating_sub(hi_at) <= CO2_LIFETIME_MS
                && now.saturating_sub(lo_at) <= CO2_LIFETIME_MS
            {
                let total = encoding::co2_from_halves(hi.raw(), lo.raw());
                let changed = self.state.data.co2.store(total, now);
                self.note_value_change(changed, now);
            }
        }
    }

    /// Temperature-class values (temperatures, RH, CO₂) notify through the
    /// temperature hook once all four temperatures have been sighted.
    fn note_value_change(&mut self, changed: bool, now: Millis) {
        if changed {
            self.state.touch(now);
            if self.state.is_temperature_init_done() {
                self.observer.on_temperature_changed();
            }
        }
    }

    fn note_status_change(&mut self, changed: bool, now: Millis) {
        if changed {
            self.state.touch(now);
            if self.full_init_done {
                self.observer.on_status_changed();
            }
        }
    }
}

fn with_flag(word: u8, mask: u8, on: bool) -> u8 {
    if on {
        word | mask
    } else {
        word & !mask
    }
}
