//! Typed shadow of the mainboard's variables.
//!
//! Every entry tracks the monotonic time it was last received from the
//! bus; an entry that was never received reads as `None` through the
//! public getters no matter what its storage holds. Mutation happens only
//! on the decode path and in the optimistic setter path of
//! [`TitonDevice`](crate::interface::TitonDevice).

use crate::protocol::types::SwitchType;

/// Monotonic milliseconds from the host's [`Clock`](crate::interface::Clock).
pub type Millis = u64;

/// One cached scalar plus the time it was last seen on the bus.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct Slot<T> {
    value: T,
    seen_at: Option<Millis>,
}

impl<T: Copy + PartialEq> Slot<T> {
    /// The cached value, once the bus has confirmed one.
    pub fn get(&self) -> Option<T> {
        self.seen_at.map(|_| self.value)
    }

    /// The stored value regardless of confirmation. Read-modify-write of
    /// flag words starts from here, unseen words reading as the default.
    pub fn raw(&self) -> T {
        self.value
    }

    pub fn seen(&self) -> bool {
        self.seen_at.is_some()
    }

    pub fn seen_at(&self) -> Option<Millis> {
        self.seen_at
    }

    /// Optimistic local update: value only, confirmation state untouched.
    pub fn set_local(&mut self, value: T) {
        self.value = value;
    }

    /// Store a value received from the bus. Returns true when this is the
    /// first sighting or the value differs from the cached one.
    pub fn store(&mut self, value: T, now: Millis) -> bool {
        let changed = self.seen_at.is_none() || self.value != value;
        self.value = value;
        self.seen_at = Some(now);
        changed
    }
}

/// Variables that describe what the unit is currently doing.
#[derive(Debug, Default)]
pub(crate) struct RuntimeData {
    pub t_inside: Slot<i8>,
    pub t_outside: Slot<i8>,
    pub t_incoming: Slot<i8>,
    pub t_exhaust: Slot<i8>,

    // RH and fan-speed bytes can arrive unreadable; the inner Option keeps
    // the per-sample not-set state separate from "never received".
    pub rh1: Slot<Option<u8>>,
    pub rh2: Slot<Option<u8>>,

    pub co2_hi: Slot<u8>,
    pub co2_lo: Slot<u8>,
    pub co2: Slot<u16>,

    pub fan_speed: Slot<Option<u8>>,
    pub default_fan_speed: Slot<Option<u8>>,

    pub status: Slot<u8>,
    pub is_on: Slot<bool>,
    pub is_rh_mode: Slot<bool>,
    pub is_heating_mode: Slot<bool>,
    pub is_filter_guard: Slot<bool>,
    pub is_heating: Slot<bool>,
    pub is_fault: Slot<bool>,
    pub is_service: Slot<bool>,

    pub io08: Slot<u8>,
    pub is_summer_mode: Slot<bool>,
    pub is_error_relay: Slot<bool>,
    pub is_motor_in: Slot<bool>,
    pub is_front_heating: Slot<bool>,
    pub is_motor_out: Slot<bool>,
    pub is_extra_function: Slot<bool>,

    pub flags06: Slot<u8>,
    pub is_switch_active: Slot<bool>,

    pub service_period: Slot<u8>,
    pub service_counter: Slot<u8>,
    pub heating_target: Slot<i8>,
}

/// Configuration the unit reports about itself, as opposed to runtime
/// data. Settings publish their first sighting immediately instead of
/// waiting for full init.
#[derive(Debug, Default)]
pub(crate) struct Settings {
    pub program: Slot<u8>,
    pub boost_switch: Slot<bool>,
}

/// The complete shadow. Owned by the bus participant for its whole life.
#[derive(Debug, Default)]
pub struct DeviceState {
    pub(crate) data: RuntimeData,
    pub(crate) settings: Settings,
    last_change: Option<Millis>,
}

impl DeviceState {
    pub fn inside_celsius(&self) -> Option<i8> {
        self.data.t_inside.get()
    }

    pub fn outside_celsius(&self) -> Option<i8> {
        self.data.t_outside.get()
    }

    pub fn incoming_celsius(&self) -> Option<i8> {
        self.data.t_incoming.get()
    }

    pub fn exhaust_celsius(&self) -> Option<i8> {
        self.data.t_exhaust.get()
    }

    pub fn humidity_1(&self) -> Option<u8> {
        self.data.rh1.get().flatten()
    }

    pub fn humidity_2(&self) -> Option<u8> {
        self.data.rh2.get().flatten()
    }

    pub fn co2_ppm(&self) -> Option<u16> {
        self.data.co2.get()
    }

    pub fn fan_speed(&self) -> Option<u8> {
        self.data.fan_speed.get().flatten()
    }

    pub fn default_fan_speed(&self) -> Option<u8> {
        self.data.default_fan_speed.get().flatten()
    }

    pub fn status_word(&self) -> Option<u8> {
        self.data.status.get()
    }

    pub fn is_on(&self) -> Option<bool> {
        self.data.is_on.get()
    }

    pub fn is_rh_mode(&self) -> Option<bool> {
        self.data.is_rh_mode.get()
    }

    pub fn is_heating_mode(&self) -> Option<bool> {
        self.data.is_heating_mode.get()
    }

    pub fn is_filter_guard(&self) -> Option<bool> {
        self.data.is_filter_guard.get()
    }

    pub fn is_heating(&self) -> Option<bool> {
        self.data.is_heating.get()
    }

    pub fn is_fault(&self) -> Option<bool> {
        self.data.is_fault.get()
    }

    pub fn is_service_needed(&self) -> Option<bool> {
        self.data.is_service.get()
    }

    pub fn io08_word(&self) -> Option<u8> {
        self.data.io08.get()
    }

    pub fn is_summer_mode(&self) -> Option<bool> {
        self.data.is_summer_mode.get()
    }

    pub fn is_error_relay(&self) -> Option<bool> {
        self.data.is_error_relay.get()
    }

    pub fn is_motor_in(&self) -> Option<bool> {
        self.data.is_motor_in.get()
    }

    pub fn is_front_heating(&self) -> Option<bool> {
        self.data.is_front_heating.get()
    }

    pub fn is_motor_out(&self) -> Option<bool> {
        self.data.is_motor_out.get()
    }

    pub fn is_extra_function(&self) -> Option<bool> {
        self.data.is_extra_function.get()
    }

    pub fn flags06_word(&self) -> Option<u8> {
        self.data.flags06.get()
    }

    /// Whether the fireplace/boost program is currently running.
    pub fn is_switch_active(&self) -> Option<bool> {
        self.data.is_switch_active.get()
    }

    pub fn service_period_months(&self) -> Option<u8> {
        self.data.service_period.get()
    }

    pub fn service_counter_months(&self) -> Option<u8> {
        self.data.service_counter.get()
    }

    pub fn heating_target_celsius(&self) -> Option<i8> {
        self.data.heating_target.get()
    }

    pub fn program_word(&self) -> Option<u8> {
        self.settings.program.get()
    }

    pub fn switch_type(&self) -> Option<SwitchType> {
        self.settings.boost_switch.get().map(|boost| {
            if boost {
                SwitchType::Boost
            } else {
                SwitchType::Fireplace
            }
        })
    }

    /// Time of the last observed value change, if any.
    pub fn updated_at(&self) -> Option<Millis> {
        self.last_change
    }

    /// All four temperatures have been received at least once.
    pub fn is_temperature_init_done(&self) -> bool {
        self.data.t_outside.seen()
            && self.data.t_inside.seen()
            && self.data.t_exhaust.seen()
            && self.data.t_incoming.seen()
    }

    /// Every status-relevant variable has been received at least once.
    pub fn is_status_init_done(&self) -> bool {
        self.data.is_on.seen()
            && self.data.is_rh_mode.seen()
            && self.data.is_heating_mode.seen()
            && self.data.io08.seen()
            && self.data.is_filter_guard.seen()
            && self.data.is_heating.seen()
            && self.data.is_fault.seen()
            && self.data.is_service.seen()
            && self.data.fan_speed.seen()
            && self.data.default_fan_speed.seen()
            && self.data.service_period.seen()
            && self.data.service_counter.seen()
            && self.data.heating_target.seen()
    }

    pub(crate) fn touch(&mut self, now: Millis) {
        self.last_change = Some(now);
    }
}
