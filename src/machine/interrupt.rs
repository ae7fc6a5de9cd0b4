//! The interrupt arbiter.
//!
//! Device controllers run on their own threads and race against the
//! processor's INTA reads, so the pending and mask-disabled bitsets live
//! together behind one mutex. The arbiter only answers queries; the
//! processor decides when an interrupt is actually taken.

use std::sync::Mutex;

struct IntrState {
    /// One bit per device code: the device is in Done and requesting service.
    pending: u64,
    /// One bit per device code: masked out by the last MSKO.
    disabled: u64,
    /// Installed devices as `(code, priority)`, used by MSKO recomputes.
    devices: Vec<(u16, u16)>,
}

/// Pending-interrupt and priority-mask bitsets shared between the processor
/// and the device controllers.
pub(crate) struct IntrArbiter {
    state: Mutex<IntrState>,
}

impl IntrArbiter {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(IntrState {
                pending: 0,
                disabled: 0,
                devices: Vec::new(),
            }),
        }
    }

    /// Registers an installed device so MSKO can map its priority to a mask
    /// bit. Called once per device at machine construction.
    pub(crate) fn register(&self, code: u16, priority: u16) {
        let mut s = self.lock();
        s.devices.push((code & 0o77, priority & 0o17));
    }

    /// Sets the pending bit for a device. Called by a controller as it
    /// transitions Busy to Done.
    pub(crate) fn set(&self, code: u16) {
        self.lock().pending |= 1u64 << (code & 0o77);
    }

    /// Clears the pending bit for a device. Called by a controller as it
    /// leaves the Done state.
    pub(crate) fn clear(&self, code: u16) {
        self.lock().pending &= !(1u64 << (code & 0o77));
    }

    /// Whether any unmasked device is requesting an interrupt.
    pub(crate) fn pending_enabled(&self) -> bool {
        let s = self.lock();
        s.pending & !s.disabled != 0
    }

    /// The INTA scan: the lowest device code that is pending and not masked,
    /// or 0 when no device qualifies.
    pub(crate) fn first_enabled(&self) -> u16 {
        let s = self.lock();
        let live = s.pending & !s.disabled;
        match live {
            0 => 0,
            _ => live.trailing_zeros() as u16,
        }
    }

    /// MSKO: rebuilds the disabled set from a priority mask word. A device is
    /// masked out iff mask bit `priority` is set, with bits numbered the
    /// machine's way (bit 0 is the MSB, so priority 15 is the low-order bit).
    pub(crate) fn recompute_disabled(&self, mask: u16) {
        let mut s = self.lock();
        let mut disabled = 0u64;
        for &(code, priority) in &s.devices {
            if mask & (1 << (15 - priority)) != 0 {
                disabled |= 1u64 << code;
            }
        }
        s.disabled = disabled;
    }

    /// IORST: clears every pending request and the whole mask.
    pub(crate) fn clear_all(&self) {
        let mut s = self.lock();
        s.pending = 0;
        s.disabled = 0;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, IntrState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_enabled_scans_in_ascending_code_order() {
        let arb = IntrArbiter::new();
        arb.register(0o12, 11);
        arb.register(0o10, 14);
        arb.set(0o12);
        arb.set(0o10);
        assert_eq!(arb.first_enabled(), 0o10);
        arb.clear(0o10);
        assert_eq!(arb.first_enabled(), 0o12);
        arb.clear(0o12);
        assert_eq!(arb.first_enabled(), 0);
    }

    #[test]
    fn msko_masks_by_priority_bit() {
        let arb = IntrArbiter::new();
        arb.register(0o10, 14); // TTI
        arb.register(0o11, 15); // TTO
        arb.set(0o10);
        arb.set(0o11);

        // Priority 14 is mask bit 1 << (15 - 14).
        arb.recompute_disabled(0o2);
        assert_eq!(arb.first_enabled(), 0o11);
        assert!(arb.pending_enabled());

        // Mask both; pending bits survive the mask.
        arb.recompute_disabled(0o3);
        assert_eq!(arb.first_enabled(), 0);
        assert!(!arb.pending_enabled());

        // Unmasking brings the requests straight back.
        arb.recompute_disabled(0);
        assert_eq!(arb.first_enabled(), 0o10);
    }

    #[test]
    fn clear_all_resets_pending_and_mask() {
        let arb = IntrArbiter::new();
        arb.register(0o14, 13);
        arb.set(0o14);
        arb.recompute_disabled(0o17777);
        arb.clear_all();
        assert!(!arb.pending_enabled());
        assert_eq!(arb.first_enabled(), 0);
    }
}
