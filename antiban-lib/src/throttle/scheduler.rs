use std::fmt;
use std::time::Duration;

use crate::throttle::SlotKey;

/// The slice of the fetch pipeline's scheduler the throttle drives.
///
/// Every command is fire-and-forget and must be idempotent: the throttle
/// may pause an already paused pipeline when a pause timer is replaced.
/// Implementations must not call back into the
/// [`ThrottleController`](crate::throttle::ThrottleController), since commands
/// are issued while the state of the affected unit is locked.
pub trait Scheduler: Send + Sync + fmt::Debug {
    /// Stop dispatching new requests on every slot
    fn pause(&self);

    /// Resume dispatching after [`Scheduler::pause`]
    fn unpause(&self);

    /// Current delay between requests on `key`, or `None` if the scheduler
    /// has no such slot (anymore)
    fn slot_delay(&self, key: &SlotKey) -> Option<Duration>;

    /// Replace the delay between requests on `key`
    fn set_slot_delay(&self, key: &SlotKey, delay: Duration);

    /// Stop dispatching on a single slot.
    ///
    /// Only issued when pausing per slot. The default does nothing, for
    /// pipelines which gate admission through
    /// [`ThrottleController::is_admitted`](crate::throttle::ThrottleController::is_admitted)
    /// instead.
    fn pause_slot(&self, key: &SlotKey) {
        let _ = key;
    }

    /// Resume dispatching on a single slot after [`Scheduler::pause_slot`]
    fn unpause_slot(&self, key: &SlotKey) {
        let _ = key;
    }
}
