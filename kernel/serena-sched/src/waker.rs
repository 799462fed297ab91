//! Waker implementation for vCPU tasks.
//!
//! Ported from the donor kernel's `sched/waker.rs`, with the per-CPU
//! target-encoding bits dropped (single CPU, so a wake always re-queues on
//! the one executor — there is no cross-CPU IPI case to handle).

use core::task::{RawWaker, RawWakerVTable, Waker};

use serena_core::task::{Priority, TaskId};

const PRIORITY_SHIFT: u32 = 62;
const ID_MASK: u64 = 0x3FFF_FFFF_FFFF_FFFF;

static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, wake, wake_by_ref, drop_waker);

/// Creates a [`Waker`] that re-queues `id` at `priority` on the global
/// executor when woken.
#[must_use]
pub fn task_waker(id: TaskId, priority: Priority) -> Waker {
    // SAFETY: `VTABLE` only ever interprets the data pointer via `pack`/`unpack`.
    unsafe { Waker::from_raw(raw_waker(id, priority)) }
}

fn pack(id: TaskId, priority: Priority) -> *const () {
    let packed = ((priority as u64) << PRIORITY_SHIFT) | (id.0 & ID_MASK);
    packed as *const ()
}

fn unpack(data: *const ()) -> (TaskId, Priority) {
    let raw = data as u64;
    let priority = Priority::from_u8((raw >> PRIORITY_SHIFT) as u8);
    (TaskId(raw & ID_MASK), priority)
}

fn raw_waker(id: TaskId, priority: Priority) -> RawWaker {
    RawWaker::new(pack(id, priority), &VTABLE)
}

fn clone(data: *const ()) -> RawWaker {
    RawWaker::new(data, &VTABLE)
}

fn wake(data: *const ()) {
    wake_by_ref(data);
}

fn wake_by_ref(data: *const ()) {
    let (id, priority) = unpack(data);
    crate::executor::global().requeue(priority, id);
}

fn drop_waker(_data: *const ()) {
    // Packed data is Copy; nothing to free.
}
