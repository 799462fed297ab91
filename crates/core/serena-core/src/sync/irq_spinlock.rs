//! Interrupt-safe spin lock.
//!
//! Disables interrupts before acquiring the inner spinlock and restores the
//! previous interrupt state on release. Needed anywhere a lock is shared
//! between an interrupt handler and ordinary kernel code — without this, a
//! handler could preempt the lock holder on the same CPU and deadlock
//! spinning for a lock it will never release.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

/// A spin lock that disables interrupts while held.
pub struct IrqSpinLock<T> {
    locked: AtomicBool,
    data: UnsafeCell<T>,
}

// SAFETY: atomic operations on `locked` guarantee exclusive access to `data`.
unsafe impl<T: Send> Send for IrqSpinLock<T> {}
// SAFETY: same reasoning as `Send`.
unsafe impl<T: Send> Sync for IrqSpinLock<T> {}

impl<T> IrqSpinLock<T> {
    /// Creates a new unlocked `IrqSpinLock`.
    pub const fn new(value: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            data: UnsafeCell::new(value),
        }
    }

    /// Acquires the lock, disabling interrupts first.
    pub fn lock(&self) -> IrqSpinLockGuard<'_, T> {
        let saved_flags = save_flags_and_disable();

        loop {
            if self
                .locked
                .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return IrqSpinLockGuard {
                    lock: self,
                    saved_flags,
                };
            }
            while self.locked.load(Ordering::Relaxed) {
                core::hint::spin_loop();
            }
        }
    }

    /// Attempts to acquire the lock without blocking.
    pub fn try_lock(&self) -> Option<IrqSpinLockGuard<'_, T>> {
        let saved_flags = save_flags_and_disable();
        if self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            Some(IrqSpinLockGuard {
                lock: self,
                saved_flags,
            })
        } else {
            restore_flags(saved_flags);
            None
        }
    }
}

/// RAII guard that restores interrupt state on drop.
pub struct IrqSpinLockGuard<'a, T> {
    lock: &'a IrqSpinLock<T>,
    saved_flags: u16,
}

impl<T> Deref for IrqSpinLockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: holding the guard implies exclusive access to `data`.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for IrqSpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: holding the guard implies exclusive access to `data`.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for IrqSpinLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
        restore_flags(self.saved_flags);
    }
}

/// `!Send` — the saved interrupt mask is only meaningful on the CPU that
/// took it.
impl<T> !Send for IrqSpinLockGuard<'_, T> {}

#[cfg(all(target_os = "none", target_arch = "m68k"))]
#[inline]
fn save_flags_and_disable() -> u16 {
    let sr: u16;
    // SAFETY: reading SR and raising the interrupt mask to level 7 is valid
    // in supervisor mode, which the kernel always runs in.
    unsafe {
        core::arch::asm!(
            "move.w %sr, {0:w}",
            "or.w #0x0700, %sr",
            out(reg) sr,
            options(nomem, nostack),
        );
    }
    sr
}

#[cfg(all(target_os = "none", target_arch = "m68k"))]
#[inline]
fn restore_flags(sr: u16) {
    // SAFETY: restoring a previously-saved SR value is always valid.
    unsafe {
        core::arch::asm!("move.w {0:w}, %sr", in(reg) sr, options(nomem, nostack));
    }
}

#[cfg(not(all(target_os = "none", target_arch = "m68k")))]
#[inline]
fn save_flags_and_disable() -> u16 {
    0
}

#[cfg(not(all(target_os = "none", target_arch = "m68k")))]
#[inline]
fn restore_flags(_sr: u16) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_excludes() {
        let lock = IrqSpinLock::new(0u32);
        {
            let mut guard = lock.lock();
            *guard += 1;
        }
        assert_eq!(*lock.lock(), 1);
    }

    #[test]
    fn try_lock_fails_while_held() {
        let lock = IrqSpinLock::new(0u32);
        let _guard = lock.lock();
        assert!(lock.try_lock().is_none());
    }

    #[test]
    fn try_lock_succeeds_after_release() {
        let lock = IrqSpinLock::new(0u32);
        {
            let _guard = lock.lock();
        }
        assert!(lock.try_lock().is_some());
    }

    #[test]
    fn deref_mut_mutates() {
        let lock = IrqSpinLock::new(vec![1, 2, 3]);
        lock.lock().push(4);
        assert_eq!(*lock.lock(), vec![1, 2, 3, 4]);
    }
}
