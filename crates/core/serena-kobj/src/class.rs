//! Class descriptors, the boot-time linker-section walk, and vtable dispatch.
//!
//! Every class in the runtime is a statically allocated [`ClassDescriptor`]
//! placed in the `serena_classes` linker section via
//! [`serena_linkset::linkset_entry!`] (see the [`define_class!`] macro built
//! on top of it). At boot, [`init`] walks the section once: it validates
//! every class's vtable against its declared length, fills any unoverridden
//! slot from the nearest ancestor that defines it, and marks the class
//! initialized. Dispatch after that point is a plain indexed read of
//! `vtable[slot]` — no further walking.

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use serena_core::id::ClassId;

/// Maximum number of virtual method slots a single class may declare.
///
/// Fixed so [`ClassDescriptor`] can be a `'static` value placed directly in
/// a linker section with no allocation.
pub const MAX_VTABLE_SLOTS: usize = 16;

/// Sentinel slot value meaning "not overridden by this class".
const UNSET: usize = 0;

serena_linkset::declare_linkset! {
    /// Returns every class descriptor registered via [`define_class!`].
    pub fn class_entries() -> [ClassDescriptor],
    section = "serena_classes"
}

/// A statically allocated class record.
///
/// `vtable` holds one `usize`-encoded function pointer per declared method
/// slot; a slot holding [`UNSET`] (zero) means the class does not override
/// that method and must inherit it from its nearest ancestor that does.
/// Slots are filled in place by [`init`], so `vtable` is declared with
/// interior mutability even though the descriptor itself lives in
/// read-only-looking static storage.
pub struct ClassDescriptor {
    /// Identity assigned at registration time (index into [`class_entries`]).
    pub id: ClassId,
    /// Human-readable class name, used in `fatal` diagnostics.
    pub name: &'static str,
    /// Nearest ancestor in the single-inheritance DAG, or `None` for `Any`.
    pub superclass: Option<ClassId>,
    /// Declared size of this class's instances, in bytes.
    pub instance_size: usize,
    /// Number of meaningful entries in `vtable` (the declared vtable size).
    pub vtable_len: usize,
    /// Method slots. Unused tail entries (index >= `vtable_len`) are ignored.
    pub vtable: [AtomicUsize; MAX_VTABLE_SLOTS],
    /// Set once `init` has validated and resolved this class's vtable.
    initialized: AtomicBool,
}

impl ClassDescriptor {
    /// Builds a descriptor from a const vtable array, to be placed in the
    /// class linker section by [`define_class!`].
    ///
    /// `vtable` entries are the method pointers this class overrides
    /// (as `usize`, via `as usize` on a `fn` pointer of the right shape);
    /// pass [`UNSET`] (`0`) for slots inherited from the superclass.
    #[must_use]
    pub const fn new(
        id: ClassId,
        name: &'static str,
        superclass: Option<ClassId>,
        instance_size: usize,
        vtable_len: usize,
        vtable: [usize; MAX_VTABLE_SLOTS],
    ) -> Self {
        // `AtomicUsize::new` is const, but building an array of non-Copy
        // atomics from a `[usize; N]` needs an explicit unrolled build;
        // MAX_VTABLE_SLOTS is small and fixed so this is written out plainly
        // via a const fn helper below instead of a loop (loops over `for`
        // are not available in const fn on our MSRV for this shape).
        Self {
            id,
            name,
            superclass,
            instance_size,
            vtable_len,
            vtable: const_atomic_array(vtable),
            initialized: AtomicBool::new(false),
        }
    }

    /// Returns `true` once [`init`] has resolved this class's vtable.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Reads a raw vtable slot.
    ///
    /// `UNSET` (`0`) means "not yet resolved" — only meaningful before
    /// [`init`] runs or while walking ancestors during `init` itself.
    fn raw_slot(&self, slot: usize) -> usize {
        self.vtable[slot].load(Ordering::Acquire)
    }

    fn set_raw_slot(&self, slot: usize, value: usize) {
        self.vtable[slot].store(value, Ordering::Release);
    }
}

const fn const_atomic_array(src: [usize; MAX_VTABLE_SLOTS]) -> [AtomicUsize; MAX_VTABLE_SLOTS] {
    let mut out = [const { AtomicUsize::new(0) }; MAX_VTABLE_SLOTS];
    let mut i = 0;
    while i < MAX_VTABLE_SLOTS {
        out[i] = AtomicUsize::new(src[i]);
        i += 1;
    }
    out
}

/// Declares a class descriptor and places it in the class linker section.
///
/// # Examples
///
/// ```ignore
/// serena_kobj::define_class! {
///     INODE_CLASS: id = ClassId::new(3), name = "Inode",
///     superclass = Some(ANY_CLASS_ID), instance_size = 64,
///     vtable_len = 2, vtable = [read as usize, write as usize],
/// }
/// ```
#[macro_export]
macro_rules! define_class {
    (
        $static_name:ident : id = $id:expr, name = $name:expr,
        superclass = $super_:expr, instance_size = $isize:expr,
        vtable_len = $vlen:expr, vtable = $vtable:expr $(,)?
    ) => {
        $crate::__linkset_class! {
            $static_name,
            $crate::class::ClassDescriptor::new(
                $id, $name, $super_, $isize, $vlen,
                $crate::class::pad_vtable($vtable),
            )
        }
    };
}

/// Pads a caller-supplied vtable slice out to [`MAX_VTABLE_SLOTS`] with
/// [`UNSET`] entries. Exposed for [`define_class!`].
#[must_use]
pub const fn pad_vtable<const N: usize>(slots: [usize; N]) -> [usize; MAX_VTABLE_SLOTS] {
    assert!(N <= MAX_VTABLE_SLOTS, "class declares too many vtable slots");
    let mut out = [UNSET; MAX_VTABLE_SLOTS];
    let mut i = 0;
    while i < N {
        out[i] = slots[i];
        i += 1;
    }
    out
}

#[doc(hidden)]
#[macro_export]
macro_rules! __linkset_class {
    ($static_name:ident, $value:expr) => {
        serena_linkset::linkset_entry!("serena_classes", $static_name: $crate::class::ClassDescriptor = $value);
    };
}

/// Looks up a class descriptor by id.
#[must_use]
pub fn lookup(id: ClassId) -> Option<&'static ClassDescriptor> {
    class_entries().iter().find(|c| c.id == id)
}

/// Walks the class linker section once at boot: validates every class's
/// vtable length, fills unoverridden slots from the nearest ancestor, and
/// marks each class initialized.
///
/// # Panics
///
/// Panics (the kernel-mode equivalent of `fatal`) if a class's declared
/// `vtable_len` exceeds [`MAX_VTABLE_SLOTS`], or if its `superclass` id does
/// not resolve to a registered class.
pub fn init() {
    for class in class_entries() {
        assert!(
            class.vtable_len <= MAX_VTABLE_SLOTS,
            "class {} declares an oversized vtable",
            class.name
        );
        for slot in 0..class.vtable_len {
            if class.raw_slot(slot) == UNSET {
                let resolved = resolve_inherited_slot(class, slot)
                    .unwrap_or_else(|| panic!("class {} has no implementation for slot {slot}", class.name));
                class.set_raw_slot(slot, resolved);
            }
        }
        class.initialized.store(true, Ordering::Release);
    }
}

/// Walks ancestors of `class` looking for the nearest one with a non-`UNSET`
/// slot — the value `class` inherits when it does not override that method.
fn resolve_inherited_slot(class: &ClassDescriptor, slot: usize) -> Option<usize> {
    let mut current = class.superclass;
    while let Some(id) = current {
        let ancestor = lookup(id).unwrap_or_else(|| panic!("unresolved superclass id in class table"));
        let value = ancestor.raw_slot(slot);
        if value != UNSET {
            return Some(value);
        }
        current = ancestor.superclass;
    }
    None
}

/// Returns `true` iff `ancestor` is `descendant` itself or an ancestor of it
/// in the single-inheritance DAG.
///
/// This is `instanceof(x, C)` from spec.md §4.1 once `descendant = classof(x)`.
#[must_use]
pub fn is_ancestor(ancestor: ClassId, descendant: ClassId) -> bool {
    let mut current = Some(descendant);
    while let Some(id) = current {
        if id == ancestor {
            return true;
        }
        current = lookup(id).and_then(|c| c.superclass);
    }
    false
}

/// Resolves `super` dispatch for a method call made by code statically typed
/// as `static_class`, on slot `slot`.
///
/// Per spec.md §4.1: "the nearest ancestor whose method slot differs from
/// the current class's slot". A top class (no superclass, or every ancestor
/// shares the same slot value) has no valid super target — callers must
/// treat `None` as fatal, matching the "a top class calling super is fatal"
/// failure mode.
#[must_use]
pub fn resolve_super(static_class: ClassId, slot: usize) -> Option<usize> {
    let me = lookup(static_class)?;
    let my_value = me.raw_slot(slot);
    let mut current = me.superclass;
    while let Some(id) = current {
        let ancestor = lookup(id)?;
        let value = ancestor.raw_slot(slot);
        if value != my_value {
            return Some(value);
        }
        current = ancestor.superclass;
    }
    None
}
