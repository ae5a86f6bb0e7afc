//! Lock-free triple buffer between the simulation and render threads
//!
//! Each of the three slots is owned by exactly one party at a time: the
//! writer, the reader, or the shared exchange. Ownership moves only through
//! a single `AtomicU8` holding the exchanged slot index plus a "fresh" bit.
//! A fence attached by the reader travels with its slot and is waited on
//! before the writer touches that slot again.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::constants::render_state::SLOT_COUNT;
use crate::renderer::fence::FrameFence;

use super::extension::{ExtensionInit, ExtensionKey, Extensions};
use super::state::{ChangeCounters, RenderState};

const INDEX_MASK: u8 = 0b011;
const FRESH_BIT: u8 = 0b100;

struct Slot {
    state: RenderState,
    /// Completion fence of the last frame that read this slot
    fence: Option<FrameFence>,
}

struct SharedSlots {
    slots: [UnsafeCell<Slot>; SLOT_COUNT],
    exchange: AtomicU8,
}

// SAFETY: every slot index is held by exactly one of the writer, the reader
// or `exchange`. Only the holder dereferences that slot, and indices change
// hands through `AcqRel` swaps, so all accesses to a slot are ordered.
unsafe impl Sync for SharedSlots {}

impl SharedSlots {
    /// # Safety
    /// Caller must hold `index` and must not create a second reference to
    /// the slot while this one lives.
    #[allow(clippy::mut_from_ref)]
    unsafe fn slot_mut(&self, index: u8) -> &mut Slot {
        &mut *self.slots[index as usize].get()
    }

    /// # Safety
    /// Caller must hold `index`.
    unsafe fn slot(&self, index: u8) -> &Slot {
        &*self.slots[index as usize].get()
    }
}

/// Entry point for building a writer/reader pair
pub struct RenderStateBuffer;

impl RenderStateBuffer {
    pub fn builder() -> RenderStateBufferBuilder {
        RenderStateBufferBuilder { inits: Vec::new() }
    }

    /// Buffer without extensions
    pub fn new(init_state: RenderState) -> (StateWriter, StateReader) {
        Self::builder().build(init_state)
    }
}

/// Collects extension registrations before the slots are created
pub struct RenderStateBufferBuilder {
    inits: Vec<ExtensionInit>,
}

impl RenderStateBufferBuilder {
    /// Attach state of type `T` that exists once per slot. `init` runs once
    /// for each slot.
    pub fn register_extension<T: Send + 'static>(
        &mut self,
        init: impl Fn() -> T + 'static,
    ) -> ExtensionKey<T> {
        let key = ExtensionKey::new(self.inits.len());
        self.inits.push(Box::new(move || Box::new(init())));
        key
    }

    /// Create the three slots from `init_state` and split into handles
    pub fn build(self, init_state: RenderState) -> (StateWriter, StateReader) {
        let slots: [UnsafeCell<Slot>; SLOT_COUNT] = std::array::from_fn(|_| {
            UnsafeCell::new(Slot {
                state: init_state.duplicate(Extensions::from_inits(&self.inits)),
                fence: None,
            })
        });

        log::debug!(
            "[RenderStateBuffer] Created {} slots with {} extensions",
            SLOT_COUNT,
            self.inits.len()
        );

        let shared = Arc::new(SharedSlots {
            slots,
            exchange: AtomicU8::new(1),
        });

        let writer = StateWriter {
            shared: shared.clone(),
            index: 0,
            cycle: init_state.cycle + 1,
            changes: init_state.changes,
            prepared: false,
        };
        let reader = StateReader { shared, index: 2 };
        (writer, reader)
    }
}

/// Producer handle. Unique; owns the writable slot.
pub struct StateWriter {
    shared: Arc<SharedSlots>,
    index: u8,
    /// Cycle the next publish will carry
    cycle: u64,
    /// Counters as of the last publish, carried into every new slot
    changes: ChangeCounters,
    /// Fence waited and counters synced for the current slot
    prepared: bool,
}

impl StateWriter {
    fn slot(&mut self) -> &mut Slot {
        // SAFETY: the writer holds `self.index` and `&mut self` prevents a
        // second live reference.
        unsafe { self.shared.slot_mut(self.index) }
    }

    fn prepare(&mut self) {
        let (cycle, changes) = (self.cycle, self.changes);
        let slot = self.slot();
        slot.fence = None;
        slot.state.cycle = cycle;
        slot.state.changes = changes;
        self.prepared = true;
    }

    /// The slot the producer may mutate. Waits for the GPU to finish the last
    /// frame that read it.
    ///
    /// Only `cycle` and `changes` are refreshed. Everything else is whatever
    /// an older publish (or the initial state) left in the slot, not the
    /// latest publish, so the producer must rewrite the whole state before
    /// `publish`.
    pub fn acquire_writable(&mut self) -> &mut RenderState {
        if !self.prepared {
            let index = self.index;
            if let Some(fence) = &self.slot().fence {
                if !fence.is_signaled() {
                    log::trace!("[RenderStateBuffer] Waiting on GPU fence for slot {}", index);
                    fence.wait();
                }
            }
            self.prepare();
        }
        &mut self.slot().state
    }

    /// Like `acquire_writable` but returns `None` instead of waiting
    pub fn try_acquire_writable(&mut self) -> Option<&mut RenderState> {
        if !self.prepared {
            if let Some(fence) = &self.slot().fence {
                if !fence.is_signaled() {
                    return None;
                }
            }
            self.prepare();
        }
        Some(&mut self.slot().state)
    }

    /// Make the writable slot the newest readable state and take over the
    /// slot the reader released (or the unread previous publish).
    pub fn publish(&mut self) {
        let state = self.acquire_writable();
        state.finalize();
        let changes = state.changes;

        self.changes = changes;
        self.cycle += 1;

        let previous = self
            .shared
            .exchange
            .swap(self.index | FRESH_BIT, Ordering::AcqRel);
        self.index = previous & INDEX_MASK;
        self.prepared = false;
    }

    /// Cycle of the next publish
    pub fn cycle(&self) -> u64 {
        self.cycle
    }
}

/// Consumer handle. Unique; owns the readable slot.
pub struct StateReader {
    shared: Arc<SharedSlots>,
    index: u8,
}

impl StateReader {
    /// A publish happened that this reader has not picked up yet
    pub fn has_fresh(&self) -> bool {
        self.shared.exchange.load(Ordering::Acquire) & FRESH_BIT != 0
    }

    /// Latest fully published state. Never blocks the writer.
    pub fn current_readable(&mut self) -> &RenderState {
        if self.has_fresh() {
            let previous = self.shared.exchange.swap(self.index, Ordering::AcqRel);
            self.index = previous & INDEX_MASK;
        }
        self.current()
    }

    /// State held since the last `current_readable`, without checking for
    /// a newer publish
    pub fn current(&self) -> &RenderState {
        // SAFETY: the reader holds `self.index`; the writer never touches a
        // slot until the reader has swapped it back into `exchange`.
        unsafe { &self.shared.slot(self.index).state }
    }

    /// Tie the held slot to the GPU work that reads it. The writer will not
    /// reuse the slot before `fence` signals.
    pub fn attach_fence(&mut self, fence: FrameFence) {
        // SAFETY: as in `current`; `&mut self` rules out a live `&RenderState`.
        unsafe { self.shared.slot_mut(self.index).fence = Some(fence) };
    }
}
