// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Discrete-event scheduler
//!
//! This module implements the virtual-clock event queue that every timed
//! hardware component hangs off. The Saturn has several independently
//! clocked units (two SH-2s, VDP1/VDP2, SCSP, the CD block); instead of
//! stepping each of them every cycle, components register events at absolute
//! cycle counts and the scheduler fires them in order when the emulation
//! loop advances the clock.
//!
//! # Determinism
//!
//! Events fire in `(due_cycle, insertion_seq)` order: earlier deadlines
//! first, ties broken by registration order. This total order is independent
//! of host timing, which is what makes replays and savestate resumption
//! reproduce the exact same firing sequence.
//!
//! # Handlers
//!
//! The scheduler stores no callbacks. Each event carries an [`EventTag`]
//! naming its owning logical source, and [`Scheduler::advance_to`] hands
//! `(tag, id)` pairs to a dispatcher supplied by the caller (the `System`'s
//! match-on-tag table). Keeping the payload a plain enum is what lets the
//! pending-event list serialize into save states.
//!
//! # Example
//!
//! ```
//! use ssrx::core::timing::{EventDisposition, EventTag, Scheduler};
//!
//! let mut sched = Scheduler::new();
//! let id = sched.register_event(1000, EventTag::CddSequencer);
//!
//! let mut fired = Vec::new();
//! sched.advance_to(1500, |_sched, tag, _id| {
//!     fired.push(tag);
//!     EventDisposition::Remove
//! });
//!
//! assert_eq!(fired, vec![EventTag::CddSequencer]);
//! assert_eq!(sched.clock(), 1500);
//! assert!(!sched.contains(id));
//! ```

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// Virtual time in master-clock cycles (absolute, since reset)
pub type Cycles = u64;

/// Opaque handle for one pending scheduler entry
///
/// Unique for the lifetime of the scheduler; never reused, so a stale handle
/// can be detected instead of silently aliasing a newer event.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Encode, Decode,
)]
pub struct EventId(u64);

impl EventId {
    /// Raw handle value, for savestate serialization
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Logical source that owns a scheduled event
///
/// Save states persist the tag instead of the handler; on restore the
/// dispatch table maps tags back to live component handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
pub enum EventTag {
    /// CD drive protocol sequencer (the Reset..TxEnd state machine)
    CddSequencer,
    /// CD drive transport chain (seek, security-ring seek, TOC, scan)
    CddTransport,
    /// CD drive sector read chain
    CddRead,
}

/// Handler verdict returned to [`Scheduler::advance_to`] after each firing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventDisposition {
    /// Re-arm the same event id at `due_cycle + n`
    Reschedule(Cycles),
    /// Drop the event; the id becomes dead
    Remove,
}

/// Pending entry bookkeeping (authoritative copy, keyed by id)
#[derive(Debug, Clone, Copy)]
struct PendingEvent {
    due: Cycles,
    seq: u64,
    tag: EventTag,
}

/// Heap entry; stale copies are invalidated lazily against the pending map
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct HeapEntry {
    due: Cycles,
    seq: u64,
    id: EventId,
}

/// Discrete-event scheduler over a single virtual timeline
///
/// # Design
///
/// - `clock` is the authoritative emulated time. It only moves forward
///   (savestate restoration replaces the whole scheduler).
/// - A binary heap keyed by `(due_cycle, insertion_seq)` gives minimum-first
///   firing; a side map keyed by [`EventId`] supports O(1) cancel and
///   reschedule with lazy invalidation of stale heap entries.
/// - The scheduler itself never fails; malformed use (rescheduling a dead
///   id, advancing backwards) is a caller bug caught by `debug_assert!`.
#[derive(Debug)]
pub struct Scheduler {
    /// Virtual clock (cycles since reset)
    clock: Cycles,
    /// Next insertion sequence number (FIFO tiebreak for equal due cycles)
    next_seq: u64,
    /// Next event id to hand out
    next_id: u64,
    /// Min-heap of pending entries ordered by `(due, seq)`
    queue: BinaryHeap<Reverse<HeapEntry>>,
    /// Authoritative pending set
    pending: HashMap<EventId, PendingEvent>,
}

impl Scheduler {
    /// Create an empty scheduler with the clock at zero
    pub fn new() -> Self {
        Self {
            clock: 0,
            next_seq: 0,
            next_id: 0,
            queue: BinaryHeap::new(),
            pending: HashMap::new(),
        }
    }

    /// Current virtual clock value
    #[inline]
    pub fn clock(&self) -> Cycles {
        self.clock
    }

    /// Number of pending events
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// True when no events are pending
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// True while `id` refers to a pending (not yet fired or canceled) event
    pub fn contains(&self, id: EventId) -> bool {
        self.pending.contains_key(&id)
    }

    /// Register a new event due `delay` cycles from now
    ///
    /// A delay of 0 fires on the next [`Scheduler::advance_to`] call that
    /// reaches the current clock.
    ///
    /// # Returns
    ///
    /// The handle to use with [`Scheduler::reschedule`] and
    /// [`Scheduler::cancel`].
    pub fn register_event(&mut self, delay: Cycles, tag: EventTag) -> EventId {
        let id = EventId(self.next_id);
        self.next_id += 1;
        let due = self.clock + delay;
        self.insert(id, due, tag);
        log::trace!("Scheduler: registered {:?} as {:?} due at {}", tag, id, due);
        id
    }

    /// Move a pending event to a new deadline `delay` cycles from now
    ///
    /// The id and tag are kept. Rescheduling a dead id (already fired or
    /// canceled) is a caller bug: asserted in debug builds, a silent no-op
    /// in release.
    pub fn reschedule(&mut self, id: EventId, delay: Cycles) {
        let Some(prev) = self.pending.get(&id).copied() else {
            debug_assert!(false, "reschedule of dead event {id:?}");
            return;
        };
        // Re-inserting bumps the sequence number; the old heap entry goes
        // stale and is skipped when it surfaces.
        self.insert(id, self.clock + delay, prev.tag);
    }

    /// Cancel a pending event
    ///
    /// Idempotent: canceling a dead or never-issued id is a no-op.
    pub fn cancel(&mut self, id: EventId) {
        if self.pending.remove(&id).is_some() {
            log::trace!("Scheduler: canceled {:?}", id);
        }
    }

    /// Cycles from the current clock to the earliest pending deadline
    ///
    /// Returns `None` when nothing is pending. The emulation loop uses this
    /// to size processor batches.
    pub fn until_next(&self) -> Option<Cycles> {
        self.pending
            .values()
            .map(|p| p.due)
            .min()
            .map(|due| due.saturating_sub(self.clock))
    }

    /// Find the pending event owned by `tag`, if any
    ///
    /// Used after savestate restoration so components can re-bind their
    /// handles. When a tag owns several entries the earliest
    /// `(due, insertion_seq)` one is returned; the drive never schedules two
    /// events under one tag.
    pub fn find_by_tag(&self, tag: EventTag) -> Option<EventId> {
        self.pending
            .iter()
            .filter(|(_, p)| p.tag == tag)
            .min_by_key(|(_, p)| (p.due, p.seq))
            .map(|(id, _)| *id)
    }

    /// Advance the virtual clock to `target`, firing every due event
    ///
    /// Events with `due_cycle <= target` fire in `(due_cycle,
    /// insertion_seq)` order; the clock sits at each event's due cycle while
    /// its handler runs and lands exactly on `target` afterwards. Handlers
    /// may register new events through the `&mut Scheduler` they receive;
    /// new entries due within `target` fire in the same pass.
    ///
    /// # Arguments
    ///
    /// * `target` - Absolute cycle count to advance to (must be >= clock)
    /// * `dispatch` - Handler table; returns the event's disposition
    pub fn advance_to<F>(&mut self, target: Cycles, mut dispatch: F)
    where
        F: FnMut(&mut Scheduler, EventTag, EventId) -> EventDisposition,
    {
        debug_assert!(
            target >= self.clock,
            "advance_to({}) would move the clock backwards from {}",
            target,
            self.clock
        );

        loop {
            let entry = match self.queue.peek() {
                Some(Reverse(entry)) => *entry,
                None => break,
            };

            // Drop stale heap copies left behind by cancel/reschedule.
            let live = matches!(
                self.pending.get(&entry.id),
                Some(p) if p.due == entry.due && p.seq == entry.seq
            );
            if !live {
                self.queue.pop();
                continue;
            }

            if entry.due > target {
                break;
            }

            self.queue.pop();
            let Some(pending) = self.pending.remove(&entry.id) else {
                continue;
            };

            self.clock = entry.due;
            log::trace!(
                "Scheduler: firing {:?} ({:?}) at {}",
                pending.tag,
                entry.id,
                entry.due
            );

            match dispatch(self, pending.tag, entry.id) {
                EventDisposition::Reschedule(delay) => {
                    self.insert(entry.id, entry.due + delay, pending.tag);
                }
                EventDisposition::Remove => {}
            }
        }

        self.clock = target;
    }

    /// Snapshot the pending-event list and clock for a save state
    ///
    /// Handlers are not serialized; only `(id, due_cycle, insertion_seq,
    /// tag)` tuples, sorted by firing order.
    pub fn save_state(&self) -> SchedulerState {
        let mut events: Vec<SchedulerEventState> = self
            .pending
            .iter()
            .map(|(id, p)| SchedulerEventState {
                id: id.raw(),
                due_cycle: p.due,
                insertion_seq: p.seq,
                tag: p.tag,
            })
            .collect();
        events.sort_by_key(|e| (e.due_cycle, e.insertion_seq));

        SchedulerState {
            clock: self.clock,
            next_seq: self.next_seq,
            next_id: self.next_id,
            events,
        }
    }

    /// Rebuild a scheduler from a save state
    ///
    /// Round-trips bit-exactly: clock, id/sequence counters and the full
    /// `(due_cycle, insertion_seq)` order are all restored, so subsequent
    /// [`Scheduler::advance_to`] calls fire the identical sequence.
    pub fn from_state(state: &SchedulerState) -> Self {
        let mut queue = BinaryHeap::with_capacity(state.events.len());
        let mut pending = HashMap::with_capacity(state.events.len());

        for event in &state.events {
            let id = EventId(event.id);
            queue.push(Reverse(HeapEntry {
                due: event.due_cycle,
                seq: event.insertion_seq,
                id,
            }));
            pending.insert(
                id,
                PendingEvent {
                    due: event.due_cycle,
                    seq: event.insertion_seq,
                    tag: event.tag,
                },
            );
        }

        Self {
            clock: state.clock,
            next_seq: state.next_seq,
            next_id: state.next_id,
            queue,
            pending,
        }
    }

    fn insert(&mut self, id: EventId, due: Cycles, tag: EventTag) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.insert(id, PendingEvent { due, seq, tag });
        self.queue.push(Reverse(HeapEntry { due, seq, id }));
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Serialized scheduler: clock, counters and the pending-event list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct SchedulerState {
    /// Virtual clock at capture time
    pub clock: Cycles,
    /// Insertion sequence counter
    pub next_seq: u64,
    /// Event id counter
    pub next_id: u64,
    /// Pending events in firing order
    pub events: Vec<SchedulerEventState>,
}

/// One serialized pending event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct SchedulerEventState {
    /// Raw event id
    pub id: u64,
    /// Absolute due cycle
    pub due_cycle: Cycles,
    /// FIFO tiebreak sequence
    pub insertion_seq: u64,
    /// Owning logical source
    pub tag: EventTag,
}
