//! Slot bookkeeping
//!
//! Every slot id lives in exactly one of the free list or the alive list. Both are
//! array-backed stacks whose tops are counters in the state block. The device passes
//! and the host model below run the same functions over a [`SlotMemory`].

use crate::gpu::commands::{DispatchIndirectCommand, DrawArraysIndirectCommand};
use crate::sort::{SortArguments, WORKGROUP_SIZE};

/// Word index of the alive counter in the state block
pub const ALIVE: u32 = 0;
/// Word index of the dead counter (free list top)
pub const DEAD: u32 = 1;
/// Word index of the snapshot the simulate pass iterates over
pub const SIMULATE: u32 = 2;
/// Word index of the dropped-emission counter
pub const DROPPED: u32 = 3;

/// The arrays the bookkeeping touches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotArray {
    Counters,
    FreeList,
    AliveList,
    /// Distance keys of the survivors, the sort's input keys
    SortKeys,
    /// Slot ids of the survivors, the sort's input values
    SortValues,
}

/// Word memory the bookkeeping runs against
pub trait SlotMemory {
    fn load(&mut self, array: SlotArray, index: u32) -> u32;
    fn store(&mut self, array: SlotArray, index: u32, value: u32);

    fn atomic_add(&mut self, array: SlotArray, index: u32, value: u32) -> u32 {
        let old = self.load(array, index);
        self.store(array, index, old.wrapping_add(value));
        old
    }

    fn atomic_sub(&mut self, array: SlotArray, index: u32, value: u32) -> u32 {
        let old = self.load(array, index);
        self.store(array, index, old.wrapping_sub(value));
        old
    }
}

/// Put every slot on the free list and zero the counters
pub fn reset_slots(memory: &mut impl SlotMemory, capacity: u32) {
    for slot in 0..capacity {
        memory.store(SlotArray::FreeList, slot, slot);
    }
    memory.store(SlotArray::Counters, ALIVE, 0);
    memory.store(SlotArray::Counters, DEAD, capacity);
    memory.store(SlotArray::Counters, SIMULATE, 0);
    memory.store(SlotArray::Counters, DROPPED, 0);
}

/// Pop a slot off the free list
///
/// Decrements `dead` first and checks afterwards. When the pool is exhausted the
/// decrement is undone, the emission counted as dropped and `None` returned.
pub fn pop_free_slot(memory: &mut impl SlotMemory) -> Option<u32> {
    let old = memory.atomic_sub(SlotArray::Counters, DEAD, 1) as i32;
    if old <= 0 {
        memory.atomic_add(SlotArray::Counters, DEAD, 1);
        memory.atomic_add(SlotArray::Counters, DROPPED, 1);
        return None;
    }
    Some(memory.load(SlotArray::FreeList, (old - 1) as u32))
}

pub fn push_free_slot(memory: &mut impl SlotMemory, slot: u32) {
    let top = memory.atomic_add(SlotArray::Counters, DEAD, 1);
    memory.store(SlotArray::FreeList, top, slot);
}

/// Append to the alive list; returns the index written
pub fn push_alive(memory: &mut impl SlotMemory, slot: u32) -> u32 {
    let index = memory.atomic_add(SlotArray::Counters, ALIVE, 1);
    memory.store(SlotArray::AliveList, index, slot);
    index
}

/// Append a survivor of the simulate pass to the sort input
pub fn push_survivor(memory: &mut impl SlotMemory, slot: u32, key: u32) -> u32 {
    let index = memory.atomic_add(SlotArray::Counters, ALIVE, 1);
    memory.store(SlotArray::SortKeys, index, key);
    memory.store(SlotArray::SortValues, index, slot);
    index
}

/// Snapshot `alive` for the simulate pass and reset it
///
/// Returns the simulate pass's dispatch arguments; zero alive particles give zero groups.
pub fn presimulate(memory: &mut impl SlotMemory) -> DispatchIndirectCommand {
    let alive = memory.load(SlotArray::Counters, ALIVE);
    memory.store(SlotArray::Counters, SIMULATE, alive);
    memory.store(SlotArray::Counters, ALIVE, 0);
    DispatchIndirectCommand::covering(alive, WORKGROUP_SIZE)
}

/// Simulate one slot: survivors go to the sort input, the rest back to the free list
pub fn retire_or_keep(memory: &mut impl SlotMemory, slot: u32, alpha: f32, key: u32) {
    if alpha > 0.0 {
        push_survivor(memory, slot, key);
    } else {
        push_free_slot(memory, slot);
    }
}

/// Draw and sort arguments for the survivors
pub fn postsimulate(memory: &mut impl SlotMemory) -> (DrawArraysIndirectCommand, SortArguments) {
    let alive = memory.load(SlotArray::Counters, ALIVE);
    (
        DrawArraysIndirectCommand::new(alive, 1),
        SortArguments::for_count(alive),
    )
}

/// Host model of the slot memory
#[derive(Debug, Clone, Default)]
pub struct HostSlots {
    pub counters: [u32; 4],
    pub free_list: Vec<u32>,
    pub alive_list: Vec<u32>,
    pub sort_keys: Vec<u32>,
    pub sort_values: Vec<u32>,
}

impl HostSlots {
    pub fn new(capacity: u32) -> Self {
        let len = capacity as usize;
        let mut slots = Self {
            counters: [0; 4],
            free_list: vec![0; len],
            alive_list: vec![0; len],
            sort_keys: vec![0; len],
            sort_values: vec![0; len],
        };
        reset_slots(&mut slots, capacity);
        slots
    }

    pub fn alive(&self) -> u32 {
        self.counters[ALIVE as usize]
    }

    pub fn dead(&self) -> u32 {
        self.counters[DEAD as usize]
    }

    pub fn dropped(&self) -> u32 {
        self.counters[DROPPED as usize]
    }

    fn array(&mut self, array: SlotArray) -> &mut [u32] {
        match array {
            SlotArray::Counters => &mut self.counters,
            SlotArray::FreeList => &mut self.free_list,
            SlotArray::AliveList => &mut self.alive_list,
            SlotArray::SortKeys => &mut self.sort_keys,
            SlotArray::SortValues => &mut self.sort_values,
        }
    }
}

impl SlotMemory for HostSlots {
    fn load(&mut self, array: SlotArray, index: u32) -> u32 {
        self.array(array).get(index as usize).copied().unwrap_or(0)
    }

    fn store(&mut self, array: SlotArray, index: u32, value: u32) {
        if let Some(word) = self.array(array).get_mut(index as usize) {
            *word = value;
        }
    }
}
