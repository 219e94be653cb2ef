//! Resource allocation and transient aliasing.
//!
//! Every output in the plan becomes a resource. Lifetimes decide storage:
//!
//! | Lifetime | Storage |
//! |----------|---------|
//! | Variable | External, never allocated |
//! | Product | Dedicated slot |
//! | Persistent | Dedicated slot, kept across frames |
//! | Transient | Slot from a per-device pool, shared with transients that are never live at the same time |
//!
//! Transient lifetimes are intervals over plan positions, from the producing
//! step to the last consuming step. Coloring is greedy in plan order: a
//! transient reuses the lowest-numbered pool slot whose current occupant died
//! strictly before the transient is produced.

use crate::device::DeviceHandle;
use crate::graph::ResourceLifetime;

use super::PlanStep;

/// Identifies one output of one plan step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId {
    pub producer: PlanStep,
    pub output: usize,
}

/// Index into [`ResourceTable::storage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorageId(u32);

impl StorageId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Where a resource lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageBinding {
    /// Supplied by the application.
    External,
    /// Storage owned by this resource alone.
    Dedicated(StorageId),
    /// Slot of the transient pool, possibly shared with other transients.
    Aliased(StorageId),
}

impl StorageBinding {
    pub fn storage(self) -> Option<StorageId> {
        match self {
            Self::External => None,
            Self::Dedicated(id) | Self::Aliased(id) => Some(id),
        }
    }
}

/// Allocation decision for one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceAllocation {
    pub resource: ResourceId,
    pub lifetime: ResourceLifetime,
    pub device: DeviceHandle,
    pub size_bytes: u64,
    /// Plan position of the producer.
    pub first_use: usize,
    /// Plan position of the last consumer (the producer if unconsumed).
    pub last_use: usize,
    pub binding: StorageBinding,
}

impl ResourceAllocation {
    /// Whether both resources are live at some common plan position.
    pub fn overlaps(&self, other: &Self) -> bool {
        self.first_use <= other.last_use && other.first_use <= self.last_use
    }
}

/// A physical storage slot handed to the application's allocator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhysicalStorage {
    pub id: StorageId,
    pub device: DeviceHandle,
    /// Largest footprint among its residents.
    pub size_bytes: u64,
    pub persistent: bool,
    /// Number of resources bound to this slot.
    pub residents: usize,
}

/// Resource allocation table of a plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceTable {
    allocations: Vec<ResourceAllocation>,
    storage: Vec<PhysicalStorage>,
}

impl ResourceTable {
    pub fn allocations(&self) -> &[ResourceAllocation] {
        &self.allocations
    }

    pub fn storage(&self) -> &[PhysicalStorage] {
        &self.storage
    }

    pub fn allocation(&self, resource: ResourceId) -> Option<&ResourceAllocation> {
        self.allocations.iter().find(|a| a.resource == resource)
    }

    /// Bytes across all allocated slots.
    pub fn total_bytes(&self) -> u64 {
        self.storage.iter().map(|s| s.size_bytes).sum()
    }

    /// Number of transients that share a slot with at least one other resource.
    pub fn aliased_count(&self) -> usize {
        self.allocations
            .iter()
            .filter(|a| match a.binding {
                StorageBinding::Aliased(id) => self.storage[id.index()].residents > 1,
                _ => false,
            })
            .count()
    }
}

/// Input to [`allocate`]: one output of one plan step.
#[derive(Debug, Clone, Copy)]
pub(super) struct ResourceRequest {
    pub resource: ResourceId,
    pub lifetime: ResourceLifetime,
    pub device: DeviceHandle,
    pub size_bytes: u64,
    pub first_use: usize,
    pub last_use: usize,
}

/// Aliasing knobs taken from [`CompilerConfig`](super::CompilerConfig).
#[derive(Debug, Clone, Copy)]
pub(super) struct AliasPolicy {
    pub enabled: bool,
    pub min_size: u64,
}

/// Allocate storage for `requests`, which must be sorted by `first_use`.
pub(super) fn allocate(requests: &[ResourceRequest], policy: AliasPolicy) -> ResourceTable {
    let mut table = ResourceTable::default();
    // Pool slots and the last plan position their current occupant is live at.
    let mut pool: Vec<(StorageId, usize)> = Vec::new();

    for request in requests {
        let binding = match request.lifetime {
            ResourceLifetime::Variable => StorageBinding::External,
            ResourceLifetime::Product | ResourceLifetime::Persistent => {
                StorageBinding::Dedicated(table.new_slot(request))
            }
            ResourceLifetime::Transient
                if !policy.enabled || request.size_bytes < policy.min_size =>
            {
                StorageBinding::Dedicated(table.new_slot(request))
            }
            ResourceLifetime::Transient => {
                let reusable = pool.iter_mut().find(|(id, busy_until)| {
                    table.storage[id.index()].device == request.device
                        && *busy_until < request.first_use
                });
                let id = match reusable {
                    Some((id, busy_until)) => {
                        *busy_until = request.last_use;
                        let slot = &mut table.storage[id.index()];
                        slot.size_bytes = slot.size_bytes.max(request.size_bytes);
                        slot.residents += 1;
                        *id
                    }
                    None => {
                        let id = table.new_slot(request);
                        pool.push((id, request.last_use));
                        id
                    }
                };
                StorageBinding::Aliased(id)
            }
        };

        table.allocations.push(ResourceAllocation {
            resource: request.resource,
            lifetime: request.lifetime,
            device: request.device,
            size_bytes: request.size_bytes,
            first_use: request.first_use,
            last_use: request.last_use,
            binding,
        });
    }
    table
}

impl ResourceTable {
    fn new_slot(&mut self, request: &ResourceRequest) -> StorageId {
        let id = StorageId(self.storage.len() as u32);
        self.storage.push(PhysicalStorage {
            id,
            device: request.device,
            size_bytes: request.size_bytes,
            persistent: request.lifetime == ResourceLifetime::Persistent,
            residents: 1,
        });
        id
    }
}
