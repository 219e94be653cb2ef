//! Device affinity propagation.

use crate::device::DeviceHandle;

/// Devices that made an instance's inherited device ambiguous.
#[derive(Debug, PartialEq, Eq)]
pub(super) struct AffinityConflict {
    pub node: usize,
    pub devices: Vec<DeviceHandle>,
}

/// Resolve a device for every node, visiting nodes in topological `order`.
///
/// An explicit device always wins. Otherwise the node inherits the device
/// shared by all of its data producers; producers on different devices are a
/// conflict. Nodes without producers take `fallback`.
pub(super) fn assign_devices(
    order: &[usize],
    producers: &[Vec<usize>],
    explicit: &[Option<DeviceHandle>],
    fallback: DeviceHandle,
) -> Result<Vec<DeviceHandle>, AffinityConflict> {
    let mut resolved: Vec<Option<DeviceHandle>> = explicit.to_vec();

    for &node in order {
        if explicit[node].is_some() {
            continue;
        }
        let mut inherited: Vec<DeviceHandle> = producers[node]
            .iter()
            .filter_map(|&producer| resolved[producer])
            .collect();
        inherited.sort();
        inherited.dedup();

        resolved[node] = match inherited.as_slice() {
            [] => Some(fallback),
            [device] => Some(*device),
            _ => {
                return Err(AffinityConflict {
                    node,
                    devices: inherited,
                });
            }
        };
    }

    Ok(resolved
        .into_iter()
        .map(|device| device.unwrap_or(fallback))
        .collect())
}
