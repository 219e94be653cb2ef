//! Cross-device transfer insertion.
//!
//! Every data edge whose endpoints resolved to different devices is rerouted
//! through a synthetic transfer step. One transfer is created per
//! (source output, destination device), so fan-out to several consumers on the
//! same remote device copies the resource once.

use std::collections::HashMap;

use crate::device::DeviceHandle;

/// Data edge between dense node indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct DataEdge {
    pub from: usize,
    pub output: usize,
    pub to: usize,
    pub input: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct PendingTransfer {
    pub source: usize,
    pub output: usize,
    pub from_device: DeviceHandle,
    pub to_device: DeviceHandle,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub(super) struct Routing {
    /// Transfers in order of the first edge that needed them.
    pub transfers: Vec<PendingTransfer>,
    /// For each data edge, the transfer it now passes through.
    pub via: Vec<Option<usize>>,
}

pub(super) fn route(edges: &[DataEdge], devices: &[DeviceHandle]) -> Routing {
    let mut routing = Routing::default();
    let mut by_key: HashMap<(usize, usize, DeviceHandle), usize> = HashMap::new();

    for edge in edges {
        let from_device = devices[edge.from];
        let to_device = devices[edge.to];
        if from_device == to_device {
            routing.via.push(None);
            continue;
        }
        let next = routing.transfers.len();
        let index = *by_key
            .entry((edge.from, edge.output, to_device))
            .or_insert(next);
        if index == next {
            routing.transfers.push(PendingTransfer {
                source: edge.from,
                output: edge.output,
                from_device,
                to_device,
            });
        }
        routing.via.push(Some(index));
    }
    routing
}
