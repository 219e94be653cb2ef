//! Runtime port payloads.
//!
//! Ports carry a tagged union instead of statically typed slots. Each port
//! schema declares a [`PortType`], and values are checked against it when
//! connections are made and when the graph is compiled.

use std::fmt;

use crate::loops::LoopId;

/// Type tag of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PortType {
    Bool,
    Int,
    Float,
    Text,
    Loop,
    /// Opaque GPU resource (buffer, image) managed outside the core.
    Resource,
}

impl fmt::Display for PortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Text => "text",
            Self::Loop => "loop",
            Self::Resource => "resource",
        };
        f.write_str(name)
    }
}

/// Opaque application-side resource identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceHandle(pub u64);

/// A value flowing through a port or stored as a node parameter.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum PortValue {
    /// Nothing produced yet (or producer gated off before its first run).
    #[default]
    Empty,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Loop(LoopId),
    Resource(ResourceHandle),
}

impl PortValue {
    /// Type of the payload, `None` for [`PortValue::Empty`].
    pub fn ty(&self) -> Option<PortType> {
        match self {
            Self::Empty => None,
            Self::Bool(_) => Some(PortType::Bool),
            Self::Int(_) => Some(PortType::Int),
            Self::Float(_) => Some(PortType::Float),
            Self::Text(_) => Some(PortType::Text),
            Self::Loop(_) => Some(PortType::Loop),
            Self::Resource(_) => Some(PortType::Resource),
        }
    }

    /// Whether this value may be stored in a port of type `ty`.
    ///
    /// [`PortValue::Empty`] fits every port.
    pub fn fits(&self, ty: PortType) -> bool {
        self.ty().map_or(true, |own| own == ty)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Float payload; integers widen.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_loop(&self) -> Option<LoopId> {
        match self {
            Self::Loop(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_resource(&self) -> Option<ResourceHandle> {
        match self {
            Self::Resource(v) => Some(*v),
            _ => None,
        }
    }

    /// Hashable form used to compare configurations.
    pub fn key(&self) -> ValueKey {
        match self {
            Self::Empty => ValueKey::Empty,
            Self::Bool(v) => ValueKey::Bool(*v),
            Self::Int(v) => ValueKey::Int(*v),
            Self::Float(v) => ValueKey::Float(v.to_bits()),
            Self::Text(v) => ValueKey::Text(v.clone()),
            Self::Loop(v) => ValueKey::Loop(*v),
            Self::Resource(v) => ValueKey::Resource(*v),
        }
    }
}

impl From<bool> for PortValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for PortValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for PortValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for PortValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for PortValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<LoopId> for PortValue {
    fn from(value: LoopId) -> Self {
        Self::Loop(value)
    }
}

impl From<ResourceHandle> for PortValue {
    fn from(value: ResourceHandle) -> Self {
        Self::Resource(value)
    }
}

/// Totally ordered, hashable mirror of [`PortValue`].
///
/// Floats compare by bit pattern, so `0.0` and `-0.0` are distinct keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValueKey {
    Empty,
    Bool(bool),
    Int(i64),
    Float(u64),
    Text(String),
    Loop(LoopId),
    Resource(ResourceHandle),
}
