//! Where a field is evaluated: at a node or at xi inside an element.

use std::fmt;

use crate::mesh::{ElementId, MAXIMUM_ELEMENT_XI_DIMENSIONS, NodeId, Xi};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Location {
    Node(NodeId),
    Element { element: ElementId, xi: Xi },
}

impl Location {
    #[must_use]
    pub const fn node(node: NodeId) -> Self {
        Self::Node(node)
    }

    /// Element location; `xi` beyond three entries is ignored and missing
    /// entries read as zero.
    #[must_use]
    pub fn element(element: ElementId, xi: &[f64]) -> Self {
        let mut padded = [0.0; MAXIMUM_ELEMENT_XI_DIMENSIONS];
        for (slot, value) in padded.iter_mut().zip(xi) {
            *slot = *value;
        }
        Self::Element {
            element,
            xi: padded,
        }
    }

    #[must_use]
    pub const fn element_id(&self) -> Option<ElementId> {
        match self {
            Self::Node(_) => None,
            Self::Element { element, .. } => Some(*element),
        }
    }

    #[must_use]
    pub const fn is_node(&self) -> bool {
        matches!(self, Self::Node(_))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node(node) => write!(f, "{node}"),
            Self::Element { element, xi } => {
                write!(f, "{element} xi ({}, {}, {})", xi[0], xi[1], xi[2])
            }
        }
    }
}
