//! Feature Nodes
//!
//! Snapshot types for the camera feature tree (GenICam node map). The tree
//! itself lives in the backend; these values are copies taken on read and
//! passed to change callbacks.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Interface type of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Signed integer
    Integer,
    /// Floating point
    Float,
    /// Boolean
    Boolean,
    /// String
    String,
    /// Enumeration with symbolic entries
    Enumeration,
    /// Executable command
    Command,
    /// Raw register block
    Register,
    /// Grouping of child nodes
    Category,
}

/// Typed node value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum NodeValue {
    /// Integer value
    Integer(i64),
    /// Float value
    Float(f64),
    /// Boolean value
    Boolean(bool),
    /// String value
    String(String),
    /// Symbolic name of the current entry
    Enumeration(String),
    /// Executing a command node; reads report whether it is still running
    Command,
    /// Register location
    Register {
        /// Start address
        address: u64,
        /// Length in bytes
        length: usize,
    },
    /// Category marker
    Category,
}

impl NodeValue {
    /// Interface type carried by this value.
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeValue::Integer(_) => NodeKind::Integer,
            NodeValue::Float(_) => NodeKind::Float,
            NodeValue::Boolean(_) => NodeKind::Boolean,
            NodeValue::String(_) => NodeKind::String,
            NodeValue::Enumeration(_) => NodeKind::Enumeration,
            NodeValue::Command => NodeKind::Command,
            NodeValue::Register { .. } => NodeKind::Register,
            NodeValue::Category => NodeKind::Category,
        }
    }
}

impl fmt::Display for NodeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeValue::Integer(v) => write!(f, "{v}"),
            NodeValue::Float(v) => write!(f, "{v:.6}"),
            NodeValue::Boolean(v) => write!(f, "{}", u8::from(*v)),
            NodeValue::String(v) | NodeValue::Enumeration(v) => f.write_str(v),
            NodeValue::Command => f.write_str("(command)"),
            NodeValue::Register { address, length } => {
                write!(f, "0x{address:x} [{length} bytes]")
            }
            NodeValue::Category => f.write_str("(category)"),
        }
    }
}

/// Availability and access flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAccess {
    /// Implemented by the device
    pub available: bool,
    /// Value can be read
    pub readable: bool,
    /// Value can be written
    pub writable: bool,
}

impl NodeAccess {
    /// Readable and writable.
    pub const READ_WRITE: NodeAccess = NodeAccess {
        available: true,
        readable: true,
        writable: true,
    };
    /// Readable only.
    pub const READ_ONLY: NodeAccess = NodeAccess {
        available: true,
        readable: true,
        writable: false,
    };
    /// Writable only.
    pub const WRITE_ONLY: NodeAccess = NodeAccess {
        available: true,
        readable: false,
        writable: true,
    };
    /// Not implemented by the device.
    pub const UNAVAILABLE: NodeAccess = NodeAccess {
        available: false,
        readable: false,
        writable: false,
    };
}

/// Snapshot of one feature node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureNode {
    /// Unique name within the node map
    pub name: String,
    /// Label for display
    pub display_name: String,
    /// Access flags
    pub access: NodeAccess,
    /// Current value
    pub value: NodeValue,
    /// Allowed entries for enumeration nodes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entries: Vec<String>,
    /// Inclusive bounds for numeric nodes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<(f64, f64)>,
    /// Child node names for categories
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,
}

impl FeatureNode {
    /// Create a node with a display name equal to its name.
    pub fn new(name: impl Into<String>, access: NodeAccess, value: NodeValue) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
            access,
            value,
            entries: Vec::new(),
            range: None,
            children: Vec::new(),
        }
    }

    /// Set the display label.
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    /// Set the allowed entries of an enumeration node.
    pub fn with_entries<I, S>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entries = entries.into_iter().map(Into::into).collect();
        self
    }

    /// Set inclusive numeric bounds.
    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.range = Some((min, max));
        self
    }

    /// Build a category node.
    pub fn category<I, S>(name: impl Into<String>, available: bool, children: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let access = if available {
            NodeAccess::READ_ONLY
        } else {
            NodeAccess::UNAVAILABLE
        };
        let mut node = Self::new(name, access, NodeValue::Category);
        node.children = children.into_iter().map(Into::into).collect();
        node
    }

    /// Interface type of this node.
    pub fn kind(&self) -> NodeKind {
        self.value.kind()
    }

    /// Whether this is a category node.
    pub fn is_category(&self) -> bool {
        self.kind() == NodeKind::Category
    }

    /// One-line change description, or `None` for categories, which carry no
    /// user-facing data.
    pub fn describe(&self) -> Option<String> {
        match self.kind() {
            NodeKind::Category => None,
            NodeKind::Register => Some(format!("{} {}", self.display_name, self.value)),
            _ => Some(format!(
                "{} ( {} ) : {}",
                self.display_name, self.name, self.value
            )),
        }
    }
}
