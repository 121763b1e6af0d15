//! Tagged slot references shared by the kernel side and the wire side.
//!
//! A [`Slot`] only means something relative to one endpoint: the local kernel
//! for kernel-facing kinds, or one specific peer machine for wire-facing kinds.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CommsError;

/// Every slot kind the comms vat understands.
///
/// Kernel-facing kinds name references in the local kernel's tables. Wire-facing
/// kinds are always phrased from the sender's point of view ("your egress" is
/// what the receiver calls its own egress) and come in dual pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SlotKind {
    Export,
    Import,
    Promise,
    Resolver,
    YourIngress,
    YourEgress,
    YourQuestion,
    YourAnswer,
    YourPromise,
    YourResolver,
}

impl SlotKind {
    pub fn is_kernel_facing(self) -> bool {
        matches!(
            self,
            SlotKind::Export | SlotKind::Import | SlotKind::Promise | SlotKind::Resolver
        )
    }

    pub fn is_wire_facing(self) -> bool {
        !self.is_kernel_facing()
    }

    /// The dual tag, as the other endpoint names the same relationship.
    pub fn dual(self) -> Option<SlotKind> {
        match self {
            SlotKind::YourEgress => Some(SlotKind::YourIngress),
            SlotKind::YourIngress => Some(SlotKind::YourEgress),
            SlotKind::YourAnswer => Some(SlotKind::YourQuestion),
            SlotKind::YourQuestion => Some(SlotKind::YourAnswer),
            SlotKind::YourPromise => Some(SlotKind::YourResolver),
            SlotKind::YourResolver => Some(SlotKind::YourPromise),
            SlotKind::Export | SlotKind::Import | SlotKind::Promise | SlotKind::Resolver => None,
        }
    }

    /// A promise whose sender is the decider.
    pub fn is_question(self) -> bool {
        matches!(self, SlotKind::YourQuestion | SlotKind::YourPromise)
    }

    /// A promise whose receiver is the decider.
    pub fn is_answer(self) -> bool {
        matches!(self, SlotKind::YourAnswer | SlotKind::YourResolver)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SlotKind::Export => "export",
            SlotKind::Import => "import",
            SlotKind::Promise => "promise",
            SlotKind::Resolver => "resolver",
            SlotKind::YourIngress => "your-ingress",
            SlotKind::YourEgress => "your-egress",
            SlotKind::YourQuestion => "your-question",
            SlotKind::YourAnswer => "your-answer",
            SlotKind::YourPromise => "your-promise",
            SlotKind::YourResolver => "your-resolver",
        }
    }
}

impl fmt::Display for SlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `{ type, id }` reference. The JSON shape is only used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Slot {
    #[serde(rename = "type")]
    pub kind: SlotKind,
    pub id: u64,
}

impl Slot {
    pub const fn new(kind: SlotKind, id: u64) -> Self {
        Self { kind, id }
    }

    pub const fn export(id: u64) -> Self {
        Self::new(SlotKind::Export, id)
    }

    pub const fn import(id: u64) -> Self {
        Self::new(SlotKind::Import, id)
    }

    pub const fn promise(id: u64) -> Self {
        Self::new(SlotKind::Promise, id)
    }

    pub const fn resolver(id: u64) -> Self {
        Self::new(SlotKind::Resolver, id)
    }

    pub fn is_kernel_facing(&self) -> bool {
        self.kind.is_kernel_facing()
    }

    /// Rename the slot the way the other endpoint would see it.
    pub fn change_perspective(self) -> Result<Slot, CommsError> {
        change_perspective(self)
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Perspective flip over the wire-facing dual pairs. Applying it twice is the
/// identity; kernel-facing slots have no dual.
pub fn change_perspective(slot: Slot) -> Result<Slot, CommsError> {
    let kind = slot.kind.dual().ok_or(CommsError::NoPerspective(slot))?;
    Ok(Slot::new(kind, slot.id))
}
