//! Entity identifiers
//!
//! Every addressable thing in the framework (a module, one of its elements,
//! a sub-element of an element, an API, an event or a notification) is named
//! by an [`EntityId`]. Equality and kind checks on ids are the access-control
//! predicates used throughout the framework, so ids are plain `Copy` values.

use core::fmt;

use crate::constants::MAX_ELEMENT_INDEX;
use crate::error::{FwkError, FwkResult};

/// Kind tag of an [`EntityId`]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    None = 0,
    Module = 1,
    Element = 2,
    SubElement = 3,
    Api = 4,
    Event = 5,
    Notification = 6,
}

impl EntityKind {
    fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => EntityKind::None,
            1 => EntityKind::Module,
            2 => EntityKind::Element,
            3 => EntityKind::SubElement,
            4 => EntityKind::Api,
            5 => EntityKind::Event,
            6 => EntityKind::Notification,
            _ => return None,
        })
    }
}

/// Identifier of a framework entity.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EntityId {
    #[default]
    None,
    Module { module: u8 },
    Element { module: u8, element: u16 },
    SubElement { module: u8, element: u16, sub_element: u8 },
    Api { module: u8, api: u16 },
    Event { module: u8, event: u16 },
    Notification { module: u8, notification: u16 },
}

// Packed layout used when ids cross a raw-integer boundary
const KIND_MASK: u32 = 0xF;
const MODULE_SHIFT: u32 = 4;
const MODULE_MASK: u32 = 0xFF;
const INDEX_SHIFT: u32 = 12;
const INDEX_MASK: u32 = MAX_ELEMENT_INDEX;
const SUB_SHIFT: u32 = 24;
const SUB_MASK: u32 = 0xFF;

impl EntityId {
    #[inline]
    pub const fn module(module: u8) -> Self {
        EntityId::Module { module }
    }

    #[inline]
    pub const fn element(module: u8, element: u16) -> Self {
        EntityId::Element { module, element }
    }

    #[inline]
    pub const fn sub_element(module: u8, element: u16, sub_element: u8) -> Self {
        EntityId::SubElement { module, element, sub_element }
    }

    #[inline]
    pub const fn api(module: u8, api: u16) -> Self {
        EntityId::Api { module, api }
    }

    #[inline]
    pub const fn event(module: u8, event: u16) -> Self {
        EntityId::Event { module, event }
    }

    #[inline]
    pub const fn notification(module: u8, notification: u16) -> Self {
        EntityId::Notification { module, notification }
    }

    pub const fn kind(&self) -> EntityKind {
        match self {
            EntityId::None => EntityKind::None,
            EntityId::Module { .. } => EntityKind::Module,
            EntityId::Element { .. } => EntityKind::Element,
            EntityId::SubElement { .. } => EntityKind::SubElement,
            EntityId::Api { .. } => EntityKind::Api,
            EntityId::Event { .. } => EntityKind::Event,
            EntityId::Notification { .. } => EntityKind::Notification,
        }
    }

    #[inline]
    pub fn is_type(&self, kind: EntityKind) -> bool {
        self.kind() == kind
    }

    #[inline]
    pub const fn is_none(&self) -> bool {
        matches!(self, EntityId::None)
    }

    /// True for ids that can own an execution context or act as an event
    /// source: modules, elements and sub-elements.
    #[inline]
    pub const fn is_entity(&self) -> bool {
        matches!(
            self,
            EntityId::Module { .. } | EntityId::Element { .. } | EntityId::SubElement { .. }
        )
    }

    /// Module index for every kind except `None`
    pub const fn module_idx(&self) -> Option<u8> {
        match *self {
            EntityId::None => None,
            EntityId::Module { module }
            | EntityId::Element { module, .. }
            | EntityId::SubElement { module, .. }
            | EntityId::Api { module, .. }
            | EntityId::Event { module, .. }
            | EntityId::Notification { module, .. } => Some(module),
        }
    }

    /// Element index of an element or sub-element id
    pub const fn element_idx(&self) -> Option<u16> {
        match *self {
            EntityId::Element { element, .. } | EntityId::SubElement { element, .. } => {
                Some(element)
            }
            _ => None,
        }
    }

    pub const fn sub_element_idx(&self) -> Option<u8> {
        match *self {
            EntityId::SubElement { sub_element, .. } => Some(sub_element),
            _ => None,
        }
    }

    /// Index of an api, event or notification id
    pub const fn index(&self) -> Option<u16> {
        match *self {
            EntityId::Api { api: i, .. }
            | EntityId::Event { event: i, .. }
            | EntityId::Notification { notification: i, .. } => Some(i),
            _ => None,
        }
    }

    /// The module owning this id
    pub const fn module_id(&self) -> EntityId {
        match self.module_idx() {
            Some(module) => EntityId::Module { module },
            None => EntityId::None,
        }
    }

    /// The element owning a sub-element (or the element itself)
    pub const fn element_id(&self) -> Option<EntityId> {
        match *self {
            EntityId::Element { module, element } | EntityId::SubElement { module, element, .. } => {
                Some(EntityId::Element { module, element })
            }
            _ => None,
        }
    }

    /// Pack into the 32-bit form.
    ///
    /// Bits 0..4 hold the kind, 4..12 the module, 12..24 the element (or
    /// api/event/notification) index and 24..32 the sub-element index.
    /// An index above `MAX_ELEMENT_INDEX` does not fit and is `Param`.
    pub fn to_raw(&self) -> FwkResult<u32> {
        let kind = self.kind() as u32;
        let module = self.module_idx().map_or(0, u32::from);
        let index = self
            .element_idx()
            .or_else(|| self.index())
            .map_or(0, u32::from);
        let sub = self.sub_element_idx().map_or(0, u32::from);

        if index > MAX_ELEMENT_INDEX {
            return Err(FwkError::Param);
        }

        Ok((kind & KIND_MASK)
            | ((module & MODULE_MASK) << MODULE_SHIFT)
            | (index << INDEX_SHIFT)
            | ((sub & SUB_MASK) << SUB_SHIFT))
    }

    /// Unpack the 32-bit form, rejecting unknown kind tags with `Param`.
    pub fn from_raw(raw: u32) -> FwkResult<Self> {
        let kind = EntityKind::from_u8((raw & KIND_MASK) as u8).ok_or(FwkError::Param)?;
        let module = ((raw >> MODULE_SHIFT) & MODULE_MASK) as u8;
        let index = ((raw >> INDEX_SHIFT) & INDEX_MASK) as u16;
        let sub = ((raw >> SUB_SHIFT) & SUB_MASK) as u8;

        Ok(match kind {
            EntityKind::None => EntityId::None,
            EntityKind::Module => EntityId::module(module),
            EntityKind::Element => EntityId::element(module, index),
            EntityKind::SubElement => EntityId::sub_element(module, index, sub),
            EntityKind::Api => EntityId::api(module, index),
            EntityKind::Event => EntityId::event(module, index),
            EntityKind::Notification => EntityId::notification(module, index),
        })
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            EntityId::None => write!(f, "[NONE]"),
            EntityId::Module { module } => write!(f, "[MOD {}]", module),
            EntityId::Element { module, element } => write!(f, "[ELM {}:{}]", module, element),
            EntityId::SubElement { module, element, sub_element } => {
                write!(f, "[SUB {}:{}:{}]", module, element, sub_element)
            }
            EntityId::Api { module, api } => write!(f, "[API {}:{}]", module, api),
            EntityId::Event { module, event } => write!(f, "[EVT {}:{}]", module, event),
            EntityId::Notification { module, notification } => {
                write!(f, "[NOT {}:{}]", module, notification)
            }
        }
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId{}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_indices() {
        let sub = EntityId::sub_element(3, 7, 2);
        assert!(sub.is_type(EntityKind::SubElement));
        assert_eq!(sub.module_idx(), Some(3));
        assert_eq!(sub.element_idx(), Some(7));
        assert_eq!(sub.sub_element_idx(), Some(2));
        assert_eq!(sub.element_id(), Some(EntityId::element(3, 7)));
        assert_eq!(sub.module_id(), EntityId::module(3));

        let evt = EntityId::event(1, 4);
        assert_eq!(evt.index(), Some(4));
        assert_eq!(evt.element_idx(), None);
        assert!(!evt.is_entity());
    }

    #[test]
    fn test_none() {
        let none = EntityId::default();
        assert!(none.is_none());
        assert_eq!(none.module_idx(), None);
        assert_eq!(none.module_id(), EntityId::None);
        assert_eq!(none.to_raw(), Ok(0));
    }

    #[test]
    fn test_raw_layout() {
        let id = EntityId::sub_element(0x12, 0x345, 0x67);
        assert_eq!(id.to_raw(), Ok(0x6734_5123));
        assert_eq!(EntityId::from_raw(0x6734_5123).unwrap(), id);

        assert_eq!(EntityId::from_raw(0x0000_0021).unwrap(), EntityId::module(2));
        assert_eq!(EntityId::from_raw(0xF), Err(FwkError::Param));
    }

    #[test]
    fn test_index_out_of_range_does_not_pack() {
        assert_eq!(EntityId::element(1, 0x1000).to_raw(), Err(FwkError::Param));
        assert_eq!(EntityId::event(1, 0xFFFF).to_raw(), Err(FwkError::Param));
        assert_eq!(EntityId::api(1, 0x1001).to_raw(), Err(FwkError::Param));

        // Largest index still round-trips
        let last = EntityId::element(1, 0xFFF);
        assert_eq!(EntityId::from_raw(last.to_raw().unwrap()), Ok(last));
        assert_ne!(EntityId::element(1, 0x1000).to_raw(), EntityId::element(1, 0).to_raw());
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", EntityId::module(3)), "[MOD 3]");
        assert_eq!(format!("{}", EntityId::element(3, 1)), "[ELM 3:1]");
        assert_eq!(format!("{}", EntityId::event(2, 0)), "[EVT 2:0]");
        assert_eq!(format!("{:?}", EntityId::None), "EntityId[NONE]");
    }
}
