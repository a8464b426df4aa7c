//! Host Element Handles
//!
//! Cheap-clone references standing in for live DOM elements owned by the
//! host document. Equality is object identity, never structural: two
//! handles are equal only when they refer to the same live element.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

/// Host element description carried by a handle.
///
/// The inspector never walks the real DOM; the embedder creates one handle
/// per live element and keeps it alive exactly as long as the element.
#[derive(Debug)]
struct ElementData {
    tag: String,
    id: Option<String>,
}

/// Reference to a live host element.
///
/// Clones are cheap and refer to the same element.
#[derive(Clone)]
pub struct ElementRef {
    inner: Rc<ElementData>,
}

impl ElementRef {
    /// Create a handle for an element with the given tag name.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            inner: Rc::new(ElementData {
                tag: tag.into(),
                id: None,
            }),
        }
    }

    /// Create a handle for an element with a tag name and id attribute.
    pub fn with_id(tag: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            inner: Rc::new(ElementData {
                tag: tag.into(),
                id: Some(id.into()),
            }),
        }
    }

    /// Tag name of the element.
    pub fn tag(&self) -> &str {
        &self.inner.tag
    }

    /// Id attribute, if the element has one.
    pub fn id(&self) -> Option<&str> {
        self.inner.id.as_deref()
    }

    /// Address-derived map key for this element.
    ///
    /// A key alone proves nothing about liveness; pair it with a stored
    /// [`WeakElementRef`] and re-check on every read.
    pub fn key(&self) -> ElementKey {
        ElementKey(Rc::as_ptr(&self.inner) as usize)
    }

    /// Non-owning handle to the same element.
    pub fn downgrade(&self) -> WeakElementRef {
        WeakElementRef {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Whether both handles refer to the same live element.
    pub fn same_element(&self, other: &ElementRef) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for ElementRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for ElementRef {}

impl Hash for ElementRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Rc::as_ptr(&self.inner) as usize).hash(state);
    }
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.id.as_deref() {
            Some(id) => write!(f, "{}#{}", self.inner.tag, id),
            None => write!(f, "{}", self.inner.tag),
        }
    }
}

impl fmt::Debug for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ElementRef({})", self)
    }
}

/// Non-owning element handle; upgrading fails once the element is gone.
#[derive(Debug, Clone)]
pub struct WeakElementRef {
    inner: Weak<ElementData>,
}

impl WeakElementRef {
    /// Recover a strong handle if the element is still alive.
    pub fn upgrade(&self) -> Option<ElementRef> {
        self.inner.upgrade().map(|inner| ElementRef { inner })
    }

    /// Whether the element is still alive.
    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

/// Map key derived from an element's address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementKey(usize);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_identity_equality() {
        let a = ElementRef::new("button");
        let b = ElementRef::new("button");
        let a2 = a.clone();

        assert_eq!(a, a2);
        assert_ne!(a, b);
        assert_eq!(a.key(), a2.key());
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn test_weak_upgrade_after_drop() {
        let element = ElementRef::with_id("input", "email");
        let weak = element.downgrade();

        assert!(weak.is_alive());
        assert!(weak.upgrade().is_some());

        drop(element);
        assert!(!weak.is_alive());
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_map_key_usage() {
        let a = ElementRef::new("div");
        let b = ElementRef::new("span");

        let mut map = HashMap::new();
        map.insert(a.key(), 1);
        map.insert(b.key(), 2);

        assert_eq!(map.get(&a.clone().key()), Some(&1));
        assert_eq!(map.get(&b.key()), Some(&2));
    }

    #[test]
    fn test_display() {
        assert_eq!(ElementRef::with_id("button", "submit").to_string(), "button#submit");
        assert_eq!(ElementRef::new("nav").to_string(), "nav");
    }
}
