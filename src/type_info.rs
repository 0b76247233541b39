//! Stable numeric identifiers for event types.
use std::any::{type_name, TypeId};
use std::fmt;
use std::sync::Mutex;

use fxhash::FxHashMap;
use lazy_static::lazy_static;

const FNV_OFFSET: u32 = 2_166_136_261;
const FNV_PRIME: u32 = 16_777_619;

/// Numeric identifier of an event type.
///
/// Identifiers are computed once per type, on first use, and stay the
/// same for the rest of the process. They are only meaningful as map
/// keys.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventTypeId(u32);

impl EventTypeId {
    /// Raw value of the identifier.
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for EventTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventTypeId({:#010x})", self.0)
    }
}

/// Fowler-Noll-Vo 1a hash over `bytes`.
pub fn fnv1a(bytes: &[u8]) -> u32 {
    bytes.iter().fold(FNV_OFFSET, |value, b| {
        (value ^ u32::from(*b)).wrapping_mul(FNV_PRIME)
    })
}

#[derive(Default)]
struct Registry {
    ids: FxHashMap<TypeId, u32>,
    owners: FxHashMap<u32, TypeId>,
    counter: u32,
}

impl Registry {
    fn resolve(&mut self, key: TypeId, name: &str) -> u32 {
        if let Some(id) = self.ids.get(&key) {
            return *id;
        }

        let mut id = fnv1a(name.as_bytes());
        if self.owners.contains_key(&id) {
            // two names hashed to the same value, fall back to the counter
            while self.owners.contains_key(&self.counter) {
                self.counter = self.counter.wrapping_add(1);
            }
            id = self.counter;
            warn!("event type id collision for {}, using {}", name, id);
        }

        self.ids.insert(key, id);
        self.owners.insert(id, key);
        id
    }
}

lazy_static! {
    static ref REGISTRY: Mutex<Registry> = Mutex::new(Registry::default());
}

/// Returns the identifier of type `E`.
pub fn type_id<E: 'static>() -> EventTypeId {
    let key = TypeId::of::<E>();
    let mut registry = match REGISTRY.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    EventTypeId(registry.resolve(key, type_name::<E>()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fnv1a() {
        assert_eq!(fnv1a(b""), FNV_OFFSET);
        assert_eq!(fnv1a(b"a"), 0xe40c_292c);
        assert_eq!(fnv1a(b"foobar"), 0xbf9c_f968);
    }

    #[test]
    fn test_collision_falls_back_to_counter() {
        struct A;
        struct B;

        let mut registry = Registry::default();
        let a = registry.resolve(TypeId::of::<A>(), "same");
        let b = registry.resolve(TypeId::of::<B>(), "same");
        assert_eq!(a, fnv1a(b"same"));
        assert_ne!(a, b);
        assert_eq!(registry.resolve(TypeId::of::<B>(), "same"), b);
    }
}
