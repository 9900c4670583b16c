//! One versioned object slot of a cross-reference section.

use crate::error::Result;
use crate::object::{Object, ObjectRef};
use crate::objstm::CompressedObject;
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Generation number carried by free (deleted) slots.
pub const FREE_GENERATION: u16 = 65535;

/// How a slot is stored in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectStatus {
    /// Deleted; `f` in a table, type 0 in a stream
    Free,
    /// Stored uncompressed at a byte offset; `n`, type 1
    InUse,
    /// Stored inside an object stream; type 2
    Compressed,
    /// Placeholder for the object-0 head of the free list
    Null,
}

impl ObjectStatus {
    /// Type code used in cross-reference streams.
    pub fn code(self) -> u64 {
        match self {
            ObjectStatus::Free | ObjectStatus::Null => 0,
            ObjectStatus::InUse => 1,
            ObjectStatus::Compressed => 2,
        }
    }

    /// Map a cross-reference stream type code. Unknown codes are treated as null
    /// references, as ISO 32000 requires.
    pub fn from_code(code: u64) -> Self {
        match code {
            0 => ObjectStatus::Free,
            1 => ObjectStatus::InUse,
            2 => ObjectStatus::Compressed,
            _ => ObjectStatus::Null,
        }
    }
}

/// A single slot: object number, generation, location and lazily loaded value.
///
/// For compressed objects `offset` holds the number of the hosting object
/// stream and `index` the position inside it.
#[derive(Debug)]
pub struct DocumentObject {
    /// Object number
    pub id: u32,
    /// Generation number
    pub generation: u16,
    /// Byte offset, or host stream number when compressed
    pub offset: u64,
    /// Position inside the host object stream
    pub index: u32,
    /// Storage kind
    pub status: ObjectStatus,
    value: OnceCell<Object>,
    object_stream: OnceCell<CompressedObject>,
    loads: AtomicUsize,
}

impl DocumentObject {
    fn with_status(id: u32, generation: u16, status: ObjectStatus) -> Self {
        Self {
            id,
            generation,
            offset: 0,
            index: 0,
            status,
            value: OnceCell::new(),
            object_stream: OnceCell::new(),
            loads: AtomicUsize::new(0),
        }
    }

    /// An in-use slot located at `offset` in the source bytes.
    pub fn in_use(id: u32, generation: u16, offset: u64) -> Self {
        let mut obj = Self::with_status(id, generation, ObjectStatus::InUse);
        obj.offset = offset;
        obj
    }

    /// An in-use slot that already holds a value (created, not parsed).
    pub fn with_value(id: u32, generation: u16, value: Object) -> Self {
        let obj = Self::with_status(id, generation, ObjectStatus::InUse);
        let _ = obj.value.set(value);
        obj
    }

    /// A free slot.
    pub fn free(id: u32, generation: u16) -> Self {
        Self::with_status(id, generation, ObjectStatus::Free)
    }

    /// A slot stored at `index` inside object stream `host`.
    pub fn compressed(id: u32, host: u32, index: u32) -> Self {
        let mut obj = Self::with_status(id, 0, ObjectStatus::Compressed);
        obj.offset = host as u64;
        obj.index = index;
        obj
    }

    /// A null sentinel.
    pub fn null(id: u32, generation: u16) -> Self {
        Self::with_status(id, generation, ObjectStatus::Null)
    }

    /// Indirect reference to this slot.
    pub fn reference(&self) -> ObjectRef {
        ObjectRef::new(self.id, self.generation)
    }

    /// Whether the slot holds a live object.
    pub fn is_live(&self) -> bool {
        matches!(self.status, ObjectStatus::InUse | ObjectStatus::Compressed)
    }

    /// Value if already loaded.
    pub fn value(&self) -> Option<&Object> {
        self.value.get()
    }

    /// Return the value, loading it with `load` on first access.
    pub fn get_or_load<F>(&self, load: F) -> Result<&Object>
    where
        F: FnOnce() -> Result<Object>,
    {
        self.value.get_or_try_init(|| {
            self.loads.fetch_add(1, Ordering::Relaxed);
            load()
        })
    }

    /// Replace the value.
    pub fn set_value(&mut self, value: Object) {
        self.value = OnceCell::from(value);
        self.object_stream = OnceCell::new();
    }

    /// Mutable access to an already loaded value.
    pub fn value_mut(&mut self) -> Option<&mut Object> {
        self.value.get_mut()
    }

    /// Number of times the value was actually loaded.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }

    /// Object stream hosted by this slot, built from its value on first access.
    pub fn object_stream<F>(&self, load: F) -> Result<&CompressedObject>
    where
        F: FnOnce() -> Result<CompressedObject>,
    {
        self.object_stream.get_or_try_init(load)
    }

    /// In-use copy holding `value` for a newer revision, one generation up.
    ///
    /// The generation stops below [`FREE_GENERATION`].
    pub fn successor(&self, value: Object) -> Self {
        let generation = self.generation.saturating_add(1).min(FREE_GENERATION - 1);
        Self::with_value(self.id, generation, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_load_is_memoized() {
        let obj = DocumentObject::in_use(4, 0, 120);
        let first = obj.get_or_load(|| Ok(Object::Integer(7))).unwrap().clone();
        let second = obj.get_or_load(|| Ok(Object::Integer(8))).unwrap().clone();
        assert_eq!(first, Object::Integer(7));
        assert_eq!(first, second);
        assert_eq!(obj.load_count(), 1);
    }

    #[test]
    fn test_failed_load_is_retried() {
        let obj = DocumentObject::in_use(4, 0, 120);
        assert!(obj.get_or_load(|| Err(Error::UnexpectedEof)).is_err());
        assert!(obj.value().is_none());
        assert_eq!(obj.get_or_load(|| Ok(Object::Null)).unwrap(), &Object::Null);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ObjectStatus::Free.code(), 0);
        assert_eq!(ObjectStatus::Null.code(), 0);
        assert_eq!(ObjectStatus::InUse.code(), 1);
        assert_eq!(ObjectStatus::Compressed.code(), 2);
        assert_eq!(ObjectStatus::from_code(2), ObjectStatus::Compressed);
        assert_eq!(ObjectStatus::from_code(9), ObjectStatus::Null);
    }

    #[test]
    fn test_set_value_replaces() {
        let mut obj = DocumentObject::with_value(1, 0, Object::Integer(1));
        obj.set_value(Object::Boolean(true));
        assert_eq!(obj.value(), Some(&Object::Boolean(true)));
        assert_eq!(obj.reference(), ObjectRef::new(1, 0));
        assert!(obj.is_live());
        assert!(!DocumentObject::free(1, FREE_GENERATION).is_live());
    }

    #[test]
    fn test_successor_bumps_generation() {
        let compressed = DocumentObject::compressed(9, 4, 2);
        let next = compressed.successor(Object::Integer(3));
        assert_eq!(next.reference(), ObjectRef::new(9, 1));
        assert_eq!(next.status, ObjectStatus::InUse);
        assert_eq!(next.offset, 0);
        assert_eq!(next.value(), Some(&Object::Integer(3)));

        let old = DocumentObject::in_use(9, FREE_GENERATION - 1, 10);
        assert_eq!(old.successor(Object::Null).generation, FREE_GENERATION - 1);
    }
}
