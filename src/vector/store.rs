//! Contiguous in-memory vector storage keyed by [`VectorKey`].
//!
//! Vectors live back to back in a single slab, either as f32 or quantized to
//! f16. Each vector also gets a dense slot number (its insertion position)
//! which the graph uses as a node id.
//!
//! # Memory layout
//!
//! ```text
//! slab:  [v0_0 .. v0_D-1][v1_0 .. v1_D-1] ...
//! keys:  [key_0, key_1, ...]        slot -> key
//! slots: {key_0: 0, key_1: 1, ...}  key  -> slot
//! ```
//!
//! There is no locking here: the owning index hands out `&mut` for writes and
//! `&` for reads.

use std::borrow::Cow;
use std::collections::HashMap;

use half::f16;

use crate::vector::types::{Precision, VectorDimension, VectorError, VectorKey};

/// Dense position of a vector inside the store.
pub type Slot = u32;

#[derive(Debug, Clone)]
enum Slab {
    F32(Vec<f32>),
    F16(Vec<f16>),
}

impl Slab {
    fn new(precision: Precision) -> Self {
        match precision {
            Precision::F32 => Self::F32(Vec::new()),
            Precision::F16 => Self::F16(Vec::new()),
        }
    }

    fn extend(&mut self, vector: &[f32]) {
        match self {
            Self::F32(data) => data.extend_from_slice(vector),
            Self::F16(data) => data.extend(vector.iter().map(|&x| f16::from_f32(x))),
        }
    }
}

/// Keyed, append-only vector storage.
#[derive(Debug, Clone)]
pub struct VectorStore {
    dimension: VectorDimension,
    precision: Precision,
    slab: Slab,
    keys: Vec<VectorKey>,
    slots: HashMap<VectorKey, Slot>,
}

impl VectorStore {
    /// Creates an empty store for vectors of `dimension` components.
    #[must_use]
    pub fn new(dimension: VectorDimension, precision: Precision) -> Self {
        Self {
            dimension,
            precision,
            slab: Slab::new(precision),
            keys: Vec::new(),
            slots: HashMap::new(),
        }
    }

    /// Stores `vector` under `key` and returns its slot.
    ///
    /// Fails if the vector has the wrong length, contains NaN or infinity, or
    /// if `key` is already present. Existing entries are never overwritten.
    pub fn put(&mut self, key: VectorKey, vector: &[f32]) -> Result<Slot, VectorError> {
        self.validate(key, vector)?;
        let slot = Slot::try_from(self.keys.len())
            .map_err(|_| VectorError::CapacityExhausted(self.keys.len()))?;

        self.slab.extend(vector);
        self.keys.push(key);
        self.slots.insert(key, slot);
        Ok(slot)
    }

    /// Stores several vectors at once.
    ///
    /// The whole batch is validated before anything is written, so either
    /// every vector is stored or none is.
    pub fn put_batch(&mut self, vectors: &[(VectorKey, Vec<f32>)]) -> Result<Vec<Slot>, VectorError> {
        let mut seen = std::collections::HashSet::with_capacity(vectors.len());
        for (key, vector) in vectors {
            self.validate(*key, vector)?;
            if !seen.insert(*key) {
                return Err(VectorError::DuplicateKey(*key));
            }
        }

        let mut slots = Vec::with_capacity(vectors.len());
        for (key, vector) in vectors {
            slots.push(self.put(*key, vector)?);
        }
        Ok(slots)
    }

    /// Reads the vector stored under `key`, upcast to f32.
    pub fn get(&self, key: VectorKey) -> Result<Vec<f32>, VectorError> {
        let slot = self
            .slot_of(key)
            .ok_or(VectorError::VectorNotFound(key))?;
        Ok(self.vector_at(slot).into_owned())
    }

    /// Returns true if `key` has been stored.
    #[must_use]
    pub fn contains(&self, key: VectorKey) -> bool {
        self.slots.contains_key(&key)
    }

    /// Slot assigned to `key`, if present.
    #[must_use]
    pub fn slot_of(&self, key: VectorKey) -> Option<Slot> {
        self.slots.get(&key).copied()
    }

    /// Key stored at `slot`.
    ///
    /// # Panics
    /// Panics if `slot` was not handed out by this store.
    #[must_use]
    pub fn key_at(&self, slot: Slot) -> VectorKey {
        self.keys[slot as usize]
    }

    /// Vector stored at `slot` in f32 working precision.
    ///
    /// Borrowed for f32 storage; freshly upcast for f16 storage.
    ///
    /// # Panics
    /// Panics if `slot` was not handed out by this store.
    #[must_use]
    pub fn vector_at(&self, slot: Slot) -> Cow<'_, [f32]> {
        let dim = self.dimension.get();
        let start = slot as usize * dim;
        match &self.slab {
            Slab::F32(data) => Cow::Borrowed(&data[start..start + dim]),
            Slab::F16(data) => Cow::Owned(
                data[start..start + dim]
                    .iter()
                    .map(|x| x.to_f32())
                    .collect(),
            ),
        }
    }

    /// Iterates over `(key, vector)` in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (VectorKey, Cow<'_, [f32]>)> + '_ {
        (0..self.keys.len()).map(|slot| (self.keys[slot], self.vector_at(slot as Slot)))
    }

    /// Number of stored vectors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    #[must_use]
    pub fn precision(&self) -> Precision {
        self.precision
    }

    /// Approximate bytes held by vector components.
    #[must_use]
    pub fn vector_bytes(&self) -> usize {
        self.keys.len() * self.dimension.get() * self.precision.bytes_per_component()
    }

    /// Checks that `vector` can be stored without loss of meaning.
    ///
    /// Components must be finite, and for f16 storage must fit the f16 range
    /// so quantization never turns them into infinities.
    pub fn check_vector(&self, vector: &[f32]) -> Result<(), VectorError> {
        self.dimension.validate_vector(vector)?;
        if let Some((index, &value)) = vector.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(VectorError::NonFiniteComponent { index, value });
        }
        if self.precision == Precision::F16 {
            let limit = f16::MAX.to_f32();
            if let Some((index, &value)) = vector.iter().enumerate().find(|(_, v)| v.abs() > limit)
            {
                return Err(VectorError::ComponentOutOfRange {
                    index,
                    value,
                    limit,
                });
            }
        }
        Ok(())
    }

    fn validate(&self, key: VectorKey, vector: &[f32]) -> Result<(), VectorError> {
        self.check_vector(vector)?;
        if self.contains(key) {
            return Err(VectorError::DuplicateKey(key));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(precision: Precision) -> VectorStore {
        VectorStore::new(VectorDimension::new(4).unwrap(), precision)
    }

    #[test]
    fn test_put_and_get() {
        let mut store = store(Precision::F32);
        let slot = store.put(VectorKey::new(10), &[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(slot, 0);
        assert_eq!(store.len(), 1);
        assert_eq!(
            store.get(VectorKey::new(10)).unwrap(),
            vec![1.0, 2.0, 3.0, 4.0]
        );
        assert_eq!(store.key_at(0), VectorKey::new(10));
    }

    #[test]
    fn test_get_missing_key_is_not_found() {
        let store = store(Precision::F32);
        let err = store.get(VectorKey::new(3)).unwrap_err();
        assert!(matches!(err, VectorError::VectorNotFound(k) if k.get() == 3));
    }

    #[test]
    fn test_duplicate_key_is_rejected_not_overwritten() {
        let mut store = store(Precision::F32);
        store.put(VectorKey::new(1), &[1.0; 4]).unwrap();
        let err = store.put(VectorKey::new(1), &[2.0; 4]).unwrap_err();
        assert!(matches!(err, VectorError::DuplicateKey(_)));
        assert_eq!(store.get(VectorKey::new(1)).unwrap(), vec![1.0; 4]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_wrong_dimension_is_rejected() {
        let mut store = store(Precision::F32);
        assert!(matches!(
            store.put(VectorKey::new(0), &[1.0; 3]),
            Err(VectorError::DimensionMismatch {
                expected: 4,
                actual: 3
            })
        ));
        assert!(store.put(VectorKey::new(0), &[1.0; 5]).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_non_finite_is_rejected() {
        let mut store = store(Precision::F32);
        let err = store
            .put(VectorKey::new(0), &[1.0, f32::NAN, 0.0, 0.0])
            .unwrap_err();
        assert!(matches!(err, VectorError::NonFiniteComponent { index: 1, .. }));
    }

    #[test]
    fn test_f16_rejects_components_beyond_half_range() {
        let mut store = store(Precision::F16);
        let err = store
            .put(VectorKey::new(0), &[0.5, 70_000.0, 0.0, 0.0])
            .unwrap_err();
        assert!(matches!(
            err,
            VectorError::ComponentOutOfRange { index: 1, value, .. } if value == 70_000.0
        ));
        assert!(store.is_empty());

        // The largest finite half is still accepted
        store.put(VectorKey::new(1), &[65_504.0, -65_504.0, 1.0, 0.0]).unwrap();
        let back = store.get(VectorKey::new(1)).unwrap();
        assert!(back.iter().all(|v| v.is_finite()));

        // f32 storage keeps the full range
        let mut wide = self::store(Precision::F32);
        wide.put(VectorKey::new(0), &[0.5, 70_000.0, 0.0, 0.0]).unwrap();
    }

    #[test]
    fn test_f16_round_trips_within_tolerance() {
        let mut store = store(Precision::F16);
        let v = [0.123_456, -0.5, 0.999, 0.0];
        store.put(VectorKey::new(0), &v).unwrap();
        let back = store.get(VectorKey::new(0)).unwrap();
        for (a, b) in v.iter().zip(back.iter()) {
            assert!((a - b).abs() < 1e-3, "{a} vs {b}");
        }
        assert_eq!(store.vector_bytes(), 8);
    }

    #[test]
    fn test_put_batch_is_all_or_nothing() {
        let mut store = store(Precision::F32);
        let batch = vec![
            (VectorKey::new(0), vec![1.0; 4]),
            (VectorKey::new(1), vec![1.0; 3]),
        ];
        assert!(store.put_batch(&batch).is_err());
        assert!(store.is_empty());

        let dupes = vec![
            (VectorKey::new(0), vec![1.0; 4]),
            (VectorKey::new(0), vec![2.0; 4]),
        ];
        assert!(matches!(
            store.put_batch(&dupes),
            Err(VectorError::DuplicateKey(_))
        ));
        assert!(store.is_empty());

        let good = vec![
            (VectorKey::new(5), vec![1.0; 4]),
            (VectorKey::new(6), vec![2.0; 4]),
        ];
        assert_eq!(store.put_batch(&good).unwrap(), vec![0, 1]);
    }

    #[test]
    fn test_iter_in_slot_order() {
        let mut store = store(Precision::F32);
        store.put(VectorKey::new(9), &[1.0; 4]).unwrap();
        store.put(VectorKey::new(2), &[2.0; 4]).unwrap();
        let keys: Vec<u64> = store.iter().map(|(k, _)| k.get()).collect();
        assert_eq!(keys, vec![9, 2]);
    }
}
