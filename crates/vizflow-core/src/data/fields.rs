//! Array-like payloads

use crate::error::DataError;
use crate::extent::Extent;
use std::collections::BTreeMap;

/// Named point arrays, optionally addressed by a structured extent
///
/// When an extent is present every array holds exactly one value per point
/// of that extent, x varying fastest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldData {
    extent: Option<Extent>,
    arrays: BTreeMap<String, Vec<f64>>,
}

impl FieldData {
    /// Unstructured field data
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Structured field data over `extent`
    #[inline]
    #[must_use]
    pub fn structured(extent: Extent) -> Self {
        Self {
            extent: Some(extent),
            arrays: BTreeMap::new(),
        }
    }

    /// Extent held, if structured
    #[inline]
    #[must_use]
    pub fn extent(&self) -> Option<Extent> {
        self.extent
    }

    /// Store an array, checking its length against the extent
    ///
    /// # Errors
    /// [`DataError::ArrayLength`] when structured and the length is wrong.
    pub fn set_array(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<(), DataError> {
        let name = name.into();
        if let Some(extent) = self.extent {
            let expected = extent.num_points();
            if values.len() != expected {
                return Err(DataError::ArrayLength {
                    name,
                    expected,
                    actual: values.len(),
                });
            }
        }
        self.arrays.insert(name, values);
        Ok(())
    }

    /// Borrow an array
    #[must_use]
    pub fn array(&self, name: &str) -> Option<&[f64]> {
        self.arrays.get(name).map(Vec::as_slice)
    }

    /// Mutably borrow an array
    pub fn array_mut(&mut self, name: &str) -> Option<&mut Vec<f64>> {
        self.arrays.get_mut(name)
    }

    /// Array names in sorted order
    pub fn array_names(&self) -> impl Iterator<Item = &str> {
        self.arrays.keys().map(String::as_str)
    }

    /// Number of points
    #[must_use]
    pub fn num_points(&self) -> usize {
        match self.extent {
            Some(extent) => extent.num_points(),
            None => self.arrays.values().map(Vec::len).max().unwrap_or(0),
        }
    }

    /// Value of `name` at structured index `ijk`
    #[must_use]
    pub fn value_at(&self, name: &str, ijk: [i32; 3]) -> Option<f64> {
        let offset = self.extent?.point_offset(ijk)?;
        self.arrays.get(name)?.get(offset).copied()
    }

    /// Discard everything outside `sub`
    ///
    /// # Errors
    /// [`DataError::NotStructured`] without an extent,
    /// [`DataError::ExtentNotContained`] when `sub` reaches outside.
    pub fn crop(&mut self, sub: &Extent) -> Result<(), DataError> {
        let held = self.extent.ok_or(DataError::NotStructured)?;
        if !held.contains(sub) {
            return Err(DataError::ExtentNotContained {
                requested: *sub,
                available: held,
            });
        }
        if held == *sub {
            return Ok(());
        }
        for values in self.arrays.values_mut() {
            let mut cropped = Vec::with_capacity(sub.num_points());
            for k in sub.min(2)..=sub.max(2) {
                for j in sub.min(1)..=sub.max(1) {
                    for i in sub.min(0)..=sub.max(0) {
                        if let Some(offset) = held.point_offset([i, j, k]) {
                            cropped.push(values.get(offset).copied().unwrap_or_default());
                        }
                    }
                }
            }
            *values = cropped;
        }
        self.extent = Some(*sub);
        Ok(())
    }

    /// Drop all arrays, keeping the extent
    pub fn clear(&mut self) {
        self.arrays.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(extent: Extent) -> FieldData {
        let mut fields = FieldData::structured(extent);
        let mut values = Vec::new();
        for j in extent.min(1)..=extent.max(1) {
            for i in extent.min(0)..=extent.max(0) {
                values.push(f64::from(i + 10 * j));
            }
        }
        fields.set_array("ramp", values).unwrap();
        fields
    }

    #[test]
    fn rejects_wrong_length() {
        let mut fields = FieldData::structured(Extent::new(0, 1, 0, 1, 0, 0));
        assert!(fields.set_array("a", vec![1.0; 3]).is_err());
        assert!(fields.set_array("a", vec![1.0; 4]).is_ok());
    }

    #[test]
    fn crop_keeps_addressed_values() {
        let mut fields = ramp(Extent::new(0, 4, 0, 4, 0, 0));
        let sub = Extent::new(1, 2, 3, 4, 0, 0);
        fields.crop(&sub).unwrap();
        assert_eq!(fields.extent(), Some(sub));
        assert_eq!(fields.num_points(), 4);
        assert_eq!(fields.value_at("ramp", [2, 4, 0]), Some(42.0));
        assert_eq!(fields.array("ramp"), Some(&[31.0, 32.0, 41.0, 42.0][..]));
    }

    #[test]
    fn crop_outside_fails() {
        let mut fields = ramp(Extent::new(0, 4, 0, 4, 0, 0));
        assert!(fields.crop(&Extent::new(3, 6, 0, 0, 0, 0)).is_err());
        assert!(FieldData::new().crop(&Extent::new(0, 0, 0, 0, 0, 0)).is_err());
    }
}
