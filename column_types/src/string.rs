//! Storage for the values of a `String` column.

/// Strings stored back to back in one buffer, addressed by the end offset of each value.
///
/// Row `i` spans `ends[i - 1]..ends[i]` of `data`, with an implicit start of zero for row 0.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackedStringArray {
    ends: Vec<usize>,
    data: String,
}

impl PackedStringArray {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `value`, returning its row.
    pub fn append(&mut self, value: &str) -> usize {
        self.data.push_str(value);
        self.ends.push(self.data.len());
        self.ends.len() - 1
    }

    pub fn get(&self, row: usize) -> Option<&str> {
        let end = *self.ends.get(row)?;
        let start = match row {
            0 => 0,
            _ => self.ends[row - 1],
        };
        Some(&self.data[start..end])
    }

    pub fn len(&self) -> usize {
        self.ends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ends.is_empty()
    }

    /// Total length in bytes of all values.
    pub fn data_len(&self) -> usize {
        self.data.len()
    }

    /// Remove every value, keeping the allocations.
    pub fn clear(&mut self) {
        self.ends.clear();
        self.data.clear();
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = &str> + '_ {
        (0..self.len()).map(|row| self.get(row).unwrap_or_default())
    }
}

impl<'a> FromIterator<&'a str> for PackedStringArray {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut array = Self::new();
        for value in iter {
            array.append(value);
        }
        array
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_get() {
        let mut array = PackedStringArray::new();
        assert_eq!(array.append("hello"), 0);
        assert_eq!(array.append(""), 1);
        assert_eq!(array.append("cupcake"), 2);

        assert_eq!(array.get(0), Some("hello"));
        assert_eq!(array.get(1), Some(""));
        assert_eq!(array.get(2), Some("cupcake"));
        assert_eq!(array.get(3), None);
        assert_eq!(array.get(usize::MAX), None);
        assert_eq!(array.len(), 3);
        assert_eq!(array.data_len(), 12);

        array.clear();
        assert!(array.is_empty());
        assert_eq!(array.get(0), None);
    }

    #[test]
    fn from_iter() {
        let array: PackedStringArray = ["a", "", "bc"].into_iter().collect();
        assert_eq!(array.iter().collect::<Vec<_>>(), vec!["a", "", "bc"]);
        assert_eq!(array.iter().len(), 3);
    }
}
