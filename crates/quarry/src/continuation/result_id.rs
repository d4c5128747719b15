use crate::continuation::codec::{ContinuationDecodeError, SymbolReader, encode_int};
use serde::{Serialize, Serializer};
use std::fmt;

///
/// ResultId
///
/// ResultId is the stable structural address of one node in the declared
/// result tree: the request index followed by one child index per structural
/// descent. It encodes declared position, never backend-assigned identity,
/// so it stays valid across passes and shards as long as the request shape
/// is unchanged.
///

#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ResultId {
    path: Vec<u32>,
}

impl ResultId {
    /// The empty path addressing the request root.
    #[must_use]
    pub const fn root() -> Self {
        Self { path: Vec::new() }
    }

    #[must_use]
    pub fn from_indices(path: impl Into<Vec<u32>>) -> Self {
        Self { path: path.into() }
    }

    /// Append one child index, producing the address of that child.
    ///
    /// Indices above `i32::MAX` are not representable on the wire and must
    /// not occur; declared tree fan-out is tiny in practice.
    #[must_use]
    pub fn child(&self, index: u32) -> Self {
        debug_assert!(index <= i32::MAX as u32, "result id index must fit i32");

        let mut path = Vec::with_capacity(self.path.len() + 1);
        path.extend_from_slice(&self.path);
        path.push(index);

        Self { path }
    }

    /// Return true when `prefix` addresses this node or one of its ancestors.
    #[must_use]
    pub fn starts_with(&self, prefix: &Self) -> bool {
        self.path.len() >= prefix.path.len() && self.path[..prefix.path.len()] == prefix.path[..]
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.path.len()
    }

    #[must_use]
    pub fn indices(&self) -> &[u32] {
        &self.path
    }

    /// Append this path to a continuation token: `[length][index]*`.
    pub(crate) fn encode(&self, out: &mut String) {
        encode_int(out, i32::try_from(self.path.len()).unwrap_or(i32::MAX));
        for &index in &self.path {
            encode_int(out, index as i32);
        }
    }

    /// Consume one encoded path from the reader.
    pub(crate) fn decode(reader: &mut SymbolReader<'_>) -> Result<Self, ContinuationDecodeError> {
        let length = reader.read_int()?;
        if length < 0 {
            return Err(ContinuationDecodeError::NegativeIndex { value: length });
        }

        let mut path = Vec::with_capacity(length as usize);
        for _ in 0..length {
            let index = reader.read_int()?;
            if index < 0 {
                return Err(ContinuationDecodeError::NegativeIndex { value: index });
            }
            path.push(index as u32);
        }

        Ok(Self { path })
    }
}

impl Serialize for ResultId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl fmt::Display for ResultId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/")?;
        for (i, index) in self.path.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{index}")?;
        }
        Ok(())
    }
}

///
/// TESTS
///
