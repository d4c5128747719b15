use crate::continuation::{
    ResultId,
    codec::{ContinuationDecodeError, SymbolReader, encode_int},
};
use serde::{Serialize, Serializer};
use std::fmt;

/// Offset is not a durable bookmark yet: counts may still shift while the
/// backend converges across passes/shards.
pub const FLAG_UNSTABLE: u32 = 1;

const KNOWN_FLAGS: u32 = FLAG_UNSTABLE;

///
/// OffsetContinuation
///
/// One pagination position: the addressed list (`ResultId`), the tag of the
/// window it applies to, the offset itself, and stability flags.
/// Wire form is `[ResultId][tag][offset][flags]`.
///

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct OffsetContinuation {
    result_id: ResultId,
    tag: i32,
    offset: i32,
    flags: u32,
}

impl OffsetContinuation {
    #[must_use]
    pub const fn new(result_id: ResultId, tag: i32, offset: i32, flags: u32) -> Self {
        Self {
            result_id,
            tag,
            offset,
            flags,
        }
    }

    #[must_use]
    pub const fn result_id(&self) -> &ResultId {
        &self.result_id
    }

    #[must_use]
    pub const fn tag(&self) -> i32 {
        self.tag
    }

    #[must_use]
    pub const fn offset(&self) -> i32 {
        self.offset
    }

    #[must_use]
    pub const fn flags(&self) -> u32 {
        self.flags
    }

    #[must_use]
    pub const fn is_unstable(&self) -> bool {
        self.flags & FLAG_UNSTABLE != 0
    }

    pub(crate) fn encode(&self, out: &mut String) {
        self.result_id.encode(out);
        encode_int(out, self.tag);
        encode_int(out, self.offset);
        encode_int(out, self.flags as i32);
    }

    pub(crate) fn decode(reader: &mut SymbolReader<'_>) -> Result<Self, ContinuationDecodeError> {
        let result_id = ResultId::decode(reader)?;
        let tag = reader.read_int()?;
        let offset = reader.read_int()?;
        let raw_flags = reader.read_int()?;

        let flags = u32::try_from(raw_flags)
            .ok()
            .filter(|flags| flags & !KNOWN_FLAGS == 0)
            .ok_or(ContinuationDecodeError::UnknownFlags { flags: raw_flags })?;

        Ok(Self {
            result_id,
            tag,
            offset,
            flags,
        })
    }
}

impl fmt::Display for OffsetContinuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.encode(&mut out);
        f.write_str(&out)
    }
}

///
/// CompositeContinuation
///
/// The ordered bundle of per-list positions for one whole request; its wire
/// form is the flat concatenation of its children. Decoding greedily
/// consumes offset continuations until the token is exhausted.
///

#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct CompositeContinuation {
    children: Vec<OffsetContinuation>,
}

impl CompositeContinuation {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            children: Vec::new(),
        }
    }

    pub fn push(&mut self, child: OffsetContinuation) {
        self.children.push(child);
    }

    #[must_use]
    pub fn children(&self) -> &[OffsetContinuation] {
        &self.children
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Parse a whole token as a composite. An empty token is the empty
    /// composite; anything else must decode exactly.
    pub fn parse(token: &str) -> Result<Self, ContinuationDecodeError> {
        let token = token.trim();
        let mut reader = SymbolReader::new(token)?;

        let mut children = Vec::new();
        while !reader.is_empty() {
            children.push(OffsetContinuation::decode(&mut reader)?);
        }

        Ok(Self { children })
    }
}

impl FromIterator<OffsetContinuation> for CompositeContinuation {
    fn from_iter<I: IntoIterator<Item = OffsetContinuation>>(iter: I) -> Self {
        Self {
            children: iter.into_iter().collect(),
        }
    }
}

impl Serialize for CompositeContinuation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl fmt::Display for CompositeContinuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for child in &self.children {
            write!(f, "{child}")?;
        }
        Ok(())
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::{CompositeContinuation, FLAG_UNSTABLE, OffsetContinuation};
    use crate::continuation::{
        ResultId,
        codec::{ContinuationDecodeError, SymbolReader, encode_int},
    };
    use proptest::prelude::*;

    fn round_trip_offset(cont: &OffsetContinuation) -> OffsetContinuation {
        let token = cont.to_string();
        let mut reader = SymbolReader::new(&token).expect("token within bounds");
        let decoded = OffsetContinuation::decode(&mut reader).expect("valid encoding");
        assert!(reader.is_empty());
        decoded
    }

    #[test]
    fn extreme_offsets_and_tags_round_trip() {
        for (tag, offset) in [
            (i32::MIN, i32::MIN),
            (i32::MAX, i32::MAX),
            (0, 0),
            (-7, 13),
        ] {
            let cont =
                OffsetContinuation::new(ResultId::root().child(1), tag, offset, FLAG_UNSTABLE);
            assert_eq!(round_trip_offset(&cont), cont);
        }
    }

    #[test]
    fn unknown_flag_bits_are_rejected() {
        let mut token = String::new();
        ResultId::root().encode(&mut token);
        encode_int(&mut token, 1); // tag
        encode_int(&mut token, 0); // offset
        encode_int(&mut token, 2); // undefined flag bit

        let mut reader = SymbolReader::new(&token).expect("token within bounds");
        let err =
            OffsetContinuation::decode(&mut reader).expect_err("unknown flags should be rejected");
        assert_eq!(err, ContinuationDecodeError::UnknownFlags { flags: 2 });
    }

    #[test]
    fn empty_token_parses_as_empty_composite() {
        let composite = CompositeContinuation::parse("").expect("empty composite");
        assert!(composite.is_empty());
    }

    #[test]
    fn trailing_garbage_fails_composite_parse() {
        let cont = OffsetContinuation::new(ResultId::root().child(0), 1, 10, 0);
        let token = format!("{cont}B");
        let err = CompositeContinuation::parse(&token).expect_err("dangling symbol should fail");
        assert_eq!(err, ContinuationDecodeError::Truncated);
    }

    fn arb_offset_continuation() -> impl Strategy<Value = OffsetContinuation> {
        (
            prop::collection::vec(0u32..=i32::MAX as u32, 0..=6),
            any::<i32>(),
            any::<i32>(),
            prop_oneof![Just(0u32), Just(FLAG_UNSTABLE)],
        )
            .prop_map(|(path, tag, offset, flags)| {
                OffsetContinuation::new(ResultId::from_indices(path), tag, offset, flags)
            })
    }

    proptest! {
        #[test]
        fn offset_continuations_round_trip(cont in arb_offset_continuation()) {
            prop_assert_eq!(round_trip_offset(&cont), cont);
        }

        #[test]
        fn composites_round_trip(
            children in prop::collection::vec(arb_offset_continuation(), 0..8),
        ) {
            let composite: CompositeContinuation = children.into_iter().collect();
            let token = composite.to_string();
            let decoded = CompositeContinuation::parse(&token).expect("valid encoding");
            prop_assert_eq!(decoded, composite);
        }
    }
}
