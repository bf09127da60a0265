use bytes::{Buf, Bytes};

const INLINE_LEN: usize = 23;

/// Encoded value storage, borrowed, inlined or shared.
pub(crate) enum ValueRef<'a> {
    Slice(&'a [u8]),
    Inline {
        offset: usize,
        value: [u8;INLINE_LEN],
    },
    Bytes(Bytes)
}

impl ValueRef<'_> {
    /// Copy small value inline, fallback to heap allocation.
    pub fn copy(slice: &[u8]) -> ValueRef<'static> {
        let len = slice.len();
        if len > INLINE_LEN {
            return ValueRef::Bytes(Bytes::copy_from_slice(slice));
        }
        let mut value = [0u8;INLINE_LEN];
        value[INLINE_LEN - len..].copy_from_slice(slice);
        ValueRef::Inline { offset: INLINE_LEN - len, value }
    }

    pub fn as_slice(&self) -> &[u8] {
        match self {
            ValueRef::Slice(items) => items,
            ValueRef::Inline { offset, value } => &value[*offset..],
            ValueRef::Bytes(bytes) => bytes,
        }
    }
}

impl Buf for ValueRef<'_> {
    fn remaining(&self) -> usize {
        self.as_slice().len()
    }

    fn chunk(&self) -> &[u8] {
        self.as_slice()
    }

    fn advance(&mut self, cnt: usize) {
        match self {
            ValueRef::Slice(items) => Buf::advance(items, cnt),
            ValueRef::Inline { offset, .. } => {
                assert!(*offset + cnt <= INLINE_LEN, "advance out of bounds");
                *offset += cnt
            },
            ValueRef::Bytes(bytes) => Buf::advance(bytes, cnt),
        }
    }
}

impl From<String> for ValueRef<'static> {
    fn from(value: String) -> Self {
        ValueRef::Bytes(Bytes::from(value))
    }
}

impl From<Vec<u8>> for ValueRef<'static> {
    fn from(value: Vec<u8>) -> Self {
        ValueRef::Bytes(Bytes::from(value))
    }
}

impl<'a> From<&'a str> for ValueRef<'a> {
    fn from(value: &'a str) -> Self {
        ValueRef::Slice(value.as_bytes())
    }
}

impl std::fmt::Debug for ValueRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        use crate::ext::FmtExt;
        self.chunk().lossy().fmt(f)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn inline_and_spill() {
        let mut small = ValueRef::copy(b"-9223372036854775808");
        assert!(matches!(small, ValueRef::Inline { .. }));
        assert_eq!(small.chunk(), b"-9223372036854775808");
        small.advance(1);
        assert_eq!(small.remaining(), 19);

        let big = ValueRef::copy(&[b'a'; 40]);
        assert!(matches!(big, ValueRef::Bytes(_)));
        assert_eq!(big.remaining(), 40);
    }
}
