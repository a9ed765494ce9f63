use std::fmt;

/// SecondaryId is the identity of a secondary as the primary knows it: the
/// base URL it was configured with. ACKs are counted by this identity, so a
/// retried delivery from the same secondary never inflates a write-concern
/// count.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct SecondaryId(String);

impl SecondaryId {
    pub fn new(addr: impl Into<String>) -> Self {
        SecondaryId(addr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for SecondaryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for SecondaryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
