use std::borrow::Cow;

use super::{ObjectKind, Storable};

/// File contents, with no name or mode attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    data: Vec<u8>,
}

impl Storable for Blob {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Blob
    }

    fn payload(&self) -> Cow<'_, [u8]> {
        Cow::Borrowed(&self.data)
    }
}

impl Blob {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}
