//! Append-only string interning for compact summaries.
//!
//! Definitions and trait labels repeat constantly across a document, so the
//! compressed summary format stores each distinct string once and refers to
//! it by index. Ids are never reused or invalidated.

use crate::error::CommonError;
use crate::identifiers::InternedStringId;
use crate::result::CommonResult;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct StringInterner {
    strings: Vec<String>,
    ids: HashMap<String, InternedStringId>,
}

impl StringInterner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild an interner from a persisted string table, keeping its order.
    pub fn from_strings<I, S>(strings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut interner = Self::new();
        for s in strings {
            interner.get_or_create_intern_id(&s.into());
        }
        interner
    }

    pub fn get_or_create_intern_id(&mut self, s: &str) -> InternedStringId {
        if let Some(id) = self.ids.get(s) {
            return *id;
        }
        let id = self.strings.len() as InternedStringId;
        self.strings.push(s.to_string());
        self.ids.insert(s.to_string(), id);
        id
    }

    pub fn get_intern_id(&self, s: &str) -> Option<InternedStringId> {
        self.ids.get(s).copied()
    }

    pub fn get_string(&self, id: InternedStringId) -> CommonResult<&str> {
        self.strings
            .get(id as usize)
            .map(String::as_str)
            .ok_or(CommonError::UnknownInternedString(id))
    }

    /// Interned strings in id order.
    pub fn serialize(&self) -> Vec<String> {
        self.strings.clone()
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}
