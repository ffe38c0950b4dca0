use serde::{Deserialize, Serialize};

use crate::validation::Field;

/// Page sizes offered to the user.
pub const LIMIT_OPTIONS: [u32; 3] = [4, 8, 12];
pub const DEFAULT_LIMIT: u32 = 4;

/// Raw, unvalidated filter text exactly as the user typed it. Invalid values
/// are stored too, so the field can keep reflecting the keystrokes while a
/// validation message is shown alongside.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterState {
    pub name: String,
    pub age: String,
}

impl FilterState {
    pub fn set(&mut self, field: Field, raw: impl Into<String>) {
        match field {
            Field::Name => self.name = raw.into(),
            Field::Age => self.age = raw.into(),
        }
    }

    pub fn get(&self, field: Field) -> &str {
        match field {
            Field::Name => &self.name,
            Field::Age => &self.age,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationState {
    pub limit: u32,
    pub offset: u32,
}

impl Default for PaginationState {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

impl PaginationState {
    /// 1-based page number for display.
    pub fn page_number(&self) -> u32 {
        self.offset / self.limit + 1
    }

    pub fn reset_offset(&mut self) {
        self.offset = 0;
    }

    /// Steps back one page, clamped at the first. Returns false when already
    /// on the first page.
    pub fn prev(&mut self) -> bool {
        if self.offset == 0 {
            return false;
        }
        self.offset = self.offset.saturating_sub(self.limit);
        true
    }

    pub fn next(&mut self) {
        self.offset += self.limit;
    }

    /// Replaces the page size and rewinds to the first page.
    pub fn set_limit(&mut self, limit: u32) {
        self.limit = limit;
        self.offset = 0;
    }
}

/// Structural merge of filters and pagination: the value a single fetch is
/// issued for. Commit identity is tracked by a generation counter in the
/// coordinator, never by comparing two of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserQuery {
    pub name: String,
    pub age: String,
    pub limit: u32,
    pub offset: u32,
}

impl UserQuery {
    pub fn merge(filters: &FilterState, pagination: PaginationState) -> Self {
        Self {
            name: filters.name.clone(),
            age: filters.age.clone(),
            limit: pagination.limit,
            offset: pagination.offset,
        }
    }
}
