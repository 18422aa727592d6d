//! Pagination and sorting for list queries.

use serde::Serialize;

use crate::validation::Validator;

pub const MAX_PAGE: i64 = 10_000_000;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Sortable movie columns. The enum is the SQL safelist: only these names
/// ever reach an `ORDER BY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortColumn {
    Id,
    Title,
    Year,
    Runtime,
}

impl SortColumn {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Title => "title",
            Self::Year => "year",
            Self::Runtime => "runtime",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        match name {
            "id" => Some(Self::Id),
            "title" => Some(Self::Title),
            "year" => Some(Self::Year),
            "runtime" => Some(Self::Runtime),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sort {
    pub column: SortColumn,
    pub descending: bool,
}

impl Sort {
    /// Parse `column` or `-column`.
    pub fn parse(raw: &str) -> Option<Self> {
        let (descending, name) = match raw.strip_prefix('-') {
            Some(name) => (true, name),
            None => (false, raw),
        };
        SortColumn::parse(name).map(|column| Self { column, descending })
    }

    pub fn direction(self) -> &'static str {
        if self.descending { "DESC" } else { "ASC" }
    }
}

impl Default for Sort {
    fn default() -> Self {
        Self {
            column: SortColumn::Id,
            descending: false,
        }
    }
}

/// Raw list parameters as supplied by the caller.
#[derive(Debug, Clone)]
pub struct Filters {
    pub page: i64,
    pub page_size: i64,
    pub sort: String,
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
            sort: "id".into(),
        }
    }
}

impl Filters {
    pub fn validate(&self, v: &mut Validator) {
        v.check(self.page > 0, "page", "must be greater than zero");
        v.check(self.page <= MAX_PAGE, "page", "must be a maximum of 10 million");
        v.check(self.page_size > 0, "page_size", "must be greater than zero");
        v.check(self.page_size <= MAX_PAGE_SIZE, "page_size", "must be a maximum of 100");
        v.check(Sort::parse(&self.sort).is_some(), "sort", "invalid sort value");
    }

    /// The parsed sort; falls back to `id ASC` for values that never passed
    /// validation.
    pub fn sort(&self) -> Sort {
        Sort::parse(&self.sort).unwrap_or_default()
    }

    pub fn limit(&self) -> i64 {
        self.page_size
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }
}

/// Pagination metadata returned alongside a page of results. Empty when the
/// query matched nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Metadata {
    #[serde(skip_serializing_if = "is_zero")]
    pub current_page: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub page_size: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub first_page: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub last_page: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub total_records: i64,
}

fn is_zero(n: &i64) -> bool {
    *n == 0
}

impl Metadata {
    pub fn calculate(total_records: i64, page: i64, page_size: i64) -> Self {
        if total_records == 0 || page_size <= 0 {
            return Self::default();
        }
        Self {
            current_page: page,
            page_size,
            first_page: 1,
            last_page: (total_records + page_size - 1) / page_size,
            total_records,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_parsing() {
        assert_eq!(
            Sort::parse("-year"),
            Some(Sort {
                column: SortColumn::Year,
                descending: true
            })
        );
        assert_eq!(Sort::parse("title").map(|s| s.direction()), Some("ASC"));
        assert!(Sort::parse("created_at").is_none());
        assert!(Sort::parse("--id").is_none());
    }

    #[test]
    fn filters_reject_out_of_range_values() {
        let filters = Filters {
            page: 0,
            page_size: 101,
            sort: "name".into(),
        };
        let mut v = Validator::new();
        filters.validate(&mut v);
        let errors = v.finish().unwrap_err();
        assert!(errors.contains_key("page"));
        assert!(errors.contains_key("page_size"));
        assert!(errors.contains_key("sort"));
    }

    #[test]
    fn offset_follows_page() {
        let filters = Filters {
            page: 3,
            page_size: 20,
            sort: "id".into(),
        };
        assert_eq!(filters.offset(), 40);
        assert_eq!(filters.limit(), 20);
    }

    #[test]
    fn metadata_rounds_last_page_up() {
        let meta = Metadata::calculate(41, 1, 20);
        assert_eq!(meta.last_page, 3);
        assert_eq!(meta.first_page, 1);
        assert_eq!(Metadata::calculate(0, 1, 20), Metadata::default());
    }
}
