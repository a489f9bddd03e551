//! Page and sort options shared by list queries.
//!
//! # Invariants
//! - Sort columns come from per-aggregate allow-list enums; caller text is
//!   never interpolated into SQL.
//! - Limits default to 10 and clamp to 50.

use crate::model::validation::ValidationError;

pub const DEFAULT_PAGE_LIMIT: u32 = 10;
pub const MAX_PAGE_LIMIT: u32 = 50;

/// Allow-listed column a list may be ordered by.
pub trait SortField: Copy {
    fn column(self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    fn keyword(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }
}

/// Page options for one list call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery<F> {
    /// Maximum rows to return. `None` means the default page size;
    /// `Some(0)` is rejected by the services.
    pub limit: Option<u32>,
    pub offset: u32,
    pub sort: Option<(F, SortOrder)>,
}

impl<F> Default for ListQuery<F> {
    fn default() -> Self {
        Self {
            limit: None,
            offset: 0,
            sort: None,
        }
    }
}

impl<F: SortField> ListQuery<F> {
    /// Rejects an explicit zero page size.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.limit == Some(0) {
            return Err(ValidationError::ZeroPageLimit);
        }
        Ok(())
    }

    /// `ORDER BY` clause with `id` as the stable tie-breaker.
    pub(crate) fn order_by(&self, default: F) -> String {
        let (field, order) = self.sort.unwrap_or((default, SortOrder::Asc));
        format!("ORDER BY {} {}, id ASC", field.column(), order.keyword())
    }

    pub(crate) fn page_limit(&self) -> u32 {
        normalize_limit(self.limit)
    }
}

/// Normalizes a list limit according to the listing contract.
pub fn normalize_limit(limit: Option<u32>) -> u32 {
    match limit {
        Some(0) | None => DEFAULT_PAGE_LIMIT,
        Some(value) => value.min(MAX_PAGE_LIMIT),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Column {
        Name,
        Rank,
    }

    impl SortField for Column {
        fn column(self) -> &'static str {
            match self {
                Self::Name => "name",
                Self::Rank => "rank",
            }
        }
    }

    #[test]
    fn limit_defaults_to_10_and_caps_at_50() {
        assert_eq!(normalize_limit(None), 10);
        assert_eq!(normalize_limit(Some(7)), 7);
        assert_eq!(normalize_limit(Some(500)), 50);
    }

    #[test]
    fn explicit_zero_limit_is_rejected() {
        let query = ListQuery::<Column> {
            limit: Some(0),
            ..Default::default()
        };
        assert_eq!(query.validate(), Err(ValidationError::ZeroPageLimit));
        assert!(ListQuery::<Column>::default().validate().is_ok());
    }

    #[test]
    fn order_by_falls_back_to_default_column() {
        let query = ListQuery::<Column>::default();
        assert_eq!(query.order_by(Column::Rank), "ORDER BY rank ASC, id ASC");

        let query = ListQuery {
            sort: Some((Column::Name, SortOrder::Desc)),
            ..Default::default()
        };
        assert_eq!(query.order_by(Column::Rank), "ORDER BY name DESC, id ASC");
    }

    #[test]
    fn sort_order_parse_is_case_insensitive() {
        assert_eq!(SortOrder::parse("DESC"), Some(SortOrder::Desc));
        assert_eq!(SortOrder::parse("sideways"), None);
    }
}
