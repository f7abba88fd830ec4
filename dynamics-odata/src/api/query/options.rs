//! List request options

use super::filters::Filter;
use crate::error::{Error, Result};

/// One `$orderby` item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub descending: bool,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: false,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: true,
        }
    }

    pub fn to_odata(&self) -> String {
        if self.descending {
            format!("{} desc", self.field)
        } else {
            format!("{} asc", self.field)
        }
    }
}

/// Options for a collection request
///
/// `top` and server paging (`max_page_size` / `skip_token`) exclude each
/// other; [`validate`](Self::validate) rejects the combination.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    pub select: Vec<String>,
    pub order_by: Vec<OrderBy>,
    pub filter: Option<String>,
    pub expand: Option<String>,
    pub include_count: bool,
    pub skip: Option<u32>,
    pub top: Option<u32>,
    pub skip_token: Option<String>,
    pub fetch_xml: Option<String>,
    pub max_page_size: Option<u32>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    /// Raw `$filter` expression, sent verbatim
    pub fn filter(mut self, expression: impl Into<String>) -> Self {
        self.filter = Some(expression.into());
        self
    }

    pub fn filter_by(self, filter: Filter) -> Self {
        self.filter(filter.to_odata())
    }

    pub fn expand(mut self, expand: impl Into<String>) -> Self {
        self.expand = Some(expand.into());
        self
    }

    pub fn count(mut self) -> Self {
        self.include_count = true;
        self
    }

    pub fn skip(mut self, skip: u32) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn top(mut self, top: u32) -> Self {
        self.top = Some(top);
        self
    }

    pub fn skip_token(mut self, token: impl Into<String>) -> Self {
        self.skip_token = Some(token.into());
        self
    }

    pub fn fetch_xml(mut self, fetch_xml: impl Into<String>) -> Self {
        self.fetch_xml = Some(fetch_xml.into());
        self
    }

    pub fn max_page_size(mut self, size: u32) -> Self {
        self.max_page_size = Some(size);
        self
    }

    /// Whether the caller asked for server-side paging
    pub fn is_paged(&self) -> bool {
        self.max_page_size.is_some_and(|size| size > 0)
    }

    pub fn validate(&self) -> Result<()> {
        let top = self.top.unwrap_or(0);
        if top > 0 && (self.skip_token.is_some() || self.max_page_size.is_some()) {
            return Err(Error::invalid_argument(
                "Top cannot be combined with MaxPageSize or SkipToken",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_conflicts_with_paging() {
        assert!(QueryOptions::new().top(10).validate().is_ok());
        assert!(QueryOptions::new().max_page_size(10).skip_token("x").validate().is_ok());

        let err = QueryOptions::new().top(10).skip_token("x").validate().unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
        assert!(QueryOptions::new().top(5).max_page_size(10).validate().is_err());

        // a zero top is no limit
        assert!(QueryOptions::new().top(0).max_page_size(10).validate().is_ok());
    }

    #[test]
    fn test_builder_collects_options() {
        let options = QueryOptions::new()
            .select(["name", "revenue"])
            .order_by(OrderBy::desc("revenue"))
            .filter_by(Filter::eq("statecode", 0))
            .count();

        assert_eq!(options.select, vec!["name", "revenue"]);
        assert_eq!(options.order_by[0].to_odata(), "revenue desc");
        assert_eq!(options.filter.as_deref(), Some("statecode eq 0"));
        assert!(options.include_count);
        assert!(!options.is_paged());
    }
}
