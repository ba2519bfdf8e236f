//! Structured query parameters for list and search operations.
//!
//! The wire format is a flat query string: scalar fields map one-to-one to
//! query keys, list-valued fields (ordering, filters, expansion paths) are
//! joined into a single value with a per-field delimiter. Delimiters are
//! configurable because a filter value may legitimately contain the default
//! one.

/// Sort direction for an [`OrderBy`] entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Clone, Debug)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// Comparison operator of a [`Filter`] expression.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Substring match.
    Like,
}

impl FilterOp {
    fn as_str(self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Ne => "!=",
            FilterOp::Gt => ">",
            FilterOp::Gte => ">=",
            FilterOp::Lt => "<",
            FilterOp::Lte => "<=",
            FilterOp::Like => "~",
        }
    }
}

#[derive(Clone, Debug)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: String,
}

/// Structured parameter object serialized onto the query string of list
/// operations: paging, full-text search, ordering, filtering, and reference
/// expansion.
#[derive(Clone, Debug)]
pub struct QueryParams {
    limit: Option<u32>,
    offset: Option<u32>,
    search: Option<String>,
    order: Vec<OrderBy>,
    filter: Vec<Filter>,
    expand: Vec<String>,
    order_delimiter: char,
    filter_delimiter: char,
    expand_delimiter: char,
}

const DEFAULT_ORDER_DELIMITER: char = ';';
const DEFAULT_FILTER_DELIMITER: char = ';';
const DEFAULT_EXPAND_DELIMITER: char = ',';

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            limit: None,
            offset: None,
            search: None,
            order: Vec::new(),
            filter: Vec::new(),
            expand: Vec::new(),
            order_delimiter: DEFAULT_ORDER_DELIMITER,
            filter_delimiter: DEFAULT_FILTER_DELIMITER,
            expand_delimiter: DEFAULT_EXPAND_DELIMITER,
        }
    }
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn search(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order.push(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn filter(mut self, field: impl Into<String>, op: FilterOp, value: impl Into<String>) -> Self {
        self.filter.push(Filter {
            field: field.into(),
            op,
            value: value.into(),
        });
        self
    }

    /// Expands a reference field inline, e.g. `owner` or `owner.group`.
    pub fn expand(mut self, path: impl Into<String>) -> Self {
        self.expand.push(path.into());
        self
    }

    pub fn order_delimiter(mut self, delimiter: char) -> Self {
        self.order_delimiter = delimiter;
        self
    }

    pub fn filter_delimiter(mut self, delimiter: char) -> Self {
        self.filter_delimiter = delimiter;
        self
    }

    pub fn expand_delimiter(mut self, delimiter: char) -> Self {
        self.expand_delimiter = delimiter;
        self
    }

    /// Serializes into wire query pairs. Percent-encoding happens later,
    /// when the pairs are appended to the URL.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(limit) = self.limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        if let Some(offset) = self.offset {
            pairs.push(("offset".to_string(), offset.to_string()));
        }
        if let Some(search) = &self.search {
            pairs.push(("search".to_string(), search.clone()));
        }
        if !self.order.is_empty() {
            let rendered = self
                .order
                .iter()
                .map(|order| match order.direction {
                    Direction::Asc => format!("{},asc", order.field),
                    Direction::Desc => format!("{},desc", order.field),
                })
                .collect::<Vec<_>>()
                .join(&self.order_delimiter.to_string());
            pairs.push(("order".to_string(), rendered));
        }
        if !self.filter.is_empty() {
            let rendered = self
                .filter
                .iter()
                .map(|filter| format!("{}{}{}", filter.field, filter.op.as_str(), filter.value))
                .collect::<Vec<_>>()
                .join(&self.filter_delimiter.to_string());
            pairs.push(("filter".to_string(), rendered));
        }
        if !self.expand.is_empty() {
            pairs.push((
                "expand".to_string(),
                self.expand.join(&self.expand_delimiter.to_string()),
            ));
        }
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_fields_map_to_individual_pairs() {
        let pairs = QueryParams::new().limit(25).offset(50).search("bolt").to_pairs();
        assert_eq!(
            pairs,
            vec![
                ("limit".to_string(), "25".to_string()),
                ("offset".to_string(), "50".to_string()),
                ("search".to_string(), "bolt".to_string()),
            ]
        );
    }

    #[test]
    fn list_fields_join_with_their_default_delimiters() {
        let pairs = QueryParams::new()
            .order_by("name", Direction::Asc)
            .order_by("updated", Direction::Desc)
            .filter("archived", FilterOp::Eq, "false")
            .filter("salePrice", FilterOp::Gte, "1000")
            .expand("owner")
            .expand("owner.group")
            .to_pairs();
        assert_eq!(
            pairs,
            vec![
                ("order".to_string(), "name,asc;updated,desc".to_string()),
                ("filter".to_string(), "archived=false;salePrice>=1000".to_string()),
                ("expand".to_string(), "owner,owner.group".to_string()),
            ]
        );
    }

    #[test]
    fn delimiters_are_configurable_per_field() {
        let pairs = QueryParams::new()
            .filter("note", FilterOp::Like, "a;b")
            .filter_delimiter('|')
            .filter("kind", FilterOp::Eq, "bundle")
            .to_pairs();
        assert_eq!(pairs, vec![("filter".to_string(), "note~a;b|kind=bundle".to_string())]);
    }

    #[test]
    fn empty_params_serialize_to_nothing() {
        assert!(QueryParams::new().to_pairs().is_empty());
    }
}
