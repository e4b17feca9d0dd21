//! List-query parsing.
//!
//! `page`, `limit`, `sort`, and `order` are reserved keys; every remaining
//! query key is an equality filter on the corresponding schema field, with
//! values coerced to the field's type. Keys beginning with `$` are rejected
//! outright as malformed queries.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::errors::ApiError;
use crate::schema::{EntitySchema, FieldKind};
use crate::store::SortSpec;

/// Reserved sentinel: filter keys must not start with this.
const RESERVED_SENTINEL: char = '$';

const DEFAULT_PAGE: usize = 1;
const DEFAULT_LIMIT: usize = 10;

/// Parsed listing parameters.
#[derive(Debug, Clone)]
pub struct ListQuery {
    /// 1-based page number.
    pub page: usize,
    pub limit: usize,
    pub sort: SortSpec,
    /// Equality filters on schema fields, values already coerced.
    pub filter: Map<String, Value>,
}

impl ListQuery {
    /// Records to skip before the requested page. Saturates instead of
    /// overflowing: `page` and `limit` are only checked for positivity at
    /// parse time, so their product can exceed `usize`.
    #[must_use]
    pub fn skip(&self) -> usize {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }
}

/// Parse raw query parameters for a list operation.
///
/// # Errors
///
/// `ApiError::BadRequest` for non-numeric or non-positive `page`/`limit`,
/// for filter keys starting with `$`, and for filter keys that are not
/// schema fields.
pub fn parse_list_query(
    params: &HashMap<String, String>,
    schema: &EntitySchema,
) -> Result<ListQuery, ApiError> {
    let page = parse_positive(params.get("page"), "page", DEFAULT_PAGE)?;
    let limit = parse_positive(params.get("limit"), "limit", DEFAULT_LIMIT)?;

    let sort = match params.get("sort") {
        None => SortSpec::NewestFirst,
        Some(field) => SortSpec::Field {
            name: field.clone(),
            descending: params
                .get("order")
                .is_some_and(|order| order.eq_ignore_ascii_case("desc")),
        },
    };

    let mut filter = Map::new();
    for (key, raw) in params {
        if matches!(key.as_str(), "page" | "limit" | "sort" | "order") {
            continue;
        }
        if key.starts_with(RESERVED_SENTINEL) {
            return Err(ApiError::bad_request(format!(
                "malformed query: filter key `{key}` uses a reserved prefix"
            )));
        }
        let Some(spec) = schema.get(key) else {
            return Err(ApiError::bad_request(format!("unknown filter field `{key}`")));
        };
        filter.insert(key.clone(), coerce_filter_value(spec.kind, raw));
    }

    Ok(ListQuery {
        page,
        limit,
        sort,
        filter,
    })
}

/// Coerce a raw query value to match how the field is stored, so equality
/// filters compare like with like.
fn coerce_filter_value(kind: FieldKind, raw: &str) -> Value {
    match kind {
        FieldKind::Number => raw
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map_or_else(|| Value::String(raw.to_string()), Value::Number),
        FieldKind::Boolean => match raw {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            other => Value::String(other.to_string()),
        },
        _ => Value::String(raw.to_string()),
    }
}

/// Parse the `count` parameter of dummy generation as a positive integer.
///
/// # Errors
///
/// `ApiError::BadRequest` when `count` is absent, non-numeric, or not
/// positive.
pub fn parse_count(params: &HashMap<String, String>) -> Result<usize, ApiError> {
    let raw = params
        .get("count")
        .ok_or_else(|| ApiError::bad_request("`count` query parameter is required"))?;
    match raw.trim().parse::<i64>() {
        Ok(count) if count > 0 => Ok(usize::try_from(count).unwrap_or(usize::MAX)),
        Ok(_) => Err(ApiError::bad_request("`count` must be a positive integer")),
        Err(_) => Err(ApiError::bad_request(format!(
            "`count` must be a positive integer, got `{raw}`"
        ))),
    }
}

fn parse_positive(raw: Option<&String>, name: &str, default: usize) -> Result<usize, ApiError> {
    match raw {
        None => Ok(default),
        Some(raw) => match raw.trim().parse::<i64>() {
            Ok(value) if value > 0 => Ok(usize::try_from(value).unwrap_or(usize::MAX)),
            _ => Err(ApiError::bad_request(format!(
                "`{name}` must be a positive integer, got `{raw}`"
            ))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldSpec;
    use serde_json::json;

    fn schema() -> EntitySchema {
        EntitySchema::new("items")
            .field("title", FieldSpec::string())
            .field("priority", FieldSpec::number())
            .field("done", FieldSpec::boolean())
    }

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn defaults_apply() {
        let q = parse_list_query(&params(&[]), &schema()).unwrap();
        assert_eq!(q.page, 1);
        assert_eq!(q.limit, 10);
        assert_eq!(q.sort, SortSpec::NewestFirst);
        assert!(q.filter.is_empty());
        assert_eq!(q.skip(), 0);
    }

    #[test]
    fn pagination_and_sort_parse() {
        let q = parse_list_query(
            &params(&[("page", "3"), ("limit", "5"), ("sort", "title"), ("order", "DESC")]),
            &schema(),
        )
        .unwrap();
        assert_eq!(q.page, 3);
        assert_eq!(q.skip(), 10);
        assert_eq!(
            q.sort,
            SortSpec::Field {
                name: "title".into(),
                descending: true
            }
        );
    }

    #[test]
    fn invalid_page_is_rejected() {
        assert!(parse_list_query(&params(&[("page", "zero")]), &schema()).is_err());
        assert!(parse_list_query(&params(&[("page", "0")]), &schema()).is_err());
        assert!(parse_list_query(&params(&[("limit", "-3")]), &schema()).is_err());
    }

    #[test]
    fn remaining_keys_become_coerced_filters() {
        let q = parse_list_query(
            &params(&[("priority", "5"), ("done", "true"), ("title", "x")]),
            &schema(),
        )
        .unwrap();
        assert_eq!(q.filter.get("priority"), Some(&json!(5.0)));
        assert_eq!(q.filter.get("done"), Some(&json!(true)));
        assert_eq!(q.filter.get("title"), Some(&json!("x")));
    }

    #[test]
    fn skip_saturates_for_extreme_pages() {
        let q = parse_list_query(
            &params(&[("page", "9223372036854775807"), ("limit", "10")]),
            &schema(),
        )
        .unwrap();
        assert_eq!(q.skip(), usize::MAX);

        let q = parse_list_query(
            &params(&[("page", "9223372036854775807"), ("limit", "9223372036854775807")]),
            &schema(),
        )
        .unwrap();
        assert_eq!(q.skip(), usize::MAX);
    }

    #[test]
    fn reserved_prefix_is_malformed() {
        let err = parse_list_query(&params(&[("$where", "1")]), &schema()).unwrap_err();
        assert!(err.user_message().contains("malformed query"));
    }

    #[test]
    fn unknown_filter_field_is_rejected() {
        assert!(parse_list_query(&params(&[("nope", "1")]), &schema()).is_err());
    }

    #[test]
    fn count_requires_positive_integer() {
        assert_eq!(parse_count(&params(&[("count", "3")])).unwrap(), 3);
        assert!(parse_count(&params(&[("count", "0")])).is_err());
        assert!(parse_count(&params(&[("count", "-2")])).is_err());
        assert!(parse_count(&params(&[("count", "three")])).is_err());
        assert!(parse_count(&params(&[])).is_err());
    }
}
