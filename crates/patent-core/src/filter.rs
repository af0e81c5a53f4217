//! Translation of structured [`Filters`] into the provider filter DSL.
//!
//! The free-text query is emitted first, then every populated field in
//! [`FIELD_TABLE`] order. Administrative fields (`limit`, `offset`,
//! `pre_filter`) never produce a filter.

use tracing::debug;

use crate::dates::parse_date;
use crate::defaults;
use crate::models::{DateRange, Filter, FilterOperator, Filters, TextMatch, TranslatedFilters};
use crate::{Error, Result};

/// How one request field becomes a provider filter.
pub enum FieldRule {
    /// First range only, emitted as `[min, max]`.
    DateRange(&'static str, fn(&Filters) -> Option<&Vec<DateRange>>),
    /// All values, default operator.
    TextMatch(&'static str, fn(&Filters) -> Option<&Vec<TextMatch>>),
    /// All values, OR-combined.
    Values(&'static str, fn(&Filters) -> Option<&Vec<String>>),
}

impl FieldRule {
    pub fn name(&self) -> &'static str {
        match self {
            FieldRule::DateRange(name, _)
            | FieldRule::TextMatch(name, _)
            | FieldRule::Values(name, _) => *name,
        }
    }

    fn emit(&self, filters: &Filters) -> Result<Option<Filter>> {
        let filter = match self {
            FieldRule::DateRange(name, get) => match get(filters).and_then(|r| r.first()) {
                Some(range) => Some(Filter::new(
                    name,
                    vec![
                        format_filter_date(name, &range.min)?,
                        format_filter_date(name, &range.max)?,
                    ],
                    None,
                )),
                None => None,
            },
            FieldRule::TextMatch(name, get) => get(filters)
                .filter(|values| !values.is_empty())
                .map(|values| {
                    let criteria = values.iter().map(|v| v.value.clone()).collect();
                    Filter::new(name, criteria, None)
                }),
            FieldRule::Values(name, get) => get(filters)
                .filter(|values| !values.is_empty())
                .map(|values| Filter::new(name, values.clone(), Some(FilterOperator::Or))),
        };
        Ok(filter)
    }
}

/// Every filterable request field, in emission order.
pub static FIELD_TABLE: &[FieldRule] = &[
    FieldRule::DateRange("earliest_priority_date", |f| f.earliest_priority_date.as_ref()),
    FieldRule::DateRange("application_date", |f| f.application_date.as_ref()),
    FieldRule::DateRange("publication_date", |f| f.publication_date.as_ref()),
    FieldRule::DateRange("estimated_expiry_date", |f| f.estimated_expiry_date.as_ref()),
    FieldRule::TextMatch("inventors", |f| f.inventors.as_ref()),
    FieldRule::TextMatch("current_assignees", |f| f.current_assignees.as_ref()),
    FieldRule::Values("simple_legal_status", |f| f.simple_legal_status.as_ref()),
    FieldRule::Values("authority", |f| f.authority.as_ref()),
    FieldRule::Values("simple_family_jurisdiction", |f| f.simple_family_jurisdiction.as_ref()),
    FieldRule::Values("cpc", |f| f.cpc.as_ref()),
    FieldRule::Values("document_number", |f| f.document_number.as_ref()),
];

/// Translate a filter request into provider filters plus pagination.
///
/// Fails with [`Error::InvalidInput`] on a malformed date, a negative
/// limit/offset or a limit above [`defaults::FILTER_MAX_LIMIT`].
pub fn translate(filters: &Filters) -> Result<TranslatedFilters> {
    let limit = filters.limit.unwrap_or(defaults::FILTER_LIMIT);
    let offset = filters.offset.unwrap_or(defaults::FILTER_OFFSET);
    if limit < 0 || offset < 0 {
        return Err(Error::InvalidInput(format!(
            "limit and offset must not be negative (limit={}, offset={})",
            limit, offset
        )));
    }
    if limit > defaults::FILTER_MAX_LIMIT {
        return Err(Error::InvalidInput(format!(
            "limit must not exceed {} (limit={})",
            defaults::FILTER_MAX_LIMIT,
            limit
        )));
    }

    let mut translated = Vec::new();

    if let Some(query) = filters.terms_filters.as_deref() {
        translated.push(Filter::new(
            defaults::FULLTEXT_FIELD,
            vec![fulltext_query(query)],
            None,
        ));
    }

    for rule in FIELD_TABLE {
        if let Some(filter) = rule.emit(filters)? {
            translated.push(filter);
        }
    }

    debug!(
        subsystem = "core",
        component = "filter",
        op = "translate",
        filter_count = translated.len(),
        limit,
        offset,
        "Translated filters"
    );

    Ok(TranslatedFilters {
        filters: translated,
        limit,
        offset,
        pre_filter: filters.pre_filter,
    })
}

/// `(invention_title:(q) OR descriptions.plain_text:(q) OR ...)`
fn fulltext_query(query: &str) -> String {
    let clauses: Vec<String> = defaults::FULLTEXT_SEARCH_FIELDS
        .iter()
        .map(|field| format!("{}:({})", field, query))
        .collect();
    format!("({})", clauses.join(" OR "))
}

fn format_filter_date(field: &str, value: &str) -> Result<String> {
    parse_date(value)
        .map(|date| date.format("%Y-%m-%d").to_string())
        .ok_or_else(|| Error::InvalidInput(format!("{}: malformed date '{}'", field, value)))
}
