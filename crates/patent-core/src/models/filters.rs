//! Filter request types and their provider DSL form.

use serde::{Deserialize, Serialize};

use crate::defaults;

// =============================================================================
// REQUEST FILTERS
// =============================================================================

/// Inclusive date range, `YYYY-MM-DD` (a time suffix is accepted and dropped).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub min: String,
    pub max: String,
}

/// One value of a text-match list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextMatch {
    pub value: String,
}

/// Structured filter request as sent by callers (queue job or `POST /filter`).
///
/// Every field is optional; absent and empty lists emit no provider filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Filters {
    /// Free-text query matched against title, description, claims, abstract.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terms_filters: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pre_filter: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub earliest_priority_date: Option<Vec<DateRange>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_date: Option<Vec<DateRange>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publication_date: Option<Vec<DateRange>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_expiry_date: Option<Vec<DateRange>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub inventors: Option<Vec<TextMatch>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_assignees: Option<Vec<TextMatch>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub simple_legal_status: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authority: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simple_family_jurisdiction: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpc: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_number: Option<Vec<String>>,
}

// =============================================================================
// PROVIDER DSL
// =============================================================================

/// How the criteria of one filter combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperator {
    #[default]
    And,
    Or,
    Not,
}

/// One provider filter entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub criteria: Vec<String>,
    #[serde(rename = "searchField")]
    pub field: String,
    #[serde(rename = "filterOperator", default)]
    pub operator: FilterOperator,
}

impl Filter {
    /// Build a filter, normalizing `field` into the provider namespace.
    ///
    /// An unspecified operator becomes [`FilterOperator::And`].
    pub fn new(field: &str, criteria: Vec<String>, operator: Option<FilterOperator>) -> Self {
        Self {
            criteria,
            field: Self::normalize_field(field),
            operator: operator.unwrap_or_default(),
        }
    }

    /// `earliest_priority_date` -> `patent.earliestprioritydate`.
    pub fn normalize_field(name: &str) -> String {
        format!("patent.{}", name.replace('_', "").to_lowercase())
    }
}

/// Which record fields the provider should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnFields {
    /// Full records, used by ingestion.
    All,
    /// The small projection rendered by the preview search.
    Preview,
}

impl ReturnFields {
    pub fn names(&self) -> Vec<String> {
        match self {
            ReturnFields::All => vec!["all".to_string()],
            ReturnFields::Preview => defaults::PREVIEW_RETURN_FIELDS
                .iter()
                .map(|f| f.to_string())
                .collect(),
        }
    }
}

/// The part of a provider request that is the same for every page of a query.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterSet {
    pub filters: Vec<Filter>,
    pub pre_filter: Option<bool>,
    pub return_fields: ReturnFields,
}

/// Output of filter translation: provider filters plus pagination.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslatedFilters {
    pub filters: Vec<Filter>,
    pub limit: i64,
    pub offset: i64,
    pub pre_filter: Option<bool>,
}

impl TranslatedFilters {
    /// Provider filter set for these filters with the given projection.
    pub fn filter_set(&self, return_fields: ReturnFields) -> FilterSet {
        FilterSet {
            filters: self.filters.clone(),
            pre_filter: self.pre_filter,
            return_fields,
        }
    }
}
