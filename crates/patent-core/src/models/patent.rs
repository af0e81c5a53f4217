//! Normalized patent entities and provider response types.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

use crate::{Error, Result};

// =============================================================================
// NORMALIZED ENTITIES
// =============================================================================

/// Bibliographic record derived from one provider patent.
///
/// `id` is generated at parse time and is the join key for every child row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPatent {
    pub id: Uuid,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub description: String,
    pub brief_description_of_drawings: String,
    pub cpc: String,
    pub earliest_priority_date: Option<NaiveDate>,
    pub estimated_expiry_date: Option<NaiveDate>,
    pub application_date: Option<NaiveDate>,
    pub application_number: String,
    pub issue_date: Option<NaiveDate>,
    pub publication_date: Option<NaiveDate>,
    pub publication_number: String,
    pub simple_legal_status: String,
    pub authority: String,
    pub inpadoc_family: String,
    pub inpadoc_family_application_count: i32,
    pub inpadoc_family_jurisdiction: String,
    pub inpadoc_family_jurisdiction_count: i32,
    pub count_of_cited_by_patents: i32,
    pub first_claim: String,
    pub total_number_of_claims: i32,
    pub total_number_of_independent_claims: i32,
    pub file_url: String,
}

/// An independent claim with the dependent claims that resolve to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub patent_id: Uuid,
    pub claim_number: i32,
    pub independent_claim: String,
    pub dependent_claims: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Inventor {
    pub full_name: String,
}

/// Standardized current assignee.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Assignee {
    pub name: String,
}

/// Simple family jurisdiction (country code).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Jurisdiction {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventorLink {
    pub patent_id: Uuid,
    pub inventor_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssigneeLink {
    pub patent_id: Uuid,
    pub assignee_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JurisdictionLink {
    pub patent_id: Uuid,
    pub jurisdiction_name: String,
}

/// One patent and every entity derived from it; the unit handed from the
/// parse stage to persistence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatentRecord {
    pub patent: NormalizedPatent,
    pub inventors: Vec<Inventor>,
    pub inventor_links: Vec<InventorLink>,
    pub assignees: Vec<Assignee>,
    pub assignee_links: Vec<AssigneeLink>,
    pub jurisdictions: Vec<Jurisdiction>,
    pub jurisdiction_links: Vec<JurisdictionLink>,
    pub claims: Vec<Claim>,
}

// =============================================================================
// PREVIEW SEARCH
// =============================================================================

/// Compact patent summary returned by the synchronous filter endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilteredPatent {
    pub title: String,
    pub publication_number: String,
    pub earliest_priority_date: Option<NaiveDate>,
    pub estimated_expiry_date: Option<NaiveDate>,
    pub inventors_names: Vec<String>,
    pub assignee: Vec<String>,
    pub simple_family_jurisdiction: Vec<String>,
    pub application_date: Option<NaiveDate>,
    pub simple_legal_status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilteredPatentsResponse {
    pub patents: Vec<FilteredPatent>,
    pub statistics: Map<String, JsonValue>,
    pub total_patents: i64,
}

// =============================================================================
// PROVIDER RESPONSES
// =============================================================================

/// Aggregations and total hit count for a filter set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchStatistics {
    pub aggregations: Map<String, JsonValue>,
    pub total_found: i64,
}

/// Unparsed body of one provider search page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPage(pub String);

impl RawPage {
    pub fn new(body: impl Into<String>) -> Self {
        Self(body.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode the body and return `response.items`.
    ///
    /// Fails when the body is not JSON or when `response.items` is not an
    /// array. Item shapes are not checked here.
    pub fn into_items(self) -> Result<Vec<JsonValue>> {
        let mut body: JsonValue = serde_json::from_str(&self.0)
            .map_err(|e| Error::MalformedResponse(format!("page is not JSON: {}", e)))?;

        match body
            .get_mut("response")
            .and_then(|r| r.get_mut("items"))
            .map(JsonValue::take)
        {
            Some(JsonValue::Array(items)) => Ok(items),
            _ => Err(Error::MalformedResponse(
                "missing or invalid 'response.items'".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_page_items() {
        let page = RawPage::new(r#"{"response": {"items": [{"a": 1}, {"b": 2}], "totalFound": 2}}"#);
        let items = page.into_items().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["a"], 1);
    }

    #[test]
    fn test_raw_page_empty_items() {
        let page = RawPage::new(r#"{"response": {"items": []}}"#);
        assert!(page.into_items().unwrap().is_empty());
    }

    #[test]
    fn test_raw_page_missing_items() {
        let page = RawPage::new(r#"{"response": {"totalFound": 0}}"#);
        assert!(matches!(page.into_items(), Err(Error::MalformedResponse(_))));
    }

    #[test]
    fn test_raw_page_not_json() {
        let page = RawPage::new("<html>bad gateway</html>");
        assert!(matches!(page.into_items(), Err(Error::MalformedResponse(_))));
    }

    #[test]
    fn test_patent_serializes_abstract_name() {
        let patent = NormalizedPatent {
            abstract_text: "text".into(),
            ..Default::default()
        };
        let json = serde_json::to_value(&patent).unwrap();
        assert_eq!(json["abstract"], "text");
    }
}
