//! Normalization of raw provider patents.
//!
//! [`PatentExtractor`] turns one provider JSON item into a [`PatentRecord`]
//! (ingestion) or a [`FilteredPatent`] (preview search). Missing or mistyped
//! fields are defaulted; only a non-object item is an error.

mod claims;
mod fields;

pub use claims::{claim_number, resolve_claims, ClaimSet};
pub use fields::strip_html;

use chrono::NaiveDate;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use patent_core::{
    Assignee, AssigneeLink, Error, FilteredPatent, Inventor, InventorLink, Jurisdiction,
    JurisdictionLink, NormalizedPatent, PatentRecord, RawPage, Result,
};

use fields::{
    array, date, dedup, first_populated, objects, paragraphs, party_names, text, Object,
};

const BRIEF_DESCRIPTION: &str = "brief-description-of-drawings";
const DRAWINGS_DESCRIPTION: &str = "description-of-drawings";
const ASSIGNEE_SOURCES: [&str; 3] = ["currentOwners", "currentAssignees", "assignees"];

/// Stateless converter from provider items to normalized records.
#[derive(Debug, Clone)]
pub struct PatentExtractor {
    pdf_base_url: String,
}

impl PatentExtractor {
    /// `pdf_base_url` prefixes the publication number to form `file_url`.
    pub fn new(pdf_base_url: impl Into<String>) -> Self {
        Self {
            pdf_base_url: pdf_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Decode a page and extract every item on it.
    pub fn extract_page(&self, page: RawPage) -> Result<Vec<PatentRecord>> {
        page.into_items()?.iter().map(|item| self.extract(item)).collect()
    }

    /// Decode a page into preview summaries.
    pub fn summarize_page(&self, page: RawPage) -> Result<Vec<FilteredPatent>> {
        page.into_items()?.iter().map(|item| self.summarize(item)).collect()
    }

    /// Full normalization of one item with a freshly generated patent id.
    pub fn extract(&self, item: &JsonValue) -> Result<PatentRecord> {
        let item = as_object(item)?;
        let patent_id = Uuid::new_v4();
        let mut patent = self.patent(item, patent_id);

        let claims = resolve_claims(item, patent_id);
        patent.first_claim = claims.first_claim().to_string();
        patent.total_number_of_claims = count(claims.total);
        patent.total_number_of_independent_claims = count(claims.independent_count());

        let inventor_names = party_names(objects(item, "inventors"));
        let assignee_names = assignee_names(item);
        let jurisdiction_names = jurisdictions(item, patent.earliest_priority_date);

        Ok(PatentRecord {
            inventors: inventor_names
                .iter()
                .map(|name| Inventor {
                    full_name: name.clone(),
                })
                .collect(),
            inventor_links: inventor_names
                .into_iter()
                .map(|inventor_name| InventorLink {
                    patent_id,
                    inventor_name,
                })
                .collect(),
            assignees: assignee_names
                .iter()
                .map(|name| Assignee { name: name.clone() })
                .collect(),
            assignee_links: assignee_names
                .into_iter()
                .map(|assignee_name| AssigneeLink {
                    patent_id,
                    assignee_name,
                })
                .collect(),
            jurisdictions: jurisdiction_names
                .iter()
                .map(|name| Jurisdiction { name: name.clone() })
                .collect(),
            jurisdiction_links: jurisdiction_names
                .into_iter()
                .map(|jurisdiction_name| JurisdictionLink {
                    patent_id,
                    jurisdiction_name,
                })
                .collect(),
            claims: claims.claims,
            patent,
        })
    }

    /// Compact preview of one item.
    pub fn summarize(&self, item: &JsonValue) -> Result<FilteredPatent> {
        let item = as_object(item)?;
        let earliest_priority_date = date(item, "minPriorityDate");
        let legal_status = text(item, "legalStatus");

        Ok(FilteredPatent {
            title: title(item).to_string(),
            publication_number: text(item, "documentNumber").to_string(),
            earliest_priority_date,
            estimated_expiry_date: date(item, "projectedExpirationDate"),
            inventors_names: party_names(objects(item, "inventors")),
            assignee: assignee_names(item),
            simple_family_jurisdiction: jurisdictions(item, earliest_priority_date),
            application_date: application_date(item),
            simple_legal_status: (!legal_status.is_empty()).then(|| legal_status.to_string()),
        })
    }

    fn patent(&self, item: &Object, id: Uuid) -> NormalizedPatent {
        let publication_number = text(item, "documentNumber");
        let (description, brief_description_of_drawings) = descriptions(item);
        let publication_date = objects(item, "publicationReferences")
            .map(|reference| text(reference, "documentDate"))
            .find(|value| !value.is_empty())
            .and_then(patent_core::parse_date);

        let cpc: Vec<&str> = objects(item, "cpcClassifications")
            .filter_map(|entry| entry.get("symbol").and_then(JsonValue::as_str))
            .collect();

        let mut family_members = Vec::new();
        let mut family_countries = Vec::new();
        for member in objects(item, "inpadocFamilyMembers") {
            let country = text(member, "country");
            family_members.push(format!(
                "{}{}{}",
                country,
                text(member, "documentNumber"),
                text(member, "kind")
            ));
            if !country.is_empty() {
                family_countries.push(country);
            }
        }

        NormalizedPatent {
            id,
            title: title(item).to_string(),
            abstract_text: strip_html(&paragraphs(item, "abstractParagraphs")),
            description,
            brief_description_of_drawings,
            cpc: cpc.join(" | "),
            earliest_priority_date: date(item, "minPriorityDate"),
            estimated_expiry_date: date(item, "projectedExpirationDate"),
            application_date: application_date(item),
            application_number: application_number(item).to_string(),
            issue_date: publication_date,
            publication_date,
            publication_number: publication_number.to_string(),
            simple_legal_status: text(item, "legalStatus").to_string(),
            authority: item
                .get("publicationReference")
                .and_then(JsonValue::as_object)
                .map(|reference| text(reference, "country"))
                .unwrap_or("")
                .to_string(),
            inpadoc_family: family_members.join(" | "),
            inpadoc_family_application_count: count(family_members.len()),
            inpadoc_family_jurisdiction: family_countries.join(" | "),
            inpadoc_family_jurisdiction_count: count(family_countries.len()),
            count_of_cited_by_patents: count(array(item, "backwardCitations").len()),
            file_url: format!("{}/{}", self.pdf_base_url, publication_number),
            ..Default::default()
        }
    }
}

fn as_object(item: &JsonValue) -> Result<&Object> {
    item.as_object().ok_or_else(|| {
        Error::MalformedResponse(format!("patent item is not an object: {}", kind(item)))
    })
}

fn kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

fn count(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

fn title(item: &Object) -> &str {
    let title = text(item, "inventionTitle");
    if !title.is_empty() {
        return title;
    }
    objects(item, "inventionTitles")
        .find(|entry| text(entry, "lang") == "eng")
        .map(|entry| text(entry, "title"))
        .unwrap_or("")
}

/// Full description and the brief description of drawings, both stripped.
fn descriptions(item: &Object) -> (String, String) {
    let mut description = String::new();
    let mut drawings = String::new();
    let mut in_brief = false;

    for paragraph in objects(item, "descriptions") {
        let category = text(paragraph, "category");
        if category == BRIEF_DESCRIPTION {
            in_brief = !in_brief;
        }
        let Some(plain) = paragraph.get("plainText").and_then(JsonValue::as_str) else {
            continue;
        };
        description.push_str(plain);
        description.push('\n');
        if in_brief || category == DRAWINGS_DESCRIPTION {
            drawings.push_str(plain);
            drawings.push('\n');
        }
    }

    (strip_html(&description), strip_html(&drawings))
}

fn application_date(item: &Object) -> Option<NaiveDate> {
    objects(item, "applicationReferences")
        .map(|reference| text(reference, "documentDate"))
        .find(|value| !value.is_empty())
        .and_then(patent_core::parse_date)
}

fn application_number(item: &Object) -> &str {
    objects(item, "applicationReferences")
        .filter(|reference| text(reference, "dataFormat") == "original")
        .map(|reference| text(reference, "documentNumber"))
        .find(|value| !value.is_empty())
        .unwrap_or("")
}

fn assignee_names(item: &Object) -> Vec<String> {
    party_names(
        first_populated(item, &ASSIGNEE_SOURCES)
            .iter()
            .filter_map(JsonValue::as_object),
    )
}

/// Countries of the priority claims filed on the earliest priority date.
fn jurisdictions(item: &Object, earliest_priority_date: Option<NaiveDate>) -> Vec<String> {
    let Some(earliest) = earliest_priority_date else {
        return Vec::new();
    };
    dedup(
        objects(item, "priorityClaims")
            .filter(|claim| date(claim, "documentDate") == Some(earliest))
            .map(|claim| text(claim, "country"))
            .filter(|country| !country.is_empty()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn extractor() -> PatentExtractor {
        PatentExtractor::new("https://provider.test/patents/pdf/")
    }

    fn sample() -> JsonValue {
        json!({
            "documentNumber": "US1234567B2",
            "legalStatus": "Active",
            "inventionTitles": [
                {"lang": "fre", "title": "Widget (fr)"},
                {"lang": "eng", "title": "Widget"}
            ],
            "cpcClassifications": [{"symbol": "A01B1/00"}, {"symbol": "B02C"}, {"other": 1}],
            "inpadocFamilyMembers": [
                {"country": "US", "documentNumber": "1234567", "kind": "B2"},
                {"documentNumber": "999", "kind": "A"}
            ],
            "abstractParagraphs": [{"plainText": "<b>Abstract</b> text"}],
            "descriptions": [
                {"category": "background", "plainText": "Background."},
                {"category": "brief-description-of-drawings", "plainText": "Heading"},
                {"category": "", "plainText": "FIG. 1 shows."},
                {"category": "brief-description-of-drawings", "plainText": "End"},
                {"category": "detailed", "plainText": "Details."},
                {"category": "description-of-drawings", "plainText": "FIG. 2 shows."}
            ],
            "publicationReference": {"country": "US"},
            "applicationReferences": [
                {"dataFormat": "docdb", "documentNumber": "15000000", "documentDate": "2019-03-01"},
                {"dataFormat": "original", "documentNumber": "15/000,000", "documentDate": "2019-03-02"}
            ],
            "publicationReferences": [{"documentDate": ""}, {"documentDate": "2021-06-01"}],
            "minPriorityDate": "2018-01-15",
            "projectedExpirationDate": "2038-01-15T00:00:00",
            "priorityClaims": [
                {"country": "US", "documentDate": "2018-01-15"},
                {"country": "EP", "documentDate": "2018-01-15"},
                {"country": "US", "documentDate": "2018-01-15"},
                {"country": "JP", "documentDate": "2018-06-01"}
            ],
            "backwardCitations": [{}, {}, {}],
            "inventors": [{"partyNameClean": "Ada Lovelace"}, {"partyName": "Charles Babbage"}],
            "currentOwners": [],
            "currentAssignees": [{"partyNameClean": "Acme Corp"}],
            "assignees": [{"partyNameClean": "Old Owner"}],
            "claimsXml": [
                {"claimId": "CLM-00001", "isDependent": false, "xmlText": "<claim>A widget.</claim>"},
                {"claimId": "CLM-00002", "isDependent": true, "claimReferences": ["CLM-00001"], "xmlText": "The widget of claim 1."}
            ]
        })
    }

    #[test]
    fn test_extract_patent_fields() {
        let record = extractor().extract(&sample()).unwrap();
        let patent = &record.patent;

        assert_eq!(patent.title, "Widget");
        assert_eq!(patent.publication_number, "US1234567B2");
        assert_eq!(patent.simple_legal_status, "Active");
        assert_eq!(patent.cpc, "A01B1/00 | B02C");
        assert_eq!(patent.inpadoc_family, "US1234567B2 | 999A");
        assert_eq!(patent.inpadoc_family_application_count, 2);
        assert_eq!(patent.inpadoc_family_jurisdiction, "US");
        assert_eq!(patent.inpadoc_family_jurisdiction_count, 1);
        assert_eq!(patent.abstract_text, " Abstract  text\n");
        assert_eq!(patent.authority, "US");
        assert_eq!(patent.application_number, "15/000,000");
        assert_eq!(patent.application_date, NaiveDate::from_ymd_opt(2019, 3, 1));
        assert_eq!(patent.issue_date, NaiveDate::from_ymd_opt(2021, 6, 1));
        assert_eq!(patent.publication_date, patent.issue_date);
        assert_eq!(patent.earliest_priority_date, NaiveDate::from_ymd_opt(2018, 1, 15));
        assert_eq!(patent.estimated_expiry_date, NaiveDate::from_ymd_opt(2038, 1, 15));
        assert_eq!(patent.count_of_cited_by_patents, 3);
        assert_eq!(
            patent.file_url,
            "https://provider.test/patents/pdf/US1234567B2"
        );
    }

    #[test]
    fn test_extract_descriptions_toggle() {
        let record = extractor().extract(&sample()).unwrap();
        assert_eq!(
            record.patent.description,
            "Background.\nHeading\nFIG. 1 shows.\nEnd\nDetails.\nFIG. 2 shows.\n"
        );
        // The closing heading flips the toggle off before it is checked.
        assert_eq!(
            record.patent.brief_description_of_drawings,
            "Heading\nFIG. 1 shows.\nFIG. 2 shows.\n"
        );
    }

    #[test]
    fn test_extract_parties_and_links() {
        let record = extractor().extract(&sample()).unwrap();
        let id = record.patent.id;

        let inventors: Vec<&str> = record.inventors.iter().map(|i| i.full_name.as_str()).collect();
        assert_eq!(inventors, vec!["Ada Lovelace", "Charles Babbage"]);
        assert!(record.inventor_links.iter().all(|l| l.patent_id == id));

        assert_eq!(record.assignees, vec![Assignee { name: "Acme Corp".into() }]);
        assert_eq!(record.assignee_links[0].assignee_name, "Acme Corp");

        let jurisdictions: Vec<&str> = record.jurisdictions.iter().map(|j| j.name.as_str()).collect();
        assert_eq!(jurisdictions, vec!["US", "EP"]);
        assert_eq!(record.jurisdiction_links.len(), 2);
    }

    #[test]
    fn test_extract_claims() {
        let record = extractor().extract(&sample()).unwrap();
        assert_eq!(record.claims.len(), 1);
        assert_eq!(record.claims[0].patent_id, record.patent.id);
        assert_eq!(record.claims[0].independent_claim, " A widget. ");
        assert_eq!(record.patent.first_claim, " A widget. ");
        assert_eq!(record.patent.total_number_of_claims, 2);
        assert_eq!(record.patent.total_number_of_independent_claims, 1);
    }

    #[test]
    fn test_extract_empty_object_defaults() {
        let record = extractor().extract(&json!({})).unwrap();
        assert_eq!(record.patent.title, "");
        assert!(record.patent.earliest_priority_date.is_none());
        assert!(record.inventors.is_empty());
        assert!(record.claims.is_empty());
        assert_eq!(record.patent.file_url, "https://provider.test/patents/pdf/");
    }

    #[test]
    fn test_extract_mistyped_fields_default() {
        let item = json!({
            "documentNumber": 42,
            "inventors": "nobody",
            "minPriorityDate": "not a date",
            "backwardCitations": {"a": 1},
            "publicationReference": "US"
        });
        let record = extractor().extract(&item).unwrap();
        assert_eq!(record.patent.publication_number, "");
        assert!(record.inventors.is_empty());
        assert!(record.patent.earliest_priority_date.is_none());
        assert_eq!(record.patent.count_of_cited_by_patents, 0);
        assert_eq!(record.patent.authority, "");
    }

    #[test]
    fn test_extract_non_object_fails() {
        let result = extractor().extract(&json!("patent"));
        assert!(matches!(result, Err(Error::MalformedResponse(_))));
    }

    #[test]
    fn test_extract_ids_are_unique() {
        let a = extractor().extract(&sample()).unwrap();
        let b = extractor().extract(&sample()).unwrap();
        assert_ne!(a.patent.id, b.patent.id);
    }

    #[test]
    fn test_extract_page() {
        let page = RawPage::new(
            json!({"response": {"items": [sample(), {"documentNumber": "EP1"}]}}).to_string(),
        );
        let records = extractor().extract_page(page).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].patent.publication_number, "EP1");
    }

    #[test]
    fn test_extract_page_with_bad_item_fails() {
        let page = RawPage::new(json!({"response": {"items": [sample(), 7]}}).to_string());
        assert!(matches!(
            extractor().extract_page(page),
            Err(Error::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_summarize() {
        let summary = extractor().summarize(&sample()).unwrap();
        assert_eq!(summary.title, "Widget");
        assert_eq!(summary.publication_number, "US1234567B2");
        assert_eq!(summary.inventors_names, vec!["Ada Lovelace", "Charles Babbage"]);
        assert_eq!(summary.assignee, vec!["Acme Corp"]);
        assert_eq!(summary.simple_family_jurisdiction, vec!["US", "EP"]);
        assert_eq!(summary.simple_legal_status.as_deref(), Some("Active"));
        assert_eq!(summary.application_date, NaiveDate::from_ymd_opt(2019, 3, 1));
    }

    #[test]
    fn test_summarize_assignee_fallback() {
        let owners = json!({"currentOwners": [{"partyName": "Owner"}], "assignees": [{"partyName": "X"}]});
        assert_eq!(extractor().summarize(&owners).unwrap().assignee, vec!["Owner"]);

        let last = json!({"assignees": [{"partyName": "Original"}]});
        assert_eq!(extractor().summarize(&last).unwrap().assignee, vec!["Original"]);

        let none = json!({});
        let summary = extractor().summarize(&none).unwrap();
        assert!(summary.assignee.is_empty());
        assert!(summary.simple_legal_status.is_none());
    }
}
