//! Claim hierarchy resolution.
//!
//! The provider delivers claims as a flat list of `claimsXml` fragments. A
//! claim id can appear more than once (long claims are split), and dependent
//! claims point at either an independent claim or another dependent claim.
//! Resolution folds every fragment into the independent claim it ultimately
//! depends on.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value as JsonValue;
use tracing::trace;
use uuid::Uuid;

use patent_core::Claim;

use super::fields::{objects, strip_html, text, Object};

static CLAIM_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{1,2}$").expect("static pattern"));

/// Resolved claims of one patent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClaimSet {
    /// One entry per independent claim, in first-seen order.
    pub claims: Vec<Claim>,
    /// Distinct claim ids that were placed in the hierarchy.
    pub total: usize,
}

impl ClaimSet {
    pub fn first_claim(&self) -> &str {
        self.claims
            .first()
            .map(|claim| claim.independent_claim.as_str())
            .unwrap_or("")
    }

    pub fn independent_count(&self) -> usize {
        self.claims.len()
    }
}

struct Entry {
    number: i32,
    parts: Vec<String>,
    dependents: Vec<String>,
}

#[derive(Default)]
struct Hierarchy {
    entries: Vec<Entry>,
    /// Independent claim id -> entry.
    independent: HashMap<String, usize>,
    /// Dependent claim id -> entry it resolved to.
    owner: HashMap<String, usize>,
    /// Dependent claim ids whose reference never resolved.
    dropped: HashSet<String>,
}

impl Hierarchy {
    fn resolve(&self, reference: Option<&str>) -> Option<usize> {
        let reference = reference?;
        self.independent
            .get(reference)
            .or_else(|| self.owner.get(reference))
            .copied()
    }

    fn add(&mut self, fragment: &Object) {
        let Some(xml) = fragment.get("xmlText").and_then(JsonValue::as_str) else {
            return;
        };
        let body = strip_html(xml);
        let id = text(fragment, "claimId");
        let reference = first_reference(fragment);

        if let Some(&index) = self.independent.get(id) {
            self.entries[index].parts.push(body);
            return;
        }

        if let Some(&index) = self.owner.get(id) {
            // Continuation of a dependent claim; a reference on the fragment
            // wins over the owner recorded for the id.
            let index = self.resolve(reference).unwrap_or(index);
            self.entries[index].dependents.push(body);
            return;
        }

        // Continuation of a dropped claim, unless it now names a known claim.
        if self.dropped.contains(id) && self.resolve(reference).is_none() {
            trace!(claim_id = id, "Dropping continuation of unresolved claim");
            return;
        }

        if is_dependent(fragment, reference.is_some()) {
            match self.resolve(reference) {
                Some(index) => {
                    self.entries[index].dependents.push(body);
                    self.owner.insert(id.to_string(), index);
                }
                None => {
                    trace!(claim_id = id, ?reference, "Dropping unresolved dependent claim");
                    self.dropped.insert(id.to_string());
                }
            }
        } else {
            self.independent.insert(id.to_string(), self.entries.len());
            self.entries.push(Entry {
                number: claim_number(id),
                parts: vec![body],
                dependents: Vec::new(),
            });
        }
    }

    fn finish(self, patent_id: Uuid) -> ClaimSet {
        let total = self.independent.len() + self.owner.len();
        let claims = self
            .entries
            .into_iter()
            .map(|entry| Claim {
                patent_id,
                claim_number: entry.number,
                independent_claim: entry.parts.join("\n"),
                dependent_claims: entry.dependents,
            })
            .collect();
        ClaimSet { claims, total }
    }
}

/// Fold the `claimsXml` fragments of `item` into independent claims.
pub fn resolve_claims(item: &Object, patent_id: Uuid) -> ClaimSet {
    let mut hierarchy = Hierarchy::default();
    for fragment in objects(item, "claimsXml") {
        hierarchy.add(fragment);
    }
    hierarchy.finish(patent_id)
}

/// Trailing one or two digits of a claim id, 0 when there are none.
pub fn claim_number(claim_id: &str) -> i32 {
    CLAIM_NUMBER
        .find(claim_id)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

fn first_reference(fragment: &Object) -> Option<&str> {
    let reference = match fragment.get("claimReferences")? {
        JsonValue::String(reference) => Some(reference.as_str()),
        JsonValue::Array(references) => references.first().and_then(JsonValue::as_str),
        _ => None,
    };
    reference.filter(|reference| !reference.is_empty())
}

fn is_dependent(fragment: &Object, has_reference: bool) -> bool {
    fragment
        .get("isDependent")
        .and_then(JsonValue::as_bool)
        .unwrap_or(has_reference)
}
