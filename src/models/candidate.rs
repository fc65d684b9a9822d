use crate::store::{StoreError, StoredDocument};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CandidateStatus {
    Backlog,
    Approved,
    Rejected,
}

impl CandidateStatus {
    pub const ALL: [CandidateStatus; 3] = [
        CandidateStatus::Backlog,
        CandidateStatus::Approved,
        CandidateStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateStatus::Backlog => "Backlog",
            CandidateStatus::Approved => "Approved",
            CandidateStatus::Rejected => "Rejected",
        }
    }
}

impl fmt::Display for CandidateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CandidateStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CandidateStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown candidate status: {}", s))
    }
}

/// The five identity and address documents every submission must carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DocumentKey {
    IdCard,
    TaxId,
    IdFront,
    IdBack,
    AddressProof,
}

impl DocumentKey {
    pub const ALL: [DocumentKey; 5] = [
        DocumentKey::IdCard,
        DocumentKey::TaxId,
        DocumentKey::IdFront,
        DocumentKey::IdBack,
        DocumentKey::AddressProof,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKey::IdCard => "idCard",
            DocumentKey::TaxId => "taxId",
            DocumentKey::IdFront => "idFront",
            DocumentKey::IdBack => "idBack",
            DocumentKey::AddressProof => "addressProof",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DocumentKey::IdCard => "ID card",
            DocumentKey::TaxId => "Tax ID",
            DocumentKey::IdFront => "ID front",
            DocumentKey::IdBack => "ID back",
            DocumentKey::AddressProof => "Proof of address",
        }
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DocumentKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| format!("Unknown document: {}", s))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentUrls {
    pub id_card_url: String,
    pub tax_id_url: String,
    pub id_front_url: String,
    pub id_back_url: String,
    pub address_proof_url: String,
}

impl DocumentUrls {
    pub fn get(&self, key: DocumentKey) -> &str {
        match key {
            DocumentKey::IdCard => &self.id_card_url,
            DocumentKey::TaxId => &self.tax_id_url,
            DocumentKey::IdFront => &self.id_front_url,
            DocumentKey::IdBack => &self.id_back_url,
            DocumentKey::AddressProof => &self.address_proof_url,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (DocumentKey, &str)> + '_ {
        DocumentKey::ALL.into_iter().map(move |key| (key, self.get(key)))
    }

    /// Builds the set from uploaded `(key, url)` pairs; `None` unless all five are present.
    pub fn from_pairs<I>(pairs: I) -> Option<Self>
    where
        I: IntoIterator<Item = (DocumentKey, String)>,
    {
        let mut slots: [Option<String>; 5] = Default::default();
        for (key, url) in pairs {
            let idx = DocumentKey::ALL.iter().position(|k| *k == key)?;
            slots[idx] = Some(url);
        }
        let [id_card, tax_id, id_front, id_back, address_proof] = slots;
        Some(Self {
            id_card_url: id_card?,
            tax_id_url: tax_id?,
            id_front_url: id_front?,
            id_back_url: id_back?,
            address_proof_url: address_proof?,
        })
    }
}

/// The persisted body of a candidate; id and timestamps live in store metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateRecord {
    pub name: String,
    pub age: u8,
    pub phone: String,
    pub national_id: String,
    #[serde(flatten)]
    pub documents: DocumentUrls,
    pub status: CandidateStatus,
}

impl CandidateRecord {
    pub fn to_body(&self) -> Result<Map<String, JsonValue>, StoreError> {
        match serde_json::to_value(self)? {
            JsonValue::Object(map) => Ok(map),
            _ => Ok(Map::new()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub id: Uuid,
    #[serde(flatten)]
    pub record: CandidateRecord,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Candidate {
    pub fn from_document(doc: StoredDocument) -> Result<Self, StoreError> {
        let id = Uuid::parse_str(&doc.id).map_err(|e| {
            StoreError::Malformed(serde::de::Error::custom(format!(
                "candidate id {}: {}",
                doc.id, e
            )))
        })?;
        let record: CandidateRecord = serde_json::from_value(JsonValue::Object(doc.data))?;
        Ok(Self {
            id,
            record,
            version: doc.version,
            created_at: doc.created_at,
            updated_at: doc.updated_at,
        })
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }

    pub fn status(&self) -> CandidateStatus {
        self.record.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn urls() -> DocumentUrls {
        DocumentUrls::from_pairs(
            DocumentKey::ALL
                .into_iter()
                .map(|k| (k, format!("memory://candidates/1/{k}.jpeg"))),
        )
        .unwrap()
    }

    #[test]
    fn record_uses_wire_field_names() {
        let record = CandidateRecord {
            name: "Maria Silva".into(),
            age: 29,
            phone: "(11) 98888-7777".into(),
            national_id: "111.444.777-35".into(),
            documents: urls(),
            status: CandidateStatus::Backlog,
        };
        let body = record.to_body().unwrap();
        assert_eq!(body["nationalId"], json!("111.444.777-35"));
        assert_eq!(body["idCardUrl"], json!("memory://candidates/1/idCard.jpeg"));
        assert_eq!(body["addressProofUrl"], json!("memory://candidates/1/addressProof.jpeg"));
        assert_eq!(body["status"], json!("Backlog"));
    }

    #[test]
    fn document_urls_require_all_five() {
        let partial = DocumentUrls::from_pairs(vec![(DocumentKey::IdCard, "u".to_string())]);
        assert!(partial.is_none());
        assert_eq!(urls().iter().count(), 5);
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("approved".parse::<CandidateStatus>(), Ok(CandidateStatus::Approved));
        assert!("hired".parse::<CandidateStatus>().is_err());
    }
}
