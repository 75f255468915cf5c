// src/models/ddcc.rs
//! DDCC inbound data: the FHIR-like bundle carrying a `DocumentReference`
//! and the DDCC core data set it embeds.
//!
//! Wire types keep every field optional so that missing data is reported
//! with a domain message rather than a serde error. [`DdccCoreData::validate`]
//! turns the wire form into the checked [`DdccData`] used for assembly.

use crate::errors::{VcError, VcResult};
use crate::models::credential::ProofSuite;
use crate::utils::serialization::decode_base64_any;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub const DOCUMENT_REFERENCE: &str = "DocumentReference";
pub const QR_IMAGE_CONTENT_TYPE: &str = "image/png";
pub const CORE_DATA_SET_CONTENT_TYPE: &str = "application/json";

/// Body of the DDCC to VC request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DdccToVcRequest {
    pub bundle: Bundle,
    pub issuer_did: String,
    pub receiver_did: String,
    /// Overrides the configured proof suite for this request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof_suite: Option<ProofSuite>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bundle {
    pub entry: Vec<Entry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_url: Option<String>,
    pub resource: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentReference {
    pub resource_type: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub content: Vec<Content>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub attachment: Option<Attachment>,
    #[serde(default)]
    pub format: Option<Format>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Format {
    #[serde(default)]
    pub system: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

/// A checked attachment: both fields present and non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrAttachment {
    pub content_type: String,
    pub data: String,
}

impl Bundle {
    /// The first `DocumentReference` resource of the bundle.
    pub fn document_reference(&self) -> VcResult<DocumentReference> {
        let resource = self
            .entry
            .iter()
            .map(|entry| &entry.resource)
            .find(|resource| resource.get("resourceType").and_then(Value::as_str) == Some(DOCUMENT_REFERENCE))
            .ok_or_else(|| VcError::Validation("Document reference not found in the incoming request".into()))?;
        serde_json::from_value(resource.clone())
            .map_err(|e| VcError::Validation(format!("The specified document reference is invalid: {}", e)))
    }
}

impl DocumentReference {
    fn content_of_type(&self, content_type: &str) -> Option<&Content> {
        self.content.iter().find(|content| {
            content
                .attachment
                .as_ref()
                .and_then(|a| a.content_type.as_deref())
                == Some(content_type)
        })
    }

    /// The QR image content.
    pub fn qr_image(&self) -> VcResult<QrAttachment> {
        let content = self
            .content_of_type(QR_IMAGE_CONTENT_TYPE)
            .ok_or_else(|| VcError::Validation("No image with contentType \"image/png\" was found".into()))?;
        content.validate()
    }

    /// The base64 encoded DDCC core data set content.
    pub fn core_data_set(&self) -> VcResult<QrAttachment> {
        let content = self
            .content_of_type(CORE_DATA_SET_CONTENT_TYPE)
            .ok_or_else(|| VcError::Validation("No ddcCoredataSet was found".into()))?;
        content.validate()
    }

    /// The description used for the QR image, which must be present.
    pub fn checked_description(&self) -> VcResult<&str> {
        if self.content.is_empty() {
            return Err(VcError::Validation(
                "The specified document reference is invalid: \"content\" was not found inside Document reference"
                    .into(),
            ));
        }
        self.description.as_deref().ok_or_else(|| {
            VcError::Validation("The specified document reference is invalid: description must be a string".into())
        })
    }
}

impl Content {
    fn validate(&self) -> VcResult<QrAttachment> {
        let attachment = self
            .attachment
            .as_ref()
            .ok_or_else(|| VcError::Validation("The specified content attribute is invalid: missing attachment".into()))?;
        let content_type = non_empty(attachment.content_type.as_deref()).ok_or_else(|| {
            VcError::Validation("The specified attachment attribute is invalid: contentType must be a string".into())
        })?;
        let data = non_empty(attachment.data.as_deref()).ok_or_else(|| {
            VcError::Validation("The specified attachment attribute is invalid: data must be a string".into())
        })?;
        let format = self
            .format
            .as_ref()
            .ok_or_else(|| VcError::Validation("The specified content attribute is invalid: missing format".into()))?;
        if format.system.is_none() || format.code.is_none() {
            return Err(VcError::Validation(
                "The specified content attribute is invalid: format requires system and code".into(),
            ));
        }
        Ok(QrAttachment {
            content_type: content_type.to_string(),
            data: data.to_string(),
        })
    }
}

impl QrAttachment {
    /// Decodes the attachment as a base64 encoded DDCC core data set.
    pub fn decode_core_data(&self) -> VcResult<DdccCoreData> {
        let bytes = decode_base64_any(&self.data)
            .map_err(|_| VcError::Validation("The specified ddcCoredataSet could not be parsed".into()))?;
        serde_json::from_slice(&bytes)
            .map_err(|_| VcError::Validation("The specified ddcCoredataSet could not be parsed".into()))
    }
}

/// A number or a string; DDCC producers emit doses either way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumberOrText {
    Number(serde_json::Number),
    Text(String),
}

impl fmt::Display for NumberOrText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumberOrText::Number(n) => write!(f, "{}", n),
            NumberOrText::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Identifier {
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodeSystem {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub system: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Period {
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CertificateIssuer {
    #[serde(default)]
    pub identifier: Option<Identifier>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Certificate {
    #[serde(default)]
    pub period: Option<Period>,
    #[serde(default)]
    pub hcid: Option<Identifier>,
    #[serde(default)]
    pub issuer: Option<CertificateIssuer>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vaccination {
    #[serde(default)]
    pub vaccine: Option<CodeSystem>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub dose: Option<NumberOrText>,
    #[serde(default)]
    pub country: Option<CodeSystem>,
    #[serde(default)]
    pub centre: Option<String>,
    #[serde(default)]
    pub next_dose: Option<String>,
    #[serde(default)]
    pub brand: Option<CodeSystem>,
    #[serde(default)]
    pub lot: Option<String>,
    #[serde(default)]
    pub maholder: Option<CodeSystem>,
    #[serde(default)]
    pub disease: Option<CodeSystem>,
    #[serde(default)]
    pub total_doses: Option<NumberOrText>,
    #[serde(default)]
    pub valid_from: Option<String>,
    #[serde(default)]
    pub practitioner: Option<Identifier>,
}

/// The DDCC core data set as decoded from the bundle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DdccCoreData {
    #[serde(default)]
    pub certificate: Option<Certificate>,
    #[serde(default)]
    pub vaccination: Option<Vaccination>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub birth_date: Option<String>,
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default)]
    pub sex: Option<String>,
}

/// Vaccination facts after validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaccinationFacts {
    pub vaccine_code: String,
    pub country_code: String,
    pub brand_code: String,
    pub date: String,
    pub dose: String,
    pub lot: String,
    pub centre: Option<String>,
    pub next_dose: Option<String>,
    pub maholder_code: Option<String>,
    pub disease_code: Option<String>,
    pub total_doses: Option<String>,
    pub valid_from: Option<String>,
    pub practitioner: Option<String>,
}

/// Checked DDCC data ready for credential assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DdccData {
    pub vaccination: VaccinationFacts,
    pub name: String,
    pub birth_date: Option<String>,
    pub identifier: Option<String>,
    pub sex: Option<String>,
    pub certificate_issuer: Option<String>,
    pub hcid: Option<String>,
    pub period_start: Option<String>,
    pub period_end: Option<String>,
}

/// Issuer, receiver and their checked DDCC data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DdccInput {
    pub issuer_did: String,
    pub receiver_did: String,
    pub ddcc_data: DdccData,
}

impl DdccCoreData {
    /// Checks the required vaccination facts and code systems.
    ///
    /// # Errors
    /// `VcError::Validation` naming the first missing or empty attribute.
    pub fn validate(self) -> VcResult<DdccData> {
        let vaccination = self
            .vaccination
            .ok_or_else(|| VcError::Validation("No vaccination attribute was found".into()))?;
        let country_code = required_code(vaccination.country.as_ref(), "No country attribute was found")?;
        let vaccine_code = required_code(vaccination.vaccine.as_ref(), "No vaccine attribute was found")?;
        let brand_code = required_code(vaccination.brand.as_ref(), "No brand attribute was found")?;
        let maholder_code = optional_code(vaccination.maholder.as_ref(), "maholder")?;
        let disease_code = optional_code(vaccination.disease.as_ref(), "disease")?;
        let practitioner = match &vaccination.practitioner {
            Some(identifier) => Some(
                non_empty(identifier.value.as_deref())
                    .ok_or_else(|| VcError::Validation("practitioner value must be a non-empty string".into()))?
                    .to_string(),
            ),
            None => None,
        };
        let dose = vaccination
            .dose
            .as_ref()
            .map(ToString::to_string)
            .ok_or_else(|| VcError::Validation("No dose attribute was found".into()))?;
        let name = self
            .name
            .ok_or_else(|| VcError::Validation("name must be a string".into()))?;

        let certificate = self.certificate.unwrap_or_default();
        let period = certificate.period.unwrap_or_default();

        Ok(DdccData {
            vaccination: VaccinationFacts {
                vaccine_code,
                country_code,
                brand_code,
                date: vaccination.date.unwrap_or_default(),
                dose,
                lot: vaccination.lot.unwrap_or_default(),
                centre: vaccination.centre.filter(|c| !c.is_empty()),
                next_dose: vaccination.next_dose.filter(|d| !d.is_empty()),
                maholder_code,
                disease_code,
                total_doses: vaccination.total_doses.map(|t| t.to_string()),
                valid_from: vaccination.valid_from.filter(|v| !v.is_empty()),
                practitioner,
            },
            name,
            birth_date: self.birth_date.filter(|b| !b.is_empty()),
            identifier: self.identifier.filter(|i| !i.is_empty()),
            sex: self.sex.filter(|s| !s.is_empty()),
            certificate_issuer: certificate
                .issuer
                .and_then(|issuer| issuer.identifier)
                .and_then(|identifier| identifier.value)
                .filter(|v| !v.is_empty()),
            hcid: certificate.hcid.and_then(|hcid| hcid.value).filter(|v| !v.is_empty()),
            period_start: period.start,
            period_end: period.end,
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn required_code(code_system: Option<&CodeSystem>, missing: &str) -> VcResult<String> {
    let code_system = code_system.ok_or_else(|| VcError::Validation(missing.to_string()))?;
    non_empty(code_system.code.as_deref())
        .map(str::to_string)
        .ok_or_else(|| VcError::Validation(format!("{}: code must be a non-empty string", missing)))
}

fn optional_code(code_system: Option<&CodeSystem>, attribute: &str) -> VcResult<Option<String>> {
    match code_system {
        Some(code_system) => non_empty(code_system.code.as_deref())
            .map(|code| Some(code.to_string()))
            .ok_or_else(|| VcError::Validation(format!("{} code must be a non-empty string", attribute))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_core_data, sample_request};
    use serde_json::json;

    #[test]
    fn test_bundle_yields_qr_and_core_data() {
        let request = sample_request("did:lac1:issuer", "did:lac1:receiver");
        let reference = request.bundle.document_reference().unwrap();
        let image = reference.qr_image().unwrap();
        assert_eq!(image.content_type, "image/png");
        let core = reference.core_data_set().unwrap().decode_core_data().unwrap();
        assert_eq!(core.name.as_deref(), Some("Eddie Murphy"));
        assert_eq!(reference.checked_description().unwrap(), "WHO QR code for COVID 19 Vaccine Certificate");
    }

    #[test]
    fn test_missing_document_reference() {
        let bundle: Bundle = serde_json::from_value(json!({
            "entry": [{"resource": {"resourceType": "Patient"}}]
        }))
        .unwrap();
        let err = bundle.document_reference().unwrap_err();
        assert_eq!(err.to_string(), "Document reference not found in the incoming request");
    }

    #[test]
    fn test_missing_png_content() {
        let bundle: Bundle = serde_json::from_value(json!({
            "entry": [{"resource": {
                "resourceType": "DocumentReference",
                "description": "qr",
                "content": [{
                    "attachment": {"contentType": "application/json", "data": "e30="},
                    "format": {"system": "s", "code": "serialized"}
                }]
            }}]
        }))
        .unwrap();
        let reference = bundle.document_reference().unwrap();
        assert!(matches!(reference.qr_image(), Err(VcError::Validation(m)) if m.contains("image/png")));
        assert!(reference.core_data_set().is_ok());
    }

    #[test]
    fn test_empty_attachment_data_rejected() {
        let content: Content = serde_json::from_value(json!({
            "attachment": {"contentType": "image/png", "data": ""},
            "format": {"system": "s", "code": "image"}
        }))
        .unwrap();
        assert!(content.validate().is_err());
    }

    #[test]
    fn test_unparseable_core_data() {
        let attachment = QrAttachment {
            content_type: "application/json".into(),
            data: base64::encode("not json"),
        };
        let err = attachment.decode_core_data().unwrap_err();
        assert_eq!(err.to_string(), "The specified ddcCoredataSet could not be parsed");
    }

    #[test]
    fn test_validate_requires_vaccination_facts() {
        let mut core = sample_core_data();
        core.vaccination.as_mut().unwrap().brand = None;
        assert_eq!(core.validate().unwrap_err().to_string(), "No brand attribute was found");

        let mut core = sample_core_data();
        core.vaccination.as_mut().unwrap().country = Some(CodeSystem { code: Some("".into()), system: None });
        assert!(core.validate().is_err());

        let mut core = sample_core_data();
        core.vaccination = None;
        assert_eq!(core.validate().unwrap_err().to_string(), "No vaccination attribute was found");
    }

    #[test]
    fn test_validate_keeps_numeric_dose() {
        let data = sample_core_data().validate().unwrap();
        assert_eq!(data.vaccination.dose, "1");
        assert_eq!(data.vaccination.brand_code, "XM8NQ0");
        assert_eq!(data.hcid.as_deref(), Some("123456789"));
    }
}
