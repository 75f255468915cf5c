// src/services/credential_issuer.rs
//! Credential Issuer Service
//!
//! Maps checked DDCC data into an unsigned vaccination credential. The
//! credential schema generation (v1 or v2) is fixed at construction from
//! configuration; everything else comes from the DDCC core data set and the
//! QR attachment of the bundle.

use crate::models::code_lists::{disease_name, medicinal_product_name};
use crate::models::credential::{
    to_json_date, CredentialGeneration, DdccCredential, ImageObject, VaccinationEvent, Vaccine, VaccineRecipient,
    Validity, VACCINATION_CONTEXT,
};
use crate::models::ddcc::{DdccInput, QrAttachment};
use chrono::{DateTime, NaiveDate, Utc};
use log::info;
use uuid::Uuid;

pub const VERIFIABLE_CREDENTIAL_TYPE: &str = "VerifiableCredential";
pub const VACCINATION_CERTIFICATE_TYPE: &str = "VaccinationCertificate";
const QR_CODE_NAME: &str = "QRCode";
const DEFAULT_QR_DESCRIPTION: &str = "QR code containing the DDCCCoreDatSet plus signature";

/// Builds unsigned DDCC credentials.
#[derive(Debug, Clone, Copy)]
pub struct CredentialAssembler {
    generation: CredentialGeneration,
}

impl CredentialAssembler {
    /// Creates an assembler for the given credential schema generation.
    pub fn new(generation: CredentialGeneration) -> Self {
        Self { generation }
    }

    /// Assembles a credential from checked DDCC data.
    ///
    /// # Arguments
    /// * `input` - Issuer, receiver and the checked DDCC data
    /// * `attachment` - QR image attachment of the bundle
    /// * `qr_description` - Description of the document reference
    ///
    /// # Returns
    /// An unsigned credential with a fresh `urn:uuid` id
    pub fn assemble(&self, input: &DdccInput, attachment: &QrAttachment, qr_description: &str) -> DdccCredential {
        let data = &input.ddcc_data;
        let vaccination = &data.vaccination;

        let start = match data.period_start.as_deref() {
            Some(start) => parse_date(start).unwrap_or_else(|| {
                info!("invalid certificate start date, defaulting to current date");
                Utc::now()
            }),
            None => Utc::now(),
        };
        let end = data.period_end.as_deref().and_then(|end| {
            let parsed = parse_date(end);
            if parsed.is_none() {
                info!("invalid certificate end date, leaving it blank");
            }
            parsed
        });

        let credential_subject = VaccinationEvent {
            type_: "VaccinationEvent".into(),
            batch_number: vaccination.lot.clone(),
            country_of_vaccination: vaccination.country_code.clone(),
            date_of_vaccination: vaccination.date.clone(),
            administering_centre: vaccination.centre.clone(),
            // validFrom takes precedence over nextDose
            next_vaccination_date: vaccination.valid_from.clone().or_else(|| vaccination.next_dose.clone()),
            total_doses: vaccination.total_doses.clone(),
            health_professional: vaccination.practitioner.clone(),
            order: vaccination.dose.clone(),
            recipient: VaccineRecipient {
                type_: "VaccineRecipient".into(),
                id: input.receiver_did.clone(),
                name: data.name.clone(),
                birth_date: data.birth_date.clone().unwrap_or_default(),
                identifier: data.identifier.clone(),
                gender: data.sex.clone().unwrap_or_default(),
            },
            vaccine: Vaccine {
                type_: "Vaccine".into(),
                atc_code: vaccination.vaccine_code.clone(),
                medicinal_product_name: medicinal_product_name(&vaccination.brand_code),
                marketing_authorization_holder: vaccination.maholder_code.clone(),
                disease: vaccination.disease_code.as_deref().map(disease_name),
            },
            image: ImageObject {
                type_: "ImageObject".into(),
                name: QR_CODE_NAME.into(),
                alternate_name: QR_CODE_NAME.into(),
                description: if qr_description.is_empty() {
                    DEFAULT_QR_DESCRIPTION.into()
                } else {
                    qr_description.to_string()
                },
                encoding_format: attachment.content_type.clone(),
                content_url: attachment.data.clone(),
            },
        };

        DdccCredential {
            context: vec![
                self.generation.base_context().to_string(),
                VACCINATION_CONTEXT.to_string(),
            ],
            id: format!("urn:uuid:{}", Uuid::new_v4()),
            type_: vec![
                VERIFIABLE_CREDENTIAL_TYPE.to_string(),
                VACCINATION_CERTIFICATE_TYPE.to_string(),
            ],
            issuer: input.issuer_did.clone(),
            name: data.certificate_issuer.clone().unwrap_or_default(),
            identifier: data.hcid.clone().unwrap_or_default(),
            validity: Validity::new(self.generation, to_json_date(start), end.map(to_json_date)),
            credential_subject,
        }
    }
}

/// Parses RFC 3339 timestamps and plain `YYYY-MM-DD` dates.
fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Some(timestamp.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
