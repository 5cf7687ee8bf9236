//! Serialized prediction record (Common Data Model v2).
//!
//! Caller metadata from the footer is copied verbatim into
//! `record_metadata`; nothing in it is validated or interpreted.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::predictor::PredictionResult;
use crate::config;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Caller-supplied identifiers for the note being classified. Missing keys
/// serialize as `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Footer {
    pub provider_id: Value,
    pub person_id: Value,
    pub visit_detail_id: Value,
    pub note_id: Value,
    pub note_type_concept_id: Value,
    pub note_datetime: Value,
    pub note_title: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NlpRecord {
    pub nlp_output: NlpOutput,
    pub nlp_service_info: ServiceInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NlpOutput {
    pub record_metadata: RecordMetadata,
    /// Published key name; kept as-is for downstream consumers.
    #[serde(rename = "syntomatic_probability")]
    pub probability: f32,
    pub attention_weights: Vec<f32>,
    pub processing_success: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub clinical_site_id: Value,
    pub patient_id: Value,
    pub admission_id: Value,
    pub record_id: Value,
    pub record_type: Value,
    pub record_format: String,
    pub record_creation_date: Value,
    pub record_lastupdate_date: String,
    pub record_character_encoding: String,
    pub record_extraction_date: String,
    pub report_section: Value,
    pub report_language: String,
    pub deidentified: String,
    pub deidentification_pipeline_name: String,
    pub deidentification_pipeline_version: String,
    pub case: Vec<String>,
    pub nlp_processing_date: String,
    pub nlp_processing_pipeline_name: String,
    pub nlp_processing_pipeline_version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub service_app_name: String,
    pub service_language: String,
    pub service_version: String,
    pub service_model: String,
}

/// Build a record stamped with the current local time.
pub fn build_record(model_name: &str, case: &[String], result: &PredictionResult, footer: &Footer) -> NlpRecord {
    build_record_at(chrono::Local::now().naive_local(), model_name, case, result, footer)
}

pub fn build_record_at(
    now: NaiveDateTime,
    model_name: &str,
    case: &[String],
    result: &PredictionResult,
    footer: &Footer,
) -> NlpRecord {
    let stamp = now.format(TIMESTAMP_FORMAT).to_string();
    let footer = footer.clone();

    NlpRecord {
        nlp_output: NlpOutput {
            record_metadata: RecordMetadata {
                clinical_site_id: footer.provider_id,
                patient_id: footer.person_id,
                admission_id: footer.visit_detail_id,
                record_id: footer.note_id,
                record_type: footer.note_type_concept_id,
                record_format: "json".into(),
                record_creation_date: footer.note_datetime,
                record_lastupdate_date: stamp.clone(),
                record_character_encoding: "UTF-8".into(),
                record_extraction_date: stamp.clone(),
                report_section: footer.note_title,
                report_language: config::SERVICE_LANGUAGE.into(),
                deidentified: "no".into(),
                deidentification_pipeline_name: String::new(),
                deidentification_pipeline_version: String::new(),
                case: case.to_vec(),
                nlp_processing_date: stamp,
                nlp_processing_pipeline_name: model_name.into(),
                nlp_processing_pipeline_version: config::SERVICE_VERSION.into(),
            },
            probability: result.probability,
            attention_weights: result.attention_weights.clone(),
            processing_success: true,
        },
        nlp_service_info: ServiceInfo {
            service_app_name: config::SERVICE_APP_NAME.into(),
            service_language: config::SERVICE_LANGUAGE.into(),
            service_version: config::SERVICE_VERSION.into(),
            service_model: model_name.into(),
        },
    }
}
