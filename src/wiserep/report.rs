use serde::Serialize;
use serde_json::{Map, Value};

use super::spectrum::SpectrumMetadata;
use crate::config::ReportTemplate;
use crate::util::*;

/// Bulk report announcing one spectrum of one object
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    objects: Vec<ReportObject>,
}

#[derive(Debug, Clone, Serialize)]
struct ReportObject {
    iau_name: String,
    ra: Degrees,
    decl: Degrees,
    spectra: Spectra,
}

#[derive(Debug, Clone, Serialize)]
struct Spectra {
    spectra_group: Vec<Map<String, Value>>,
}

fn as_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

impl Report {
    /// Template fields first, overridden by whatever the spectrum provides
    pub fn new(
        template: &ReportTemplate,
        metadata: &SpectrumMetadata,
        iau_name: &str,
        ra: Degrees,
        dec: Degrees,
        quality: Quality,
    ) -> Result<Self> {
        let mut entry = as_object(serde_json::to_value(template)?);

        if let Some(Value::String(observer)) = entry.remove("observer_default") {
            if !observer.is_empty() {
                entry.insert("observer".to_string(), Value::String(observer));
            }
        }
        entry.extend(as_object(serde_json::to_value(metadata)?));
        entry.insert(
            "qualityid".to_string(),
            Value::String(quality.report_id().to_string()),
        );

        Ok(Report {
            objects: vec![ReportObject {
                iau_name: iau_name.to_string(),
                ra,
                decl: dec,
                spectra: Spectra {
                    spectra_group: vec![entry],
                },
            }],
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
