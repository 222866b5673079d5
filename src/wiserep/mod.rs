//! Spectrum upload to WISeREP, cross-matched with TNS

use serde_json::Value;
use std::path::Path;
use tracing::{debug, info};

use crate::config::ReportTemplate;
use crate::fritz::SourceCatalog;
use crate::util::*;

pub mod client;
pub mod report;
pub mod spectrum;
pub mod tns;

pub use client::WiserepClient;
pub use report::Report;
pub use spectrum::Spectrum;
pub use tns::TnsClient;

#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    /// Nothing registered on TNS at the source position, nothing was uploaded
    NoTnsMatch,
    Accepted {
        iau_name: String,
        report_id: String,
        feedback: Value,
    },
}

pub struct Upload<'a> {
    pub catalog: &'a dyn SourceCatalog,
    pub tns: &'a TnsClient,
    pub wiserep: &'a WiserepClient,
    pub template: &'a ReportTemplate,
}

impl Upload<'_> {
    pub async fn run(
        &self,
        ztf_id: &str,
        spectrum_path: &Path,
        quality: Quality,
    ) -> Result<UploadOutcome> {
        // Parse first so a broken file fails before anything is sent
        let spectrum = Spectrum::read(spectrum_path)?;
        let (blue, red) = spectrum.wavelength_range();
        debug!(
            "Read {} samples from {:.1} to {:.1} Å",
            spectrum.samples.len(),
            blue,
            red
        );

        let (ra, dec) = self.catalog.radec(ztf_id).await?;
        let iau_name = match self.tns.search(ra, dec).await? {
            Some(name) => name,
            None => {
                info!("{} is not on TNS, not uploading", ztf_id);
                return Ok(UploadOutcome::NoTnsMatch);
            }
        };

        let server_names = self
            .wiserep
            .upload_files(&[spectrum_path.to_path_buf()])
            .await?;
        let server_name = server_names.first().ok_or(Error::MissingField {
            service: "WISeREP",
            field: "data",
        })?;

        let metadata = spectrum.metadata(Some(server_name))?;
        let report = Report::new(self.template, &metadata, &iau_name, ra, dec, quality)?;
        let report_id = self.wiserep.send_report(&report).await?;
        let feedback = self.wiserep.await_reply(&report_id).await?;

        info!("{} uploaded as {} (report {})", ztf_id, iau_name, report_id);
        Ok(UploadOutcome::Accepted {
            iau_name,
            report_id,
            feedback,
        })
    }
}
