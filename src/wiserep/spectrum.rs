use chrono::{DateTime, Local};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::util::*;

/// One row of a reduced spectrum
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Sample {
    pub wave: f64,
    pub flux: f64,
    pub flux_err: f64,
}

/// An ASCII spectrum: `#` comment lines with `KEY=VALUE` cards, then
/// whitespace separated `WAVE FLUX FLUX_ERR` rows
#[derive(Debug, Clone)]
pub struct Spectrum {
    pub path: PathBuf,
    pub header: Vec<(String, String)>,
    pub samples: Vec<Sample>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpectrumMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reducer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub obsdate: Option<String>,
    pub exptime: i64,
    pub ascii_file: String,
    pub reduction_date: String,
}

fn header_card(comment: &str) -> Option<(String, String)> {
    let (key, value) = comment.split_once('=')?;
    let value = value.split('=').next().unwrap_or_default().trim();
    Some((
        key.trim().to_string(),
        value.trim_matches('\'').trim().to_string(),
    ))
}

impl Spectrum {
    pub fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::parse(path, &text)
    }

    fn parse(path: &Path, text: &str) -> Result<Self> {
        let error = |line: usize, reason: String| Error::Spectrum {
            path: path.to_path_buf(),
            line,
            reason,
        };

        let mut header = Vec::new();
        let mut samples = Vec::new();

        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(comment) = line.strip_prefix('#') {
                header.extend(header_card(comment));
                continue;
            }

            let columns = line
                .split_whitespace()
                .map(str::parse::<f64>)
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| error(idx + 1, e.to_string()))?;
            match columns[..] {
                [wave, flux, flux_err] => samples.push(Sample {
                    wave,
                    flux,
                    flux_err,
                }),
                _ => {
                    return Err(error(
                        idx + 1,
                        format!("expected 3 columns, found {}", columns.len()),
                    ))
                }
            }
        }

        if samples.is_empty() {
            return Err(error(0, "no data rows".to_string()));
        }

        Ok(Spectrum {
            path: path.to_path_buf(),
            header,
            samples,
        })
    }

    /// Shortest and longest wavelength
    pub fn wavelength_range(&self) -> (f64, f64) {
        self.samples
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| {
                (lo.min(s.wave), hi.max(s.wave))
            })
    }

    /// The last card with one of `keys`
    pub fn header_value(&self, keys: &[&str]) -> Option<&str> {
        self.header
            .iter()
            .rev()
            .find(|(key, _)| keys.contains(&key.as_str()))
            .map(|(_, value)| value.as_str())
    }

    fn header_number(&self, key: &'static str) -> Result<Option<f64>> {
        self.header_value(&[key])
            .map(|value| {
                value
                    .parse::<f64>()
                    .map_err(|_| Error::malformed(key, value))
            })
            .transpose()
    }

    /// Report fields derived from the header and the file itself.
    /// `server_filename` is the name the file was stored under by WISeREP
    pub fn metadata(&self, server_filename: Option<&str>) -> Result<SpectrumMetadata> {
        let ncombine = self.header_number("NCOMBINE")?.unwrap_or(1.) as i64;
        let exptime = self.header_number("EXPTIME")?.unwrap_or(0.).trunc() as i64;

        let total_exptime = ncombine
            .checked_mul(exptime)
            .ok_or_else(|| Error::malformed("EXPTIME", format!("{} x {}", ncombine, exptime)))?;

        let modified: DateTime<Local> = fs::metadata(&self.path)?.modified()?.into();

        Ok(SpectrumMetadata {
            observer: self
                .header_value(&["OBSERVER", "HOME_OBSERVER"])
                .map(str::to_string),
            reducer: self.header_value(&["REDUCER"]).map(str::to_string),
            obsdate: self
                .header_value(&["DATE-OBS"])
                .map(|date| date.replace('T', " ")),
            exptime: total_exptime,
            ascii_file: server_filename
                .map(str::to_string)
                .unwrap_or_else(|| self.path.display().to_string()),
            reduction_date: modified.format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SPECTRUM: &str = "\
# OBJECT=ZTF23aaawbsc
# HOME_OBSERVER=Someone
# OBSERVER=Jane Doe
# REDUCER=John Roe
# DATE-OBS=2023-09-11T03:12:45.5
# EXPTIME=600.7
# NCOMBINE=3
# a free text comment
3850.0 1.2e-16 3.0e-18
3852.5 1.3e-16 3.1e-18

3855.0 1.1e-16 2.9e-18
";

    fn write(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".ascii").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_read() {
        let file = write(SPECTRUM);
        let spectrum = Spectrum::read(file.path()).unwrap();

        assert_eq!(spectrum.samples.len(), 3);
        assert_eq!(
            spectrum.samples[1],
            Sample {
                wave: 3852.5,
                flux: 1.3e-16,
                flux_err: 3.1e-18
            }
        );
        assert_eq!(spectrum.wavelength_range(), (3850.0, 3855.0));
        assert_eq!(spectrum.header.len(), 7);
        assert_eq!(spectrum.header_value(&["OBJECT"]), Some("ZTF23aaawbsc"));
    }

    #[test]
    fn test_metadata() {
        let file = write(SPECTRUM);
        let spectrum = Spectrum::read(file.path()).unwrap();

        let metadata = spectrum.metadata(Some("2023-09-11_ZTF23aaawbsc.ascii")).unwrap();
        assert_eq!(metadata.observer.as_deref(), Some("Jane Doe"));
        assert_eq!(metadata.reducer.as_deref(), Some("John Roe"));
        assert_eq!(metadata.obsdate.as_deref(), Some("2023-09-11 03:12:45.5"));
        assert_eq!(metadata.exptime, 1800);
        assert_eq!(metadata.ascii_file, "2023-09-11_ZTF23aaawbsc.ascii");
        // YYYY-MM-DD HH:MM:SS.ffffff
        assert_eq!(metadata.reduction_date.len(), 26);
        assert_eq!(&metadata.reduction_date[10..11], " ");

        let local = spectrum.metadata(None).unwrap();
        assert_eq!(local.ascii_file, file.path().display().to_string());
    }

    #[test]
    fn test_defaults() {
        let file = write("# HOME_OBSERVER=Someone\n1 2 3\n");
        let metadata = Spectrum::read(file.path()).unwrap().metadata(None).unwrap();

        assert_eq!(metadata.observer.as_deref(), Some("Someone"));
        assert_eq!(metadata.reducer, None);
        assert_eq!(metadata.obsdate, None);
        assert_eq!(metadata.exptime, 0);

        let json = serde_json::to_value(&metadata).unwrap();
        assert!(json.get("reducer").is_none());
        assert_eq!(json["exptime"], 0);
    }

    #[test]
    fn test_malformed() {
        let file = write("# EXPTIME=600\n3850.0 1.2e-16\n");
        assert!(matches!(
            Spectrum::read(file.path()),
            Err(Error::Spectrum { line: 2, .. })
        ));

        let file = write("3850.0 bright 1.0\n");
        assert!(matches!(
            Spectrum::read(file.path()),
            Err(Error::Spectrum { line: 1, .. })
        ));

        let file = write("# only a header\n");
        assert!(matches!(
            Spectrum::read(file.path()),
            Err(Error::Spectrum { line: 0, .. })
        ));

        let file = write("# NCOMBINE=two\n1 2 3\n");
        let spectrum = Spectrum::read(file.path()).unwrap();
        assert!(matches!(
            spectrum.metadata(None),
            Err(Error::Malformed { kind: "NCOMBINE", .. })
        ));

        let file = write("# NCOMBINE=1e18
# EXPTIME=100
1 2 3
");
        let spectrum = Spectrum::read(file.path()).unwrap();
        assert!(matches!(
            spectrum.metadata(None),
            Err(Error::Malformed { kind: "EXPTIME", .. })
        ));
    }
}
