use crate::astro_math::Degrees;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::util::Result;

pub const APP_NAME: &str = "transient_followup";
const CONFIG_NAME: &str = "config";

/* Config */
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub fritz: FritzSettings,
    pub tns: TnsSettings,
    pub wiserep: WiserepSettings,
    pub report: ReportTemplate,
    pub output: OutputSettings,
    pub sites: BTreeMap<String, ObservingLocation>,
    pub standards: BTreeMap<String, StandardStar>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fritz: FritzSettings::default(),
            tns: TnsSettings::default(),
            wiserep: WiserepSettings::default(),
            report: ReportTemplate::default(),
            output: OutputSettings::default(),
            sites: BTreeMap::new(),
            standards: default_standards(),
        }
    }
}

impl Config {
    /// Loads the configuration from `path`, or from the per-user config directory.
    /// A missing file is created with the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => confy::load_path(path)?,
            None => confy::load(APP_NAME, CONFIG_NAME)?,
        };
        Ok(config)
    }

    /// Directory holding the configuration file, also used for credential files
    pub fn directory() -> Result<PathBuf> {
        let file = confy::get_configuration_file_path(APP_NAME, CONFIG_NAME)?;
        Ok(file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")))
    }
}

/* Fritz */
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FritzSettings {
    pub base_url: String,
    pub max_retry_secs: u64,
    pub finder_image_size: u32,
}

impl Default for FritzSettings {
    fn default() -> Self {
        Self {
            base_url: "https://fritz.science/api".to_string(),
            max_retry_secs: 600,
            finder_image_size: 2,
        }
    }
}

/* TNS */
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TnsSettings {
    pub search_url: String,
    pub bot_id: String,
    pub bot_name: String,
    pub search_radius_arcsec: f64,
}

impl Default for TnsSettings {
    fn default() -> Self {
        Self {
            search_url: "https://www.wis-tns.org/api/get/search".to_string(),
            bot_id: "115364".to_string(),
            bot_name: "ZTF_DESY".to_string(),
            search_radius_arcsec: 3.,
        }
    }
}

/* WISeREP */
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WiserepSettings {
    pub sandbox_url: String,
    pub production_url: String,
    pub bot_id: String,
    pub bot_name: String,
    pub poll_interval_secs: u64,
    pub poll_attempts: u32,
}

impl Default for WiserepSettings {
    fn default() -> Self {
        Self {
            sandbox_url: "https://sandbox.wiserep.org/api".to_string(),
            production_url: "https://www.wiserep.org/api".to_string(),
            bot_id: "1234".to_string(),
            bot_name: "OKC_ZTF".to_string(),
            poll_interval_secs: 2,
            poll_attempts: 60,
        }
    }
}

/* Spectrum report template */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportTemplate {
    pub instrument_id: String,
    pub telescope_id: String,
    pub spectype_id: String,
    pub flux_unit_id: String,
    pub flux_unit_description: String,
    pub wave_unit_id: String,
    pub group_id: String,
    pub assoc_groups: String,
    pub aperture: String,
    pub dichroic: String,
    pub grism: String,
    pub grating: String,
    pub blaze: String,
    pub remarks: String,
    pub contrib: String,
    pub observer_default: String,
}

impl Default for ReportTemplate {
    fn default() -> Self {
        Self {
            instrument_id: "41".to_string(), // NOT/ALFOSC
            telescope_id: "10".to_string(),  // NOT
            spectype_id: "1".to_string(),    // Object
            flux_unit_id: "1".to_string(),   // erg/s/cm2/A
            flux_unit_description: String::new(),
            wave_unit_id: "1".to_string(), // Angstrom
            group_id: "0".to_string(),
            assoc_groups: String::new(),
            aperture: String::new(),
            dichroic: String::new(),
            grism: "4".to_string(),
            grating: String::new(),
            blaze: String::new(),
            remarks: String::new(),
            contrib: String::new(),
            observer_default: String::new(),
        }
    }
}

/* Output */
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlotFormat {
    #[default]
    Png,
    Svg,
}

impl PlotFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            PlotFormat::Png => "png",
            PlotFormat::Svg => "svg",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub base_dir: PathBuf,
    pub plot_format: PlotFormat,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            plot_format: PlotFormat::Png,
        }
    }
}

/* Location */
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservingLocation {
    pub latitude: Degrees,
    /// Positive east
    pub longitude: Degrees,
    pub elevation: f64,
}

/* Standard stars, sexagesimal coordinates */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardStar {
    pub ra: String,
    pub dec: String,
}

impl StandardStar {
    fn new(ra: &str, dec: &str) -> Self {
        Self {
            ra: ra.to_string(),
            dec: dec.to_string(),
        }
    }
}

/// Spectrophotometric standards commonly used from La Palma
pub fn default_standards() -> BTreeMap<String, StandardStar> {
    [
        ("BD+28 4211", StandardStar::new("21:51:11.02", "+28:51:50.4")),
        ("BD+33 2642", StandardStar::new("15:51:59.89", "+32:56:54.3")),
        ("Feige 34", StandardStar::new("10:39:36.74", "+43:06:09.3")),
        ("Feige 110", StandardStar::new("23:19:58.40", "-05:09:56.2")),
        ("GD 71", StandardStar::new("05:52:27.61", "+15:53:13.2")),
        ("HD 93521", StandardStar::new("10:48:23.51", "+37:34:13.1")),
        ("SP0305+261", StandardStar::new("03:08:25.59", "+26:19:51.4")),
    ]
    .into_iter()
    .map(|(name, star)| (name.to_string(), star))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_round_trip_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        // confy writes the defaults on first load
        let config = Config::load(Some(&path)).unwrap();
        assert!(path.exists());
        assert_eq!(config.fritz.base_url, "https://fritz.science/api");
        assert_eq!(config.wiserep.poll_attempts, 60);
        assert_eq!(config.output.plot_format, PlotFormat::Png);
        assert_eq!(config.standards.len(), 7);
        assert!(config.sites.is_empty());
    }

    #[test]
    fn test_partial_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[tns]
bot_name = "MY_BOT"

[output]
plot_format = "svg"

[sites.calar_alto]
latitude = 37.2236
longitude = -2.5463
elevation = 2168.0

[standards."GD 71"]
ra = "05:52:27.61"
dec = "+15:53:13.2"
"#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.tns.bot_name, "MY_BOT");
        assert_eq!(config.tns.bot_id, "115364");
        assert_eq!(config.output.plot_format.extension(), "svg");
        assert_eq!(config.sites["calar_alto"].elevation, 2168.0);
        assert_eq!(config.standards["GD 71"].dec, "+15:53:13.2");
    }

    #[test]
    fn test_default_standards_parse() {
        for (name, star) in default_standards() {
            assert!(
                crate::astro_math::parse_hms(&star.ra).is_ok(),
                "bad ra for {}",
                name
            );
            assert!(
                crate::astro_math::parse_dms(&star.dec).is_ok(),
                "bad dec for {}",
                name
            );
        }
    }
}
