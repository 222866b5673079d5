//! Target visibility over one night at one site

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::astro_math;
use crate::config::{ObservingLocation, PlotFormat, StandardStar};
use crate::fritz::{Photometry, SourceCatalog};
use crate::paths;
use crate::util::*;

mod plot;

const SAMPLES: usize = 1000;
const HALF_NIGHT: Hours = 12.;

/// Sun altitude below which the sky counts as dark
pub const SUNSET: Degrees = 0.;
pub const ASTRONOMICAL_TWILIGHT: Degrees = -18.;

const SEPARATOR: &str = "-------------------------------------------";

#[derive(Debug, Clone, PartialEq)]
pub struct Site {
    pub name: String,
    pub location: ObservingLocation,
}

impl Site {
    pub fn nordic_optical_telescope() -> Self {
        Site {
            name: "NOT".to_string(),
            location: ObservingLocation {
                latitude: 28.7575,
                longitude: -17.8850,
                elevation: 2382.,
            },
        }
    }

    pub fn roque_de_los_muchachos() -> Self {
        Site {
            name: "La Palma".to_string(),
            location: ObservingLocation {
                latitude: 28.7603,
                longitude: -17.8793,
                elevation: 2327.,
            },
        }
    }

    /// Configured sites take precedence over the built in ones. Case insensitive
    pub fn lookup(name: &str, configured: &BTreeMap<String, ObservingLocation>) -> Result<Self> {
        if let Some((key, location)) = configured
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
        {
            return Ok(Site {
                name: key.clone(),
                location: *location,
            });
        }

        match name.to_ascii_lowercase().as_str() {
            "not" => Ok(Self::nordic_optical_telescope()),
            "lapalma" | "la palma" | "orm" => Ok(Self::roque_de_los_muchachos()),
            _ => Err(Error::UnknownSite(name.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub name: String,
    pub ra: Hours,
    pub dec: Degrees,
    pub photometry: Option<Photometry>,
}

impl Target {
    pub fn from_degrees(name: impl Into<String>, ra: Degrees, dec: Degrees) -> Self {
        Target {
            name: name.into(),
            ra: astro_math::deg_to_hours(ra),
            dec,
            photometry: None,
        }
    }

    pub fn from_standard(name: impl Into<String>, star: &StandardStar) -> Result<Self> {
        Ok(Target {
            name: name.into(),
            ra: astro_math::parse_hms(&star.ra)?,
            dec: astro_math::parse_dms(&star.dec)?,
            photometry: None,
        })
    }
}

/// Evenly spaced times around the UTC midnight following `date`
#[derive(Debug, Clone)]
pub struct Night {
    pub date: NaiveDate,
    pub midnight: DateTime<Utc>,
    offsets: Vec<Hours>,
}

impl Night {
    pub fn new(date: NaiveDate) -> Self {
        let midnight = Utc.from_utc_datetime(&(date + Duration::days(1)).and_time(NaiveTime::MIN));
        let step = 2. * HALF_NIGHT / (SAMPLES - 1) as f64;
        let offsets = (0..SAMPLES)
            .map(|i| -HALF_NIGHT + i as f64 * step)
            .collect();

        Night {
            date,
            midnight,
            offsets,
        }
    }

    /// Hours relative to midnight
    pub fn offsets(&self) -> &[Hours] {
        &self.offsets
    }

    pub fn time_at(&self, offset: Hours) -> DateTime<Utc> {
        self.midnight + Duration::milliseconds((offset * 3_600_000.).round() as i64)
    }

    pub fn times(&self) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        self.offsets.iter().map(|offset| self.time_at(*offset))
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct MoonSummary {
    pub ra: Hours,
    pub dec: Degrees,
    pub distance: f64,
    pub illumination: f64,
}

pub struct Observability {
    pub targets: Vec<Target>,
    pub night: Night,
    pub site: Site,
}

impl Observability {
    /// `date` is the evening the night starts on, today (UTC) if not given
    pub fn new(targets: Vec<Target>, date: Option<NaiveDate>, site: Site) -> Self {
        let date = date.unwrap_or_else(|| Utc::now().date_naive());
        Observability {
            targets,
            night: Night::new(date),
            site,
        }
    }

    /// Looks up coordinates and the latest detection of each source.
    /// Missing photometry is not fatal, missing coordinates are.
    pub async fn from_catalog(
        catalog: &dyn SourceCatalog,
        ztf_ids: &[String],
        date: Option<NaiveDate>,
        site: Site,
    ) -> Result<Self> {
        let mut targets = Vec::with_capacity(ztf_ids.len());
        for ztf_id in ztf_ids {
            let (ra, dec) = catalog.radec(ztf_id).await?;
            let mut target = Target::from_degrees(ztf_id.clone(), ra, dec);
            match catalog.latest_photometry(ztf_id).await {
                Ok(photometry) => target.photometry = Some(photometry),
                Err(e) => warn!("No photometry for {}: {}", ztf_id, e),
            }
            targets.push(target);
        }
        Ok(Self::new(targets, date, site))
    }

    pub fn date(&self) -> NaiveDate {
        self.night.date
    }

    fn altitude(&self, time: DateTime<Utc>, ra: Hours, dec: Degrees) -> Degrees {
        let location = &self.site.location;
        astro_math::equatorial_to_horizontal(time, location.latitude, location.longitude, ra, dec)
            .0
    }

    pub fn altitude_curve(&self, target: &Target) -> Vec<Degrees> {
        self.night
            .times()
            .map(|t| self.altitude(t, target.ra, target.dec))
            .collect()
    }

    pub fn airmass_curve(&self, target: &Target) -> Vec<Option<f64>> {
        self.altitude_curve(target)
            .into_iter()
            .map(astro_math::airmass)
            .collect()
    }

    pub fn sun_altitudes(&self) -> Vec<Degrees> {
        self.night
            .times()
            .map(|t| {
                let (ra, dec, _) = astro_math::sun_position(t);
                self.altitude(t, ra, dec)
            })
            .collect()
    }

    /// Topocentric moon altitude, corrected for parallax
    pub fn moon_altitudes(&self) -> Vec<Degrees> {
        self.night
            .times()
            .map(|t| {
                let (ra, dec, distance) = astro_math::moon_position(t);
                let alt = self.altitude(t, ra, dec);
                alt - astro_math::moon_parallax(distance) * astro_math::deg_to_rad(alt).cos()
            })
            .collect()
    }

    /// Contiguous spans (hours from midnight) during which the sun is below `threshold`
    pub fn darkness_bands(&self, threshold: Degrees) -> Vec<(Hours, Hours)> {
        let offsets = self.night.offsets();
        let mut bands = Vec::new();
        let mut start = None;

        for (offset, alt) in offsets.iter().zip(self.sun_altitudes()) {
            match (alt < threshold, start) {
                (true, None) => start = Some(*offset),
                (false, Some(s)) => {
                    bands.push((s, *offset));
                    start = None;
                }
                _ => {}
            }
        }
        if let (Some(s), Some(last)) = (start, offsets.last()) {
            bands.push((s, *last));
        }
        bands
    }

    /// Moon position and phase at midnight
    pub fn moon(&self) -> MoonSummary {
        let (ra, dec, distance) = astro_math::moon_position(self.night.midnight);
        MoonSummary {
            ra,
            dec,
            distance,
            illumination: astro_math::moon_illumination(self.night.midnight),
        }
    }

    /// Separation between target and moon at midnight
    pub fn moon_distance(&self, target: &Target) -> Degrees {
        let moon = self.moon();
        astro_math::angular_separation(target.ra, target.dec, moon.ra, moon.dec)
    }

    /// Summary of every target: name, coordinates and the latest detection
    pub fn info(&self, now: DateTime<Utc>) -> String {
        let mut info = String::new();
        for target in &self.targets {
            info.push_str(&format!(
                "{sep}\n{name}\n{lower}\nRA: {ra}\nDec: {dec}\n",
                sep = SEPARATOR,
                name = target.name,
                lower = target.name.to_lowercase(),
                ra = astro_math::format_hms(target.ra),
                dec = astro_math::format_dms(target.dec),
            ));
            if let Some(phot) = &target.photometry {
                info.push_str(&format!(
                    "{:.2} mag {:.0} days ago in the {} filter\n",
                    phot.mag,
                    phot.days_ago(now),
                    phot.band
                ));
            }
            info.push_str(SEPARATOR);
            info.push('\n');
        }
        info
    }

    pub fn print_info(&self) {
        print!("{}", self.info(Utc::now()));
    }

    /// Renders the targets into `<base>/<date>/targets.<ext>`
    pub fn plot_targets(&self, base_dir: &Path, format: PlotFormat) -> Result<PathBuf> {
        self.plot_as("targets", base_dir, format)
    }

    /// Renders the standard stars, for the same night and site, into `<base>/<date>/standards.<ext>`
    pub fn plot_standards(
        &self,
        standards: &BTreeMap<String, StandardStar>,
        base_dir: &Path,
        format: PlotFormat,
    ) -> Result<PathBuf> {
        let targets = standards
            .iter()
            .map(|(name, star)| Target::from_standard(name.clone(), star))
            .collect::<Result<Vec<_>>>()?;
        Observability::new(targets, Some(self.date()), self.site.clone())
            .plot_as("standards", base_dir, format)
    }

    fn plot_as(&self, stem: &str, base_dir: &Path, format: PlotFormat) -> Result<PathBuf> {
        let path = paths::date_dir(base_dir, self.date())?
            .join(format!("{}.{}", stem, format.extension()));
        plot::render(self, &path, format)?;
        info!("Saved visibility chart to {}", path.display());
        Ok(path)
    }
}
