#![allow(dead_code)]

use chrono::{DateTime, Datelike, Timelike, Utc};
use polynomials::poly;
use std::f64::consts::{PI, TAU};

use crate::util::{Error, Result};

pub type Hours = f64;
pub type Degrees = f64;
pub type Radians = f64;

const J2000: f64 = 2451545.0;
const MJD_OFFSET: f64 = 2400000.5;
const EARTH_RADIUS_KM: f64 = 6378.14;
const AU_KM: f64 = 149_597_870.7;

pub fn deg_to_rad(degrees: Degrees) -> Radians {
    PI * degrees / 180.
}

pub fn rad_to_deg(rad: Radians) -> Degrees {
    180. * rad / PI
}

pub fn hours_to_rad(hours: Hours) -> Radians {
    PI * hours / 12.
}

pub fn rad_to_hours(rad: Radians) -> Hours {
    12. * rad / PI
}

pub fn deg_to_hours(deg: Degrees) -> Hours {
    deg / 15.
}

pub fn hours_to_deg(hours: Hours) -> Degrees {
    hours * 15.
}

// Convert hms to hours or dms to degrees
pub fn ms_to_dec(d: u32, minutes: u32, seconds: f64) -> f64 {
    (d as f64) + (minutes as f64) / 60. + seconds / 3600.
}

/// Parses `hh:mm:ss.s` (or space separated) into hours
pub fn parse_hms(s: &str) -> Result<Hours> {
    let (negative, (h, m, sec)) = split_sexagesimal(s, "right ascension")?;
    if negative || h >= 24 {
        return Err(Error::malformed("right ascension", s));
    }
    Ok(ms_to_dec(h, m, sec))
}

/// Parses `±dd:mm:ss.s` (or space separated) into degrees
pub fn parse_dms(s: &str) -> Result<Degrees> {
    let (negative, (d, m, sec)) = split_sexagesimal(s, "declination")?;
    let dec = ms_to_dec(d, m, sec);
    if dec > 90. {
        return Err(Error::malformed("declination", s));
    }
    Ok(if negative { -dec } else { dec })
}

fn split_sexagesimal(s: &str, kind: &'static str) -> Result<(bool, (u32, u32, f64))> {
    let malformed = || Error::malformed(kind, s);

    let trimmed = s.trim();
    // The sign has to be read from the string, "-00:30:00" has a zero degree field
    let (negative, unsigned) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };

    let parts = unsigned
        .split(|c: char| c == ':' || c.is_whitespace())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>();
    if parts.len() != 3 {
        return Err(malformed());
    }

    let whole: u32 = parts[0].parse().map_err(|_| malformed())?;
    let minutes: u32 = parts[1].parse().map_err(|_| malformed())?;
    let seconds: f64 = parts[2].parse().map_err(|_| malformed())?;
    if minutes >= 60 || !(0. ..60.).contains(&seconds) {
        return Err(malformed());
    }

    Ok((negative, (whole, minutes, seconds)))
}

const SEXAGESIMAL_DIGITS: i64 = 100_000;

/// Splits a non-negative value into whole, minutes and 1e-5 seconds, rounding once
fn to_sexagesimal_units(value: f64) -> (i64, i64, i64, i64) {
    let total = (value * 3600. * SEXAGESIMAL_DIGITS as f64).round() as i64;
    let per_whole = 3600 * SEXAGESIMAL_DIGITS;
    let per_minute = 60 * SEXAGESIMAL_DIGITS;
    let whole = total / per_whole;
    let minutes = (total % per_whole) / per_minute;
    let seconds = (total % per_minute) / SEXAGESIMAL_DIGITS;
    let fraction = total % SEXAGESIMAL_DIGITS;
    (whole, minutes, seconds, fraction)
}

/// Formats hours as `hh:mm:ss.sssss`
pub fn format_hms(hours: Hours) -> String {
    let (h, m, s, frac) = to_sexagesimal_units(modulo(hours, 24.));
    format!("{:02}:{:02}:{:02}.{:05}", h % 24, m, s, frac)
}

/// Formats degrees as `±dd:mm:ss.sssss`
pub fn format_dms(degrees: Degrees) -> String {
    let sign = if degrees < 0. { '-' } else { '+' };
    let (d, m, s, frac) = to_sexagesimal_units(degrees.abs());
    format!("{}{:02}:{:02}:{:02}.{:05}", sign, d, m, s, frac)
}

/// Calculates the Julian Date of a time
/// see https://scienceworld.wolfram.com/astronomy/JulianDate.html
pub fn julian_date(time: DateTime<Utc>) -> f64 {
    let y = time.year() as f64;
    let m = time.month() as f64;
    let d = time.day() as f64;

    let mut jd = 367. * y;
    jd -= f64::floor(7. * (y + f64::floor((m + 9.) / 12.)) / 4.);
    jd -= f64::floor(3. * (f64::floor((y + (m - 9.) / 7.) / 100.) + 1.) / 4.);
    jd += f64::floor(275. * m / 9.);
    jd += d;
    jd += 1721028.5;
    let seconds = time.second() as f64 + time.nanosecond() as f64 / 1e9;
    jd + ms_to_dec(time.hour(), time.minute(), seconds) / 24.
}

pub fn mjd(time: DateTime<Utc>) -> f64 {
    julian_date(time) - MJD_OFFSET
}

// see https://thecynster.home.blog/2019/11/04/calculating-sidereal-time/
pub fn calculate_greenwich_sidereal_time(time: DateTime<Utc>) -> Hours {
    // The result will be off by the number of leap seconds different from this on the date given
    const LEAP_SECOND_TOTAL: u32 = 37;

    let jd_utc = julian_date(time);

    let du = jd_utc - J2000;
    let theta = rad_to_hours(modulo(
        TAU * (0.779_057_273_264f64 + 1.002_737_811_911_354_5f64 * du),
        TAU,
    ));

    let poly = poly![
        0.014506,
        4612.156534,
        1.3915817,
        -0.00000044,
        -0.000029956,
        -0.0000000368,
    ];
    let jd_tt = jd_utc + ((LEAP_SECOND_TOTAL as f64 + 32.184) / 3600.) / 24.; // Hours
    let t = (jd_tt - J2000) / 36525.; // years

    let gmstp = deg_to_hours(modulo(poly.eval(t).unwrap_or_default() / 3600., 360.));

    modulo(theta + gmstp, 24.)
}

/// longitude in degrees
/// returns hours
pub fn calculate_local_sidereal_time(time: DateTime<Utc>, longitude: Degrees) -> Hours {
    let greenwich_sidereal_time = calculate_greenwich_sidereal_time(time);
    modulo(greenwich_sidereal_time + deg_to_hours(longitude), 24.)
}

/// longitude in degrees, ra in hours
/// returns hours
pub fn calculate_hour_angle(time: DateTime<Utc>, longitude: Degrees, ra: Hours) -> Hours {
    modulo(calculate_local_sidereal_time(time, longitude) - ra, 24.)
}

pub fn calculate_alt_from_ha_dec(ha: Hours, dec: Degrees, lat: Degrees) -> Degrees {
    let ha = hours_to_rad(ha);
    let dec = deg_to_rad(dec);
    let lat = deg_to_rad(lat);
    rad_to_deg((dec.sin() * lat.sin() + dec.cos() * lat.cos() * ha.cos()).asin())
}

pub fn calculate_az_from_ha_dec(ha: Hours, dec: Degrees, lat: Degrees) -> Degrees {
    let alt = deg_to_rad(calculate_alt_from_ha_dec(ha, dec, lat));
    let ha = hours_to_rad(ha);
    let dec = deg_to_rad(dec);
    let lat = deg_to_rad(lat);

    let cos_a = (dec.sin() - alt.sin() * lat.sin()) / (alt.cos() * lat.cos());
    let a = rad_to_deg(cos_a.clamp(-1., 1.).acos()) as Degrees;

    if 0. < ha.sin() {
        360. - a
    } else {
        a
    }
}

/// Altitude and azimuth (degrees) of an equatorial position seen from a site at a time
pub fn equatorial_to_horizontal(
    time: DateTime<Utc>,
    latitude: Degrees,
    longitude: Degrees,
    ra: Hours,
    dec: Degrees,
) -> (Degrees, Degrees) {
    let ha = calculate_hour_angle(time, longitude, ra);
    (
        calculate_alt_from_ha_dec(ha, dec, latitude),
        calculate_az_from_ha_dec(ha, dec, latitude),
    )
}

fn mean_obliquity(days_since_j2000: f64) -> Radians {
    deg_to_rad(23.439 - 0.0000004 * days_since_j2000)
}

fn ecliptic_to_equatorial(lambda: Radians, beta: Radians, epsilon: Radians) -> (Hours, Degrees) {
    let x = beta.cos() * lambda.cos();
    let y = epsilon.cos() * beta.cos() * lambda.sin() - epsilon.sin() * beta.sin();
    let z = epsilon.sin() * beta.cos() * lambda.sin() + epsilon.cos() * beta.sin();
    (
        modulo(rad_to_hours(y.atan2(x)), 24.),
        rad_to_deg(z.clamp(-1., 1.).asin()),
    )
}

/// Low precision solar coordinates (about 0.01 degrees between 1950 and 2050)
/// following the Astronomical Almanac.
/// Returns right ascension (hours), declination (degrees) and distance (km)
pub fn sun_position(time: DateTime<Utc>) -> (Hours, Degrees, f64) {
    let n = julian_date(time) - J2000;
    let l = modulo(280.460 + 0.9856474 * n, 360.);
    let g = deg_to_rad(modulo(357.528 + 0.9856003 * n, 360.));
    let lambda = deg_to_rad(l + 1.915 * g.sin() + 0.020 * (2. * g).sin());
    let distance = (1.00014 - 0.01671 * g.cos() - 0.00014 * (2. * g).cos()) * AU_KM;

    let (ra, dec) = ecliptic_to_equatorial(lambda, 0., mean_obliquity(n));
    (ra, dec, distance)
}

fn sin_deg(deg: Degrees) -> f64 {
    deg_to_rad(deg).sin()
}

fn cos_deg(deg: Degrees) -> f64 {
    deg_to_rad(deg).cos()
}

/// Low precision geocentric lunar coordinates (about 0.3 degrees)
/// following the Astronomical Almanac.
/// Returns right ascension (hours), declination (degrees) and distance (km)
pub fn moon_position(time: DateTime<Utc>) -> (Hours, Degrees, f64) {
    let n = julian_date(time) - J2000;
    let t = n / 36525.;

    let lambda = 218.32 + 481267.881 * t + 6.29 * sin_deg(135.0 + 477198.87 * t)
        - 1.27 * sin_deg(259.3 - 413335.36 * t)
        + 0.66 * sin_deg(235.7 + 890534.22 * t)
        + 0.21 * sin_deg(269.9 + 954397.74 * t)
        - 0.19 * sin_deg(357.5 + 35999.05 * t)
        - 0.11 * sin_deg(186.5 + 966404.03 * t);

    let beta = 5.13 * sin_deg(93.3 + 483202.02 * t) + 0.28 * sin_deg(228.2 + 960400.89 * t)
        - 0.28 * sin_deg(318.3 + 6003.15 * t)
        - 0.17 * sin_deg(217.6 - 407332.21 * t);

    let parallax = 0.9508
        + 0.0518 * cos_deg(135.0 + 477198.87 * t)
        + 0.0095 * cos_deg(259.3 - 413335.36 * t)
        + 0.0078 * cos_deg(235.7 + 890534.22 * t)
        + 0.0028 * cos_deg(269.9 + 954397.74 * t);
    let distance = EARTH_RADIUS_KM / sin_deg(parallax);

    let (ra, dec) = ecliptic_to_equatorial(
        deg_to_rad(modulo(lambda, 360.)),
        deg_to_rad(beta),
        mean_obliquity(n),
    );
    (ra, dec, distance)
}

/// Lunar horizontal parallax for a geocentric distance in km
pub fn moon_parallax(distance: f64) -> Degrees {
    rad_to_deg((EARTH_RADIUS_KM / distance).asin())
}

/// Illuminated fraction of the lunar disk, 0 at new moon and 1 at full moon
pub fn moon_illumination(time: DateTime<Utc>) -> f64 {
    let (sun_ra, sun_dec, sun_distance) = sun_position(time);
    let (moon_ra, moon_dec, moon_distance) = moon_position(time);

    let elongation = deg_to_rad(angular_separation(sun_ra, sun_dec, moon_ra, moon_dec));
    let phase_angle = (sun_distance * elongation.sin())
        .atan2(moon_distance - sun_distance * elongation.cos());

    (1. + phase_angle.cos()) / 2.
}

/// Great circle distance between two equatorial positions (ra in hours, dec in degrees)
pub fn angular_separation(ra1: Hours, dec1: Degrees, ra2: Hours, dec2: Degrees) -> Degrees {
    let (ra1, dec1, ra2, dec2) = (
        hours_to_rad(ra1),
        deg_to_rad(dec1),
        hours_to_rad(ra2),
        deg_to_rad(dec2),
    );
    let hav = ((dec2 - dec1) / 2.).sin().powi(2)
        + dec1.cos() * dec2.cos() * ((ra2 - ra1) / 2.).sin().powi(2);
    rad_to_deg(2. * hav.sqrt().clamp(-1., 1.).asin())
}

/// Plane parallel airmass, sec(z). Undefined at or below the horizon
pub fn airmass(alt: Degrees) -> Option<f64> {
    if alt <= 0. {
        None
    } else {
        Some(1. / deg_to_rad(alt).sin())
    }
}

pub fn modulo(val: f64, base: f64) -> f64 {
    ((val % base) + base) % base
}
