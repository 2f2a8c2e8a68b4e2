//! Built-in analytic position provider.
//!
//! Planets use the published Keplerian mean elements and their secular rates
//! (valid 1800–2050, accuracy of a few arc-minutes for the inner planets).
//! The Moon uses the largest periodic terms of the lunar theory, the mean
//! node its mean polynomial. Longitudes are referred to the mean equinox of
//! date.
//!
//! Each [`ReferenceFrame`] is a separate strategy; the provider dispatches on
//! the frame and never mixes them.

use chrono::{DateTime, TimeZone, Utc};

use crate::angle::normalize_degrees;
use crate::body::{CelestialBody, ReferenceFrame};
use crate::constants::PRECESSION_PER_CENTURY;
use crate::error::ProviderError;
use crate::position::{Position, PositionProvider};
use crate::time::centuries_since_j2000;

/// Orbital element value at J2000 and its rate per Julian century.
#[derive(Clone, Copy)]
struct Secular(f64, f64);

impl Secular {
    fn at(self, t: f64) -> f64 {
        self.0 + self.1 * t
    }
}

/// Semi-major axis (au), eccentricity, inclination, mean longitude,
/// longitude of perihelion, longitude of ascending node (degrees).
#[derive(Clone, Copy)]
struct Elements {
    a: Secular,
    e: Secular,
    i: Secular,
    l: Secular,
    peri: Secular,
    node: Secular,
}

const MERCURY: Elements = Elements {
    a: Secular(0.387_099_27, 0.000_000_37),
    e: Secular(0.205_635_93, 0.000_019_06),
    i: Secular(7.004_979_02, -0.005_947_49),
    l: Secular(252.250_323_50, 149_472.674_111_75),
    peri: Secular(77.457_796_28, 0.160_476_89),
    node: Secular(48.330_765_93, -0.125_340_81),
};

const VENUS: Elements = Elements {
    a: Secular(0.723_335_66, 0.000_003_90),
    e: Secular(0.006_776_72, -0.000_041_07),
    i: Secular(3.394_676_05, -0.000_788_90),
    l: Secular(181.979_099_50, 58_517.815_387_29),
    peri: Secular(131.602_467_18, 0.002_683_29),
    node: Secular(76.679_842_55, -0.277_694_18),
};

const EARTH_MOON_BARY: Elements = Elements {
    a: Secular(1.000_002_61, 0.000_005_62),
    e: Secular(0.016_711_23, -0.000_043_92),
    i: Secular(-0.000_015_31, -0.012_946_68),
    l: Secular(100.464_571_66, 35_999.372_449_81),
    peri: Secular(102.937_681_93, 0.323_273_64),
    node: Secular(0.0, 0.0),
};

const MARS: Elements = Elements {
    a: Secular(1.523_710_34, 0.000_018_47),
    e: Secular(0.093_394_10, 0.000_078_82),
    i: Secular(1.849_691_42, -0.008_131_31),
    l: Secular(-4.553_432_05, 19_140.302_684_99),
    peri: Secular(-23.943_629_59, 0.444_410_88),
    node: Secular(49.559_538_91, -0.292_573_43),
};

const JUPITER: Elements = Elements {
    a: Secular(5.202_887_00, -0.000_116_07),
    e: Secular(0.048_386_24, -0.000_132_53),
    i: Secular(1.304_396_95, -0.001_837_14),
    l: Secular(34.396_440_51, 3_034.746_127_75),
    peri: Secular(14.728_479_83, 0.212_526_68),
    node: Secular(100.473_909_09, 0.204_691_06),
};

const SATURN: Elements = Elements {
    a: Secular(9.536_675_94, -0.001_250_60),
    e: Secular(0.053_861_79, -0.000_509_91),
    i: Secular(2.485_991_87, 0.001_936_09),
    l: Secular(49.954_244_23, 1_222.493_622_01),
    peri: Secular(92.598_878_31, -0.418_972_16),
    node: Secular(113.662_424_48, -0.288_677_94),
};

const URANUS: Elements = Elements {
    a: Secular(19.189_164_64, -0.001_961_76),
    e: Secular(0.047_257_44, -0.000_043_97),
    i: Secular(0.772_637_83, -0.002_429_39),
    l: Secular(313.238_104_51, 428.482_027_85),
    peri: Secular(170.954_276_30, 0.408_052_81),
    node: Secular(74.016_925_03, 0.042_405_89),
};

const NEPTUNE: Elements = Elements {
    a: Secular(30.069_922_76, 0.000_262_91),
    e: Secular(0.008_590_48, 0.000_051_05),
    i: Secular(1.770_043_47, 0.000_353_72),
    l: Secular(-55.120_029_69, 218.459_453_25),
    peri: Secular(44.964_762_27, -0.322_414_64),
    node: Secular(131.784_225_74, -0.005_086_64),
};

const PLUTO: Elements = Elements {
    a: Secular(39.482_116_75, -0.000_315_96),
    e: Secular(0.248_827_30, 0.000_051_70),
    i: Secular(17.140_012_06, 0.000_048_18),
    l: Secular(238.929_038_33, 145.207_805_15),
    peri: Secular(224.068_916_29, -0.040_629_42),
    node: Secular(110.303_936_84, -0.011_834_82),
};

/// Heliocentric ecliptic rectangular coordinates (au, J2000 ecliptic).
#[derive(Clone, Copy, Debug)]
struct Vec3 {
    x: f64,
    y: f64,
    z: f64,
}

impl Vec3 {
    fn sub(self, other: Vec3) -> Vec3 {
        Vec3 {
            x: self.x - other.x,
            y: self.y - other.y,
            z: self.z - other.z,
        }
    }

    fn neg(self) -> Vec3 {
        Vec3 {
            x: -self.x,
            y: -self.y,
            z: -self.z,
        }
    }

    /// Ecliptic (longitude, latitude) in degrees.
    fn spherical(self) -> (f64, f64) {
        let lon = self.y.atan2(self.x).to_degrees();
        let lat = self.z.atan2(self.x.hypot(self.y)).to_degrees();
        (lon, lat)
    }
}

/// Solve Kepler's equation `E − e·sin E = M` (radians) by Newton iteration.
fn eccentric_anomaly(mean_anomaly: f64, e: f64) -> f64 {
    let m = (mean_anomaly + std::f64::consts::PI).rem_euclid(std::f64::consts::TAU)
        - std::f64::consts::PI;
    let mut ecc = m + e * m.sin();
    for _ in 0..30 {
        let delta = (ecc - e * ecc.sin() - m) / (1.0 - e * ecc.cos());
        ecc -= delta;
        if delta.abs() < 1e-12 {
            break;
        }
    }
    ecc
}

fn heliocentric_vector(el: &Elements, t: f64) -> Vec3 {
    let a = el.a.at(t);
    let e = el.e.at(t);
    let inc = el.i.at(t).to_radians();
    let l = el.l.at(t);
    let peri = el.peri.at(t);
    let node = el.node.at(t);

    let arg_peri = (peri - node).to_radians();
    let node = node.to_radians();
    let ecc = eccentric_anomaly((l - peri).to_radians(), e);

    let xp = a * (ecc.cos() - e);
    let yp = a * (1.0 - e * e).sqrt() * ecc.sin();

    let (sw, cw) = arg_peri.sin_cos();
    let (so, co) = node.sin_cos();
    let (si, ci) = inc.sin_cos();

    Vec3 {
        x: (cw * co - sw * so * ci) * xp + (-sw * co - cw * so * ci) * yp,
        y: (cw * so + sw * co * ci) * xp + (-sw * so + cw * co * ci) * yp,
        z: (sw * si) * xp + (cw * si) * yp,
    }
}

fn planet_elements(body: CelestialBody) -> Option<&'static Elements> {
    match body {
        CelestialBody::Mercury => Some(&MERCURY),
        CelestialBody::Venus => Some(&VENUS),
        CelestialBody::Mars => Some(&MARS),
        CelestialBody::Jupiter => Some(&JUPITER),
        CelestialBody::Saturn => Some(&SATURN),
        CelestialBody::Uranus => Some(&URANUS),
        CelestialBody::Neptune => Some(&NEPTUNE),
        CelestialBody::Pluto => Some(&PLUTO),
        _ => None,
    }
}

/// Geocentric ecliptic longitude/latitude of the Moon, mean equinox of date.
fn moon_ecliptic(t: f64) -> (f64, f64) {
    let lp = 218.316_447_7 + 481_267.881_234_21 * t;
    let d = (297.850_192_1 + 445_267.111_403_4 * t).to_radians();
    let m = (357.529_109_2 + 35_999.050_290_9 * t).to_radians();
    let mp = (134.963_396_4 + 477_198.867_505_5 * t).to_radians();
    let f = (93.272_095_0 + 483_202.017_523_3 * t).to_radians();

    let lon = lp
        + 6.288_774 * mp.sin()
        + 1.274_027 * (2.0 * d - mp).sin()
        + 0.658_314 * (2.0 * d).sin()
        + 0.213_618 * (2.0 * mp).sin()
        - 0.185_116 * m.sin()
        - 0.114_332 * (2.0 * f).sin()
        + 0.058_793 * (2.0 * d - 2.0 * mp).sin()
        + 0.057_066 * (2.0 * d - m - mp).sin()
        + 0.053_322 * (2.0 * d + mp).sin()
        + 0.045_758 * (2.0 * d - m).sin()
        - 0.040_923 * (m - mp).sin()
        - 0.034_720 * d.sin()
        - 0.030_383 * (m + mp).sin();

    let lat = 5.128_122 * f.sin()
        + 0.280_602 * (mp + f).sin()
        + 0.277_693 * (mp - f).sin()
        + 0.173_237 * (2.0 * d - f).sin()
        + 0.055_413 * (2.0 * d - f + mp).sin()
        + 0.046_271 * (2.0 * d - f - mp).sin();

    (lon, lat)
}

fn mean_node_longitude(t: f64) -> f64 {
    125.044_547_9 - 1_934.136_289_1 * t + 0.002_075_4 * t * t
}

fn mean_obliquity(t: f64) -> f64 {
    23.439_291_1 - 0.013_004_2 * t
}

/// Convert ecliptic (λ, β) to right ascension, all in degrees.
fn right_ascension(lon: f64, lat: f64, t: f64) -> f64 {
    let eps = mean_obliquity(t).to_radians();
    let lon = lon.to_radians();
    let lat = lat.to_radians();
    let y = lon.sin() * eps.cos() - lat.tan() * eps.sin();
    y.atan2(lon.cos()).to_degrees()
}

/// Deterministic analytic provider backed by mean orbital elements.
#[derive(Clone, Debug)]
pub struct MeanElementsProvider {
    valid_from: DateTime<Utc>,
    valid_to: DateTime<Utc>,
}

impl Default for MeanElementsProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MeanElementsProvider {
    pub fn new() -> Self {
        Self {
            valid_from: Utc.with_ymd_and_hms(1800, 1, 1, 0, 0, 0).single().unwrap_or_default(),
            valid_to: Utc.with_ymd_and_hms(2050, 12, 31, 23, 59, 59).single().unwrap_or_default(),
        }
    }

    /// Narrow the supported window, e.g. to mirror a file-backed source.
    pub fn with_range(mut self, valid_from: DateTime<Utc>, valid_to: DateTime<Utc>) -> Self {
        self.valid_from = valid_from.max(self.valid_from);
        self.valid_to = valid_to.min(self.valid_to);
        self
    }

    pub fn supported_range(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        (self.valid_from, self.valid_to)
    }

    /// Geocentric ecliptic (longitude, latitude) of date.
    fn geocentric(&self, body: CelestialBody, t: f64) -> (f64, f64) {
        let precession = PRECESSION_PER_CENTURY * t;
        match body {
            CelestialBody::Moon => moon_ecliptic(t),
            CelestialBody::MeanNode => (mean_node_longitude(t), 0.0),
            CelestialBody::Sun => {
                let (lon, lat) = heliocentric_vector(&EARTH_MOON_BARY, t).neg().spherical();
                (lon + precession, lat)
            }
            planet => {
                let earth = heliocentric_vector(&EARTH_MOON_BARY, t);
                // planet_elements covers every remaining variant
                let el = planet_elements(planet).unwrap_or(&EARTH_MOON_BARY);
                let (lon, lat) = heliocentric_vector(el, t).sub(earth).spherical();
                (lon + precession, lat)
            }
        }
    }

    fn heliocentric(&self, body: CelestialBody, t: f64) -> Option<f64> {
        let el = planet_elements(body)?;
        let (lon, _) = heliocentric_vector(el, t).spherical();
        Some(lon + PRECESSION_PER_CENTURY * t)
    }
}

impl PositionProvider for MeanElementsProvider {
    fn get_position(
        &self,
        body: CelestialBody,
        frame: ReferenceFrame,
        instant: DateTime<Utc>,
    ) -> Result<Position, ProviderError> {
        if frame == ReferenceFrame::Heliocentric && planet_elements(body).is_none() {
            return Err(ProviderError::UnsupportedFrame { body, frame });
        }
        if instant < self.valid_from || instant > self.valid_to {
            return Err(ProviderError::EphemerisUnavailable { body, instant });
        }

        let t = centuries_since_j2000(instant);
        let angle = match frame {
            ReferenceFrame::Geocentric => self.geocentric(body, t).0,
            ReferenceFrame::Heliocentric => self
                .heliocentric(body, t)
                .ok_or(ProviderError::UnsupportedFrame { body, frame })?,
            ReferenceFrame::RightAscension => {
                let (lon, lat) = self.geocentric(body, t);
                right_ascension(lon, lat, t)
            }
        };
        Ok(Position::new(body, frame, instant, normalize_degrees(angle)))
    }

    fn name(&self) -> &str {
        "mean-elements"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::angle::separation;
    use crate::time::parse_instant;

    fn at(raw: &str) -> DateTime<Utc> {
        parse_instant(raw).unwrap()
    }

    fn geo(body: CelestialBody, raw: &str) -> f64 {
        MeanElementsProvider::new()
            .get_position(body, ReferenceFrame::Geocentric, at(raw))
            .unwrap()
            .angle_degrees
    }

    #[test]
    fn test_kepler_circular_orbit() {
        assert!((eccentric_anomaly(1.0, 0.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_kepler_satisfies_equation() {
        let e = 0.2;
        let m = 2.5_f64;
        let ecc = eccentric_anomaly(m, e);
        assert!((ecc - e * ecc.sin() - m).abs() < 1e-10);
    }

    #[test]
    fn test_sun_at_march_equinox() {
        // 2024 March equinox: 2024-03-20T03:06Z
        let lon = geo(CelestialBody::Sun, "2024-03-20T03:06:00Z");
        assert!(separation(lon, 0.0) < 0.5, "sun longitude at equinox: {lon}");
    }

    #[test]
    fn test_sun_at_june_solstice() {
        // 2024 June solstice: 2024-06-20T20:51Z
        let lon = geo(CelestialBody::Sun, "2024-06-20T20:51:00Z");
        assert!(separation(lon, 90.0) < 0.5, "sun longitude at solstice: {lon}");
    }

    #[test]
    fn test_new_and_full_moon() {
        // New moon 2024-01-11T11:57Z, full moon 2024-01-25T17:54Z
        let new_sep = separation(
            geo(CelestialBody::Sun, "2024-01-11T11:57:00Z"),
            geo(CelestialBody::Moon, "2024-01-11T11:57:00Z"),
        );
        let full_sep = separation(
            geo(CelestialBody::Sun, "2024-01-25T17:54:00Z"),
            geo(CelestialBody::Moon, "2024-01-25T17:54:00Z"),
        );
        assert!(new_sep < 1.5, "new moon separation {new_sep}");
        assert!(full_sep > 178.5, "full moon separation {full_sep}");
    }

    #[test]
    fn test_positions_normalized() {
        let provider = MeanElementsProvider::new();
        for body in CelestialBody::ALL {
            for frame in [ReferenceFrame::Geocentric, ReferenceFrame::RightAscension] {
                let p = provider.get_position(body, frame, at("2031-07-04")).unwrap();
                assert!((0.0..360.0).contains(&p.angle_degrees), "{body} {frame}: {}", p.angle_degrees);
            }
        }
    }

    #[test]
    fn test_heliocentric_frame_centre_unsupported() {
        let provider = MeanElementsProvider::new();
        for body in [CelestialBody::Sun, CelestialBody::Moon, CelestialBody::MeanNode] {
            let err = provider
                .get_position(body, ReferenceFrame::Heliocentric, at("2024-01-01"))
                .unwrap_err();
            assert!(matches!(err, ProviderError::UnsupportedFrame { .. }));
        }
        assert!(provider
            .get_position(CelestialBody::Mars, ReferenceFrame::Heliocentric, at("2024-01-01"))
            .is_ok());
    }

    #[test]
    fn test_outside_range_unavailable() {
        let provider = MeanElementsProvider::new();
        let err = provider
            .get_position(CelestialBody::Mars, ReferenceFrame::Geocentric, at("1700-06-01"))
            .unwrap_err();
        assert!(matches!(err, ProviderError::EphemerisUnavailable { .. }));
    }

    #[test]
    fn test_with_range_narrows() {
        let provider = MeanElementsProvider::new().with_range(at("2024-01-01"), at("2024-02-01"));
        assert!(provider
            .get_position(CelestialBody::Sun, ReferenceFrame::Geocentric, at("2024-03-01"))
            .is_err());
        assert!(provider
            .get_position(CelestialBody::Sun, ReferenceFrame::Geocentric, at("2024-01-15"))
            .is_ok());
    }

    #[test]
    fn test_right_ascension_near_longitude_at_equinox() {
        // At the equinox point RA and longitude coincide
        let provider = MeanElementsProvider::new();
        let ra = provider
            .get_position(CelestialBody::Sun, ReferenceFrame::RightAscension, at("2024-03-20T03:06:00Z"))
            .unwrap()
            .angle_degrees;
        assert!(separation(ra, 0.0) < 0.6, "ra {ra}");
    }

    #[test]
    fn test_deterministic() {
        let a = geo(CelestialBody::Jupiter, "2030-05-05");
        let b = geo(CelestialBody::Jupiter, "2030-05-05");
        assert_eq!(a, b);
    }
}
