use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A body whose position the engine can project.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CelestialBody {
    Sun,
    Moon,
    Mercury,
    Venus,
    Mars,
    Jupiter,
    Saturn,
    Uranus,
    Neptune,
    Pluto,
    /// Mean ascending lunar node.
    #[serde(rename = "node", alias = "meannode")]
    MeanNode,
}

impl CelestialBody {
    pub const ALL: [CelestialBody; 11] = [
        CelestialBody::Sun,
        CelestialBody::Moon,
        CelestialBody::Mercury,
        CelestialBody::Venus,
        CelestialBody::Mars,
        CelestialBody::Jupiter,
        CelestialBody::Saturn,
        CelestialBody::Uranus,
        CelestialBody::Neptune,
        CelestialBody::Pluto,
        CelestialBody::MeanNode,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CelestialBody::Sun => "Sun",
            CelestialBody::Moon => "Moon",
            CelestialBody::Mercury => "Mercury",
            CelestialBody::Venus => "Venus",
            CelestialBody::Mars => "Mars",
            CelestialBody::Jupiter => "Jupiter",
            CelestialBody::Saturn => "Saturn",
            CelestialBody::Uranus => "Uranus",
            CelestialBody::Neptune => "Neptune",
            CelestialBody::Pluto => "Pluto",
            CelestialBody::MeanNode => "Node",
        }
    }
}

impl fmt::Display for CelestialBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CelestialBody {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let body = match lower.as_str() {
            "sun" => CelestialBody::Sun,
            "moon" => CelestialBody::Moon,
            "mercury" => CelestialBody::Mercury,
            "venus" => CelestialBody::Venus,
            "mars" => CelestialBody::Mars,
            "jupiter" => CelestialBody::Jupiter,
            "saturn" => CelestialBody::Saturn,
            "uranus" => CelestialBody::Uranus,
            "neptune" => CelestialBody::Neptune,
            "pluto" => CelestialBody::Pluto,
            "node" | "meannode" | "mean-node" | "rahu" => CelestialBody::MeanNode,
            _ => return Err(format!("unknown celestial body '{s}'")),
        };
        Ok(body)
    }
}

/// How a position query is interpreted by the provider.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReferenceFrame {
    /// Ecliptic longitude as seen from Earth.
    #[default]
    #[serde(alias = "geo")]
    Geocentric,
    /// Ecliptic longitude as seen from the Sun.
    #[serde(alias = "helio")]
    Heliocentric,
    /// Geocentric right ascension, in degrees.
    #[serde(alias = "ra")]
    RightAscension,
}

impl ReferenceFrame {
    pub fn as_str(self) -> &'static str {
        match self {
            ReferenceFrame::Geocentric => "geocentric",
            ReferenceFrame::Heliocentric => "heliocentric",
            ReferenceFrame::RightAscension => "right-ascension",
        }
    }
}

impl fmt::Display for ReferenceFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReferenceFrame {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "geo" | "geocentric" => Ok(ReferenceFrame::Geocentric),
            "helio" | "heliocentric" => Ok(ReferenceFrame::Heliocentric),
            "ra" | "right-ascension" | "rightascension" => Ok(ReferenceFrame::RightAscension),
            _ => Err(format!("unknown reference frame '{s}'")),
        }
    }
}

/// Two distinct bodies whose angular separation is tracked.
///
/// Stored in canonical order (`a < b` by body order), so `moon-sun` and
/// `sun-moon` are the same pair and both display as `Sun-Moon`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BodyPair {
    pub a: CelestialBody,
    pub b: CelestialBody,
}

impl BodyPair {
    pub fn new(a: CelestialBody, b: CelestialBody) -> Result<Self, String> {
        if a == b {
            return Err(format!("a body pair needs two different bodies, got {a} twice"));
        }
        Ok(Self {
            a: a.min(b),
            b: a.max(b),
        })
    }

    pub fn contains(&self, body: CelestialBody) -> bool {
        self.a == body || self.b == body
    }
}

impl fmt::Display for BodyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.a, self.b)
    }
}

impl FromStr for BodyPair {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(['-', '/', ':', ',']).filter(|p| !p.trim().is_empty());
        let (Some(a), Some(b), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(format!("expected a pair like 'sun-moon', got '{s}'"));
        };
        BodyPair::new(a.parse()?, b.parse()?)
    }
}

impl TryFrom<String> for BodyPair {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BodyPair> for String {
    fn from(pair: BodyPair) -> Self {
        pair.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_parse_case_insensitive() {
        assert_eq!("SUN".parse::<CelestialBody>().unwrap(), CelestialBody::Sun);
        assert_eq!(" moon ".parse::<CelestialBody>().unwrap(), CelestialBody::Moon);
        assert_eq!("rahu".parse::<CelestialBody>().unwrap(), CelestialBody::MeanNode);
        assert!("vulcan".parse::<CelestialBody>().is_err());
    }

    #[test]
    fn test_frame_aliases() {
        assert_eq!("geo".parse::<ReferenceFrame>().unwrap(), ReferenceFrame::Geocentric);
        assert_eq!("Helio".parse::<ReferenceFrame>().unwrap(), ReferenceFrame::Heliocentric);
        assert_eq!("ra".parse::<ReferenceFrame>().unwrap(), ReferenceFrame::RightAscension);
    }

    #[test]
    fn test_pair_separators() {
        for raw in ["sun-moon", "Sun/Moon", "sun:moon", "sun,moon"] {
            let pair: BodyPair = raw.parse().unwrap();
            assert_eq!(pair.a, CelestialBody::Sun);
            assert_eq!(pair.b, CelestialBody::Moon);
        }
    }

    #[test]
    fn test_pair_canonical_order() {
        let forward: BodyPair = "sun-moon".parse().unwrap();
        let reversed: BodyPair = "moon-sun".parse().unwrap();
        assert_eq!(forward, reversed);
        assert_eq!(reversed.to_string(), "Sun-Moon");
        assert_eq!(
            BodyPair::new(CelestialBody::Saturn, CelestialBody::Mars).unwrap().a,
            CelestialBody::Mars
        );
    }

    #[test]
    fn test_pair_rejects_same_body() {
        assert!("mars-mars".parse::<BodyPair>().is_err());
        assert!("mars".parse::<BodyPair>().is_err());
        assert!("sun-moon-mars".parse::<BodyPair>().is_err());
    }

    #[test]
    fn test_pair_serde_as_string() {
        let pair: BodyPair = "jupiter-saturn".parse().unwrap();
        let json = serde_json::to_string(&pair).unwrap();
        assert_eq!(json, "\"Jupiter-Saturn\"");
        let back: BodyPair = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pair);
    }

    #[test]
    fn test_frame_serde_alias() {
        let frame: ReferenceFrame = serde_json::from_str("\"helio\"").unwrap();
        assert_eq!(frame, ReferenceFrame::Heliocentric);
        assert_eq!(
            serde_json::to_string(&ReferenceFrame::RightAscension).unwrap(),
            "\"right-ascension\""
        );
    }
}
