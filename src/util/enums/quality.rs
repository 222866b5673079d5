use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use crate::util::Error;

/// Spectrum quality as understood by WISeREP
#[derive(
    Debug,
    Default,
    Eq,
    PartialEq,
    Copy,
    Clone,
    IntoPrimitive,
    TryFromPrimitive,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[repr(u8)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Low = 1,
    #[default]
    Medium = 2,
    High = 3,
}

impl Quality {
    /// The `qualityid` field of a spectrum report
    pub fn report_id(self) -> String {
        u8::from(self).to_string()
    }
}

impl FromStr for Quality {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Quality::Low),
            "medium" => Ok(Quality::Medium),
            "high" => Ok(Quality::High),
            _ => Err(Error::malformed("spectrum quality", s)),
        }
    }
}

impl Display for Quality {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Quality::Low => "low",
            Quality::Medium => "medium",
            Quality::High => "high",
        })
    }
}
