//! Agent access rules
//!
//! Which maturity ratings an account may enter and may select as its
//! preference, and how a server "region access blocked" notice should be
//! answered.

use crate::types::MaturityRating;
use serde::{Deserialize, Serialize};

/// Access attributes of the logged-in agent
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentAccess {
    /// Desired maximum rating
    pub preferred: MaturityRating,
    /// Teen accounts are limited to general regions
    #[serde(default)]
    pub teen: bool,
    /// Account is verified for adult content
    #[serde(default)]
    pub adult: bool,
    #[serde(default)]
    pub god_level: u8,
    #[serde(default)]
    pub admin_override: bool,
}

/// How to answer a teleport the server blocked for maturity reasons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum AccessDenial {
    /// The account can never enter; drop the request
    AdultsOnly,
    /// The preference is too low; offer to raise it and retry
    PromptIncrease { rating: MaturityRating },
    /// The preference already allows it, so client and server disagree
    OutOfSync,
    /// Not a maturity block
    None,
}

impl AgentAccess {
    pub fn new(preferred: MaturityRating) -> Self {
        Self {
            preferred,
            ..Default::default()
        }
    }

    pub fn is_godlike(&self) -> bool {
        self.admin_override || self.god_level > 0
    }

    pub fn prefers_pg(&self) -> bool {
        self.preferred <= MaturityRating::Pg
    }

    pub fn prefers_mature(&self) -> bool {
        self.preferred >= MaturityRating::Mature
    }

    pub fn prefers_adult(&self) -> bool {
        self.preferred >= MaturityRating::Adult
    }

    pub fn can_access_mature(&self) -> bool {
        !self.teen && (self.prefers_mature() || self.is_godlike())
    }

    pub fn can_access_adult(&self) -> bool {
        (self.adult && self.prefers_adult()) || self.is_godlike()
    }

    /// Whether a region with the given rating may be entered right now
    pub fn can_access_rating(&self, region: MaturityRating) -> bool {
        match region {
            MaturityRating::Mature => self.can_access_mature(),
            MaturityRating::Adult => self.can_access_adult(),
            _ => true,
        }
    }

    /// Whether the account may select `value` as its preference
    pub fn can_set_maturity(&self, value: MaturityRating) -> bool {
        if self.is_godlike() {
            return true;
        }
        match value {
            MaturityRating::Pg => true,
            MaturityRating::Mature => !self.teen,
            MaturityRating::Adult => !self.teen && self.adult,
            MaturityRating::Min | MaturityRating::Down => false,
        }
    }

    /// Classify a maturity block for a region of `region` rating
    pub fn classify_denial(&self, region: MaturityRating) -> AccessDenial {
        match region {
            MaturityRating::Mature if self.teen => AccessDenial::AdultsOnly,
            MaturityRating::Mature if self.prefers_pg() => {
                AccessDenial::PromptIncrease { rating: region }
            }
            MaturityRating::Adult if !self.adult => AccessDenial::AdultsOnly,
            MaturityRating::Adult if !self.prefers_adult() => {
                AccessDenial::PromptIncrease { rating: region }
            }
            MaturityRating::Mature | MaturityRating::Adult => AccessDenial::OutOfSync,
            _ => AccessDenial::None,
        }
    }
}
