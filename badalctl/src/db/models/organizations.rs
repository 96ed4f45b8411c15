//! Database models for the two organization directories.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

use crate::types::OrgId;

/// Canonical organization-type classification.
///
/// Both directories validate against this list at the boundary; free-text
/// classifications are not accepted anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrgType {
    Ngo,
    Government,
    Academic,
    Community,
    Other,
}

impl fmt::Display for OrgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrgType::Ngo => "ngo",
            OrgType::Government => "government",
            OrgType::Academic => "academic",
            OrgType::Community => "community",
            OrgType::Other => "other",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for OrgType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ngo" => Ok(OrgType::Ngo),
            "government" => Ok(OrgType::Government),
            "academic" => Ok(OrgType::Academic),
            "community" => Ok(OrgType::Community),
            "other" => Ok(OrgType::Other),
            _ => Err(format!("unknown organization type: {s}")),
        }
    }
}

/// Database entity model, identical shape for both directories.
#[derive(Debug, Clone, FromRow)]
pub struct Organization {
    pub id: OrgId,
    pub name: String,
    pub org_type: OrgType,
    pub website: Option<String>,
    pub created_at: DateTime<Utc>,
}
