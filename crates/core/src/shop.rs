//! Partner shop reference data and the directory that serves it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LookupError;

/// Listing tier of a partner shop. Partners are shown before regular shops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShopPriority {
    Partner,
    Regular,
}

impl std::str::FromStr for ShopPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "partner" => Ok(ShopPriority::Partner),
            "regular" | "standard" => Ok(ShopPriority::Regular),
            other => Err(format!("unknown shop priority '{other}'")),
        }
    }
}

/// A laundry shop that can be recommended to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartnerShop {
    pub name: String,
    pub zipcode: String,
    pub priority: ShopPriority,
    pub rating: f32,
    #[serde(default)]
    pub specialties: Vec<String>,
    #[serde(default = "default_subscription_status")]
    pub subscription_status: String,
}

fn default_subscription_status() -> String {
    "active".into()
}

impl PartnerShop {
    /// Display ordering: partners first, then higher rating, then name.
    pub fn display_order(a: &PartnerShop, b: &PartnerShop) -> std::cmp::Ordering {
        a.priority
            .cmp(&b.priority)
            .then_with(|| b.rating.total_cmp(&a.rating))
            .then_with(|| a.name.cmp(&b.name))
    }
}

#[async_trait]
pub trait ShopDirectory: Send + Sync {
    fn name(&self) -> &str;

    /// Candidate shops for a location key (a zipcode). Empty key → no shops.
    async fn find_by_location(&self, location: &str) -> Result<Vec<PartnerShop>, LookupError>;
}
