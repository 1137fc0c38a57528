//! Partner shop recommendation policy.
//!
//! [`RecommendationEvaluator::should_recommend`] is a pure predicate. Rules
//! are OR-ed and checked in order; the first hit wins:
//!
//! 1. a reported success rate strictly between 0 and the threshold (60)
//! 2. a premium fabric is mentioned
//! 3. the stain is described as old
//! 4. the user asks about professional cleaning
//!
//! Keyword matching is case-insensitive substring search, so "울" also hits
//! inside longer words. Keyword lists come from configuration.

use std::sync::Arc;

use cleaners_config::RecommendationConfig;
use cleaners_core::error::LookupError;
use cleaners_core::shop::{PartnerShop, ShopDirectory};
use tracing::debug;

/// Which rule fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecommendationReason {
    LowSuccessRate,
    PremiumFabric,
    StaleStain,
    ProfessionalServiceAsked,
}

/// Keyword lists, stored lowercased.
#[derive(Debug, Clone)]
pub struct KeywordRules {
    pub success_rate_threshold: i32,
    pub premium_fabrics: Vec<String>,
    pub stale_stain_phrases: Vec<String>,
    pub professional_phrases: Vec<String>,
}

fn lowercased(items: &[String]) -> Vec<String> {
    items
        .iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

impl KeywordRules {
    pub fn from_config(config: &RecommendationConfig) -> Self {
        Self {
            success_rate_threshold: config.success_rate_threshold,
            premium_fabrics: lowercased(&config.premium_fabrics),
            stale_stain_phrases: lowercased(&config.stale_stain_phrases),
            professional_phrases: lowercased(&config.professional_phrases),
        }
    }
}

impl Default for KeywordRules {
    fn default() -> Self {
        Self::from_config(&RecommendationConfig::default())
    }
}

pub struct RecommendationEvaluator {
    rules: KeywordRules,
    directory: Arc<dyn ShopDirectory>,
}

impl RecommendationEvaluator {
    /// Evaluator with the built-in keyword lists.
    pub fn new(directory: Arc<dyn ShopDirectory>) -> Self {
        Self {
            rules: KeywordRules::default(),
            directory,
        }
    }

    pub fn with_rules(mut self, rules: KeywordRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn rules(&self) -> &KeywordRules {
        &self.rules
    }

    /// The first rule that matches, if any.
    pub fn reason(&self, message: &str, success_rate: Option<i32>) -> Option<RecommendationReason> {
        if let Some(rate) = success_rate {
            if rate > 0 && rate < self.rules.success_rate_threshold {
                return Some(RecommendationReason::LowSuccessRate);
            }
        }

        let text = message.to_lowercase();
        let mentions = |words: &[String]| words.iter().any(|w| text.contains(w.as_str()));

        if mentions(&self.rules.premium_fabrics) {
            Some(RecommendationReason::PremiumFabric)
        } else if mentions(&self.rules.stale_stain_phrases) {
            Some(RecommendationReason::StaleStain)
        } else if mentions(&self.rules.professional_phrases) {
            Some(RecommendationReason::ProfessionalServiceAsked)
        } else {
            None
        }
    }

    pub fn should_recommend(&self, message: &str, success_rate: Option<i32>) -> bool {
        let reason = self.reason(message, success_rate);
        if let Some(reason) = reason {
            debug!(?reason, "Recommendation triggered");
        }
        reason.is_some()
    }

    /// Candidate shops near `location`; an empty key yields none.
    pub async fn get_shops_by_location(
        &self,
        location: &str,
    ) -> Result<Vec<PartnerShop>, LookupError> {
        let location = location.trim();
        if location.is_empty() {
            return Ok(Vec::new());
        }
        self.directory.find_by_location(location).await
    }
}
