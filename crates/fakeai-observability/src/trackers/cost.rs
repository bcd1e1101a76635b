//! Per-api-key cost accumulation using a static model-price table, plus
//! budget threshold checks.

use dashmap::DashMap;

/// `(input_per_1k, output_per_1k, cached_discount)` in USD. `cached_discount`
/// is the fraction of the input price charged for cache-hit tokens.
#[derive(Debug, Clone, Copy)]
pub struct ModelPrice {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
    pub cached_discount: f64,
}

impl Default for ModelPrice {
    fn default() -> Self {
        Self { input_per_1k: 0.005, output_per_1k: 0.015, cached_discount: 0.5 }
    }
}

fn price_table() -> &'static [(&'static str, ModelPrice)] {
    &[
        ("gpt-4o", ModelPrice { input_per_1k: 0.0025, output_per_1k: 0.010, cached_discount: 0.5 }),
        ("gpt-4", ModelPrice { input_per_1k: 0.03, output_per_1k: 0.06, cached_discount: 0.5 }),
        ("gpt-3.5", ModelPrice { input_per_1k: 0.0005, output_per_1k: 0.0015, cached_discount: 0.5 }),
    ]
}

fn price_for(model: &str) -> ModelPrice {
    price_table()
        .iter()
        .find(|(prefix, _)| model.starts_with(prefix))
        .map(|(_, price)| *price)
        .unwrap_or_default()
}

#[derive(Debug, Clone, Default)]
struct KeyLedger {
    total_cost_usd: f64,
    budget_usd: Option<f64>,
}

#[derive(Default)]
pub struct CostTracker {
    ledgers: DashMap<String, KeyLedger>,
}

#[derive(Debug, Clone, Copy)]
pub struct CostOutcome {
    pub cost_usd: f64,
    pub total_cost_usd: f64,
    pub budget_exceeded: bool,
}

impl CostTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_budget(&self, api_key: &str, budget_usd: f64) {
        self.ledgers.entry(api_key.to_string()).or_default().budget_usd = Some(budget_usd);
    }

    pub fn record_usage(&self, api_key: &str, model: &str, prompt_tokens: u32, completion_tokens: u32, cached_tokens: u32) -> CostOutcome {
        let price = price_for(model);
        let billable_input = prompt_tokens.saturating_sub(cached_tokens) as f64;
        let cached_input = cached_tokens as f64;

        let cost_usd = (billable_input / 1000.0) * price.input_per_1k
            + (cached_input / 1000.0) * price.input_per_1k * price.cached_discount
            + (completion_tokens as f64 / 1000.0) * price.output_per_1k;

        let mut ledger = self.ledgers.entry(api_key.to_string()).or_default();
        ledger.total_cost_usd += cost_usd;
        let budget_exceeded = ledger.budget_usd.is_some_and(|budget| ledger.total_cost_usd > budget);

        CostOutcome { cost_usd, total_cost_usd: ledger.total_cost_usd, budget_exceeded }
    }

    pub fn total_cost(&self, api_key: &str) -> f64 {
        self.ledgers.get(api_key).map(|l| l.total_cost_usd).unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cached_tokens_get_a_discount() {
        let tracker = CostTracker::new();
        let full_price = tracker.record_usage("sk-a", "gpt-4", 1000, 0, 0);
        let tracker2 = CostTracker::new();
        let discounted = tracker2.record_usage("sk-b", "gpt-4", 1000, 0, 1000);
        assert!(discounted.cost_usd < full_price.cost_usd);
    }

    #[test]
    fn budget_threshold_is_flagged() {
        let tracker = CostTracker::new();
        tracker.set_budget("sk-a", 0.01);
        let outcome = tracker.record_usage("sk-a", "gpt-4", 100_000, 0, 0);
        assert!(outcome.budget_exceeded);
    }

    #[test]
    fn unknown_model_falls_back_to_default_price() {
        let tracker = CostTracker::new();
        let outcome = tracker.record_usage("sk-a", "some-custom-model", 1000, 1000, 0);
        assert!(outcome.cost_usd > 0.0);
    }
}
