use std::collections::BTreeMap;

use crate::pricing::models::{
    CostBreakdown, CostCalculation, CostRequest, ModelPricing, PricingComponent, ResolvedModel,
};

/// Price a usage vector against an effective pricing record.
///
/// A component contributes `count * price` only when its count is positive and
/// a price exists. Every component with a positive count gets a source entry,
/// `unknown` when it has no price. Prices are per unit, no rounding is applied.
/// The result carries the record's fetch stamp unless the record is a placeholder.
pub fn calculate(
    request: &CostRequest,
    resolved: &ResolvedModel,
    pricing: &ModelPricing,
) -> CostCalculation {
    let mut costs = CostBreakdown::default();
    let mut sources = BTreeMap::new();

    for component in PricingComponent::ALL {
        let count = request.count(component);
        if count <= 0 {
            continue;
        }
        if let Some(price) = pricing.prices.price(component) {
            costs.set(component, count as f64 * price);
        }
        sources.insert(component, pricing.prices.source(component));
    }

    let total_cost = costs.total();
    let (pricing_fetched_at, pricing_version) = if !pricing.synthesized {
        (Some(pricing.fetched_at), pricing.provider_version.clone())
    } else {
        (None, None)
    };

    CostCalculation {
        usage: request.clone(),
        canonical_model: resolved.canonical_model.clone(),
        provider: resolved.provider.clone(),
        costs,
        total_cost,
        sources,
        pricing_fetched_at,
        pricing_version,
    }
}

/// Calculation for a model no source knows anything about.
pub fn zero_cost(request: &CostRequest, resolved: &ResolvedModel) -> CostCalculation {
    CostCalculation {
        usage: request.clone(),
        canonical_model: resolved.canonical_model.clone(),
        provider: resolved.provider.clone(),
        costs: CostBreakdown::default(),
        total_cost: 0.0,
        sources: BTreeMap::new(),
        pricing_fetched_at: None,
        pricing_version: None,
    }
}
