//! Static model catalogs and USD pricing
//!
//! Each adapter publishes one [`ModelCatalog`]: the models it knows about,
//! their context windows, and their price per million input/output tokens.
//! The catalog doubles as the adapter's pricing table.

use crate::protocol::types::{Cost, ModelDescriptor};

/// Price per million tokens, in USD
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl ModelPricing {
    pub const FREE: ModelPricing = ModelPricing::new(0.0, 0.0);

    pub const fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
        }
    }

    /// `input/1e6 * price_in + output/1e6 * price_out`
    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> Cost {
        let input = input_tokens as f64 / 1_000_000.0 * self.input_per_million;
        let output = output_tokens as f64 / 1_000_000.0 * self.output_per_million;
        Cost::new(input.max(0.0), output.max(0.0))
    }
}

/// One catalog row
#[derive(Debug, Clone, Copy)]
pub struct CatalogEntry {
    pub id: &'static str,
    pub display_name: &'static str,
    pub description: Option<&'static str>,
    pub context_window: Option<u32>,
    pub pricing: ModelPricing,
    pub deprecated: bool,
}

impl CatalogEntry {
    pub const fn new(
        id: &'static str,
        display_name: &'static str,
        context_window: u32,
        pricing: ModelPricing,
    ) -> Self {
        Self {
            id,
            display_name,
            description: None,
            context_window: Some(context_window),
            pricing,
            deprecated: false,
        }
    }

    pub const fn describe(mut self, description: &'static str) -> Self {
        self.description = Some(description);
        self
    }

    pub const fn deprecated(mut self) -> Self {
        self.deprecated = true;
        self
    }

    pub fn descriptor(&self) -> ModelDescriptor {
        ModelDescriptor {
            id: self.id.to_string(),
            display_name: self.display_name.to_string(),
            description: self.description.map(str::to_string),
            context_window: self.context_window,
            input_price_per_million: self.pricing.input_per_million,
            output_price_per_million: self.pricing.output_per_million,
            deprecated: self.deprecated,
        }
    }
}

/// An adapter's static model catalog
#[derive(Debug)]
pub struct ModelCatalog {
    /// Model used when neither the request nor the configuration names one
    pub default_model: &'static str,
    pub entries: &'static [CatalogEntry],
}

impl ModelCatalog {
    /// Look up an entry by exact id, then by longest catalog id that
    /// prefixes `model` (dated snapshots such as `gpt-4o-2024-08-06`).
    pub fn entry(&self, model: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.id == model).or_else(|| {
            self.entries
                .iter()
                .filter(|e| model.starts_with(e.id))
                .max_by_key(|e| e.id.len())
        })
    }

    pub fn pricing(&self, model: &str) -> Option<ModelPricing> {
        self.entry(model).map(|e| e.pricing)
    }

    /// Pricing of the catalog's own default model
    pub fn default_pricing(&self) -> ModelPricing {
        self.pricing(self.default_model)
            .unwrap_or(ModelPricing::FREE)
    }

    pub fn descriptors(&self) -> Vec<ModelDescriptor> {
        self.entries.iter().map(CatalogEntry::descriptor).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static TEST_CATALOG: ModelCatalog = ModelCatalog {
        default_model: "small",
        entries: &[
            CatalogEntry::new("small", "Small", 8_000, ModelPricing::new(1.0, 2.0)),
            CatalogEntry::new("small-plus", "Small Plus", 8_000, ModelPricing::new(3.0, 4.0)),
            CatalogEntry::new("legacy", "Legacy", 4_000, ModelPricing::new(10.0, 20.0))
                .describe("old")
                .deprecated(),
        ],
    };

    #[test]
    fn test_cost_formula() {
        let cost = ModelPricing::new(0.80, 4.00).cost(1_000, 500);
        assert!((cost.input_usd - 0.0008).abs() < 1e-12);
        assert!((cost.output_usd - 0.002).abs() < 1e-12);
        assert!((cost.total_usd - 0.0028).abs() < 1e-12);
    }

    #[test]
    fn test_exact_and_prefix_lookup() {
        assert_eq!(TEST_CATALOG.entry("small").unwrap().id, "small");
        assert_eq!(TEST_CATALOG.entry("small-plus-2024").unwrap().id, "small-plus");
        assert_eq!(TEST_CATALOG.entry("small-2024").unwrap().id, "small");
        assert!(TEST_CATALOG.entry("unknown").is_none());
    }

    #[test]
    fn test_descriptors() {
        let descriptors = TEST_CATALOG.descriptors();
        assert_eq!(descriptors.len(), 3);
        let legacy = &descriptors[2];
        assert!(legacy.deprecated);
        assert_eq!(legacy.description.as_deref(), Some("old"));
        assert_eq!(legacy.context_window, Some(4_000));
        assert_eq!(TEST_CATALOG.default_pricing(), ModelPricing::new(1.0, 2.0));
    }
}
