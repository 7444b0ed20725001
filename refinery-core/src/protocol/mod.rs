//! Protocol types shared by every provider
//!
//! Requests, responses, model descriptors and cost estimates. Adapters
//! translate these to and from their backend's native format.

pub mod types;

pub use types::{
    Cost, CostBreakdown, CostEstimate, LlmRequest, LlmResponse, ModelDescriptor, TokenUsage,
};
