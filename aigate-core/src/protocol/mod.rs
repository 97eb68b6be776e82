//! Protocol module for gateway request/response structures
//!
//! This module defines the canonical data models callers exchange with the
//! gateway. These structures are:
//! - Provider-agnostic
//! - Serializable for the application boundary
//! - Immutable once handed to the gateway

pub mod types;

pub use types::{
    BudgetTier, Capability, ChatRequest, ChatResponse, EmbeddingRequest, EmbeddingResponse,
    Envelope, ErrorBody, Message, MessageRole, RequestContext, Role, Sensitivity, TenantId,
};
