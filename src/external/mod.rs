//! External Resolvers (C8): Identity, Fee, Risk adapters (spec §6 "External
//! collaborator interfaces"). Modeled as plain async trait objects — no
//! example repo in the pack ships third-party resolver adapters verbatim,
//! and the teacher already expresses internal services as plain structs
//! with async methods rather than trait objects, so traits are introduced
//! here only at this true external seam (SPEC_FULL §4.7).

pub mod fee;
pub mod identity;
pub mod risk;

pub use fee::{FeeRates, FeeResolver, StaticFeeResolver};
pub use identity::{IdentityResolver, JwtIdentityResolver, MockIdentityResolver, ResolvedUser};
pub use risk::{AllowAllRiskResolver, RiskDecision, RiskResolver};
