//! Hybrid query routing
//!
//! Requests are answered from curated templates when one matches and from a
//! generated statement otherwise. Both paths pass the same guardrail before
//! the read-only executor runs anything.

pub mod guardrail;
mod prompt;
mod router;
mod service;
pub mod template;
pub mod time_range;

pub use guardrail::{ApprovedQuery, GuardrailValidator, GuardrailViolation};
pub use prompt::QueryPromptBuilder;
pub use router::{GeneratedQuery, QueryRouter};
pub use service::QueryService;
pub use template::{default_templates, ParamDef, ParamType, QueryTemplate, TemplateDef};
pub use time_range::{RelativeRange, TimeRange, TimeResolver};
