pub mod baits;
pub mod consistency;
pub mod dsl;
pub mod engine;
pub mod search;

pub use baits::{BaitListing, BaitSummary};
pub use consistency::{MismatchKind, ReciprocalMismatch, ReciprocalReport};
pub use dsl::{BaitsRequest, QueryValidationError, SearchRequest};
pub use engine::{QueryEngine, QueryError};
pub use search::{InteractionHit, SearchResults};
