//! The exploration engine: element discovery, selection, multi-strategy
//! interaction execution, navigation tracking, and the bounded loop that
//! ties them together and emits a test plan.

pub mod discovery;
pub mod element;
pub mod executor;
pub mod oracle;
pub mod orchestrator;
pub mod plan;
pub mod selector;
pub mod tracker;
pub mod urls;

pub use element::{BoundingBox, ElementKind, InteractionKey, InteractiveElement};
pub use orchestrator::{ExploreOutcome, Explorer};
pub use plan::{TestPlan, TestStep};
