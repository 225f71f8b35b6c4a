//! clinigraph-kg — Entity resolution and incremental graph merging.
//!
//! Pure core: `similarity`, `scoring`, `resolve`, `merge`, `annotate`.
//! Around it: the store seam, extraction seams, export and the session driver.

pub mod similarity;
pub mod scoring;
pub mod resolve;
pub mod merge;
pub mod annotate;
pub mod repository;
pub mod extraction;
pub mod export;
pub mod session;

pub use annotate::{annotate, annotate_records, build_context, count_mentions};
pub use export::{export_frontend_graph, FrontendGraph};
pub use extraction::{parse_graph_batch, GraphExtractor, NodeSummarizer, SummaryRequest};
pub use merge::{GraphMerger, GraphView, MergePlan, SkipReason, SkippedRecord};
pub use repository::{apply_plan, ApplyReport, GraphStore, InMemoryGraphStore};
pub use resolve::{EntityIndex, EntityResolver, MatchKind, Resolution};
pub use scoring::compute_size;
pub use session::{GraphSession, TurnOutcome};
pub use similarity::is_similar;
