//! End-to-end CardComply operations: card fetch + enrichment, and
//! answer-map rendering into a stored compliance report.

pub mod pipeline;

pub use pipeline::{
    CardClient, CardConfig, CardFetchResult, RenderConfig, RenderedReport, render_report,
};
