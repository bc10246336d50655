//! The staged analytical pipeline: decompose a question, synthesise and
//! validate SQL, fetch and reduce the data, then write the report.

pub mod fetch_data;
pub mod generate_sql;
pub mod orchestrator;
pub mod registry;
pub mod report;
pub mod split_query;
pub mod state;

pub use fetch_data::FetchData;
pub use generate_sql::GenerateSql;
pub use orchestrator::Orchestrator;
pub use registry::{Descriptor, Subgraph, SubgraphKind};
pub use report::ReportGenerator;
pub use split_query::SplitQuery;
pub use state::{HistoryEntry, Outcome, PipelineState};
