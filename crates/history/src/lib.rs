//! # nowcast-history
//!
//! Record types produced by the forecaster and the news engine, and the
//! append-only tables that accumulate them across vintages.
//!
//! ## Appending
//!
//! ```mermaid
//! graph LR
//!     A["Vec of NowcastRecord / NewsRecord (one vintage)"] -->|".append(batch)?"| B["History"]
//!     B -->|"same (quarter, date) already present"| C["old rows replaced"]
//!     B -->|".final_by_quarter()"| D["latest nowcast per quarter"]
//! ```
//!
//! Every batch belongs to exactly one `(quarter, date)` key. Appending a
//! batch whose key already exists supersedes the stored rows instead of
//! duplicating them, so re-running a vintage is idempotent.

mod error;
mod record;
mod table;

pub use error::HistoryError;
pub use record::{NewsRecord, NowcastRecord, UpdateKind};
pub use table::{AppendSummary, History, NewsHistory, NowcastHistory, Record};
