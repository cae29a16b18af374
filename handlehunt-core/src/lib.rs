pub mod config;
pub mod data;
pub mod engine;
pub mod progress;
pub mod report;
pub mod store;
pub mod tracker;

pub use config::EngineConfig;
pub use data::Database;
pub use engine::{EngineError, ScanEngine, ScanOptions, ScanOutcome, ScanRequest};
pub use progress::{ProgressEvent, ProgressHub, ProgressSink, SinkError, Subscription};
pub use store::{Correlation, ResultStore, StoreError};
pub use tracker::{Admission, SearchTask, TaskState, TaskTracker};

pub fn print_banner() {
    println!(
        r#"
  _                 _ _      _                 _
 | |__   __ _ _ __ | | | ___| |__  _   _ _ __ | |_
 | '_ \ / _` | '_ \| | |/ _ \ '_ \| | | | '_ \| __|
 | | | | (_| | | | | | |  __/ | | | |_| | | | | |_
 |_| |_|\__,_|_| |_|_|_|\___|_| |_|\__,_|_| |_|\__|  v{}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
