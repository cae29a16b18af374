pub mod catalog;
pub mod error;
pub mod prober;
pub mod site;

pub use catalog::{CatalogSource, FileCatalog, RemoteCatalog};
pub use error::ScanError;
pub use prober::{HttpProber, ProbeFailure, ProbeOutcome, SiteProber};
pub use site::SiteDefinition;
