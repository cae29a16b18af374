pub mod handlers;

// Re-export commonly used handler functions for convenience
pub use handlers::{
    CatalogOrigin, catalog_source, create_database, expand_path, group_catalog, load_catalog, open_database,
    progress_sink,
};
