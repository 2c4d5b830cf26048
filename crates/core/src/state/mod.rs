pub mod analysis;
pub mod db;

pub use analysis::{
    AnalysisStatus, AnalysisStore, AnalysisStoreError, PersistedAnalysis, SqliteAnalysisStore,
};
pub use db::AnalysisDb;
