pub mod gateway;
pub mod index;
pub mod provider;
pub mod static_provider;

pub use gateway::{GatewayReportIndex, GatewaySearchClient};
pub use index::{InMemoryReportIndex, IndexError, IndexHit, ReportIndex};
pub use provider::{SearchError, SearchProvider};
pub use static_provider::StaticSearchProvider;
