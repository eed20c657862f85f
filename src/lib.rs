//! Client for AltStore-style app source catalogs.
//!
//! A [`SourceFetcher`] retrieves a source document over HTTP (or takes bytes
//! already read from a file), decodes it into a [`Catalog`] and publishes the
//! result as its current catalog for any number of subscribers.

pub mod codec;
pub mod error;
pub mod fetcher;
pub mod models;
pub mod normalize;
pub mod state;
pub mod transport;

pub use codec::{
    decode_catalog, decode_catalog_with, encode_catalog, DecodeError, DecodeOptions,
    EmptyVersionsPolicy,
};
pub use error::{FetchError, TransportFailure};
pub use fetcher::{parse_source_url, SourceFetcher, SourceLocation};
pub use models::{
    App, AppPermissions, AppVersion, Catalog, DetailedScreenshot, NewsItem, PrivacyPermission,
    Screenshot,
};
pub use state::{CatalogState, CatalogSubscription};
pub use transport::{
    HttpTransport, Transport, TransportConfig, TransportError, TransportResponse,
};
