//! Response shapes: bundles, navigation links and error outcomes.

pub mod bundle;
pub mod error;

pub use bundle::{
    Bundle, BundleAssembler, BundleEntry, BundleEntryResponse, BundleEntrySearch, BundleKind,
    BundleLink, SearchEntryMode, build_search_links, filter_params, parse_link_params,
};
pub use error::{ApiError, OperationOutcome, OperationOutcomeIssue};
