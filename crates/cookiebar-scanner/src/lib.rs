//! Cookie scanner: collects the cookies a site sets and sorts them into
//! consent categories.
//!
//! Classification consults, in order: admin labels from earlier scans, the
//! built-in category registry, the Open Cookie Database and a table of
//! known tracker vendors.

pub mod fetch;
pub mod ocd;
pub mod patterns;
pub mod scanner;
pub mod types;

pub use fetch::fetch_site_cookies;
pub use ocd::{OcdEntry, OpenCookieDatabase, StoredOcd};
pub use patterns::{match_vendor, VendorPattern};
pub use scanner::{bulk_categorize, categorize, classify, scan};
pub use types::*;
