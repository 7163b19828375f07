//! cdc-verify: captcha-guarded CDC record lookup, multi-strategy record parsing, and vessel enrichment.

pub mod cookies;
pub mod enrich;
pub mod flow;
pub mod html;
pub mod parser;
pub mod session;
pub mod transport;
pub mod types;

pub use cookies::CookieJar;
pub use enrich::{enrich, LookupTask, VesselDirectory, VesselFinderDirectory};
pub use flow::{SessionTicket, VerificationFlow};
pub use parser::{parse_details_page, parse_results_table};
pub use session::{SessionData, SessionStore};
pub use transport::{FetchRequest, HttpClient, HttpResponse};
pub use types::*;
