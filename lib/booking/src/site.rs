//! Booking site addressing.
//!
//! The site serves one booking page per resource. Without a `pass` parameter
//! it is the login entry point; with one it is the reservation form for that
//! pass on the requested date.

use crate::error::SiteError;
use passbook_core::BookingRequest;
use reqwest::Url;

/// URLs and host checks for a booking site.
pub trait SiteClient: Send + Sync {
    /// The page that starts the login flow for `request`.
    fn booking_entry_url(&self, request: &BookingRequest) -> String;

    /// The reservation form for `request`.
    fn booking_url(&self, request: &BookingRequest) -> String;

    /// Whether `url` is on the site's own host.
    fn is_site_url(&self, url: &str) -> bool;
}

/// A LibCal passes site such as `https://rooms.kcls.org`.
#[derive(Debug, Clone)]
pub struct LibCalSite {
    base: Url,
    host: String,
}

impl LibCalSite {
    /// The default site.
    pub const DEFAULT_BASE_URL: &'static str = "https://rooms.kcls.org";

    /// Creates a site rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL does not parse or has no host.
    pub fn new(base_url: &str) -> Result<Self, SiteError> {
        let base = Url::parse(base_url).map_err(|e| SiteError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        let host = base
            .host_str()
            .ok_or_else(|| SiteError::InvalidBaseUrl {
                url: base_url.to_string(),
                reason: "no host".to_string(),
            })?
            .to_ascii_lowercase();
        Ok(Self { base, host })
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    fn book_page(&self, request: &BookingRequest) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["passes", request.resource_id.as_str(), "book"]);
        }
        url.query_pairs_mut()
            .append_pair("digital", bool_param(request.digital))
            .append_pair("physical", bool_param(request.physical))
            .append_pair("location", &request.location)
            .append_pair("date", &request.target_date.format("%Y-%m-%d").to_string());
        url
    }
}

fn bool_param(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

impl SiteClient for LibCalSite {
    fn booking_entry_url(&self, request: &BookingRequest) -> String {
        self.book_page(request).into()
    }

    fn booking_url(&self, request: &BookingRequest) -> String {
        let mut url = self.book_page(request);
        url.query_pairs_mut().append_pair("pass", &request.pass_id);
        url.into()
    }

    fn is_site_url(&self, url: &str) -> bool {
        Url::parse(url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_ascii_lowercase))
            .is_some_and(|host| host == self.host)
    }
}
