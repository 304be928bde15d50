//! Signal shapes supplied by host collaborators
//!
//! The collector does not derive these itself. Identity generation, device
//! classification and traffic-source heuristics live with the host; it hands
//! over the results, and each signal maps onto one payload category.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::payload::Category;

/// A typed signal that becomes the fields of one payload
pub trait Signal: Serialize {
    const CATEGORY: Category;

    /// Serialize into payload fields, or `None` if the signal is not an object
    fn to_fields(&self) -> Option<Map<String, Value>> {
        match serde_json::to_value(self) {
            Ok(Value::Object(fields)) => Some(fields),
            Ok(other) => {
                tracing::warn!(
                    category = %Self::CATEGORY,
                    value = %other,
                    "Signal did not serialize to an object"
                );
                None
            }
            Err(e) => {
                tracing::warn!(
                    category = %Self::CATEGORY,
                    error = %e,
                    "Failed to serialize signal"
                );
                None
            }
        }
    }
}

/// Visitor and session identity
#[derive(Debug, Clone, Default, Serialize)]
pub struct IdentitySignals {
    pub visitor_id: String,
    pub session_id: String,
    pub is_new_visitor: bool,
    pub is_new_session: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_count: Option<u32>,
}

impl Signal for IdentitySignals {
    const CATEGORY: Category = Category::Identity;
}

/// A page view
#[derive(Debug, Clone, Default, Serialize)]
pub struct PageSignals {
    pub url: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
}

impl Signal for PageSignals {
    const CATEGORY: Category = Category::Page;
}

/// Device, browser and display characteristics
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeviceSignals {
    pub user_agent: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screen_width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screen_height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewport_width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewport_height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl Signal for DeviceSignals {
    const CATEGORY: Category = Category::Device;
}

/// Coarse location derived by the host
#[derive(Debug, Clone, Default, Serialize)]
pub struct LocationSignals {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

impl Signal for LocationSignals {
    const CATEGORY: Category = Category::Location;
}

/// Traffic source and campaign parameters
#[derive(Debug, Clone, Default, Serialize)]
pub struct MarketingSignals {
    pub traffic_source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer_domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_medium: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_campaign: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_term: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_content: Option<String>,
}

impl Signal for MarketingSignals {
    const CATEGORY: Category = Category::Marketing;
}

/// Page load timings in milliseconds
#[derive(Debug, Clone, Default, Serialize)]
pub struct PerformanceSignals {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_load_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dom_content_loaded_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_to_first_byte_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns_lookup_ms: Option<u64>,
}

impl Signal for PerformanceSignals {
    const CATEGORY: Category = Category::Performance;
}

/// A raw scroll position, as sampled from scroll events
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollSample {
    pub scroll_top: f64,
    pub viewport_height: f64,
    pub document_height: f64,
}

impl ScrollSample {
    /// Percentage of the document seen so far, clamped to 0..=100
    pub fn depth_percent(&self) -> u8 {
        if self.document_height <= 0.0 {
            return 100;
        }
        let seen = (self.scroll_top + self.viewport_height) / self.document_height * 100.0;
        seen.clamp(0.0, 100.0) as u8
    }
}
