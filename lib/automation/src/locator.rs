//! Element lookup.
//!
//! A [`Locator`] describes one way to find an element. A list of named
//! [`Strategy`] values is the fallback chain: they are data, tried in order
//! by [`first_match`].

use crate::driver::{AutomationDriver, PageHandle};
use crate::error::DriverError;
use std::fmt;

/// One way of finding an element on a page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    /// A CSS selector.
    Css(String),
    /// The first `tag` element whose text contains `contains`.
    Text { tag: String, contains: String },
    /// An XPath expression.
    XPath(String),
}

impl Locator {
    /// CSS selector locator.
    #[must_use]
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    /// Text-content locator.
    #[must_use]
    pub fn text(tag: impl Into<String>, contains: impl Into<String>) -> Self {
        Self::Text {
            tag: tag.into(),
            contains: contains.into(),
        }
    }

    /// XPath locator.
    #[must_use]
    pub fn xpath(expression: impl Into<String>) -> Self {
        Self::XPath(expression.into())
    }

    /// A JavaScript expression evaluating to the first matching element or `null`.
    #[must_use]
    pub fn to_js(&self) -> String {
        match self {
            Self::Css(selector) => format!("document.querySelector({})", js_string(selector)),
            Self::Text { tag, contains } => format!(
                "(Array.from(document.querySelectorAll({})).find(e => (e.textContent || '').includes({})) || null)",
                js_string(tag),
                js_string(contains)
            ),
            Self::XPath(expression) => format!(
                "document.evaluate({}, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue",
                js_string(expression)
            ),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Css(selector) => write!(f, "css={selector}"),
            Self::Text { tag, contains } => write!(f, "{tag}:has-text(\"{contains}\")"),
            Self::XPath(expression) => write!(f, "xpath={expression}"),
        }
    }
}

fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

/// A named locator in a fallback chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Strategy {
    /// Label recorded in logs when the strategy wins.
    pub name: String,
    /// How to find the element.
    pub locator: Locator,
}

impl Strategy {
    /// Creates a named strategy.
    #[must_use]
    pub fn new(name: impl Into<String>, locator: Locator) -> Self {
        Self {
            name: name.into(),
            locator,
        }
    }
}

/// Returns the first strategy whose locator matches an element on the page.
///
/// # Errors
///
/// Returns the driver error if any lookup fails.
pub async fn first_match<'a, D>(
    driver: &D,
    page: &PageHandle,
    strategies: &'a [Strategy],
) -> Result<Option<&'a Strategy>, DriverError>
where
    D: AutomationDriver + ?Sized,
{
    for strategy in strategies {
        if driver.exists(page, &strategy.locator).await? {
            return Ok(Some(strategy));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn css_selector_is_escaped() {
        let locator = Locator::css(r#"button[name="submit"]"#);
        assert_eq!(
            locator.to_js(),
            r#"document.querySelector("button[name=\"submit\"]")"#
        );
    }

    #[test]
    fn text_locator_searches_tag() {
        let js = Locator::text("button", "Book Now").to_js();
        assert!(js.contains(r#"querySelectorAll("button")"#));
        assert!(js.contains(r#"includes("Book Now")"#));
    }

    #[test]
    fn xpath_locator_uses_first_ordered_node() {
        let js = Locator::xpath("//button[contains(., 'Reserve')]").to_js();
        assert!(js.starts_with("document.evaluate("));
        assert!(js.contains("FIRST_ORDERED_NODE_TYPE"));
    }

    #[test]
    fn display_is_readable() {
        assert_eq!(Locator::css("#username").to_string(), "css=#username");
        assert_eq!(
            Locator::text("a", "Reserve").to_string(),
            "a:has-text(\"Reserve\")"
        );
    }
}
