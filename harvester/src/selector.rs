/// Represents ways to locate an element in the page
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    /// Select with a CSS selector
    Css(String),
    /// Select with an XPath expression, absolute (`//...`) or relative (`./...`)
    XPath(String),
    /// Select every element with the given tag name
    Tag(String),
}

impl Selector {
    pub fn css(s: impl Into<String>) -> Self {
        Selector::Css(s.into())
    }

    pub fn xpath(s: impl Into<String>) -> Self {
        Selector::XPath(s.into())
    }

    pub fn tag(s: impl Into<String>) -> Self {
        Selector::Tag(s.into())
    }

    /// Selector for elements whose own text contains `text`.
    pub fn containing_text(text: &str) -> Self {
        Selector::XPath(format!("//*[contains(text(), {})]", xpath_literal(text)))
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Selector::Css(s) => write!(f, "css:{s}"),
            Selector::XPath(s) => write!(f, "xpath:{s}"),
            Selector::Tag(s) => write!(f, "tag:{s}"),
        }
    }
}

impl From<&str> for Selector {
    fn from(s: &str) -> Self {
        let s = s.trim();
        match s {
            _ if s.starts_with("xpath:") => Selector::XPath(s["xpath:".len()..].to_string()),
            _ if s.starts_with("css:") => Selector::Css(s["css:".len()..].to_string()),
            _ if s.starts_with("tag:") => Selector::Tag(s["tag:".len()..].to_string()),
            // XPath expressions always start with a path step or a parenthesised group
            _ if s.starts_with('/') || s.starts_with("./") || s.starts_with('(') => {
                Selector::XPath(s.to_string())
            }
            _ => Selector::Css(s.to_string()),
        }
    }
}

impl From<String> for Selector {
    fn from(s: String) -> Self {
        Selector::from(s.as_str())
    }
}

/// Quote `value` as an XPath string literal, falling back to `concat()`
/// when it contains both quote kinds.
pub fn xpath_literal(value: &str) -> String {
    if !value.contains('\'') {
        format!("'{value}'")
    } else if !value.contains('"') {
        format!("\"{value}\"")
    } else {
        let parts: Vec<String> = value.split('\'').map(|p| format!("'{p}'")).collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}
