use std::str::FromStr;

pub const DEFAULT_ENDPOINTS: [&str; 4] = [
    "ingestion.zetta.so",
    "app.posthog.com",
    "us.posthog.com",
    "eu.posthog.com",
];

/// Ordered host-substring patterns identifying capture destinations. A URL matches when
/// it contains any of the patterns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndpointSet {
    patterns: Vec<String>,
}

impl EndpointSet {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn matches(&self, url: &str) -> bool {
        self.patterns.iter().any(|pattern| url.contains(pattern.as_str()))
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

impl Default for EndpointSet {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINTS)
    }
}

impl FromStr for EndpointSet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let patterns: Vec<&str> = s
            .split(',')
            .map(str::trim)
            .filter(|pattern| !pattern.is_empty())
            .collect();

        if patterns.is_empty() {
            return Err(format!("no endpoint patterns in: {s}"));
        }
        Ok(Self::new(patterns))
    }
}
