//! Ingest filters on the event API name
//!
//! Exclude patterns always win. An empty include list admits every event
//! that no exclude pattern matched.

use crate::event::Event;
use crate::wildcard::WildcardPattern;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestFilters {
    pub api_name_include: Vec<WildcardPattern>,
    pub api_name_exclude: Vec<WildcardPattern>,
}

impl IngestFilters {
    pub fn new<I, E, S, T>(include: I, exclude: E) -> Self
    where
        I: IntoIterator<Item = S>,
        E: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        Self {
            api_name_include: include.into_iter().map(WildcardPattern::new).collect(),
            api_name_exclude: exclude.into_iter().map(WildcardPattern::new).collect(),
        }
    }

    /// Parse `;`-separated pattern lists as they appear in the environment.
    pub fn from_lists(include: Option<&str>, exclude: Option<&str>) -> Self {
        Self::new(split_patterns(include), split_patterns(exclude))
    }

    pub fn is_empty(&self) -> bool {
        self.api_name_include.is_empty() && self.api_name_exclude.is_empty()
    }

    /// Decide whether an event should be stored.
    pub fn accept(&self, event: &Event) -> bool {
        self.accept_api_name(event.api_name())
    }

    pub fn accept_api_name(&self, api_name: &str) -> bool {
        if self.api_name_exclude.iter().any(|p| p.matches(api_name)) {
            return false;
        }

        if self.api_name_include.is_empty() {
            return true;
        }

        self.api_name_include.iter().any(|p| p.matches(api_name))
    }
}

fn split_patterns(list: Option<&str>) -> Vec<String> {
    list.map(|s| {
        s.split(';')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_owned)
            .collect()
    })
    .unwrap_or_default()
}
