//! Candidate endpoint list with rotation.

use std::collections::HashMap;

use crate::config::is_websocket_url;
use crate::error::EndpointError;

/// Ordered endpoints and the cursor into them.
///
/// Automatic rotation gives up once every endpoint has been abandoned since
/// the last successful open. Manual changes and a successful open start the
/// count over.
#[derive(Debug, Clone)]
pub struct EndpointList {
    urls: Vec<String>,
    index: usize,
    rotation: bool,
    rotations_since_open: usize,
    failures: HashMap<String, u32>,
}

impl EndpointList {
    pub fn new(urls: Vec<String>, rotation: bool) -> Self {
        Self {
            urls,
            index: 0,
            rotation,
            rotations_since_open: 0,
            failures: HashMap::new(),
        }
    }

    /// The endpoint the next connect goes to.
    pub fn current(&self) -> &str {
        self.urls.get(self.index).map(String::as_str).unwrap_or_default()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    /// Times the failover moved away from `url`.
    pub fn failures(&self, url: &str) -> u32 {
        self.failures.get(url).copied().unwrap_or(0)
    }

    /// Fail over to the next endpoint.
    ///
    /// Returns `false` if rotation is disabled, there is nowhere else to go,
    /// or every endpoint has already been abandoned since the last open.
    pub fn rotate(&mut self) -> bool {
        if !self.can_rotate() || self.rotations_since_open + 1 >= self.urls.len() {
            return false;
        }
        self.advance();
        self.rotations_since_open += 1;
        true
    }

    /// Move to the next endpoint on request, regardless of exhaustion.
    pub fn switch_next(&mut self) -> bool {
        if !self.can_rotate() {
            return false;
        }
        self.advance();
        self.rotations_since_open = 0;
        true
    }

    fn can_rotate(&self) -> bool {
        self.rotation && self.urls.len() > 1
    }

    fn advance(&mut self) {
        let current = self.current().to_string();
        *self.failures.entry(current).or_default() += 1;
        self.index = (self.index + 1) % self.urls.len();
    }

    /// Record a successful open on the current endpoint.
    pub fn mark_open(&mut self) {
        let current = self.current().to_string();
        self.failures.remove(&current);
        self.rotations_since_open = 0;
    }

    /// Forget past rotations so automatic failover may try every endpoint
    /// again.
    pub fn reset_rotations(&mut self) {
        self.rotations_since_open = 0;
    }

    /// Add an endpoint at the front of the list and select it.
    pub fn add(&mut self, url: &str) -> Result<(), EndpointError> {
        let url = url.trim();
        if !is_websocket_url(url) {
            return Err(EndpointError::InvalidScheme(url.to_string()));
        }
        if self.urls.iter().any(|u| u == url) {
            return Err(EndpointError::Duplicate(url.to_string()));
        }
        self.urls.insert(0, url.to_string());
        self.index = 0;
        self.rotations_since_open = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(urls: &[&str]) -> EndpointList {
        EndpointList::new(urls.iter().map(|s| s.to_string()).collect(), true)
    }

    #[test]
    fn test_rotation_visits_each_endpoint_once() {
        let mut endpoints = list(&["ws://a", "ws://b", "ws://c"]);
        assert!(endpoints.rotate());
        assert_eq!(endpoints.current(), "ws://b");
        assert!(endpoints.rotate());
        assert_eq!(endpoints.current(), "ws://c");
        assert!(!endpoints.rotate());
        assert_eq!(endpoints.current(), "ws://c");
    }

    #[test]
    fn test_open_resets_exhaustion_and_tally() {
        let mut endpoints = list(&["ws://a", "ws://b"]);
        assert!(endpoints.rotate());
        assert_eq!(endpoints.failures("ws://a"), 1);
        assert!(!endpoints.rotate());

        endpoints.mark_open();
        assert!(endpoints.rotate());
        assert_eq!(endpoints.current(), "ws://a");
        assert_eq!(endpoints.failures("ws://b"), 1);

        endpoints.mark_open();
        assert_eq!(endpoints.failures("ws://a"), 0);
    }

    #[test]
    fn test_rotation_disabled_or_single() {
        let mut disabled = EndpointList::new(vec!["ws://a".into(), "ws://b".into()], false);
        assert!(!disabled.rotate());
        assert!(!disabled.switch_next());

        let mut single = list(&["ws://a"]);
        assert!(!single.rotate());
        assert!(!single.switch_next());
    }

    #[test]
    fn test_manual_switch_ignores_exhaustion() {
        let mut endpoints = list(&["ws://a", "ws://b"]);
        assert!(endpoints.rotate());
        assert!(endpoints.switch_next());
        assert_eq!(endpoints.current(), "ws://a");
        assert!(endpoints.rotate());
    }

    #[test]
    fn test_add_validates_and_prepends() {
        let mut endpoints = list(&["ws://a", "ws://b"]);
        endpoints.rotate();

        assert_eq!(
            endpoints.add("http://c"),
            Err(EndpointError::InvalidScheme("http://c".into()))
        );
        assert_eq!(endpoints.add("ws://b"), Err(EndpointError::Duplicate("ws://b".into())));

        endpoints.add(" wss://c ").unwrap();
        assert_eq!(endpoints.index(), 0);
        assert_eq!(endpoints.current(), "wss://c");
        assert_eq!(endpoints.urls(), &["wss://c", "ws://a", "ws://b"]);
    }
}
