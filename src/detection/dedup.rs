//! 会话内去重过滤器
//! Session-scoped set of payloads that already raised a "new detection"

use std::collections::HashSet;

/// 已见内容集合, 只在会话结束时清空
#[derive(Debug, Default)]
pub struct DeduplicationFilter {
    seen: HashSet<String>,
}

impl DeduplicationFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 本会话内第一次观察到 `payload` 时返回 true
    pub fn observe(&mut self, payload: &str) -> bool {
        if self.seen.contains(payload) {
            return false;
        }
        self.seen.insert(payload.to_owned())
    }

    pub fn contains(&self, payload: &str) -> bool {
        self.seen.contains(payload)
    }

    /// 已扫描的不同内容数量
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn clear(&mut self) {
        self.seen.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observe_true_exactly_once() {
        let mut filter = DeduplicationFilter::new();
        let hits = (0..10).filter(|_| filter.observe("XYZ")).count();
        assert_eq!(hits, 1);
        assert!(filter.observe("ABC"));
        assert_eq!(filter.len(), 2);
    }

    #[test]
    fn test_clear_starts_new_session() {
        let mut filter = DeduplicationFilter::new();
        assert!(filter.observe("XYZ"));
        filter.clear();
        assert!(filter.is_empty());
        assert!(filter.observe("XYZ"));
    }
}
