use serde::{Deserialize, Serialize};

/// Client-facing paging for timeline retrieval.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TimelineQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl TimelineQuery {
    /// Applies the paging window to an already ordered list.
    pub fn page<T>(&self, items: Vec<T>) -> Vec<T> {
        let offset = self.offset.unwrap_or(0).max(0) as usize;
        let limit = self.limit.map(|limit| limit.max(0) as usize);
        let iter = items.into_iter().skip(offset);
        match limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_ordered_items() {
        let query = TimelineQuery {
            limit: Some(2),
            offset: Some(1),
        };
        assert_eq!(query.page(vec![1, 2, 3, 4]), vec![2, 3]);
        assert_eq!(TimelineQuery::default().page(vec![1, 2]), vec![1, 2]);
    }
}
