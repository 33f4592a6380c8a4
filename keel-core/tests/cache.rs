#[cfg(test)]
mod tests {
    use keel_core::{LruRowCache, RowCache, RowLabeled, Value, cache_key};
    use std::sync::Arc;

    fn row(id: i64) -> RowLabeled {
        RowLabeled::new(
            Arc::from(vec!["id".to_string()]),
            vec![Value::Int64(Some(id))].into_boxed_slice(),
        )
    }

    #[test]
    fn cache_key_composite() {
        assert_eq!(cache_key(&[Value::Int32(Some(1))]).as_deref(), Some("1"));
        let key = cache_key(&[Value::Int32(Some(1)), Value::Varchar(Some("a".into()))]).unwrap();
        assert_ne!(key, "1a");
        assert_eq!(cache_key(&[Value::Int32(Some(1)), Value::Null]), None);
    }

    #[test]
    fn cache_put_get() {
        let cache = LruRowCache::new(10);
        assert!(cache.is_empty());
        let stamp = cache.stamp("user");
        cache.put("user", "1", row(1), stamp);
        assert_eq!(cache.get("user", "1"), Some(row(1)));
        assert_eq!(cache.get("user", "2"), None);
        assert_eq!(cache.get("account", "1"), None);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn cache_stale_put_is_discarded() {
        let cache = LruRowCache::new(10);
        let stamp = cache.stamp("user");
        cache.invalidate("user", "1");
        cache.put("user", "1", row(1), stamp);
        assert_eq!(cache.get("user", "1"), None);

        let stamp = cache.stamp("user");
        cache.invalidate_table("user");
        cache.put("user", "2", row(2), stamp);
        assert_eq!(cache.get("user", "2"), None);

        let stamp = cache.stamp("account");
        cache.clear();
        cache.put("account", "3", row(3), stamp);
        assert_eq!(cache.get("account", "3"), None);

        let stamp = cache.stamp("account");
        cache.put("account", "3", row(3), stamp);
        assert_eq!(cache.get("account", "3"), Some(row(3)));
    }

    #[test]
    fn cache_invalidation() {
        let cache = LruRowCache::new(10);
        for id in 1..=3 {
            let stamp = cache.stamp("user");
            cache.put("user", &id.to_string(), row(id), stamp);
        }
        let stamp = cache.stamp("account");
        cache.put("account", "1", row(1), stamp);
        cache.invalidate("user", "2");
        assert_eq!(cache.get("user", "2"), None);
        assert!(cache.get("user", "1").is_some());
        cache.invalidate_table("user");
        assert_eq!(cache.get("user", "1"), None);
        assert_eq!(cache.get("user", "3"), None);
        assert!(cache.get("account", "1").is_some());
    }

    #[test]
    fn cache_evicts_least_recently_used() {
        let cache = LruRowCache::new(2);
        let stamp = cache.stamp("user");
        cache.put("user", "1", row(1), stamp);
        cache.put("user", "2", row(2), stamp);
        assert!(cache.get("user", "1").is_some());
        cache.put("user", "3", row(3), stamp);
        assert_eq!(cache.len(), 2);
        assert!(cache.get("user", "1").is_some());
        assert_eq!(cache.get("user", "2"), None);
        assert!(cache.get("user", "3").is_some());
    }

    #[test]
    fn cache_disabled() {
        let cache = LruRowCache::new(0);
        let stamp = cache.stamp("user");
        cache.put("user", "1", row(1), stamp);
        assert_eq!(cache.get("user", "1"), None);
    }
}
