//! Audio cache tests
//!
//! Checks the bounded insertion-order eviction and expiry behavior from the
//! outside, through the public cache API.

use readify::background::cache::AudioCache;

#[test]
fn test_capacity_plus_one_evicts_first_inserted() {
    let size = 5;
    let mut cache = AudioCache::new(size);

    for i in 0..=size {
        let text = format!("paragraph number {} with enough text", i);
        cache.put(&text, "nova", 1.0, vec![i as u8; 8]);
    }

    assert_eq!(cache.len(), size);
    // First-inserted key is gone, all later ones remain
    assert!(cache
        .get("paragraph number 0 with enough text", "nova", 1.0)
        .is_none());
    for i in 1..=size {
        let text = format!("paragraph number {} with enough text", i);
        assert!(cache.get(&text, "nova", 1.0).is_some(), "missing entry {}", i);
    }
}

#[test]
fn test_speed_and_voice_partition_the_key_space() {
    let mut cache = AudioCache::new(10);
    cache.put("the same text", "nova", 1.0, vec![1]);
    cache.put("the same text", "nova", 1.5, vec![2]);
    cache.put("the same text", "alloy", 1.0, vec![3]);

    assert_eq!(cache.get("the same text", "nova", 1.0), Some(vec![1]));
    assert_eq!(cache.get("the same text", "nova", 1.5), Some(vec![2]));
    assert_eq!(cache.get("the same text", "alloy", 1.0), Some(vec![3]));
    assert_eq!(cache.len(), 3);
}

#[test]
fn test_clean_expired_leaves_fresh_entries() {
    let mut cache = AudioCache::new(10);
    cache.put("fresh entry text", "nova", 1.0, vec![1]);

    // Nothing is a day old yet
    assert_eq!(cache.clean_expired(), 0);
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_stats_match_contents() {
    let mut cache = AudioCache::new(7);
    cache.put("first cached paragraph", "nova", 1.0, vec![1]);
    cache.put("second cached paragraph", "nova", 1.0, vec![2]);

    let stats = cache.stats();
    assert_eq!(stats.size, 2);
    assert_eq!(stats.max_size, 7);
    assert_eq!(stats.entries.len(), 2);
    assert_eq!(stats.entries[0].text, "first cached paragraph");

    cache.clear();
    let stats = cache.stats();
    assert_eq!(stats.size, 0);
    assert!(stats.entries.is_empty());
}
