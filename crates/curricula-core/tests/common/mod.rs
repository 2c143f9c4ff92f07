//! Shared fixtures for integration tests.

#![allow(dead_code)]

use curricula_core::{CurriculumDraft, Node, Resource, ResourceKind};

/// Three-node chain that passes every judge rule with default configuration.
pub fn clean_draft() -> CurriculumDraft {
    CurriculumDraft::new(
        "caching",
        vec![
            Node::new("N1", "Cache fundamentals", "Explain how a cache lookup works")
                .with_core_ideas(["cache lookup", "hit ratio"])
                .with_mastery(
                    "Explain the lookup path of a cache in writing",
                    "Must identify at least 3 lookup steps",
                )
                .with_estimate(30.0)
                .with_resource(Resource::new(
                    "Cache lookup walkthrough",
                    "https://example.com/cache-lookup",
                    ResourceKind::Doc,
                )),
            Node::new("N2", "Cache eviction", "Implement LRU eviction for a cache")
                .with_prerequisites(["N1"])
                .with_core_ideas(["eviction order"])
                .with_mastery(
                    "Implement an LRU eviction routine for a small cache",
                    "Must pass at least 5 eviction tests",
                )
                .with_estimate(45.0)
                .with_resource(Resource::new(
                    "LRU eviction guide",
                    "https://example.com/lru-eviction",
                    ResourceKind::Doc,
                )),
            Node::new("N3", "Cache invalidation", "Design an invalidation policy for cached data")
                .with_prerequisites(["N2"])
                .with_core_ideas(["staleness"])
                .with_mastery(
                    "Design an invalidation policy for a read heavy cache",
                    "Must include at least 2 invalidation triggers",
                )
                .with_estimate(60.0)
                .with_resource(Resource::new(
                    "Cache invalidation patterns",
                    "https://example.com/invalidation",
                    ResourceKind::Doc,
                )),
        ],
    )
}

/// Six unrelated roots with flat estimates and thin mastery checks.
pub fn weak_draft() -> CurriculumDraft {
    let topics = [
        ("W1", "Hashing", "Describe hash functions"),
        ("W2", "Eviction", "Describe eviction policies"),
        ("W3", "Expiry", "Describe time based expiry"),
        ("W4", "Sharding", "Describe key sharding"),
        ("W5", "Warmup", "Describe cache warmup"),
        ("W6", "Metrics", "Describe hit ratio metrics"),
    ];
    let nodes = topics
        .iter()
        .map(|(id, title, capability)| {
            Node::new(*id, *title, *capability)
                .with_mastery("Try it", "Done")
                .with_estimate(30.0)
        })
        .collect();
    CurriculumDraft::new("caching", nodes)
}
