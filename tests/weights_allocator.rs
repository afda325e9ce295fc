// tests/weights_allocator.rs
//
// Weight allocation invariants: one entry per article, in order, each
// weight within 1..=5, whatever the model returns.

use std::sync::Arc;

use serde_json::json;

use stock_news_sentiment::ai_adapter::ScriptedProvider;
use stock_news_sentiment::analyze::weights::{AllocatorError, WeightAllocator, WeightRequest};
use stock_news_sentiment::config::WeightsConfig;
use stock_news_sentiment::model::ArticleDigest;

fn request(n: usize) -> WeightRequest {
    WeightRequest {
        articles: (0..n)
            .map(|i| ArticleDigest {
                title: format!("Headline {i}"),
                description: String::new(),
                published_at: None,
            })
            .collect(),
        overall_sentiment: "Bearish".into(),
        overall_confidence: 55,
        symbol: "QQQ".into(),
    }
}

fn no_delay() -> WeightsConfig {
    WeightsConfig {
        pre_call_delay_ms: 0,
        ..WeightsConfig::default()
    }
}

#[tokio::test]
async fn every_batch_size_yields_full_ordered_bounded_weights() {
    // Replies mix out-of-range weights, bad indices and fractional values.
    let replies = [
        json!({"weights": []}),
        json!({"weights": [{"article_index": 0, "weight": 9, "reasoning": "huge"}]}),
        json!({"weights": [{"article_index": 1, "weight": -3}, {"article_index": 7, "weight": 2}]}),
        json!({"weights": [{"article_index": "2", "weight": 2.6, "reasoning": "x"}, {"article_index": 0, "weight": 1}]}),
        json!({"weights": [{"article_index": 0, "weight": 4}, {"article_index": 0, "weight": 1}]}),
    ];

    for n in 1..=6 {
        for reply in &replies {
            let allocator = WeightAllocator::new(
                Arc::new(ScriptedProvider::always(reply.to_string())),
                no_delay(),
            );
            let out = allocator.allocate(&request(n)).await.unwrap();
            assert_eq!(out.weights.len(), n, "n={n} reply={reply}");
            for (i, w) in out.weights.iter().enumerate() {
                assert_eq!(w.article_index, i);
                assert!((1..=5).contains(&w.weight), "n={n} reply={reply} w={w:?}");
                assert!(!w.reasoning.is_empty());
            }
        }
    }
}

#[tokio::test]
async fn skipped_indices_get_configured_default() {
    let cfg = WeightsConfig {
        pre_call_delay_ms: 0,
        default_weight: 2,
        default_reasoning: "Not rated".into(),
        ..WeightsConfig::default()
    };
    let allocator = WeightAllocator::new(
        Arc::new(ScriptedProvider::always(
            r#"{"weights":[{"article_index":1,"weight":5,"reasoning":"Main driver"}]}"#,
        )),
        cfg,
    );
    let out = allocator.allocate(&request(3)).await.unwrap();
    let got: Vec<(u8, &str)> = out
        .weights
        .iter()
        .map(|w| (w.weight, w.reasoning.as_str()))
        .collect();
    assert_eq!(got, vec![(2, "Not rated"), (5, "Main driver"), (2, "Not rated")]);
}

#[tokio::test]
async fn malformed_reply_is_an_error() {
    let allocator = WeightAllocator::new(
        Arc::new(ScriptedProvider::always("I think article one matters most.")),
        no_delay(),
    );
    let err = allocator.allocate(&request(2)).await.unwrap_err();
    assert!(matches!(err, AllocatorError::Malformed(_)));
}

#[tokio::test(start_paused = true)]
async fn waits_before_calling_provider() {
    let provider = Arc::new(ScriptedProvider::always(r#"{"weights":[]}"#));
    let allocator = WeightAllocator::new(
        provider.clone(),
        WeightsConfig {
            pre_call_delay_ms: 1500,
            ..WeightsConfig::default()
        },
    );

    let t0 = tokio::time::Instant::now();
    allocator.allocate(&request(1)).await.unwrap();
    assert!(t0.elapsed() >= std::time::Duration::from_millis(1500));
    assert_eq!(provider.requests().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn empty_batch_skips_delay_and_provider() {
    let provider = Arc::new(ScriptedProvider::new());
    let allocator = WeightAllocator::new(provider.clone(), WeightsConfig::default());

    let t0 = tokio::time::Instant::now();
    let out = allocator.allocate(&request(0)).await.unwrap();
    assert!(out.weights.is_empty());
    assert_eq!(out.symbol, "QQQ");
    assert!(t0.elapsed() < std::time::Duration::from_millis(1500));
    assert!(provider.requests().is_empty());
}
