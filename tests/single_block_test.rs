//! 单块动作集成测试
//!
//! 覆盖守卫、幂等、取消、MT 回退和图片转换失败等关键路径，
//! 三个后端全部使用脚本化的假实现，不发真实网络请求。

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use block_translator::error::EngineError;
use block_translator::orchestrator::{translate_all_blocks, ActionOutcome};
use block_translator::services::LangDetector;

use common::*;

#[tokio::test]
async fn test_translate_block_stores_result() {
    let chat = Arc::new(FakeChat::new("translated text").with_chunks(&["trans", "lated ", "text"]));
    let session = simple_session(vec![text_block(0, "这是一个需要翻译的测试段落内容")], chat);

    let outcome = session.translate_block(0, false).await.unwrap();

    assert_eq!(outcome, ActionOutcome::Completed);
    assert_eq!(session.translation(0).as_deref(), Some("translated text"));
    assert!(!session.is_block_pending(0));

    let streaming = session.streaming_state();
    assert!(!streaming.is_streaming);
    assert_eq!(streaming.stream_content, "translated text");
    assert!(streaming.error.is_none());
}

#[tokio::test]
async fn test_existing_result_short_circuits() {
    let chat = Arc::new(FakeChat::new("第一次的结果"));
    let session = simple_session(vec![text_block(0, "这是一个需要翻译的测试段落内容")], chat.clone());

    session.translate_block(0, false).await.unwrap();
    let calls_after_first = chat.network_calls();
    assert_eq!(calls_after_first, 1);

    // 结果已存在且未强制重跑：不发任何网络请求，状态原样不动
    let outcome = session.translate_block(0, false).await.unwrap();
    assert_eq!(outcome, ActionOutcome::Skipped);
    assert_eq!(chat.network_calls(), calls_after_first);
    assert_eq!(session.translation(0).as_deref(), Some("第一次的结果"));

    // force=true 才重新生成
    let outcome = session.translate_block(0, true).await.unwrap();
    assert_eq!(outcome, ActionOutcome::Completed);
    assert_eq!(chat.network_calls(), calls_after_first + 1);
}

#[tokio::test]
async fn test_second_start_while_pending_is_noop() {
    let chat = Arc::new(FakeChat::new("不会结束").with_stalling_stream());
    let session = simple_session(vec![text_block(0, "这是一个需要翻译的测试段落内容")], chat.clone());

    let background = session.clone();
    let handle = tokio::spawn(async move { background.translate_block(0, false).await });

    // 等第一个动作真正进入流式阶段
    for _ in 0..50 {
        if session.is_block_pending(0) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(session.is_block_pending(0));

    // 同一个块的第二次发起被守卫拒绝，不新增网络调用
    let calls = chat.network_calls();
    let outcome = session.translate_block(0, false).await.unwrap();
    assert_eq!(outcome, ActionOutcome::Skipped);
    assert_eq!(chat.network_calls(), calls);

    session.cancel_action();
    let outcome = handle.await.unwrap().unwrap();
    assert_eq!(outcome, ActionOutcome::Cancelled);
}

#[tokio::test]
async fn test_cancel_action_is_silent_and_prompt() {
    let chat = Arc::new(FakeChat::new("不会结束").with_stalling_stream());
    let config = test_config("llm");
    let observer = Arc::new(RecordingObserver::default());
    let session = build_session(
        &config,
        vec![text_block(3, "这是一个需要翻译的测试段落内容")],
        chat,
        Arc::new(FakeMt::new("mt")),
        Arc::new(FakeEmbedder::ok()),
        observer.clone(),
    );

    let background = session.clone();
    let handle = tokio::spawn(async move { background.translate_block(3, false).await });

    for _ in 0..50 {
        if session.streaming_state().is_streaming {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(session.cancel_action());

    let outcome = handle.await.unwrap().unwrap();
    assert_eq!(outcome, ActionOutcome::Cancelled);

    // 取消不算失败：没有完成回调、没有错误回调、结果表里没有条目
    assert_eq!(observer.completed.load(Ordering::SeqCst), 0);
    assert_eq!(observer.errors.load(Ordering::SeqCst), 0);
    assert_eq!(observer.cancelled.load(Ordering::SeqCst), 1);
    assert!(session.translation(3).is_none());
    assert!(!session.is_block_pending(3));
    assert!(!session.streaming_state().is_streaming);
}

#[tokio::test]
async fn test_superseded_stream_discards_stale_result() {
    let chat = Arc::new(FakeChat::new("译文").with_gated_streams(1));
    let config = test_config("llm");
    let observer = Arc::new(RecordingObserver::default());
    let session = build_session(
        &config,
        vec![
            text_block(0, "这是一个需要翻译的测试段落内容"),
            text_block(1, "这是另一个需要翻译的测试段落内容"),
        ],
        chat.clone(),
        Arc::new(FakeMt::new("mt")),
        Arc::new(FakeEmbedder::ok()),
        observer.clone(),
    );

    // 块 0 的流被闸住，动作停在流式阶段
    let background = session.clone();
    let handle = tokio::spawn(async move { background.translate_block(0, false).await });
    for _ in 0..50 {
        if chat.stream_calls.load(Ordering::SeqCst) == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(session.streaming_state().streaming_block_index, Some(0));

    // 块 1 接管可见槽位并正常完成
    session.translate_block(1, false).await.unwrap();
    assert_eq!(observer.completed.load(Ordering::SeqCst), 1);

    // 放行块 0 的流：过期结果作废，不落账、不补发完成回调
    chat.release_stream();
    let outcome = handle.await.unwrap().unwrap();
    assert_eq!(outcome, ActionOutcome::Cancelled);
    assert!(session.translation(0).is_none());
    assert_eq!(observer.completed.load(Ordering::SeqCst), 1);
    assert_eq!(observer.cancelled.load(Ordering::SeqCst), 1);

    // 槽位仍然展示块 1 的结果
    let streaming = session.streaming_state();
    assert_eq!(streaming.streaming_block_index, Some(1));
    assert_eq!(streaming.stream_content, "译文");
}

#[tokio::test]
async fn test_cancel_after_settle_does_not_reach_batch_work() {
    let chat = Arc::new(FakeChat::new("译文").with_delay(Duration::from_millis(100)));
    let session = simple_session(
        vec![text_block(0, "这是一个需要翻译的测试段落内容")],
        chat.clone(),
    );

    // 可见动作落账后槽位只剩显示内容，没有可取消的流
    session.translate_block(0, false).await.unwrap();
    assert!(!session.streaming_state().is_streaming);
    assert!(!session.cancel_action());

    // 清掉结果再跑批量：同一个块换成后台任务在途
    session.clear_translation(0);
    let canceller = session.clone();
    let (summary, cancel_hit) = tokio::join!(
        translate_all_blocks(&session, |_, _| {}),
        async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            canceller.cancel_action()
        }
    );

    // 过期的槽位身份摸不到后台任务的令牌
    assert!(!cancel_hit);
    assert_eq!(summary.succeeded, 1);
    assert!(session.translation(0).is_some());
}

#[tokio::test]
async fn test_mt_failure_falls_back_to_llm_once() {
    let chat = Arc::new(FakeChat::new("llm 兜底译文"));
    let mt = Arc::new(FakeMt::new("不该用到").with_fail_first(1));
    let config = test_config("mt");
    let session = build_session(
        &config,
        vec![text_block(0, "你好世界，这是一个测试文本")],
        chat.clone(),
        mt.clone(),
        Arc::new(FakeEmbedder::ok()),
        Arc::new(RecordingObserver::default()),
    );

    let outcome = session.translate_block(0, false).await.unwrap();

    // MT 失败恰好回退一次 LLM，存下来的是 LLM 输出而不是错误
    assert_eq!(outcome, ActionOutcome::Completed);
    assert_eq!(mt.calls.load(Ordering::SeqCst), 1);
    assert_eq!(chat.stream_calls.load(Ordering::SeqCst), 1);
    assert_eq!(session.translation(0).as_deref(), Some("llm 兜底译文"));
}

#[tokio::test]
async fn test_chinese_text_with_mt_preference_scenario() {
    // 检测器先行验证：中文源 → 英文目标
    let detector = LangDetector::new();
    let detection = detector.detect("你好世界，这是一个测试文本");
    assert_eq!(detection.target.code(), "en");

    let chat = Arc::new(FakeChat::new("不该用到"));
    let mt = Arc::new(FakeMt::new("Hello world, this is a test text"));
    let config = test_config("mt");
    let session = build_session(
        &config,
        vec![text_block(0, "你好世界，这是一个测试文本")],
        chat.clone(),
        mt.clone(),
        Arc::new(FakeEmbedder::ok()),
        Arc::new(RecordingObserver::default()),
    );

    session.translate_block(0, false).await.unwrap();

    // zh→en 且偏好 mt：走 MT 引擎，LLM 不被触碰
    assert_eq!(mt.calls.load(Ordering::SeqCst), 1);
    assert_eq!(chat.network_calls(), 0);
    assert!(!session.translation(0).unwrap().is_empty());
    assert!(!session.is_block_pending(0));
}

#[tokio::test]
async fn test_broken_image_fails_before_network() {
    let chat = Arc::new(FakeChat::new("不该用到"));
    let mt = Arc::new(FakeMt::new("不该用到"));
    let config = test_config("llm");
    let observer = Arc::new(RecordingObserver::default());
    let session = build_session(
        &config,
        vec![image_block(0, "![图](http://host/broken.png)")],
        chat.clone(),
        mt.clone(),
        Arc::new(FakeEmbedder::failing()),
        observer.clone(),
    );

    let err = session.translate_block(0, false).await.unwrap_err();

    // 转换失败在发起任何网络请求之前终止，并作为错误上报
    assert!(matches!(err, EngineError::ImageConversionFailed { .. }));
    assert_eq!(chat.network_calls(), 0);
    assert_eq!(mt.calls.load(Ordering::SeqCst), 0);
    assert_eq!(observer.errors.load(Ordering::SeqCst), 1);
    assert!(!session.is_block_pending(0));
}

#[tokio::test]
async fn test_missing_block_is_lightweight_notice() {
    let chat = Arc::new(FakeChat::new("不该用到"));
    let config = test_config("llm");
    let observer = Arc::new(RecordingObserver::default());
    let session = build_session(
        &config,
        vec![text_block(0, "这是一个需要翻译的测试段落内容")],
        chat.clone(),
        Arc::new(FakeMt::new("mt")),
        Arc::new(FakeEmbedder::ok()),
        observer.clone(),
    );

    let err = session.translate_block(99, false).await.unwrap_err();

    assert!(matches!(err, EngineError::ContentMissing { index: 99 }));
    assert_eq!(chat.network_calls(), 0);
    // 以轻量提示而不是错误回调上报
    assert_eq!(observer.notices.load(Ordering::SeqCst), 1);
    assert_eq!(observer.errors.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_disabled_engine_rejects_action() {
    let chat = Arc::new(FakeChat::new("不该用到"));
    let mut config = test_config("llm");
    config.translation_enabled = false;
    let session = build_session(
        &config,
        vec![text_block(0, "这是一个需要翻译的测试段落内容")],
        chat.clone(),
        Arc::new(FakeMt::new("mt")),
        Arc::new(FakeEmbedder::ok()),
        Arc::new(RecordingObserver::default()),
    );

    let outcome = session.translate_block(0, false).await.unwrap();
    assert_eq!(outcome, ActionOutcome::Skipped);
    assert_eq!(chat.network_calls(), 0);
}

#[tokio::test]
async fn test_explain_block_always_uses_llm() {
    let chat = Arc::new(FakeChat::new("这段话的意思是……"));
    let mt = Arc::new(FakeMt::new("不该用到"));
    // 偏好 mt 也不影响解读路径
    let config = test_config("mt");
    let session = build_session(
        &config,
        vec![text_block(0, "你好世界，这是一个测试文本")],
        chat.clone(),
        mt.clone(),
        Arc::new(FakeEmbedder::ok()),
        Arc::new(RecordingObserver::default()),
    );

    let outcome = session.explain_block(0, false).await.unwrap();

    assert_eq!(outcome, ActionOutcome::Completed);
    assert_eq!(mt.calls.load(Ordering::SeqCst), 0);
    assert_eq!(chat.stream_calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        session.explanation(0).as_deref(),
        Some("这段话的意思是……")
    );
    // 翻译和解读结果各存一张表
    assert!(session.translation(0).is_none());
}

#[tokio::test]
async fn test_clear_helpers() {
    let chat = Arc::new(FakeChat::new("译文"));
    let session = simple_session(
        vec![
            text_block(0, "这是一个需要翻译的测试段落内容"),
            text_block(1, "这是另一个需要翻译的测试段落内容"),
        ],
        chat,
    );

    session.translate_block(0, false).await.unwrap();
    session.translate_block(1, false).await.unwrap();
    assert_eq!(session.translated_count(), 2);

    assert!(session.clear_translation(0));
    assert!(!session.clear_translation(0));
    assert_eq!(session.translated_count(), 1);

    session.clear_all_translations();
    assert_eq!(session.translated_count(), 0);

    // clear_all 同时清空两张结果表
    session.translate_block(0, false).await.unwrap();
    session.explain_block(1, false).await.unwrap();
    assert!(session.translation(0).is_some());
    assert!(session.explanation(1).is_some());
    session.clear_all();
    assert!(session.translation(0).is_none());
    assert!(session.explanation(1).is_none());
}
