mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use common::{fast_config, psd_bytes, PeerScript, ScriptedController};
use fig_to_psd::browser::SessionManager;
use fig_to_psd::config::{DetectionStrategy, SentinelMode};
use fig_to_psd::protocol::PositionalPolicy;
use fig_to_psd::{Config, ConversionJob, ErrorKind, RequestCoordinator};

fn coordinator(config: &Config, controller: &Arc<ScriptedController>) -> RequestCoordinator {
    RequestCoordinator::new(config, controller.clone()).unwrap()
}

fn fig_job(name: &str, len: usize) -> ConversionJob {
    ConversionJob::new(vec![0x46; len], name)
}

#[tokio::test]
async fn test_successful_conversion() {
    let controller = Arc::new(ScriptedController::new(PeerScript::default()));
    let coordinator = coordinator(&fast_config(), &controller);

    let result = coordinator.convert(fig_job("design.fig", 12 * 1024)).await.unwrap();

    assert_eq!(result.declared_name(), "design.psd");
    assert_eq!(result.payload_bytes().len(), 4096);
    assert_eq!(&result.payload_bytes()[..4], b"8BPS");
    assert_eq!(controller.launches(), 1);
    assert_eq!(controller.terminations(), 1);
    assert_eq!(controller.count_calls("post_binary:12288"), 1);
    assert_eq!(
        controller.count_calls(r#"post_command:app.activeDocument.saveToOE("psd")"#),
        1
    );
}

#[tokio::test]
async fn test_handshake_timeout_sends_nothing() {
    let controller = Arc::new(ScriptedController::new(PeerScript {
        ready_on_open: false,
        ..Default::default()
    }));
    let coordinator = coordinator(&fast_config(), &controller);

    let err = coordinator.convert(fig_job("design.fig", 64)).await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::HandshakeTimeout);
    assert!(err.elapsed >= Duration::from_millis(300));
    assert_eq!(controller.count_calls("post_binary"), 0);
    assert_eq!(controller.count_calls("post_command"), 0);
    assert_eq!(controller.terminations(), 1);
}

#[tokio::test]
async fn test_load_timeout_releases_once() {
    let controller = Arc::new(ScriptedController::new(PeerScript {
        ready_after_load: false,
        ..Default::default()
    }));
    let coordinator = coordinator(&fast_config(), &controller);

    let err = coordinator.convert(fig_job("design.fig", 64)).await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::LoadTimeout);
    assert_eq!(controller.count_calls("post_command"), 0);
    assert_eq!(controller.terminations(), 1);
    assert_eq!(controller.count_calls("close"), 1);
}

#[tokio::test]
async fn test_export_timeout_without_reply() {
    let controller = Arc::new(ScriptedController::new(PeerScript {
        export_reply: None,
        ..Default::default()
    }));
    let coordinator = coordinator(&fast_config(), &controller);

    let err = coordinator.convert(fig_job("design.fig", 64)).await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::ExportTimeout);
    assert_eq!(controller.terminations(), 1);
}

#[tokio::test]
async fn test_missing_trailer_depends_on_policy() {
    let script = PeerScript {
        trailing_sentinel: false,
        ..Default::default()
    };

    // 默认要等尾随哨兵
    let controller = Arc::new(ScriptedController::new(script.clone()));
    let err = coordinator(&fast_config(), &controller)
        .convert(fig_job("a.fig", 64))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::ExportTimeout);

    // 不等尾随哨兵时，收到二进制即完成
    let config = Config {
        await_export_trailer: false,
        ..fast_config()
    };
    let controller = Arc::new(ScriptedController::new(script));
    let result = coordinator(&config, &controller)
        .convert(fig_job("a.fig", 64))
        .await
        .unwrap();
    assert_eq!(result.declared_name(), "a.psd");
}

#[tokio::test]
async fn test_empty_result() {
    let controller = Arc::new(ScriptedController::new(PeerScript {
        export_reply: Some(Vec::new()),
        ..Default::default()
    }));
    let coordinator = coordinator(&fast_config(), &controller);

    let err = coordinator.convert(fig_job("design.fig", 64)).await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::EmptyResult);
    assert_eq!(controller.terminations(), 1);
}

#[tokio::test]
async fn test_bad_signature_reports_observed_header() {
    let controller = Arc::new(ScriptedController::new(PeerScript {
        export_reply: Some(b"GIF89a-not-a-psd".to_vec()),
        ..Default::default()
    }));
    let coordinator = coordinator(&fast_config(), &controller);

    let err = coordinator.convert(fig_job("design.fig", 64)).await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::Validation);
    assert_eq!(err.observed_header.as_deref(), Some(&b"GIF8"[..]));
    assert!(err.message.contains("47 49 46 38"));
    assert_eq!(controller.terminations(), 1);
}

#[tokio::test]
async fn test_launch_failure() {
    let controller = Arc::new(ScriptedController::new(PeerScript {
        fail_launch: true,
        ..Default::default()
    }));
    let coordinator = coordinator(&fast_config(), &controller);

    let err = coordinator.convert(fig_job("design.fig", 64)).await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::ProcessLaunch);
    assert_eq!(controller.launches(), 1);
    assert_eq!(controller.terminations(), 0);
    assert!(controller.calls().is_empty());
}

#[tokio::test]
async fn test_polling_detection() {
    let config = Config {
        detection: DetectionStrategy::Polling,
        ..fast_config()
    };
    let controller = Arc::new(ScriptedController::new(PeerScript::default()));

    let result = coordinator(&config, &controller)
        .convert(fig_job("poll.fig", 256))
        .await
        .unwrap();
    assert_eq!(result.declared_name(), "poll.psd");

    // 轮询模式下同样会超时
    let controller = Arc::new(ScriptedController::new(PeerScript {
        ready_after_load: false,
        ..Default::default()
    }));
    let err = coordinator(&config, &controller)
        .convert(fig_job("poll.fig", 256))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::LoadTimeout);
    assert_eq!(controller.terminations(), 1);
}

#[tokio::test]
async fn test_settle_delay_skips_load_signal() {
    let config = Config {
        load_settle_delay_ms: Some(50),
        ..fast_config()
    };
    let controller = Arc::new(ScriptedController::new(PeerScript {
        ready_after_load: false,
        ..Default::default()
    }));

    let result = coordinator(&config, &controller)
        .convert(fig_job("slow.fig", 64))
        .await
        .unwrap();
    assert_eq!(result.declared_name(), "slow.psd");
}

#[tokio::test]
async fn test_strict_signals_rejects_garbage() {
    let script = PeerScript {
        noise_on_open: true,
        ..Default::default()
    };

    let controller = Arc::new(ScriptedController::new(script.clone()));
    assert!(coordinator(&fast_config(), &controller)
        .convert(fig_job("a.fig", 64))
        .await
        .is_ok());

    let config = Config {
        strict_signals: true,
        ..fast_config()
    };
    let controller = Arc::new(ScriptedController::new(script));
    let err = coordinator(&config, &controller)
        .convert(fig_job("a.fig", 64))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::ChannelProtocol);
    assert_eq!(controller.terminations(), 1);
}

#[tokio::test]
async fn test_sentinel_policy_can_be_replaced() {
    // 严格按序号：第一个哨兵是就绪，第二个是加载完成
    let controller = Arc::new(ScriptedController::new(PeerScript::default()));
    let coordinator = coordinator(&fast_config(), &controller)
        .with_sentinel_policy(Arc::new(PositionalPolicy::new(SentinelMode::StrictOrdinal, true)));

    let result = coordinator.convert(fig_job("ordinal.fig", 64)).await.unwrap();
    assert_eq!(result.declared_name(), "ordinal.psd");
}

#[tokio::test]
async fn test_concurrent_jobs_use_isolated_sessions() {
    let config = Config {
        max_concurrent_jobs: 2,
        export_timeout_ms: 1_000,
        ..fast_config()
    };
    let controller = Arc::new(ScriptedController::new(PeerScript {
        export_reply: Some(psd_bytes(1024)),
        reply_delay: Duration::from_millis(50),
        ..Default::default()
    }));
    let coordinator = Arc::new(coordinator(&config, &controller));

    let mut handles = Vec::new();
    for i in 0..5 {
        let coordinator = coordinator.clone();
        handles.push(tokio::spawn(async move {
            coordinator.convert(fig_job(&format!("job{}.fig", i), 128)).await
        }));
    }

    let mut names = HashSet::new();
    for handle in handles {
        let result = handle.await.unwrap().unwrap();
        names.insert(result.declared_name().to_string());
    }

    assert_eq!(names.len(), 5);
    assert_eq!(controller.launches(), 5);
    assert_eq!(controller.terminations(), 5);
    assert!(controller.max_live() <= 2);
    let ids: HashSet<u64> = controller.terminated_ids().into_iter().collect();
    assert_eq!(ids.len(), 5);
}

#[tokio::test]
async fn test_dropped_session_is_terminated() {
    let controller = Arc::new(ScriptedController::new(PeerScript::default()));
    let config = fast_config();
    let manager = SessionManager::new(
        controller.clone(),
        fig_to_psd::browser::LaunchOptions::from_config(&config),
        config.editor_url.clone(),
        Arc::new(PositionalPolicy::default()),
        1,
    );

    let session = manager.acquire().await.unwrap();
    assert!(session.is_open());
    drop(session);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(controller.terminations(), 1);

    // 显式释放后再次释放不会重复终止
    let mut session = manager.acquire().await.unwrap();
    session.release().await;
    session.release().await;
    drop(session);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(controller.terminations(), 2);
}

#[tokio::test]
async fn test_cancelled_during_acquire_still_terminates() {
    let config = Config {
        max_concurrent_jobs: 1,
        ..fast_config()
    };
    let controller = Arc::new(ScriptedController::with_scripts(vec![PeerScript {
        context_delay: Duration::from_millis(300),
        ..Default::default()
    }]));
    let coordinator = coordinator(&config, &controller);

    // 页面还没打开，外层就放弃了
    let cancelled = tokio::time::timeout(
        Duration::from_millis(50),
        coordinator.convert(fig_job("slow.fig", 64)),
    )
    .await;
    assert!(cancelled.is_err());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(controller.launches(), 1);
    assert_eq!(controller.terminations(), 1);

    // 名额已归还，下一个任务可以正常执行
    let result = coordinator.convert(fig_job("next.fig", 64)).await.unwrap();
    assert_eq!(result.declared_name(), "next.psd");
    assert_eq!(controller.launches(), 2);
    assert_eq!(controller.terminations(), 2);
}

#[tokio::test]
async fn test_corrupt_export_payload_is_channel_error() {
    let controller = Arc::new(ScriptedController::new(PeerScript {
        export_malformed: true,
        ..Default::default()
    }));
    let coordinator = coordinator(&fast_config(), &controller);

    let err = coordinator.convert(fig_job("design.fig", 64)).await.unwrap_err();

    // 不需要等满导出期限
    assert_eq!(err.kind, ErrorKind::ChannelProtocol);
    assert!(err.elapsed < Duration::from_millis(300));
    assert_eq!(controller.terminations(), 1);
}

#[tokio::test]
async fn test_one_stuck_job_does_not_affect_others() {
    let controller = Arc::new(ScriptedController::with_scripts(vec![
        PeerScript {
            ready_on_open: false,
            ..Default::default()
        },
        PeerScript::default(),
        PeerScript::default(),
    ]));
    let coordinator = Arc::new(coordinator(&fast_config(), &controller));

    let mut handles = Vec::new();
    for i in 0..3 {
        let coordinator = coordinator.clone();
        handles.push(tokio::spawn(async move {
            coordinator.convert(fig_job(&format!("mixed{}.fig", i), 128)).await
        }));
    }

    let mut converted = 0;
    let mut kinds = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(result) => {
                assert_eq!(&result.payload_bytes()[..4], b"8BPS");
                converted += 1;
            }
            Err(err) => kinds.push(err.kind),
        }
    }

    assert_eq!(converted, 2);
    assert_eq!(kinds, vec![ErrorKind::HandshakeTimeout]);
    assert_eq!(controller.launches(), 3);
    assert_eq!(controller.terminations(), 3);
    let ids: HashSet<u64> = controller.terminated_ids().into_iter().collect();
    assert_eq!(ids.len(), 3);
}

#[tokio::test]
async fn test_terminate_failure_keeps_conversion_result() {
    let controller = Arc::new(ScriptedController::new(PeerScript {
        fail_terminate: true,
        ..Default::default()
    }));
    let coord = coordinator(&fast_config(), &controller);

    let result = coord.convert(fig_job("design.fig", 64)).await.unwrap();
    assert_eq!(result.declared_name(), "design.psd");
    assert_eq!(controller.terminations(), 1);

    // 失败的任务同样保留自己的分类
    let controller = Arc::new(ScriptedController::new(PeerScript {
        fail_terminate: true,
        export_reply: Some(Vec::new()),
        ..Default::default()
    }));
    let err = coordinator(&fast_config(), &controller)
        .convert(fig_job("design.fig", 64))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::EmptyResult);
    assert_eq!(controller.terminations(), 1);
}

#[tokio::test]
async fn test_context_failure_terminates_process() {
    let controller = Arc::new(ScriptedController::new(PeerScript {
        fail_context: true,
        ..Default::default()
    }));
    let coordinator = coordinator(&fast_config(), &controller);

    let err = coordinator.convert(fig_job("design.fig", 64)).await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::ProcessLaunch);
    assert!(err.message.contains("scripted context failure"));
    assert_eq!(controller.launches(), 1);
    assert_eq!(controller.terminations(), 1);
    assert!(controller.calls().is_empty());
}

#[tokio::test]
async fn test_dropped_session_holds_slot_until_terminated() {
    let controller = Arc::new(ScriptedController::new(PeerScript::default()));
    let config = fast_config();
    let manager = SessionManager::new(
        controller.clone(),
        fig_to_psd::browser::LaunchOptions::from_config(&config),
        config.editor_url.clone(),
        Arc::new(PositionalPolicy::default()),
        1,
    );

    let session = manager.acquire().await.unwrap();
    drop(session);

    // 后台终止完成之前拿不到新名额
    let mut session = manager.acquire().await.unwrap();
    assert_eq!(controller.terminations(), 1);
    session.release().await;

    assert_eq!(controller.launches(), 2);
    assert_eq!(controller.terminations(), 2);
    assert_eq!(controller.max_live(), 1);
}
