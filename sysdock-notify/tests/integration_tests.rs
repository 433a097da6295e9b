use sysdock_core::*;
use sysdock_notify::*;
use sysdock_runtime::*;

fn container(health_check: Option<Vec<String>>) -> ContainerInfo {
    ContainerInfo {
        id: ContainerId::new("4f1c2e9d0a7b").unwrap(),
        name: "registry".to_string(),
        running: true,
        pid: ProcessId::from_raw(4242),
        health_check,
    }
}

fn exec_cycle(exec_id: &str, exit_code: i32) -> [RuntimeEvent; 2] {
    [
        RuntimeEvent::ExecStart {
            exec_id: exec_id.to_string(),
            command: "/bin/sh -c wget -q -O- http://localhost:5000/".to_string(),
        },
        RuntimeEvent::ExecDie {
            exec_id: exec_id.to_string(),
            exit_code: Some(exit_code),
        },
    ]
}

#[tokio::test]
async fn test_monitor_subscribes_with_health_filter() {
    let info = container(Some(vec![
        "CMD-SHELL".to_string(),
        "wget -q -O- http://localhost:5000/".to_string(),
    ]));
    let id = info.id.clone();
    let runtime = MockRuntime::new().with_container(info).await;

    let monitor = HealthMonitor::create(&runtime, &id, RecordingNotifier::new())
        .await
        .unwrap()
        .expect("container has a health check");
    assert_eq!(monitor.state(), ReadinessState::NotReady);

    let subscription = runtime
        .calls()
        .await
        .into_iter()
        .find_map(|call| match call {
            Call::Events(filter) => Some(filter),
            _ => None,
        })
        .unwrap();
    assert_eq!(subscription.container, id);
    assert_eq!(subscription.events, MONITOR_EVENTS.map(String::from).to_vec());
    assert!(subscription.since.is_some());
}

#[tokio::test]
async fn test_disabled_health_check_creates_no_monitor() {
    let info = container(Some(vec!["NONE".to_string()]));
    let id = info.id.clone();
    let runtime = MockRuntime::new().with_container(info).await;

    let monitor = HealthMonitor::create(&runtime, &id, RecordingNotifier::new())
        .await
        .unwrap();
    assert!(monitor.is_none());
    assert!(!runtime.calls().await.iter().any(|c| matches!(c, Call::Events(_))));
}

#[tokio::test]
async fn test_flapping_health_checks() {
    let info = container(Some(vec![
        "CMD-SHELL".to_string(),
        "wget -q -O- http://localhost:5000/".to_string(),
    ]));
    let id = info.id.clone();
    let runtime = MockRuntime::new().with_container(info).await;

    let mut script = Vec::new();
    script.extend(exec_cycle("a", 1));
    script.extend(exec_cycle("b", 0));
    script.extend(exec_cycle("c", 1));
    script.extend(exec_cycle("d", 0));
    script.push(RuntimeEvent::Stopped {
        action: "stop".to_string(),
    });
    runtime.script_events(script).await;

    let notifier = RecordingNotifier::new();
    let state = HealthMonitor::create(&runtime, &id, notifier.clone())
        .await
        .unwrap()
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(state, ReadinessState::Ready);
    assert_eq!(notifier.sent().await, vec![Message::Ready, Message::Watchdog]);
    assert_eq!(runtime.closed_streams().await, 1);
}
