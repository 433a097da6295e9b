use std::time::Duration;
use sysdock_core::*;
use sysdock_runtime::*;

fn context(remove_on_exit: bool) -> RunContext {
    RunContext::new(ContainerName::new("registry").unwrap())
        .with_create_args(vec![
            "--name".to_string(),
            "registry".to_string(),
            "registry:2".to_string(),
        ])
        .with_remove_on_exit(remove_on_exit)
}

#[tokio::test]
async fn test_full_lifecycle_with_removal() {
    let runtime = MockRuntime::new();
    let ctx = context(true);
    let orchestrator = Orchestrator::new(&runtime, &ctx);

    // First run creates the container
    let first = orchestrator.resolve().await.unwrap();
    assert!(first.pid.is_valid());

    // Container exits
    runtime.set_running("registry", false).await;
    wait_for_exit(&runtime, &first.id, Duration::from_millis(50))
        .await
        .unwrap();
    orchestrator.cleanup(&first.id).await.unwrap();
    assert!(runtime.container("registry").await.is_none());

    // Next run starts from scratch
    let second = orchestrator.resolve().await.unwrap();
    assert_ne!(first.id, second.id);
}

#[tokio::test]
async fn test_restart_keeps_container() {
    let runtime = MockRuntime::new();
    let ctx = context(false);
    let orchestrator = Orchestrator::new(&runtime, &ctx);

    let first = orchestrator.resolve().await.unwrap();
    runtime.set_running("registry", false).await;
    orchestrator.cleanup(&first.id).await.unwrap();

    runtime.set_start_pid(ProcessId::from_raw(5151)).await;
    let second = orchestrator.resolve().await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.pid, ProcessId::from_raw(5151));
    assert!(!runtime.calls().await.iter().any(|c| matches!(c, Call::Remove(_))));
}

#[tokio::test]
async fn test_create_failure_propagates() {
    let runtime = MockRuntime::new();
    let ctx = RunContext::new(ContainerName::new("registry").unwrap())
        .with_create_args(vec!["registry:2".to_string()]);

    let err = Orchestrator::new(&runtime, &ctx).resolve().await.unwrap_err();
    assert!(matches!(err, Error::Launch { .. }));
}

#[tokio::test]
async fn test_docker_cli_against_fake_binary() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("docker");
    std::fs::write(
        &script,
        "#!/bin/sh\n\
         case \"$1\" in\n\
           inspect) echo 'Error: No such object: '\"$4\" >&2; exit 1 ;;\n\
           create) echo 0123456789abcdef ;;\n\
           *) exit 0 ;;\n\
         esac\n",
    )
    .unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let cli = DockerCli::new(script.to_string_lossy());

    assert_eq!(cli.inspect("registry").await.unwrap(), None);

    let id = cli
        .create(&["--name".to_string(), "registry".to_string()])
        .await
        .unwrap();
    assert_eq!(id.as_str(), "0123456789abcdef");

    cli.connect_network("backend", Some("10.0.0.5"), &id).await.unwrap();
    cli.start(&id).await.unwrap();
    cli.remove(&id).await.unwrap();
}
