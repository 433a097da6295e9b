use std::collections::HashMap;
use sysdock_core::*;

#[test]
fn test_container_id_from_runtime_output() {
    // `docker create` prints the id followed by a newline
    let id = ContainerId::new("4f1c2e9d0a7b4f1c2e9d0a7b\n").unwrap();
    assert_eq!(id.as_str(), "4f1c2e9d0a7b4f1c2e9d0a7b");
    assert_eq!(id.short(), "4f1c2e9d0a7b");

    assert!(ContainerId::new("").is_err());
    assert!(ContainerId::new("a".repeat(65)).is_err());
    assert!(ContainerId::new("Error: No such image").is_err());
}

#[test]
fn test_container_name_validation() {
    assert_eq!(ContainerName::new("/registry").unwrap().as_str(), "registry");
    assert!(ContainerName::new("web-1.prod_a").is_ok());

    assert!(ContainerName::new("").is_err());
    assert!(ContainerName::new("-web").is_err());
    assert!(ContainerName::new("web server").is_err());
}

#[test]
fn test_run_context_is_serializable() {
    let mut networks = Networks::default();
    networks.add("backend:10.0.0.5").unwrap();

    let ctx = RunContext::new(ContainerName::new("registry").unwrap())
        .with_cgroups(CgroupSelection::from_names(["memory"]))
        .with_networks(networks)
        .with_remove_on_exit(true);

    let json = serde_json::to_value(&ctx).unwrap();
    assert_eq!(json["name"], "registry");
    assert_eq!(json["networks"]["backend"], "10.0.0.5");
    assert_eq!(json["cgroups"]["named"][0], "memory");
    assert_eq!(json["remove_on_exit"], true);
}

#[test]
fn test_empty_notify_socket_means_none() {
    let ctx = RunContext::new(ContainerName::new("web").unwrap())
        .with_notify_socket(Some(String::new()));
    assert_eq!(ctx.notify_socket, None);
}

#[test]
fn test_event_classification() {
    let mut attributes = HashMap::new();
    attributes.insert("execID".to_string(), "9a1b".to_string());
    attributes.insert("exitCode".to_string(), "137".to_string());

    assert_eq!(
        RuntimeEvent::from_action("exec_die", &attributes),
        RuntimeEvent::ExecDie {
            exec_id: "9a1b".to_string(),
            exit_code: Some(137),
        }
    );
    assert_eq!(
        RuntimeEvent::from_action("exec_start: /bin/sh -c pg_isready", &attributes),
        RuntimeEvent::ExecStart {
            exec_id: "9a1b".to_string(),
            command: "/bin/sh -c pg_isready".to_string(),
        }
    );
    assert!(RuntimeEvent::from_action("stop", &attributes).is_stop());
    assert!(!RuntimeEvent::from_action("kill", &attributes).is_stop());
}

#[test]
fn test_error_messages() {
    let err = Error::ProcessExitedBeforeNotify {
        name: "web".to_string(),
    };
    assert_eq!(
        err.to_string(),
        "container 'web' exited before the supervisor could be notified"
    );

    let err = Error::cgroup_io(
        "/sys/fs/cgroup/memory/cgroup.procs",
        std::io::Error::from(std::io::ErrorKind::PermissionDenied),
    );
    assert!(err.to_string().contains("/sys/fs/cgroup/memory/cgroup.procs"));
    assert!(std::error::Error::source(&err).is_some());
}
