//! Runtime event subscriptions

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::Deserialize;
use sysdock_core::{Error, Result, RuntimeEvent};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// A live subscription to container events
///
/// `close` releases the subscription and must be called exactly once by the
/// owner when it is done, whichever way its receive loop ended.
#[async_trait]
pub trait EventStream: Send {
    /// Next event, or `None` once the subscription has ended
    async fn recv(&mut self) -> Option<RuntimeEvent>;

    /// Release the subscription
    async fn close(&mut self) -> Result<()>;
}

/// One line of `docker events --format '{{json .}}'`
#[derive(Debug, Deserialize)]
struct EventLine {
    #[serde(rename = "Action", default)]
    action: String,
    #[serde(rename = "Actor", default)]
    actor: Actor,
}

#[derive(Debug, Default, Deserialize)]
struct Actor {
    #[serde(rename = "Attributes", default)]
    attributes: HashMap<String, String>,
}

pub(crate) fn parse_event_line(line: &str) -> Result<RuntimeEvent> {
    let raw: EventLine = serde_json::from_str(line)?;
    Ok(RuntimeEvent::from_action(&raw.action, &raw.actor.attributes))
}

/// Event stream fed by a `docker events` child process
///
/// A reader task parses the child's stdout and forwards events over a
/// channel. Closing cancels the reader, which then kills the child.
#[derive(Debug)]
pub struct DockerEvents {
    rx: mpsc::Receiver<RuntimeEvent>,
    cancel: CancellationToken,
    reader: Option<JoinHandle<()>>,
}

impl DockerEvents {
    /// Channel capacity between the reader task and the consumer
    const BUFFER: usize = 64;

    /// Take over a spawned `docker events` process with piped stdout
    pub fn spawn(mut child: Child) -> Result<Self> {
        let stdout = child.stdout.take().ok_or_else(|| Error::Runtime {
            command: "docker events".to_string(),
            message: "stdout is not piped".to_string(),
        })?;

        let (tx, rx) = mpsc::channel(Self::BUFFER);
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();

            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    line = lines.next_line() => match line {
                        Ok(Some(line)) => match parse_event_line(&line) {
                            Ok(event) => {
                                trace!(%event, "Runtime event");
                                if tx.send(event).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => warn!(error = %e, line = %line, "Ignoring malformed event"),
                        },
                        Ok(None) => {
                            debug!("Event stream ended");
                            break;
                        }
                        Err(e) => {
                            warn!(error = %e, "Failed to read event stream");
                            break;
                        }
                    },
                }
            }

            if let Err(e) = child.kill().await {
                debug!(error = %e, "Event process already gone");
            }
        });

        Ok(Self {
            rx,
            cancel,
            reader: Some(reader),
        })
    }
}

#[async_trait]
impl EventStream for DockerEvents {
    async fn recv(&mut self) -> Option<RuntimeEvent> {
        self.rx.recv().await
    }

    async fn close(&mut self) -> Result<()> {
        self.cancel.cancel();
        self.rx.close();

        if let Some(reader) = self.reader.take() {
            if let Err(e) = reader.await {
                warn!(error = %e, "Event reader task failed");
            }
        }
        Ok(())
    }
}

impl Drop for DockerEvents {
    fn drop(&mut self) {
        // Stops the reader (and kills the child) if close() was never reached
        self.cancel.cancel();
    }
}

/// Event stream double that replays a fixed sequence
///
/// After the script runs out `recv` returns `None`, as if the runtime had
/// dropped the subscription.
#[derive(Debug, Default)]
pub struct ScriptedEvents {
    events: VecDeque<RuntimeEvent>,
    closes: Arc<AtomicUsize>,
}

impl ScriptedEvents {
    /// Replay `events` in order
    pub fn new(events: impl IntoIterator<Item = RuntimeEvent>) -> Self {
        Self {
            events: events.into_iter().collect(),
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Count `close` calls into a shared counter
    #[must_use]
    pub fn with_close_counter(mut self, closes: Arc<AtomicUsize>) -> Self {
        self.closes = closes;
        self
    }

    /// Number of times `close` was called
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventStream for ScriptedEvents {
    async fn recv(&mut self) -> Option<RuntimeEvent> {
        self.events.pop_front()
    }

    async fn close(&mut self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Stdio;
    use std::time::Duration;
    use sysdock_core::HealthStatus;

    #[test]
    fn test_parse_event_line() {
        let line = r#"{"status":"exec_die","id":"4f1c","from":"nginx","Type":"container","Action":"exec_die","Actor":{"ID":"4f1c","Attributes":{"execID":"9a1b","exitCode":"0","image":"nginx","name":"web"}},"scope":"local","time":1700000000,"timeNano":1700000000000000000}"#;

        assert_eq!(
            parse_event_line(line).unwrap(),
            RuntimeEvent::ExecDie {
                exec_id: "9a1b".to_string(),
                exit_code: Some(0),
            }
        );
    }

    #[test]
    fn test_parse_health_status_line() {
        let line = r#"{"status":"health_status: healthy","Type":"container","Action":"health_status: healthy","Actor":{"ID":"4f1c","Attributes":{}}}"#;
        assert_eq!(
            parse_event_line(line).unwrap(),
            RuntimeEvent::HealthStatus {
                status: HealthStatus::Healthy
            }
        );
    }

    #[test]
    fn test_parse_malformed_line() {
        assert!(matches!(parse_event_line("not json"), Err(Error::Json(_))));
    }

    #[tokio::test]
    async fn test_scripted_events() {
        let mut events = ScriptedEvents::new([RuntimeEvent::Stopped {
            action: "die".to_string(),
        }]);

        assert!(events.recv().await.is_some_and(|e| e.is_stop()));
        assert!(events.recv().await.is_none());

        events.close().await.unwrap();
        assert_eq!(events.close_count(), 1);
    }

    #[tokio::test]
    async fn test_docker_events_from_child_output() {
        let child = tokio::process::Command::new("/bin/sh")
            .arg("-c")
            .arg(r#"echo '{"Action":"health_status: healthy"}'; echo garbage; echo '{"Action":"die"}'"#)
            .stdout(Stdio::piped())
            .spawn()
            .unwrap();

        let mut events = DockerEvents::spawn(child).unwrap();

        let first = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timeout");
        assert_eq!(
            first,
            Some(RuntimeEvent::HealthStatus {
                status: HealthStatus::Healthy
            })
        );

        let second = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timeout");
        assert!(second.is_some_and(|e| e.is_stop()));

        events.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_docker_events_close_kills_child() {
        let child = tokio::process::Command::new("/bin/sh")
            .arg("-c")
            .arg("sleep 30")
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .unwrap();

        let mut events = DockerEvents::spawn(child).unwrap();
        tokio::time::timeout(Duration::from_secs(5), events.close())
            .await
            .expect("close should not hang")
            .unwrap();

        assert!(events.recv().await.is_none());
    }
}
