//! Health gates.
//!
//! A service becomes ready once every configured gate passes:
//!
//! - **log**: a regex matches the container logs before a timeout.
//! - **HTTP/HTTPS**: a GET on the mapped port answers with the expected
//!   status within a fixed number of attempts.
//!
//! Both gates abort as soon as the container stops running.

use std::thread;
use std::time::{Duration, Instant};

use testcompose_common::constants;
use testcompose_common::error::{Result, TestComposeError};
use testcompose_common::types::ContainerId;
use testcompose_compose::service::{HttpWaitParameters, LogWaitParameters};

use crate::backend::ContainerRuntime;
use crate::ports::PortMap;

/// Issues a GET and returns the response status.
pub trait HttpProbe: Send + Sync {
    /// Requests `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if no response was received.
    fn status(&self, url: &str) -> Result<u16>;
}

impl<F> HttpProbe for F
where
    F: Fn(&str) -> Result<u16> + Send + Sync,
{
    fn status(&self, url: &str) -> Result<u16> {
        self(url)
    }
}

/// [`HttpProbe`] over a blocking `reqwest` client.
///
/// Certificates are not verified; test services usually present
/// self-signed ones.
#[derive(Debug, Clone)]
pub struct ReqwestProbe {
    client: reqwest::blocking::Client,
}

impl ReqwestProbe {
    /// Builds a probe whose requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialised.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| TestComposeError::Config {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }
}

impl HttpProbe for ReqwestProbe {
    fn status(&self, url: &str) -> Result<u16> {
        self.client
            .get(url)
            .send()
            .map(|response| response.status().as_u16())
            .map_err(|e| TestComposeError::Runtime {
                operation: "http probe",
                message: e.to_string(),
            })
    }
}

/// Fails with `ContainerExited` unless the container is still running.
fn ensure_running(runtime: &dyn ContainerRuntime, id: &ContainerId, service: &str) -> Result<()> {
    let inspection = runtime.inspect(id)?;
    if inspection.is_running() {
        Ok(())
    } else {
        Err(TestComposeError::ContainerExited {
            service: service.to_string(),
            status: format!("{} ({})", inspection.status, inspection.exit_code),
        })
    }
}

/// Polls the logs of `id` until `params.regex` matches.
///
/// `^` and `$` in the pattern anchor at line boundaries.
///
/// # Errors
///
/// - `ContainerExited` if the container stops before a match.
/// - `Timeout` naming the elapsed seconds if `params.timeout` passes.
pub fn wait_for_log(
    runtime: &dyn ContainerRuntime,
    id: &ContainerId,
    service: &str,
    params: &LogWaitParameters,
) -> Result<()> {
    let pattern = params.pattern().map_err(|e| TestComposeError::Config {
        message: format!("service \"{service}\": invalid log_line_regex: {e}"),
    })?;
    let started = Instant::now();
    loop {
        if pattern.is_match(&runtime.logs(id)?) {
            tracing::debug!(
                service = %service,
                elapsed_ms = started.elapsed().as_millis(),
                "log pattern matched"
            );
            return Ok(());
        }
        ensure_running(runtime, id, service)?;

        let elapsed = started.elapsed();
        if elapsed >= params.timeout {
            return Err(TestComposeError::Timeout {
                service: service.to_string(),
                waiting_for: "log pattern",
                elapsed_secs: elapsed.as_secs_f64(),
            });
        }
        thread::sleep(params.poll_interval.min(params.timeout - elapsed));
    }
}

/// Probes `params.port` through its mapped host port.
///
/// Each attempt sleeps `params.startup_delay`, checks that the container
/// still runs, then requests `scheme://host:mapped/path`.
///
/// # Errors
///
/// - `ContainerExited` if the container stops.
/// - `HealthCheckFailed` naming the port if the port is not published
///   or no attempt sees the expected status.
pub fn wait_for_http(
    runtime: &dyn ContainerRuntime,
    id: &ContainerId,
    service: &str,
    params: &HttpWaitParameters,
    host: &str,
    ports: &PortMap,
    probe: &dyn HttpProbe,
) -> Result<()> {
    let failed = |reason: String| TestComposeError::HealthCheckFailed {
        service: service.to_string(),
        port: params.port,
        reason,
    };
    let mapped = ports
        .host_port(params.port)
        .ok_or_else(|| failed("port is not published".into()))?;
    let url = params.url(host, mapped);

    let mut last = String::from("no attempt made");
    for attempt in 1..=constants::HTTP_WAIT_ATTEMPTS {
        thread::sleep(params.startup_delay);
        ensure_running(runtime, id, service)?;
        match probe.status(&url) {
            Ok(status) if status == params.expected_status => {
                tracing::debug!(service = %service, %url, attempt, "http check passed");
                return Ok(());
            }
            Ok(status) => {
                last = format!("expected status {} but got {status}", params.expected_status);
            }
            Err(e) => last = e.to_string(),
        }
        tracing::debug!(service = %service, %url, attempt, reason = %last, "http check attempt failed");
    }
    Err(failed(last))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use testcompose_compose::port::PortSpec;

    use super::*;
    use crate::backend::RunRequest;
    use crate::backend::memory::{ImageBehaviour, InMemoryRuntime};

    struct ScriptedProbe {
        statuses: Mutex<Vec<Result<u16>>>,
        urls: Mutex<Vec<String>>,
    }

    impl ScriptedProbe {
        fn new(mut statuses: Vec<Result<u16>>) -> Self {
            statuses.reverse();
            Self {
                statuses: Mutex::new(statuses),
                urls: Mutex::new(Vec::new()),
            }
        }
    }

    impl HttpProbe for ScriptedProbe {
        fn status(&self, url: &str) -> Result<u16> {
            self.urls.lock().unwrap().push(url.to_string());
            self.statuses.lock().unwrap().pop().unwrap_or(Ok(500))
        }
    }

    fn start(rt: &InMemoryRuntime, image: &str) -> (ContainerId, PortMap) {
        let request = RunRequest {
            name: "svc".into(),
            hostname: "svc".into(),
            image: image.into(),
            command: None,
            entrypoint: None,
            environment: BTreeMap::new(),
            ports: vec![PortSpec::any(8080)],
            volumes: Vec::new(),
            network: "net".into(),
            labels: BTreeMap::new(),
        };
        let id = rt.run(&request).expect("run");
        let ports = PortMap::from_bindings(&rt.inspect(&id).expect("inspect").ports);
        (id, ports)
    }

    fn log_params(regex: &str, timeout_ms: u64) -> LogWaitParameters {
        LogWaitParameters {
            regex: regex.into(),
            timeout: Duration::from_millis(timeout_ms),
            poll_interval: Duration::from_millis(5),
        }
    }

    fn http_params() -> HttpWaitParameters {
        let mut params = HttpWaitParameters::new(8080);
        params.path = "/ping".into();
        params.startup_delay = Duration::ZERO;
        params
    }

    #[test]
    fn log_gate_passes_on_match() {
        let rt = InMemoryRuntime::new().with_network("net").with_image(
            "db",
            ImageBehaviour::default().with_logs("booting\ndatabase system is ready to accept connections\n"),
        );
        let (id, _) = start(&rt, "db");
        wait_for_log(&rt, &id, "db", &log_params("ready to accept", 1_000)).expect("match");
    }

    #[test]
    fn log_gate_anchors_match_single_lines() {
        let rt = InMemoryRuntime::new().with_network("net").with_image(
            "db",
            ImageBehaviour::default().with_logs("booting\nready to accept connections\nlistening\n"),
        );
        let (id, _) = start(&rt, "db");
        wait_for_log(&rt, &id, "db", &log_params("^ready to accept connections$", 50))
            .expect("line match");
    }

    #[test]
    fn log_gate_times_out() {
        let rt = InMemoryRuntime::new().with_network("net");
        let (id, _) = start(&rt, "quiet");
        let err = wait_for_log(&rt, &id, "quiet", &log_params("never", 30)).unwrap_err();
        match err {
            TestComposeError::Timeout {
                service,
                elapsed_secs,
                ..
            } => {
                assert_eq!(service, "quiet");
                assert!(elapsed_secs >= 0.03);
            }
            other => panic!("expected timeout, got {other}"),
        }
    }

    #[test]
    fn log_gate_stops_when_container_exits() {
        let rt = InMemoryRuntime::new()
            .with_network("net")
            .with_image("crash", ImageBehaviour::default().exiting(1));
        let (id, _) = start(&rt, "crash");
        let err = wait_for_log(&rt, &id, "crash", &log_params("ready", 10_000)).unwrap_err();
        assert!(matches!(err, TestComposeError::ContainerExited { .. }));
    }

    #[test]
    fn log_gate_sees_late_output() {
        let rt = InMemoryRuntime::new().with_network("net");
        let (id, _) = start(&rt, "slow");
        rt.append_logs(&id, "started!\n").expect("append");
        wait_for_log(&rt, &id, "slow", &log_params("(?i)STARTED", 100)).expect("match");
    }

    #[test]
    fn http_gate_retries_until_expected_status() {
        let rt = InMemoryRuntime::new().with_network("net");
        let (id, ports) = start(&rt, "api");
        let probe = ScriptedProbe::new(vec![
            Err(TestComposeError::Runtime {
                operation: "http probe",
                message: "connection refused".into(),
            }),
            Ok(503),
            Ok(200),
        ]);
        wait_for_http(&rt, &id, "api", &http_params(), "127.0.0.1", &ports, &probe)
            .expect("healthy");
        let urls = probe.urls.lock().unwrap();
        assert_eq!(urls.len(), 3);
        assert_eq!(urls[0], "http://127.0.0.1:32768/ping");
    }

    #[test]
    fn http_gate_fails_after_three_attempts() {
        let rt = InMemoryRuntime::new().with_network("net");
        let (id, ports) = start(&rt, "api");
        let probe = ScriptedProbe::new(vec![Ok(500), Ok(500), Ok(500), Ok(200)]);
        let err = wait_for_http(&rt, &id, "api", &http_params(), "h", &ports, &probe).unwrap_err();
        assert!(
            matches!(err, TestComposeError::HealthCheckFailed { port: 8080, ref reason, .. } if reason.contains("500"))
        );
        assert_eq!(probe.urls.lock().unwrap().len(), 3);
    }

    #[test]
    fn http_gate_aborts_when_container_exits() {
        let rt = InMemoryRuntime::new()
            .with_network("net")
            .with_image("crash", ImageBehaviour::default().exiting(137));
        let (id, ports) = start(&rt, "crash");
        let probe = ScriptedProbe::new(vec![Ok(200)]);
        let err =
            wait_for_http(&rt, &id, "crash", &http_params(), "h", &ports, &probe).unwrap_err();
        assert!(matches!(err, TestComposeError::ContainerExited { .. }));
        assert!(probe.urls.lock().unwrap().is_empty());
    }

    #[test]
    fn http_gate_requires_published_port() {
        let rt = InMemoryRuntime::new().with_network("net");
        let (id, _) = start(&rt, "api");
        let probe = ScriptedProbe::new(vec![Ok(200)]);
        let err = wait_for_http(&rt, &id, "api", &http_params(), "h", &PortMap::default(), &probe)
            .unwrap_err();
        assert!(matches!(err, TestComposeError::HealthCheckFailed { .. }));
    }
}
