//! Network timer substrate backed by a local timer service.
//!
//! Arming is `POST /api/timer`, cancelling is `DELETE /api/timer`, and fired
//! timers arrive on the `GET /events` server-sent event stream. The stream
//! reconnects forever with a fixed backoff; each time it comes up the last
//! armed request is sent again so a restarted service picks the timer back
//! up. Every HTTP command, re-sends included, goes through one queue so the
//! service always ends up holding the newest request.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use reqwest::Client;
use reqwest::header::ACCEPT;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{Notify, watch};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::constants::RECONNECT_BACKOFF_SECS;
use crate::error::{IdleError, Result};
use crate::idle::{FiredTimer, SubstrateStatus, TimerRequest, TimerSubstrate};
use crate::util::normalize_url;

use super::sse::{SseDecoder, ServiceMessage};

enum Command {
    Schedule(TimerRequest),
    Cancel,
    /// Send whatever is armed when the command is reached.
    Resend,
}

struct Shared {
    client: Client,
    events_url: Url,
    timer_url: Url,
    backoff: Duration,
    last: Mutex<Option<TimerRequest>>,
    status: watch::Sender<SubstrateStatus>,
    wake: Notify,
}

impl Shared {
    fn last(&self) -> Option<TimerRequest> {
        self.last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn remember(&self, request: Option<TimerRequest>) {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = request;
    }

    fn set_status(&self, status: SubstrateStatus) {
        self.status.send_replace(status);
    }

    async fn post(&self, request: &TimerRequest) -> Result<()> {
        self.client
            .post(self.timer_url.clone())
            .json(request)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| IdleError::Substrate(format!("schedule timer: {err}")))?;
        debug!(fire_at = request.fire_at, event_type = %request.event_type, "timer sent to service");
        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        self.client
            .delete(self.timer_url.clone())
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| IdleError::Substrate(format!("cancel timer: {err}")))?;
        Ok(())
    }
}

/// Client for the timer service.
pub struct RemoteTimer {
    shared: Arc<Shared>,
    commands: UnboundedSender<Command>,
    status: watch::Receiver<SubstrateStatus>,
    tasks: Vec<AbortHandle>,
}

impl RemoteTimer {
    /// Connect to the service at `base_url` and start the event stream.
    pub fn connect(handle: &Handle, base_url: &str, fired_tx: UnboundedSender<FiredTimer>) -> Result<Self> {
        Self::with_backoff(
            handle,
            base_url,
            fired_tx,
            Duration::from_secs(RECONNECT_BACKOFF_SECS),
        )
    }

    pub fn with_backoff(
        handle: &Handle,
        base_url: &str,
        fired_tx: UnboundedSender<FiredTimer>,
        backoff: Duration,
    ) -> Result<Self> {
        let mut base = normalize_url(base_url.trim());
        if !base.ends_with('/') {
            base.push('/');
        }
        let base = Url::parse(&base)
            .map_err(|err| IdleError::Substrate(format!("invalid timer service URL {base_url}: {err}")))?;
        let join = |path: &str| {
            base.join(path)
                .map_err(|err| IdleError::Substrate(format!("invalid timer service URL {base_url}: {err}")))
        };

        let (status_tx, status_rx) = watch::channel(SubstrateStatus::Connecting);
        let shared = Arc::new(Shared {
            client: Client::new(),
            events_url: join("events")?,
            timer_url: join("api/timer")?,
            backoff,
            last: Mutex::new(None),
            status: status_tx,
            wake: Notify::new(),
        });

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let tasks = vec![
            handle
                .spawn(run_events(Arc::clone(&shared), commands_tx.clone(), fired_tx))
                .abort_handle(),
            handle
                .spawn(run_commands(Arc::clone(&shared), commands_rx))
                .abort_handle(),
        ];

        info!(url = %base, "timer service client started");
        Ok(Self {
            shared,
            commands: commands_tx,
            status: status_rx,
            tasks,
        })
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| IdleError::Substrate("timer service client stopped".into()))
    }
}

impl TimerSubstrate for RemoteTimer {
    fn label(&self) -> &'static str {
        "service"
    }

    fn status(&self) -> SubstrateStatus {
        self.status.borrow().clone()
    }

    fn schedule_timer(&mut self, request: TimerRequest) -> Result<()> {
        self.shared.remember(Some(request.clone()));
        self.send(Command::Schedule(request))
    }

    fn cancel_timer(&mut self) -> Result<()> {
        self.shared.remember(None);
        self.send(Command::Cancel)
    }

    fn reconnect(&mut self) {
        info!("timer service reconnect requested");
        self.shared.wake.notify_one();
    }
}

impl Drop for RemoteTimer {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

// ── Background tasks ─────────────────────────────────────────────────

async fn run_commands(shared: Arc<Shared>, mut commands: UnboundedReceiver<Command>) {
    while let Some(command) = commands.recv().await {
        let result = match command {
            Command::Schedule(request) => shared.post(&request).await,
            Command::Cancel => shared.delete().await,
            Command::Resend => match shared.last() {
                Some(request) => shared.post(&request).await,
                None => Ok(()),
            },
        };
        // The event stream re-sends the last request once the link is back.
        if let Err(err) = result {
            warn!(error = %err, "timer service command failed");
        }
    }
}

async fn run_events(
    shared: Arc<Shared>,
    commands: UnboundedSender<Command>,
    fired_tx: UnboundedSender<FiredTimer>,
) {
    let mut decoder = SseDecoder::new();
    while !fired_tx.is_closed() {
        shared.set_status(SubstrateStatus::Connecting);
        let reason = match stream_events(&shared, &commands, &fired_tx, &mut decoder).await {
            Ok(()) => "stream closed".to_string(),
            Err(err) => err.to_string(),
        };
        decoder.reset();
        warn!(reason = %reason, "timer service disconnected");
        shared.set_status(SubstrateStatus::Disconnected(reason));

        tokio::select! {
            _ = tokio::time::sleep(shared.backoff) => {}
            _ = shared.wake.notified() => {}
        }
    }
}

async fn stream_events(
    shared: &Shared,
    commands: &UnboundedSender<Command>,
    fired_tx: &UnboundedSender<FiredTimer>,
    decoder: &mut SseDecoder,
) -> Result<()> {
    let mut response = shared
        .client
        .get(shared.events_url.clone())
        .header(ACCEPT, "text/event-stream")
        .send()
        .await
        .and_then(|response| response.error_for_status())
        .map_err(|err| IdleError::Substrate(format!("connect: {err}")))?;

    shared.set_status(SubstrateStatus::Connected);
    info!(url = %shared.events_url, "timer service connected");
    if commands.send(Command::Resend).is_err() {
        return Err(IdleError::Substrate("timer service client stopped".into()));
    }

    loop {
        let chunk = tokio::select! {
            chunk = response.chunk() => {
                chunk.map_err(|err| IdleError::Substrate(format!("read: {err}")))?
            }
            _ = shared.wake.notified() => {
                return Err(IdleError::Substrate("reconnect requested".into()));
            }
        };
        let Some(chunk) = chunk else {
            return Ok(());
        };

        for frame in decoder.push(&chunk) {
            match ServiceMessage::parse(&frame.data) {
                Some(ServiceMessage::TimerFired(fired)) => {
                    let finished = shared
                        .last()
                        .is_some_and(|last| last.event_data == fired.event_data);
                    if finished {
                        shared.remember(None);
                    }
                    if fired_tx.send(fired).is_err() {
                        return Ok(());
                    }
                }
                Some(ServiceMessage::Connected) => debug!("timer service handshake"),
                Some(ServiceMessage::Other(kind)) => debug!(kind = %kind, "ignoring service message"),
                None => debug!(data = %frame.data, "ignoring unreadable frame"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use std::net::TcpListener;
    use std::sync::mpsc as std_mpsc;
    use std::thread;

    use serde_json::{Value, json};
    use tiny_http::{Header, Response, Server};
    use tokio::time::{Instant, sleep, timeout};

    use super::*;

    /// A request seen by the mock service.
    #[derive(Debug)]
    struct Seen {
        method: String,
        path: String,
        body: String,
    }

    /// Mock timer service: serves `first_stream` on the first `/events`
    /// connection, 503 on later ones, and reports every other request.
    fn mock_service(first_stream: &'static str) -> (String, std_mpsc::Receiver<Seen>) {
        let server = Server::http("127.0.0.1:0").unwrap();
        let port = server.server_addr().to_ip().unwrap().port();
        let (seen_tx, seen_rx) = std_mpsc::channel();

        thread::spawn(move || {
            let mut streams = 0;
            for mut request in server.incoming_requests() {
                let method = request.method().to_string();
                let path = request.url().to_string();
                if path == "/events" {
                    streams += 1;
                    let response = if streams == 1 {
                        let header =
                            Header::from_bytes(&b"Content-Type"[..], &b"text/event-stream"[..]).unwrap();
                        Response::from_string(first_stream).with_header(header)
                    } else {
                        Response::from_string("down").with_status_code(503)
                    };
                    let _ = request.respond(response);
                    continue;
                }
                let mut body = String::new();
                let _ = request.as_reader().read_to_string(&mut body);
                let _ = request.respond(Response::from_string("ok"));
                let _ = seen_tx.send(Seen { method, path, body });
            }
        });

        (format!("127.0.0.1:{port}"), seen_rx)
    }

    fn next_seen(rx: &std_mpsc::Receiver<Seen>) -> Seen {
        rx.recv_timeout(Duration::from_secs(5)).expect("no request reached the mock")
    }

    fn request(id: u64) -> TimerRequest {
        TimerRequest {
            fire_at: 1_718_182_800_000,
            event_type: "SCHEDULE_ONCE_TRIGGER".into(),
            event_data: json!({ "kind": "once", "timerId": id }),
        }
    }

    #[tokio::test]
    async fn fired_timers_are_forwarded() {
        let (url, _seen) = mock_service(concat!(
            "data: {\"type\":\"CONNECTED\"}\n\n",
            ": ping\n\n",
            "data: {\"type\":\"TIMER_FIRED\",\"data\":{\"eventType\":\"IDLE_TRIGGER\",\"eventData\":{\"timerId\":9}}}\n\n",
        ));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _timer = RemoteTimer::with_backoff(&Handle::current(), &url, tx, Duration::from_millis(50)).unwrap();

        let fired = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert_eq!(fired.event_type, "IDLE_TRIGGER");
        assert_eq!(fired.event_data["timerId"], 9);
    }

    #[tokio::test]
    async fn schedule_and_cancel_reach_the_service() {
        let (url, seen) = mock_service("");
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut timer =
            RemoteTimer::with_backoff(&Handle::current(), &url, tx, Duration::from_secs(60)).unwrap();

        timer.schedule_timer(request(1)).unwrap();
        let posted = tokio::task::spawn_blocking(move || {
            let first = next_seen(&seen);
            (first, seen)
        })
        .await
        .unwrap();
        let (first, seen) = posted;
        assert_eq!(first.method, "POST");
        assert_eq!(first.path, "/api/timer");
        let body: Value = serde_json::from_str(&first.body).unwrap();
        assert_eq!(body["fireAt"], 1_718_182_800_000_i64);
        assert_eq!(body["eventType"], "SCHEDULE_ONCE_TRIGGER");
        assert_eq!(body["eventData"]["timerId"], 1);

        timer.cancel_timer().unwrap();
        let deleted = tokio::task::spawn_blocking(move || {
            // The connect-time re-send of the armed request may land first.
            loop {
                let next = next_seen(&seen);
                if next.method != "POST" {
                    return next;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(deleted.method, "DELETE");
        assert_eq!(deleted.path, "/api/timer");
    }

    #[tokio::test]
    async fn armed_request_is_resent_on_connect() {
        let (url, seen) = mock_service("");
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut timer =
            RemoteTimer::with_backoff(&Handle::current(), &url, tx, Duration::from_millis(50)).unwrap();
        // Armed before the stream connects: one POST from the command, one
        // from the connect-time re-send.
        timer.schedule_timer(request(5)).unwrap();

        let bodies = tokio::task::spawn_blocking(move || {
            (0..2).map(|_| next_seen(&seen).body).collect::<Vec<_>>()
        })
        .await
        .unwrap();
        assert_eq!(bodies[0], bodies[1]);
    }

    #[tokio::test]
    async fn connect_resend_never_overtakes_a_newer_schedule() {
        let (url, seen) = mock_service("");
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut timer =
            RemoteTimer::with_backoff(&Handle::current(), &url, tx, Duration::from_millis(50)).unwrap();
        timer.schedule_timer(request(1)).unwrap();
        timer.schedule_timer(request(2)).unwrap();

        let posts = tokio::task::spawn_blocking(move || {
            let mut posts = Vec::new();
            while let Ok(next) = seen.recv_timeout(Duration::from_millis(500)) {
                if next.method == "POST" {
                    posts.push(serde_json::from_str::<Value>(&next.body).unwrap());
                }
            }
            posts
        })
        .await
        .unwrap();
        assert!(posts.len() >= 2, "{posts:?}");
        assert_eq!(posts.last().unwrap()["eventData"]["timerId"], 2);
    }

    #[tokio::test]
    async fn unreachable_service_reports_disconnected() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let (tx, _rx) = mpsc::unbounded_channel();
        let timer = RemoteTimer::with_backoff(
            &Handle::current(),
            &format!("http://127.0.0.1:{port}"),
            tx,
            Duration::from_millis(50),
        )
        .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let SubstrateStatus::Disconnected(reason) = timer.status() {
                assert!(reason.contains("connect"), "{reason}");
                break;
            }
            assert!(Instant::now() < deadline, "never reported disconnected");
            sleep(Duration::from_millis(20)).await;
        }
    }

    #[test]
    fn bad_url_is_rejected() {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = RemoteTimer::connect(runtime.handle(), "http://[::1", tx).err().unwrap();
        assert!(matches!(err, IdleError::Substrate(_)));
    }
}
