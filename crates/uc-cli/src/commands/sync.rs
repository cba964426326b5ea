//! The check-usage pass: reconstruct recent sessions and record them in the
//! calendar.

use std::future::Future;
use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use uc_calendar::{ConsentBroker, PendingConsent, UpsertRequest, UpsertSequencer};
use uc_core::{AuthGate, SourceError, app_label, lookback_window};
use uc_db::Database;

use super::sessions::{recent_sessions, write_usage_access_hint};
use super::util::resolve_now;
use crate::AppState;

pub fn run<W: Write>(
    writer: &mut W,
    db: &mut Database,
    state: &mut AppState,
    now: Option<&str>,
    no_consent: bool,
) -> Result<()> {
    let now_ms = resolve_now(now)?.timestamp_millis();

    let sessions = match recent_sessions(&state.usage_source(), db, &state.config, now_ms) {
        Ok(sessions) => sessions,
        Err(SourceError::PermissionDenied { path }) => {
            return write_usage_access_hint(writer, &path);
        }
        Err(err) => return Err(err).context("failed to read usage events"),
    };
    let Some(account) = state.account.clone() else {
        writeln!(writer, "Not signed in. Run `uc login` first.")?;
        return Ok(());
    };
    if sessions.is_empty() {
        writeln!(writer, "No sessions to sync.")?;
        return Ok(());
    }

    let requests: Vec<UpsertRequest> = sessions
        .into_iter()
        .map(|session| {
            let name = app_label(db, &session.app);
            UpsertRequest::new(session, name)
        })
        .collect();

    let (window_start, _) = lookback_window(now_ms);
    let handles = db
        .load_handles(window_start)
        .context("failed to load calendar handles")?;
    let (broker, consent) = ConsentBroker::new(Some(account));
    let sequencer = UpsertSequencer::with_handles(state.calendar_client()?, broker, handles);

    let (report, handles) = block_on_with_consent(consent, !no_consent, async {
        let report = sequencer.run_pass(&requests).await;
        (report, sequencer.handles().await)
    })?;

    let saved = db
        .save_handles(&handles)
        .context("failed to save calendar handles")?;
    let pruned = db
        .prune_handles(window_start)
        .context("failed to prune calendar handles")?;
    tracing::debug!(saved, pruned, "persisted calendar handles");
    persist_credential(db, state, sequencer.auth())?;

    writeln!(
        writer,
        "Synced {} sessions: {} created, {} extended, {} failed",
        requests.len(),
        report.created,
        report.extended,
        report.failed
    )?;
    Ok(())
}

/// Runs `work` on a fresh runtime while a responder answers consent requests.
///
/// With `interactive` unset every consent request is declined immediately.
pub(crate) fn block_on_with_consent<F: Future>(
    consent: mpsc::UnboundedReceiver<PendingConsent>,
    interactive: bool,
    work: F,
) -> Result<F::Output> {
    let runtime = tokio::runtime::Runtime::new().context("failed to initialize tokio runtime")?;
    Ok(runtime.block_on(async move {
        let responder = if interactive {
            Some(tokio::spawn(answer_on_stdin(consent)))
        } else {
            drop(consent);
            None
        };
        let output = work.await;
        if let Some(responder) = responder {
            responder.abort();
        }
        output
    }))
}

/// Stores the credential again if consent refreshed its access token.
pub(crate) fn persist_credential(
    db: &mut Database,
    state: &mut AppState,
    broker: &ConsentBroker,
) -> Result<()> {
    let current = broker.current_credential();
    if current == state.account {
        return Ok(());
    }
    if let Some(credential) = &current {
        db.save_credential(credential)
            .context("failed to store refreshed account")?;
        tracing::info!(email = %credential.email, "stored refreshed calendar access");
    }
    state.account = current;
    Ok(())
}

async fn answer_on_stdin(mut requests: mpsc::UnboundedReceiver<PendingConsent>) {
    while let Some(pending) = requests.recv().await {
        let prompt = format!(
            "Calendar access is needed to {}.\nScope: {}\nPaste an access token to grant it, or press Enter to decline: ",
            pending.request().reason,
            pending.request().scope
        );
        match tokio::task::spawn_blocking(move || read_answer(&prompt)).await {
            Ok(Ok(token)) if !token.is_empty() => pending.grant_with_token(token),
            Ok(Ok(_)) => pending.decline(),
            Ok(Err(err)) => {
                tracing::warn!(%err, "failed to read consent answer");
                pending.decline();
            }
            Err(err) => {
                tracing::warn!(%err, "consent prompt task failed");
                pending.decline();
            }
        }
    }
}

fn read_answer(prompt: &str) -> std::io::Result<String> {
    let mut stderr = std::io::stderr().lock();
    write!(stderr, "{prompt}")?;
    stderr.flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    use mockito::Matcher;
    use uc_core::{AppId, AppInfo, CalendarEventHandle, Credential, RemoteEventId, SessionKey};

    use crate::Config;

    const NOW: &str = "2026-01-15T10:30:00Z";
    // 2026-01-15T10:00:00Z
    const T0: i64 = 1_768_471_200_000;

    struct Fixture {
        temp: tempfile::TempDir,
        db: Database,
        state: AppState,
    }

    fn fixture(api_base: &str, access_token: Option<&str>) -> Fixture {
        let temp = tempfile::tempdir().unwrap();
        let events_path = temp.path().join("usage.jsonl");
        let events = [
            format!(r#"{{"package":"com.example.reader","timestamp_ms":{T0},"kind":"foreground"}}"#),
            format!(
                r#"{{"package":"com.example.reader","timestamp_ms":{},"kind":"background"}}"#,
                T0 + 600_000
            ),
        ];
        std::fs::write(&events_path, events.join("\n")).unwrap();

        let mut db = Database::open_in_memory().unwrap();
        db.upsert_app(&AppInfo {
            app: AppId::new("com.example.reader").unwrap(),
            display_name: Some("Reader".to_string()),
            is_system: false,
        })
        .unwrap();

        let mut account = Credential::new("user@example.com", "id-token");
        account.access_token = access_token.map(ToString::to_string);
        db.save_credential(&account).unwrap();

        let state = AppState {
            config: Config {
                events_path,
                calendar_api_base: api_base.to_string(),
                ..Config::default()
            },
            account: Some(account),
        };
        Fixture {
            temp,
            db,
            state,
        }
    }

    #[test]
    fn sync_creates_then_extends_across_passes() {
        let mut server = mockito::Server::new();
        let mut fx = fixture(&server.url(), Some("ya29.a"));

        let create = server
            .mock("POST", "/calendars/primary/events")
            .match_header("authorization", "Bearer ya29.a")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "summary": "Used Reader",
                "description": "Package: com.example.reader",
                "end": { "dateTime": "2026-01-15T10:10:00.000Z" }
            })))
            .with_status(200)
            .with_body(r#"{"id":"evt-1"}"#)
            .expect(1)
            .create();

        let mut output = Vec::new();
        run(&mut output, &mut fx.db, &mut fx.state, Some(NOW), true).unwrap();
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "Synced 1 sessions: 1 created, 0 extended, 0 failed\n"
        );
        create.assert();
        assert_eq!(fx.db.count_handles().unwrap(), 1);

        // The session keeps going; the next pass extends the same event.
        let mut log = std::fs::read_to_string(&fx.state.config.events_path).unwrap();
        log.push_str(&format!(
            "\n{{\"package\":\"com.example.reader\",\"timestamp_ms\":{},\"kind\":\"foreground\"}}",
            T0 + 601_000
        ));
        std::fs::write(&fx.state.config.events_path, log).unwrap();

        let get = server
            .mock("GET", "/calendars/primary/events/evt-1")
            .with_status(200)
            .with_body(
                r#"{"id":"evt-1","summary":"Used Reader","end":{"dateTime":"2026-01-15T10:10:00.000Z"}}"#,
            )
            .expect(1)
            .create();
        let update = server
            .mock("PUT", "/calendars/primary/events/evt-1")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "summary": "Used Reader",
                "end": { "dateTime": "2026-01-15T10:30:00.000Z" }
            })))
            .with_status(200)
            .with_body(r#"{"id":"evt-1"}"#)
            .expect(1)
            .create();

        let mut output = Vec::new();
        run(&mut output, &mut fx.db, &mut fx.state, Some(NOW), true).unwrap();
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "Synced 1 sessions: 0 created, 1 extended, 0 failed\n"
        );
        get.assert();
        update.assert();
        create.assert();
    }

    #[test]
    fn declined_consent_counts_as_failure() {
        let server = mockito::Server::new();
        let mut fx = fixture(&server.url(), None);

        let mut output = Vec::new();
        run(&mut output, &mut fx.db, &mut fx.state, Some(NOW), true).unwrap();
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "Synced 1 sessions: 0 created, 0 extended, 1 failed\n"
        );
        assert_eq!(fx.db.count_handles().unwrap(), 0);
    }

    #[test]
    fn missing_event_is_forgotten_even_if_recreate_fails() {
        let mut server = mockito::Server::new();
        let mut fx = fixture(&server.url(), Some("ya29.a"));
        fx.db
            .save_handles(&[CalendarEventHandle {
                key: SessionKey {
                    app: AppId::new("com.example.reader").unwrap(),
                    start_ms: T0,
                },
                remote_event_id: Some(RemoteEventId::new("evt-gone").unwrap()),
            }])
            .unwrap();

        let get = server
            .mock("GET", "/calendars/primary/events/evt-gone")
            .with_status(404)
            .with_body(r#"{"error":{"code":404,"message":"Not Found"}}"#)
            .expect(1)
            .create();
        let create = server
            .mock("POST", "/calendars/primary/events")
            .with_status(503)
            .with_body(r#"{"error":{"code":503,"message":"backend error"}}"#)
            .expect(1)
            .create();

        let mut output = Vec::new();
        run(&mut output, &mut fx.db, &mut fx.state, Some(NOW), true).unwrap();
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "Synced 1 sessions: 0 created, 0 extended, 1 failed\n"
        );
        get.assert();
        create.assert();
        assert!(fx.db.load_handles(0).unwrap().is_empty());
    }

    #[test]
    fn missing_usage_log_is_reported_before_sign_in() {
        let server = mockito::Server::new();
        let mut fx = fixture(&server.url(), None);
        fx.state.account = None;
        fx.state.config.events_path = fx.temp.path().join("nope.jsonl");

        let mut output = Vec::new();
        run(&mut output, &mut fx.db, &mut fx.state, Some(NOW), true).unwrap();
        let output = String::from_utf8(output).unwrap();
        assert!(output.starts_with("Usage access not granted"), "{output}");
        assert!(!output.contains("Not signed in"), "{output}");
    }

    #[test]
    fn signed_out_asks_for_login() {
        let server = mockito::Server::new();
        let mut fx = fixture(&server.url(), Some("ya29.a"));
        fx.state.account = None;

        let mut output = Vec::new();
        run(&mut output, &mut fx.db, &mut fx.state, Some(NOW), true).unwrap();
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "Not signed in. Run `uc login` first.\n"
        );
    }

    #[test]
    fn missing_usage_log_aborts_pass() {
        let server = mockito::Server::new();
        let mut fx = fixture(&server.url(), Some("ya29.a"));
        fx.state.config.events_path = fx.temp.path().join("nope.jsonl");

        let mut output = Vec::new();
        run(&mut output, &mut fx.db, &mut fx.state, Some(NOW), true).unwrap();
        assert!(
            String::from_utf8(output)
                .unwrap()
                .starts_with("Usage access not granted")
        );
    }

    #[test]
    fn refreshed_credential_is_persisted() {
        let mut db = Database::open_in_memory().unwrap();
        let account = Credential::new("user@example.com", "id-token");
        db.save_credential(&account).unwrap();
        let mut state = AppState {
            config: Config::default(),
            account: Some(account.clone()),
        };
        let (broker, _requests) = ConsentBroker::new(Some(account.with_access_token("ya29.new")));

        persist_credential(&mut db, &mut state, &broker).unwrap();

        assert_eq!(
            db.load_credential().unwrap().unwrap().access_token.as_deref(),
            Some("ya29.new")
        );
        assert_eq!(
            state.account.unwrap().access_token.as_deref(),
            Some("ya29.new")
        );
    }
}
