// Exercises the HTTP text supply and result sink against a local server
// that mimics the web app's two endpoints.

use std::io::Read;
use std::sync::mpsc;
use std::thread;

use assert_matches::assert_matches;
use chrono::Utc;
use tiny_http::{Header, Response, Server};
use uuid::Uuid;

use tapline::error::{SubmitError, SupplyError};
use tapline::results::{HttpResultSink, ResultSink, SessionResult, SubmissionPayload};
use tapline::supply::{fetch_fan_out, HttpSupply, TextSupply};
use tapline::Language;

struct Seen {
    url: String,
    body: String,
}

/// Serve `count` requests with canned responses, reporting what was asked.
fn serve(responses: Vec<(u16, &'static str)>) -> (String, mpsc::Receiver<Seen>) {
    let server = Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr().to_ip().unwrap();
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        for (status, body) in responses {
            let Ok(mut request) = server.recv() else {
                return;
            };
            let mut received = String::new();
            let _ = request.as_reader().read_to_string(&mut received);
            let _ = tx.send(Seen {
                url: request.url().to_string(),
                body: received,
            });
            let response = Response::from_string(body)
                .with_status_code(status)
                .with_header(
                    Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap(),
                );
            let _ = request.respond(response);
        }
    });

    (format!("http://{addr}"), rx)
}

fn payload() -> SubmissionPayload {
    SessionResult {
        language: Language::Fr,
        wpm: 61,
        accuracy: 96,
        total_keystrokes: 320,
        error_count: 12,
        timestamp: Utc::now(),
        session_id: Uuid::new_v4(),
    }
    .payload("user-42")
}

#[test]
fn text_supply_reads_block_and_sends_prev_hint() {
    let (base, seen) = serve(vec![(200, r#"{"text":"bonjour tout le monde"}"#)]);
    let supply = HttpSupply::new(format!("{base}/")).unwrap();

    let text = supply.fetch(Language::Fr, Some("ancien texte")).unwrap();

    assert_eq!(text, "bonjour tout le monde");
    let request = seen.recv().unwrap();
    assert!(request.url.starts_with("/api/text/fr?prev="), "{}", request.url);
    assert!(request.url.contains("ancien"));
}

#[test]
fn text_supply_maps_client_errors() {
    let (base, _seen) = serve(vec![(400, r#"{"error":"Langue invalide"}"#)]);
    let supply = HttpSupply::new(base).unwrap();
    assert_matches!(
        supply.fetch(Language::En, None),
        Err(SupplyError::Status { status: 400 })
    );
}

#[test]
fn missing_text_field_is_an_empty_block() {
    let (base, _seen) = serve(vec![(200, r#"{}"#)]);
    let supply = HttpSupply::new(base).unwrap();
    assert_eq!(supply.fetch(Language::Es, None).unwrap(), "");
}

#[test]
fn fan_out_degrades_failed_requests_to_empty() {
    let (base, _seen) = serve(vec![
        (200, r#"{"text":"uno"}"#),
        (500, r#"{"error":"Erreur serveur"}"#),
        (200, r#"{"text":"uno"}"#),
    ]);
    let supply = HttpSupply::new(base).unwrap();
    let blocks = fetch_fan_out(&supply, Language::Es, 3, None);
    // the server answers in arrival order, so only the mix is fixed here
    assert_eq!(blocks.len(), 3);
    assert_eq!(blocks.iter().filter(|b| b.is_empty()).count(), 1);
    assert_eq!(blocks.iter().filter(|b| *b == "uno").count(), 2);
}

#[test]
fn unreachable_text_endpoint_is_a_transport_error() {
    // nothing listens on the discard port
    let supply = HttpSupply::new("http://127.0.0.1:9").unwrap();
    assert_matches!(supply.fetch(Language::Fr, None), Err(SupplyError::Transport(_)));
}

#[test]
fn result_sink_posts_camel_case_payload() {
    let (base, seen) = serve(vec![(200, r#"{"message":"ok"}"#)]);
    let sink = HttpResultSink::new(base).unwrap();
    let payload = payload();

    sink.submit(&payload).unwrap();

    let request = seen.recv().unwrap();
    assert_eq!(request.url, "/api/text/save-result");
    let body: serde_json::Value = serde_json::from_str(&request.body).unwrap();
    assert_eq!(body["userId"], "user-42");
    assert_eq!(body["lang"], "fr");
    assert_eq!(body["keystrokes"], 320);
    assert_eq!(body["errors"], 12);
    assert_eq!(body["sessionId"], payload.session_id.to_string());
}

#[test]
fn result_rejection_keeps_the_guard() {
    let (base, _seen) = serve(vec![(400, r#"{"message":"Champs manquants"}"#)]);
    let sink = HttpResultSink::new(base).unwrap();
    let err = sink.submit(&payload()).unwrap_err();
    assert_matches!(err, SubmitError::Rejected { status: 400 });
    assert!(!err.allows_retry());
}

#[test]
fn unreachable_result_endpoint_allows_retry() {
    let sink = HttpResultSink::new("http://127.0.0.1:9").unwrap();
    let err = sink.submit(&payload()).unwrap_err();
    assert_matches!(err, SubmitError::Transport(_));
    assert!(err.allows_retry());
}
