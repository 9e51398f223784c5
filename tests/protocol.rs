//! End-to-end scenarios exercising the connection/stream/response machinery
//! against a real `h2` client over a real TLS socket, modeled on the
//! literal scenarios the distilled specification calls out: echoing a body
//! with trailers, a handler that forgets to end its stream, an application
//! error resetting only its own stream, a peer reset cancelling a stalled
//! handler, and a response body sliced against a deliberately small
//! flow-control window.

mod support;

use std::sync::Mutex;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::oneshot;

use turnstile::prelude::*;

fn get_request(path: &str) -> http::Request<()> {
    http::Request::builder()
        .method("GET")
        .uri(format!("https://localhost{path}"))
        .body(())
        .unwrap()
}

struct Observed {
    headers: Vec<Header>,
    body: Vec<u8>,
    trailers: Vec<Header>,
}

/// Reads the whole request (headers, body, trailers), reports what it saw
/// over a one-shot channel, and answers `200` with `END_STREAM`.
struct EchoWithTrailers {
    report: Mutex<Option<oneshot::Sender<Observed>>>,
}

#[async_trait::async_trait]
impl AppHandler for EchoWithTrailers {
    async fn handle(&self, mut request: Request, response: &mut ResponseWriter) -> Result<()> {
        let headers = request.headers.clone();

        let mut body = Vec::new();
        while let Some(chunk) = request.body.recv().await {
            body.extend_from_slice(&chunk.data);
            chunk.ack.ack();
        }

        let mut trailers = Vec::new();
        while let Some(trailer) = request.trailers.recv().await {
            trailers.push(trailer);
        }

        response.headers(200, Vec::new(), true).await?;

        if let Some(tx) = self.report.lock().unwrap().take() {
            let _ = tx.send(Observed { headers, body, trailers });
        }
        Ok(())
    }
}

#[tokio::test]
async fn echo_with_trailers_observes_headers_body_and_trailers() {
    let cert = support::generate_cert();
    let (report_tx, report_rx) = oneshot::channel();
    let handler = EchoWithTrailers {
        report: Mutex::new(Some(report_tx)),
    };
    let (server, port) = support::spawn_server(handler, Http2Settings::default(), &cert).await;

    let io = support::tls_connect(port, &cert, &[b"h2"]).await;
    let (mut send_request, connection) = h2::client::handshake(io).await.expect("h2 handshake");
    tokio::spawn(async move {
        let _ = connection.await;
    });

    let request = http::Request::builder()
        .method("GET")
        .uri("https://localhost/")
        .header("x-test-header", "123")
        .body(())
        .unwrap();
    let (response_fut, mut send_stream) = send_request.send_request(request, false).unwrap();

    send_stream.send_data(Bytes::from_static(b"testing"), false).unwrap();
    let mut trailers = http::HeaderMap::new();
    trailers.insert("x-test-trailer", "321".parse().unwrap());
    send_stream.send_trailers(trailers).unwrap();

    let response = response_fut.await.expect("response");
    assert_eq!(response.status(), 200);

    let mut body = response.into_body();
    while let Some(chunk) = body.data().await {
        chunk.expect("no transport error");
    }

    let observed = tokio::time::timeout(Duration::from_secs(1), report_rx)
        .await
        .expect("handler ran")
        .expect("handler reported");
    assert!(observed
        .headers
        .iter()
        .any(|h| h.name.as_ref() == b"x-test-header" && h.value.as_ref() == b"123"));
    assert_eq!(observed.body, b"testing");
    assert_eq!(observed.trailers.len(), 1);
    assert_eq!(observed.trailers[0].name.as_ref(), b"x-test-trailer");
    assert_eq!(observed.trailers[0].value.as_ref(), b"321");

    server.stop();
    server.wait().await;
}

/// Sends final headers without `END_STREAM` and returns without explicitly
/// ending the response; the stream handler must close it with an empty
/// `DATA` frame on the application's behalf.
struct ForgetsEndStream;

#[async_trait::async_trait]
impl AppHandler for ForgetsEndStream {
    async fn handle(&self, _request: Request, response: &mut ResponseWriter) -> Result<()> {
        response.headers(200, Vec::new(), false).await
    }
}

#[tokio::test]
async fn handler_forgetting_end_stream_gets_one_auto_closed() {
    let cert = support::generate_cert();
    let (server, port) = support::spawn_server(ForgetsEndStream, Http2Settings::default(), &cert).await;

    let io = support::tls_connect(port, &cert, &[b"h2"]).await;
    let (mut send_request, connection) = h2::client::handshake(io).await.expect("h2 handshake");
    tokio::spawn(async move {
        let _ = connection.await;
    });

    let (response_fut, _send_stream) = send_request.send_request(get_request("/"), true).unwrap();
    let response = response_fut.await.expect("response");
    assert_eq!(response.status(), 200);

    let mut body = response.into_body();
    loop {
        match tokio::time::timeout(Duration::from_secs(1), body.data())
            .await
            .expect("body did not hang")
        {
            Some(chunk) => assert!(chunk.expect("no transport error").is_empty()),
            None => break,
        }
    }

    server.stop();
    server.wait().await;
}

/// Fails before sending any headers; the stream must be reset with
/// `INTERNAL_ERROR` without affecting the connection or other streams.
struct AlwaysErrors;

#[async_trait::async_trait]
impl AppHandler for AlwaysErrors {
    async fn handle(&self, _request: Request, _response: &mut ResponseWriter) -> Result<()> {
        Err(Error::Application(Box::new(std::io::Error::other("boom"))))
    }
}

#[tokio::test]
async fn application_error_resets_only_its_stream() {
    let cert = support::generate_cert();
    let (server, port) = support::spawn_server(AlwaysErrors, Http2Settings::default(), &cert).await;

    let io = support::tls_connect(port, &cert, &[b"h2"]).await;
    let (mut send_request, connection) = h2::client::handshake(io).await.expect("h2 handshake");
    tokio::spawn(async move {
        let _ = connection.await;
    });

    let (first_response, _send_stream) = send_request.send_request(get_request("/a"), true).unwrap();
    let first = tokio::time::timeout(Duration::from_secs(1), first_response)
        .await
        .expect("first stream did not hang");
    assert!(first.is_err(), "expected the reset stream to surface as an error");

    // The connection itself must still be usable for a fresh stream.
    let (second_response, _send_stream) = send_request.send_request(get_request("/b"), true).unwrap();
    let second = tokio::time::timeout(Duration::from_secs(1), second_response)
        .await
        .expect("second stream did not hang");
    assert!(second.is_err(), "the handler errors unconditionally, but must do so per-stream");

    server.stop();
    server.wait().await;
}

/// Sends headers, then sleeps "forever"; a peer `RST_STREAM` must cancel the
/// handler promptly rather than leaving it running.
struct SleepsForever {
    cancelled: Mutex<Option<oneshot::Sender<()>>>,
}

struct SignalOnDrop(Option<oneshot::Sender<()>>);

impl Drop for SignalOnDrop {
    fn drop(&mut self) {
        if let Some(tx) = self.0.take() {
            let _ = tx.send(());
        }
    }
}

#[async_trait::async_trait]
impl AppHandler for SleepsForever {
    async fn handle(&self, _request: Request, response: &mut ResponseWriter) -> Result<()> {
        response.headers(200, Vec::new(), false).await?;
        let _guard = self.cancelled.lock().unwrap().take().map(SignalOnDrop);
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(())
    }
}

#[tokio::test]
async fn peer_reset_cancels_a_stalled_handler() {
    let cert = support::generate_cert();
    let (cancelled_tx, cancelled_rx) = oneshot::channel();
    let handler = SleepsForever {
        cancelled: Mutex::new(Some(cancelled_tx)),
    };
    let (server, port) = support::spawn_server(handler, Http2Settings::default(), &cert).await;

    let io = support::tls_connect(port, &cert, &[b"h2"]).await;
    let (mut send_request, connection) = h2::client::handshake(io).await.expect("h2 handshake");
    tokio::spawn(async move {
        let _ = connection.await;
    });

    let (response_fut, mut send_stream) = send_request.send_request(get_request("/"), true).unwrap();
    let response = response_fut.await.expect("response headers");
    assert_eq!(response.status(), 200);

    send_stream.send_reset(h2::Reason::CANCEL);

    tokio::time::timeout(Duration::from_secs(1), cancelled_rx)
        .await
        .expect("handler was cancelled within one second")
        .expect("cancellation guard fired");

    server.stop();
    server.wait().await;
}

/// Answers with a fixed ten-byte body against a client-advertised receive
/// window of five bytes, exercising `ResponseWriter::body`'s slicing loop.
struct SendsFixedBody(Bytes);

#[async_trait::async_trait]
impl AppHandler for SendsFixedBody {
    async fn handle(&self, _request: Request, response: &mut ResponseWriter) -> Result<()> {
        response.headers(200, Vec::new(), false).await?;
        response.body(self.0.clone(), true).await
    }
}

#[tokio::test]
async fn response_body_is_sliced_against_a_small_flow_control_window() {
    let cert = support::generate_cert();
    let handler = SendsFixedBody(Bytes::from_static(b"1234567890"));
    let (server, port) = support::spawn_server(handler, Http2Settings::default(), &cert).await;

    let io = support::tls_connect(port, &cert, &[b"h2"]).await;
    let (mut send_request, connection) = h2::client::Builder::new()
        .initial_window_size(5)
        .handshake(io)
        .await
        .expect("h2 handshake");
    tokio::spawn(async move {
        let _ = connection.await;
    });

    let (response_fut, _send_stream) = send_request.send_request(get_request("/"), true).unwrap();
    let response = response_fut.await.expect("response");
    let mut body = response.into_body();

    let first = body.data().await.expect("first chunk").expect("no error");
    assert_eq!(&first[..], b"12345");
    body.flow_control().release_capacity(2).expect("grant +2");

    let second = body.data().await.expect("second chunk").expect("no error");
    assert_eq!(&second[..], b"67");
    body.flow_control().release_capacity(3).expect("grant +3");

    let third = body.data().await.expect("third chunk").expect("no error");
    assert_eq!(&third[..], b"890");

    assert!(body.data().await.is_none(), "stream should be fully ended");

    server.stop();
    server.wait().await;
}

/// A client that offers no ALPN protocols at all must be rejected with the
/// same log-worthy reason the distilled specification names explicitly.
#[tokio::test]
async fn connection_without_alpn_is_rejected() {
    let cert = support::generate_cert();

    struct Unreachable;
    #[async_trait::async_trait]
    impl AppHandler for Unreachable {
        async fn handle(&self, _request: Request, _response: &mut ResponseWriter) -> Result<()> {
            panic!("no request should ever reach the application without a valid ALPN handshake");
        }
    }

    let (server, port) = support::spawn_server(Unreachable, Http2Settings::default(), &cert).await;

    // `h2::client::handshake` itself will fail because the server closes the
    // transport right after the TLS handshake completes without having sent
    // any HTTP/2 preface; that closed transport is the externally-observable
    // effect of the connection being rejected.
    let io = support::tls_connect(port, &cert, &[]).await;
    let result = h2::client::handshake(io).await;
    assert!(result.is_err(), "connection without ALPN must not speak HTTP/2");

    server.stop();
    server.wait().await;
}
