//! Shared SSE -> [`LLMStream`] adapter.

use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use reqwest::Response;
use serde_json::Value;

use crate::provider::{LLMError, LLMStream, Result};
use crate::types::LLMChunk;

fn to_stream_error(err: LLMError) -> LLMError {
    match err {
        LLMError::Stream(msg) => LLMError::Stream(msg),
        other => LLMError::Stream(other.to_string()),
    }
}

/// Event name for an SSE frame.
///
/// Frames without an `event:` line arrive as `"message"`; for those the JSON
/// payload's `type` field names the event instead.
fn event_name<'a>(event: &'a str, data: &str) -> std::borrow::Cow<'a, str> {
    if !event.is_empty() && event != "message" {
        return std::borrow::Cow::Borrowed(event);
    }
    serde_json::from_str::<Value>(data)
        .ok()
        .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(str::to_string))
        .map(std::borrow::Cow::Owned)
        .unwrap_or(std::borrow::Cow::Borrowed(event))
}

/// Convert an SSE HTTP [`Response`] into an [`LLMStream`].
///
/// `handler` receives the SSE event name and data payload for each event, and can either:
/// - return `Ok(chunks)` to emit zero or more chunks, in order
/// - return `Err(_)` to emit a stream error (mapped to `LLMError::Stream`)
pub fn llm_stream_from_sse<H>(response: Response, mut handler: H) -> LLMStream
where
    H: FnMut(&str, &str) -> Result<Vec<LLMChunk>> + Send + 'static,
{
    let stream = response
        .bytes_stream()
        .eventsource()
        .map(move |event| {
            let event = event.map_err(|e| LLMError::Stream(e.to_string()))?;
            let name = event_name(&event.event, &event.data);
            tracing::trace!("SSE event {}: {}", name, event.data);
            handler(&name, event.data.as_str()).map_err(to_stream_error)
        })
        .flat_map(|result| {
            let items: Vec<Result<LLMChunk>> = match result {
                Ok(chunks) => chunks.into_iter().map(Ok).collect(),
                Err(err) => vec![Err(err)],
            };
            futures_util::stream::iter(items)
        });

    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn serve_sse(body: &'static str) -> (MockServer, Response) {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/sse"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&mock_server)
            .await;

        let response = reqwest::Client::new()
            .get(format!("{}/sse", mock_server.uri()))
            .send()
            .await
            .expect("response");

        (mock_server, response)
    }

    #[test]
    fn event_name_falls_back_to_payload_type() {
        assert_eq!(event_name("ping", "{}"), "ping");
        assert_eq!(
            event_name("message", r#"{"type":"message_stop"}"#),
            "message_stop"
        );
        assert_eq!(event_name("", r#"{"type":"ping"}"#), "ping");
        assert_eq!(event_name("message", "not json"), "message");
    }

    #[tokio::test]
    async fn llm_stream_from_sse_flattens_chunks_and_passes_event_name_and_data() {
        let (_server, response) = serve_sse(concat!(
            "event: token\n",
            "data: hello\n",
            "\n",
            "event: token\n",
            "data: skip\n",
            "\n",
        ))
        .await;

        let mut stream = llm_stream_from_sse(response, |event, data| {
            if data == "skip" {
                return Ok(Vec::new());
            }
            Ok(vec![
                LLMChunk::Token(format!("{event}:{data}")),
                LLMChunk::Done,
            ])
        });

        let mut out = Vec::new();
        while let Some(item) = stream.next().await {
            out.push(item.expect("chunk"));
        }

        assert_eq!(
            out,
            vec![LLMChunk::Token("token:hello".to_string()), LLMChunk::Done]
        );
    }

    #[tokio::test]
    async fn llm_stream_from_sse_maps_handler_errors_to_stream_error() {
        let (_server, response) = serve_sse(concat!("event: token\n", "data: boom\n", "\n")).await;

        let mut stream = llm_stream_from_sse(response, |_event, _data| {
            Err(LLMError::Api("boom".to_string()))
        });

        let Some(item) = stream.next().await else {
            panic!("expected one stream item");
        };

        match item {
            Ok(chunk) => panic!("expected error, got chunk: {chunk:?}"),
            Err(LLMError::Stream(msg)) => assert!(msg.contains("API error")),
            Err(other) => panic!("expected LLMError::Stream, got: {other:?}"),
        }
    }
}
