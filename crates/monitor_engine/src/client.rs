use std::time::Duration;

use chrono::NaiveDateTime;
use futures_util::StreamExt;
use monitor_logging::monitor_warn;
use reqwest::header::{CACHE_CONTROL, CONTENT_TYPE, PRAGMA};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use url::Url;

use monitor_core::{StreamEvent, TaskConfig, TIME_FORMAT};

use crate::frame::{FrameDecoder, FrameError};
use crate::types::{BackendError, EngineEvent, StreamStats};

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub connect_timeout: Duration,
    /// Deadline for the auxiliary endpoints. The streaming call gets no
    /// overall deadline because legitimate runs are long.
    pub request_timeout: Duration,
    /// Longest tolerated gap between stream reads before the run is
    /// declared hung.
    pub idle_timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(120),
        }
    }
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

pub struct ChannelEventSink {
    tx: std::sync::mpsc::Sender<EngineEvent>,
}

impl ChannelEventSink {
    pub fn new(tx: std::sync::mpsc::Sender<EngineEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }
}

/// Everything the monitor asks of the analysis backend.
#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    /// Drives one batch run: opens the stream and emits decoded frames
    /// until a terminal frame, cancellation, or end of stream.
    async fn run_task(
        &self,
        config: &TaskConfig,
        sink: &dyn EventSink,
        cancel: &CancellationToken,
    ) -> Result<StreamStats, BackendError>;

    /// Rows in range, for the pre-run preview.
    async fn data_count(
        &self,
        time_field: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<u64, BackendError>;

    /// Earliest and latest stored timestamps; `None` on an empty database.
    async fn time_range(&self) -> Result<Option<(NaiveDateTime, NaiveDateTime)>, BackendError>;

    /// Deduplicated result document for a completed session.
    async fn export_deduplicated(&self, session_id: &str) -> Result<Vec<u8>, BackendError>;
}

#[derive(Debug, Clone)]
pub struct HttpBackend {
    base: Url,
    client: reqwest::Client,
    settings: ClientSettings,
}

impl HttpBackend {
    pub fn new(base_url: &str, settings: ClientSettings) -> Result<Self, BackendError> {
        let base = Url::parse(base_url).map_err(|err| BackendError::InvalidUrl(err.to_string()))?;
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(|err| BackendError::Network(err.to_string()))?;
        Ok(Self {
            base,
            client,
            settings,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        self.base
            .join(path)
            .map_err(|err| BackendError::InvalidUrl(err.to_string()))
    }
}

#[async_trait::async_trait]
impl Backend for HttpBackend {
    async fn run_task(
        &self,
        config: &TaskConfig,
        sink: &dyn EventSink,
        cancel: &CancellationToken,
    ) -> Result<StreamStats, BackendError> {
        let url = self.endpoint("/api/batch_parse")?;
        let body =
            serde_json::to_string(config).map_err(|err| BackendError::Decode(err.to_string()))?;

        // The endpoint is non-idempotent; response caching must stay off.
        let request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .header(CACHE_CONTROL, "no-cache")
            .header(PRAGMA, "no-cache")
            .body(body);

        let mut stats = StreamStats::default();

        // The handshake observes the same idle limit as every later read.
        let response = tokio::select! {
            _ = cancel.cancelled() => {
                stats.cancelled = true;
                return Ok(stats);
            }
            sent = tokio::time::timeout(self.settings.idle_timeout, request.send()) => match sent {
                Err(_) => {
                    return Err(BackendError::IdleTimeout {
                        limit: self.settings.idle_timeout,
                    })
                }
                Ok(result) => result.map_err(map_reqwest_error)?,
            },
        };

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let mut decoder = FrameDecoder::new();
        let mut stream = response.bytes_stream();

        'read: loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => {
                    stats.cancelled = true;
                    break 'read;
                }
                next = tokio::time::timeout(self.settings.idle_timeout, stream.next()) => match next {
                    Err(_) => {
                        return Err(BackendError::IdleTimeout {
                            limit: self.settings.idle_timeout,
                        })
                    }
                    Ok(None) => break 'read,
                    Ok(Some(chunk)) => chunk.map_err(map_reqwest_error)?,
                },
            };

            for decoded in decoder.feed(&chunk) {
                if dispatch_frame(decoded, sink, &mut stats) {
                    // Terminal frame: nothing further matters.
                    break 'read;
                }
            }
        }

        if !stats.cancelled && !stats.saw_terminal {
            if let Some(decoded) = decoder.finish() {
                dispatch_frame(decoded, sink, &mut stats);
            }
        }

        Ok(stats)
    }

    async fn data_count(
        &self,
        time_field: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<u64, BackendError> {
        let mut url = self.endpoint("/api/database/data-count")?;
        url.query_pairs_mut()
            .append_pair("time_field", time_field)
            .append_pair("start_time", &start.format(TIME_FORMAT).to_string())
            .append_pair("end_time", &end.format(TIME_FORMAT).to_string())
            .append_pair("_t", &cache_buster());

        let response = self
            .client
            .get(url)
            .header(CACHE_CONTROL, "no-cache")
            .header(PRAGMA, "no-cache")
            .timeout(self.settings.request_timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let envelope: CountEnvelope = read_json(response).await?;
        if !envelope.success {
            return Err(BackendError::Rejected {
                message: envelope
                    .message
                    .unwrap_or_else(|| "data count query failed".to_owned()),
            });
        }
        Ok(envelope.total.unwrap_or(0))
    }

    async fn time_range(&self) -> Result<Option<(NaiveDateTime, NaiveDateTime)>, BackendError> {
        let url = self.endpoint("/api/database/time-range")?;
        let response = self
            .client
            .get(url)
            .timeout(self.settings.request_timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let envelope: TimeRangeEnvelope = read_json(response).await?;
        if !envelope.success {
            return Err(BackendError::Rejected {
                message: envelope
                    .message
                    .unwrap_or_else(|| "time range query failed".to_owned()),
            });
        }
        let Some((earliest, latest)) = envelope.earliest_time.zip(envelope.latest_time) else {
            return Ok(None);
        };
        let earliest = parse_backend_time(&earliest)
            .ok_or_else(|| BackendError::Decode(format!("unparsable earliest_time: {earliest}")))?;
        let latest = parse_backend_time(&latest)
            .ok_or_else(|| BackendError::Decode(format!("unparsable latest_time: {latest}")))?;
        Ok(Some((earliest, latest)))
    }

    async fn export_deduplicated(&self, session_id: &str) -> Result<Vec<u8>, BackendError> {
        let mut url = self.endpoint("/api/results/export/deduplicated")?;
        url.query_pairs_mut()
            .append_pair("format", "json")
            .append_pair("session_id", session_id);

        let response = self
            .client
            .post(url)
            .timeout(self.settings.request_timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::HttpStatus {
                status: status.as_u16(),
            });
        }
        let payload = response.bytes().await.map_err(map_reqwest_error)?;
        Ok(payload.to_vec())
    }
}

/// Forwards one decoded frame; returns true when the frame is terminal.
fn dispatch_frame(
    decoded: Result<StreamEvent, FrameError>,
    sink: &dyn EventSink,
    stats: &mut StreamStats,
) -> bool {
    match decoded {
        Ok(event) => {
            stats.frames += 1;
            let terminal = event.is_terminal();
            if terminal {
                stats.saw_terminal = true;
            }
            sink.emit(EngineEvent::Frame(event));
            terminal
        }
        Err(err) => {
            // Malformed frames are diagnostics, never fatal to the run.
            monitor_warn!("skipping malformed stream frame: {err}");
            stats.skipped += 1;
            false
        }
    }
}

/// Backend responses carry timestamps in the wire format or as SQL
/// datetimes (with optional fractional seconds); accept all of them.
pub fn parse_backend_time(raw: &str) -> Option<NaiveDateTime> {
    let formats = [TIME_FORMAT, "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"];
    formats
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
}

#[derive(Debug, Deserialize)]
struct CountEnvelope {
    success: bool,
    #[serde(default)]
    total: Option<u64>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TimeRangeEnvelope {
    success: bool,
    #[serde(default)]
    earliest_time: Option<String>,
    #[serde(default)]
    latest_time: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, BackendError> {
    let status = response.status();
    if !status.is_success() {
        return Err(BackendError::HttpStatus {
            status: status.as_u16(),
        });
    }
    let body = response.text().await.map_err(map_reqwest_error)?;
    serde_json::from_str(&body).map_err(|err| BackendError::Decode(err.to_string()))
}

/// Throwaway query parameter defeating intermediary caches, same as the
/// browser client sends.
fn cache_buster() -> String {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .to_string()
}

fn map_reqwest_error(err: reqwest::Error) -> BackendError {
    if err.is_timeout() {
        return BackendError::Timeout(err.to_string());
    }
    BackendError::Network(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_the_three_backend_time_shapes() {
        assert!(parse_backend_time("2024-05-01T08:30").is_some());
        assert!(parse_backend_time("2024-05-01T08:30:59").is_some());
        assert!(parse_backend_time("2024-05-01 08:30:59").is_some());
        assert!(parse_backend_time("2024-05-01 08:30:59.123").is_some());
    }

    #[test]
    fn rejects_dates_without_a_time() {
        assert_eq!(parse_backend_time("2024-05-01"), None);
        assert_eq!(parse_backend_time("yesterday"), None);
    }
}
