use std::error::Error;
use std::sync::Arc;

use chrono::NaiveDate;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use ulid::Ulid;

use crate::engine::{Engine, EngineError};
use crate::limits::MAX_REQUEST_LINE_BYTES;
use crate::model::{DateRange, ListFilter, ReservationStatus};
use crate::observability;

/// One request line, externally tagged by `op`. Dates are plain ISO days.
/// User ids arrive pre-authenticated; the fronting gateway owns authn.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Book {
        user_id: Ulid,
        resource_id: Ulid,
        start_date: NaiveDate,
        end_date: NaiveDate,
    },
    Cancel {
        user_id: Ulid,
        reservation_id: Ulid,
    },
    Get {
        reservation_id: Ulid,
    },
    List {
        #[serde(default)]
        requester_id: Option<Ulid>,
        #[serde(default)]
        owner_id: Option<Ulid>,
        #[serde(default)]
        resource_id: Option<Ulid>,
        #[serde(default)]
        status: Option<ReservationStatus>,
        #[serde(default)]
        from_date: Option<NaiveDate>,
        #[serde(default)]
        to_date: Option<NaiveDate>,
        #[serde(default)]
        limit: Option<usize>,
    },
}

/// Serve one connection: newline-delimited JSON requests, one JSON response
/// per request, written back in request order.
pub async fn process_connection(
    socket: TcpStream,
    engine: Arc<Engine>,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let mut framed = Framed::new(socket, LinesCodec::new_with_max_length(MAX_REQUEST_LINE_BYTES));

    while let Some(line) = framed.next().await {
        let line = match line {
            Ok(line) => line,
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                // The decoder is mid-line with no frame boundary to resync
                // on, so answer and close.
                let err = EngineError::Validation {
                    field: "body",
                    message: "request line too long",
                };
                framed.send(error_response(&err, "body")).await?;
                break;
            }
            Err(LinesCodecError::Io(e)) => return Err(e.into()),
        };
        if line.trim().is_empty() {
            continue;
        }
        let started = std::time::Instant::now();

        let request: Request = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!("malformed request: {e}");
                metrics::counter!(observability::REQUESTS_TOTAL, "op" => "invalid", "status" => "error")
                    .increment(1);
                let err = EngineError::Validation {
                    field: "body",
                    message: "malformed request",
                };
                framed.send(error_response(&err, "body")).await?;
                continue;
            }
        };

        let op = observability::op_label(&request);
        let (reply, status) = match handle(&engine, request).await {
            Ok(reply) => (reply, "ok"),
            Err((err, id_field)) => {
                tracing::debug!("{op} failed: {err}");
                (error_response(&err, id_field), "error")
            }
        };
        metrics::counter!(observability::REQUESTS_TOTAL, "op" => op, "status" => status)
            .increment(1);
        metrics::histogram!(observability::REQUEST_DURATION_SECONDS, "op" => op)
            .record(started.elapsed().as_secs_f64());
        framed.send(reply).await?;
    }
    Ok(())
}

/// Dispatch one request. Errors carry the name of the field holding the id
/// the operation was addressed to, which differs per operation.
async fn handle(
    engine: &Engine,
    request: Request,
) -> Result<String, (EngineError, &'static str)> {
    match request {
        Request::Book {
            user_id,
            resource_id,
            start_date,
            end_date,
        } => {
            let reservation = engine
                .book(user_id, resource_id, start_date, end_date)
                .await
                .map_err(|e| (e, "resource_id"))?;
            Ok(json!({"status": "created", "reservation": reservation}).to_string())
        }
        Request::Cancel {
            user_id,
            reservation_id,
        } => {
            let reservation = engine
                .cancel(user_id, reservation_id)
                .await
                .map_err(|e| (e, "reservation_id"))?;
            Ok(json!({"status": "ok", "reservation": reservation}).to_string())
        }
        Request::Get { reservation_id } => {
            let reservation = engine
                .get_reservation(&reservation_id)
                .map_err(|e| (e, "reservation_id"))?;
            Ok(json!({"status": "ok", "reservation": reservation}).to_string())
        }
        Request::List {
            requester_id,
            owner_id,
            resource_id,
            status,
            from_date,
            to_date,
            limit,
        } => {
            let window = parse_window(from_date, to_date).map_err(|e| (e, "resource_id"))?;
            let filter = ListFilter {
                requester_id,
                owner_id,
                resource_id,
                status,
                window,
                limit,
            };
            let reservations = engine
                .list_reservations(&filter)
                .map_err(|e| (e, "resource_id"))?;
            Ok(json!({"status": "ok", "reservations": reservations}).to_string())
        }
    }
}

fn parse_window(
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<Option<DateRange>, EngineError> {
    match (from, to) {
        (None, None) => Ok(None),
        (Some(f), Some(t)) if f <= t => Ok(Some(DateRange::new(f, t))),
        (Some(_), Some(_)) => Err(EngineError::Validation {
            field: "to_date",
            message: "window end must not be before its start",
        }),
        _ => Err(EngineError::Validation {
            field: "from_date",
            message: "window needs both from_date and to_date",
        }),
    }
}

fn error_code(err: &EngineError) -> &'static str {
    match err {
        EngineError::Validation { .. } => "validation",
        EngineError::NotFound(_) => "not_found",
        EngineError::Ownership(_) => "ownership",
        EngineError::Visibility(_) => "visibility",
        EngineError::Overlap(_) => "overlap",
        EngineError::LockTimeout(_) => "lock_timeout",
        EngineError::LockExpired(_) => "lock_expired",
        EngineError::CutoffWindow { .. } => "cutoff_window",
        EngineError::AlreadyCancelled(_) => "already_cancelled",
        EngineError::Forbidden(_) => "forbidden",
        EngineError::Ledger(_) => "storage",
    }
}

/// Which request field the error points at, if any. `id_field` names the
/// field the failing lookup id came from.
fn error_field(err: &EngineError, id_field: &'static str) -> Option<&'static str> {
    match err {
        EngineError::Validation { field, .. } => Some(field),
        EngineError::NotFound(_) => Some(id_field),
        EngineError::Ownership(_) | EngineError::Visibility(_) | EngineError::Overlap(_) => {
            Some("resource_id")
        }
        EngineError::CutoffWindow { .. }
        | EngineError::AlreadyCancelled(_)
        | EngineError::Forbidden(_) => Some("reservation_id"),
        EngineError::LockTimeout(_) | EngineError::LockExpired(_) | EngineError::Ledger(_) => None,
    }
}

fn error_response(err: &EngineError, id_field: &'static str) -> String {
    let mut body = json!({
        "code": error_code(err),
        "message": err.to_string(),
        "retryable": err.retryable(),
    });
    if let Some(field) = error_field(err, id_field)
        && let Some(obj) = body.as_object_mut()
    {
        obj.insert("field".into(), field.into());
    }
    json!({"status": "error", "error": body}).to_string()
}
