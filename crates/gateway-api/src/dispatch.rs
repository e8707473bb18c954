//! Orchestrates one request's worth of JSON-RPC items: runs the batch
//! coalescer first, then dispatches whatever it left over individually.

use gateway_core::jsonrpc::{Request, RequestId, Response};

use crate::ctx::RequestCtx;
use crate::{coalesce, handlers};

/// One parsed slot: either a validated request, or a pre-built error
/// response for a malformed item (still occupies a slot in the output).
pub enum Slot {
    Request(Request),
    Invalid(Response),
}

/// Runs `slots` to completion, returning `(slot_index, response)` pairs.
/// Notifications (`Request` with no id) never produce a response and are
/// dispatched for their side effects only... except there are none here:
/// every handler is read-only, so a notification is simply dropped after
/// validation. `is_batch` only affects how the caller assembles output; this
/// function always returns one entry per non-notification slot.
pub async fn run(ctx: &RequestCtx, slots: Vec<Slot>) -> Vec<(usize, Response)> {
    let mut pending: Vec<(usize, RequestId, Request)> = Vec::new();
    let mut results: Vec<(usize, Response)> = Vec::new();

    for (index, slot) in slots.into_iter().enumerate() {
        match slot {
            Slot::Invalid(response) => results.push((index, response)),
            Slot::Request(request) => match request.id.clone() {
                None => {} // notification: validated, never answered
                Some(id) => pending.push((index, id, request)),
            },
        }
    }

    let coalesce_input: Vec<(usize, RequestId, &Request)> =
        pending.iter().map(|(i, id, r)| (*i, id.clone(), r)).collect();
    let mut coalesced = coalesce::run(ctx, &coalesce_input).await;

    for (index, id, request) in pending {
        if let Some(response) = coalesced.remove(&index) {
            results.push((index, response));
            continue;
        }
        let outcome = tokio::time::timeout(
            ctx.config.handler_timeout,
            handlers::dispatch(ctx, &request.method, &request.params),
        )
        .await;
        let response = match outcome {
            Ok(Ok(value)) => Response::success(id, value),
            Ok(Err(err)) => Response::error_with_data(id, &err.error, err.data),
            Err(_) => Response::error(id, &gateway_core::error::GatewayError::request_timeout()),
        };
        results.push((index, response));
    }

    results.sort_by_key(|(index, _)| *index);
    results
}
