//! Session endpoints: a one-shot REST read and a live WebSocket feed.
//!
//! Each WebSocket connection owns exactly one [`Session`]. The client
//! drives the identity side with `sign_in`/`sign_out` frames; the server
//! pushes a `session` frame whenever the derived view changes.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{ApiError, AppState};
use crate::error::AuthError;
use crate::guard::{Destination, resolve};
use crate::identity::{AuthFeed, bearer_token};
use crate::session::{Session, SessionView, resolve_once};

/// Messages sent to the client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionFrame {
    Session {
        view: SessionView,
        destination: Destination,
        path: Option<&'static str>,
    },
    Error {
        message: String,
    },
}

impl SessionFrame {
    pub fn for_view(view: SessionView) -> Self {
        let destination = resolve(&view);
        Self::Session {
            view,
            destination,
            path: destination.path(),
        }
    }
}

/// Messages accepted from the client.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientFrame {
    SignIn { token: String },
    SignOut,
}

pub(super) fn session_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/session", get(get_session))
        .route("/ws/session", get(ws_handler))
        .with_state(state)
}

/// GET /api/session
///
/// Without an Authorization header this is the signed-out view; a header
/// with a bad token is rejected.
async fn get_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let identity = match bearer_token(&headers) {
        Ok(token) => Some(state.verifier.verify(token)?),
        Err(AuthError::MissingToken) => None,
        Err(e) => return Err(e.into()),
    };
    let view = resolve_once(state.store.as_ref(), identity).await;
    Ok(Json(SessionFrame::for_view(view)))
}

/// GET /ws/session
///
/// A token on the upgrade request signs the connection in straight away;
/// a present but rejected token refuses the upgrade with 401.
async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    info!("Session WebSocket client connecting");
    let feed = AuthFeed::new();
    match bearer_token(&headers) {
        Ok(token) => feed.sign_in(state.verifier.verify(token)?),
        Err(AuthError::MissingToken) => {}
        Err(e) => return Err(e.into()),
    }
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, feed)))
}

async fn send_frame(socket: &mut WebSocket, frame: &SessionFrame) -> bool {
    match serde_json::to_string(frame) {
        Ok(json) => socket.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "Failed to encode session frame");
            true
        }
    }
}

async fn handle_socket(mut socket: WebSocket, state: AppState, feed: AuthFeed) {
    let session = Session::start(state.store.clone(), feed.subscribe());
    let session_id = session.id();
    info!(session_id = %session_id, "Session WebSocket connected");

    let mut views = session.subscribe();
    let initial = views.borrow_and_update().clone();
    if !send_frame(&mut socket, &SessionFrame::for_view(initial)).await {
        session.shutdown().await;
        return;
    }

    loop {
        tokio::select! {
            changed = views.changed() => {
                if changed.is_err() {
                    debug!(session_id = %session_id, "Session view closed");
                    break;
                }
                let view = views.borrow_and_update().clone();
                if !send_frame(&mut socket, &SessionFrame::for_view(view)).await {
                    debug!(session_id = %session_id, "Client disconnected during send");
                    break;
                }
            }

            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = handle_client_message(&text, &state, &feed) {
                            if !send_frame(&mut socket, &reply).await {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!(session_id = %session_id, "Session WebSocket client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(session_id = %session_id, error = %e, "Session WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    session.shutdown().await;
    info!(session_id = %session_id, "Session WebSocket closed");
}

/// Apply one client frame. Returns a frame to send back, if any.
fn handle_client_message(text: &str, state: &AppState, feed: &AuthFeed) -> Option<SessionFrame> {
    match serde_json::from_str::<ClientFrame>(text) {
        Ok(ClientFrame::SignIn { token }) => match state.verifier.verify(&token) {
            Ok(identity) => {
                feed.sign_in(identity);
                None
            }
            Err(e) => {
                warn!(error = %e, "Rejected sign-in token");
                Some(SessionFrame::Error {
                    message: e.to_string(),
                })
            }
        },
        Ok(ClientFrame::SignOut) => {
            feed.sign_out();
            None
        }
        Err(e) => {
            debug!(error = %e, "Unrecognized session frame from client");
            Some(SessionFrame::Error {
                message: format!("Unrecognized frame: {e}"),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{Identity, SubjectId};
    use crate::profile::Role;

    #[test]
    fn session_frame_shape() {
        let view = SessionView {
            identity: Some(Identity::new(SubjectId::new("uid-1").unwrap())),
            role: Some(Role::Admin),
            onboarding_complete: Some(true),
            selected_modules: Default::default(),
            loading: false,
        };
        let json = serde_json::to_value(SessionFrame::for_view(view)).unwrap();
        assert_eq!(json["type"], "session");
        assert_eq!(json["destination"]["kind"], "dashboard");
        assert_eq!(json["destination"]["role"], "admin");
        assert_eq!(json["path"], "/admin");
        assert_eq!(json["view"]["identity"]["subject"], "uid-1");
    }

    #[test]
    fn loading_frame_has_no_path() {
        let json = serde_json::to_value(SessionFrame::for_view(SessionView::loading())).unwrap();
        assert_eq!(json["destination"]["kind"], "loading");
        assert!(json["path"].is_null());
    }

    #[test]
    fn client_frames_parse() {
        assert!(matches!(
            serde_json::from_str::<ClientFrame>(r#"{"type":"sign_in","token":"t"}"#),
            Ok(ClientFrame::SignIn { .. })
        ));
        assert!(matches!(
            serde_json::from_str::<ClientFrame>(r#"{"type":"sign_out"}"#),
            Ok(ClientFrame::SignOut)
        ));
        assert!(serde_json::from_str::<ClientFrame>(r#"{"type":"nope"}"#).is_err());
    }
}
