//! WebSocket endpoint streaming table changes to clients.
//!
//! Every connection gets its own [`AuthStore`] and [`RealtimeStore`]; both go
//! away with the socket.

use crate::{
    auth::TokenVerifier,
    models::Profile,
    realtime::{Change, ChangeFeed, RealtimeStore, Table},
    session::{AuthStore, ProfileSource},
    DbPool,
};
use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    response::Response,
    routing::get,
    Extension, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Auth {
        #[serde(default)]
        access_token: Option<String>,
    },
    RefreshProfile {
        access_token: String,
    },
    Subscribe {
        table: Table,
    },
    UnsubscribeAll,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Session { user: Option<Profile> },
    Change(Change),
    Error { message: String },
}

pub struct Session {
    verifier: Arc<TokenVerifier>,
    auth: AuthStore,
    realtime: RealtimeStore,
    outgoing: mpsc::UnboundedSender<ServerMessage>,
}

impl Session {
    pub fn new(
        verifier: Arc<TokenVerifier>,
        profiles: Arc<dyn ProfileSource>,
        feed: ChangeFeed,
        outgoing: mpsc::UnboundedSender<ServerMessage>,
    ) -> Session {
        Session {
            verifier,
            auth: AuthStore::new(profiles),
            realtime: RealtimeStore::new(feed),
            outgoing,
        }
    }

    fn send(&self, message: ServerMessage) {
        let _ = self.outgoing.send(message);
    }

    pub async fn handle(&self, text: &str) {
        let message = match serde_json::from_str::<ClientMessage>(text) {
            Ok(message) => message,
            Err(e) => {
                self.send(ServerMessage::Error {
                    message: format!("unreadable message: {e}"),
                });
                return;
            }
        };

        match message {
            ClientMessage::Auth {
                access_token: Some(token),
            } => match self.verifier.authenticate(&token) {
                Ok(user) => {
                    self.auth.set_auth_user(Some(&user)).await;
                    self.send(ServerMessage::Session {
                        user: self.auth.user().await,
                    });
                }
                Err(e) => {
                    self.auth.sign_out().await;
                    self.send(ServerMessage::Error {
                        message: e.message().to_string(),
                    });
                    self.send(ServerMessage::Session { user: None });
                }
            },
            ClientMessage::Auth { access_token: None } => {
                self.auth.set_auth_user(None).await;
                self.send(ServerMessage::Session { user: None });
            }
            ClientMessage::RefreshProfile { access_token } => {
                match self.verifier.authenticate(&access_token) {
                    Ok(user) => self.auth.refresh_profile(Some(&user)).await,
                    Err(e) => {
                        self.send(ServerMessage::Error {
                            message: e.message().to_string(),
                        });
                        return;
                    }
                }
                self.send(ServerMessage::Session {
                    user: self.auth.user().await,
                });
            }
            ClientMessage::Subscribe { table } => {
                let outgoing = self.outgoing.clone();
                self.realtime
                    .on_change(table, move |change| {
                        let _ = outgoing.send(ServerMessage::Change(change));
                    })
                    .await;
                self.realtime.subscribe(table).await;
            }
            ClientMessage::UnsubscribeAll => self.realtime.unsubscribe_all().await,
        }
    }

    pub async fn close(&self) {
        self.realtime.unsubscribe_all().await;
        self.auth.sign_out().await;
    }
}

async fn run(
    mut socket: WebSocket,
    verifier: Arc<TokenVerifier>,
    pool: DbPool,
    feed: ChangeFeed,
) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let session = Session::new(verifier, Arc::new(pool), feed, tx);
    tracing::debug!("realtime client connected");

    loop {
        tokio::select! {
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => session.handle(&text).await,
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!("realtime socket error: {e}");
                    break;
                }
            },
            Some(message) = rx.recv() => {
                let text = match serde_json::to_string(&message) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!("failed to encode realtime message: {e}");
                        continue;
                    }
                };
                if socket.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
        }
    }

    session.close().await;
    tracing::debug!("realtime client disconnected");
}

async fn connect(
    ws: WebSocketUpgrade,
    Extension(verifier): Extension<Arc<TokenVerifier>>,
    Extension(pool): Extension<DbPool>,
    Extension(feed): Extension<ChangeFeed>,
) -> Response {
    ws.on_upgrade(move |socket| run(socket, verifier, pool, feed))
}

pub fn app() -> Router {
    Router::new().route("/realtime", get(connect))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Claims, AUDIENCE};
    use async_trait::async_trait;
    use jsonwebtoken::{EncodingKey, Header};
    use std::time::Duration;
    use tokio::time::timeout;
    use uuid::Uuid;

    const SECRET: &str = "realtime-test-secret-realtime-test-secret";

    struct OneProfile(Profile);

    #[async_trait]
    impl ProfileSource for OneProfile {
        async fn profile(&self, user_id: Uuid) -> anyhow::Result<Option<Profile>> {
            Ok((user_id == self.0.id).then(|| self.0.clone()))
        }
    }

    fn profile() -> Profile {
        Profile {
            id: Uuid::new_v4(),
            full_name: Some("Lin".to_string()),
            bio: None,
            avatar_url: None,
            date_of_birth: None,
            phone: None,
            is_admin: false,
            created_at: chrono::Utc::now(),
        }
    }

    fn token(sub: Uuid) -> String {
        jsonwebtoken::encode(
            &Header::default(),
            &Claims {
                sub,
                exp: jsonwebtoken::get_current_timestamp() + 600,
                aud: Some(AUDIENCE.to_string()),
                email: None,
            },
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    fn session(
        profile: Profile,
        feed: ChangeFeed,
    ) -> (Session, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Session::new(
            Arc::new(TokenVerifier::new(SECRET)),
            Arc::new(OneProfile(profile)),
            feed,
            tx,
        );
        (session, rx)
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<ServerMessage>) -> Option<ServerMessage> {
        timeout(Duration::from_millis(200), rx.recv())
            .await
            .ok()
            .flatten()
    }

    #[tokio::test]
    async fn auth_messages_drive_the_session() {
        let me = profile();
        let (session, mut rx) = session(me.clone(), ChangeFeed::default());

        let auth = serde_json::json!({ "type": "auth", "access_token": token(me.id) });
        session.handle(&auth.to_string()).await;
        match next(&mut rx).await {
            Some(ServerMessage::Session { user: Some(user) }) => assert_eq!(user.id, me.id),
            other => panic!("expected a session, got {other:?}"),
        }

        session.handle(r#"{"type":"auth","access_token":null}"#).await;
        assert!(matches!(
            next(&mut rx).await,
            Some(ServerMessage::Session { user: None })
        ));

        session
            .handle(r#"{"type":"auth","access_token":"garbage"}"#)
            .await;
        assert!(matches!(next(&mut rx).await, Some(ServerMessage::Error { .. })));
        assert!(matches!(
            next(&mut rx).await,
            Some(ServerMessage::Session { user: None })
        ));
    }

    #[tokio::test]
    async fn refresh_profile_reports_the_session_again() {
        let me = profile();
        let (session, mut rx) = session(me.clone(), ChangeFeed::default());

        let refresh = serde_json::json!({ "type": "refresh_profile", "access_token": token(me.id) });
        session.handle(&refresh.to_string()).await;
        match next(&mut rx).await {
            Some(ServerMessage::Session { user: Some(user) }) => assert_eq!(user.id, me.id),
            other => panic!("expected a session, got {other:?}"),
        }

        session
            .handle(r#"{"type":"refresh_profile","access_token":"garbage"}"#)
            .await;
        assert!(matches!(next(&mut rx).await, Some(ServerMessage::Error { .. })));
        assert!(next(&mut rx).await.is_none());
    }

    #[tokio::test]
    async fn subscribed_tables_are_forwarded_until_unsubscribed() {
        let feed = ChangeFeed::default();
        let (session, mut rx) = session(profile(), feed.clone());

        session.handle(r#"{"type":"subscribe","table":"clubs"}"#).await;
        session.handle(r#"{"type":"subscribe","table":"clubs"}"#).await;

        let row = serde_json::json!({ "id": Uuid::new_v4(), "name": "Film Society" });
        feed.publish(Change::insert(Table::Events, &row));
        feed.publish(Change::insert(Table::Clubs, &row));

        match next(&mut rx).await {
            Some(ServerMessage::Change(change)) => assert_eq!(change.table, Table::Clubs),
            other => panic!("expected a change, got {other:?}"),
        }
        assert!(next(&mut rx).await.is_none(), "one delivery per change");

        session.handle(r#"{"type":"unsubscribe_all"}"#).await;
        feed.publish(Change::insert(Table::Clubs, &row));
        assert!(next(&mut rx).await.is_none());
    }

    #[tokio::test]
    async fn unreadable_messages_get_an_error() {
        let (session, mut rx) = session(profile(), ChangeFeed::default());
        session.handle(r#"{"type":"subscribe","table":"profiles"}"#).await;
        assert!(matches!(next(&mut rx).await, Some(ServerMessage::Error { .. })));

        let wire = serde_json::to_value(ServerMessage::Change(Change::insert(
            Table::Announcements,
            &serde_json::json!({ "id": 1 }),
        )))
        .unwrap();
        assert_eq!(wire["type"], "change");
        assert_eq!(wire["table"], "announcements");
        assert_eq!(wire["kind"], "INSERT");
    }
}
