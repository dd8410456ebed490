//! C3 Relay Client: an ordered set of Nostr relay connections, the single
//! inbound channel to C4, and the three outbound publish paths of spec §6.
//!
//! Generalizes the builder/backend-trait shape of `LightningBuilder`/
//! `GatewayLightningBuilder` (`gateway/ln-gateway/src/lightning/mod.rs`) to a
//! relay pool, and is grounded directly on `nostr_sdk::Client` usage in
//! `Resolvr-io-deadcat__src-tauri-src-commands.rs`.

use std::sync::Arc;

use nostr::key::Keys;
use nostr::nips::nip04;
use nostr::{Event, EventBuilder, Filter, Kind, PublicKey, Tag};
use nostr_sdk::{Client, RelayPoolNotification};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::dedupe::SeenEvents;
use crate::error::{RelayError, RelayResult};
use crate::event::{
    ConfirmationPayload, FailurePayload, L1CommitmentPayload, RelayEvent, SigningChallengePayload,
};
use crate::kinds::EventKind;

pub const LOG_RELAY: &str = "arkrelay::relay";

pub struct RelayClient {
    client: Client,
    keys: Keys,
    seen: Arc<Mutex<SeenEvents>>,
}

impl RelayClient {
    /// Connects to `relay_urls` under the gateway's identity `keys` and
    /// spawns the subscription loop, returning the client plus the single
    /// inbound channel C4 reads from (spec §4.3 "a single inbound channel of
    /// decoded events to C4").
    pub async fn connect(
        relay_urls: Vec<String>,
        keys: Keys,
        channel_capacity: usize,
    ) -> RelayResult<(Self, mpsc::Receiver<RelayEvent>)> {
        let client = Client::new(&keys);
        for url in &relay_urls {
            client
                .add_relay(url.clone())
                .await
                .map_err(|e| RelayError::ConnectFailed {
                    url: url.clone(),
                    reason: e.to_string(),
                })?;
        }
        client.connect().await;

        let filter = Filter::new().pubkey(keys.public_key());
        client
            .subscribe(vec![filter], None)
            .await
            .map_err(|e| RelayError::ConnectFailed {
                url: "subscribe".to_string(),
                reason: e.to_string(),
            })?;

        let (tx, rx) = mpsc::channel(channel_capacity);
        let seen = Arc::new(Mutex::new(SeenEvents::new(channel_capacity.max(4096))));

        let this = Self {
            client: client.clone(),
            keys: keys.clone(),
            seen: seen.clone(),
        };
        this.spawn_ingest_loop(tx);

        Ok((this, rx))
    }

    fn spawn_ingest_loop(&self, tx: mpsc::Sender<RelayEvent>) {
        let mut notifications = self.client.notifications();
        let keys = self.keys.clone();
        let seen = self.seen.clone();

        tokio::spawn(async move {
            while let Ok(notification) = notifications.recv().await {
                if let RelayPoolNotification::Event { relay_url, event, .. } = notification {
                    let event_id = event.id.to_hex();
                    if !seen.lock().await.record(&event_id) {
                        debug!(target: LOG_RELAY, event_id, "dropping duplicate event");
                        continue;
                    }

                    match decode_event(&keys, &event, relay_url.to_string()) {
                        Ok(decoded) => {
                            if tx.send(decoded).await.is_err() {
                                warn!(target: LOG_RELAY, "inbound channel closed, stopping ingest loop");
                                break;
                            }
                        }
                        Err(err) => {
                            warn!(target: LOG_RELAY, event_id, error = %err, "dropping undecodable event");
                        }
                    }
                }
            }
        });
    }

    /// At least one relay must be healthy for the gateway to accept writes
    /// (spec §4.3). `nostr-sdk` tracks per-relay connection status; we
    /// require at least one to be connected.
    pub async fn is_healthy(&self) -> bool {
        !self.client.relays().await.is_empty()
    }

    /// Publishes an encrypted `signing_challenge` DM to a single recipient.
    pub async fn publish_challenge(
        &self,
        recipient: PublicKey,
        payload: &SigningChallengePayload,
    ) -> RelayResult<String> {
        self.publish_encrypted_dm(recipient, EventKind::SigningChallenge, payload)
            .await
    }

    /// Publishes an encrypted `failure` DM to a single recipient.
    pub async fn publish_failure(
        &self,
        recipient: PublicKey,
        payload: &FailurePayload,
    ) -> RelayResult<String> {
        self.publish_encrypted_dm(recipient, EventKind::Failure, payload)
            .await
    }

    /// Publishes a public `confirmation` event.
    pub async fn publish_confirmation(
        &self,
        payload: &ConfirmationPayload,
        ref_action_id: &str,
    ) -> RelayResult<String> {
        let content = serde_json::to_string(payload)
            .map_err(|e| RelayError::MalformedPayload(e.to_string()))?;
        let tags = vec![Tag::custom(
            nostr::TagKind::Custom("action_id".into()),
            vec![ref_action_id.to_string()],
        )];
        self.publish_public(EventKind::Confirmation, content, tags).await
    }

    /// Publishes a public `l1_commitment` event.
    pub async fn publish_l1_commitment(&self, payload: &L1CommitmentPayload) -> RelayResult<String> {
        let content = serde_json::to_string(payload)
            .map_err(|e| RelayError::MalformedPayload(e.to_string()))?;
        self.publish_public(EventKind::L1Commitment, content, vec![]).await
    }

    async fn publish_encrypted_dm<T: serde::Serialize>(
        &self,
        recipient: PublicKey,
        kind: EventKind,
        payload: &T,
    ) -> RelayResult<String> {
        let plaintext =
            serde_json::to_string(payload).map_err(|e| RelayError::MalformedPayload(e.to_string()))?;
        let ciphertext = nip04::encrypt(self.keys.secret_key().map_err(|e| {
            RelayError::PublishFailed(format!("missing secret key: {e}"))
        })?, &recipient, plaintext)
        .map_err(|e| RelayError::PublishFailed(e.to_string()))?;

        let tag = Tag::public_key(recipient);
        let event = EventBuilder::new(Kind::Custom(kind.code().into()), ciphertext, vec![tag])
            .to_event(&self.keys)
            .map_err(|e| RelayError::PublishFailed(e.to_string()))?;

        self.send(event).await
    }

    async fn publish_public(
        &self,
        kind: EventKind,
        content: String,
        tags: Vec<Tag>,
    ) -> RelayResult<String> {
        let event = EventBuilder::new(Kind::Custom(kind.code().into()), content, tags)
            .to_event(&self.keys)
            .map_err(|e| RelayError::PublishFailed(e.to_string()))?;
        self.send(event).await
    }

    async fn send(&self, event: Event) -> RelayResult<String> {
        if !self.is_healthy().await {
            return Err(RelayError::AllRelaysDown);
        }
        let id = self
            .client
            .send_event(event)
            .await
            .map_err(|e| RelayError::PublishFailed(e.to_string()))?;
        info!(target: LOG_RELAY, event_id = %id, "published event");
        Ok(id.to_hex())
    }
}

/// Decodes one signed `nostr::Event` into a [`RelayEvent`], decrypting the
/// content first if the classified kind is a direct-message class (spec §6
/// table). Rejects the event if it's a DM class and decryption fails — the
/// envelope signature itself is already verified by `nostr-sdk` before the
/// event reaches the notification stream.
fn decode_event(keys: &Keys, event: &Event, relay_url: String) -> RelayResult<RelayEvent> {
    let kind = EventKind::from_code(event.kind.as_u32() as u16);

    let content = if kind.is_direct_message() {
        let sender = event.pubkey;
        let plaintext = nip04::decrypt(
            keys.secret_key()
                .map_err(|e| RelayError::DecryptionFailed(e.to_string()))?,
            &sender,
            &event.content,
        )
        .map_err(|e| RelayError::DecryptionFailed(e.to_string()))?;
        serde_json::from_str::<Value>(&plaintext)
            .map_err(|e| RelayError::MalformedPayload(e.to_string()))?
    } else {
        serde_json::from_str::<Value>(&event.content)
            .map_err(|e| RelayError::MalformedPayload(e.to_string()))?
    };

    let tags = event
        .tags
        .iter()
        .filter_map(|tag| {
            let slice = tag.as_vec();
            slice.first().map(|k| (k.clone(), slice.get(1).cloned().unwrap_or_default()))
        })
        .collect();

    Ok(RelayEvent {
        event_id: event.id.to_hex(),
        relay_url,
        author: event.pubkey.to_hex(),
        kind,
        content,
        tags,
        created_at: chrono::DateTime::from_timestamp(event.created_at.as_u64() as i64, 0)
            .unwrap_or_else(chrono::Utc::now),
    })
}
