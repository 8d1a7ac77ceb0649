//! MTProto channel source backed by `grammers`.
//!
//! Authenticates with a base64-encoded session produced by the `tg-session`
//! binary. Channel info and history are fetched with raw API calls so the
//! adapter only depends on the schema types.

use std::time::Duration;

use async_stream::try_stream;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use grammers_client::types::Chat;
use grammers_client::{Client, Config as ClientConfig, InitParams, InvocationError};
use grammers_session::Session;
use grammers_tl_types as tl;
use tracing::{debug, info};

use super::{
    ChannelHandle, ChannelSource, ExtendedInfo, RawMedia, RawMessage, RawReaction, SourceError,
};
use crate::config::Config;

/// Largest page the history endpoint returns.
const HISTORY_PAGE_SIZE: usize = 100;

pub struct TelegramSource {
    api_id: i32,
    api_hash: String,
    session: String,
    client: Option<Client>,
}

impl TelegramSource {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            api_id: config.api_id,
            api_hash: config.api_hash.clone(),
            session: config.session_string.clone(),
            client: None,
        }
    }

    fn client(&self) -> Result<&Client, SourceError> {
        self.client.as_ref().ok_or(SourceError::NotConnected)
    }
}

#[async_trait]
impl ChannelSource for TelegramSource {
    async fn connect(&mut self) -> Result<(), SourceError> {
        info!("Connecting to Telegram API...");

        let bytes = BASE64.decode(self.session.trim()).map_err(|e| {
            SourceError::Unauthorized(format!("session string is not valid base64: {e}"))
        })?;
        let session = Session::load(&bytes)
            .map_err(|e| SourceError::Unauthorized(format!("session string is invalid: {e:?}")))?;

        let client = Client::connect(ClientConfig {
            session,
            api_id: self.api_id,
            api_hash: self.api_hash.clone(),
            params: InitParams::default(),
        })
        .await
        .map_err(|e| SourceError::Transport(e.to_string()))?;

        if !client.is_authorized().await.map_err(map_invocation)? {
            return Err(SourceError::Unauthorized(
                "regenerate the session string with tg-session".to_string(),
            ));
        }

        let me = client.get_me().await.map_err(map_invocation)?;
        info!(
            name = %me.first_name(),
            username = me.username().unwrap_or("-"),
            "Connected to Telegram"
        );

        self.client = Some(client);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), SourceError> {
        if self.client.take().is_some() {
            info!("Disconnected from Telegram");
        }
        Ok(())
    }

    async fn resolve(&self, username: &str) -> Result<ChannelHandle, SourceError> {
        let client = self.client()?;

        let chat = match client.resolve_username(username).await {
            Ok(Some(chat)) => chat,
            Ok(None) => return Err(SourceError::NotFound(username.to_string())),
            Err(InvocationError::Rpc(rpc))
                if rpc.name == "USERNAME_NOT_OCCUPIED" || rpc.name == "USERNAME_INVALID" =>
            {
                return Err(SourceError::NotFound(username.to_string()));
            }
            Err(e) => return Err(map_invocation(e)),
        };

        let Chat::Channel(channel) = &chat else {
            return Err(SourceError::NotAChannel(username.to_string()));
        };

        Ok(ChannelHandle {
            id: chat.id(),
            title: channel.title().to_string(),
            access_hash: chat.pack().access_hash,
        })
    }

    async fn extended_info(&self, channel: &ChannelHandle) -> Result<ExtendedInfo, SourceError> {
        let client = self.client()?;

        let request = tl::functions::channels::GetFullChannel {
            channel: input_channel(channel),
        };
        let tl::enums::messages::ChatFull::Full(full) =
            client.invoke(&request).await.map_err(map_invocation)?;

        let subscriber_count = match full.full_chat {
            tl::enums::ChatFull::ChannelFull(info) => info.participants_count,
            tl::enums::ChatFull::Full(_) => None,
        };

        Ok(ExtendedInfo { subscriber_count })
    }

    fn recent_messages<'a>(
        &'a self,
        channel: &'a ChannelHandle,
        limit: usize,
    ) -> BoxStream<'a, Result<RawMessage, SourceError>> {
        Box::pin(try_stream! {
            let client = self.client()?;
            let mut remaining = limit;
            let mut offset_id = 0;

            while remaining > 0 {
                let page = remaining.min(HISTORY_PAGE_SIZE);
                let request = tl::functions::messages::GetHistory {
                    peer: input_peer(channel),
                    offset_id,
                    offset_date: 0,
                    add_offset: 0,
                    limit: i32::try_from(page).unwrap_or(100),
                    max_id: 0,
                    min_id: 0,
                    hash: 0,
                };
                debug!(offset_id, page, "Fetching history page");

                let messages = match client.invoke(&request).await.map_err(map_invocation)? {
                    tl::enums::messages::Messages::Messages(m) => m.messages,
                    tl::enums::messages::Messages::Slice(m) => m.messages,
                    tl::enums::messages::Messages::ChannelMessages(m) => m.messages,
                    tl::enums::messages::Messages::NotModified(_) => Vec::new(),
                };
                let fetched = messages.len();

                for message in messages {
                    offset_id = message_id(&message);
                    if let Some(raw) = convert_message(message) {
                        yield raw;
                        remaining -= 1;
                        if remaining == 0 {
                            break;
                        }
                    }
                }

                if fetched < page {
                    break;
                }
            }
        })
    }
}

fn input_channel(channel: &ChannelHandle) -> tl::enums::InputChannel {
    tl::types::InputChannel {
        channel_id: channel.id,
        access_hash: channel.access_hash.unwrap_or(0),
    }
    .into()
}

fn input_peer(channel: &ChannelHandle) -> tl::enums::InputPeer {
    tl::types::InputPeerChannel {
        channel_id: channel.id,
        access_hash: channel.access_hash.unwrap_or(0),
    }
    .into()
}

fn message_id(message: &tl::enums::Message) -> i32 {
    match message {
        tl::enums::Message::Message(m) => m.id,
        tl::enums::Message::Service(m) => m.id,
        tl::enums::Message::Empty(m) => m.id,
    }
}

/// Regular messages only; service and empty messages yield `None`.
fn convert_message(message: tl::enums::Message) -> Option<RawMessage> {
    let tl::enums::Message::Message(m) = message else {
        return None;
    };

    Some(RawMessage {
        id: m.id,
        text: Some(m.message).filter(|text| !text.is_empty()),
        date: DateTime::<Utc>::from_timestamp(i64::from(m.date), 0),
        views: m.views,
        forwards: m.forwards,
        replies: m.replies.map(|replies| match replies {
            tl::enums::MessageReplies::Replies(r) => r.replies,
        }),
        reactions: m.reactions.map(convert_reactions).unwrap_or_default(),
        media: m.media.map(convert_media),
    })
}

fn convert_reactions(reactions: tl::enums::MessageReactions) -> Vec<RawReaction> {
    let tl::enums::MessageReactions::Reactions(reactions) = reactions;

    reactions
        .results
        .into_iter()
        .map(|tl::enums::ReactionCount::Count(result)| match result.reaction {
            tl::enums::Reaction::Emoji(emoji) => RawReaction::Emoji {
                emoticon: emoji.emoticon,
                count: result.count,
            },
            tl::enums::Reaction::CustomEmoji(custom) => RawReaction::Custom {
                document_id: custom.document_id,
                count: result.count,
            },
            #[allow(unreachable_patterns)]
            _ => RawReaction::Other {
                count: result.count,
            },
        })
        .collect()
}

fn convert_media(media: tl::enums::MessageMedia) -> RawMedia {
    match media {
        tl::enums::MessageMedia::Photo(_) => RawMedia::Photo,
        tl::enums::MessageMedia::Document(doc) => match doc.document {
            Some(tl::enums::Document::Document(document)) => {
                let round_video = document.attributes.iter().any(|attribute| {
                    matches!(
                        attribute,
                        tl::enums::DocumentAttribute::Video(video) if video.round_message
                    )
                });
                RawMedia::Document {
                    mime_type: Some(document.mime_type),
                    round_video,
                }
            }
            _ => RawMedia::Document {
                mime_type: None,
                round_video: false,
            },
        },
        tl::enums::MessageMedia::WebPage(_) => RawMedia::WebPage,
        _ => RawMedia::Other,
    }
}

fn map_invocation(err: InvocationError) -> SourceError {
    match &err {
        InvocationError::Rpc(rpc) if rpc.name == "FLOOD_WAIT" || rpc.name == "FLOOD_PREMIUM_WAIT" => {
            SourceError::RateLimited {
                wait: Duration::from_secs(u64::from(rpc.value.unwrap_or(1))),
            }
        }
        InvocationError::Rpc(rpc)
            if rpc.name.starts_with("AUTH_KEY")
                || rpc.name == "SESSION_REVOKED"
                || rpc.name == "USER_DEACTIVATED" =>
        {
            SourceError::Unauthorized(err.to_string())
        }
        _ => SourceError::Transport(err.to_string()),
    }
}
