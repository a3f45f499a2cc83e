//! Telegram Bot API channel.

use super::{Channel, PostedMessage};
use crate::error::PublishError;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use teloxide::RequestError;
use teloxide::payloads::SendPhotoSetters;
use teloxide::prelude::*;
use teloxide::types::{InputFile, MessageId, ParseMode, Recipient};

/// Headroom over the publisher's own send timeout, so the HTTP client never
/// gives up first.
const CLIENT_TIMEOUT_MARGIN: Duration = Duration::from_secs(5);

/// Posts to a Telegram channel through a bot account.
pub struct TelegramChannel {
    bot: Bot,
    chat: Recipient,
}

impl TelegramChannel {
    /// Creates a channel for `target`, either a numeric chat id or a
    /// public `@username`.
    ///
    /// The bot's HTTP client gets a request timeout above `send_timeout`;
    /// the stock client would cut uploads off after 17 seconds.
    pub fn new(token: &str, target: &str, send_timeout: Duration) -> Result<Self, PublishError> {
        let client = teloxide::net::default_reqwest_settings()
            .timeout(send_timeout + CLIENT_TIMEOUT_MARGIN)
            .build()
            .map_err(|e| PublishError::Client(e.to_string()))?;

        Ok(Self {
            bot: Bot::with_client(token, client),
            chat: parse_recipient(target),
        })
    }
}

fn parse_recipient(target: &str) -> Recipient {
    match target.trim().parse::<i64>() {
        Ok(id) => Recipient::Id(ChatId(id)),
        Err(_) => Recipient::ChannelUsername(target.trim().to_string()),
    }
}

/// Maps a bot API failure onto the retry classes the publisher uses.
fn classify(err: RequestError) -> PublishError {
    match err {
        RequestError::RetryAfter(wait) => PublishError::RateLimited(wait.duration()),
        RequestError::Network(e) if e.is_timeout() => PublishError::Timeout,
        RequestError::Io(e) if e.kind() == std::io::ErrorKind::Interrupted => {
            PublishError::Interrupted
        }
        RequestError::Io(e) => PublishError::Io(e),
        other => PublishError::Api(other.to_string()),
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    async fn send_text(&self, text: &str) -> Result<PostedMessage, PublishError> {
        let message = self
            .bot
            .send_message(self.chat.clone(), text)
            .await
            .map_err(classify)?;
        Ok(PostedMessage(message.id.0))
    }

    async fn pin(&self, message: PostedMessage) -> Result<(), PublishError> {
        self.bot
            .pin_chat_message(self.chat.clone(), MessageId(message.0))
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn send_photo(&self, photo: &Path, caption: &str) -> Result<(), PublishError> {
        self.bot
            .send_photo(self.chat.clone(), InputFile::file(photo))
            .caption(caption)
            .parse_mode(ParseMode::MarkdownV2)
            .await
            .map_err(classify)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use teloxide::types::Seconds;
    use tokio::net::TcpListener;

    #[test]
    fn test_parse_recipient() {
        assert_eq!(
            parse_recipient("-1001234567890"),
            Recipient::Id(ChatId(-1001234567890))
        );
        assert_eq!(
            parse_recipient("@pixiv_daily"),
            Recipient::ChannelUsername("@pixiv_daily".to_string())
        );
    }

    #[test]
    fn test_classify_retry_after() {
        let err = classify(RequestError::RetryAfter(Seconds::from_seconds(3)));
        assert!(matches!(err, PublishError::RateLimited(d) if d == Duration::from_secs(3)));
    }

    #[test]
    fn test_classify_io() {
        let interrupted = std::io::Error::new(std::io::ErrorKind::Interrupted, "signal");
        assert!(matches!(
            classify(RequestError::Io(interrupted)),
            PublishError::Interrupted
        ));

        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = classify(RequestError::Io(denied));
        assert!(matches!(err, PublishError::Io(_)));
        assert!(!err.is_fast_fail());
    }

    #[tokio::test]
    async fn test_send_outlasts_stock_client_timeout() {
        // Accepts connections and never answers.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let mut channel =
            TelegramChannel::new("123:abc", "@pixiv_daily", Duration::from_secs(60)).unwrap();
        let api = url::Url::parse(&format!("http://{}/", addr)).unwrap();
        channel.bot = channel.bot.clone().set_api_url(api);

        let outcome =
            tokio::time::timeout(Duration::from_secs(18), channel.send_text("October 24, 2019"))
                .await;
        assert!(outcome.is_err(), "send ended early: {:?}", outcome);
    }
}
